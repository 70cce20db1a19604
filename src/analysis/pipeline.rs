//! The two-stage decision pipeline run on a fired window.
//!
//! Event detection runs first on the flat feature row. Only when it reports an
//! occurrence does the type stage run, on the centered-aggregate row of the
//! type window captured in the same ingestion step. Both predictions execute
//! on the blocking pool so slow models never stall the ingestion path.

use crate::analysis::features::FeatureBuilder;
use crate::classifier::ClassifierPort;
use crate::model::{Event, EventType, Provenance, Reading, Timestamp};
use crate::session::PendingAnalysis;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// An occurrence reported by the event-detection stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Id the recorded event will carry
    pub event_id: Uuid,
    pub session: Uuid,
    pub athlete: Uuid,
    /// Name of the event-detection model that said yes
    pub event_detector: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Result of the event-detection stage.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    NoEvent { start: Timestamp, end: Timestamp },
    Found(Detection),
}

/// Runs both stages against the classifier port.
pub struct Analyzer {
    features: FeatureBuilder,
    classifiers: Arc<ClassifierPort>,
}

impl Analyzer {
    pub fn new(features: FeatureBuilder, classifiers: Arc<ClassifierPort>) -> Self {
        Self {
            features,
            classifiers,
        }
    }

    pub fn classifiers(&self) -> &Arc<ClassifierPort> {
        &self.classifiers
    }

    /// Event-detection stage over the pending detection window.
    pub async fn detect(&self, pending: &PendingAnalysis) -> DetectionOutcome {
        let (start, end) = bounds(&pending.detection_window);
        let detector = self.classifiers.event_detector();
        let row = self.features.flat(&pending.detection_window);

        let name = detector.name().to_string();
        let found = match tokio::task::spawn_blocking(move || detector.predict(&row)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(session = %pending.session, "Event detection task failed: {}", e);
                false
            }
        };

        debug!(
            session = %pending.session,
            sensor = %pending.sensor,
            start,
            end,
            found,
            "Event detection evaluated"
        );

        if !found {
            return DetectionOutcome::NoEvent { start, end };
        }
        DetectionOutcome::Found(Detection {
            event_id: Uuid::new_v4(),
            session: pending.session,
            athlete: pending.athlete,
            event_detector: name,
            start,
            end,
        })
    }

    /// Type stage for a confirmed detection.
    ///
    /// Without a usable type window the event is recorded as `detected` with
    /// the detection window's bounds.
    pub async fn classify(&self, detection: &Detection, type_window: Option<&[Reading]>) -> Event {
        let typed = type_window.and_then(|window| {
            let row = self.features.centered_aggregate(window)?;
            Some((bounds(window), row))
        });

        let Some(((start, end), row)) = typed else {
            return Event {
                id: detection.event_id,
                session: detection.session,
                event_type: EventType::Detected,
                start: detection.start,
                end: detection.end,
                provenance: Provenance {
                    event_detector: detection.event_detector.clone(),
                    type_classifier: None,
                },
            };
        };

        let classifier = self.classifiers.type_classifier();
        let name = classifier.name().to_string();
        let label = match tokio::task::spawn_blocking(move || classifier.predict(&row)).await {
            Ok(label) => label,
            Err(e) => {
                warn!(session = %detection.session, "Type classification task failed: {}", e);
                crate::classifier::DEFAULT_JUMP_TYPE
            }
        };

        Event {
            id: detection.event_id,
            session: detection.session,
            event_type: EventType::Jump(label),
            start,
            end,
            provenance: Provenance {
                event_detector: detection.event_detector.clone(),
                type_classifier: Some(name),
            },
        }
    }
}

/// Timestamps of a window's first and last readings.
fn bounds(window: &[Reading]) -> (Timestamp, Timestamp) {
    match (window.first(), window.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => (0, 0),
    }
}

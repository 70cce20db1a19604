//! Dispatches client messages into the core and fans results back out.
//!
//! Ingestion and window evaluation run inline in [`MotionEngine::handle`]. A
//! fired window is analyzed on its own tracked task; its `event_found`,
//! `no_event_found` and `event_data` frames go to every subscriber. Shutdown
//! waits for tracked tasks so no classification is abandoned.

use crate::analysis::{Analyzer, DetectionOutcome, FeatureBuilder, WindowPolicy};
use crate::classifier::ClassifierPort;
use crate::config::{AnalysisConfig, ConfigError};
use crate::events::{EventRegistry, RecordOutcome};
use crate::model::Session;
use crate::persistence::SessionStore;
use crate::protocol::{
    EventFoundData, InboundMessage, OutboundMessage, ReadingEntryData, RequestResponseData,
    WindowData,
};
use crate::session::{EndOutcome, PendingAnalysis, SessionLifecycle};
use crate::stats::SharedStats;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of the outbound broadcast channel.
const OUTBOUND_CAPACITY: usize = 1024;

/// The core behind one agent process.
pub struct MotionEngine {
    lifecycle: Arc<SessionLifecycle>,
    registry: Arc<EventRegistry>,
    analyzer: Arc<Analyzer>,
    outbound: broadcast::Sender<OutboundMessage>,
    analyses: TaskTracker,
}

impl MotionEngine {
    /// Build an engine. Invalid analysis parameters are rejected here.
    pub fn new(
        config: &AnalysisConfig,
        store: Arc<dyn SessionStore>,
        classifiers: Arc<ClassifierPort>,
        stats: SharedStats,
    ) -> Result<Self, ConfigError> {
        let policy = WindowPolicy::new(config)?;
        let features = FeatureBuilder::new(config)?;
        let lifecycle = Arc::new(SessionLifecycle::new(policy, store, stats));
        let registry = Arc::new(EventRegistry::new(lifecycle.clone()));
        let analyzer = Arc::new(Analyzer::new(features, classifiers));
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);

        Ok(Self {
            lifecycle,
            registry,
            analyzer,
            outbound,
            analyses: TaskTracker::new(),
        })
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    pub fn classifiers(&self) -> &Arc<ClassifierPort> {
        self.analyzer.classifiers()
    }

    pub fn stats(&self) -> &SharedStats {
        self.lifecycle.stats()
    }

    /// Receive every frame broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }

    /// Send a frame to all subscribers. Having none is not an error.
    pub fn broadcast(&self, message: OutboundMessage) {
        let _ = self.outbound.send(message);
    }

    /// Handle one inbound frame. Returns the reply for the sender, if any.
    ///
    /// Must be called within a Tokio runtime.
    pub fn handle(&self, message: InboundMessage) -> Option<OutboundMessage> {
        match message {
            InboundMessage::StartSession(data) => {
                self.lifecycle.start(data.into());
                None
            }
            InboundMessage::RegisterPlacement(data) => {
                if !self
                    .lifecycle
                    .register_placement(data.session, &data.sensor, data.location)
                {
                    debug!(session = %data.session, sensor = %data.sensor, "Placement not registered");
                }
                None
            }
            InboundMessage::ReadingEntry(data) => {
                self.ingest(data);
                None
            }
            InboundMessage::EndSession(data) => {
                if let EndOutcome::NotActive(state) = self.lifecycle.end(data.id, data.end) {
                    debug!(session = %data.id, %state, "End for inactive session ignored");
                }
                None
            }
            InboundMessage::RequestData(data) => Some(OutboundMessage::RequestResponse(
                RequestResponseData {
                    sessions: self.sessions_for(&data.athlete_ids),
                },
            )),
            InboundMessage::Heartbeat(_) => Some(OutboundMessage::heartbeat()),
        }
    }

    /// Ingest one reading. Returns the analysis task when a window fired.
    pub fn ingest(&self, data: ReadingEntryData) -> Option<JoinHandle<()>> {
        let session = data.session;
        let sensor = data.sensor.clone();
        let pending = self
            .lifecycle
            .ingest(session, &sensor, data.into_sample())
            .into_analysis()?;

        let analyzer = self.analyzer.clone();
        let registry = self.registry.clone();
        let outbound = self.outbound.clone();
        Some(self.analyses.spawn(async move {
            analyze(&analyzer, &registry, &outbound, pending).await;
        }))
    }

    /// Durable and active sessions of each athlete, one entry per session.
    pub fn sessions_for(&self, athletes: &[Uuid]) -> Vec<Session> {
        let mut sessions: Vec<Session> = Vec::new();
        let mut index: HashMap<Uuid, usize> = HashMap::new();

        for athlete in athletes {
            let durable = self
                .lifecycle
                .store()
                .find_sessions_by_athlete(*athlete)
                .unwrap_or_else(|e| {
                    warn!(athlete = %athlete, "Failed to query stored sessions: {}", e);
                    Vec::new()
                });
            let active = self.lifecycle.active_sessions_for(*athlete);

            // Active snapshots are newer than any stored copy.
            for session in durable.into_iter().chain(active) {
                match index.get(&session.id) {
                    Some(&i) => sessions[i] = session,
                    None => {
                        index.insert(session.id, sessions.len());
                        sessions.push(session);
                    }
                }
            }
        }
        sessions
    }

    /// Tell subscribers the agent is going away, persist open sessions and
    /// wait for outstanding analyses to record their events.
    pub async fn shutdown(&self) -> usize {
        self.broadcast(OutboundMessage::Shutdown);
        let persisted = self.lifecycle.shutdown();

        self.analyses.close();
        if !self.analyses.is_empty() {
            info!(
                pending = self.analyses.len(),
                "Waiting for outstanding analyses"
            );
        }
        self.analyses.wait().await;
        persisted
    }
}

async fn analyze(
    analyzer: &Analyzer,
    registry: &EventRegistry,
    outbound: &broadcast::Sender<OutboundMessage>,
    pending: PendingAnalysis,
) {
    let detection = match analyzer.detect(&pending).await {
        DetectionOutcome::NoEvent { start, end } => {
            let _ = outbound.send(OutboundMessage::NoEventFound(WindowData { start, end }));
            return;
        }
        DetectionOutcome::Found(detection) => detection,
    };

    let _ = outbound.send(OutboundMessage::EventFound(EventFoundData {
        event_id: detection.event_id,
        session: detection.session,
        athlete: detection.athlete,
        event_detector: detection.event_detector.clone(),
        start: detection.start,
        end: detection.end,
    }));

    let event = analyzer
        .classify(&detection, pending.type_window.as_deref())
        .await;
    if registry.record(&event) != RecordOutcome::Lost {
        let _ = outbound.send(OutboundMessage::EventData(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LogisticModel;
    use crate::model::{EventType, JumpType, Location, Sport};
    use crate::persistence::MemoryStore;
    use crate::protocol::{AxisEntry, EndSessionData, RequestData, StartSessionData};
    use crate::session::PlacementSpec;
    use crate::stats::IngestStats;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            bool_window_size: 4,
            bool_interval: 2,
            type_window_size: 6,
            type_interval: 2,
            ..AnalysisConfig::default()
        }
    }

    fn engine(store: Arc<MemoryStore>, detects: bool) -> MotionEngine {
        let classifiers = Arc::new(ClassifierPort::new());
        classifiers.install_event_detector(
            "fixed".to_string(),
            Box::new(LogisticModel {
                weights: vec![0.0; 36],
                bias: if detects { 10.0 } else { -10.0 },
                threshold: 0.5,
            }),
        );
        MotionEngine::new(&config(), store, classifiers, Arc::new(IngestStats::new())).unwrap()
    }

    fn axis() -> AxisEntry {
        AxisEntry {
            x: 0.1,
            y: 0.2,
            z: 0.3,
            units: None,
        }
    }

    fn reading(session: Uuid, time: i64) -> ReadingEntryData {
        ReadingEntryData {
            session,
            sensor: "A1".to_string(),
            time,
            accelerometer: axis(),
            gyroscope: axis(),
            magnetometer: axis(),
        }
    }

    fn start(engine: &MotionEngine, athlete: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        engine.handle(InboundMessage::StartSession(StartSessionData {
            id,
            athlete,
            sport: Sport::Skating,
            start: 0,
            placements: vec![PlacementSpec {
                sensor: "A1".to_string(),
                location: Location::LeftFoot,
            }],
        }));
        id
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = AnalysisConfig {
            bool_interval: 0,
            ..AnalysisConfig::default()
        };
        let result = MotionEngine::new(
            &bad,
            Arc::new(MemoryStore::new()),
            Arc::new(ClassifierPort::new()),
            Arc::new(IngestStats::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_reply() {
        let engine = engine(Arc::new(MemoryStore::new()), false);
        assert_eq!(
            engine.handle(InboundMessage::Heartbeat(None)),
            Some(OutboundMessage::heartbeat())
        );
    }

    #[tokio::test]
    async fn test_no_event_found_broadcast() {
        let engine = engine(Arc::new(MemoryStore::new()), false);
        let mut rx = engine.subscribe();
        let id = start(&engine, Uuid::new_v4());

        let mut tasks = Vec::new();
        for t in 1..=4 {
            tasks.extend(engine.ingest(reading(id, t)));
        }
        assert_eq!(tasks.len(), 1);
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(
            rx.recv().await.unwrap(),
            OutboundMessage::NoEventFound(WindowData { start: 1, end: 4 })
        );
    }

    #[tokio::test]
    async fn test_event_found_then_event_data() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), true);
        let mut rx = engine.subscribe();
        let athlete = Uuid::new_v4();
        let id = start(&engine, athlete);

        // Fires at 4 (type stage not ready) and at 6 (type stage ready).
        let mut tasks = Vec::new();
        for t in 1..=6 {
            tasks.extend(engine.ingest(reading(id, t)));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut found = Vec::new();
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            match message {
                OutboundMessage::EventFound(data) => found.push(data),
                OutboundMessage::EventData(event) => events.push(event),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|f| f.athlete == athlete && f.event_detector == "fixed"));
        events.sort_by_key(|e| e.end);
        assert_eq!(events[0].event_type, EventType::Detected);
        assert_eq!((events[0].start, events[0].end), (1, 4));
        assert_eq!(events[1].event_type, EventType::Jump(JumpType::Unknown));
        assert_eq!((events[1].start, events[1].end), (1, 6));

        engine.handle(InboundMessage::EndSession(EndSessionData { id, end: 7 }));
        let stored = store.load(id).unwrap().unwrap();
        assert_eq!(stored.events.len(), 2);
        assert_eq!(stored.reading_count(), 6);
    }

    #[tokio::test]
    async fn test_request_data_merges_active_and_stored() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store, false);
        let athlete = Uuid::new_v4();

        let closed = start(&engine, athlete);
        engine.handle(InboundMessage::EndSession(EndSessionData { id: closed, end: 5 }));
        let open = start(&engine, athlete);
        start(&engine, Uuid::new_v4());

        let reply = engine.handle(InboundMessage::RequestData(RequestData {
            athlete_ids: vec![athlete, athlete],
        }));
        let Some(OutboundMessage::RequestResponse(data)) = reply else {
            panic!("expected request_response");
        };
        let mut ids: Vec<Uuid> = data.sessions.iter().map(|s| s.id).collect();
        ids.sort();
        let mut expected = vec![closed, open];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_shutdown_broadcasts_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), false);
        let mut rx = engine.subscribe();
        let id = start(&engine, Uuid::new_v4());

        assert_eq!(engine.shutdown().await, 1);
        assert_eq!(rx.recv().await.unwrap(), OutboundMessage::Shutdown);
        assert!(store.load(id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_outstanding_analysis() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone(), true);
        let id = start(&engine, Uuid::new_v4());

        // The fired analysis has not run yet on this single-threaded runtime.
        let mut fired = 0;
        for t in 1..=4 {
            fired += engine.ingest(reading(id, t)).map_or(0, |_| 1);
        }
        assert_eq!(fired, 1);

        assert_eq!(engine.shutdown().await, 1);
        let stored = store.load(id).unwrap().unwrap();
        assert_eq!(stored.events.len(), 1);
        assert_eq!(engine.stats().snapshot().events_standalone, 1);
        assert_eq!(engine.stats().snapshot().events_lost, 0);
    }
}

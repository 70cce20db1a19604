//! The classifier port: the active event-detection and type models.
//!
//! Each stage holds an `Arc` to its current model behind a lock. A prediction
//! clones the `Arc` and releases the lock before predicting, so loading a new
//! model never disturbs an in-flight prediction: it sees the old model or the
//! new one, never a half-loaded one.

use crate::classifier::model::{ClassifierError, EventDetector, ModelArtifact, TypeClassifier};
use crate::model::JumpType;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Provenance name of an unloaded stage.
pub const STUB_MODEL_NAME: &str = "stub";

/// Occurrence probability of the development stub used while no event
/// detector is loaded. Not a production behavior.
pub const STUB_EVENT_PROBABILITY: f64 = 0.5;

/// Label returned while no type classifier is loaded.
pub const DEFAULT_JUMP_TYPE: JumpType = JumpType::Unknown;

/// Extension of classifier artifact files.
pub const ARTIFACT_EXTENSION: &str = "json";

/// The event-detection stage's model.
pub enum EventDetectionModel {
    /// No model loaded; predictions are pseudo-random.
    Unloaded,
    Loaded {
        name: String,
        detector: Box<dyn EventDetector>,
    },
}

impl EventDetectionModel {
    pub fn name(&self) -> &str {
        match self {
            EventDetectionModel::Unloaded => STUB_MODEL_NAME,
            EventDetectionModel::Loaded { name, .. } => name,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, EventDetectionModel::Loaded { .. })
    }

    /// Predict occurrence. A failing model counts as "no event".
    pub fn predict(&self, row: &[f64]) -> bool {
        match self {
            EventDetectionModel::Unloaded => rand::thread_rng().gen_bool(STUB_EVENT_PROBABILITY),
            EventDetectionModel::Loaded { name, detector } => {
                detector.detect(row).unwrap_or_else(|e| {
                    warn!(model = %name, "Event detection failed: {}", e);
                    false
                })
            }
        }
    }
}

/// The type stage's model.
pub enum TypeClassificationModel {
    /// No model loaded; predictions are [`DEFAULT_JUMP_TYPE`].
    Unloaded,
    Loaded {
        name: String,
        classifier: Box<dyn TypeClassifier>,
    },
}

impl TypeClassificationModel {
    pub fn name(&self) -> &str {
        match self {
            TypeClassificationModel::Unloaded => STUB_MODEL_NAME,
            TypeClassificationModel::Loaded { name, .. } => name,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, TypeClassificationModel::Loaded { .. })
    }

    /// Predict a jump type. A failing model yields the default label.
    pub fn predict(&self, row: &[f64]) -> JumpType {
        match self {
            TypeClassificationModel::Unloaded => DEFAULT_JUMP_TYPE,
            TypeClassificationModel::Loaded { name, classifier } => {
                classifier.classify(row).unwrap_or_else(|e| {
                    warn!(model = %name, "Type classification failed: {}", e);
                    DEFAULT_JUMP_TYPE
                })
            }
        }
    }
}

/// Shared access to the active models of both stages.
pub struct ClassifierPort {
    event_detection: RwLock<Arc<EventDetectionModel>>,
    type_classification: RwLock<Arc<TypeClassificationModel>>,
}

impl ClassifierPort {
    /// A port with neither stage loaded.
    pub fn new() -> Self {
        Self {
            event_detection: RwLock::new(Arc::new(EventDetectionModel::Unloaded)),
            type_classification: RwLock::new(Arc::new(TypeClassificationModel::Unloaded)),
        }
    }

    /// The event-detection model as of now.
    pub fn event_detector(&self) -> Arc<EventDetectionModel> {
        let guard = self
            .event_detection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// The type model as of now.
    pub fn type_classifier(&self) -> Arc<TypeClassificationModel> {
        let guard = self
            .type_classification
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Load an event-detection artifact and make it active. Returns the model name.
    pub fn load_event_detection_model(&self, path: &Path) -> Result<String, ClassifierError> {
        let detector = ModelArtifact::read(path)?.into_event_detector()?;
        let name = model_name(path);
        self.install_event_detector(name.clone(), detector);
        Ok(name)
    }

    /// Load a type-classification artifact and make it active. Returns the model name.
    pub fn load_type_classification_model(&self, path: &Path) -> Result<String, ClassifierError> {
        let classifier = ModelArtifact::read(path)?.into_type_classifier()?;
        let name = model_name(path);
        self.install_type_classifier(name.clone(), classifier);
        Ok(name)
    }

    /// Swap in an already-built event detector.
    pub fn install_event_detector(&self, name: String, detector: Box<dyn EventDetector>) {
        let model = Arc::new(EventDetectionModel::Loaded {
            name: name.clone(),
            detector,
        });
        let mut guard = self
            .event_detection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = model;
        info!(model = %name, "Event-detection model loaded");
    }

    /// Swap in an already-built type classifier.
    pub fn install_type_classifier(&self, name: String, classifier: Box<dyn TypeClassifier>) {
        let model = Arc::new(TypeClassificationModel::Loaded {
            name: name.clone(),
            classifier,
        });
        let mut guard = self
            .type_classification
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = model;
        info!(model = %name, "Type-classification model loaded");
    }

    /// Load the newest artifact of each stage, if any. Failures leave the stage unloaded.
    pub fn load_latest(&self, event_detection_dir: &Path, type_classification_dir: &Path) {
        if let Some(path) = latest_artifact(event_detection_dir) {
            if let Err(e) = self.load_event_detection_model(&path) {
                warn!("Could not load event-detection model {}: {}", path.display(), e);
            }
        }
        if let Some(path) = latest_artifact(type_classification_dir) {
            if let Err(e) = self.load_type_classification_model(&path) {
                warn!("Could not load type-classification model {}: {}", path.display(), e);
            }
        }
    }
}

impl Default for ClassifierPort {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest artifact file in `dir` by modification time.
pub fn latest_artifact(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|e| e == ARTIFACT_EXTENSION).unwrap_or(false))
        .filter_map(|p| {
            let modified = std::fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, p)| p)
}

fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::model::LogisticModel;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("motion-classifiers-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_unloaded_defaults() {
        let port = ClassifierPort::new();
        let detector = port.event_detector();
        assert!(!detector.is_loaded());
        assert_eq!(detector.name(), STUB_MODEL_NAME);

        let classifier = port.type_classifier();
        assert_eq!(classifier.predict(&[1.0, 2.0]), DEFAULT_JUMP_TYPE);
    }

    #[test]
    fn test_swap_keeps_in_flight_snapshot() {
        let port = ClassifierPort::new();
        port.install_event_detector(
            "always".to_string(),
            Box::new(LogisticModel {
                weights: vec![0.0],
                bias: 10.0,
                threshold: 0.5,
            }),
        );
        let in_flight = port.event_detector();

        port.install_event_detector(
            "never".to_string(),
            Box::new(LogisticModel {
                weights: vec![0.0],
                bias: -10.0,
                threshold: 0.5,
            }),
        );

        assert_eq!(in_flight.name(), "always");
        assert!(in_flight.predict(&[1.0]));
        assert_eq!(port.event_detector().name(), "never");
        assert!(!port.event_detector().predict(&[1.0]));
    }

    #[test]
    fn test_feature_length_mismatch_means_no_event() {
        let port = ClassifierPort::new();
        port.install_event_detector(
            "two".to_string(),
            Box::new(LogisticModel {
                weights: vec![1.0, 1.0],
                bias: 10.0,
                threshold: 0.5,
            }),
        );
        assert!(!port.event_detector().predict(&[1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_load_from_file_and_wrong_kind() {
        let dir = temp_dir();
        let path = dir.join("detector-v2.json");
        std::fs::write(&path, r#"{"kind":"logistic","weights":[1.0],"bias":0.0}"#).unwrap();

        let port = ClassifierPort::new();
        assert_eq!(port.load_event_detection_model(&path).unwrap(), "detector-v2");
        assert!(port.event_detector().is_loaded());

        // A logistic artifact is not a type classifier; the stage stays unloaded.
        assert!(port.load_type_classification_model(&path).is_err());
        assert!(!port.type_classifier().is_loaded());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_latest_artifact_ignores_other_files() {
        let dir = temp_dir();
        assert!(latest_artifact(&dir).is_none());

        std::fs::write(dir.join("notes.txt"), "ignore me").unwrap();
        std::fs::write(dir.join("model.json"), "{}").unwrap();
        assert_eq!(latest_artifact(&dir), Some(dir.join("model.json")));

        assert!(latest_artifact(&dir.join("missing")).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

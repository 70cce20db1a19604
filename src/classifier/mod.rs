//! Pluggable classifiers for the two analysis stages.

pub mod model;
pub mod port;

pub use model::{
    Centroid, ClassifierError, EventDetector, LogisticModel, ModelArtifact, NearestCentroidModel,
    TypeClassifier,
};
pub use port::{
    latest_artifact, ClassifierPort, EventDetectionModel, TypeClassificationModel, ARTIFACT_EXTENSION,
    DEFAULT_JUMP_TYPE, STUB_MODEL_NAME,
};

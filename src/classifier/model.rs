//! Loadable classifier artifacts.
//!
//! Artifacts are JSON documents tagged by `kind`. Their internals are opaque to
//! the rest of the crate; only [`EventDetector::detect`] and
//! [`TypeClassifier::classify`] are used.

use crate::model::JumpType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Predicts whether a feature row contains an event.
pub trait EventDetector: Send + Sync {
    fn detect(&self, row: &[f64]) -> Result<bool, ClassifierError>;
}

/// Predicts which jump a feature row shows.
pub trait TypeClassifier: Send + Sync {
    fn classify(&self, row: &[f64]) -> Result<JumpType, ClassifierError>;
}

/// Logistic event detector: `sigmoid(w·x + b) >= threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

impl LogisticModel {
    pub fn probability(&self, row: &[f64]) -> Result<f64, ClassifierError> {
        check_len(self.weights.len(), row.len())?;
        let z: f64 = self
            .weights
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

impl EventDetector for LogisticModel {
    fn detect(&self, row: &[f64]) -> Result<bool, ClassifierError> {
        Ok(self.probability(row)? >= self.threshold)
    }
}

/// One labelled centroid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Centroid {
    pub label: JumpType,
    pub center: Vec<f64>,
}

/// Nearest-centroid type classifier (Euclidean distance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestCentroidModel {
    pub centroids: Vec<Centroid>,
}

impl TypeClassifier for NearestCentroidModel {
    fn classify(&self, row: &[f64]) -> Result<JumpType, ClassifierError> {
        let mut best: Option<(f64, JumpType)> = None;
        for centroid in &self.centroids {
            check_len(centroid.center.len(), row.len())?;
            let distance: f64 = centroid
                .center
                .iter()
                .zip(row)
                .map(|(c, x)| (c - x).powi(2))
                .sum();
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, centroid.label));
            }
        }
        best.map(|(_, label)| label)
            .ok_or_else(|| ClassifierError::Invalid("model has no centroids".to_string()))
    }
}

/// On-disk artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Logistic(LogisticModel),
    NearestCentroid(NearestCentroidModel),
}

impl ModelArtifact {
    /// Read and parse an artifact file.
    pub fn read(path: &Path) -> Result<Self, ClassifierError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClassifierError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ClassifierError> {
        serde_json::from_str(content).map_err(|e| ClassifierError::Parse(e.to_string()))
    }

    /// Use this artifact as an event detector.
    pub fn into_event_detector(self) -> Result<Box<dyn EventDetector>, ClassifierError> {
        match self {
            ModelArtifact::Logistic(model) => {
                if model.weights.is_empty() {
                    return Err(ClassifierError::Invalid("logistic model has no weights".into()));
                }
                Ok(Box::new(model))
            }
            ModelArtifact::NearestCentroid(_) => Err(ClassifierError::WrongKind {
                expected: "logistic",
            }),
        }
    }

    /// Use this artifact as a type classifier.
    pub fn into_type_classifier(self) -> Result<Box<dyn TypeClassifier>, ClassifierError> {
        match self {
            ModelArtifact::NearestCentroid(model) => {
                if model.centroids.is_empty() {
                    return Err(ClassifierError::Invalid("model has no centroids".into()));
                }
                Ok(Box::new(model))
            }
            ModelArtifact::Logistic(_) => Err(ClassifierError::WrongKind {
                expected: "nearest_centroid",
            }),
        }
    }
}

fn check_len(expected: usize, actual: usize) -> Result<(), ClassifierError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ClassifierError::FeatureLength { expected, actual })
    }
}

/// Classifier loading and prediction errors.
#[derive(Debug)]
pub enum ClassifierError {
    Io(String),
    Parse(String),
    Invalid(String),
    WrongKind { expected: &'static str },
    FeatureLength { expected: usize, actual: usize },
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::Io(e) => write!(f, "IO error: {e}"),
            ClassifierError::Parse(e) => write!(f, "Parse error: {e}"),
            ClassifierError::Invalid(e) => write!(f, "Invalid model: {e}"),
            ClassifierError::WrongKind { expected } => {
                write!(f, "Wrong model kind, expected {expected}")
            }
            ClassifierError::FeatureLength { expected, actual } => {
                write!(f, "Feature row has {actual} values, model expects {expected}")
            }
        }
    }
}

impl std::error::Error for ClassifierError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logistic_detection() {
        let model = LogisticModel {
            weights: vec![1.0, -1.0],
            bias: 0.0,
            threshold: 0.5,
        };
        assert!(model.detect(&[2.0, 1.0]).unwrap());
        assert!(!model.detect(&[1.0, 2.0]).unwrap());
        assert!(matches!(
            model.detect(&[1.0]),
            Err(ClassifierError::FeatureLength {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_nearest_centroid() {
        let model = NearestCentroidModel {
            centroids: vec![
                Centroid {
                    label: JumpType::Axel,
                    center: vec![0.0, 0.0],
                },
                Centroid {
                    label: JumpType::Lutz,
                    center: vec![10.0, 10.0],
                },
            ],
        };
        assert_eq!(model.classify(&[1.0, 2.0]).unwrap(), JumpType::Axel);
        assert_eq!(model.classify(&[8.0, 9.0]).unwrap(), JumpType::Lutz);
    }

    #[test]
    fn test_parse_artifacts() {
        let logistic = ModelArtifact::parse(r#"{"kind":"logistic","weights":[0.5],"bias":1.0}"#)
            .unwrap();
        assert!(logistic.clone().into_event_detector().is_ok());
        assert!(matches!(
            logistic.into_type_classifier(),
            Err(ClassifierError::WrongKind { .. })
        ));

        let centroid = ModelArtifact::parse(
            r#"{"kind":"nearest_centroid","centroids":[{"label":"toe_loop","center":[1.0]}]}"#,
        )
        .unwrap();
        let classifier = centroid.into_type_classifier().unwrap();
        assert_eq!(classifier.classify(&[3.0]).unwrap(), JumpType::ToeLoop);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ModelArtifact::parse("not json"),
            Err(ClassifierError::Parse(_))
        ));
        assert!(ModelArtifact::parse(r#"{"kind":"forest"}"#).is_err());
    }
}

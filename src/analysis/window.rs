//! Decides when a placement has enough readings to run each analysis stage.
//!
//! The event-detection stage runs periodically once its window is full. The
//! type stage is only consulted after event detection said yes in the same
//! ingestion step, so by default it fires on every reading past its minimum.

use crate::config::{AnalysisConfig, ConfigError};

/// The two analysis stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EventDetection,
    TypeClassification,
}

/// Pure trigger rules for both stages.
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    bool_window_size: usize,
    bool_interval: usize,
    type_window_size: usize,
    type_interval: usize,
    type_periodic_gate: bool,
}

impl WindowPolicy {
    /// Build a policy, rejecting zero sizes or intervals up front.
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bool_window_size: config.bool_window_size,
            bool_interval: config.bool_interval,
            type_window_size: config.type_window_size,
            type_interval: config.type_interval,
            type_periodic_gate: config.type_periodic_gate,
        })
    }

    /// Whether `stage` should run now that a placement holds `reading_count` readings.
    pub fn should_fire(&self, stage: Stage, reading_count: usize) -> bool {
        match stage {
            Stage::EventDetection => {
                reading_count >= self.bool_window_size && reading_count % self.bool_interval == 0
            }
            Stage::TypeClassification => {
                reading_count >= self.type_window_size
                    && (!self.type_periodic_gate || reading_count % self.type_interval == 0)
            }
        }
    }

    /// Number of readings a stage's window takes.
    pub fn window_size(&self, stage: Stage) -> usize {
        match stage {
            Stage::EventDetection => self.bool_window_size,
            Stage::TypeClassification => self.type_window_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(bool_window: usize, bool_interval: usize) -> WindowPolicy {
        WindowPolicy::new(&AnalysisConfig {
            bool_window_size: bool_window,
            bool_interval,
            ..AnalysisConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_event_detection_fires_only_on_interval_past_window() {
        let policy = policy(150, 75);
        let fired: Vec<usize> = (1..=400)
            .filter(|&n| policy.should_fire(Stage::EventDetection, n))
            .collect();
        assert_eq!(fired, vec![150, 225, 300, 375]);
    }

    #[test]
    fn test_event_detection_matches_rule_for_all_counts() {
        for (window, interval) in [(1, 1), (10, 3), (7, 7), (50, 25), (12, 5)] {
            let policy = policy(window, interval);
            for n in 0..500 {
                let expected = n >= window && n % interval == 0;
                assert_eq!(
                    policy.should_fire(Stage::EventDetection, n),
                    expected,
                    "window={window} interval={interval} n={n}"
                );
            }
        }
    }

    #[test]
    fn test_type_stage_fires_every_reading_past_minimum() {
        let policy = WindowPolicy::new(&AnalysisConfig {
            type_window_size: 20,
            type_interval: 5,
            ..AnalysisConfig::default()
        })
        .unwrap();
        assert!(!policy.should_fire(Stage::TypeClassification, 19));
        assert!(policy.should_fire(Stage::TypeClassification, 20));
        assert!(policy.should_fire(Stage::TypeClassification, 21));
        assert!(policy.should_fire(Stage::TypeClassification, 23));
    }

    #[test]
    fn test_type_stage_periodic_gate() {
        let policy = WindowPolicy::new(&AnalysisConfig {
            type_window_size: 20,
            type_interval: 5,
            type_periodic_gate: true,
            ..AnalysisConfig::default()
        })
        .unwrap();
        assert!(policy.should_fire(Stage::TypeClassification, 20));
        assert!(!policy.should_fire(Stage::TypeClassification, 21));
        assert!(policy.should_fire(Stage::TypeClassification, 25));
        assert!(!policy.should_fire(Stage::TypeClassification, 15));
    }

    #[test]
    fn test_zero_interval_rejected_at_construction() {
        let result = WindowPolicy::new(&AnalysisConfig {
            bool_interval: 0,
            ..AnalysisConfig::default()
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidAnalysis {
                field: "bool_interval",
                ..
            })
        ));
    }

    #[test]
    fn test_window_size_per_stage() {
        let policy = WindowPolicy::new(&AnalysisConfig {
            bool_window_size: 30,
            type_window_size: 60,
            bool_interval: 10,
            ..AnalysisConfig::default()
        })
        .unwrap();
        assert_eq!(policy.window_size(Stage::EventDetection), 30);
        assert_eq!(policy.window_size(Stage::TypeClassification), 60);
    }
}

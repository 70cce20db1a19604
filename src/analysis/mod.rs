//! Windowed two-stage analysis: trigger rules, feature rows and the pipeline.

pub mod features;
pub mod pipeline;
pub mod window;

pub use features::{anchor_index, FeatureBuilder, FeatureRow};
pub use pipeline::{Analyzer, Detection, DetectionOutcome};
pub use window::{Stage, WindowPolicy};

//! Athlete Motion Agent - real-time jump detection for wearable motion sensors.
//!
//! This library ingests accelerometer, gyroscope and magnetometer readings
//! streamed per recording session and decides, as readings arrive, whether a
//! jump occurred and which one.
//!
//! # Pipeline
//!
//! - **No reordering**: a placement's readings are kept in arrival order
//! - **Idempotent ingestion**: a reading re-delivered at a known timestamp is ignored
//! - **Two stages**: event detection on a flat window, then type classification
//!   on a centered, aggregated window
//! - **No lost events**: an event finishing after its session closed is
//!   appended to the stored session
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Athlete Motion Agent                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐           │
//! │  │  Session    │──▶│ WindowPolicy │──▶│   Analyzer   │           │
//! │  │  Lifecycle  │   │ (per sensor) │   │ (2 stages)   │           │
//! │  └─────────────┘   └──────────────┘   └──────────────┘           │
//! │         │                                    │                   │
//! │         ▼                                    ▼                   │
//! │  ┌─────────────┐                     ┌──────────────┐            │
//! │  │SessionStore │◀────────────────────│EventRegistry │            │
//! │  │  (JSON)     │                     │              │            │
//! │  └─────────────┘                     └──────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use athlete_motion_agent::{ClassifierPort, MemoryStore, MotionEngine};
//! use athlete_motion_agent::config::AnalysisConfig;
//! use athlete_motion_agent::stats::IngestStats;
//! use std::sync::Arc;
//!
//! let engine = MotionEngine::new(
//!     &AnalysisConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(ClassifierPort::new()),
//!     Arc::new(IngestStats::new()),
//! )
//! .expect("valid analysis configuration");
//!
//! // Frames from clients go to engine.handle(..); results arrive on engine.subscribe().
//! ```

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod events;
pub mod model;
pub mod persistence;
pub mod protocol;
pub mod session;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use analysis::{Analyzer, FeatureBuilder, Stage, WindowPolicy};
pub use classifier::{ClassifierError, ClassifierPort};
pub use config::{Aggregation, AnalysisConfig, Config, ConfigError};
pub use engine::MotionEngine;
pub use events::{EventRegistry, RecordOutcome};
pub use model::{Event, EventType, JumpType, Location, Reading, Session, SensorPlacement, Sport};
pub use persistence::{JsonFileStore, MemoryStore, SessionStore, StoreError};
pub use protocol::{InboundMessage, OutboundMessage};
pub use session::{IngestOutcome, SessionLifecycle, SessionState};
pub use stats::{IngestStats, SharedStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

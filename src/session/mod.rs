//! Recording sessions: reading accumulation and the session state machine.

pub mod lifecycle;
pub mod readings;

pub use lifecycle::{
    DropReason, EndOutcome, IngestOutcome, PendingAnalysis, PlacementSpec, SessionLifecycle,
    SessionStart, SessionState,
};
pub use readings::{Append, ReadingStore, Sample};

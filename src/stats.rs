//! Ingestion statistics.
//!
//! Counts what happened to every reading and event so dropped or recovered
//! work stays visible even though the ingestion path never fails outward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters for one agent process.
#[derive(Debug)]
pub struct IngestStats {
    /// Readings appended to a placement
    readings_accepted: AtomicU64,
    /// Readings ignored because their timestamp was already stored
    readings_duplicate: AtomicU64,
    /// Readings for an unknown or inactive session, or an unknown sensor
    readings_dropped: AtomicU64,
    /// Event-detection windows evaluated
    detection_windows: AtomicU64,
    /// Events attached to a still-active session
    events_in_session: AtomicU64,
    /// Events persisted directly because their session had closed
    events_standalone: AtomicU64,
    /// Events whose session could not be found anywhere
    events_lost: AtomicU64,
    /// Process start time
    started: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            readings_accepted: AtomicU64::new(0),
            readings_duplicate: AtomicU64::new(0),
            readings_dropped: AtomicU64::new(0),
            detection_windows: AtomicU64::new(0),
            events_in_session: AtomicU64::new(0),
            events_standalone: AtomicU64::new(0),
            events_lost: AtomicU64::new(0),
            started: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that are saved to, and resumed from, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous ingestion stats: {}", e);
        }

        stats
    }

    pub fn record_reading_accepted(&self) {
        self.readings_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading_duplicate(&self) {
        self.readings_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reading_dropped(&self) {
        self.readings_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection_window(&self) {
        self.detection_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_in_session(&self) {
        self.events_in_session.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_standalone(&self) {
        self.events_standalone.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_lost(&self) {
        self.events_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            readings_accepted: self.readings_accepted.load(Ordering::Relaxed),
            readings_duplicate: self.readings_duplicate.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
            detection_windows: self.detection_windows.load(Ordering::Relaxed),
            events_in_session: self.events_in_session.load(Ordering::Relaxed),
            events_standalone: self.events_standalone.load(Ordering::Relaxed),
            events_lost: self.events_lost.load(Ordering::Relaxed),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Ingestion Statistics:\n\
             - Readings accepted: {}\n\
             - Duplicate readings ignored: {}\n\
             - Readings dropped: {}\n\
             - Detection windows evaluated: {}\n\
             - Events recorded in session: {}\n\
             - Events persisted after session close: {}\n\
             - Events lost: {}\n\
             - Uptime: {} seconds",
            s.readings_accepted,
            s.readings_duplicate,
            s.readings_dropped,
            s.detection_windows,
            s.events_in_session,
            s.events_standalone,
            s.events_lost,
            s.uptime_secs
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let s = self.snapshot();
            let persisted = PersistedStats {
                readings_accepted: s.readings_accepted,
                readings_duplicate: s.readings_duplicate,
                readings_dropped: s.readings_dropped,
                detection_windows: s.detection_windows,
                events_in_session: s.events_in_session,
                events_standalone: s.events_standalone,
                events_lost: s.events_lost,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.readings_accepted
                    .store(persisted.readings_accepted, Ordering::Relaxed);
                self.readings_duplicate
                    .store(persisted.readings_duplicate, Ordering::Relaxed);
                self.readings_dropped
                    .store(persisted.readings_dropped, Ordering::Relaxed);
                self.detection_windows
                    .store(persisted.detection_windows, Ordering::Relaxed);
                self.events_in_session
                    .store(persisted.events_in_session, Ordering::Relaxed);
                self.events_standalone
                    .store(persisted.events_standalone, Ordering::Relaxed);
                self.events_lost
                    .store(persisted.events_lost, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub readings_accepted: u64,
    pub readings_duplicate: u64,
    pub readings_dropped: u64,
    pub detection_windows: u64,
    pub events_in_session: u64,
    pub events_standalone: u64,
    pub events_lost: u64,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub readings_accepted: u64,
    pub readings_duplicate: u64,
    pub readings_dropped: u64,
    pub detection_windows: u64,
    pub events_in_session: u64,
    pub events_standalone: u64,
    pub events_lost: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<IngestStats>;

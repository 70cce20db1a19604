//! Recording session state machine and the active-session registry.
//!
//! ```text
//!  start ──▶ Created ──(registered)──▶ Active ──end──▶ Closed (persisted, evicted)
//! ```
//!
//! The registry maps session ids to per-session state behind its own mutex.
//! The registry lock is only held long enough to clone a handle, so different
//! sessions never contend, while ingestion and window evaluation for one
//! session are serialized by that session's mutex.

use crate::analysis::window::{Stage, WindowPolicy};
use crate::model::{Event, Location, Reading, Session, Sport, Timestamp};
use crate::persistence::{SessionStore, StoreError};
use crate::session::readings::{Append, ReadingStore, Sample};
use crate::stats::SharedStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built but not yet registered
    Created,
    /// Registered and accepting readings
    Active,
    /// End recorded; no longer accepting readings
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => f.write_str("created"),
            SessionState::Active => f.write_str("active"),
            SessionState::Closed => f.write_str("closed"),
        }
    }
}

/// A placement declared when a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementSpec {
    pub sensor: String,
    pub location: Location,
}

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    pub id: Uuid,
    pub athlete: Uuid,
    pub sport: Sport,
    pub start: Timestamp,
    pub placements: Vec<PlacementSpec>,
}

/// In-memory state of a registered session.
#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub(crate) id: Uuid,
    pub(crate) athlete: Uuid,
    pub(crate) sport: Sport,
    pub(crate) start: Timestamp,
    pub(crate) end: Option<Timestamp>,
    pub(crate) state: SessionState,
    pub(crate) readings: ReadingStore,
    pub(crate) events: Vec<Event>,
}

impl ActiveSession {
    fn new(start: &SessionStart) -> Self {
        let mut readings = ReadingStore::new(start.id);
        for placement in &start.placements {
            if readings
                .add_placement(placement.sensor.clone(), placement.location)
                .is_none()
            {
                warn!(session = %start.id, sensor = %placement.sensor, "Duplicate sensor in session start");
            }
        }
        Self {
            id: start.id,
            athlete: start.athlete,
            sport: start.sport,
            start: start.start,
            end: None,
            state: SessionState::Created,
            readings,
            events: Vec::new(),
        }
    }

    pub(crate) fn to_record(&self) -> Session {
        Session {
            id: self.id,
            athlete: self.athlete,
            sport: self.sport,
            start: self.start,
            end: self.end,
            placements: self.readings.to_placements(),
            events: self.events.clone(),
        }
    }
}

pub(crate) type SessionHandle = Arc<Mutex<ActiveSession>>;

pub(crate) fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, ActiveSession> {
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Windows captured when the event-detection stage fired.
///
/// Both windows are copied under the session lock at the same moment, so
/// later readings never leak into an evaluation that has already fired.
#[derive(Debug, Clone)]
pub struct PendingAnalysis {
    pub session: Uuid,
    pub athlete: Uuid,
    pub sensor: String,
    /// Placement reading count that triggered the evaluation
    pub count: usize,
    pub detection_window: Vec<Reading>,
    /// Present when the type stage was also ready
    pub type_window: Option<Vec<Reading>>,
}

/// Why a reading was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownSession,
    NotActive,
    UnknownSensor,
}

/// Result of ingesting one reading.
#[derive(Debug)]
pub enum IngestOutcome {
    Dropped(DropReason),
    Duplicate,
    Stored {
        count: usize,
        analysis: Option<PendingAnalysis>,
    },
}

impl IngestOutcome {
    pub fn into_analysis(self) -> Option<PendingAnalysis> {
        match self {
            IngestOutcome::Stored { analysis, .. } => analysis,
            _ => None,
        }
    }
}

/// Result of ending a session.
#[derive(Debug)]
pub enum EndOutcome {
    /// Closed and evicted; the record is what was persisted
    Closed(Session),
    UnknownSession,
    NotActive(SessionState),
    /// The store rejected the record; the session stays active and registered
    PersistFailed(StoreError),
}

/// Owns the active sessions of one agent.
pub struct SessionLifecycle {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    policy: WindowPolicy,
    store: Arc<dyn SessionStore>,
    stats: SharedStats,
}

impl SessionLifecycle {
    pub fn new(policy: WindowPolicy, store: Arc<dyn SessionStore>, stats: SharedStats) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
            store,
            stats,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    /// Register a new session. Returns false if the id is already active.
    pub fn start(&self, start: SessionStart) -> bool {
        let mut session = ActiveSession::new(&start);

        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sessions.contains_key(&start.id) {
            warn!(session = %start.id, "Session already active, ignoring start");
            return false;
        }
        session.state = SessionState::Active;
        sessions.insert(start.id, Arc::new(Mutex::new(session)));

        info!(
            session = %start.id,
            athlete = %start.athlete,
            placements = start.placements.len(),
            "Session started"
        );
        true
    }

    /// Add a placement to an active session after it started.
    pub fn register_placement(&self, id: Uuid, sensor: &str, location: Location) -> bool {
        let Some(handle) = self.lookup(id) else {
            debug!(session = %id, "Placement for unknown session dropped");
            return false;
        };
        let mut session = lock_session(&handle);
        if session.state != SessionState::Active {
            return false;
        }
        session.readings.add_placement(sensor, location).is_some()
    }

    /// Store a reading and evaluate the window policy for its placement.
    pub fn ingest(&self, id: Uuid, sensor: &str, sample: Sample) -> IngestOutcome {
        let Some(handle) = self.lookup(id) else {
            self.stats.record_reading_dropped();
            debug!(session = %id, "Reading for unknown session dropped");
            return IngestOutcome::Dropped(DropReason::UnknownSession);
        };

        let mut session = lock_session(&handle);
        if session.state != SessionState::Active {
            self.stats.record_reading_dropped();
            debug!(session = %id, state = %session.state, "Reading for inactive session dropped");
            return IngestOutcome::Dropped(DropReason::NotActive);
        }

        let timestamp = sample.timestamp;
        let count = match session.readings.append(sensor, sample) {
            Append::Stored { count } => count,
            Append::Duplicate => {
                self.stats.record_reading_duplicate();
                debug!(session = %id, sensor, timestamp, "Duplicate reading ignored");
                return IngestOutcome::Duplicate;
            }
            Append::UnknownSensor => {
                self.stats.record_reading_dropped();
                debug!(session = %id, sensor, "Reading for unknown sensor dropped");
                return IngestOutcome::Dropped(DropReason::UnknownSensor);
            }
        };
        self.stats.record_reading_accepted();

        let analysis = if self.policy.should_fire(Stage::EventDetection, count) {
            self.stats.record_detection_window();
            let detection_window = session
                .readings
                .last_n(sensor, self.policy.window_size(Stage::EventDetection));
            let type_window = self
                .policy
                .should_fire(Stage::TypeClassification, count)
                .then(|| {
                    session
                        .readings
                        .last_n(sensor, self.policy.window_size(Stage::TypeClassification))
                });
            Some(PendingAnalysis {
                session: session.id,
                athlete: session.athlete,
                sensor: sensor.to_string(),
                count,
                detection_window,
                type_window,
            })
        } else {
            None
        };

        IngestOutcome::Stored { count, analysis }
    }

    /// Close an active session: record its end, persist it, evict it.
    ///
    /// A session is only evicted once its record is stored. If persisting
    /// fails the session is reopened so a later `end` can retry.
    pub fn end(&self, id: Uuid, end: Timestamp) -> EndOutcome {
        let Some(handle) = self.lookup(id) else {
            debug!(session = %id, "End for unknown session ignored");
            return EndOutcome::UnknownSession;
        };

        let record = {
            let mut session = lock_session(&handle);
            if session.state != SessionState::Active {
                return EndOutcome::NotActive(session.state);
            }
            session.end = Some(end);
            session.state = SessionState::Closed;

            // Persist before releasing the lock: an event that finds the
            // session closed must also find it in the store.
            let record = session.to_record();
            if let Err(e) = self.store.persist(&record) {
                error!(session = %id, "Failed to persist closed session: {}", e);
                session.end = None;
                session.state = SessionState::Active;
                return EndOutcome::PersistFailed(e);
            }
            record
        };

        self.evict(id, &handle);
        info!(
            session = %id,
            readings = record.reading_count(),
            events = record.events.len(),
            "Session ended"
        );
        EndOutcome::Closed(record)
    }

    /// Persist and evict every active session, leaving their end unset.
    ///
    /// Sessions the store rejects stay registered.
    pub fn shutdown(&self) -> usize {
        let handles: Vec<(Uuid, SessionHandle)> = {
            let sessions = self
                .sessions
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            sessions.iter().map(|(id, h)| (*id, Arc::clone(h))).collect()
        };

        let mut closed = 0;
        for (id, handle) in handles {
            {
                let mut session = lock_session(&handle);
                if session.state == SessionState::Active {
                    session.state = SessionState::Closed;
                    if let Err(e) = self.store.persist(&session.to_record()) {
                        error!(session = %id, "Failed to persist session on shutdown: {}", e);
                        session.state = SessionState::Active;
                        continue;
                    }
                    closed += 1;
                }
            }
            self.evict(id, &handle);
        }

        info!(sessions = closed, "Session registry shut down");
        closed
    }

    /// Whether a session is currently registered.
    pub fn is_active(&self, id: Uuid) -> bool {
        self.lookup(id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Current record of an active session.
    pub fn snapshot(&self, id: Uuid) -> Option<Session> {
        self.lookup(id).map(|h| lock_session(&h).to_record())
    }

    /// Records of every active session of one athlete.
    pub fn active_sessions_for(&self, athlete: Uuid) -> Vec<Session> {
        let handles: Vec<SessionHandle> = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        handles
            .iter()
            .map(lock_session)
            .filter(|s| s.athlete == athlete)
            .map(|s| s.to_record())
            .collect()
    }

    pub(crate) fn lookup(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    fn evict(&self, id: Uuid, handle: &SessionHandle) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sessions.get(&id).is_some_and(|h| Arc::ptr_eq(h, handle)) {
            sessions.remove(&id);
        }
    }
}

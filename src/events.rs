//! Recording detected events against their owning session.
//!
//! Classification can finish after its session has ended. The registry looks
//! the session up at the moment the event is ready:
//!
//! - still active: the event joins the in-memory session and is persisted
//!   with it on close
//! - closed: the session is already durable (it is persisted before it is
//!   marked closed), so the event is appended to the stored record directly
//!
//! Only a session that never reached the store loses its event, and that is
//! counted and logged.

use crate::model::Event;
use crate::session::lifecycle::{lock_session, SessionLifecycle, SessionState};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where an event ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended to the active session
    Attached,
    /// Appended to the durable record of a closed session
    PersistedStandalone,
    /// No trace of the session anywhere
    Lost,
}

pub struct EventRegistry {
    lifecycle: Arc<SessionLifecycle>,
}

impl EventRegistry {
    pub fn new(lifecycle: Arc<SessionLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub fn record(&self, event: &Event) -> RecordOutcome {
        if let Some(handle) = self.lifecycle.lookup(event.session) {
            let mut session = lock_session(&handle);
            if session.state == SessionState::Active {
                session.events.push(event.clone());
                self.lifecycle.stats().record_event_in_session();
                debug!(session = %event.session, event = %event.id, "Event attached to active session");
                return RecordOutcome::Attached;
            }
        }
        self.persist_standalone(event)
    }

    fn persist_standalone(&self, event: &Event) -> RecordOutcome {
        let store = self.lifecycle.store();
        let stats = self.lifecycle.stats();

        match store.load(event.session) {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(session = %event.session, event = %event.id, "Event for unknown session discarded");
                stats.record_event_lost();
                return RecordOutcome::Lost;
            }
            Err(e) => {
                error!(session = %event.session, "Failed to load session for event: {}", e);
                stats.record_event_lost();
                return RecordOutcome::Lost;
            }
        }

        match store.persist_event(event.session, event) {
            Ok(()) => {
                stats.record_event_standalone();
                info!(
                    session = %event.session,
                    event = %event.id,
                    "Event persisted after session closed"
                );
                RecordOutcome::PersistedStandalone
            }
            Err(e) => {
                error!(session = %event.session, "Failed to persist event: {}", e);
                stats.record_event_lost();
                RecordOutcome::Lost
            }
        }
    }
}

//! Durable storage for closed sessions and their events.
//!
//! [`SessionStore`] is the boundary to whatever keeps sessions after they
//! leave memory. [`JsonFileStore`] keeps one pretty-printed JSON document per
//! session; [`MemoryStore`] keeps them in a map and is used by tests.

use crate::model::{Event, Session};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Persistence collaborator.
pub trait SessionStore: Send + Sync {
    /// Fetch a stored session; `Ok(None)` when it was never persisted.
    fn load(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Insert or replace a session with all its placements, readings and events.
    fn persist(&self, session: &Session) -> Result<(), StoreError>;

    /// Append one event to an already stored session.
    fn persist_event(&self, session_id: Uuid, event: &Event) -> Result<(), StoreError>;

    /// All stored sessions of one athlete, oldest start first.
    fn find_sessions_by_athlete(&self, athlete: Uuid) -> Result<Vec<Session>, StoreError>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions().get(&id).cloned())
    }

    fn persist(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions().insert(session.id, session.clone());
        Ok(())
    }

    fn persist_event(&self, session_id: Uuid, event: &Event) -> Result<(), StoreError> {
        let mut sessions = self.sessions();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::NotFound(session_id))?;
        upsert_event(session, event);
        Ok(())
    }

    fn find_sessions_by_athlete(&self, athlete: Uuid) -> Result<Vec<Session>, StoreError> {
        let mut found: Vec<Session> = self
            .sessions()
            .values()
            .filter(|s| s.athlete == athlete)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.start);
        Ok(found)
    }
}

/// One JSON file per session under a directory.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-modify-write of session files.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read_file(path: &Path) -> Result<Session, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn write_file(&self, session: &Session) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.session_path(session.id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::Io(e.to_string()))
    }
}

impl SessionStore for JsonFileStore {
    fn load(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    fn persist(&self, session: &Session) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.write_file(session)
    }

    fn persist_event(&self, session_id: Uuid, event: &Event) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let path = self.session_path(session_id);
        if !path.exists() {
            return Err(StoreError::NotFound(session_id));
        }
        let mut session = Self::read_file(&path)?;
        upsert_event(&mut session, event);
        self.write_file(&session)
    }

    fn find_sessions_by_athlete(&self, athlete: Uuid) -> Result<Vec<Session>, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut found = Vec::new();
        for path in entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        {
            match Self::read_file(&path) {
                Ok(session) if session.athlete == athlete => found.push(session),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable session file {:?}: {}", path, e),
            }
        }
        found.sort_by_key(|s| s.start);
        Ok(found)
    }
}

/// Re-delivered events replace the stored copy instead of duplicating it.
fn upsert_event(session: &mut Session, event: &Event) {
    match session.events.iter_mut().find(|e| e.id == event.id) {
        Some(existing) => *existing = event.clone(),
        None => session.events.push(event.clone()),
    }
}

/// Persistence errors.
#[derive(Debug)]
pub enum StoreError {
    NotFound(Uuid),
    Io(String),
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Session {id} not found"),
            StoreError::Io(e) => write!(f, "IO error: {e}"),
            StoreError::Serialization(e) => write!(f, "Serialization error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

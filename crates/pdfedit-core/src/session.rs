//! Editing sessions
//!
//! A session ties an uploaded document to the edits made against it. The
//! store hands out per-session locks so that work on one document never waits
//! on another.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::PdfEditError;
use crate::ledger::EditLedger;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub filename: String,
    pub source_path: PathBuf,
    pub ledger: EditLedger,
    pub created_at: Instant,
}

impl Session {
    fn new(id: SessionId, filename: String, source_path: PathBuf) -> Self {
        Self {
            id,
            filename,
            source_path,
            ledger: EditLedger::new(),
            created_at: Instant::now(),
        }
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub filename: String,
    pub source_path: PathBuf,
    pub edit_count: usize,
}

impl From<&Session> for SessionInfo {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.clone(),
            filename: s.filename.clone(),
            source_path: s.source_path.clone(),
            edit_count: s.ledger.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Idle time after which a session is dropped.
    pub ttl: Duration,
    /// Maximum number of live sessions; the least recently used one goes first.
    pub capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            capacity: 1000,
        }
    }
}

/// Result of creating a session.
#[derive(Debug)]
pub struct Admission {
    pub id: SessionId,
    /// Sessions removed to make room; their files belong to the caller.
    pub evicted: Vec<Session>,
}

pub trait SessionStore: Send + Sync {
    /// Register a session under a caller-chosen id, replacing any session
    /// that already has it.
    fn insert(&self, id: SessionId, filename: String, source_path: PathBuf) -> Admission;

    fn create(&self, filename: String, source_path: PathBuf) -> Admission {
        self.insert(SessionId::generate(), filename, source_path)
    }

    fn get(&self, id: &SessionId) -> Result<SessionInfo, PdfEditError>;

    /// Run `f` while holding the session's lock.
    fn with_lock<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, PdfEditError>;

    fn remove(&self, id: &SessionId) -> Option<Session>;

    /// Remove idle sessions, including those already found expired by a
    /// lookup since the last call. Their files belong to the caller.
    fn evict_expired(&self) -> Vec<Session>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Table entry. The access time has its own lock so that sweeping the table
/// never waits on a session that is busy committing.
struct Entry {
    session: Mutex<Session>,
    touched: Mutex<Instant>,
}

type Slot = Arc<Entry>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Entry {
    fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            touched: Mutex::new(Instant::now()),
        }
    }

    fn touched(&self) -> Instant {
        *lock(&self.touched)
    }

    fn touch(&self) {
        *lock(&self.touched) = Instant::now();
    }

    fn idle(&self) -> Duration {
        self.touched().elapsed()
    }
}

/// Take the session out of a slot that is no longer in the table.
fn into_session(slot: Slot) -> Session {
    match Arc::try_unwrap(slot) {
        Ok(entry) => entry
            .session
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner),
        // Someone still holds a clone; hand back a detached copy.
        Err(shared) => {
            let s = lock(&shared.session);
            Session {
                id: s.id.clone(),
                filename: s.filename.clone(),
                source_path: s.source_path.clone(),
                ledger: s.ledger.clone(),
                created_at: s.created_at,
            }
        }
    }
}

pub struct MemorySessionStore {
    config: SessionConfig,
    sessions: RwLock<HashMap<SessionId, Slot>>,
    /// Sessions dropped on lookup, waiting for the next `evict_expired`.
    retired: Mutex<Vec<Session>>,
}

impl MemorySessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    fn slot(&self, id: &SessionId) -> Result<Slot, PdfEditError> {
        let slot = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PdfEditError::SessionNotFound(id.to_string()))?;

        if slot.idle() > self.config.ttl {
            tracing::info!(session_id = %id, "session expired");
            if let Some(session) = self.remove(id) {
                lock(&self.retired).push(session);
            }
            return Err(PdfEditError::SessionExpired(id.to_string()));
        }
        Ok(slot)
    }

    fn drain_expired(&self, table: &mut HashMap<SessionId, Slot>) -> Vec<Session> {
        let ttl = self.config.ttl;
        let expired: Vec<SessionId> = table
            .iter()
            .filter(|(_, slot)| slot.idle() > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| table.remove(&id))
            .map(into_session)
            .collect()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, id: SessionId, filename: String, source_path: PathBuf) -> Admission {
        let mut table = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut evicted = std::mem::take(&mut *lock(&self.retired));
        evicted.extend(self.drain_expired(&mut table));
        evicted.extend(table.remove(&id).map(into_session));
        while !table.is_empty() && table.len() >= self.config.capacity {
            let oldest = table
                .iter()
                .min_by_key(|(_, slot)| slot.touched())
                .map(|(id, _)| id.clone());
            match oldest.and_then(|id| table.remove(&id)) {
                Some(slot) => evicted.push(into_session(slot)),
                None => break,
            }
        }
        for session in &evicted {
            tracing::info!(session_id = %session.id, "session evicted");
        }

        let session = Session::new(id.clone(), filename, source_path);
        table.insert(id.clone(), Arc::new(Entry::new(session)));
        Admission { id, evicted }
    }

    fn get(&self, id: &SessionId) -> Result<SessionInfo, PdfEditError> {
        let slot = self.slot(id)?;
        slot.touch();
        let session = lock(&slot.session);
        Ok(SessionInfo::from(&*session))
    }

    fn with_lock<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, PdfEditError> {
        let slot = self.slot(id)?;
        slot.touch();
        let mut session = lock(&slot.session);
        let result = f(&mut session);
        drop(session);
        slot.touch();
        Ok(result)
    }

    fn remove(&self, id: &SessionId) -> Option<Session> {
        let slot = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;
        Some(into_session(slot))
    }

    fn evict_expired(&self) -> Vec<Session> {
        let mut table = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut expired = std::mem::take(&mut *lock(&self.retired));
        expired.extend(self.drain_expired(&mut table));
        drop(table);
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired sessions removed");
        }
        expired
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BBox, Edit, RunSnapshot};
    use std::thread;

    fn store(ttl: Duration, capacity: usize) -> MemorySessionStore {
        MemorySessionStore::new(SessionConfig { ttl, capacity })
    }

    fn edit(x: f64, text: &str) -> Edit {
        Edit::new(
            BBox::new(x, 0.0, x + 10.0, 10.0).unwrap(),
            text,
            RunSnapshot::default(),
        )
    }

    #[test]
    fn test_create_and_get() {
        let store = MemorySessionStore::default();
        let admission = store.create("doc.pdf".into(), PathBuf::from("/tmp/a_doc.pdf"));
        assert!(admission.evicted.is_empty());
        assert_eq!(store.len(), 1);

        let info = store.get(&admission.id).unwrap();
        assert_eq!(info.filename, "doc.pdf");
        assert_eq!(info.source_path, PathBuf::from("/tmp/a_doc.pdf"));
        assert_eq!(info.edit_count, 0);
        assert!(uuid::Uuid::parse_str(admission.id.as_str()).is_ok());
    }

    #[test]
    fn test_insert_with_chosen_id() {
        let store = MemorySessionStore::default();
        let id = SessionId::generate();
        let admission = store.insert(id.clone(), "a.pdf".into(), PathBuf::from("a"));
        assert_eq!(admission.id, id);

        let again = store.insert(id.clone(), "b.pdf".into(), PathBuf::from("b"));
        assert_eq!(again.evicted.len(), 1);
        assert_eq!(again.evicted[0].filename, "a.pdf");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap().filename, "b.pdf");
    }

    #[test]
    fn test_unknown_session() {
        let store = MemorySessionStore::default();
        let id = SessionId::from("nope");
        assert!(matches!(
            store.get(&id),
            Err(PdfEditError::SessionNotFound(s)) if s == "nope"
        ));
        assert!(store.with_lock(&id, |_| ()).is_err());
        assert!(store.remove(&id).is_none());
    }

    #[test]
    fn test_with_lock_mutates_ledger() {
        let store = MemorySessionStore::default();
        let id = store.create("a.pdf".into(), PathBuf::new()).id;

        let count = store
            .with_lock(&id, |s| {
                s.ledger.upsert(edit(0.0, "one"));
                s.ledger.upsert(edit(20.0, "two"))
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.get(&id).unwrap().edit_count, 2);
    }

    #[test]
    fn test_expired_session_is_reported_and_removed() {
        let store = store(Duration::from_millis(10), 10);
        let id = store.create("a.pdf".into(), PathBuf::new()).id;
        thread::sleep(Duration::from_millis(30));

        assert!(matches!(
            store.get(&id),
            Err(PdfEditError::SessionExpired(_))
        ));
        assert_eq!(store.len(), 0);
        assert!(matches!(
            store.get(&id),
            Err(PdfEditError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_session_expired_on_lookup_is_handed_to_next_sweep() {
        let store = store(Duration::from_millis(10), 10);
        let id = store.create("a.pdf".into(), PathBuf::from("uploads/a.pdf")).id;
        thread::sleep(Duration::from_millis(30));

        assert!(store.with_lock(&id, |_| ()).is_err());
        assert_eq!(store.len(), 0);

        let swept = store.evict_expired();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, id);
        assert_eq!(swept[0].source_path, PathBuf::from("uploads/a.pdf"));
        assert!(store.evict_expired().is_empty());
    }

    #[test]
    fn test_evict_expired_returns_sessions() {
        let store = store(Duration::from_millis(10), 10);
        store.create("a.pdf".into(), PathBuf::from("a"));
        store.create("b.pdf".into(), PathBuf::from("b"));
        thread::sleep(Duration::from_millis(30));

        let mut gone: Vec<String> = store
            .evict_expired()
            .into_iter()
            .map(|s| s.filename)
            .collect();
        gone.sort();
        assert_eq!(gone, vec!["a.pdf", "b.pdf"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = store(Duration::from_secs(60), 2);
        let first = store.create("first.pdf".into(), PathBuf::new()).id;
        thread::sleep(Duration::from_millis(5));
        let second = store.create("second.pdf".into(), PathBuf::new()).id;
        thread::sleep(Duration::from_millis(5));
        // touching `first` makes `second` the oldest
        store.get(&first).unwrap();

        let admission = store.create("third.pdf".into(), PathBuf::new());
        assert_eq!(admission.evicted.len(), 1);
        assert_eq!(admission.evicted[0].id, second);
        assert_eq!(store.len(), 2);
        assert!(store.get(&first).is_ok());
        assert!(store.get(&admission.id).is_ok());
    }

    #[test]
    fn test_concurrent_sessions_are_independent() {
        let store = Arc::new(MemorySessionStore::default());
        let ids: Vec<SessionId> = (0..4)
            .map(|i| store.create(format!("{i}.pdf"), PathBuf::new()).id)
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .with_lock(&id, |s| s.ledger.upsert(edit(i as f64 * 20.0, "x")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for id in &ids {
            assert_eq!(store.get(id).unwrap().edit_count, 50);
        }
    }

    #[test]
    fn test_same_session_edits_serialize() {
        let store = Arc::new(MemorySessionStore::default());
        let id = store.create("a.pdf".into(), PathBuf::new()).id;

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let x = (t * 25 + i) as f64 * 20.0;
                        store.with_lock(&id, |s| s.ledger.upsert(edit(x, "y"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get(&id).unwrap().edit_count, 200);
    }
}

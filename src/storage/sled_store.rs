use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use log::debug;
use sled::IVec;

use super::{check_schema, stamp_created, stamp_updated, Clock, SessionStore, StoreResult, SystemClock};
use crate::ussd::session::Session;

const TREE_SESSIONS: &str = "ussd_sessions";
const KEY_PREFIX: &str = "session:";

/// Builder so tests can plug in a manual clock and a short TTL.
pub struct SledSessionStoreBuilder {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SledSessionStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: Duration::minutes(5),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn open(self) -> StoreResult<SledSessionStore> {
        SledSessionStore::open_with(self.path, self.ttl, self.clock)
    }
}

/// Sled-backed session store. Records are bincode-encoded; updates are a
/// compare-and-swap loop on the raw bytes, so concurrent writers inside this
/// process (the sweeper, scratch writes, callbacks) never lose an update.
/// sled locks the database directory, so it is never shared across processes.
pub struct SledSessionStore {
    _db: sled::Db,
    sessions: sled::Tree,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SledSessionStore {
    /// Open (or create) the store at `path` with the default TTL and system clock.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::open_with(path, Duration::minutes(5), Arc::new(SystemClock))
    }

    fn open_with<P: AsRef<Path>>(path: P, ttl: Duration, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let sessions = db.open_tree(TREE_SESSIONS)?;
        Ok(Self {
            _db: db,
            sessions,
            ttl,
            clock,
        })
    }

    fn key(session_id: &str) -> Vec<u8> {
        format!("{}{}", KEY_PREFIX, session_id).into_bytes()
    }

    fn encode(session: &Session) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(session)?)
    }

    fn decode(bytes: &IVec) -> StoreResult<Session> {
        let session: Session = bincode::deserialize(bytes)?;
        check_schema(&session)?;
        Ok(session)
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.sessions.flush()?;
        Ok(())
    }
}

impl SessionStore for SledSessionStore {
    fn create(&self, mut session: Session) -> StoreResult<Session> {
        stamp_created(&mut session, self.clock.now(), self.ttl);
        let encoded = Self::encode(&session)?;
        self.sessions.insert(Self::key(&session.session_id), encoded)?;
        Ok(session)
    }

    fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let now = self.clock.now();
        Ok(self.peek(session_id)?.filter(|s| s.is_live(now)))
    }

    fn peek(&self, session_id: &str) -> StoreResult<Option<Session>> {
        match self.sessions.get(Self::key(session_id))? {
            Some(raw) => Ok(Some(Self::decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn update(&self, session_id: &str, patch: &mut dyn FnMut(&mut Session)) -> StoreResult<Option<Session>> {
        let key = Self::key(session_id);
        loop {
            let Some(raw) = self.sessions.get(&key)? else {
                return Ok(None);
            };
            let previous = Self::decode(&raw)?;
            let now = self.clock.now();
            if !previous.is_live(now) {
                return Ok(None);
            }
            let mut next = previous.clone();
            patch(&mut next);
            stamp_updated(&mut next, &previous, now, self.ttl);
            let encoded = Self::encode(&next)?;
            match self.sessions.compare_and_swap(&key, Some(raw), Some(encoded))? {
                Ok(()) => return Ok(Some(next)),
                Err(_) => debug!("session {} changed underneath update, retrying", session_id),
            }
        }
    }

    fn end(&self, session_id: &str) -> StoreResult<bool> {
        let key = Self::key(session_id);
        loop {
            let Some(raw) = self.sessions.get(&key)? else {
                return Ok(false);
            };
            let mut session = Self::decode(&raw)?;
            if !session.is_active {
                return Ok(false);
            }
            session.is_active = false;
            session.version += 1;
            let encoded = Self::encode(&session)?;
            if self.sessions.compare_and_swap(&key, Some(raw), Some(encoded))?.is_ok() {
                return Ok(true);
            }
        }
    }

    fn sweep_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for item in self.sessions.scan_prefix(KEY_PREFIX.as_bytes()) {
            let (key, raw) = item?;
            let expired = match Self::decode(&raw) {
                Ok(session) => session.expires_at <= now,
                // Records this build cannot read are unreachable; drop them too.
                Err(e) if e.is_unreadable_record() => true,
                Err(e) => return Err(e),
            };
            // Only delete if nobody refreshed the record since we read it.
            if expired && self.sessions.compare_and_swap(&key, Some(raw), None as Option<IVec>)?.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.sessions.flush()?;
        }
        Ok(removed)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ManualClock, StoreError};
    use crate::ussd::session::MenuId;
    use tempfile::TempDir;

    fn store(dir: &TempDir, clock: Arc<ManualClock>) -> SledSessionStore {
        SledSessionStoreBuilder::new(dir.path())
            .clock(clock)
            .open()
            .expect("store")
    }

    #[test]
    fn create_get_roundtrip_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let clock = Arc::new(ManualClock::default());
        {
            let store = store(&dir, clock.clone());
            let mut s = Session::new("ATUid_1", "254700000001", "*384#", Some("63902".into()));
            s.navigate_to(MenuId::Login);
            store.create(s).expect("create");
            store.flush().expect("flush");
        }
        let store = store(&dir, clock);
        let s = store.get("ATUid_1").expect("get").expect("live");
        assert_eq!(s.current_menu, MenuId::Login);
        assert_eq!(s.network_code.as_deref(), Some("63902"));
        assert_eq!(s.version, 1);
    }

    #[test]
    fn ended_record_is_hidden_but_peekable() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir, Arc::new(ManualClock::default()));
        store.create(Session::new("s1", "254700000001", "*384#", None)).unwrap();
        assert!(store.end("s1").unwrap());
        assert!(store.get("s1").unwrap().is_none());
        assert!(!store.peek("s1").unwrap().unwrap().is_active);
        assert!(store.update("s1", &mut |s| s.turn = 9).unwrap().is_none());
    }

    #[test]
    fn sweep_removes_only_expired_records() {
        let dir = TempDir::new().expect("tempdir");
        let clock = Arc::new(ManualClock::default());
        let store = store(&dir, clock.clone());
        store.create(Session::new("old", "254700000001", "*384#", None)).unwrap();
        clock.advance(Duration::minutes(3));
        store.create(Session::new("new", "254700000002", "*384#", None)).unwrap();
        clock.advance(Duration::minutes(3));

        assert_eq!(store.sweep_expired().unwrap(), 1);
        assert!(store.peek("old").unwrap().is_none());
        assert!(store.get("new").unwrap().is_some());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn scratch_helpers_go_through_update() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir, Arc::new(ManualClock::default()));
        let created = store.create(Session::new("s1", "254700000001", "*384#", None)).unwrap();
        assert!(store.set_scratch("s1", "listing", "a,b").unwrap());
        assert_eq!(store.get_scratch("s1", "listing").unwrap().as_deref(), Some("a,b"));
        let after = store.get("s1").unwrap().unwrap();
        assert!(after.expires_at > created.expires_at);
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir, Arc::new(ManualClock::default()));
        let mut s = Session::new("s1", "254700000001", "*384#", None);
        s.schema_version = 99;
        store
            .sessions
            .insert(SledSessionStore::key("s1"), bincode::serialize(&s).unwrap())
            .unwrap();
        let err = store.peek("s1").unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { found: 99, .. }));
    }
}

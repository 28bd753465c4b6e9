use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;

use super::{stamp_created, stamp_updated, Clock, SessionStore, StoreError, StoreResult, SystemClock};
use crate::ussd::session::Session;

/// Process-local session store. Same semantics as the sled store; records
/// vanish with the process.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, mut session: Session) -> StoreResult<Session> {
        stamp_created(&mut session, self.clock.now(), self.ttl);
        self.lock()?.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let now = self.clock.now();
        Ok(self.lock()?.get(session_id).filter(|s| s.is_live(now)).cloned())
    }

    fn peek(&self, session_id: &str) -> StoreResult<Option<Session>> {
        Ok(self.lock()?.get(session_id).cloned())
    }

    fn update(&self, session_id: &str, patch: &mut dyn FnMut(&mut Session)) -> StoreResult<Option<Session>> {
        let now = self.clock.now();
        let mut sessions = self.lock()?;
        let Some(stored) = sessions.get_mut(session_id) else {
            return Ok(None);
        };
        if !stored.is_live(now) {
            return Ok(None);
        }
        let previous = stored.clone();
        patch(stored);
        stamp_updated(stored, &previous, now, self.ttl);
        Ok(Some(stored.clone()))
    }

    fn end(&self, session_id: &str) -> StoreResult<bool> {
        let mut sessions = self.lock()?;
        match sessions.get_mut(session_id) {
            Some(s) if s.is_active => {
                s.is_active = false;
                s.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn sweep_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        Ok(before - sessions.len())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ManualClock;

    #[test]
    fn expired_record_is_invisible_before_sweep() {
        let clock = Arc::new(ManualClock::default());
        let store = MemorySessionStore::with_clock(Duration::minutes(5), clock.clone());
        store.create(Session::new("s1", "254700000001", "*384#", None)).unwrap();
        clock.advance(Duration::minutes(5));
        assert!(store.get("s1").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.sweep_expired().unwrap(), 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn update_renews_expiry() {
        let clock = Arc::new(ManualClock::default());
        let store = MemorySessionStore::with_clock(Duration::minutes(5), clock.clone());
        store.create(Session::new("s1", "254700000001", "*384#", None)).unwrap();
        clock.advance(Duration::minutes(4));
        let s = store.update("s1", &mut |s| s.turn = 1).unwrap().unwrap();
        clock.advance(Duration::minutes(4));
        assert!(store.get("s1").unwrap().is_some());
        assert_eq!(s.expires_at, s.last_activity + Duration::minutes(5));
    }
}

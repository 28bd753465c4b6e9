//! # Session Storage
//!
//! The session record is the only state that outlives a gateway callback.
//! This module defines how it is kept:
//!
//! - [`SessionStore`] - the injected store interface used by the server
//! - [`SledSessionStore`] - durable store on a sled tree, compare-and-swap updates
//! - [`MemorySessionStore`] - mutex-guarded map for single-node development and tests
//! - [`Clock`] - time source, so expiry can be driven by [`ManualClock`] in tests
//! - [`spawn_sweeper`] - background task deleting records past their expiry
//!
//! ## Expiry
//!
//! A record is returned by [`SessionStore::get`] only while it is active and
//! `now < expires_at`. Every successful [`SessionStore::update`] stamps
//! `last_activity = max(now, previous + 1ms)` and `expires_at = last_activity
//! + ttl`, so expiry only ever moves forward even if the clock stalls.
//!
//! ```text
//! data/sessions/   <- sled database, tree "ussd_sessions", keys "session:<id>"
//! ```

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use crate::ussd::session::{Session, SESSION_SCHEMA_VERSION};

pub mod memory;
pub mod sled_store;
pub mod sweeper;

pub use memory::MemorySessionStore;
pub use sled_store::{SledSessionStore, SledSessionStoreBuilder};
pub use sweeper::spawn_sweeper;

/// Errors raised by session stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record was written by an incompatible layout.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// The stored bytes could not be turned back into a usable record.
    pub fn is_unreadable_record(&self) -> bool {
        matches!(self, StoreError::Bincode(_) | StoreError::SchemaMismatch { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed storage for session records with a rolling time-to-live.
///
/// All mutations are atomic per session id. `update` may run `patch` more
/// than once (sled retries on a lost compare-and-swap), always against a
/// freshly loaded record, so patches must not depend on outside state that
/// they themselves change.
pub trait SessionStore: Send + Sync {
    /// Insert a fresh record, replacing any previous record under the same id.
    fn create(&self, session: Session) -> StoreResult<Session>;

    /// Fetch a live record (active and not expired).
    fn get(&self, session_id: &str) -> StoreResult<Option<Session>>;

    /// Fetch the raw record regardless of liveness.
    fn peek(&self, session_id: &str) -> StoreResult<Option<Session>>;

    /// Apply `patch` to a live record and renew its expiry. `None` when the
    /// record is missing or no longer live.
    fn update(&self, session_id: &str, patch: &mut dyn FnMut(&mut Session)) -> StoreResult<Option<Session>>;

    /// Mark a record inactive. Its expiry is left untouched.
    fn end(&self, session_id: &str) -> StoreResult<bool>;

    /// Delete every record whose expiry has passed, active or not.
    fn sweep_expired(&self) -> StoreResult<usize>;

    /// Number of stored records, live or not.
    fn count(&self) -> StoreResult<usize>;

    /// Set one entry of the generic scratch bag.
    fn set_scratch(&self, session_id: &str, key: &str, value: &str) -> StoreResult<bool> {
        let updated = self.update(session_id, &mut |s: &mut Session| {
            s.data.insert(key.to_string(), value.to_string());
        })?;
        Ok(updated.is_some())
    }

    /// Read one entry of the generic scratch bag of a live record.
    fn get_scratch(&self, session_id: &str, key: &str) -> StoreResult<Option<String>> {
        Ok(self.get(session_id)?.and_then(|s| s.data.get(key).cloned()))
    }
}

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|p| *p.into_inner())
    }
}

/// Prepare a record for insertion.
pub(crate) fn stamp_created(session: &mut Session, now: DateTime<Utc>, ttl: Duration) {
    session.created_at = now;
    session.last_activity = now;
    session.expires_at = now + ttl;
    session.is_active = true;
    session.version = 1;
    session.schema_version = SESSION_SCHEMA_VERSION;
}

/// Renew expiry after a patch. `previous` is the record as loaded, before
/// the patch ran, so a patch cannot move the expiry backwards.
pub(crate) fn stamp_updated(session: &mut Session, previous: &Session, now: DateTime<Utc>, ttl: Duration) {
    let floor = previous.last_activity + Duration::milliseconds(1);
    let at = if now > floor { now } else { floor };
    session.session_id = previous.session_id.clone();
    session.created_at = previous.created_at;
    session.last_activity = at;
    session.expires_at = at + ttl;
    session.version = previous.version + 1;
    session.schema_version = SESSION_SCHEMA_VERSION;
}

pub(crate) fn check_schema(session: &Session) -> StoreResult<()> {
    if session.schema_version != SESSION_SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            entity: "session",
            expected: SESSION_SCHEMA_VERSION,
            found: session.schema_version,
        });
    }
    Ok(())
}

//! Process-wide counters for the callback pipeline.
//!
//! Plain atomics, read through [`snapshot`] by the health endpoint and the
//! `status` command. Nothing here is persisted across restarts.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static CALLBACKS: AtomicU64 = AtomicU64::new(0);
static SESSIONS_CREATED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_ENDED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_SWEPT: AtomicU64 = AtomicU64::new(0);
static REPLAYS_SERVED: AtomicU64 = AtomicU64::new(0);
static BETS_PLACED: AtomicU64 = AtomicU64::new(0);
static ADAPTER_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static ADAPTER_FAILURES: AtomicU64 = AtomicU64::new(0);
static INTERNAL_ERRORS: AtomicU64 = AtomicU64::new(0);

pub fn inc_callbacks() {
    CALLBACKS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sessions_created() {
    SESSIONS_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sessions_ended() {
    SESSIONS_ENDED.fetch_add(1, Ordering::Relaxed);
}
pub fn add_sessions_swept(n: usize) {
    SESSIONS_SWEPT.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn inc_replays_served() {
    REPLAYS_SERVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_bets_placed() {
    BETS_PLACED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_adapter_timeouts() {
    ADAPTER_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_adapter_failures() {
    ADAPTER_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_internal_errors() {
    INTERNAL_ERRORS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub callbacks: u64,
    pub sessions_created: u64,
    pub sessions_ended: u64,
    pub sessions_swept: u64,
    pub replays_served: u64,
    pub bets_placed: u64,
    pub adapter_timeouts: u64,
    pub adapter_failures: u64,
    pub internal_errors: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        callbacks: CALLBACKS.load(Ordering::Relaxed),
        sessions_created: SESSIONS_CREATED.load(Ordering::Relaxed),
        sessions_ended: SESSIONS_ENDED.load(Ordering::Relaxed),
        sessions_swept: SESSIONS_SWEPT.load(Ordering::Relaxed),
        replays_served: REPLAYS_SERVED.load(Ordering::Relaxed),
        bets_placed: BETS_PLACED.load(Ordering::Relaxed),
        adapter_timeouts: ADAPTER_TIMEOUTS.load(Ordering::Relaxed),
        adapter_failures: ADAPTER_FAILURES.load(Ordering::Relaxed),
        internal_errors: INTERNAL_ERRORS.load(Ordering::Relaxed),
    }
}

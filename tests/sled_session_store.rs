use std::sync::Arc;

use betline::storage::{ManualClock, SessionStore, SledSessionStore, SledSessionStoreBuilder};
use betline::ussd::session::{MenuId, Session};
use chrono::Duration;
use tempfile::TempDir;

fn open(dir: &TempDir, clock: Arc<ManualClock>) -> SledSessionStore {
    SledSessionStoreBuilder::new(dir.path().join("sessions"))
        .ttl(Duration::minutes(5))
        .clock(clock)
        .open()
        .expect("open sled store")
}

#[test]
fn expiry_strictly_increases_under_a_frozen_clock() {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::default());
    let store = open(&dir, clock.clone());

    let created = store
        .create(Session::new("sled-1", "254700000001", "*384#", None))
        .expect("create");
    let mut last = created.expires_at;
    let mut version = created.version;
    for turn in 1..=5 {
        let updated = store
            .update("sled-1", &mut |s| s.turn = turn)
            .expect("update")
            .expect("live");
        assert!(updated.expires_at > last, "expiry went backwards at turn {}", turn);
        assert_eq!(updated.expires_at, updated.last_activity + Duration::minutes(5));
        assert_eq!(updated.version, version + 1);
        last = updated.expires_at;
        version = updated.version;
    }
}

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::default());
    {
        let store = open(&dir, clock.clone());
        store
            .create(Session::new("sled-2", "254700000001", "*384#", None))
            .expect("create");
        store
            .update("sled-2", &mut |s| s.navigate_to(MenuId::Help))
            .expect("update");
        store.flush().expect("flush");
    }
    let store = open(&dir, clock);
    let session = store.get("sled-2").expect("get").expect("live after reopen");
    assert_eq!(session.current_menu, MenuId::Help);
    assert_eq!(session.history, vec![MenuId::MainMenu]);
}

#[test]
fn ended_record_is_not_live_but_still_peekable() {
    let dir = TempDir::new().expect("tempdir");
    let clock = Arc::new(ManualClock::default());
    let store = open(&dir, clock.clone());
    store
        .create(Session::new("sled-3", "254700000001", "*384#", None))
        .expect("create");

    assert!(tokio_test::assert_ok!(store.end("sled-3")));
    assert!(store.get("sled-3").expect("get").is_none());
    assert!(store.update("sled-3", &mut |s| s.turn = 9).expect("update").is_none());
    let raw = store.peek("sled-3").expect("peek").expect("present");
    assert!(!raw.is_active);

    clock.advance(Duration::minutes(6));
    assert_eq!(store.sweep_expired().expect("sweep"), 1);
    assert_eq!(store.count().expect("count"), 0);
}

#[test]
fn scratch_values_round_through_the_store() {
    let dir = TempDir::new().expect("tempdir");
    let store = open(&dir, Arc::new(ManualClock::default()));
    store
        .create(Session::new("sled-4", "254700000001", "*384#", None))
        .expect("create");

    assert!(store.set_scratch("sled-4", "promo", "WEEKEND").expect("set"));
    assert_eq!(
        store.get_scratch("sled-4", "promo").expect("get").as_deref(),
        Some("WEEKEND")
    );
    assert!(!store.set_scratch("missing", "promo", "x").expect("set on missing"));
}

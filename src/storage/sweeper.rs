use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use super::SessionStore;
use crate::metrics;

/// Spawn the periodic expiry sweep. `after_sweep` runs after every pass
/// (the server uses it to drop idle per-session locks).
pub fn spawn_sweeper<F>(store: Arc<dyn SessionStore>, every: Duration, after_sweep: F) -> JoinHandle<()>
where
    F: Fn(usize) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so startup isn't a sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.sweep_expired() {
                Ok(0) => debug!("session sweep: nothing expired"),
                Ok(n) => {
                    metrics::add_sessions_swept(n);
                    info!("session sweep removed {} expired record(s)", n);
                }
                Err(e) => warn!("session sweep failed: {}", e),
            }
            after_sweep(store.count().unwrap_or(0));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ManualClock, MemorySessionStore};
    use crate::ussd::session::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_records_on_tick() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemorySessionStore::with_clock(chrono::Duration::minutes(5), clock.clone()));
        store.create(Session::new("s1", "254700000001", "*384#", None)).unwrap();
        clock.advance(chrono::Duration::minutes(6));

        let passes = Arc::new(AtomicUsize::new(0));
        let seen = passes.clone();
        let handle = spawn_sweeper(store.clone(), Duration::from_secs(60), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(store.count().unwrap(), 0);
        assert!(passes.load(Ordering::SeqCst) >= 1);
        handle.abort();
    }
}

//! # Callback Orchestration
//!
//! [`UssdServer::handle_callback`] turns one gateway callback into one
//! protocol string:
//!
//! 1. decode the cumulative keystrokes and take the newest token
//! 2. serialize on the session id (callbacks for one session never overlap)
//! 3. load the live session, or start a fresh one at the main menu
//! 4. answer replays (a callback carrying no new keystroke) from the cached reply;
//!    an ended session answers every callback with its final reply until it expires
//! 5. dispatch, persist with renewed expiry, end the session on terminal replies
//!
//! Anything that fails on the way (store errors, adapter faults, panics)
//! is converted into an `END` apology at this boundary.

use dashmap::DashMap;
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::dispatch::{Dispatcher, MenuContext};
use super::input::KeystrokeHistory;
use super::response::{self, Reply, SERVICE_UNAVAILABLE};
use super::session::Session;
use crate::logutil::{escape_log, mask_phone};
use crate::metrics;
use crate::storage::{Clock, SessionStore, StoreError, SystemClock};

/// Fields posted by the gateway on every keystroke.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub session_id: String,
    #[serde(default)]
    pub service_code: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub network_code: Option<String>,
}

impl CallbackRequest {
    pub fn new(session_id: &str, phone_number: &str, text: &str) -> Self {
        CallbackRequest {
            session_id: session_id.to_string(),
            service_code: String::new(),
            phone_number: phone_number.to_string(),
            text: text.to_string(),
            network_code: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UssdError {
    #[error("session store: {0}")]
    Store(#[from] StoreError),

    #[error("malformed callback: {0}")]
    BadRequest(&'static str),
}

pub struct UssdServer {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    ctx: MenuContext,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl UssdServer {
    pub fn new(store: Arc<dyn SessionStore>, ctx: MenuContext) -> Self {
        Self::with_clock(store, ctx, Arc::new(SystemClock))
    }

    /// Use the same clock the store was built with so replay checks agree with expiry.
    pub fn with_clock(store: Arc<dyn SessionStore>, ctx: MenuContext, clock: Arc<dyn Clock>) -> Self {
        UssdServer {
            store,
            clock,
            dispatcher: Dispatcher::new(),
            ctx,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn context(&self) -> &MenuContext {
        &self.ctx
    }

    /// Handle one callback. Always returns a `CON`/`END` string.
    pub async fn handle_callback(&self, request: CallbackRequest) -> String {
        metrics::inc_callbacks();
        let session_id = request.session_id.clone();
        match AssertUnwindSafe(self.process(request)).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                metrics::inc_internal_errors();
                error!("callback for session {} failed: {}", escape_log(&session_id), e);
                response::apology()
            }
            Err(_) => {
                metrics::inc_internal_errors();
                error!("callback for session {} panicked", escape_log(&session_id));
                response::apology()
            }
        }
    }

    /// Drop locks nobody is waiting on. Called after each sweep.
    pub fn prune_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    fn lock_for(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(session_id.to_string()).or_default().clone()
    }

    fn load_live(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        match self.store.get(session_id) {
            Err(e) if e.is_unreadable_record() => {
                warn!("session {} unreadable ({}); starting fresh", escape_log(session_id), e);
                Ok(None)
            }
            other => other,
        }
    }

    /// Answer for a session that already ended but has not yet expired.
    ///
    /// The ended record is never replaced while it lives: retries and late
    /// out-of-order deliveries all get the terminal reply it cached.
    fn ended_replay(&self, request: &CallbackRequest, history: &KeystrokeHistory) -> Option<String> {
        let previous = match self.store.peek(&request.session_id) {
            Ok(previous) => previous?,
            Err(e) if e.is_unreadable_record() => return None,
            Err(e) => {
                warn!("session {} peek failed: {}", escape_log(&request.session_id), e);
                return None;
            }
        };
        if previous.is_active || self.clock.now() >= previous.expires_at {
            return None;
        }
        if history.len() > previous.turn {
            warn!(
                "session {} got {} token(s) after ending at turn {}; answering with final reply",
                escape_log(&previous.session_id),
                history.len(),
                previous.turn
            );
        }
        previous.last_response
    }

    async fn process(&self, request: CallbackRequest) -> Result<String, UssdError> {
        if request.session_id.trim().is_empty() {
            return Err(UssdError::BadRequest("missing sessionId"));
        }
        let history = KeystrokeHistory::decode(&request.text);
        let lock = self.lock_for(&request.session_id);
        let _guard = lock.lock().await;

        let (mut session, input) = match self.load_live(&request.session_id)? {
            Some(session) => {
                if history.len() <= session.turn {
                    if let Some(cached) = &session.last_response {
                        metrics::inc_replays_served();
                        debug!(
                            "session {} replay at turn {} (text has {} token(s))",
                            escape_log(&session.session_id),
                            session.turn,
                            history.len()
                        );
                        return Ok(cached.clone());
                    }
                }
                let input = history.current().to_string();
                (session, input)
            }
            None => {
                if let Some(cached) = self.ended_replay(&request, &history) {
                    metrics::inc_replays_served();
                    return Ok(cached);
                }
                let fresh = Session::new(
                    request.session_id.clone(),
                    request.phone_number.clone(),
                    request.service_code.clone(),
                    request.network_code.clone(),
                );
                let created = self.store.create(fresh)?;
                metrics::inc_sessions_created();
                info!(
                    "new session {} from {}",
                    escape_log(&created.session_id),
                    mask_phone(&created.phone_number)
                );
                // Earlier keystrokes belong to a session we no longer have.
                (created, String::new())
            }
        };

        session.turn = history.len();
        debug!(
            "session {} {}/{:?} input '{}'",
            escape_log(&session.session_id),
            session.current_menu,
            session.step.map(|s| s.as_str()),
            escape_log(&input)
        );

        let reply = match self.dispatcher.dispatch(&mut session, &input, &self.ctx).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("session {} adapter failure: {}", escape_log(&session.session_id), e);
                Reply::end(SERVICE_UNAVAILABLE)
            }
        };

        let encoded = reply.encode();
        session.last_text = request.text;
        session.last_response = Some(encoded.clone());

        // The per-session lock held above is what serializes callbacks; the
        // patch only carries the fields this turn owns.
        let saved = self
            .store
            .update(&session.session_id, &mut |stored| session.apply_turn_to(stored))?;
        if saved.is_none() {
            warn!(
                "session {} expired while handling callback; reply not persisted",
                escape_log(&session.session_id)
            );
        }
        if reply.terminal && self.store.end(&session.session_id)? {
            metrics::inc_sessions_ended();
            debug!("session {} ended", escape_log(&session.session_id));
        }
        Ok(encoded)
    }
}

//! Test utilities & fixtures.
//! Builds an in-memory gateway over the local backend and a `Caller` that
//! accumulates keystrokes the way the gateway does.

use std::sync::Arc;
use std::time::Duration;

use argon2::Params;
use betline::config::Config;
use betline::services::local::{LocalBackend, Seed};
use betline::services::Services;
use betline::storage::{ManualClock, MemorySessionStore, SessionStore};
use betline::ussd::server::CallbackRequest;
use betline::ussd::session::Session;
use betline::ussd::{MenuContext, UssdServer};

pub const JANE_PHONE: &str = "5551234567";
pub const JANE_PIN: &str = "4321";

pub struct Harness {
    pub server: Arc<UssdServer>,
    pub backend: Arc<LocalBackend>,
    pub store: Arc<MemorySessionStore>,
    pub clock: Arc<ManualClock>,
}

/// Cheap Argon2 parameters so seeding and logins stay fast in debug builds.
pub fn fast_params() -> Option<Params> {
    Params::new(1024, 1, 1, None).ok()
}

pub fn harness() -> Harness {
    let backend = Arc::new(LocalBackend::with_params(Seed::demo(), fast_params()));
    let services = Services::from_backend(backend.clone(), Duration::from_secs(5));
    harness_with(backend, services)
}

#[allow(dead_code)] // only some test binaries swap in their own adapters
pub fn harness_with(backend: Arc<LocalBackend>, services: Services) -> Harness {
    let config = Config::default();
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(MemorySessionStore::with_clock(config.session.ttl(), clock.clone()));
    let server = Arc::new(UssdServer::with_clock(
        store.clone(),
        MenuContext::from_config(&config, services),
        clock.clone(),
    ));
    Harness {
        server,
        backend,
        store,
        clock,
    }
}

/// One handset conversation. Keys are joined with `*` exactly like the gateway does,
/// so pressing `*` itself yields `**` in the cumulative text.
pub struct Caller<'a> {
    harness: &'a Harness,
    pub session_id: String,
    pub phone: String,
    keys: Vec<String>,
}

#[allow(dead_code)]
impl<'a> Caller<'a> {
    pub fn new(harness: &'a Harness, session_id: &str) -> Self {
        Caller {
            harness,
            session_id: session_id.to_string(),
            phone: "254700000001".to_string(),
            keys: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        self.keys.join("*")
    }

    pub fn request(&self) -> CallbackRequest {
        CallbackRequest {
            session_id: self.session_id.clone(),
            service_code: "*384#".to_string(),
            phone_number: self.phone.clone(),
            text: self.text(),
            network_code: Some("63902".to_string()),
        }
    }

    /// First callback, empty text.
    pub async fn dial(&mut self) -> String {
        self.keys.clear();
        self.resend().await
    }

    pub async fn press(&mut self, key: &str) -> String {
        self.keys.push(key.to_string());
        self.resend().await
    }

    /// Deliver the current cumulative text again (gateway retry).
    pub async fn resend(&self) -> String {
        self.harness.server.handle_callback(self.request()).await
    }

    pub fn session(&self) -> Session {
        self.harness
            .store
            .peek(&self.session_id)
            .expect("store readable")
            .expect("session exists")
    }

    /// Dial and log in as the seeded demo account.
    pub async fn login_as_jane(&mut self) -> String {
        self.dial().await;
        self.press("1").await;
        self.press(JANE_PHONE).await;
        self.press(JANE_PIN).await
    }
}

/// The exact main-menu screen for the default config.
#[allow(dead_code)]
pub fn main_menu_text() -> String {
    "CON Welcome to BetLine\n1. Login\n2. Register\n3. Help\n0. Exit".to_string()
}

//! # USSD Core
//!
//! The gateway resends the caller's whole keystroke history on every
//! callback; this module turns that into a menu conversation whose state
//! lives entirely in the session record.
//!
//! ## Components
//!
//! - [`input`] - splits the cumulative text, yields the newest keystroke
//! - [`session`] - the session record, navigation stack and flow scratch
//! - [`dispatch`] - `(menu, step)` handler table, global `0`/`*` keys
//! - [`menus`] - screens and handlers (main, auth, account, betting, placement, help)
//! - [`response`] - `CON`/`END` encoding
//! - [`server`] - per-callback orchestration, replay handling, catch-all boundary
//! - [`http`] - axum router for the gateway
//!
//! ## Flow
//!
//! ```text
//! POST /ussd ─> UssdServer ─> KeystrokeHistory::current()
//!                   │
//!                   ├─> SessionStore::get / create
//!                   ├─> Dispatcher ─> menus::* ─> Services (bounded)
//!                   ├─> SessionStore::update (expiry renewed) / end
//!                   └─> "CON ..." | "END ..."
//! ```

pub mod dispatch;
pub mod http;
pub mod input;
pub mod menus;
pub mod response;
pub mod server;
pub mod session;

pub use dispatch::{Dispatcher, MenuContext};
pub use server::{CallbackRequest, UssdServer};
pub use session::Session;

//! # BetLine - USSD Gateway for Mobile Sports Betting
//!
//! BetLine answers telecom USSD gateway callbacks for a sports-betting
//! service. Callers dial a short code and navigate numbered menus on any
//! handset; every keystroke arrives as an HTTP callback carrying the whole
//! keystroke history, and BetLine reconstructs where the caller is from a
//! server-held session record.
//!
//! ## Features
//!
//! - **Menu State Machine**: table-driven dispatch over `(menu, step)` with login, registration and a multi-step bet slip
//! - **Rolling Sessions**: sled-backed records with a sliding TTL, compare-and-swap updates and a background sweeper
//! - **Retry Tolerance**: duplicate or stale gateway callbacks are answered from the cached reply, never re-applied
//! - **Bounded Adapters**: user directory, wallet, catalog and betting calls all carry a timeout and degrade to a polite `END`
//! - **Local Backend**: in-process services seeded from JSON, with Argon2id PIN hashes, for development and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use betline::config::Config;
//! use betline::services::Services;
//! use betline::storage::SledSessionStore;
//! use betline::ussd::{MenuContext, UssdServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = Arc::new(SledSessionStore::open(config.storage.sessions_path())?);
//!     let services = Services::from_config(&config).await?;
//!     let server = Arc::new(UssdServer::new(store, MenuContext::from_config(&config, services)));
//!
//!     let app = betline::ussd::http::router(server, &config.server.callback_path);
//!     let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`ussd`] - session record, input decoding, dispatch, menus, reply encoding, HTTP surface
//! - [`storage`] - session stores, clock, expiry sweeper
//! - [`services`] - outbound adapter traits and backends
//! - [`config`] - configuration management and validation
//! - [`validation`] - keystroke validation with caller-facing errors
//! - [`metrics`] - process-wide counters
//! - [`logutil`] - log sanitizing helpers

pub mod config;
pub mod logutil;
pub mod metrics;
pub mod services;
pub mod storage;
pub mod ussd;
pub mod validation;

#[cfg(feature = "api-reexports")]
pub use ussd::{CallbackRequest, Dispatcher, Session, UssdServer};

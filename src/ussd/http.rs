//! Gateway-facing HTTP surface.
//!
//! - `POST <callback_path>` form-encoded callback, `text/plain` `CON`/`END` reply
//! - `GET /health` JSON liveness and counters
//!
//! The callback route answers 200 even when the request is malformed: the
//! gateway shows whatever body it gets to the caller, so an `END` apology is
//! the only safe failure shape.

use axum::extract::{rejection::FormRejection, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::response;
use super::server::{CallbackRequest, UssdServer};
use crate::metrics::{self, Snapshot};

#[derive(Clone)]
pub struct AppState {
    server: Arc<UssdServer>,
    started: Instant,
}

impl AppState {
    pub fn new(server: Arc<UssdServer>) -> Self {
        Self {
            server,
            started: Instant::now(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    stored_sessions: usize,
    counters: Snapshot,
}

pub fn router(server: Arc<UssdServer>, callback_path: &str) -> Router {
    Router::new()
        .route(callback_path, post(callback))
        .route("/health", get(health))
        .with_state(AppState::new(server))
}

fn plain(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

async fn callback(
    State(state): State<AppState>,
    form: Result<Form<CallbackRequest>, FormRejection>,
) -> impl IntoResponse {
    match form {
        Ok(Form(request)) => plain(state.server.handle_callback(request).await),
        Err(rejection) => {
            log::warn!("rejected gateway callback: {}", rejection);
            metrics::inc_callbacks();
            plain(response::apology())
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stored_sessions = state.server.store().count().unwrap_or(0);
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
        stored_sessions,
        counters: metrics::snapshot(),
    })
}

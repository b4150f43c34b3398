//! gs-server library interface
//!
//! Exposes the ingestion pipeline and HTTP API for the binary and for
//! integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod grouping;
pub mod ingest;
pub mod roster;
pub mod sheet;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};

use crate::db::UserStore;
use crate::store::FileStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Stage directories; handlers only write to Incoming and Mangled
    pub store: FileStore,
    /// Accounts, scores and certificates
    pub users: UserStore,
    /// Event key stamped into submitted file names
    pub event_key: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: FileStore, users: UserStore, event_key: impl Into<String>) -> Self {
        Self {
            store,
            users,
            event_key: event_key.into(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Public routes need no certificate, submissions need any valid
/// certificate, and score/badge edits need an admin certificate.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let submissions = Router::new()
        .route("/dataEntry", post(api::submit_observation))
        .route("/pitScout", post(api::submit_pit_visit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_certificate,
        ));

    let admin = Router::new()
        .route("/modScore", post(api::modify_score))
        .route("/addBadge", post(api::add_badge))
        .layer(middleware::from_fn_with_state(state.clone(), api::require_admin));

    let public = Router::new()
        .route("/scouterLookup", get(api::scouter_lookup))
        .route("/leaderboard", get(api::leaderboard))
        .route("/userInfo", get(api::user_info))
        .merge(api::health_routes());

    Router::new()
        .merge(submissions)
        .merge(admin)
        .merge(public)
        .with_state(state)
}

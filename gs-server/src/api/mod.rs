//! HTTP API handlers for gs-server

pub mod auth;
pub mod health;
pub mod lookup;
pub mod submit;
pub mod users;

pub use auth::{require_admin, require_certificate, CERTIFICATE_HEADER};
pub use health::health_routes;
pub use lookup::scouter_lookup;
pub use submit::{submit_observation, submit_pit_visit};
pub use users::{add_badge, leaderboard, modify_score, user_info};

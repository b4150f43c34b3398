//! Error types for gs-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

use crate::store::Stage;

/// File Store errors
///
/// Every variant leaves the source file where it was.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{name} not found in {stage}")]
    Missing { name: String, stage: Stage },

    #[error("{name} already exists in {stage}")]
    AlreadyExists { name: String, stage: Stage },

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Moving {name} from {from} to {to} failed: {source}")]
    Move {
        name: String,
        from: Stage,
        to: Stage,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Team roster errors
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Reading team list {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Team {team} is not on the {event} team list")]
    TeamNotFound { team: u32, event: String },
}

/// Spreadsheet sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Spreadsheet rejected write to {range}: {status} {body}")]
    Rejected {
        range: String,
        status: u16,
        body: String,
    },

    #[error("Spreadsheet sink not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid match range: {0}")]
    InvalidRange(String),
}

/// User store errors
#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("User {0} not found")]
    UserNotFound(String),

    #[error("Badge data for {username} has schema {found}, expected {expected}")]
    BadgeSchema {
        username: String,
        found: i64,
        expected: i64,
    },

    #[error("Badge data for {username} is corrupt: {source}")]
    BadgeDecode {
        username: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

/// Ingestion loop errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// A sibling file could not be filed during reconciliation; scouting
    /// data may be lost and the loop stops so an operator can investigate
    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or unknown certificate (401)
    #[error("Not authenticated")]
    Unauthorized,

    /// Authenticated without the needed role (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("User store error: {0}")]
    Users(#[from] UserStoreError),

    /// gs-common error
    #[error("Common error: {0}")]
    Common(#[from] gs_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Not authenticated".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Store(ref err @ StoreError::AlreadyExists { .. }) => {
                (StatusCode::CONFLICT, "CONFLICT", err.to_string())
            }
            ApiError::Store(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                err.to_string(),
            ),
            ApiError::Users(UserStoreError::UserNotFound(name)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("User {} not found", name),
            ),
            ApiError::Users(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                err.to_string(),
            ),
            ApiError::Common(gs_common::Error::Decode(msg)) => {
                (StatusCode::BAD_REQUEST, "DECODE_ERROR", msg)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

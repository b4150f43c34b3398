//! Certificate authentication middleware
//!
//! Clients send the certificate issued at login in the `Certificate`
//! header. A verified request carries its [`Role`] as a request extension.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::db::Role;
use crate::error::ApiError;
use crate::AppState;

pub const CERTIFICATE_HEADER: &str = "Certificate";

async fn verify(state: &AppState, headers: &HeaderMap) -> Result<Role, ApiError> {
    let certificate = headers
        .get(CERTIFICATE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    match state.users.verify_certificate(certificate).await? {
        Some(role) => Ok(role),
        None => {
            warn!("Rejected unknown certificate");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Any valid certificate
pub async fn require_certificate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let role = verify(&state, request.headers()).await?;
    request.extensions_mut().insert(role);
    Ok(next.run(request).await)
}

/// A certificate with the admin or super role
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let role = verify(&state, request.headers()).await?;
    if !role.is_admin() {
        return Err(ApiError::Forbidden(format!("{} role cannot do this", role)));
    }
    request.extensions_mut().insert(role);
    Ok(next.run(request).await)
}

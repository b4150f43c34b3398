//! Leaderboard, user info and admin score tools

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{Badge, LeaderboardKind, ScoreChange, UserInfo};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(rename = "type", default)]
    pub kind: LeaderboardKind,
}

/// GET /leaderboard?type=score|life|high
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<UserInfo>>> {
    Ok(Json(state.users.leaderboard(query.kind).await?))
}

#[derive(Debug, Deserialize)]
pub struct UserInfoQuery {
    pub username: String,
}

/// GET /userInfo?username=
pub async fn user_info(
    State(state): State<AppState>,
    Query(query): Query<UserInfoQuery>,
) -> ApiResult<Json<UserInfo>> {
    Ok(Json(state.users.user_info(&query.username).await?))
}

/// Body of POST /modScore
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModRequest {
    pub name: String,
    pub by: i64,
    #[serde(rename = "Mod")]
    pub change: ScoreChange,
}

/// POST /modScore (admin)
pub async fn modify_score(
    State(state): State<AppState>,
    Json(request): Json<ModRequest>,
) -> ApiResult<Json<UserInfo>> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is empty".to_string()));
    }
    if request.by < 0 {
        return Err(ApiError::BadRequest("By must not be negative".to_string()));
    }

    let info = state
        .users
        .modify_score(&request.name, request.change, request.by)
        .await?;
    info!(username = %request.name, change = ?request.change, by = request.by, "Admin modified score");
    Ok(Json(info))
}

/// Body of POST /addBadge
#[derive(Debug, Deserialize)]
pub struct AddBadgeRequest {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(flatten)]
    pub badge: Badge,
}

#[derive(Debug, Serialize)]
pub struct AddBadgeResponse {
    pub added: bool,
}

/// POST /addBadge (admin)
pub async fn add_badge(
    State(state): State<AppState>,
    Json(request): Json<AddBadgeRequest>,
) -> ApiResult<Json<AddBadgeResponse>> {
    if request.badge.id.trim().is_empty() {
        return Err(ApiError::BadRequest("Badge ID is empty".to_string()));
    }
    let added = state.users.add_badge(&request.username, request.badge).await?;
    Ok(Json(AddBadgeResponse { added }))
}

//! Scouter lookup for one match and driver station

use axum::extract::{Query, State};
use gs_common::{Alliance, DriverStation};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::grouping::scouters_for;
use crate::AppState;

pub const NO_SCOUTERS: &str = "No scouters found!";

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(rename = "match")]
    pub match_number: u32,
    #[serde(rename = "isBlue", default)]
    pub is_blue: bool,
    #[serde(rename = "driverStation")]
    pub driver_station: u8,
}

/// GET /scouterLookup?match=3&isBlue=true&driverStation=2
///
/// Comma-separated names of everyone with a written observation of that
/// robot.
pub async fn scouter_lookup(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<String> {
    let alliance = if query.is_blue { Alliance::Blue } else { Alliance::Red };
    let station = DriverStation::new(alliance, query.driver_station)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let scouters = scouters_for(&state.store, &state.event_key, query.match_number, station)?;
    if scouters.is_empty() {
        return Ok(NO_SCOUTERS.to_string());
    }
    Ok(scouters.join(", "))
}

//! Submission endpoints
//!
//! Accepted payloads are re-encoded and dropped into Incoming for the
//! ingestion loop. Payloads that do not decode are kept verbatim in
//! Mangled for manual recovery.

use axum::{body::Bytes, extract::State};
use chrono::Utc;
use gs_common::{Observation, PitObservation};
use tracing::{error, info, warn};

use crate::error::{ApiResult, StoreError};
use crate::grouping::FileKey;
use crate::store::{FileStore, Stage};
use crate::AppState;

/// Millisecond stamps tried before giving up on a unique name
const NAME_ATTEMPTS: i64 = 8;

/// Write under the first free name produced from the current time
fn write_timestamped(
    store: &FileStore,
    stage: Stage,
    bytes: &[u8],
    make_name: impl Fn(i64) -> String,
) -> Result<String, StoreError> {
    let now = Utc::now().timestamp_millis();
    let mut last_err = None;
    for offset in 0..NAME_ATTEMPTS {
        let name = make_name(now + offset);
        match store.write_new(stage, &name, bytes) {
            Ok(()) => return Ok(name),
            Err(e @ StoreError::AlreadyExists { .. }) => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| StoreError::InvalidName("no free name".to_string())))
}

fn store_mangled(state: &AppState, body: &[u8]) {
    match write_timestamped(&state.store, Stage::Mangled, body, |ms| format!("{}.json", ms)) {
        Ok(name) => warn!(file = %name, "Stored undecodable submission"),
        Err(e) => error!(error = %e, "Could not store undecodable submission"),
    }
}

/// POST /dataEntry
pub async fn submit_observation(State(state): State<AppState>, body: Bytes) -> ApiResult<String> {
    let obs = match Observation::decode(&body) {
        Ok(obs) => obs,
        Err(e) => {
            store_mangled(&state, &body);
            return Err(e.into());
        }
    };

    let bytes = obs.encode()?;
    let name = write_timestamped(&state.store, Stage::Incoming, &bytes, |ms| {
        FileKey::match_file_name(&state.event_key, obs.match_info.number, obs.driver_station, ms)
    })?;

    info!(file = %name, scouter = %obs.scouter, "Accepted observation");
    Ok(format!("Processed {}", name))
}

/// POST /pitScout
pub async fn submit_pit_visit(State(state): State<AppState>, body: Bytes) -> ApiResult<String> {
    let pit = match PitObservation::decode(&body) {
        Ok(pit) => pit,
        Err(e) => {
            store_mangled(&state, &body);
            return Err(e.into());
        }
    };

    let bytes = pit.encode()?;
    let name = FileKey::pit_file_name(&state.event_key, pit.team_number);
    state.store.write_new(Stage::Incoming, &name, &bytes)?;

    info!(file = %name, scouter = %pit.scouter, "Accepted pit visit");
    Ok(format!("Processed {}", name))
}

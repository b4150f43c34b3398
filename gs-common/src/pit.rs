//! Pit visit model
//!
//! A one-time qualitative observation of a team, recorded in the pits
//! rather than during a match.

use serde::{Deserialize, Serialize};

use crate::observation::SpeakerPositions;
use crate::{Error, Result};

/// Data from one pit visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitObservation {
    #[serde(rename = "Team")]
    pub team_number: u32,

    /// Pit identifier as printed on the pit map
    #[serde(rename = "Pit", default)]
    pub pit_identifier: String,

    #[serde(rename = "Scouter")]
    pub scouter: String,

    #[serde(rename = "Drivetrain", default)]
    pub drivetrain: String,

    #[serde(rename = "Sides", default)]
    pub sides: SpeakerPositions,

    #[serde(rename = "Distance", default)]
    pub distance: DistanceData,

    #[serde(rename = "Auto Scores", default)]
    pub auto_scores: u32,

    /// Middle notes the robot can control in auto
    #[serde(rename = "Middle Notes", default)]
    pub middle_notes: u32,

    #[serde(rename = "Detection", default)]
    pub note_detection: bool,

    /// Average teleop cycles claimed by the team
    #[serde(rename = "Cycles", default)]
    pub cycles: u32,

    /// Years of driver experience
    #[serde(rename = "Experience", default)]
    pub driver_experience: u32,

    #[serde(rename = "Bot Type", default)]
    pub bot_type: String,

    #[serde(rename = "Human Player", default)]
    pub human_player: HumanPlayerData,

    #[serde(rename = "Endgame Behavior", default)]
    pub endgame_behavior: String,

    #[serde(rename = "Climb Time", default)]
    pub climb_time: f64,

    #[serde(rename = "Notes", default)]
    pub notes: String,
}

impl PitObservation {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Internal(format!("Failed to encode pit visit: {}", e)))
    }

    /// Shooting distance in whole feet, if the team can distance shoot
    pub fn shooting_distance(&self) -> Option<u32> {
        self.distance.can.then(|| self.distance.feet.max(0.0) as u32)
    }

    /// Climb time, if the team climbs in endgame
    pub fn endgame_climb_time(&self) -> Option<f64> {
        (self.endgame_behavior == "Climb").then_some(self.climb_time)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DistanceData {
    #[serde(rename = "Can", default)]
    pub can: bool,
    #[serde(rename = "Distance", default)]
    pub feet: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanPlayerData {
    #[serde(rename = "Position", default)]
    pub position: u32,
    #[serde(rename = "Stage Accuracy", default)]
    pub stage_accuracy: u32,
}

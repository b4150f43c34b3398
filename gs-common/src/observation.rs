//! Observation model
//!
//! One scouter's record of one robot in one match. The JSON field names are
//! the wire format used by the scouting app and must not change.
//!
//! Identity fields (`Team`, `Match`, `Scouter`, `Driver Station`) are
//! required; every payload section defaults to empty when absent.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Data from one scouter for one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Team number of the observed robot
    #[serde(rename = "Team")]
    pub team_number: u32,

    /// Match number and replay flag
    #[serde(rename = "Match")]
    pub match_info: MatchInfo,

    /// Scouter who recorded this data
    #[serde(rename = "Scouter")]
    pub scouter: String,

    /// Driver station of the observed robot
    #[serde(rename = "Driver Station")]
    pub driver_station: DriverStation,

    /// Logged cycles, ordered by time since match start
    #[serde(rename = "Cycles", default, deserialize_with = "null_as_default")]
    pub cycles: Vec<Cycle>,

    #[serde(rename = "Speaker Positions", default)]
    pub speaker_positions: SpeakerPositions,

    #[serde(rename = "Pickup Locations", default)]
    pub pickups: PickupLocations,

    #[serde(rename = "Auto", default)]
    pub auto: AutoData,

    #[serde(rename = "Climbing", default)]
    pub climb: ClimbData,

    #[serde(rename = "Trap", default)]
    pub trap: TrapData,

    #[serde(rename = "Misc", default)]
    pub misc: MiscData,

    #[serde(rename = "Penalties", default, deserialize_with = "null_as_default")]
    pub penalties: Vec<String>,

    /// Replaces every earlier observation of this match and driver station
    #[serde(rename = "Rescouting", default)]
    pub rescouting: bool,

    #[serde(rename = "Notes", default, deserialize_with = "null_as_default")]
    pub notes: String,
}

/// Decode an explicit `null` the same as an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Observation {
    /// Decode a submission payload
    ///
    /// Any shape mismatch (missing identity field, unknown cycle type,
    /// driver station outside 1..=3) is reported as [`Error::Decode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Encode for storage in the file store
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Internal(format!("Failed to encode observation: {}", e)))
    }
}

/// Basic info about the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(rename = "Number")]
    pub number: u32,

    #[serde(rename = "isReplay", default)]
    pub is_replay: bool,
}

impl MatchInfo {
    /// "replay" for replayed matches, empty otherwise
    pub fn replay_str(&self) -> &'static str {
        if self.is_replay {
            "replay"
        } else {
            ""
        }
    }
}

/// Alliance color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alliance {
    Red,
    Blue,
}

impl Alliance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alliance::Red => "red",
            Alliance::Blue => "blue",
        }
    }
}

/// One of the six robot positions in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDriverStation", into = "RawDriverStation")]
pub struct DriverStation {
    alliance: Alliance,
    index: u8,
}

impl DriverStation {
    /// Build a driver station; `index` must be 1..=3
    pub fn new(alliance: Alliance, index: u8) -> Result<Self> {
        if !(1..=3).contains(&index) {
            return Err(Error::InvalidInput(format!(
                "Driver station index must be 1-3, got {}",
                index
            )));
        }
        Ok(Self { alliance, index })
    }

    pub fn alliance(&self) -> Alliance {
        self.alliance
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn is_blue(&self) -> bool {
        self.alliance == Alliance::Blue
    }

    /// Position of this station within a match block: red1..red3 = 0..2,
    /// blue1..blue3 = 3..5
    pub fn offset(&self) -> u32 {
        let base = match self.alliance {
            Alliance::Red => 0,
            Alliance::Blue => 3,
        };
        base + u32::from(self.index) - 1
    }

    /// Parse `red1`..`blue3`
    pub fn parse(s: &str) -> Option<Self> {
        let (alliance, rest) = if let Some(rest) = s.strip_prefix("red") {
            (Alliance::Red, rest)
        } else if let Some(rest) = s.strip_prefix("blue") {
            (Alliance::Blue, rest)
        } else {
            return None;
        };

        let index: u8 = rest.parse().ok()?;
        Self::new(alliance, index).ok()
    }
}

impl fmt::Display for DriverStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.alliance.as_str(), self.index)
    }
}

/// Wire shape of a driver station
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawDriverStation {
    #[serde(rename = "Is Blue", default)]
    is_blue: bool,
    #[serde(rename = "Number")]
    number: u8,
}

impl TryFrom<RawDriverStation> for DriverStation {
    type Error = String;

    fn try_from(raw: RawDriverStation) -> std::result::Result<Self, Self::Error> {
        let alliance = if raw.is_blue { Alliance::Blue } else { Alliance::Red };
        DriverStation::new(alliance, raw.number).map_err(|e| e.to_string())
    }
}

impl From<DriverStation> for RawDriverStation {
    fn from(ds: DriverStation) -> Self {
        Self {
            is_blue: ds.is_blue(),
            number: ds.index,
        }
    }
}

/// Kind of scoring attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleType {
    Amp,
    Speaker,
    Distance,
    Shuttle,
    /// Placeholder sent by the app when nothing was logged
    None,
}

/// One logged scoring attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Seconds since match start
    #[serde(rename = "Time")]
    pub time: f64,

    #[serde(rename = "Type")]
    pub kind: CycleType,

    #[serde(rename = "Success", default)]
    pub success: bool,
}

/// Autonomous period data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoData {
    #[serde(rename = "Can", default)]
    pub can: bool,
    #[serde(rename = "Scores", default)]
    pub scores: u32,
    #[serde(rename = "Misses", default)]
    pub misses: u32,
    #[serde(rename = "Ejects", default)]
    pub ejects: u32,
}

/// Endgame climb
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimbData {
    #[serde(rename = "Succeeded", default)]
    pub succeeded: bool,
    /// Seconds taken; zero means no attempt
    #[serde(rename = "Time", default)]
    pub time: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapData {
    #[serde(rename = "Attempts", default)]
    pub attempts: u32,
    #[serde(rename = "Score", default)]
    pub score: u32,
}

/// Positions the robot shot into the speaker from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerPositions {
    #[serde(rename = "sides", default)]
    pub sides: bool,
    #[serde(rename = "Middle", default)]
    pub middle: bool,
}

impl SpeakerPositions {
    /// BOTH / MIDDLE / SIDES / NONE
    pub fn label(&self) -> &'static str {
        match (self.sides, self.middle) {
            (true, true) => "BOTH",
            (false, true) => "MIDDLE",
            (true, false) => "SIDES",
            (false, false) => "NONE",
        }
    }
}

/// Where the robot picked notes up from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupLocations {
    #[serde(rename = "ground", default)]
    pub ground: bool,
    #[serde(rename = "source", default)]
    pub source: bool,
}

impl PickupLocations {
    /// BOTH / GROUND / SOURCE / NONE
    pub fn label(&self) -> &'static str {
        match (self.ground, self.source) {
            (true, true) => "BOTH",
            (true, false) => "GROUND",
            (false, true) => "SOURCE",
            (false, false) => "NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscData {
    #[serde(rename = "Parked", default)]
    pub parked: bool,
    #[serde(rename = "Lost Communication", default)]
    pub disconnected: bool,
    #[serde(rename = "User Lost Track", default)]
    pub lost_track: bool,
    #[serde(rename = "Disabled", default)]
    pub disabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Team": 1816,
        "Match": {"Number": 12, "isReplay": false},
        "Scouter": "ada",
        "Driver Station": {"Is Blue": true, "Number": 2},
        "Cycles": [
            {"Time": 10.5, "Type": "Speaker", "Success": true},
            {"Time": 22.0, "Type": "Amp", "Success": false}
        ],
        "Speaker Positions": {"sides": true, "Middle": false},
        "Pickup Locations": {"ground": true, "source": false},
        "Auto": {"Can": true, "Scores": 2, "Misses": 1, "Ejects": 0},
        "Climbing": {"Succeeded": true, "Time": 6.5},
        "Trap": {"Attempts": 1, "Score": 1},
        "Misc": {"Parked": false, "Lost Communication": false, "User Lost Track": true, "Disabled": false},
        "Penalties": ["Tech Foul"],
        "Rescouting": false,
        "Notes": "fast"
    }"#;

    #[test]
    fn test_decode_full_payload() {
        let obs = Observation::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(obs.team_number, 1816);
        assert_eq!(obs.match_info.number, 12);
        assert_eq!(obs.driver_station.to_string(), "blue2");
        assert_eq!(obs.cycles.len(), 2);
        assert_eq!(obs.cycles[1].kind, CycleType::Amp);
        assert!(obs.misc.lost_track);
        assert_eq!(obs.penalties, vec!["Tech Foul".to_string()]);
    }

    #[test]
    fn test_decode_defaults_payload_sections() {
        let obs = Observation::decode(
            br#"{"Team": 254, "Match": {"Number": 1}, "Scouter": "bo", "Driver Station": {"Is Blue": false, "Number": 3}}"#,
        )
        .unwrap();
        assert!(obs.cycles.is_empty());
        assert!(!obs.rescouting);
        assert_eq!(obs.auto, AutoData::default());
        assert_eq!(obs.driver_station.to_string(), "red3");
    }

    #[test]
    fn test_decode_null_lists_as_empty() {
        let obs = Observation::decode(
            br#"{"Team": 118, "Match": {"Number": 3}, "Scouter": "ada",
                "Driver Station": {"Is Blue": true, "Number": 2},
                "Cycles": null, "Penalties": null, "Notes": null}"#,
        )
        .unwrap();
        assert!(obs.cycles.is_empty());
        assert!(obs.penalties.is_empty());
        assert_eq!(obs.notes, "");
        assert_eq!(obs.num_cycles(), 0);
    }

    #[test]
    fn test_decode_missing_team_is_decode_error() {
        let result = Observation::decode(
            br#"{"Match": {"Number": 1}, "Scouter": "bo", "Driver Station": {"Is Blue": false, "Number": 3}}"#,
        );
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_out_of_range_station() {
        let result = Observation::decode(
            br#"{"Team": 1, "Match": {"Number": 1}, "Scouter": "bo", "Driver Station": {"Is Blue": true, "Number": 4}}"#,
        );
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_unknown_cycle_type() {
        let result = Observation::decode(
            br#"{"Team": 1, "Match": {"Number": 1}, "Scouter": "bo", "Driver Station": {"Number": 1},
                "Cycles": [{"Time": 1.0, "Type": "Trap", "Success": true}]}"#,
        );
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_encode_keeps_wire_names() {
        let obs = Observation::decode(SAMPLE.as_bytes()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&obs.encode().unwrap()).unwrap();
        assert_eq!(value["Driver Station"]["Is Blue"], true);
        assert_eq!(value["Driver Station"]["Number"], 2);
        assert_eq!(value["Misc"]["User Lost Track"], true);
        assert_eq!(Observation::decode(&obs.encode().unwrap()).unwrap(), obs);
    }

    #[test]
    fn test_driver_station_parse_and_offset() {
        let expected = ["red1", "red2", "red3", "blue1", "blue2", "blue3"];
        for (offset, name) in expected.iter().enumerate() {
            let ds = DriverStation::parse(name).unwrap();
            assert_eq!(ds.offset(), offset as u32);
            assert_eq!(ds.to_string(), *name);
        }
        assert!(DriverStation::parse("green1").is_none());
        assert!(DriverStation::parse("red0").is_none());
        assert!(DriverStation::parse("blue").is_none());
    }

    #[test]
    fn test_position_labels() {
        assert_eq!(SpeakerPositions { sides: true, middle: true }.label(), "BOTH");
        assert_eq!(SpeakerPositions { sides: false, middle: true }.label(), "MIDDLE");
        assert_eq!(SpeakerPositions::default().label(), "NONE");
        assert_eq!(PickupLocations { ground: false, source: true }.label(), "SOURCE");
        assert_eq!(PickupLocations { ground: true, source: false }.label(), "GROUND");
    }
}

//! File naming and Match Grouping
//!
//! File names are the only record of what a file holds:
//! `{event}_{match}_{station}_{millis}.json` for matches and
//! `{event}_{team}.json` for pit visits. The first three fields of a match
//! name form its group key; files sharing a key observed the same robot.

use gs_common::DriverStation;
use tracing::warn;

use crate::error::StoreError;
use crate::store::{FileStore, Stage};

const EXTENSION: &str = ".json";

/// What a stored file name says about its contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKey {
    Match {
        event: String,
        match_number: u32,
        driver_station: DriverStation,
        submitted_ms: i64,
    },
    Pit {
        event: String,
        team: u32,
    },
}

impl FileKey {
    /// Parse a stored file name; `None` for anything else
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(EXTENSION)?;
        let fields: Vec<&str> = stem.split('_').collect();

        match fields.as_slice() {
            [event, team] if !event.is_empty() => Some(FileKey::Pit {
                event: event.to_string(),
                team: team.parse().ok()?,
            }),
            [event, match_number, station, millis] if !event.is_empty() => Some(FileKey::Match {
                event: event.to_string(),
                match_number: match_number.parse().ok()?,
                driver_station: DriverStation::parse(station)?,
                submitted_ms: millis.parse().ok()?,
            }),
            _ => None,
        }
    }

    pub fn is_pit(&self) -> bool {
        matches!(self, FileKey::Pit { .. })
    }

    pub fn match_file_name(
        event: &str,
        match_number: u32,
        driver_station: DriverStation,
        submitted_ms: i64,
    ) -> String {
        format!("{}_{}_{}_{}{}", event, match_number, driver_station, submitted_ms, EXTENSION)
    }

    pub fn pit_file_name(event: &str, team: u32) -> String {
        format!("{}_{}{}", event, team, EXTENSION)
    }
}

/// `{event}_{match}_{station}` of a match file name
///
/// Needs at least four underscore-separated fields; pit names and other
/// short names have no group.
pub fn group_key(name: &str) -> Option<String> {
    let stem = name.strip_suffix(EXTENSION).unwrap_or(name);
    let fields: Vec<&str> = stem.split('_').collect();
    if fields.len() < 4 {
        return None;
    }
    Some(fields[..3].join("_"))
}

/// Written files that observed the same match and driver station as `name`
pub fn find_siblings(store: &FileStore, name: &str) -> Result<Vec<String>, StoreError> {
    let Some(key) = group_key(name) else {
        return Ok(Vec::new());
    };

    Ok(store
        .list_pending(Stage::Written)?
        .filter(|candidate| candidate != name)
        .filter(|candidate| group_key(candidate).as_deref() == Some(key.as_str()))
        .collect())
}

/// Scouters whose Written files cover one match and driver station
///
/// Files that no longer decode are skipped with a warning.
pub fn scouters_for(
    store: &FileStore,
    event: &str,
    match_number: u32,
    driver_station: DriverStation,
) -> Result<Vec<String>, StoreError> {
    let key = format!("{}_{}_{}", event, match_number, driver_station);

    let mut scouters = Vec::new();
    for name in store.list_pending(Stage::Written)? {
        if group_key(&name).as_deref() != Some(key.as_str()) {
            continue;
        }
        let bytes = store.read(Stage::Written, &name)?;
        match gs_common::Observation::decode(&bytes) {
            Ok(obs) => scouters.push(obs.scouter),
            Err(e) => warn!(file = %name, error = %e, "Skipping undecodable written file"),
        }
    }
    scouters.sort();
    Ok(scouters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_common::Alliance;
    use tempfile::TempDir;

    fn blue2() -> DriverStation {
        DriverStation::new(Alliance::Blue, 2).unwrap()
    }

    #[test]
    fn test_parse_match_name() {
        let key = FileKey::parse("2024gaalb_3_blue2_1712345678901.json").unwrap();
        assert_eq!(
            key,
            FileKey::Match {
                event: "2024gaalb".to_string(),
                match_number: 3,
                driver_station: blue2(),
                submitted_ms: 1712345678901,
            }
        );
        assert!(!key.is_pit());
    }

    #[test]
    fn test_parse_pit_name() {
        let key = FileKey::parse("2024gaalb_1816.json").unwrap();
        assert_eq!(key, FileKey::Pit { event: "2024gaalb".to_string(), team: 1816 });
        assert!(key.is_pit());
    }

    #[test]
    fn test_parse_rejects_unknown_shapes() {
        assert_eq!(FileKey::parse("1712345678901.json"), None);
        assert_eq!(FileKey::parse("2024gaalb_3_green2_1.json"), None);
        assert_eq!(FileKey::parse("2024gaalb_3_blue2_1.txt"), None);
        assert_eq!(FileKey::parse("2024gaalb_x.json"), None);
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            FileKey::match_file_name("2024gaalb", 3, blue2(), 99),
            "2024gaalb_3_blue2_99.json"
        );
        assert_eq!(FileKey::pit_file_name("2024gaalb", 118), "2024gaalb_118.json");
    }

    #[test]
    fn test_group_key() {
        assert_eq!(group_key("ev_3_blue2_100.json").as_deref(), Some("ev_3_blue2"));
        assert_eq!(group_key("ev_118.json"), None);
        assert_eq!(group_key("ev_3_blue2.json"), None);
    }

    #[test]
    fn test_find_siblings_matches_first_three_fields() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        for name in [
            "ev_3_blue2_100.json",
            "ev_3_blue2_200.json",
            "ev_3_blue1_300.json",
            "ev_13_blue2_400.json",
            "ev_3.json",
        ] {
            store.write_new(Stage::Written, name, b"{}").unwrap();
        }

        let mut siblings = find_siblings(&store, "ev_3_blue2_500.json").unwrap();
        siblings.sort();
        assert_eq!(siblings, vec!["ev_3_blue2_100.json", "ev_3_blue2_200.json"]);

        assert!(find_siblings(&store, "ev_3.json").unwrap().is_empty());
    }

    #[test]
    fn test_scouters_for() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let obs = |scouter: &str| {
            format!(
                r#"{{"Team": 118, "Match": {{"Number": 3}}, "Scouter": "{}",
                    "Driver Station": {{"Is Blue": true, "Number": 2}}}}"#,
                scouter
            )
        };
        store.write_new(Stage::Written, "ev_3_blue2_1.json", obs("zed").as_bytes()).unwrap();
        store.write_new(Stage::Written, "ev_3_blue2_2.json", obs("amy").as_bytes()).unwrap();
        store.write_new(Stage::Written, "ev_3_blue2_3.json", b"not json").unwrap();
        store.write_new(Stage::Written, "ev_4_blue2_4.json", obs("other").as_bytes()).unwrap();

        let scouters = scouters_for(&store, "ev", 3, blue2()).unwrap();
        assert_eq!(scouters, vec!["amy", "zed"]);
    }
}

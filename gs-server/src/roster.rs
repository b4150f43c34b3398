//! Event team roster
//!
//! The team list file has a header line followed by one team number per
//! line. A team's pit row is its 1-based position in that list.

use std::path::Path;
use tracing::{info, warn};

use crate::error::RosterError;

/// Ordered list of teams attending one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamRoster {
    event_key: String,
    teams: Vec<u32>,
}

impl TeamRoster {
    pub fn new(event_key: impl Into<String>, teams: Vec<u32>) -> Self {
        Self {
            event_key: event_key.into(),
            teams,
        }
    }

    /// Parse team list text; malformed lines are logged and skipped
    pub fn parse(event_key: impl Into<String>, content: &str) -> Self {
        let event_key = event_key.into();
        let mut teams = Vec::new();

        for (line_no, line) in content.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<u32>() {
                Ok(team) => teams.push(team),
                Err(e) => warn!(
                    event = %event_key,
                    line = line_no + 1,
                    value = %line,
                    error = %e,
                    "Skipping malformed team list entry"
                ),
            }
        }

        Self { event_key, teams }
    }

    pub fn load(path: &Path, event_key: impl Into<String>) -> Result<Self, RosterError> {
        let content = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let roster = Self::parse(event_key, &content);
        info!(
            event = %roster.event_key,
            teams = roster.teams.len(),
            "Loaded team list from {}",
            path.display()
        );
        Ok(roster)
    }

    pub fn event_key(&self) -> &str {
        &self.event_key
    }

    pub fn teams(&self) -> &[u32] {
        &self.teams
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Pit spreadsheet row for `team`
    pub fn row_for_pit(&self, team: u32) -> Result<u32, RosterError> {
        gs_common::metrics::row_for_pit(&self.teams, team).ok_or_else(|| RosterError::TeamNotFound {
            team,
            event: self.event_key.clone(),
        })
    }
}

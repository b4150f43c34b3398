//! Spreadsheet row layout
//!
//! Builds the fixed column sets written for single-scouted matches,
//! reconciled matches and pit visits. Undefined metrics become the text
//! cell `N/A`.

use serde::Serialize;
use std::fmt;

use crate::consensus::Consensus;
use crate::metrics::{as_percent, PerAction};
use crate::observation::Observation;
use crate::pit::PitObservation;

/// Text written in place of an undefined value
pub const NOT_APPLICABLE: &str = "N/A";

/// One spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Int(i64),
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    pub fn not_applicable() -> Self {
        CellValue::Text(NOT_APPLICABLE.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<u32> for CellValue {
    fn from(v: u32) -> Self {
        CellValue::Int(i64::from(v))
    }
}

impl From<usize> for CellValue {
    fn from(v: usize) -> Self {
        CellValue::Int(v as i64)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_else(CellValue::not_applicable)
    }
}

/// Sheet tab a row is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetTarget {
    /// Per-match rows
    RawData,
    /// Per-team pit rows
    PitScouting,
}

impl SheetTarget {
    pub fn tab_name(&self) -> &'static str {
        match self {
            SheetTarget::RawData => "RawData",
            SheetTarget::PitScouting => "PitScouting",
        }
    }
}

impl fmt::Display for SheetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tab_name())
    }
}

/// A row of cells addressed to one spreadsheet row
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub target: SheetTarget,
    /// 1-based row number
    pub row: u32,
    pub cells: Vec<CellValue>,
}

impl SheetRow {
    /// Data columns start at B; column A holds the match number
    pub fn range(&self) -> String {
        format!("{}!B{}", self.target, self.row)
    }
}

fn tendency_accuracy_cells(tendencies: PerAction<f64>, accuracies: PerAction<Option<f64>>) -> [CellValue; 8] {
    [
        as_percent(tendencies.amp).into(),
        accuracies.amp.into(),
        as_percent(tendencies.speaker).into(),
        accuracies.speaker.into(),
        as_percent(tendencies.distance).into(),
        accuracies.distance.into(),
        as_percent(tendencies.shuttle).into(),
        accuracies.shuttle.into(),
    ]
}

/// Cells for a single-scouted match
pub fn observation_cells(obs: &Observation) -> Vec<CellValue> {
    let mut cells: Vec<CellValue> = vec![
        obs.team_number.into(),
        obs.avg_cycle_time().into(),
        obs.num_cycles().into(),
    ];
    cells.extend(tendency_accuracy_cells(obs.cycle_tendencies(), obs.cycle_accuracies()));
    let tail: [CellValue; 11] = [
        obs.speaker_positions.label().into(),
        obs.pickups.label().into(),
        obs.auto.can.into(),
        obs.auto.scores.into(),
        obs.auto_accuracy().into(),
        obs.auto.ejects.into(),
        obs.climb.succeeded.into(),
        obs.climb.time.into(),
        obs.misc.parked.into(),
        obs.trap.score.into(),
        compile_notes(obs).into(),
    ];
    cells.extend(tail);
    cells
}

/// Cells for a reconciled match
pub fn consensus_cells(c: &Consensus) -> Vec<CellValue> {
    let mut cells: Vec<CellValue> = vec![
        c.team_number.into(),
        c.cycles.avg_cycle_time.into(),
        c.cycles.num_cycles.into(),
    ];
    cells.extend(tendency_accuracy_cells(c.cycle_tendencies(), c.cycle_accuracies()));
    let tail: [CellValue; 11] = [
        c.speaker_positions.label().into(),
        c.pickups.label().into(),
        c.auto.can.into(),
        c.auto.scores.into(),
        c.auto_accuracy().into(),
        c.auto.ejects.into(),
        c.climb.succeeded.into(),
        c.climb.time.into(),
        c.parked.into(),
        c.trap_score.into(),
        compile_consensus_notes(c).into(),
    ];
    cells.extend(tail);
    cells
}

/// Cells for a pit visit
pub fn pit_cells(pit: &PitObservation) -> Vec<CellValue> {
    let cells: Vec<CellValue> = vec![
        pit.team_number.into(),
        pit.pit_identifier.as_str().into(),
        pit.drivetrain.as_str().into(),
        pit.sides.label().into(),
        pit.distance.can.into(),
        pit.shooting_distance().into(),
        pit.auto_scores.into(),
        pit.middle_notes.into(),
        pit.note_detection.into(),
        pit.cycles.into(),
        pit.driver_experience.into(),
        pit.bot_type.as_str().into(),
        pit.endgame_behavior.as_str().into(),
        pit.endgame_climb_time().into(),
    ];
    cells
}

/// Lost track, disconnects, penalties and notes as one cell
pub fn compile_notes(obs: &Observation) -> String {
    let mut note = String::new();
    if obs.misc.lost_track {
        note.push_str("LOST TRACK; ");
    }
    if obs.misc.disconnected || obs.misc.disabled {
        note.push_str("DISCONNECTED; ");
    }
    if !obs.penalties.is_empty() {
        note.push_str(&format!("PENALTIES= {}; ", obs.penalties.join(",")));
    }
    note.push_str(&obs.notes);
    note
}

pub fn compile_consensus_notes(c: &Consensus) -> String {
    let mut note = String::new();
    if c.lost_track {
        note.push_str("LOST TRACK; ");
    }
    if c.disconnected {
        note.push_str("DISCONNECTED; ");
    }
    if c.has_mismatch() {
        note.push_str("SCOUTER MISMATCH; ");
    }
    if !c.penalties.is_empty() {
        note.push_str(&format!("PENALTIES= {}; ", c.penalties.join(",")));
    }
    note.push_str(&c.notes.join("; "));
    note
}

/// Number of cells in a match row
pub const MATCH_COLUMNS: usize = 22;

/// Number of cells in a pit row
pub const PIT_COLUMNS: usize = 14;

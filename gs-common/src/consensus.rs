//! Multi-scouter reconciliation
//!
//! Merges independent observations of the same match, team and driver
//! station into one consensus record.
//!
//! # Merge rules
//! - Identity (team, match, driver station) comes from the first
//!   observation; a differing team number sets `team_mismatch`.
//! - Boolean fields are OR-ed: one "yes" makes the consensus "yes".
//! - Numeric fields are arithmetic means. Climb times of zero are left out
//!   (no attempt). An empty mean resolves to zero.
//! - Cycles are the union of every valid cycle list. The cycle aggregate is
//!   flagged when per-scouter cycle counts differ or when per-scouter
//!   average cycle times spread by more than [`CYCLE_TIME_TOLERANCE`].
//!
//! The result depends only on the input order, never on arrival time.

use tracing::{debug, warn};

use crate::metrics::{self, PerAction};
use crate::observation::{Cycle, DriverStation, MatchInfo, Observation, PickupLocations, SpeakerPositions};
use crate::{Error, Result};

/// Allowed spread, in seconds, between scouters' average cycle times
pub const CYCLE_TIME_TOLERANCE: f64 = 1.0;

/// Reconciled record for one match, team and driver station
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub team_number: u32,
    /// Contributors disagreed on the team number (first value kept)
    pub team_mismatch: bool,
    pub match_info: MatchInfo,
    pub driver_station: DriverStation,
    pub scouters: Vec<String>,
    pub cycles: CycleAggregate,
    pub speaker_positions: SpeakerPositions,
    pub pickups: PickupLocations,
    pub auto: AutoAggregate,
    pub climb: ClimbAggregate,
    pub parked: bool,
    pub trap_score: f64,
    pub lost_track: bool,
    pub disconnected: bool,
    pub penalties: Vec<String>,
    pub notes: Vec<String>,
}

/// Combined cycle data
#[derive(Debug, Clone, PartialEq)]
pub struct CycleAggregate {
    /// Every valid cycle from every contributor, in contributor order
    pub all_cycles: Vec<Cycle>,
    /// Mean per-scouter cycle count, rounded
    pub num_cycles: usize,
    /// Mean of per-scouter average cycle times, over scouters with cycles
    pub avg_cycle_time: f64,
    pub had_mismatches: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoAggregate {
    pub can: bool,
    pub scores: f64,
    pub misses: f64,
    pub ejects: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimbAggregate {
    pub succeeded: bool,
    /// Mean over contributors that reported a nonzero time
    pub time: f64,
}

impl Consensus {
    /// Scouter names joined for display
    pub fn scouters_label(&self) -> String {
        self.scouters.join(", ")
    }

    /// True when scouters disagreed on anything that is checked
    pub fn has_mismatch(&self) -> bool {
        self.cycles.had_mismatches || self.team_mismatch
    }

    pub fn cycle_tendencies(&self) -> PerAction<f64> {
        metrics::cycle_tendencies(&self.cycles.all_cycles)
    }

    pub fn cycle_accuracies(&self) -> PerAction<Option<f64>> {
        metrics::cycle_accuracies(&self.cycles.all_cycles)
    }

    pub fn auto_accuracy(&self) -> Option<f64> {
        metrics::accuracy(self.auto.scores, self.auto.misses)
    }
}

/// Merge observations into a consensus
///
/// Fails only on an empty input list.
pub fn merge(observations: &[Observation]) -> Result<Consensus> {
    let first = observations
        .first()
        .ok_or_else(|| Error::InvalidInput("Cannot merge zero observations".to_string()))?;

    let team_mismatch = observations.iter().any(|o| o.team_number != first.team_number);
    if team_mismatch {
        warn!(
            team = first.team_number,
            match_number = first.match_info.number,
            driver_station = %first.driver_station,
            "Scouters disagree on team number, keeping the first"
        );
    }

    let cycles = merge_cycles(observations);

    let consensus = Consensus {
        team_number: first.team_number,
        team_mismatch,
        match_info: first.match_info,
        driver_station: first.driver_station,
        scouters: observations.iter().map(|o| o.scouter.clone()).collect(),
        cycles,
        speaker_positions: SpeakerPositions {
            sides: observations.iter().any(|o| o.speaker_positions.sides),
            middle: observations.iter().any(|o| o.speaker_positions.middle),
        },
        pickups: PickupLocations {
            ground: observations.iter().any(|o| o.pickups.ground),
            source: observations.iter().any(|o| o.pickups.source),
        },
        auto: AutoAggregate {
            can: observations.iter().any(|o| o.auto.can),
            scores: mean(observations.iter().map(|o| f64::from(o.auto.scores))),
            misses: mean(observations.iter().map(|o| f64::from(o.auto.misses))),
            ejects: mean(observations.iter().map(|o| f64::from(o.auto.ejects))),
        },
        climb: ClimbAggregate {
            succeeded: observations.iter().any(|o| o.climb.succeeded),
            time: mean(observations.iter().map(|o| o.climb.time).filter(|&t| t > 0.0)),
        },
        parked: observations.iter().any(|o| o.misc.parked),
        trap_score: mean(observations.iter().map(|o| f64::from(o.trap.score))),
        lost_track: observations.iter().any(|o| o.misc.lost_track),
        disconnected: observations.iter().any(|o| o.misc.disconnected || o.misc.disabled),
        penalties: observations.iter().flat_map(|o| o.penalties.iter().cloned()).collect(),
        notes: observations
            .iter()
            .map(|o| o.notes.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect(),
    };

    debug!(
        team = consensus.team_number,
        scouters = observations.len(),
        mismatch = consensus.has_mismatch(),
        "Merged observations"
    );

    Ok(consensus)
}

fn merge_cycles(observations: &[Observation]) -> CycleAggregate {
    let counts: Vec<usize> = observations.iter().map(Observation::num_cycles).collect();
    let count_mismatch = counts.iter().any(|&c| c != counts[0]);

    // Scouters with no cycles are excluded, not averaged in as zero
    let averages: Vec<f64> = observations.iter().filter_map(Observation::avg_cycle_time).collect();
    let time_mismatch = spread(&averages) > CYCLE_TIME_TOLERANCE;

    let all_cycles = observations
        .iter()
        .filter(|o| metrics::cycles_are_valid(&o.cycles))
        .flat_map(|o| o.cycles.iter().copied())
        .collect();

    CycleAggregate {
        all_cycles,
        num_cycles: mean(counts.iter().map(|&c| c as f64)).round() as usize,
        avg_cycle_time: mean(averages.iter().copied()),
        had_mismatches: count_mismatch || time_mismatch,
    }
}

/// Arithmetic mean, zero for an empty sequence
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// max - min, zero for fewer than two values
fn spread(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if values.len() < 2 {
        0.0
    } else {
        max - min
    }
}

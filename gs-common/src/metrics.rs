//! Derived metrics and row addressing
//!
//! Pure functions over cycle lists. A cycle list that is empty, or whose
//! first cycle is [`CycleType::None`], is a placeholder and counts as zero
//! cycles everywhere in this module.
//!
//! Undefined values (accuracy with no attempts, average time with no
//! cycles) are `None`, never NaN.

use crate::observation::{AutoData, Cycle, CycleType, DriverStation, Observation};

/// Spreadsheet rows reserved per match (one per driver station)
pub const ROWS_PER_MATCH: u32 = 6;

/// First spreadsheet row holding match data (row 1 is the header)
pub const FIRST_MATCH_ROW: u32 = 2;

/// One value per scoring action type
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerAction<T> {
    pub amp: T,
    pub speaker: T,
    pub distance: T,
    pub shuttle: T,
}

impl<T: Copy> PerAction<T> {
    /// Value for `kind`; `None` placeholder cycles have no slot
    pub fn get(&self, kind: CycleType) -> Option<T> {
        match kind {
            CycleType::Amp => Some(self.amp),
            CycleType::Speaker => Some(self.speaker),
            CycleType::Distance => Some(self.distance),
            CycleType::Shuttle => Some(self.shuttle),
            CycleType::None => None,
        }
    }
}

/// True when the list holds real cycles rather than a placeholder
pub fn cycles_are_valid(cycles: &[Cycle]) -> bool {
    cycles.first().is_some_and(|c| c.kind != CycleType::None)
}

/// The cycles that count, or an empty slice for a placeholder list
fn valid(cycles: &[Cycle]) -> &[Cycle] {
    if cycles_are_valid(cycles) {
        cycles
    } else {
        &[]
    }
}

pub fn num_cycles(cycles: &[Cycle]) -> usize {
    valid(cycles).len()
}

/// Time of the last logged cycle divided by the cycle count
///
/// This is not the mean of per-cycle durations; the sheet has always used
/// this approximation and historical rows must stay comparable.
pub fn avg_cycle_time(cycles: &[Cycle]) -> Option<f64> {
    let cycles = valid(cycles);
    let last = cycles.last()?;
    Some(last.time / cycles.len() as f64)
}

/// Percentage of successful cycles
pub fn cycle_accuracy(cycles: &[Cycle]) -> Option<f64> {
    let cycles = valid(cycles);
    if cycles.is_empty() {
        return None;
    }
    let made = cycles.iter().filter(|c| c.success).count();
    Some(made as f64 / cycles.len() as f64 * 100.0)
}

/// Fraction (0..=1) of all cycles having each action type
pub fn cycle_tendencies(cycles: &[Cycle]) -> PerAction<f64> {
    let cycles = valid(cycles);
    if cycles.is_empty() {
        return PerAction::default();
    }

    let total = cycles.len() as f64;
    let share = |kind: CycleType| cycles.iter().filter(|c| c.kind == kind).count() as f64 / total;

    PerAction {
        amp: share(CycleType::Amp),
        speaker: share(CycleType::Speaker),
        distance: share(CycleType::Distance),
        shuttle: share(CycleType::Shuttle),
    }
}

/// Percentage of successful attempts per action type
///
/// Each type is independent: a type with zero attempts is `None` even when
/// other types have attempts.
pub fn cycle_accuracies(cycles: &[Cycle]) -> PerAction<Option<f64>> {
    let cycles = valid(cycles);
    let accuracy = |kind: CycleType| {
        let (attempts, made) = cycles
            .iter()
            .filter(|c| c.kind == kind)
            .fold((0usize, 0usize), |(a, m), c| (a + 1, m + usize::from(c.success)));
        (attempts > 0).then(|| made as f64 / attempts as f64 * 100.0)
    };

    PerAction {
        amp: accuracy(CycleType::Amp),
        speaker: accuracy(CycleType::Speaker),
        distance: accuracy(CycleType::Distance),
        shuttle: accuracy(CycleType::Shuttle),
    }
}

/// scored / (scored + missed) × 100, undefined with no attempts
pub fn accuracy(scored: f64, missed: f64) -> Option<f64> {
    let attempts = scored + missed;
    (attempts > 0.0).then(|| scored / attempts * 100.0)
}

pub fn auto_accuracy(auto: &AutoData) -> Option<f64> {
    accuracy(f64::from(auto.scores), f64::from(auto.misses))
}

/// Fraction rendered as a percentage rounded to two decimals
pub fn as_percent(fraction: f64) -> f64 {
    (fraction * 10000.0).round() / 100.0
}

/// Spreadsheet row for one match and driver station
///
/// Each match owns a block of six rows starting at row 2, ordered
/// red1, red2, red3, blue1, blue2, blue3. Match numbers start at 1;
/// match 0 has no row.
pub fn row_for_match(match_number: u32, driver_station: DriverStation) -> Option<u32> {
    let index = match_number.checked_sub(1)?;
    Some(FIRST_MATCH_ROW + index * ROWS_PER_MATCH + driver_station.offset())
}

/// 1-based position of `team` in the event roster
pub fn row_for_pit(roster: &[u32], team: u32) -> Option<u32> {
    roster.iter().position(|&t| t == team).map(|i| i as u32 + 1)
}

impl Observation {
    pub fn num_cycles(&self) -> usize {
        num_cycles(&self.cycles)
    }

    pub fn avg_cycle_time(&self) -> Option<f64> {
        avg_cycle_time(&self.cycles)
    }

    pub fn cycle_accuracy(&self) -> Option<f64> {
        cycle_accuracy(&self.cycles)
    }

    pub fn cycle_tendencies(&self) -> PerAction<f64> {
        cycle_tendencies(&self.cycles)
    }

    pub fn cycle_accuracies(&self) -> PerAction<Option<f64>> {
        cycle_accuracies(&self.cycles)
    }

    pub fn auto_accuracy(&self) -> Option<f64> {
        auto_accuracy(&self.auto)
    }

    pub fn row(&self) -> Option<u32> {
        row_for_match(self.match_info.number, self.driver_station)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Alliance;

    fn cycle(time: f64, kind: CycleType, success: bool) -> Cycle {
        Cycle { time, kind, success }
    }

    fn sample_cycles() -> Vec<Cycle> {
        vec![
            cycle(5.0, CycleType::Speaker, true),
            cycle(15.0, CycleType::Speaker, false),
            cycle(30.0, CycleType::Amp, true),
        ]
    }

    #[test]
    fn test_num_cycles_placeholder_lists_are_zero() {
        assert_eq!(num_cycles(&[]), 0);
        assert_eq!(num_cycles(&[cycle(0.0, CycleType::None, false)]), 0);
        assert_eq!(
            num_cycles(&[cycle(0.0, CycleType::None, false), cycle(4.0, CycleType::Amp, true)]),
            0
        );
        assert_eq!(num_cycles(&sample_cycles()), 3);
    }

    #[test]
    fn test_avg_cycle_time_uses_last_time() {
        assert_eq!(avg_cycle_time(&sample_cycles()), Some(10.0));
        assert_eq!(avg_cycle_time(&[]), None);
        assert_eq!(avg_cycle_time(&[cycle(9.0, CycleType::None, true)]), None);
    }

    #[test]
    fn test_cycle_accuracy() {
        let accuracy = cycle_accuracy(&sample_cycles()).unwrap();
        assert!((accuracy - 66.666).abs() < 0.01);
        assert_eq!(cycle_accuracy(&[]), None);
    }

    #[test]
    fn test_cycle_tendencies() {
        let t = cycle_tendencies(&sample_cycles());
        assert!((t.amp - 1.0 / 3.0).abs() < 1e-9);
        assert!((t.speaker - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(t.distance, 0.0);
        assert_eq!(t.shuttle, 0.0);

        assert_eq!(cycle_tendencies(&[]), PerAction::default());
    }

    #[test]
    fn test_cycle_accuracies_independent_per_type() {
        let a = cycle_accuracies(&sample_cycles());
        assert_eq!(a.amp, Some(100.0));
        assert_eq!(a.speaker, Some(50.0));
        assert_eq!(a.distance, None);
        assert_eq!(a.shuttle, None);

        let none = cycle_accuracies(&[]);
        assert_eq!(none, PerAction { amp: None, speaker: None, distance: None, shuttle: None });
    }

    #[test]
    fn test_auto_accuracy() {
        assert_eq!(auto_accuracy(&AutoData::default()), None);
        let auto = AutoData { can: true, scores: 3, misses: 1, ejects: 0 };
        assert_eq!(auto_accuracy(&auto), Some(75.0));
    }

    #[test]
    fn test_as_percent_rounding() {
        assert_eq!(as_percent(1.0 / 3.0), 33.33);
        assert_eq!(as_percent(2.0 / 3.0), 66.67);
        assert_eq!(as_percent(0.0), 0.0);
    }

    #[test]
    fn test_row_for_match() {
        let red1 = DriverStation::new(Alliance::Red, 1).unwrap();
        let blue2 = DriverStation::new(Alliance::Blue, 2).unwrap();
        let blue3 = DriverStation::new(Alliance::Blue, 3).unwrap();

        assert_eq!(row_for_match(1, red1), Some(2));
        assert_eq!(row_for_match(3, blue2), Some(18));
        assert_eq!(row_for_match(1, blue3), Some(7));
        assert_eq!(row_for_match(2, red1), Some(8));
        assert_eq!(row_for_match(0, red1), None);
    }

    #[test]
    fn test_row_for_pit() {
        let roster = [118, 254, 1816];
        assert_eq!(row_for_pit(&roster, 118), Some(1));
        assert_eq!(row_for_pit(&roster, 1816), Some(3));
        assert_eq!(row_for_pit(&roster, 9999), None);
    }
}

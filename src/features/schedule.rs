//! Schedule pressure features
//!
//! Rest, match density, away runs and the composite fatigue score, all
//! computed from a team's recent fixtures strictly before the match date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::TeamId;

/// One prior fixture in a team's recent schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub opponent: TeamId,
    pub was_home: bool,
}

/// Days since the most recent fixture before `date`, None if there is none
pub fn days_rest(history: &[ScheduleEntry], date: NaiveDate) -> Option<i64> {
    history
        .iter()
        .filter(|e| e.date < date)
        .map(|e| e.date)
        .max()
        .map(|last| (date - last).num_days())
}

/// Fixtures in the trailing `window_days` before `date` (the day itself excluded)
pub fn match_density(history: &[ScheduleEntry], date: NaiveDate, window_days: i64) -> u32 {
    history
        .iter()
        .filter(|e| {
            let diff = (date - e.date).num_days();
            diff > 0 && diff <= window_days
        })
        .count() as u32
}

/// Away fixtures in a row, most recent first, stopping at the first home one
pub fn consecutive_away(history: &[ScheduleEntry], date: NaiveDate) -> u32 {
    let mut prior: Vec<&ScheduleEntry> = history.iter().filter(|e| e.date < date).collect();
    prior.sort_by(|a, b| b.date.cmp(&a.date));
    prior.iter().take_while(|e| !e.was_home).count() as u32
}

/// Composite fatigue in [0, 1], rounded to 2 dp.
///
/// Rest weighs 0.5 (7+ days is fresh; no prior match counts as 0.2),
/// density 0.3 (5 matches saturates) and away run 0.2 (3 saturates).
pub fn fatigue_score(days_rest: Option<i64>, density: u32, away_run: u32) -> f64 {
    let rest_component = match days_rest {
        Some(rest) => (1.0 - rest as f64 / 7.0).max(0.0),
        None => 0.2,
    };
    let density_component = (density as f64 / 5.0).min(1.0);
    let away_component = (away_run as f64 / 3.0).min(1.0);

    let fatigue = rest_component * 0.5 + density_component * 0.3 + away_component * 0.2;
    (fatigue.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// Schedule features for one side of a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleFeatures {
    pub days_rest: Option<i64>,
    pub match_density: u32,
    pub consecutive_away: u32,
    pub fatigue: f64,
}

impl ScheduleFeatures {
    /// Compute schedule features for a team (call BEFORE recording the match)
    pub fn compute(history: &[ScheduleEntry], date: NaiveDate, window_days: i64) -> Self {
        let days_rest = days_rest(history, date);
        let match_density = match_density(history, date, window_days);
        let consecutive_away = consecutive_away(history, date);
        ScheduleFeatures {
            days_rest,
            match_density,
            consecutive_away,
            fatigue: fatigue_score(days_rest, match_density, consecutive_away),
        }
    }
}

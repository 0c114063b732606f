//! Per-team temporal state
//!
//! A `TeamTemporalState` holds everything known about a team as of the last
//! match committed for it. It is advanced by a pure transition and read to
//! produce the pre-match snapshot of the next fixture.

use std::collections::{BTreeMap, VecDeque};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::pythagorean::pythagorean;
use super::rolling::RollingWindow;
use super::schedule::{ScheduleEntry, ScheduleFeatures};
use super::team_stats::SeasonRecord;
use crate::{FeatureConfig, Match, SideStats, TeamId};

/// Per-match values kept in rolling windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    Goals,
    GoalsAgainst,
    Shots,
    ShotsOnTarget,
    Corners,
    Fouls,
    Cards,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 7] = [
        TrackedMetric::Goals,
        TrackedMetric::GoalsAgainst,
        TrackedMetric::Shots,
        TrackedMetric::ShotsOnTarget,
        TrackedMetric::Corners,
        TrackedMetric::Fouls,
        TrackedMetric::Cards,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedMetric::Goals => "goals",
            TrackedMetric::GoalsAgainst => "goals_against",
            TrackedMetric::Shots => "shots",
            TrackedMetric::ShotsOnTarget => "shots_on_target",
            TrackedMetric::Corners => "corners",
            TrackedMetric::Fouls => "fouls",
            TrackedMetric::Cards => "cards",
        }
    }
}

/// One played match seen from a single team's side
#[derive(Debug, Clone, PartialEq)]
pub struct TeamObservation {
    pub date: NaiveDate,
    pub season: String,
    pub opponent: TeamId,
    pub was_home: bool,
    pub goals_for: u8,
    pub goals_against: u8,
    pub stats: SideStats,
    pub opponent_stats: SideStats,
}

impl TeamObservation {
    /// None for unplayed matches or a team that did not take part
    pub fn from_match(record: &Match, team: TeamId) -> Option<Self> {
        let (goals_for, goals_against) = record.goals_for_against(team)?;
        let (stats, opponent_stats) = record.stats_for_against(team)?;
        Some(TeamObservation {
            date: record.date,
            season: record.season.clone(),
            opponent: record.opponent(team)?,
            was_home: record.is_home(team)?,
            goals_for,
            goals_against,
            stats,
            opponent_stats,
        })
    }

    /// Value of a tracked metric in this match, if the feed reported it
    pub fn metric(&self, metric: TrackedMetric) -> Option<f64> {
        let s = &self.stats;
        match metric {
            TrackedMetric::Goals => Some(self.goals_for as f64),
            TrackedMetric::GoalsAgainst => Some(self.goals_against as f64),
            TrackedMetric::Shots => s.shots.map(f64::from),
            TrackedMetric::ShotsOnTarget => s.shots_on_target.map(f64::from),
            TrackedMetric::Corners => s.corners.map(f64::from),
            TrackedMetric::Fouls => s.fouls.map(f64::from),
            TrackedMetric::Cards => match (s.yellow_cards, s.red_cards) {
                (None, None) => None,
                (yellow, red) => Some((yellow.unwrap_or(0) + red.unwrap_or(0)) as f64),
            },
        }
    }
}

/// Result kept for the recent-form summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecentResult {
    pub date: NaiveDate,
    pub goals_for: u8,
    pub goals_against: u8,
    pub xg_for: Option<f64>,
    pub xg_against: Option<f64>,
}

/// Everything tracked for one team between matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTemporalState {
    pub matches_played: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    metrics: BTreeMap<TrackedMetric, RollingWindow>,
    schedule: VecDeque<ScheduleEntry>,
    schedule_capacity: usize,
    results: VecDeque<RecentResult>,
    results_capacity: usize,
    season: SeasonRecord,
}

impl TeamTemporalState {
    pub fn new(config: &FeatureConfig) -> Self {
        TeamTemporalState {
            matches_played: 0,
            goals_for: 0,
            goals_against: 0,
            metrics: TrackedMetric::ALL
                .iter()
                .map(|m| (*m, RollingWindow::new(config.window)))
                .collect(),
            schedule: VecDeque::new(),
            schedule_capacity: config.schedule_history.max(1),
            results: VecDeque::new(),
            results_capacity: config.form_lookback.max(1),
            season: SeasonRecord::default(),
        }
    }

    /// State after one more played match. Missing box-score values leave
    /// their window untouched rather than counting as zero.
    pub fn advance(&self, obs: &TeamObservation) -> Self {
        let mut next = self.clone();

        next.matches_played += 1;
        next.goals_for += obs.goals_for as u32;
        next.goals_against += obs.goals_against as u32;

        for (metric, window) in next.metrics.iter_mut() {
            if let Some(value) = obs.metric(*metric) {
                window.push(value);
            }
        }

        if next.schedule.len() == next.schedule_capacity {
            next.schedule.pop_front();
        }
        next.schedule.push_back(ScheduleEntry {
            date: obs.date,
            opponent: obs.opponent,
            was_home: obs.was_home,
        });

        if next.results.len() == next.results_capacity {
            next.results.pop_front();
        }
        let xg = (obs.stats.expected_goals, obs.opponent_stats.expected_goals);
        next.results.push_back(RecentResult {
            date: obs.date,
            goals_for: obs.goals_for,
            goals_against: obs.goals_against,
            xg_for: xg.0,
            xg_against: xg.1,
        });

        if next.season.season != obs.season {
            next.season = SeasonRecord::new(obs.season.clone());
        }
        next.season.record(obs.goals_for, obs.goals_against, obs.was_home, xg, obs.stats.shots);

        next
    }

    pub fn rolling_mean(&self, metric: TrackedMetric) -> Option<f64> {
        self.metrics.get(&metric).and_then(RollingWindow::mean)
    }

    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        self.schedule.iter().copied().collect()
    }

    /// Pre-match view for a fixture on `date` in `season`
    pub fn read(&self, date: NaiveDate, season: &str, config: &FeatureConfig) -> TeamSnapshot {
        let season_record = if self.season.season == season {
            self.season.clone()
        } else {
            SeasonRecord::new(season)
        };

        TeamSnapshot {
            matches_played: self.matches_played,
            goals_for: self.goals_for,
            goals_against: self.goals_against,
            pythagorean: pythagorean(
                self.goals_for as f64,
                self.goals_against as f64,
                config.pythagorean_exponent,
            ),
            form: FormSummary::from_results(self.results.iter()),
            averages: MetricAverages::from_state(self),
            season: season_record,
            schedule: ScheduleFeatures::compute(
                &self.schedule(),
                date,
                config.density_window_days,
            ),
        }
    }
}

/// Recent form over the last few results
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub matches: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub xg_for: f64,
    pub xg_against: f64,
    pub win_pct: f64,
    pub points_per_game: f64,
    pub goal_diff: i64,
}

impl FormSummary {
    pub fn from_results<'a>(results: impl Iterator<Item = &'a RecentResult>) -> Self {
        let mut form = FormSummary::default();
        for r in results {
            form.matches += 1;
            form.goals_for += r.goals_for as u32;
            form.goals_against += r.goals_against as u32;
            form.xg_for += r.xg_for.unwrap_or(0.0);
            form.xg_against += r.xg_against.unwrap_or(0.0);
            match r.goals_for.cmp(&r.goals_against) {
                std::cmp::Ordering::Greater => form.wins += 1,
                std::cmp::Ordering::Less => form.losses += 1,
                std::cmp::Ordering::Equal => form.draws += 1,
            }
        }

        if form.matches > 0 {
            let n = form.matches as f64;
            form.win_pct = round2(form.wins as f64 / n);
            form.points_per_game = round2((form.wins * 3 + form.draws) as f64 / n);
        }
        form.goal_diff = form.goals_for as i64 - form.goals_against as i64;
        form
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rolling means of the tracked per-match metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    pub goals: Option<f64>,
    pub goals_against: Option<f64>,
    pub shots: Option<f64>,
    pub shots_on_target: Option<f64>,
    pub corners: Option<f64>,
    pub fouls: Option<f64>,
    pub cards: Option<f64>,
}

impl MetricAverages {
    fn from_state(state: &TeamTemporalState) -> Self {
        MetricAverages {
            goals: state.rolling_mean(TrackedMetric::Goals),
            goals_against: state.rolling_mean(TrackedMetric::GoalsAgainst),
            shots: state.rolling_mean(TrackedMetric::Shots),
            shots_on_target: state.rolling_mean(TrackedMetric::ShotsOnTarget),
            corners: state.rolling_mean(TrackedMetric::Corners),
            fouls: state.rolling_mean(TrackedMetric::Fouls),
            cards: state.rolling_mean(TrackedMetric::Cards),
        }
    }

    pub fn get(&self, metric: TrackedMetric) -> Option<f64> {
        match metric {
            TrackedMetric::Goals => self.goals,
            TrackedMetric::GoalsAgainst => self.goals_against,
            TrackedMetric::Shots => self.shots,
            TrackedMetric::ShotsOnTarget => self.shots_on_target,
            TrackedMetric::Corners => self.corners,
            TrackedMetric::Fouls => self.fouls,
            TrackedMetric::Cards => self.cards,
        }
    }
}

/// Pre-match view of one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub matches_played: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub pythagorean: f64,
    pub form: FormSummary,
    pub averages: MetricAverages,
    pub season: SeasonRecord,
    pub schedule: ScheduleFeatures,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn make_obs(d: u32, gf: u8, ga: u8, was_home: bool, shots: Option<u32>) -> TeamObservation {
        TeamObservation {
            date: day(d),
            season: "2425".to_string(),
            opponent: TeamId(2),
            was_home,
            goals_for: gf,
            goals_against: ga,
            stats: SideStats {
                shots,
                ..SideStats::default()
            },
            opponent_stats: SideStats::default(),
        }
    }

    #[test]
    fn test_empty_state_reads_zeroes() {
        let config = FeatureConfig::default();
        let state = TeamTemporalState::new(&config);
        let snapshot = state.read(day(1), "2425", &config);

        assert_eq!(snapshot.matches_played, 0);
        assert_eq!(snapshot.form, FormSummary::default());
        assert_eq!(snapshot.averages.goals, None);
        assert_eq!(snapshot.pythagorean, 0.5);
        assert_eq!(snapshot.schedule.days_rest, None);
        assert_eq!(snapshot.season.season, "2425");
    }

    #[test]
    fn test_advance_is_pure() {
        let config = FeatureConfig::default();
        let state = TeamTemporalState::new(&config);
        let next = state.advance(&make_obs(1, 2, 0, true, Some(12)));

        assert_eq!(state.matches_played, 0);
        assert_eq!(next.matches_played, 1);
        assert_eq!(next.rolling_mean(TrackedMetric::Shots), Some(12.0));
        assert_eq!(state.rolling_mean(TrackedMetric::Shots), None);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let config = FeatureConfig::default();
        let state = TeamTemporalState::new(&config)
            .advance(&make_obs(1, 2, 0, true, Some(10)))
            .advance(&make_obs(8, 1, 1, false, None))
            .advance(&make_obs(15, 0, 1, true, Some(14)));

        assert_eq!(state.rolling_mean(TrackedMetric::Shots), Some(12.0));
        assert_eq!(state.rolling_mean(TrackedMetric::Goals), Some(1.0));
        assert_eq!(state.rolling_mean(TrackedMetric::Corners), None);
    }

    #[test]
    fn test_form_and_schedule() {
        let config = FeatureConfig::default();
        let state = TeamTemporalState::new(&config)
            .advance(&make_obs(1, 3, 1, true, None))
            .advance(&make_obs(8, 1, 1, false, None))
            .advance(&make_obs(15, 0, 2, false, None));
        let snapshot = state.read(day(20), "2425", &config);

        assert_eq!(snapshot.form.matches, 3);
        assert_eq!((snapshot.form.wins, snapshot.form.draws, snapshot.form.losses), (1, 1, 1));
        assert_eq!(snapshot.form.win_pct, 0.33);
        assert_eq!(snapshot.form.points_per_game, 1.33);
        assert_eq!(snapshot.form.goal_diff, 0);
        assert_eq!(snapshot.schedule.days_rest, Some(5));
        assert_eq!(snapshot.schedule.consecutive_away, 2);
        assert_eq!(snapshot.season.played, 3);
    }

    #[test]
    fn test_new_season_resets_season_record() {
        let config = FeatureConfig::default();
        let state = TeamTemporalState::new(&config).advance(&make_obs(1, 2, 1, true, None));

        let snapshot = state.read(day(20), "2526", &config);
        assert_eq!(snapshot.season.played, 0);
        assert_eq!(snapshot.matches_played, 1);
        assert_eq!(snapshot.goals_for, 2);
    }

    #[test]
    fn test_form_lookback_is_bounded() {
        let config = FeatureConfig {
            form_lookback: 2,
            ..FeatureConfig::default()
        };
        let state = TeamTemporalState::new(&config)
            .advance(&make_obs(1, 5, 0, true, None))
            .advance(&make_obs(8, 0, 1, true, None))
            .advance(&make_obs(15, 0, 1, true, None));

        let snapshot = state.read(day(20), "2425", &config);
        assert_eq!(snapshot.form.matches, 2);
        assert_eq!(snapshot.form.wins, 0);
        assert_eq!(snapshot.goals_for, 5);
    }
}

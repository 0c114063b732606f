//! Season-to-date team record
//!
//! Running totals for the current season, built only from matches the
//! tracker has already committed.

use serde::{Deserialize, Serialize};

/// Season-to-date statistics for a team
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonRecord {
    /// Season label these totals belong to
    pub season: String,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    /// Sum of expected goals over matches that reported it
    pub xg_for: f64,
    pub xg_against: f64,
    /// Matches that reported expected goals, and the goals scored in them
    pub xg_matches: u32,
    pub xg_goals: u32,
    /// Shots over matches that reported them, and the goals scored in them
    pub shots: u32,
    pub shot_goals: u32,
    pub home_played: u32,
    pub home_wins: u32,
    pub away_played: u32,
    pub away_wins: u32,
}

impl SeasonRecord {
    pub fn new(season: impl Into<String>) -> Self {
        SeasonRecord {
            season: season.into(),
            ..SeasonRecord::default()
        }
    }

    /// Add one played match from the team's perspective
    pub fn record(
        &mut self,
        goals_for: u8,
        goals_against: u8,
        was_home: bool,
        xg: (Option<f64>, Option<f64>),
        shots: Option<u32>,
    ) {
        self.played += 1;
        self.goals_for += goals_for as u32;
        self.goals_against += goals_against as u32;
        self.xg_for += xg.0.unwrap_or(0.0);
        self.xg_against += xg.1.unwrap_or(0.0);
        if xg.0.is_some() {
            self.xg_matches += 1;
            self.xg_goals += goals_for as u32;
        }
        if let Some(shots) = shots {
            self.shots += shots;
            self.shot_goals += goals_for as u32;
        }

        if was_home {
            self.home_played += 1;
        } else {
            self.away_played += 1;
        }

        match goals_for.cmp(&goals_against) {
            std::cmp::Ordering::Greater => {
                self.wins += 1;
                if was_home {
                    self.home_wins += 1;
                } else {
                    self.away_wins += 1;
                }
            }
            std::cmp::Ordering::Less => self.losses += 1,
            std::cmp::Ordering::Equal => self.draws += 1,
        }
    }

    pub fn points(&self) -> u32 {
        self.wins * 3 + self.draws
    }

    /// Points per game, 0 before the first match
    pub fn points_per_game(&self) -> f64 {
        if self.played == 0 {
            0.0
        } else {
            self.points() as f64 / self.played as f64
        }
    }

    pub fn goal_difference(&self) -> i64 {
        self.goals_for as i64 - self.goals_against as i64
    }

    /// Home win ratio, None before the first home match
    pub fn home_win_ratio(&self) -> Option<f64> {
        (self.home_played > 0).then(|| self.home_wins as f64 / self.home_played as f64)
    }

    pub fn away_win_ratio(&self) -> Option<f64> {
        (self.away_played > 0).then(|| self.away_wins as f64 / self.away_played as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_season_is_empty() {
        let record = SeasonRecord::new("2425");
        assert_eq!(record.played, 0);
        assert_eq!(record.points_per_game(), 0.0);
        assert_eq!(record.home_win_ratio(), None);
    }

    #[test]
    fn test_record_results() {
        let mut record = SeasonRecord::new("2425");
        record.record(2, 0, true, (Some(1.8), Some(0.4)), Some(11));
        record.record(1, 1, false, (None, None), None);
        record.record(0, 3, false, (Some(0.5), Some(2.2)), Some(6));

        assert_eq!((record.wins, record.draws, record.losses), (1, 1, 1));
        assert_eq!(record.points(), 4);
        assert_eq!(record.goal_difference(), -1);
        assert!((record.xg_for - 2.3).abs() < 1e-9);
        assert_eq!(record.home_win_ratio(), Some(1.0));
        assert_eq!(record.away_win_ratio(), Some(0.0));
        assert_eq!((record.xg_matches, record.xg_goals), (2, 2));
        assert_eq!((record.shots, record.shot_goals), (17, 2));
    }
}

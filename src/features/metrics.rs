//! Derived team metrics
//!
//! Head-to-head record, luck and finishing ratios, and strength relative to
//! the league. All inputs are season-to-date totals the tracker had before
//! kick-off.

use serde::{Deserialize, Serialize};

use super::pythagorean::pythagorean;
use super::team_stats::SeasonRecord;

/// Actual win rate minus Pythagorean expectation. Positive means the team
/// has won more than its goals suggest.
pub fn performance_gap(actual_win_pct: f64, expected_win_pct: f64) -> f64 {
    actual_win_pct - expected_win_pct
}

/// Goals per shot, None without recorded shots
pub fn shot_efficiency(goals: u32, shots: u32) -> Option<f64> {
    (shots > 0).then(|| goals as f64 / shots as f64)
}

/// Goals above expected goals per match, None without xG data
pub fn xg_overperformance(goals: u32, expected_goals: f64, matches: u32) -> Option<f64> {
    (matches > 0 && expected_goals > 0.0).then(|| (goals as f64 - expected_goals) / matches as f64)
}

/// Per-game rate against the league's per-team-game average (1.0 = average)
pub fn relative_strength(per_game: f64, league_per_game: Option<f64>) -> Option<f64> {
    league_per_game
        .filter(|avg| *avg > 0.0)
        .map(|avg| per_game / avg)
}

/// Season-to-date ratios for one side
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub performance_gap: Option<f64>,
    pub shot_efficiency: Option<f64>,
    pub xg_overperformance: Option<f64>,
    /// Goals scored per game over the league average
    pub attack_strength: Option<f64>,
    /// Goals conceded per game over the league average; lower is better
    pub defense_strength: Option<f64>,
    pub goal_difference: i64,
    pub home_win_ratio: Option<f64>,
    pub away_win_ratio: Option<f64>,
}

impl PerformanceMetrics {
    pub fn from_season(season: &SeasonRecord, league_goals_per_game: Option<f64>, exponent: f64) -> Self {
        let mut metrics = PerformanceMetrics {
            goal_difference: season.goal_difference(),
            home_win_ratio: season.home_win_ratio(),
            away_win_ratio: season.away_win_ratio(),
            shot_efficiency: shot_efficiency(season.shot_goals, season.shots),
            xg_overperformance: xg_overperformance(season.xg_goals, season.xg_for, season.xg_matches),
            ..PerformanceMetrics::default()
        };
        if season.played == 0 {
            return metrics;
        }

        let played = season.played as f64;
        let expected = pythagorean(season.goals_for as f64, season.goals_against as f64, exponent);
        metrics.performance_gap = Some(performance_gap(season.wins as f64 / played, expected));
        metrics.attack_strength = relative_strength(season.goals_for as f64 / played, league_goals_per_game);
        metrics.defense_strength = relative_strength(season.goals_against as f64 / played, league_goals_per_game);
        metrics
    }
}

/// Goals and team-games played in one league season
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LeagueTotals {
    pub goals: u32,
    pub team_games: u32,
}

impl LeagueTotals {
    pub fn record(&mut self, home_goals: u8, away_goals: u8) {
        self.goals += home_goals as u32 + away_goals as u32;
        self.team_games += 2;
    }

    /// Average goals scored per team per game
    pub fn goals_per_game(&self) -> Option<f64> {
        (self.team_games > 0).then(|| self.goals as f64 / self.team_games as f64)
    }
}

/// Prior meetings between two teams, from one side's perspective
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub matches: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_diff: i64,
    pub win_pct: f64,
}

impl HeadToHead {
    /// Build from (goals for, goals against) pairs, already in the
    /// perspective of the team of interest
    pub fn from_results(results: impl IntoIterator<Item = (u8, u8)>) -> Self {
        let mut h2h = HeadToHead::default();
        for (gf, ga) in results {
            h2h.matches += 1;
            h2h.goals_for += gf as u32;
            h2h.goals_against += ga as u32;
            match gf.cmp(&ga) {
                std::cmp::Ordering::Greater => h2h.wins += 1,
                std::cmp::Ordering::Less => h2h.losses += 1,
                std::cmp::Ordering::Equal => h2h.draws += 1,
            }
        }
        h2h.goal_diff = h2h.goals_for as i64 - h2h.goals_against as i64;
        if h2h.matches > 0 {
            h2h.win_pct = (1000.0 * h2h.wins as f64 / h2h.matches as f64).round() / 1000.0;
        }
        h2h
    }
}

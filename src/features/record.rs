//! Flat feature rows
//!
//! A `FeatureRecord` is the unit handed to the downstream classifier. Every
//! value in it is known before kick-off; the outcome label is the only
//! post-match field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::elo::EloFeatures;
use super::metrics::{HeadToHead, PerformanceMetrics};
use super::team_state::{FormSummary, MetricAverages};
use crate::{MatchId, Outcome, TeamId};

/// Season-to-date aggregates for one side
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonAggregates {
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub xg_for: f64,
    pub xg_against: f64,
    pub points_per_game: f64,
    /// Taken from the team's latest completed season
    pub possession_avg: Option<f64>,
    pub pass_completion_avg: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InjuryImpact {
    pub out_count: u32,
    pub doubt_count: u32,
    /// `min(out_count / squad_size, 1)`
    pub impact: f64,
}

impl InjuryImpact {
    pub fn new(out_count: u32, doubt_count: u32, squad_size: f64) -> Self {
        let impact = if squad_size > 0.0 {
            (out_count as f64 / squad_size).min(1.0)
        } else {
            0.0
        };
        InjuryImpact {
            out_count,
            doubt_count,
            impact,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SquadQuality {
    pub avg_rating: Option<f64>,
    pub avg_apps: Option<f64>,
    pub players: u32,
    /// True when built from a confirmed starting lineup
    pub from_lineup: bool,
}

impl SquadQuality {
    /// Average over (rating, appearances) pairs; ratings may be missing
    pub fn from_players(players: &[(Option<f64>, u32)], from_lineup: bool) -> Self {
        if players.is_empty() {
            return SquadQuality {
                from_lineup,
                ..SquadQuality::default()
            };
        }
        let ratings: Vec<f64> = players.iter().filter_map(|p| p.0).collect();
        let avg_rating = (!ratings.is_empty()).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);
        let avg_apps = players.iter().map(|p| p.1 as f64).sum::<f64>() / players.len() as f64;
        SquadQuality {
            avg_rating,
            avg_apps: Some(avg_apps),
            players: players.len() as u32,
            from_lineup,
        }
    }
}

/// Everything assembled for one side of a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideFeatures {
    pub form: FormSummary,
    pub averages: MetricAverages,
    pub pythagorean: f64,
    pub season: SeasonAggregates,
    pub performance: PerformanceMetrics,
    pub injuries: InjuryImpact,
    pub squad: SquadQuality,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleContext {
    pub home_days_rest: Option<i64>,
    pub home_match_density: u32,
    pub home_fatigue: f64,
    pub away_days_rest: Option<i64>,
    pub away_match_density: u32,
    pub away_fatigue: f64,
    pub away_travel_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherContext {
    pub temp_celsius: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub humidity_percent: Option<f64>,
}

/// One row of the feature table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub match_id: MatchId,
    pub date: NaiveDate,
    pub season: String,
    pub league: String,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home: SideFeatures,
    pub away: SideFeatures,
    pub elo: EloFeatures,
    /// Prior meetings from the home side
    pub head_to_head: HeadToHead,
    pub schedule: ScheduleContext,
    pub weather: WeatherContext,
    pub outcome: Option<Outcome>,
}

const KEY_COLUMNS: [&str; 6] = ["match_id", "date", "season", "league", "home_team_id", "away_team_id"];

impl FeatureRecord {
    /// Column names in output order
    pub fn header() -> Vec<String> {
        let mut columns: Vec<String> = KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(
            numeric_fields(
                &SideFeatures::default(),
                &SideFeatures::default(),
                &EloFeatures::default(),
                &HeadToHead::default(),
                &ScheduleContext::default(),
                &WeatherContext::default(),
            )
            .into_iter()
            .map(|(name, _)| name),
        );
        columns.push("outcome".to_string());
        columns
    }

    /// Values in `header()` order; missing values are empty strings
    pub fn values(&self) -> Vec<String> {
        let mut values = vec![
            self.match_id.to_string(),
            self.date.format("%Y-%m-%d").to_string(),
            self.season.clone(),
            self.league.clone(),
            self.home_team.0.to_string(),
            self.away_team.0.to_string(),
        ];
        values.extend(
            self.numeric()
                .into_iter()
                .map(|(_, value)| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        values.push(self.outcome.map(|o| o.as_str().to_string()).unwrap_or_default());
        values
    }

    /// Named numeric features, `home_`/`away_` prefixed per side
    pub fn numeric(&self) -> Vec<(String, Option<f64>)> {
        numeric_fields(
            &self.home,
            &self.away,
            &self.elo,
            &self.head_to_head,
            &self.schedule,
            &self.weather,
        )
    }
}

fn numeric_fields(
    home: &SideFeatures,
    away: &SideFeatures,
    elo: &EloFeatures,
    h2h: &HeadToHead,
    schedule: &ScheduleContext,
    weather: &WeatherContext,
) -> Vec<(String, Option<f64>)> {
    let mut fields = Vec::new();
    side_fields("home", home, &mut fields);
    side_fields("away", away, &mut fields);

    let mut push = |name: &str, value: Option<f64>| fields.push((name.to_string(), value));
    push("home_elo", elo.home_elo);
    push("away_elo", elo.away_elo);
    push("elo_home_win_prob", elo.home_win_prob);
    push("elo_away_win_prob", elo.away_win_prob);
    push("elo_diff", elo.elo_diff);

    push("h2h_matches", Some(h2h.matches as f64));
    push("h2h_home_wins", Some(h2h.wins as f64));
    push("h2h_draws", Some(h2h.draws as f64));
    push("h2h_away_wins", Some(h2h.losses as f64));
    push("h2h_home_goal_diff", Some(h2h.goal_diff as f64));
    push("h2h_home_win_pct", Some(h2h.win_pct));

    push("home_days_rest", schedule.home_days_rest.map(|d| d as f64));
    push("home_match_density", Some(schedule.home_match_density as f64));
    push("home_fatigue_score", Some(schedule.home_fatigue));
    push("away_days_rest", schedule.away_days_rest.map(|d| d as f64));
    push("away_match_density", Some(schedule.away_match_density as f64));
    push("away_fatigue_score", Some(schedule.away_fatigue));
    push("away_travel_km", schedule.away_travel_km);

    push("temp_celsius", weather.temp_celsius);
    push("precipitation_mm", weather.precipitation_mm);
    push("wind_speed_kmh", weather.wind_speed_kmh);
    push("humidity_percent", weather.humidity_percent);
    fields
}

fn side_fields(prefix: &str, side: &SideFeatures, fields: &mut Vec<(String, Option<f64>)>) {
    let mut push = |name: &str, value: Option<f64>| fields.push((format!("{}_{}", prefix, name), value));
    let form = &side.form;
    push("form_wins", Some(form.wins as f64));
    push("form_draws", Some(form.draws as f64));
    push("form_losses", Some(form.losses as f64));
    push("form_goals_for", Some(form.goals_for as f64));
    push("form_goals_against", Some(form.goals_against as f64));
    push("form_xg", Some(form.xg_for));
    push("form_xga", Some(form.xg_against));
    push("form_win_pct", Some(form.win_pct));
    push("form_ppg", Some(form.points_per_game));
    push("form_goal_diff", Some(form.goal_diff as f64));

    let avg = &side.averages;
    push("avg_goals", avg.goals);
    push("avg_goals_against", avg.goals_against);
    push("avg_shots", avg.shots);
    push("avg_shots_on_target", avg.shots_on_target);
    push("avg_corners", avg.corners);
    push("avg_fouls", avg.fouls);
    push("avg_cards", avg.cards);
    push("pythagorean", Some(side.pythagorean));

    let season = &side.season;
    push("season_played", Some(season.played as f64));
    push("season_wins", Some(season.wins as f64));
    push("season_draws", Some(season.draws as f64));
    push("season_losses", Some(season.losses as f64));
    push("season_gf", Some(season.goals_for as f64));
    push("season_ga", Some(season.goals_against as f64));
    push("season_xg", Some(season.xg_for));
    push("season_xga", Some(season.xg_against));
    push("season_ppg", Some(season.points_per_game));
    push("possession_avg", season.possession_avg);
    push("pass_completion_avg", season.pass_completion_avg);

    let perf = &side.performance;
    push("season_goal_diff", Some(perf.goal_difference as f64));
    push("home_win_ratio", perf.home_win_ratio);
    push("away_win_ratio", perf.away_win_ratio);
    push("performance_gap", perf.performance_gap);
    push("shot_efficiency", perf.shot_efficiency);
    push("xg_overperformance", perf.xg_overperformance);
    push("attack_strength", perf.attack_strength);
    push("defense_strength", perf.defense_strength);

    push("injured_out", Some(side.injuries.out_count as f64));
    push("injured_doubt", Some(side.injuries.doubt_count as f64));
    push("injury_impact", Some(side.injuries.impact));

    push("squad_avg_rating", side.squad.avg_rating);
    push("squad_avg_apps", side.squad.avg_apps);
    push("squad_from_lineup", Some(if side.squad.from_lineup { 1.0 } else { 0.0 }));
}

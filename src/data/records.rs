//! Records exchanged with ingestion collaborators
//!
//! These are the shapes the fetchers hand to the store and the shapes the
//! feature engine reads back. Dates travel as `NaiveDate` and are stored as
//! `%Y-%m-%d` text.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{EntityType, MatchId, PlayerId, Result, SoccerError, TeamId};

/// Storage format for every date column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a required date column
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| SoccerError::MalformedValue {
        field,
        value: value.to_string(),
    })
}

/// Parse a nullable date column. Unparseable text is flagged and read as
/// missing rather than failing the whole row.
pub fn parse_optional_date(field: &'static str, value: Option<String>) -> Option<NaiveDate> {
    let value = value?;
    if value.trim().is_empty() {
        return None;
    }
    match parse_date(field, &value) {
        Ok(date) => Some(date),
        Err(e) => {
            log::warn!("{}; treating as missing", e);
            None
        }
    }
}

/// Canonical identity record (player, team, manager or referee)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterEntity {
    pub entity_type: EntityType,
    pub id: i64,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub position: Option<String>,
}

impl MasterEntity {
    /// A not-yet-persisted record; the store assigns the id
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        MasterEntity {
            entity_type,
            id: 0,
            name: name.into(),
            birth_date: None,
            nationality: None,
            position: None,
        }
    }

    pub fn with_birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }
}

/// Link from an external source id to a master record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub entity_type: EntityType,
    pub master_id: i64,
    pub source_name: String,
    pub source_id: String,
    /// Match confidence in [0, 1]
    pub confidence: f64,
}

/// Season totals for a team as published by a stats provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamSeasonStat {
    pub team_id: TeamId,
    pub season: String,
    pub league: String,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub expected_goals: f64,
    pub expected_goals_against: f64,
    pub possession_percent: Option<f64>,
    pub pass_completion: Option<f64>,
}

/// Season totals for a player at one club
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSeasonStat {
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub season: String,
    pub league: String,
    pub apps: u32,
    pub starts: u32,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub rating_avg: Option<f64>,
}

/// Availability of an injured player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjuryStatus {
    Out,
    Doubt,
    Available,
}

impl InjuryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjuryStatus::Out => "out",
            InjuryStatus::Doubt => "doubt",
            InjuryStatus::Available => "available",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "out" => Ok(InjuryStatus::Out),
            "doubt" | "doubtful" => Ok(InjuryStatus::Doubt),
            "available" | "fit" => Ok(InjuryStatus::Available),
            _ => Err(SoccerError::MalformedValue {
                field: "injury status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryRecord {
    pub player_id: PlayerId,
    pub team_id: Option<TeamId>,
    pub injury_date: NaiveDate,
    pub injury_type: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
    pub actual_return_date: Option<NaiveDate>,
    pub status: InjuryStatus,
}

/// Match-day conditions at the venue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub match_id: MatchId,
    pub temp_celsius: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub humidity_percent: Option<f64>,
}

/// Precomputed schedule pressure for both sides of a match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetric {
    pub match_id: MatchId,
    pub home_days_rest: Option<i64>,
    pub home_match_density: u32,
    pub home_fatigue_score: f64,
    pub away_days_rest: Option<i64>,
    pub away_match_density: u32,
    pub away_fatigue_score: f64,
    pub away_travel_km: Option<f64>,
}

/// One player's appearance in a confirmed team sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupRecord {
    pub match_id: MatchId,
    pub team_id: TeamId,
    pub player_id: PlayerId,
    pub position: Option<String>,
    pub is_starter: bool,
    /// Post-match rating; never read when building pre-match features
    pub rating: Option<f64>,
}

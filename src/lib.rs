//! Soccer match feature pipeline
//!
//! Builds point-in-time feature tables for match outcome prediction and
//! reconciles player/team identities across independent data sources.

pub mod data;
pub mod features;
pub mod identity;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unique identifier for a team
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub i64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team({})", self.0)
    }
}

/// Unique identifier for a player master record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player({})", self.0)
    }
}

/// Natural key of a match, as issued by the fixture source
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        MatchId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of canonical entity tracked in the master tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Player,
    Team,
    Manager,
    Referee,
}

impl EntityType {
    /// Label used in the `id_mapping.entity_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Player => "player",
            EntityType::Team => "team",
            EntityType::Manager => "manager",
            EntityType::Referee => "referee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "player" => Some(EntityType::Player),
            "team" => Some(EntityType::Team),
            "manager" => Some(EntityType::Manager),
            "referee" => Some(EntityType::Referee),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A club in the master teams table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub home_stadium: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Team {
    /// Stadium coordinates when both halves are recorded
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Per-side box score for a played match. Every field is optional because
/// fixture feeds differ in what they report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideStats {
    pub shots: Option<u32>,
    pub shots_on_target: Option<u32>,
    pub corners: Option<u32>,
    pub fouls: Option<u32>,
    pub yellow_cards: Option<u32>,
    pub red_cards: Option<u32>,
    pub expected_goals: Option<f64>,
}

/// Result of a played match from the home side's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::HomeWin => "home_win",
            Outcome::Draw => "draw",
            Outcome::AwayWin => "away_win",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fixture. Scores stay `None` until the match is played.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub date: NaiveDate,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub home_goals: Option<u8>,
    pub away_goals: Option<u8>,
    pub season: String,
    pub league: String,
    pub home_stats: SideStats,
    pub away_stats: SideStats,
    /// Pre-match Elo ratings supplied by an external rating feed
    pub home_elo: Option<f64>,
    pub away_elo: Option<f64>,
}

impl Match {
    /// Both scores are recorded
    pub fn is_played(&self) -> bool {
        self.home_goals.is_some() && self.away_goals.is_some()
    }

    /// Outcome label, or None for an unplayed match
    pub fn outcome(&self) -> Option<Outcome> {
        let (Some(home), Some(away)) = (self.home_goals, self.away_goals) else {
            return None;
        };
        Some(match home.cmp(&away) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Less => Outcome::AwayWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
        })
    }

    /// Check if a team was playing at home
    pub fn is_home(&self, team: TeamId) -> Option<bool> {
        if team == self.home_team {
            Some(true)
        } else if team == self.away_team {
            Some(false)
        } else {
            None
        }
    }

    /// Get the opponent for a given team
    pub fn opponent(&self, team: TeamId) -> Option<TeamId> {
        match self.is_home(team)? {
            true => Some(self.away_team),
            false => Some(self.home_team),
        }
    }

    /// Goals (for, against) from a team's perspective
    pub fn goals_for_against(&self, team: TeamId) -> Option<(u8, u8)> {
        let (home, away) = (self.home_goals?, self.away_goals?);
        match self.is_home(team)? {
            true => Some((home, away)),
            false => Some((away, home)),
        }
    }

    /// Box score (own, opponent) from a team's perspective
    pub fn stats_for_against(&self, team: TeamId) -> Option<(SideStats, SideStats)> {
        match self.is_home(team)? {
            true => Some((self.home_stats, self.away_stats)),
            false => Some((self.away_stats, self.home_stats)),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum SoccerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} not found: {id}")]
    MissingReference { kind: &'static str, id: String },

    #[error("Source {source_name} unavailable: {message}")]
    SourceUnavailable {
        source_name: String,
        message: String,
    },

    #[error("Malformed {field}: {value:?}")]
    MalformedValue { field: &'static str, value: String },

    #[error("Invalid match {0}: home and away team are the same")]
    InvalidMatch(MatchId),

    #[error("Cannot merge {entity_type} {remove} into {keep}: they meet in match {match_id}")]
    MergeConflict {
        entity_type: EntityType,
        keep: i64,
        remove: i64,
        match_id: MatchId,
    },

    #[error("Match {match_id} on {date} arrives after {last}; commits must be chronological")]
    OutOfOrder {
        match_id: MatchId,
        date: NaiveDate,
        last: NaiveDate,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl SoccerError {
    pub fn missing(kind: &'static str, id: impl fmt::Display) -> Self {
        SoccerError::MissingReference {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SoccerError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub data: DataConfig,
}

/// Knobs for the temporal tracker and feature assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Rolling window size W for per-metric averages
    pub window: usize,
    /// Exponent used by the Pythagorean expectation
    pub pythagorean_exponent: f64,
    /// Number of prior matches summarised as recent form
    pub form_lookback: usize,
    /// Trailing window (days) for match density
    pub density_window_days: i64,
    /// Recent (date, opponent, venue) tuples kept per team
    pub schedule_history: usize,
    /// Assumed squad size when normalising injury counts
    pub squad_size: f64,
    /// Most recent prior meetings counted in the head-to-head record
    pub head_to_head_limit: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            window: 5,
            pythagorean_exponent: features::pythagorean::DEFAULT_EXPONENT,
            form_lookback: 5,
            density_window_days: 14,
            schedule_history: 10,
            squad_size: 11.0,
            head_to_head_limit: 10,
        }
    }
}

/// Knobs for cross-source identity reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Composite score at or above which a pair may be merged automatically
    pub auto_merge_threshold: f64,
    /// Pairs whose name similarity falls below this are never candidates
    pub name_similarity_floor: f64,
    /// Merge eligible pairs instead of only reporting them
    pub auto_merge: bool,
    pub source_a: String,
    pub source_b: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            auto_merge_threshold: 0.95,
            name_similarity_floor: 0.80,
            auto_merge: false,
            source_a: "fbref".to_string(),
            source_b: "transfermarkt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub database_path: String,
    pub features_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            database_path: "data/soccer.db".to_string(),
            features_path: "data/training_features.csv".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SoccerError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| SoccerError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SoccerError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

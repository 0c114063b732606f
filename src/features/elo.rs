//! Elo-implied win probabilities
//!
//! Ratings come from an external rating feed attached to each match; this
//! module only turns a pair of pre-match ratings into probabilities.

use serde::{Deserialize, Serialize};

/// Rating gap (in points) that corresponds to 10:1 odds
const ELO_SCALE: f64 = 400.0;

/// Probability the home side wins given both pre-match ratings
pub fn elo_home_probability(home_elo: f64, away_elo: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((away_elo - home_elo) / ELO_SCALE))
}

/// Elo features for a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EloFeatures {
    pub home_elo: Option<f64>,
    pub away_elo: Option<f64>,
    pub home_win_prob: Option<f64>,
    pub away_win_prob: Option<f64>,
    pub elo_diff: Option<f64>,
}

impl EloFeatures {
    /// Probabilities need both ratings; a missing side leaves them unset
    pub fn from_ratings(home_elo: Option<f64>, away_elo: Option<f64>) -> Self {
        let (Some(home), Some(away)) = (home_elo, away_elo) else {
            return EloFeatures {
                home_elo,
                away_elo,
                ..EloFeatures::default()
            };
        };

        let home_win_prob = elo_home_probability(home, away);
        EloFeatures {
            home_elo,
            away_elo,
            home_win_prob: Some(home_win_prob),
            away_win_prob: Some(1.0 - home_win_prob),
            elo_diff: Some(home - away),
        }
    }
}

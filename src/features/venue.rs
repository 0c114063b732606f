//! Venue coordinates and travel distance
//!
//! Grounds are located from the team record; clubs without stored
//! coordinates fall back to a built-in table of Premier League grounds.

use std::collections::HashMap;

use crate::{Team, TeamId};

/// Mean Earth radius in km
const EARTH_RADIUS_KM: f64 = 6371.0;

/// (club, latitude, longitude)
const PREMIER_LEAGUE_GROUNDS: &[(&str, f64, f64)] = &[
    ("Arsenal", 51.555, -0.108),
    ("Aston Villa", 52.509, -1.884),
    ("Bournemouth", 50.735, -1.838),
    ("Brentford", 51.491, -0.294),
    ("Brighton", 50.861, -0.083),
    ("Chelsea", 51.482, -0.191),
    ("Crystal Palace", 51.398, -0.085),
    ("Everton", 53.439, -2.966),
    ("Fulham", 51.475, -0.222),
    ("Ipswich Town", 52.054, 1.145),
    ("Leicester City", 52.620, -1.142),
    ("Liverpool", 53.431, -2.961),
    ("Manchester City", 53.483, -2.200),
    ("Manchester United", 53.463, -2.291),
    ("Newcastle United", 54.975, -1.622),
    ("Nottingham Forest", 52.940, -1.133),
    ("Southampton", 50.906, -1.391),
    ("Tottenham", 51.604, -0.066),
    ("West Ham", 51.539, 0.016),
    ("Wolverhampton", 52.510, -2.130),
];

/// Great-circle distance in km between two (lat, lon) points in degrees
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Travel distance, None if either ground is unknown
pub fn travel_km(from: Option<(f64, f64)>, to: Option<(f64, f64)>) -> Option<f64> {
    Some(haversine_km(from?, to?))
}

/// Built-in coordinates for a club, matched on case-insensitive name
pub fn known_ground(team_name: &str) -> Option<(f64, f64)> {
    let name = team_name.trim().to_lowercase();
    PREMIER_LEAGUE_GROUNDS
        .iter()
        .find(|(club, _, _)| club.to_lowercase() == name)
        .map(|(_, lat, lon)| (*lat, *lon))
}

/// Ground coordinates per team
#[derive(Debug, Clone, Default)]
pub struct VenueBook {
    grounds: HashMap<TeamId, (f64, f64)>,
}

impl VenueBook {
    pub fn new() -> Self {
        VenueBook::default()
    }

    /// Index every team that has a stored or built-in ground
    pub fn from_teams(teams: &[Team]) -> Self {
        let mut book = VenueBook::new();
        for team in teams {
            match team.coordinates().or_else(|| known_ground(&team.name)) {
                Some(coords) => book.insert(team.id, coords),
                None => log::debug!("No ground coordinates for {} ({})", team.name, team.id),
            }
        }
        book
    }

    pub fn insert(&mut self, team: TeamId, coords: (f64, f64)) {
        self.grounds.insert(team, coords);
    }

    pub fn ground(&self, team: TeamId) -> Option<(f64, f64)> {
        self.grounds.get(&team).copied()
    }

    /// Distance the away side travels to the home ground
    pub fn away_travel_km(&self, home: TeamId, away: TeamId) -> Option<f64> {
        travel_km(self.ground(away), self.ground(home))
    }

    pub fn len(&self) -> usize {
        self.grounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grounds.is_empty()
    }
}

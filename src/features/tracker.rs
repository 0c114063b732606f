//! Chronological state tracker
//!
//! Replays matches in (date, match id) order. Every fixture on a date is
//! read against the state left by earlier dates before any of that date's
//! results are committed.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::elo::EloFeatures;
use super::metrics::{HeadToHead, LeagueTotals};
use super::team_state::{TeamObservation, TeamSnapshot, TeamTemporalState};
use super::venue::VenueBook;
use crate::{FeatureConfig, Match, MatchId, Result, SoccerError, TeamId};

/// Pre-match view of both sides of one fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub date: NaiveDate,
    pub home: TeamSnapshot,
    pub away: TeamSnapshot,
    pub elo: EloFeatures,
    pub away_travel_km: Option<f64>,
    /// Earlier meetings of the two teams, from the home side
    pub head_to_head: HeadToHead,
    /// Goals per team per game in this league season so far
    pub league_goals_per_game: Option<f64>,
}

/// One step of a replay: the fixture and what was known before it
#[derive(Debug, Clone)]
pub struct MatchStep {
    pub record: Match,
    pub snapshot: MatchSnapshot,
    /// False for unplayed fixtures, which are read but never committed
    pub committed: bool,
}

/// Per-team state arena
pub struct TemporalStateTracker {
    config: FeatureConfig,
    states: HashMap<TeamId, TeamTemporalState>,
    venues: VenueBook,
    /// Recent meetings keyed by (lower id, higher id), goals in that order
    meetings: HashMap<(TeamId, TeamId), VecDeque<(u8, u8)>>,
    leagues: HashMap<(String, String), LeagueTotals>,
    last_commit: Option<(NaiveDate, MatchId)>,
}

fn pair_key(a: TeamId, b: TeamId) -> (TeamId, TeamId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl TemporalStateTracker {
    pub fn new(config: FeatureConfig) -> Self {
        TemporalStateTracker {
            config,
            states: HashMap::new(),
            venues: VenueBook::new(),
            meetings: HashMap::new(),
            leagues: HashMap::new(),
            last_commit: None,
        }
    }

    pub fn with_venues(mut self, venues: VenueBook) -> Self {
        self.venues = venues;
        self
    }

    pub fn state(&self, team: TeamId) -> Option<&TeamTemporalState> {
        self.states.get(&team)
    }

    fn snapshot_for(&self, team: TeamId, record: &Match) -> TeamSnapshot {
        match self.states.get(&team) {
            Some(state) => state.read(record.date, &record.season, &self.config),
            None => TeamTemporalState::new(&self.config).read(record.date, &record.season, &self.config),
        }
    }

    /// Pre-match snapshot. Never mutates state.
    pub fn read(&self, record: &Match) -> MatchSnapshot {
        MatchSnapshot {
            match_id: record.id.clone(),
            date: record.date,
            home: self.snapshot_for(record.home_team, record),
            away: self.snapshot_for(record.away_team, record),
            elo: EloFeatures::from_ratings(record.home_elo, record.away_elo),
            away_travel_km: self.venues.away_travel_km(record.home_team, record.away_team),
            head_to_head: self.head_to_head(record.home_team, record.away_team),
            league_goals_per_game: self
                .leagues
                .get(&(record.league.clone(), record.season.clone()))
                .and_then(LeagueTotals::goals_per_game),
        }
    }

    /// Prior meetings from `team`'s side
    pub fn head_to_head(&self, team: TeamId, opponent: TeamId) -> HeadToHead {
        let key = pair_key(team, opponent);
        let Some(meetings) = self.meetings.get(&key) else {
            return HeadToHead::default();
        };
        let flip = key.0 != team;
        HeadToHead::from_results(
            meetings
                .iter()
                .map(|&(low, high)| if flip { (high, low) } else { (low, high) }),
        )
    }

    /// Fold a played match into both teams' state.
    ///
    /// Returns false for an unplayed match. Commits must arrive in strictly
    /// ascending (date, match id) order, and a team cannot play itself.
    pub fn commit(&mut self, record: &Match) -> Result<bool> {
        if record.home_team == record.away_team {
            return Err(SoccerError::InvalidMatch(record.id.clone()));
        }
        if !record.is_played() {
            return Ok(false);
        }

        if let Some((last_date, last_id)) = &self.last_commit {
            if (record.date, &record.id) <= (*last_date, last_id) {
                return Err(SoccerError::OutOfOrder {
                    match_id: record.id.clone(),
                    date: record.date,
                    last: *last_date,
                });
            }
        }

        for team in [record.home_team, record.away_team] {
            let Some(obs) = TeamObservation::from_match(record, team) else {
                continue;
            };
            let next = match self.states.get(&team) {
                Some(state) => state.advance(&obs),
                None => TeamTemporalState::new(&self.config).advance(&obs),
            };
            self.states.insert(team, next);
        }

        if let (Some(home_goals), Some(away_goals)) = (record.home_goals, record.away_goals) {
            let capacity = self.config.head_to_head_limit;
            if capacity > 0 {
                let key = pair_key(record.home_team, record.away_team);
                let goals = if key.0 == record.home_team {
                    (home_goals, away_goals)
                } else {
                    (away_goals, home_goals)
                };
                let meetings = self.meetings.entry(key).or_default();
                if meetings.len() == capacity {
                    meetings.pop_front();
                }
                meetings.push_back(goals);
            }

            self.leagues
                .entry((record.league.clone(), record.season.clone()))
                .or_default()
                .record(home_goals, away_goals);
        }

        self.last_commit = Some((record.date, record.id.clone()));
        Ok(true)
    }

    /// Replay a batch of matches, returning one step per match in
    /// chronological order. A fixture whose home and away team are the same
    /// is skipped with a warning.
    pub fn replay(&mut self, matches: &[Match]) -> Result<Vec<MatchStep>> {
        let mut ordered: Vec<&Match> = matches
            .iter()
            .filter(|m| {
                if m.home_team == m.away_team {
                    log::warn!("Skipping match {}: {} plays itself", m.id, m.home_team);
                    false
                } else {
                    true
                }
            })
            .collect();
        ordered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        let mut steps = Vec::with_capacity(ordered.len());
        let mut start = 0;
        while start < ordered.len() {
            let date = ordered[start].date;
            let end = ordered[start..]
                .iter()
                .position(|m| m.date != date)
                .map_or(ordered.len(), |offset| start + offset);
            let day = &ordered[start..end];
            start = end;

            let snapshots: Vec<MatchSnapshot> = day.iter().map(|m| self.read(m)).collect();
            for (record, snapshot) in day.iter().zip(snapshots) {
                let committed = self.commit(record)?;
                steps.push(MatchStep {
                    record: (*record).clone(),
                    snapshot,
                    committed,
                });
            }
        }

        log::debug!(
            "Replayed {} matches, {} teams tracked",
            steps.len(),
            self.states.len()
        );
        Ok(steps)
    }

    pub fn team_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SideStats;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, d).unwrap()
    }

    fn make_match(id: &str, d: u32, home: i64, away: i64, score: Option<(u8, u8)>) -> Match {
        Match {
            id: MatchId::new(id),
            date: day(d),
            home_team: TeamId(home),
            away_team: TeamId(away),
            home_goals: score.map(|s| s.0),
            away_goals: score.map(|s| s.1),
            season: "2425".to_string(),
            league: "EPL".to_string(),
            home_stats: SideStats::default(),
            away_stats: SideStats::default(),
            home_elo: None,
            away_elo: None,
        }
    }

    #[test]
    fn test_first_match_reads_empty_state() {
        let tracker = TemporalStateTracker::new(FeatureConfig::default());
        let snapshot = tracker.read(&make_match("m1", 1, 1, 2, Some((2, 0))));
        assert_eq!(snapshot.home.form.matches, 0);
        assert_eq!(snapshot.home.form.goals_for, 0);
        assert_eq!(snapshot.away.schedule.days_rest, None);
    }

    #[test]
    fn test_read_before_commit() {
        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        let m = make_match("m1", 1, 1, 2, Some((3, 1)));

        let before = tracker.read(&m);
        assert!(tracker.commit(&m).unwrap());
        let after = tracker.read(&make_match("m2", 8, 1, 2, None));

        assert_eq!(before.home.goals_for, 0);
        assert_eq!(after.home.goals_for, 3);
        assert_eq!(after.away.goals_against, 3);
        assert_eq!(after.home.schedule.days_rest, Some(7));
    }

    #[test]
    fn test_commit_order_enforced() {
        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        tracker.commit(&make_match("b", 8, 1, 2, Some((1, 0)))).unwrap();

        let late = tracker.commit(&make_match("a", 1, 3, 4, Some((1, 0))));
        assert!(matches!(late, Err(SoccerError::OutOfOrder { .. })));
        let repeat = tracker.commit(&make_match("b", 8, 1, 2, Some((1, 0))));
        assert!(matches!(repeat, Err(SoccerError::OutOfOrder { .. })));
    }

    #[test]
    fn test_unplayed_matches_are_not_committed() {
        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        assert!(!tracker.commit(&make_match("m1", 1, 1, 2, None)).unwrap());
        assert_eq!(tracker.team_count(), 0);
    }

    #[test]
    fn test_same_day_matches_do_not_leak() {
        // team 1 somehow appears twice on the same day; neither fixture may
        // see the other's result
        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        let matches = vec![
            make_match("a", 3, 1, 2, Some((4, 0))),
            make_match("b", 3, 3, 1, Some((0, 2))),
        ];
        let steps = tracker.replay(&matches).unwrap();

        assert_eq!(steps[0].snapshot.home.goals_for, 0);
        assert_eq!(steps[1].snapshot.away.goals_for, 0);
        assert_eq!(tracker.state(TeamId(1)).unwrap().goals_for, 6);
    }

    #[test]
    fn test_replay_sorts_by_date_then_id() {
        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        let matches = vec![
            make_match("z", 10, 1, 2, Some((1, 1))),
            make_match("b", 3, 3, 4, Some((0, 0))),
            make_match("a", 3, 1, 2, Some((2, 0))),
        ];
        let steps = tracker.replay(&matches).unwrap();
        let order: Vec<&str> = steps.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "z"]);
        assert_eq!(steps[2].snapshot.home.goals_for, 2);
    }

    #[test]
    fn test_end_to_end_form() {
        // team 1 plays on days 1..6: W 2-0, D 1-1, L 0-1, W 3-1, W 1-0, then day 6
        let results = [(2, 0), (1, 1), (0, 1), (3, 1), (1, 0)];
        let mut matches: Vec<Match> = results
            .iter()
            .enumerate()
            .map(|(i, s)| make_match(&format!("d{}", i + 1), i as u32 + 1, 1, 2 + i as i64, Some(*s)))
            .collect();
        matches.push(make_match("d6", 6, 1, 9, None));

        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        let steps = tracker.replay(&matches).unwrap();

        let first = &steps[0].snapshot.home.form;
        assert_eq!((first.wins, first.draws, first.losses, first.goals_for), (0, 0, 0, 0));

        let last = &steps[5].snapshot.home;
        assert_eq!((last.form.wins, last.form.draws, last.form.losses), (3, 1, 1));
        assert_eq!(last.form.goals_for, 7);
        assert_eq!(last.form.goals_against, 3);
        assert_eq!(last.form.points_per_game, 2.0);
        assert_eq!(last.averages.goals, Some(1.4));
        assert_eq!(last.schedule.days_rest, Some(1));
        assert_eq!(last.schedule.match_density, 5);
        assert!(!steps[5].committed);
    }

    #[test]
    fn test_elo_and_travel() {
        let mut venues = VenueBook::new();
        venues.insert(TeamId(1), (51.555, -0.108));
        venues.insert(TeamId(2), (51.555, -0.108));
        let tracker = TemporalStateTracker::new(FeatureConfig::default()).with_venues(venues);

        let mut m = make_match("m1", 1, 1, 2, None);
        m.home_elo = Some(1600.0);
        m.away_elo = Some(1600.0);
        let snapshot = tracker.read(&m);

        assert_eq!(snapshot.elo.home_win_prob, Some(0.5));
        assert_eq!(snapshot.away_travel_km, Some(0.0));
        assert_eq!(tracker.read(&make_match("m2", 1, 1, 3, None)).away_travel_km, None);
    }

    #[test]
    fn test_self_match_is_rejected() {
        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        let result = tracker.commit(&make_match("m1", 1, 1, 1, Some((3, 0))));
        assert!(matches!(result, Err(SoccerError::InvalidMatch(_))));
        assert_eq!(tracker.team_count(), 0);

        // replay leaves it out instead of counting the result twice
        let steps = tracker
            .replay(&[
                make_match("m1", 1, 1, 1, Some((3, 0))),
                make_match("m2", 8, 1, 2, None),
            ])
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].snapshot.home.form.matches, 0);
        assert_eq!(steps[0].snapshot.home.goals_for, 0);
    }

    #[test]
    fn test_head_to_head_from_home_side() {
        let mut tracker = TemporalStateTracker::new(FeatureConfig {
            head_to_head_limit: 2,
            ..FeatureConfig::default()
        });
        let steps = tracker
            .replay(&[
                make_match("a", 1, 1, 2, Some((0, 4))),
                make_match("b", 8, 2, 1, Some((1, 1))),
                make_match("c", 15, 1, 2, Some((2, 0))),
                make_match("d", 22, 2, 1, None),
                make_match("e", 22, 1, 3, None),
            ])
            .unwrap();

        assert_eq!(steps[0].snapshot.head_to_head, HeadToHead::default());
        // team 2 at home on day 8 had beaten team 1 4-0
        let b = &steps[1].snapshot.head_to_head;
        assert_eq!((b.matches, b.wins, b.goal_diff), (1, 1, 4));
        // only the last two meetings count: 1-1 and 0-2 for team 2
        let d = &steps[3].snapshot.head_to_head;
        assert_eq!((d.matches, d.wins, d.draws, d.losses), (2, 0, 1, 1));
        assert_eq!(d.goal_diff, -2);
        assert_eq!(steps[4].snapshot.head_to_head.matches, 0);
    }

    #[test]
    fn test_league_average_is_lagged() {
        let mut tracker = TemporalStateTracker::new(FeatureConfig::default());
        let steps = tracker
            .replay(&[
                make_match("a", 1, 1, 2, Some((3, 1))),
                make_match("b", 1, 3, 4, Some((0, 0))),
                make_match("c", 8, 1, 3, None),
            ])
            .unwrap();

        assert_eq!(steps[0].snapshot.league_goals_per_game, None);
        assert_eq!(steps[1].snapshot.league_goals_per_game, None);
        assert_eq!(steps[2].snapshot.league_goals_per_game, Some(1.0));

        let mut other_season = make_match("d", 9, 1, 3, None);
        other_season.season = "2526".to_string();
        assert_eq!(tracker.read(&other_season).league_goals_per_game, None);
    }
}

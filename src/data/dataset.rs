//! Feature table assembly
//!
//! Joins tracker snapshots with season, injury, lineup, weather and schedule
//! context into one `FeatureRecord` per match.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::data::records::{InjuryStatus, ScheduleMetric};
use crate::data::Database;
use crate::features::metrics::PerformanceMetrics;
use crate::features::record::{
    InjuryImpact, ScheduleContext, SeasonAggregates, SideFeatures, SquadQuality, WeatherContext,
};
use crate::features::{FeatureRecord, MatchSnapshot, TeamSnapshot, TemporalStateTracker, VenueBook};
use crate::{FeatureConfig, Match, MatchId, Result, SoccerError, TeamId};

/// Builds feature rows from the entity store
pub struct FeatureBuilder<'a> {
    db: &'a Database,
    config: &'a FeatureConfig,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(db: &'a Database, config: &'a FeatureConfig) -> Self {
        FeatureBuilder { db, config }
    }

    fn tracker(&self) -> Result<TemporalStateTracker> {
        let venues = VenueBook::from_teams(&self.db.get_all_teams()?);
        Ok(TemporalStateTracker::new(self.config.clone()).with_venues(venues))
    }

    /// Features for one match from everything recorded before its date.
    /// None if the match does not exist, or is skipped the way a dataset
    /// build would skip it (a team playing itself or an unknown team).
    pub fn build_features(&self, match_id: &MatchId) -> Result<Option<FeatureRecord>> {
        let Some(record) = self.db.get_match(match_id)? else {
            return Ok(None);
        };
        if record.home_team == record.away_team {
            log::warn!("Skipping match {}: {} plays itself", record.id, record.home_team);
            return Ok(None);
        }

        let mut tracker = self.tracker()?;
        tracker.replay(&self.db.get_matches_before(record.date)?)?;
        let snapshot = tracker.read(&record);
        match self.assemble(&record, &snapshot) {
            Ok(row) => Ok(Some(row)),
            Err(e @ SoccerError::MissingReference { .. }) => {
                log::warn!("Skipping match {}: {}", record.id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Feature rows in ascending date order.
    ///
    /// The full history always feeds the tracker; `season_filter` only
    /// narrows which rows are emitted. Unplayed matches are emitted (without
    /// a label) only when `include_incomplete` is set.
    pub fn build_dataset(
        &self,
        season_filter: Option<&str>,
        include_incomplete: bool,
    ) -> Result<Vec<FeatureRecord>> {
        let matches = self.db.get_all_matches()?;
        let mut tracker = self.tracker()?;
        let steps = tracker.replay(&matches)?;

        let mut rows = Vec::new();
        let mut skipped = 0;
        for step in &steps {
            if season_filter.is_some_and(|s| s != step.record.season) {
                continue;
            }
            if !include_incomplete && !step.record.is_played() {
                continue;
            }
            match self.assemble(&step.record, &step.snapshot) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    log::warn!("Skipping match {}: {}", step.record.id, e);
                    skipped += 1;
                }
            }
        }

        log::info!(
            "Built {} feature rows from {} matches ({} skipped)",
            rows.len(),
            matches.len(),
            skipped
        );
        Ok(rows)
    }

    /// Combine a pre-match snapshot with stored context into one row
    pub fn assemble(&self, record: &Match, snapshot: &MatchSnapshot) -> Result<FeatureRecord> {
        for team in [record.home_team, record.away_team] {
            if self.db.find_team(team)?.is_none() {
                return Err(SoccerError::missing("Team", team));
            }
        }

        let league_avg = snapshot.league_goals_per_game;
        let home = self.side_features(record, record.home_team, &snapshot.home, league_avg);
        let away = self.side_features(record, record.away_team, &snapshot.away, league_avg);

        let stored = self.context("schedule_metrics", record, || {
            self.db.get_schedule_metric(&record.id)
        });
        let schedule = match stored {
            Some(metric) => schedule_from_metric(&metric),
            None => schedule_from_snapshot(snapshot),
        };

        let weather = self
            .context("match_env", record, || self.db.get_weather(&record.id))
            .map(|w| WeatherContext {
                temp_celsius: w.temp_celsius,
                precipitation_mm: w.precipitation_mm,
                wind_speed_kmh: w.wind_speed_kmh,
                humidity_percent: w.humidity_percent,
            })
            .unwrap_or_default();

        Ok(FeatureRecord {
            match_id: record.id.clone(),
            date: record.date,
            season: record.season.clone(),
            league: record.league.clone(),
            home_team: record.home_team,
            away_team: record.away_team,
            home,
            away,
            elo: snapshot.elo,
            head_to_head: snapshot.head_to_head,
            schedule,
            weather,
            outcome: record.outcome(),
        })
    }

    fn side_features(
        &self,
        record: &Match,
        team: TeamId,
        snapshot: &TeamSnapshot,
        league_goals_per_game: Option<f64>,
    ) -> SideFeatures {
        let prior = self.context("team_stats", record, || {
            self.db.team_season_stat_before(team, &record.season)
        });
        let season = &snapshot.season;

        SideFeatures {
            form: snapshot.form,
            averages: snapshot.averages,
            pythagorean: snapshot.pythagorean,
            season: SeasonAggregates {
                played: season.played,
                wins: season.wins,
                draws: season.draws,
                losses: season.losses,
                goals_for: season.goals_for,
                goals_against: season.goals_against,
                xg_for: season.xg_for,
                xg_against: season.xg_against,
                points_per_game: season.points_per_game(),
                possession_avg: prior.as_ref().and_then(|s| s.possession_percent),
                pass_completion_avg: prior.as_ref().and_then(|s| s.pass_completion),
            },
            performance: PerformanceMetrics::from_season(
                season,
                league_goals_per_game,
                self.config.pythagorean_exponent,
            ),
            injuries: self.injury_impact(record, team),
            squad: self.squad_quality(record, team),
        }
    }

    fn injury_impact(&self, record: &Match, team: TeamId) -> InjuryImpact {
        let open = self.context("injury_records", record, || {
            self.db.open_injuries(team, record.date)
        });

        let (mut out, mut doubt) = (0, 0);
        for (status, returned) in open {
            match status {
                InjuryStatus::Out => out += 1,
                InjuryStatus::Doubt => doubt += 1,
                // marked fit later, but still sidelined on match day
                InjuryStatus::Available if returned.is_some() => out += 1,
                InjuryStatus::Available => {}
            }
        }
        InjuryImpact::new(out, doubt, self.config.squad_size)
    }

    /// Starters' prior-season ratings when a lineup is confirmed, otherwise
    /// the team's most-used players from its previous season
    fn squad_quality(&self, record: &Match, team: TeamId) -> SquadQuality {
        let starters = self.context("match_lineups", record, || {
            self.db.get_starters(&record.id, team)
        });

        if !starters.is_empty() {
            let players: Vec<(Option<f64>, u32)> = starters
                .iter()
                .filter_map(|s| {
                    self.context("player_stats", record, || {
                        self.db.player_prior_season(s.player_id, &record.season)
                    })
                })
                .collect();
            if !players.is_empty() {
                return SquadQuality::from_players(&players, true);
            }
            log::debug!("No prior stats for {} starters in {}", team, record.id);
        }

        let squad = self.context("player_stats", record, || {
            self.db
                .squad_prior_season(team, &record.season, self.config.squad_size as usize)
        });
        SquadQuality::from_players(&squad, false)
    }

    /// Run a context lookup; a failing source degrades to defaults
    fn context<T: Default>(&self, source: &str, record: &Match, lookup: impl FnOnce() -> Result<T>) -> T {
        match lookup() {
            Ok(value) => value,
            Err(e) => {
                let err = SoccerError::SourceUnavailable {
                    source_name: source.to_string(),
                    message: e.to_string(),
                };
                log::warn!("{} for match {}; using defaults", err, record.id);
                T::default()
            }
        }
    }
}

fn schedule_from_metric(metric: &ScheduleMetric) -> ScheduleContext {
    ScheduleContext {
        home_days_rest: metric.home_days_rest,
        home_match_density: metric.home_match_density,
        home_fatigue: metric.home_fatigue_score,
        away_days_rest: metric.away_days_rest,
        away_match_density: metric.away_match_density,
        away_fatigue: metric.away_fatigue_score,
        away_travel_km: metric.away_travel_km,
    }
}

fn schedule_from_snapshot(snapshot: &MatchSnapshot) -> ScheduleContext {
    ScheduleContext {
        home_days_rest: snapshot.home.schedule.days_rest,
        home_match_density: snapshot.home.schedule.match_density,
        home_fatigue: snapshot.home.schedule.fatigue,
        away_days_rest: snapshot.away.schedule.days_rest,
        away_match_density: snapshot.away.schedule.match_density,
        away_fatigue: snapshot.away.schedule.fatigue,
        away_travel_km: snapshot.away_travel_km,
    }
}

/// Recompute schedule metrics for every match. Earlier rows are replaced
/// wholesale, so nothing computed from an older history survives.
pub fn compute_schedule_metrics(db: &Database, config: &FeatureConfig) -> Result<usize> {
    let builder = FeatureBuilder::new(db, config);
    let mut tracker = builder.tracker()?;
    let steps = tracker.replay(&db.get_all_matches()?)?;

    let cleared = db.clear_schedule_metrics()?;
    log::debug!("Cleared {} stored schedule metrics", cleared);

    for step in &steps {
        let context = schedule_from_snapshot(&step.snapshot);
        db.upsert_schedule_metric(&ScheduleMetric {
            match_id: step.record.id.clone(),
            home_days_rest: context.home_days_rest,
            home_match_density: context.home_match_density,
            home_fatigue_score: context.home_fatigue,
            away_days_rest: context.away_days_rest,
            away_match_density: context.away_match_density,
            away_fatigue_score: context.away_fatigue,
            away_travel_km: context.away_travel_km,
        })?;
    }

    log::info!("Stored schedule metrics for {} matches", steps.len());
    Ok(steps.len())
}

/// Upsert feature rows into the `match_features` table
pub fn store_features(db: &Database, records: &[FeatureRecord]) -> Result<usize> {
    for record in records {
        let json = serde_json::to_string(record).map_err(|e| SoccerError::Parse(e.to_string()))?;
        db.upsert_feature_row(
            &record.match_id,
            record.date,
            &record.season,
            record.outcome.map(|o| o.as_str()),
            &json,
        )?;
    }
    Ok(records.len())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write the flat feature table as CSV
pub fn write_csv<P: AsRef<Path>>(path: P, records: &[FeatureRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", FeatureRecord::header().join(","))?;
    for record in records {
        let line: Vec<String> = record.values().iter().map(|v| csv_field(v)).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush()?;

    log::info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

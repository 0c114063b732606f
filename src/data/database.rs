//! SQLite entity store for soccer data

use crate::data::records::{
    format_date, parse_date, parse_optional_date, InjuryRecord, InjuryStatus, LineupRecord,
    MasterEntity, PlayerSeasonStat, ScheduleMetric, SourceMapping, TeamSeasonStat, WeatherRecord,
};
use crate::{EntityType, Match, MatchId, PlayerId, Result, SideStats, SoccerError, Team, TeamId};
use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

/// Column layout of one master identity table
#[derive(Debug, Clone, Copy)]
pub(crate) struct MasterTable {
    pub table: &'static str,
    pub id_col: &'static str,
    pub name_col: &'static str,
    pub birth_date_col: Option<&'static str>,
    pub nationality_col: Option<&'static str>,
    pub position_col: Option<&'static str>,
}

pub(crate) fn master_table(entity_type: EntityType) -> MasterTable {
    match entity_type {
        EntityType::Player => MasterTable {
            table: "players",
            id_col: "master_id",
            name_col: "full_name",
            birth_date_col: Some("birth_date"),
            nationality_col: Some("nationality"),
            position_col: Some("position"),
        },
        EntityType::Team => MasterTable {
            table: "teams",
            id_col: "team_id",
            name_col: "team_name",
            birth_date_col: None,
            nationality_col: Some("country"),
            position_col: None,
        },
        EntityType::Manager => MasterTable {
            table: "managers",
            id_col: "manager_id",
            name_col: "full_name",
            birth_date_col: Some("birth_date"),
            nationality_col: Some("nationality"),
            position_col: None,
        },
        EntityType::Referee => MasterTable {
            table: "referees",
            id_col: "referee_id",
            name_col: "full_name",
            birth_date_col: Some("birth_date"),
            nationality_col: Some("nationality"),
            position_col: None,
        },
    }
}

impl MasterTable {
    fn select_columns(&self) -> String {
        format!(
            "t.{}, t.{}, {}, {}, {}",
            self.id_col,
            self.name_col,
            self.birth_date_col.map_or("NULL".to_string(), |c| format!("t.{}", c)),
            self.nationality_col.map_or("NULL".to_string(), |c| format!("t.{}", c)),
            self.position_col.map_or("NULL".to_string(), |c| format!("t.{}", c)),
        )
    }
}

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    #[cfg(test)]
    pub(crate) fn conn_for_tests(&self) -> &Connection {
        &self.conn
    }

    /// Initialize database schema. Foreign keys are enforced, so master
    /// records must exist before anything references them.
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS players (
                master_id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                birth_date TEXT,
                nationality TEXT,
                position TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS teams (
                team_id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_name TEXT NOT NULL UNIQUE,
                country TEXT,
                city TEXT,
                home_stadium TEXT,
                latitude REAL,
                longitude REAL
            );

            CREATE TABLE IF NOT EXISTS managers (
                manager_id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                birth_date TEXT,
                nationality TEXT
            );

            CREATE TABLE IF NOT EXISTS referees (
                referee_id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                birth_date TEXT,
                nationality TEXT
            );

            CREATE TABLE IF NOT EXISTS id_mapping (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                master_id INTEGER NOT NULL,
                source_name TEXT NOT NULL,
                source_id TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 1.0,
                UNIQUE(entity_type, source_name, source_id)
            );

            CREATE TABLE IF NOT EXISTS team_rosters (
                roster_id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id INTEGER NOT NULL REFERENCES teams(team_id),
                player_id INTEGER NOT NULL REFERENCES players(master_id),
                season TEXT NOT NULL,
                shirt_number INTEGER,
                UNIQUE(team_id, player_id, season)
            );

            CREATE TABLE IF NOT EXISTS team_managers (
                assignment_id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id INTEGER NOT NULL REFERENCES teams(team_id),
                manager_id INTEGER NOT NULL REFERENCES managers(manager_id),
                season TEXT NOT NULL,
                UNIQUE(team_id, manager_id, season)
            );

            CREATE TABLE IF NOT EXISTS transfers (
                transfer_id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(master_id),
                from_team_id INTEGER REFERENCES teams(team_id),
                to_team_id INTEGER REFERENCES teams(team_id),
                transfer_date TEXT NOT NULL,
                transfer_type TEXT,
                season TEXT
            );

            CREATE TABLE IF NOT EXISTS match_results (
                match_id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                home_team_id INTEGER NOT NULL REFERENCES teams(team_id),
                away_team_id INTEGER NOT NULL REFERENCES teams(team_id),
                home_goals INTEGER,
                away_goals INTEGER,
                season TEXT NOT NULL,
                league TEXT NOT NULL,
                referee_id INTEGER REFERENCES referees(referee_id),
                home_shots INTEGER,
                away_shots INTEGER,
                home_shots_on_target INTEGER,
                away_shots_on_target INTEGER,
                home_corners INTEGER,
                away_corners INTEGER,
                home_fouls INTEGER,
                away_fouls INTEGER,
                home_yellow INTEGER,
                away_yellow INTEGER,
                home_red INTEGER,
                away_red INTEGER,
                home_xg REAL,
                away_xg REAL,
                home_elo REAL,
                away_elo REAL
            );

            CREATE TABLE IF NOT EXISTS match_env (
                match_id TEXT PRIMARY KEY REFERENCES match_results(match_id),
                temp_celsius REAL,
                precipitation_mm REAL,
                wind_speed_kmh REAL,
                humidity_percent REAL
            );

            CREATE TABLE IF NOT EXISTS match_lineups (
                lineup_id INTEGER PRIMARY KEY AUTOINCREMENT,
                match_id TEXT NOT NULL REFERENCES match_results(match_id),
                team_id INTEGER NOT NULL REFERENCES teams(team_id),
                player_id INTEGER NOT NULL REFERENCES players(master_id),
                position TEXT,
                is_starter INTEGER NOT NULL DEFAULT 1,
                rating REAL,
                UNIQUE(match_id, team_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS player_stats (
                stat_id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(master_id),
                team_id INTEGER NOT NULL REFERENCES teams(team_id),
                season TEXT NOT NULL,
                league TEXT NOT NULL,
                apps INTEGER NOT NULL DEFAULT 0,
                starts INTEGER NOT NULL DEFAULT 0,
                minutes INTEGER NOT NULL DEFAULT 0,
                goals INTEGER NOT NULL DEFAULT 0,
                assists INTEGER NOT NULL DEFAULT 0,
                rating_avg REAL,
                UNIQUE(player_id, team_id, season, league)
            );

            CREATE TABLE IF NOT EXISTS team_stats (
                team_stat_id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id INTEGER NOT NULL REFERENCES teams(team_id),
                season TEXT NOT NULL,
                league TEXT NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                draws INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                goals_for INTEGER NOT NULL DEFAULT 0,
                goals_against INTEGER NOT NULL DEFAULT 0,
                expected_goals REAL NOT NULL DEFAULT 0.0,
                expected_goals_against REAL NOT NULL DEFAULT 0.0,
                possession_percent REAL,
                pass_completion REAL,
                UNIQUE(team_id, season, league)
            );

            CREATE TABLE IF NOT EXISTS injury_records (
                injury_id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(master_id),
                team_id INTEGER REFERENCES teams(team_id),
                injury_date TEXT NOT NULL,
                injury_type TEXT,
                expected_return_date TEXT,
                actual_return_date TEXT,
                status TEXT NOT NULL DEFAULT 'out',
                UNIQUE(player_id, injury_date)
            );

            CREATE TABLE IF NOT EXISTS schedule_metrics (
                match_id TEXT PRIMARY KEY REFERENCES match_results(match_id),
                home_days_rest INTEGER,
                home_match_density_14d INTEGER NOT NULL,
                home_fatigue_score REAL NOT NULL,
                away_days_rest INTEGER,
                away_match_density_14d INTEGER NOT NULL,
                away_fatigue_score REAL NOT NULL,
                away_travel_distance_km REAL
            );

            CREATE TABLE IF NOT EXISTS identity_review (
                review_id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                id_a INTEGER NOT NULL,
                id_b INTEGER NOT NULL,
                score REAL NOT NULL,
                name_similarity REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(entity_type, id_a, id_b)
            );

            CREATE TABLE IF NOT EXISTS match_features (
                match_id TEXT PRIMARY KEY REFERENCES match_results(match_id),
                date TEXT NOT NULL,
                season TEXT NOT NULL,
                outcome TEXT,
                features TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_id_mapping_entity ON id_mapping(entity_type, master_id);
            CREATE INDEX IF NOT EXISTS idx_match_results_date ON match_results(date);
            CREATE INDEX IF NOT EXISTS idx_match_results_teams ON match_results(home_team_id, away_team_id);
            CREATE INDEX IF NOT EXISTS idx_match_lineups_match ON match_lineups(match_id);
            CREATE INDEX IF NOT EXISTS idx_player_stats_season ON player_stats(season, league);
            CREATE INDEX IF NOT EXISTS idx_team_stats_season ON team_stats(season, league);
            CREATE INDEX IF NOT EXISTS idx_injury_records_team ON injury_records(team_id, injury_date);
            "#,
        )?;
        Ok(())
    }

    // ==================== Team Operations ====================

    /// Insert a team or enrich an existing one with the same name
    pub fn upsert_team(&self, team: &Team) -> Result<TeamId> {
        self.conn.execute(
            r#"
            INSERT INTO teams (team_name, country, city, home_stadium, latitude, longitude)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(team_name) DO UPDATE SET
                country = COALESCE(excluded.country, country),
                city = COALESCE(excluded.city, city),
                home_stadium = COALESCE(excluded.home_stadium, home_stadium),
                latitude = COALESCE(excluded.latitude, latitude),
                longitude = COALESCE(excluded.longitude, longitude)
            "#,
            params![
                team.name,
                team.country,
                team.city,
                team.home_stadium,
                team.latitude,
                team.longitude,
            ],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT team_id FROM teams WHERE team_name = ?1",
            params![team.name],
            |row| row.get(0),
        )?;
        Ok(TeamId(id))
    }

    /// Get team by ID
    pub fn get_team(&self, id: TeamId) -> Result<Team> {
        self.find_team(id)?
            .ok_or_else(|| SoccerError::missing("Team", id))
    }

    pub fn find_team(&self, id: TeamId) -> Result<Option<Team>> {
        let team = self
            .conn
            .query_row(
                "SELECT team_id, team_name, country, city, home_stadium, latitude, longitude
                 FROM teams WHERE team_id = ?1",
                params![id.0],
                Self::row_to_team,
            )
            .optional()?;
        Ok(team)
    }

    /// Get all teams
    pub fn get_all_teams(&self) -> Result<Vec<Team>> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, team_name, country, city, home_stadium, latitude, longitude
             FROM teams ORDER BY team_id",
        )?;
        let teams = stmt
            .query_map([], Self::row_to_team)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teams)
    }

    fn row_to_team(row: &rusqlite::Row) -> rusqlite::Result<Team> {
        Ok(Team {
            id: TeamId(row.get(0)?),
            name: row.get(1)?,
            country: row.get(2)?,
            city: row.get(3)?,
            home_stadium: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
        })
    }

    // ==================== Identity Operations ====================

    /// Insert a new master record and return its id
    pub fn insert_master_entity(&self, entity: &MasterEntity) -> Result<i64> {
        if entity.entity_type == EntityType::Team {
            let team = Team {
                name: entity.name.clone(),
                country: entity.nationality.clone(),
                ..Team::default()
            };
            return Ok(self.upsert_team(&team)?.0);
        }

        let table = master_table(entity.entity_type);
        let mut columns = vec![table.name_col];
        let mut values: Vec<Option<String>> = vec![Some(entity.name.clone())];
        if let Some(col) = table.birth_date_col {
            columns.push(col);
            values.push(entity.birth_date.map(format_date));
        }
        if let Some(col) = table.nationality_col {
            columns.push(col);
            values.push(entity.nationality.clone());
        }
        if let Some(col) = table.position_col {
            columns.push(col);
            values.push(entity.position.clone());
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        self.conn
            .execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Load one master record, or None if it does not exist (e.g. merged away)
    pub fn get_master_entity(
        &self,
        entity_type: EntityType,
        id: i64,
    ) -> Result<Option<MasterEntity>> {
        let table = master_table(entity_type);
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.{} = ?1",
            table.select_columns(),
            table.table,
            table.id_col
        );
        let entity = self
            .conn
            .query_row(&sql, params![id], |row| {
                Self::row_to_master(row, entity_type)
            })
            .optional()?;
        Ok(entity)
    }

    pub fn master_exists(&self, entity_type: EntityType, id: i64) -> Result<bool> {
        let table = master_table(entity_type);
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            table.table, table.id_col
        );
        let count: i64 = self.conn.query_row(&sql, params![id], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// All master records that carry a mapping from the given source
    pub fn entities_from_source(
        &self,
        entity_type: EntityType,
        source_name: &str,
    ) -> Result<Vec<MasterEntity>> {
        let table = master_table(entity_type);
        let sql = format!(
            "SELECT DISTINCT {} FROM id_mapping im
             JOIN {} t ON im.master_id = t.{}
             WHERE im.source_name = ?1 AND im.entity_type = ?2
             ORDER BY t.{}",
            table.select_columns(),
            table.table,
            table.id_col,
            table.id_col
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params![source_name, entity_type.as_str()], |row| {
                Self::row_to_master(row, entity_type)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    /// Every master record of a type, regardless of source
    pub fn all_master_entities(&self, entity_type: EntityType) -> Result<Vec<MasterEntity>> {
        let table = master_table(entity_type);
        let sql = format!(
            "SELECT {} FROM {} t ORDER BY t.{}",
            table.select_columns(),
            table.table,
            table.id_col
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map([], |row| Self::row_to_master(row, entity_type))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn row_to_master(row: &rusqlite::Row, entity_type: EntityType) -> rusqlite::Result<MasterEntity> {
        let birth_date: Option<String> = row.get(2)?;
        Ok(MasterEntity {
            entity_type,
            id: row.get(0)?,
            name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            birth_date: parse_optional_date("birth_date", birth_date),
            nationality: row.get(3)?,
            position: row.get(4)?,
        })
    }

    /// Insert or update a source mapping
    pub fn upsert_source_mapping(&self, mapping: &SourceMapping) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO id_mapping (entity_type, master_id, source_name, source_id, confidence)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entity_type, source_name, source_id) DO UPDATE SET
                master_id = excluded.master_id,
                confidence = excluded.confidence
            "#,
            params![
                mapping.entity_type.as_str(),
                mapping.master_id,
                mapping.source_name,
                mapping.source_id,
                mapping.confidence.clamp(0.0, 1.0),
            ],
        )?;
        Ok(())
    }

    /// Master id a source id is mapped to
    pub fn find_mapping(
        &self,
        entity_type: EntityType,
        source_name: &str,
        source_id: &str,
    ) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT master_id FROM id_mapping
                 WHERE entity_type = ?1 AND source_name = ?2 AND source_id = ?3",
                params![entity_type.as_str(), source_name, source_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// All source mappings pointing at a master record
    pub fn mappings_for(&self, entity_type: EntityType, master_id: i64) -> Result<Vec<SourceMapping>> {
        let mut stmt = self.conn.prepare(
            "SELECT master_id, source_name, source_id, confidence FROM id_mapping
             WHERE entity_type = ?1 AND master_id = ?2
             ORDER BY source_name, source_id",
        )?;
        let mappings = stmt
            .query_map(params![entity_type.as_str(), master_id], |row| {
                Ok(SourceMapping {
                    entity_type,
                    master_id: row.get(0)?,
                    source_name: row.get(1)?,
                    source_id: row.get(2)?,
                    confidence: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(mappings)
    }

    /// Resolve a source sighting to a master id, creating the master record
    /// on the first unresolved sighting.
    pub fn register_source_entity(
        &self,
        source_name: &str,
        source_id: &str,
        entity: &MasterEntity,
        confidence: f64,
    ) -> Result<i64> {
        if let Some(id) = self.find_mapping(entity.entity_type, source_name, source_id)? {
            log::debug!(
                "{} {}:{} already mapped to {}",
                entity.entity_type,
                source_name,
                source_id,
                id
            );
            return Ok(id);
        }

        let master_id = self.insert_master_entity(entity)?;
        self.upsert_source_mapping(&SourceMapping {
            entity_type: entity.entity_type,
            master_id,
            source_name: source_name.to_string(),
            source_id: source_id.to_string(),
            confidence,
        })?;
        Ok(master_id)
    }

    /// Coverage of source mappings over a master table
    pub fn audit_id_mappings(&self, entity_type: EntityType) -> Result<MappingAudit> {
        let table = master_table(entity_type);
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.table),
            [],
            |row| row.get(0),
        )?;
        let mapped: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT master_id) FROM id_mapping WHERE entity_type = ?1",
            params![entity_type.as_str()],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT source_name, COUNT(DISTINCT master_id) FROM id_mapping
             WHERE entity_type = ?1 GROUP BY source_name",
        )?;
        let by_source = stmt
            .query_map(params![entity_type.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        let coverage_percent = if total > 0 {
            (1000.0 * mapped as f64 / total as f64).round() / 10.0
        } else {
            0.0
        };

        Ok(MappingAudit {
            entity_type,
            total: total as usize,
            mapped: mapped as usize,
            coverage_percent,
            by_source,
        })
    }

    /// Master records known to exactly one source (not yet reconciled)
    pub fn unreconciled(&self, entity_type: EntityType) -> Result<Vec<MasterEntity>> {
        let table = master_table(entity_type);
        let sql = format!(
            "SELECT {} FROM {} t
             JOIN id_mapping im ON im.master_id = t.{} AND im.entity_type = ?1
             GROUP BY t.{}
             HAVING COUNT(DISTINCT im.source_name) = 1
             ORDER BY t.{}",
            table.select_columns(),
            table.table,
            table.id_col,
            table.id_col,
            table.id_col
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entities = stmt
            .query_map(params![entity_type.as_str()], |row| {
                Self::row_to_master(row, entity_type)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    /// Queue a candidate pair for manual review
    pub fn queue_review(
        &self,
        entity_type: EntityType,
        id_a: i64,
        id_b: i64,
        score: f64,
        name_similarity: f64,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO identity_review (entity_type, id_a, id_b, score, name_similarity)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entity_type, id_a, id_b) DO UPDATE SET
                score = excluded.score,
                name_similarity = excluded.name_similarity
            "#,
            params![entity_type.as_str(), id_a, id_b, score, name_similarity],
        )?;
        Ok(())
    }

    pub fn pending_reviews(&self, entity_type: EntityType) -> Result<Vec<ReviewItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id_a, id_b, score, name_similarity, status FROM identity_review
             WHERE entity_type = ?1 AND status = 'pending'
             ORDER BY score DESC, id_a, id_b",
        )?;
        let items = stmt
            .query_map(params![entity_type.as_str()], |row| {
                Ok(ReviewItem {
                    entity_type,
                    id_a: row.get(0)?,
                    id_b: row.get(1)?,
                    score: row.get(2)?,
                    name_similarity: row.get(3)?,
                    status: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    // ==================== Match Operations ====================

    /// Insert a match or enrich an existing one with scores and box stats.
    /// Date, teams, season and league of a recorded match never change.
    ///
    /// Stored schedule metrics of this match and of every later match of
    /// either team are dropped, since their rest and density depend on it.
    pub fn upsert_match(&self, record: &Match) -> Result<()> {
        if record.home_team == record.away_team {
            return Err(SoccerError::InvalidMatch(record.id.clone()));
        }
        let dropped = self.conn.execute(
            "DELETE FROM schedule_metrics WHERE match_id IN (
                SELECT match_id FROM match_results
                WHERE date >= ?1
                AND (home_team_id IN (?2, ?3) OR away_team_id IN (?2, ?3)))",
            params![format_date(record.date), record.home_team.0, record.away_team.0],
        )?;
        if dropped > 0 {
            log::debug!(
                "Match {} invalidated {} stored schedule metrics",
                record.id,
                dropped
            );
        }
        let (h, a) = (&record.home_stats, &record.away_stats);
        self.conn.execute(
            r#"
            INSERT INTO match_results (
                match_id, date, home_team_id, away_team_id, home_goals, away_goals, season, league,
                home_shots, away_shots, home_shots_on_target, away_shots_on_target,
                home_corners, away_corners, home_fouls, away_fouls,
                home_yellow, away_yellow, home_red, away_red,
                home_xg, away_xg, home_elo, away_elo)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
            ON CONFLICT(match_id) DO UPDATE SET
                home_goals = COALESCE(excluded.home_goals, home_goals),
                away_goals = COALESCE(excluded.away_goals, away_goals),
                home_shots = COALESCE(excluded.home_shots, home_shots),
                away_shots = COALESCE(excluded.away_shots, away_shots),
                home_shots_on_target = COALESCE(excluded.home_shots_on_target, home_shots_on_target),
                away_shots_on_target = COALESCE(excluded.away_shots_on_target, away_shots_on_target),
                home_corners = COALESCE(excluded.home_corners, home_corners),
                away_corners = COALESCE(excluded.away_corners, away_corners),
                home_fouls = COALESCE(excluded.home_fouls, home_fouls),
                away_fouls = COALESCE(excluded.away_fouls, away_fouls),
                home_yellow = COALESCE(excluded.home_yellow, home_yellow),
                away_yellow = COALESCE(excluded.away_yellow, away_yellow),
                home_red = COALESCE(excluded.home_red, home_red),
                away_red = COALESCE(excluded.away_red, away_red),
                home_xg = COALESCE(excluded.home_xg, home_xg),
                away_xg = COALESCE(excluded.away_xg, away_xg),
                home_elo = COALESCE(excluded.home_elo, home_elo),
                away_elo = COALESCE(excluded.away_elo, away_elo)
            "#,
            params![
                record.id.as_str(),
                format_date(record.date),
                record.home_team.0,
                record.away_team.0,
                record.home_goals,
                record.away_goals,
                record.season,
                record.league,
                h.shots,
                a.shots,
                h.shots_on_target,
                a.shots_on_target,
                h.corners,
                a.corners,
                h.fouls,
                a.fouls,
                h.yellow_cards,
                a.yellow_cards,
                h.red_cards,
                a.red_cards,
                h.expected_goals,
                a.expected_goals,
                record.home_elo,
                record.away_elo,
            ],
        )?;
        Ok(())
    }

    /// Insert multiple match records
    pub fn upsert_matches(&self, records: &[Match]) -> Result<usize> {
        let mut count = 0;
        for record in records {
            self.upsert_match(record)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get_match(&self, id: &MatchId) -> Result<Option<Match>> {
        let sql = format!("{} WHERE match_id = ?1", MATCH_SELECT);
        let row = self
            .conn
            .query_row(&sql, params![id.as_str()], Self::row_to_match)
            .optional()?;
        row.map(MatchRow::into_match).transpose()
    }

    /// All matches in (date, match id) order. Rows with an unparseable date
    /// cannot be placed on the timeline and are skipped.
    pub fn get_all_matches(&self) -> Result<Vec<Match>> {
        self.query_matches(&format!("{} ORDER BY date, match_id", MATCH_SELECT), &[])
    }

    /// Matches strictly before a given date
    pub fn get_matches_before(&self, date: NaiveDate) -> Result<Vec<Match>> {
        let sql = format!("{} WHERE date < ?1 ORDER BY date, match_id", MATCH_SELECT);
        self.query_matches(&sql, &[&format_date(date)])
    }

    fn query_matches(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Match>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.into_match() {
                Ok(m) => matches.push(m),
                Err(e) => log::warn!("Skipping match {}: {}", id, e),
            }
        }
        Ok(matches)
    }

    fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<MatchRow> {
        let side = |offset: usize| -> rusqlite::Result<SideStats> {
            Ok(SideStats {
                shots: count_cell(row, offset)?,
                shots_on_target: count_cell(row, offset + 2)?,
                corners: count_cell(row, offset + 4)?,
                fouls: count_cell(row, offset + 6)?,
                yellow_cards: count_cell(row, offset + 8)?,
                red_cards: count_cell(row, offset + 10)?,
                expected_goals: numeric_cell(row, offset + 12)?,
            })
        };
        Ok(MatchRow {
            id: row.get(0)?,
            date: row.get(1)?,
            home_team: TeamId(row.get(2)?),
            away_team: TeamId(row.get(3)?),
            home_goals: goals_cell(row, 4)?,
            away_goals: goals_cell(row, 5)?,
            season: row.get(6)?,
            league: row.get(7)?,
            home_stats: side(8)?,
            away_stats: side(9)?,
            home_elo: numeric_cell(row, 22)?,
            away_elo: numeric_cell(row, 23)?,
        })
    }

    // ==================== Season Statistics ====================

    pub fn upsert_team_season_stat(&self, stat: &TeamSeasonStat) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO team_stats (team_id, season, league, wins, draws, losses, goals_for,
                                    goals_against, expected_goals, expected_goals_against,
                                    possession_percent, pass_completion)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(team_id, season, league) DO UPDATE SET
                wins = excluded.wins,
                draws = excluded.draws,
                losses = excluded.losses,
                goals_for = excluded.goals_for,
                goals_against = excluded.goals_against,
                expected_goals = excluded.expected_goals,
                expected_goals_against = excluded.expected_goals_against,
                possession_percent = COALESCE(excluded.possession_percent, possession_percent),
                pass_completion = COALESCE(excluded.pass_completion, pass_completion)
            "#,
            params![
                stat.team_id.0,
                stat.season,
                stat.league,
                stat.wins,
                stat.draws,
                stat.losses,
                stat.goals_for,
                stat.goals_against,
                stat.expected_goals,
                stat.expected_goals_against,
                stat.possession_percent,
                stat.pass_completion,
            ],
        )?;
        Ok(())
    }

    /// Most recent closed-out season totals for a team before `season`
    pub fn team_season_stat_before(
        &self,
        team: TeamId,
        season: &str,
    ) -> Result<Option<TeamSeasonStat>> {
        let stat = self
            .conn
            .query_row(
                "SELECT team_id, season, league, wins, draws, losses, goals_for, goals_against,
                        expected_goals, expected_goals_against, possession_percent, pass_completion
                 FROM team_stats
                 WHERE team_id = ?1 AND season < ?2
                 ORDER BY season DESC, wins + draws + losses DESC
                 LIMIT 1",
                params![team.0, season],
                |row| {
                    Ok(TeamSeasonStat {
                        team_id: TeamId(row.get(0)?),
                        season: row.get(1)?,
                        league: row.get(2)?,
                        wins: row.get(3)?,
                        draws: row.get(4)?,
                        losses: row.get(5)?,
                        goals_for: row.get(6)?,
                        goals_against: row.get(7)?,
                        expected_goals: row.get(8)?,
                        expected_goals_against: row.get(9)?,
                        possession_percent: row.get(10)?,
                        pass_completion: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(stat)
    }

    pub fn upsert_player_season_stat(&self, stat: &PlayerSeasonStat) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO player_stats (player_id, team_id, season, league, apps, starts, minutes,
                                      goals, assists, rating_avg)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(player_id, team_id, season, league) DO UPDATE SET
                apps = excluded.apps,
                starts = excluded.starts,
                minutes = excluded.minutes,
                goals = excluded.goals,
                assists = excluded.assists,
                rating_avg = COALESCE(excluded.rating_avg, rating_avg)
            "#,
            params![
                stat.player_id.0,
                stat.team_id.0,
                stat.season,
                stat.league,
                stat.apps,
                stat.starts,
                stat.minutes,
                stat.goals,
                stat.assists,
                stat.rating_avg,
            ],
        )?;
        Ok(())
    }

    /// A player's (rating, appearances) from their latest season before `season`
    pub fn player_prior_season(
        &self,
        player: PlayerId,
        season: &str,
    ) -> Result<Option<(Option<f64>, u32)>> {
        let row = self
            .conn
            .query_row(
                "SELECT rating_avg, apps FROM player_stats
                 WHERE player_id = ?1 AND season < ?2
                 ORDER BY season DESC, apps DESC
                 LIMIT 1",
                params![player.0, season],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// (rating, appearances) of a team's most-used starters in its latest
    /// season before `season`, capped at `limit` players
    pub fn squad_prior_season(
        &self,
        team: TeamId,
        season: &str,
        limit: usize,
    ) -> Result<Vec<(Option<f64>, u32)>> {
        let prior: Option<String> = self.conn.query_row(
            "SELECT MAX(season) FROM player_stats WHERE team_id = ?1 AND season < ?2",
            params![team.0, season],
            |row| row.get(0),
        )?;
        let Some(prior) = prior else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT rating_avg, apps FROM player_stats
             WHERE team_id = ?1 AND season = ?2 AND starts > 0
             ORDER BY starts DESC, apps DESC, player_id
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![team.0, prior, limit], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ==================== Match Context ====================

    pub fn upsert_injury(&self, injury: &InjuryRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO injury_records (player_id, team_id, injury_date, injury_type,
                                        expected_return_date, actual_return_date, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(player_id, injury_date) DO UPDATE SET
                team_id = COALESCE(excluded.team_id, team_id),
                injury_type = COALESCE(excluded.injury_type, injury_type),
                expected_return_date = COALESCE(excluded.expected_return_date, expected_return_date),
                actual_return_date = COALESCE(excluded.actual_return_date, actual_return_date),
                status = excluded.status
            "#,
            params![
                injury.player_id.0,
                injury.team_id.map(|t| t.0),
                format_date(injury.injury_date),
                injury.injury_type,
                injury.expected_return_date.map(format_date),
                injury.actual_return_date.map(format_date),
                injury.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Injury rows for a team that were open on the eve of `date`: reported
    /// before it and not yet returned from before it.
    pub fn open_injuries(&self, team: TeamId, date: NaiveDate) -> Result<Vec<(InjuryStatus, Option<NaiveDate>)>> {
        let day = format_date(date);
        let mut stmt = self.conn.prepare(
            "SELECT status, actual_return_date FROM injury_records
             WHERE team_id = ?1 AND injury_date < ?2
             AND (actual_return_date IS NULL OR actual_return_date >= ?2)",
        )?;
        let rows = stmt
            .query_map(params![team.0, day], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut injuries = Vec::with_capacity(rows.len());
        for (status, returned) in rows {
            match InjuryStatus::parse(&status) {
                Ok(status) => injuries.push((status, parse_optional_date("actual_return_date", returned))),
                Err(e) => log::warn!("{} for {}; ignoring row", e, team),
            }
        }
        Ok(injuries)
    }

    pub fn upsert_weather(&self, weather: &WeatherRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO match_env (match_id, temp_celsius, precipitation_mm, wind_speed_kmh, humidity_percent)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(match_id) DO UPDATE SET
                temp_celsius = excluded.temp_celsius,
                precipitation_mm = excluded.precipitation_mm,
                wind_speed_kmh = excluded.wind_speed_kmh,
                humidity_percent = excluded.humidity_percent
            "#,
            params![
                weather.match_id.as_str(),
                weather.temp_celsius,
                weather.precipitation_mm,
                weather.wind_speed_kmh,
                weather.humidity_percent,
            ],
        )?;
        Ok(())
    }

    pub fn get_weather(&self, match_id: &MatchId) -> Result<Option<WeatherRecord>> {
        let weather = self
            .conn
            .query_row(
                "SELECT temp_celsius, precipitation_mm, wind_speed_kmh, humidity_percent
                 FROM match_env WHERE match_id = ?1",
                params![match_id.as_str()],
                |row| {
                    Ok(WeatherRecord {
                        match_id: match_id.clone(),
                        temp_celsius: row.get(0)?,
                        precipitation_mm: row.get(1)?,
                        wind_speed_kmh: row.get(2)?,
                        humidity_percent: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(weather)
    }

    pub fn upsert_schedule_metric(&self, metric: &ScheduleMetric) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO schedule_metrics (
                match_id, home_days_rest, home_match_density_14d, home_fatigue_score,
                away_days_rest, away_match_density_14d, away_fatigue_score, away_travel_distance_km)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                metric.match_id.as_str(),
                metric.home_days_rest,
                metric.home_match_density,
                metric.home_fatigue_score,
                metric.away_days_rest,
                metric.away_match_density,
                metric.away_fatigue_score,
                metric.away_travel_km,
            ],
        )?;
        Ok(())
    }

    pub fn get_schedule_metric(&self, match_id: &MatchId) -> Result<Option<ScheduleMetric>> {
        let metric = self
            .conn
            .query_row(
                "SELECT home_days_rest, home_match_density_14d, home_fatigue_score,
                        away_days_rest, away_match_density_14d, away_fatigue_score,
                        away_travel_distance_km
                 FROM schedule_metrics WHERE match_id = ?1",
                params![match_id.as_str()],
                |row| {
                    Ok(ScheduleMetric {
                        match_id: match_id.clone(),
                        home_days_rest: row.get(0)?,
                        home_match_density: row.get(1)?,
                        home_fatigue_score: row.get(2)?,
                        away_days_rest: row.get(3)?,
                        away_match_density: row.get(4)?,
                        away_fatigue_score: row.get(5)?,
                        away_travel_km: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(metric)
    }

    /// Remove every stored schedule metric, returning how many were dropped
    pub fn clear_schedule_metrics(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM schedule_metrics", [])?)
    }

    pub fn upsert_lineup(&self, lineup: &LineupRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO match_lineups (match_id, team_id, player_id, position, is_starter, rating)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(match_id, team_id, player_id) DO UPDATE SET
                position = COALESCE(excluded.position, position),
                is_starter = excluded.is_starter,
                rating = COALESCE(excluded.rating, rating)
            "#,
            params![
                lineup.match_id.as_str(),
                lineup.team_id.0,
                lineup.player_id.0,
                lineup.position,
                lineup.is_starter,
                lineup.rating,
            ],
        )?;
        Ok(())
    }

    /// Confirmed starters for one side of a match
    pub fn get_starters(&self, match_id: &MatchId, team: TeamId) -> Result<Vec<LineupRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT player_id, position, rating FROM match_lineups
             WHERE match_id = ?1 AND team_id = ?2 AND is_starter = 1
             ORDER BY player_id",
        )?;
        let starters = stmt
            .query_map(params![match_id.as_str(), team.0], |row| {
                Ok(LineupRecord {
                    match_id: match_id.clone(),
                    team_id: team,
                    player_id: PlayerId(row.get(0)?),
                    position: row.get(1)?,
                    is_starter: true,
                    rating: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(starters)
    }

    // ==================== Feature Table ====================

    pub fn upsert_feature_row(
        &self,
        match_id: &MatchId,
        date: NaiveDate,
        season: &str,
        outcome: Option<&str>,
        features_json: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO match_features (match_id, date, season, outcome, features)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![match_id.as_str(), format_date(date), season, outcome, features_json],
        )?;
        Ok(())
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        let min_date: Option<String> = self
            .conn
            .query_row("SELECT MIN(date) FROM match_results", [], |row| row.get(0))
            .optional()?
            .flatten();
        let max_date: Option<String> = self
            .conn
            .query_row("SELECT MAX(date) FROM match_results", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(DatabaseStats {
            team_count: count("SELECT COUNT(*) FROM teams")?,
            player_count: count("SELECT COUNT(*) FROM players")?,
            match_count: count("SELECT COUNT(*) FROM match_results")?,
            played_count: count(
                "SELECT COUNT(*) FROM match_results
                 WHERE home_goals IS NOT NULL AND away_goals IS NOT NULL",
            )?,
            feature_rows: count("SELECT COUNT(*) FROM match_features")?,
            earliest_match: parse_optional_date("date", min_date),
            latest_match: parse_optional_date("date", max_date),
        })
    }
}

const MATCH_SELECT: &str = "SELECT match_id, date, home_team_id, away_team_id, home_goals, away_goals,
        season, league,
        home_shots, away_shots, home_shots_on_target, away_shots_on_target,
        home_corners, away_corners, home_fouls, away_fouls,
        home_yellow, away_yellow, home_red, away_red,
        home_xg, away_xg, home_elo, away_elo
    FROM match_results";

/// Read a numeric match cell. Loosely imported rows may carry text here;
/// anything that does not parse is logged and read as missing.
fn numeric_cell(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<f64>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                match text.parse::<f64>() {
                    Ok(v) if v.is_finite() => Some(v),
                    _ => {
                        warn_malformed(row, idx, text);
                        None
                    }
                }
            }
        }
        ValueRef::Blob(_) => {
            warn_malformed(row, idx, "<blob>");
            None
        }
    };
    Ok(value)
}

/// A non-negative whole-number cell (shots, cards, corners)
fn count_cell(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<u32>> {
    Ok(numeric_cell(row, idx)?.and_then(|v| {
        if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
            Some(v as u32)
        } else {
            warn_malformed(row, idx, &v.to_string());
            None
        }
    }))
}

fn goals_cell(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<u8>> {
    Ok(count_cell(row, idx)?.and_then(|v| match u8::try_from(v) {
        Ok(goals) => Some(goals),
        Err(_) => {
            warn_malformed(row, idx, &v.to_string());
            None
        }
    }))
}

fn warn_malformed(row: &rusqlite::Row, idx: usize, value: &str) {
    let match_id = row
        .get_ref(0)
        .ok()
        .and_then(|v| v.as_str().ok())
        .unwrap_or("?");
    let column = row.as_ref().column_name(idx).unwrap_or("?");
    log::warn!(
        "Match {}: malformed {} value '{}', treating as missing",
        match_id,
        column,
        value
    );
}

/// Raw match row whose date has not been validated yet
struct MatchRow {
    id: String,
    date: String,
    home_team: TeamId,
    away_team: TeamId,
    home_goals: Option<u8>,
    away_goals: Option<u8>,
    season: String,
    league: String,
    home_stats: SideStats,
    away_stats: SideStats,
    home_elo: Option<f64>,
    away_elo: Option<f64>,
}

impl MatchRow {
    fn into_match(self) -> Result<Match> {
        Ok(Match {
            date: parse_date("match date", &self.date)?,
            id: MatchId(self.id),
            home_team: self.home_team,
            away_team: self.away_team,
            home_goals: self.home_goals,
            away_goals: self.away_goals,
            season: self.season,
            league: self.league,
            home_stats: self.home_stats,
            away_stats: self.away_stats,
            home_elo: self.home_elo,
            away_elo: self.away_elo,
        })
    }
}

/// Source-mapping coverage for one entity type
#[derive(Debug, Clone)]
pub struct MappingAudit {
    pub entity_type: EntityType,
    pub total: usize,
    pub mapped: usize,
    pub coverage_percent: f64,
    pub by_source: BTreeMap<String, usize>,
}

/// A candidate pair waiting for a human decision
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem {
    pub entity_type: EntityType,
    pub id_a: i64,
    pub id_b: i64,
    pub score: f64,
    pub name_similarity: f64,
    pub status: String,
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub team_count: usize,
    pub player_count: usize,
    pub match_count: usize,
    pub played_count: usize,
    pub feature_rows: usize,
    pub earliest_match: Option<NaiveDate>,
    pub latest_match: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_team(db: &Database, name: &str) -> TeamId {
        db.upsert_team(&Team {
            name: name.to_string(),
            ..Team::default()
        })
        .unwrap()
    }

    fn make_player(db: &Database, name: &str) -> PlayerId {
        let player = MasterEntity::new(EntityType::Player, name);
        PlayerId(db.insert_master_entity(&player).unwrap())
    }

    fn make_match(id: &str, date: (i32, u32, u32), home: TeamId, away: TeamId) -> Match {
        Match {
            id: MatchId::new(id),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            home_team: home,
            away_team: away,
            home_goals: None,
            away_goals: None,
            season: "2425".to_string(),
            league: "EPL".to_string(),
            home_stats: SideStats::default(),
            away_stats: SideStats::default(),
            home_elo: None,
            away_elo: None,
        }
    }

    #[test]
    fn test_create_database() {
        let db = Database::in_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.team_count, 0);
        assert_eq!(stats.match_count, 0);
        assert!(stats.earliest_match.is_none());
    }

    #[test]
    fn test_upsert_team_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let first = make_team(&db, "Arsenal");
        let again = db
            .upsert_team(&Team {
                name: "Arsenal".to_string(),
                latitude: Some(51.555),
                longitude: Some(-0.108),
                ..Team::default()
            })
            .unwrap();
        assert_eq!(first, again);

        let team = db.get_team(first).unwrap();
        assert_eq!(team.coordinates(), Some((51.555, -0.108)));
        assert!(matches!(
            db.get_team(TeamId(99)),
            Err(SoccerError::MissingReference { .. })
        ));
    }

    #[test]
    fn test_match_enrichment_keeps_identity() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let che = make_team(&db, "Chelsea");

        db.upsert_match(&make_match("m1", (2024, 8, 17), ars, che)).unwrap();

        let mut played = make_match("m1", (2030, 1, 1), ars, che);
        played.home_goals = Some(2);
        played.away_goals = Some(0);
        played.home_stats.shots = Some(14);
        db.upsert_match(&played).unwrap();

        let stored = db.get_match(&MatchId::new("m1")).unwrap().unwrap();
        assert_eq!(stored.date, NaiveDate::from_ymd_opt(2024, 8, 17).unwrap());
        assert_eq!(stored.home_goals, Some(2));
        assert_eq!(stored.home_stats.shots, Some(14));
        assert_eq!(db.get_stats().unwrap().played_count, 1);
    }

    #[test]
    fn test_rejects_self_match() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let result = db.upsert_match(&make_match("bad", (2024, 8, 17), ars, ars));
        assert!(matches!(result, Err(SoccerError::InvalidMatch(_))));
    }

    #[test]
    fn test_matches_before_is_strict() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let che = make_team(&db, "Chelsea");
        db.upsert_match(&make_match("a", (2024, 8, 10), ars, che)).unwrap();
        db.upsert_match(&make_match("b", (2024, 8, 17), che, ars)).unwrap();

        let before = db
            .get_matches_before(NaiveDate::from_ymd_opt(2024, 8, 17).unwrap())
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id.as_str(), "a");
    }

    #[test]
    fn test_malformed_match_date_is_skipped() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let che = make_team(&db, "Chelsea");
        db.upsert_match(&make_match("ok", (2024, 8, 10), ars, che)).unwrap();
        db.conn
            .execute(
                "INSERT INTO match_results (match_id, date, home_team_id, away_team_id, season, league)
                 VALUES ('bad', 'soon', ?1, ?2, '2425', 'EPL')",
                params![ars.0, che.0],
            )
            .unwrap();

        let all = db.get_all_matches().unwrap();
        assert_eq!(all.len(), 1);
        assert!(matches!(
            db.get_match(&MatchId::new("bad")),
            Err(SoccerError::MalformedValue { .. })
        ));
    }

    #[test]
    fn test_register_source_entity() {
        let db = Database::in_memory().unwrap();
        let player = MasterEntity::new(EntityType::Player, "Bukayo Saka")
            .with_birth_date(NaiveDate::from_ymd_opt(2001, 9, 5).unwrap())
            .with_position("RW");

        let id = db.register_source_entity("fbref", "bc7dc64d", &player, 1.0).unwrap();
        let again = db.register_source_entity("fbref", "bc7dc64d", &player, 1.0).unwrap();
        assert_eq!(id, again);

        let stored = db.get_master_entity(EntityType::Player, id).unwrap().unwrap();
        assert_eq!(stored.name, "Bukayo Saka");
        assert_eq!(stored.position.as_deref(), Some("RW"));

        let from_source = db.entities_from_source(EntityType::Player, "fbref").unwrap();
        assert_eq!(from_source.len(), 1);

        let audit = db.audit_id_mappings(EntityType::Player).unwrap();
        assert_eq!(audit.total, 1);
        assert_eq!(audit.mapped, 1);
        assert_eq!(audit.coverage_percent, 100.0);
        assert_eq!(audit.by_source.get("fbref"), Some(&1));
        assert_eq!(db.unreconciled(EntityType::Player).unwrap().len(), 1);
    }

    #[test]
    fn test_open_injuries_window() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let players: Vec<PlayerId> = ["Saka", "Rice", "Odegaard", "Saliba"]
            .iter()
            .map(|name| make_player(&db, name))
            .collect();
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 9, d).unwrap();
        let injury = |player: usize, from: u32, back: Option<u32>, status: InjuryStatus| InjuryRecord {
            player_id: players[player - 1],
            team_id: Some(ars),
            injury_date: day(from),
            injury_type: None,
            expected_return_date: None,
            actual_return_date: back.map(day),
            status,
        };

        db.upsert_injury(&injury(1, 1, None, InjuryStatus::Out)).unwrap();
        db.upsert_injury(&injury(2, 2, Some(5), InjuryStatus::Available)).unwrap();
        db.upsert_injury(&injury(3, 10, None, InjuryStatus::Out)).unwrap();
        db.upsert_injury(&injury(4, 3, None, InjuryStatus::Doubt)).unwrap();

        let open = db.open_injuries(ars, day(10)).unwrap();
        // player 2 returned before the 10th; player 3 was injured on the day itself
        assert_eq!(open.len(), 2);
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let orphan = InjuryRecord {
            player_id: PlayerId(404),
            team_id: Some(ars),
            injury_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            injury_type: None,
            expected_return_date: None,
            actual_return_date: None,
            status: InjuryStatus::Out,
        };
        assert!(matches!(
            db.upsert_injury(&orphan),
            Err(SoccerError::Database(_))
        ));
    }

    #[test]
    fn test_malformed_stat_cell_reads_as_missing() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let che = make_team(&db, "Chelsea");
        db.conn
            .execute(
                "INSERT INTO match_results (match_id, date, home_team_id, away_team_id,
                    home_goals, away_goals, season, league, home_shots, away_shots, home_xg, home_elo)
                 VALUES ('m1', '2024-08-17', ?1, ?2, 2, 'abandoned', '2425', 'EPL', 'n/a', '9', 'x', -3)",
                params![ars.0, che.0],
            )
            .unwrap();

        let all = db.get_all_matches().unwrap();
        assert_eq!(all.len(), 1);
        let m = &all[0];
        assert_eq!(m.home_stats.shots, None);
        assert_eq!(m.away_stats.shots, Some(9));
        assert_eq!(m.home_stats.expected_goals, None);
        assert_eq!(m.home_goals, Some(2));
        assert_eq!(m.away_goals, None);
        assert!(!m.is_played());
        assert_eq!(m.home_elo, Some(-3.0));
    }

    #[test]
    fn test_new_result_invalidates_later_schedule_metrics() {
        let db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let che = make_team(&db, "Chelsea");
        let eve = make_team(&db, "Everton");
        db.upsert_match(&make_match("late", (2024, 9, 1), ars, che)).unwrap();
        db.upsert_match(&make_match("other", (2024, 9, 1), eve, che)).unwrap();
        for id in ["late", "other"] {
            db.upsert_schedule_metric(&ScheduleMetric {
                match_id: MatchId::new(id),
                home_days_rest: Some(7),
                ..ScheduleMetric::default()
            })
            .unwrap();
        }

        // an earlier Arsenal match arrives after the metrics were computed
        db.upsert_match(&make_match("early", (2024, 8, 28), ars, eve)).unwrap();

        assert!(db.get_schedule_metric(&MatchId::new("late")).unwrap().is_none());
        // Everton played in the new match too
        assert!(db.get_schedule_metric(&MatchId::new("other")).unwrap().is_none());

        db.upsert_schedule_metric(&ScheduleMetric {
            match_id: MatchId::new("late"),
            ..ScheduleMetric::default()
        })
        .unwrap();
        let unrelated = make_team(&db, "Fulham");
        let brighton = make_team(&db, "Brighton");
        db.upsert_match(&make_match("elsewhere", (2024, 8, 20), unrelated, brighton))
            .unwrap();
        assert!(db.get_schedule_metric(&MatchId::new("late")).unwrap().is_some());
    }

    #[test]
    fn test_all_master_entities_ignores_source() {
        let db = Database::in_memory().unwrap();
        make_player(&db, "Declan Rice");
        let mapped = MasterEntity::new(EntityType::Player, "Bukayo Saka");
        db.register_source_entity("fbref", "bc7dc64d", &mapped, 1.0).unwrap();

        let all = db.all_master_entities(EntityType::Player).unwrap();
        let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Declan Rice", "Bukayo Saka"]);
    }
}

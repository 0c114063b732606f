//! Transactional merge of two master records

use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};

use super::{FieldOverrides, MergeOutcome};
use crate::data::database::{master_table, MasterTable};
use crate::data::records::format_date;
use crate::data::Database;
use crate::{EntityType, MatchId, Result, SoccerError};

/// Columns holding a foreign key to each kind of master record
fn reference_columns(entity_type: EntityType) -> &'static [(&'static str, &'static str)] {
    match entity_type {
        EntityType::Player => &[
            ("team_rosters", "player_id"),
            ("player_stats", "player_id"),
            ("match_lineups", "player_id"),
            ("transfers", "player_id"),
            ("injury_records", "player_id"),
        ],
        EntityType::Team => &[
            ("match_results", "home_team_id"),
            ("match_results", "away_team_id"),
            ("team_rosters", "team_id"),
            ("team_managers", "team_id"),
            ("transfers", "from_team_id"),
            ("transfers", "to_team_id"),
            ("player_stats", "team_id"),
            ("team_stats", "team_id"),
            ("match_lineups", "team_id"),
            ("injury_records", "team_id"),
        ],
        EntityType::Manager => &[("team_managers", "manager_id")],
        EntityType::Referee => &[("match_results", "referee_id")],
    }
}

fn exists(tx: &Transaction, table: &MasterTable, id: i64) -> Result<bool> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", table.table, table.id_col);
    let count: i64 = tx.query_row(&sql, params![id], |row| row.get(0))?;
    Ok(count > 0)
}

/// Repoint `column` from `remove` to `keep`. Rows that would collide with a
/// row the survivor already has are dropped.
fn reassign(tx: &Transaction, table: &str, column: &str, keep: i64, remove: i64) -> Result<usize> {
    let moved = tx.execute(
        &format!("UPDATE OR IGNORE {} SET {} = ?1 WHERE {} = ?2", table, column, column),
        params![keep, remove],
    )?;
    let dropped = tx.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", table, column),
        params![remove],
    )?;
    if dropped > 0 {
        log::debug!("{}.{}: dropped {} duplicate rows of {}", table, column, dropped, remove);
    }
    Ok(moved)
}

fn apply_overrides(tx: &Transaction, table: &MasterTable, keep: i64, overrides: &FieldOverrides) -> Result<()> {
    let mut assignments = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(name) = &overrides.name {
        assignments.push(table.name_col);
        values.push(name.clone());
    }
    if let (Some(col), Some(date)) = (table.birth_date_col, overrides.birth_date) {
        assignments.push(col);
        values.push(format_date(date));
    }
    if let (Some(col), Some(nationality)) = (table.nationality_col, &overrides.nationality) {
        assignments.push(col);
        values.push(nationality.clone());
    }
    if let (Some(col), Some(position)) = (table.position_col, &overrides.position) {
        assignments.push(col);
        values.push(position.clone());
    }
    if assignments.is_empty() {
        return Ok(());
    }

    let set_clause: Vec<String> = assignments
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", col, i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        table.table,
        set_clause.join(", "),
        table.id_col,
        values.len() + 1
    );
    let mut args: Vec<rusqlite::types::Value> = values.into_iter().map(Into::into).collect();
    args.push(keep.into());
    tx.execute(&sql, params_from_iter(args))?;
    Ok(())
}

/// A fixture between the two teams; folding one into the other would leave
/// a team playing itself
fn shared_fixture(tx: &Transaction, keep: i64, remove: i64) -> Result<Option<MatchId>> {
    let id = tx
        .query_row(
            "SELECT match_id FROM match_results
             WHERE (home_team_id = ?1 AND away_team_id = ?2)
                OR (home_team_id = ?2 AND away_team_id = ?1)
             ORDER BY date, match_id LIMIT 1",
            params![keep, remove],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(id.map(MatchId))
}

/// Merge `remove` into `keep`.
///
/// Every reference to `remove` is rewritten to `keep`, optional display
/// fields are written onto `keep`, and `remove` is deleted, all in one
/// transaction. Merging a record that no longer exists is a no-op.
///
/// Two teams that have a fixture against each other are not merged:
/// `MergeConflict` is returned and nothing changes. A team merge also drops
/// the stored schedule metrics of both teams' matches.
pub fn merge_entities(
    db: &mut Database,
    entity_type: EntityType,
    keep: i64,
    remove: i64,
    overrides: Option<&FieldOverrides>,
) -> Result<MergeOutcome> {
    if keep == remove {
        return Ok(MergeOutcome::AlreadyMerged);
    }

    let table = master_table(entity_type);
    let tx = db.connection_mut().transaction()?;

    if !exists(&tx, &table, remove)? {
        log::debug!("{} {} already merged; nothing to do", entity_type, remove);
        return Ok(MergeOutcome::AlreadyMerged);
    }
    if !exists(&tx, &table, keep)? {
        return Err(SoccerError::missing("merge target", format!("{} {}", entity_type, keep)));
    }

    if entity_type == EntityType::Team {
        if let Some(match_id) = shared_fixture(&tx, keep, remove)? {
            log::warn!(
                "Refusing to merge team {} into {}: they meet in {}",
                remove,
                keep,
                match_id
            );
            return Err(SoccerError::MergeConflict {
                entity_type,
                keep,
                remove,
                match_id,
            });
        }
        tx.execute(
            "DELETE FROM schedule_metrics WHERE match_id IN (
                SELECT match_id FROM match_results
                WHERE home_team_id IN (?1, ?2) OR away_team_id IN (?1, ?2))",
            params![keep, remove],
        )?;
    }

    let mut moved = 0;
    for (ref_table, column) in reference_columns(entity_type) {
        moved += reassign(&tx, ref_table, column, keep, remove)?;
    }

    tx.execute(
        "UPDATE OR IGNORE id_mapping SET master_id = ?1 WHERE entity_type = ?2 AND master_id = ?3",
        params![keep, entity_type.as_str(), remove],
    )?;
    tx.execute(
        "DELETE FROM id_mapping WHERE entity_type = ?1 AND master_id = ?2",
        params![entity_type.as_str(), remove],
    )?;

    tx.execute(
        "UPDATE identity_review SET status = 'merged'
         WHERE entity_type = ?1 AND ((id_a = ?2 AND id_b = ?3) OR (id_a = ?3 AND id_b = ?2))",
        params![entity_type.as_str(), keep, remove],
    )?;
    tx.execute(
        "UPDATE identity_review SET status = 'stale'
         WHERE entity_type = ?1 AND status = 'pending' AND (id_a = ?2 OR id_b = ?2)",
        params![entity_type.as_str(), remove],
    )?;

    tx.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", table.table, table.id_col),
        params![remove],
    )?;

    if let Some(overrides) = overrides {
        apply_overrides(&tx, &table, keep, overrides)?;
    }

    tx.commit()?;
    log::info!(
        "Merged {} {} into {} ({} references moved)",
        entity_type,
        remove,
        keep,
        moved
    );
    Ok(MergeOutcome::Merged { keep, removed: remove })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::{InjuryRecord, InjuryStatus, LineupRecord, MasterEntity, PlayerSeasonStat};
    use crate::{Match, MatchId, PlayerId, SideStats, Team, TeamId};
    use chrono::NaiveDate;

    fn make_player(db: &Database, source: &str, source_id: &str, name: &str) -> i64 {
        let entity = MasterEntity::new(EntityType::Player, name)
            .with_birth_date(NaiveDate::from_ymd_opt(1998, 4, 14).unwrap());
        db.register_source_entity(source, source_id, &entity, 1.0).unwrap()
    }

    fn make_team(db: &Database, name: &str) -> TeamId {
        db.upsert_team(&Team {
            name: name.to_string(),
            ..Team::default()
        })
        .unwrap()
    }

    fn make_fixture(id: &str, date: (i32, u32, u32), home: TeamId, away: TeamId) -> Match {
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

    fn make_stat(player: i64, team: TeamId, apps: u32) -> PlayerSeasonStat {
        PlayerSeasonStat {
            player_id: PlayerId(player),
            team_id: team,
            season: "2324".to_string(),
            league: "EPL".to_string(),
            apps,
            starts: apps,
            minutes: apps * 90,
            goals: 0,
            assists: 0,
            rating_avg: Some(7.0),
        }
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.conn_for_tests().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_merge_reassigns_references() {
        let mut db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let che = make_team(&db, "Chelsea");
        let keep = make_player(&db, "fbref", "a1", "Ben White");
        let remove = make_player(&db, "transfermarkt", "t1", "Benjamin White");

        // both records carry the same season row; only one may survive
        db.upsert_player_season_stat(&make_stat(keep, ars, 30)).unwrap();
        db.upsert_player_season_stat(&make_stat(remove, ars, 29)).unwrap();
        db.upsert_player_season_stat(&make_stat(remove, che, 3)).unwrap();

        db.upsert_match(&Match {
            id: MatchId::new("m1"),
            date: NaiveDate::from_ymd_opt(2024, 8, 17).unwrap(),
            home_team: ars,
            away_team: che,
            home_goals: Some(2),
            away_goals: Some(0),
            season: "2425".to_string(),
            league: "EPL".to_string(),
            home_stats: SideStats::default(),
            away_stats: SideStats::default(),
            home_elo: None,
            away_elo: None,
        })
        .unwrap();
        db.upsert_lineup(&LineupRecord {
            match_id: MatchId::new("m1"),
            team_id: ars,
            player_id: PlayerId(remove),
            position: Some("DF".to_string()),
            is_starter: true,
            rating: None,
        })
        .unwrap();
        db.upsert_injury(&InjuryRecord {
            player_id: PlayerId(remove),
            team_id: Some(ars),
            injury_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            injury_type: Some("knee".to_string()),
            expected_return_date: None,
            actual_return_date: None,
            status: InjuryStatus::Out,
        })
        .unwrap();

        let overrides = FieldOverrides {
            position: Some("DF".to_string()),
            ..FieldOverrides::default()
        };
        let outcome = merge_entities(&mut db, EntityType::Player, keep, remove, Some(&overrides)).unwrap();
        assert_eq!(outcome, MergeOutcome::Merged { keep, removed: remove });

        assert!(db.get_master_entity(EntityType::Player, remove).unwrap().is_none());
        let kept = db.get_master_entity(EntityType::Player, keep).unwrap().unwrap();
        assert_eq!(kept.position.as_deref(), Some("DF"));
        assert_eq!(kept.name, "Ben White");

        let remove_refs = format!(
            "SELECT (SELECT COUNT(*) FROM player_stats WHERE player_id = {r})
                  + (SELECT COUNT(*) FROM match_lineups WHERE player_id = {r})
                  + (SELECT COUNT(*) FROM injury_records WHERE player_id = {r})
                  + (SELECT COUNT(*) FROM id_mapping WHERE master_id = {r} AND entity_type = 'player')",
            r = remove
        );
        assert_eq!(count(&db, &remove_refs), 0);
        assert_eq!(count(&db, &format!("SELECT COUNT(*) FROM player_stats WHERE player_id = {}", keep)), 2);
        assert_eq!(
            count(&db, &format!("SELECT apps FROM player_stats WHERE player_id = {} AND team_id = {}", keep, ars.0)),
            30
        );
        assert_eq!(db.mappings_for(EntityType::Player, keep).unwrap().len(), 2);
        assert_eq!(db.find_mapping(EntityType::Player, "transfermarkt", "t1").unwrap(), Some(keep));
    }

    #[test]
    fn test_second_merge_is_noop() {
        let mut db = Database::in_memory().unwrap();
        let keep = make_player(&db, "fbref", "a1", "Ben White");
        let remove = make_player(&db, "transfermarkt", "t1", "Ben White");

        merge_entities(&mut db, EntityType::Player, keep, remove, None).unwrap();
        let again = merge_entities(&mut db, EntityType::Player, keep, remove, None).unwrap();
        assert_eq!(again, MergeOutcome::AlreadyMerged);
        assert_eq!(
            merge_entities(&mut db, EntityType::Player, keep, keep, None).unwrap(),
            MergeOutcome::AlreadyMerged
        );
        assert!(db.get_master_entity(EntityType::Player, keep).unwrap().is_some());
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let mut db = Database::in_memory().unwrap();
        let remove = make_player(&db, "fbref", "a1", "Ben White");
        let result = merge_entities(&mut db, EntityType::Player, 999, remove, None);
        assert!(matches!(result, Err(SoccerError::MissingReference { .. })));
        assert!(db.get_master_entity(EntityType::Player, remove).unwrap().is_some());
    }

    #[test]
    fn test_team_merge_can_take_losing_name() {
        let mut db = Database::in_memory().unwrap();
        let keep = make_team(&db, "Man Utd");
        let remove = make_team(&db, "Manchester United");
        let other = make_team(&db, "Everton");

        db.upsert_match(&make_fixture("m1", (2024, 8, 17), remove, other)).unwrap();

        let overrides = FieldOverrides {
            name: Some("Manchester United".to_string()),
            ..FieldOverrides::default()
        };
        merge_entities(&mut db, EntityType::Team, keep.0, remove.0, Some(&overrides)).unwrap();

        assert_eq!(db.get_team(keep).unwrap().name, "Manchester United");
        let m = db.get_match(&MatchId::new("m1")).unwrap().unwrap();
        assert_eq!(m.home_team, keep);
    }

    #[test]
    fn test_team_merge_refuses_teams_that_met() {
        let mut db = Database::in_memory().unwrap();
        let keep = make_team(&db, "Man Utd");
        let remove = make_team(&db, "Manchester United");
        let other = make_team(&db, "Everton");

        let mut derby = make_fixture("m1", (2024, 8, 17), keep, remove);
        derby.home_goals = Some(3);
        derby.away_goals = Some(0);
        db.upsert_match(&derby).unwrap();
        db.upsert_match(&make_fixture("m2", (2024, 8, 24), remove, other)).unwrap();

        let result = merge_entities(&mut db, EntityType::Team, keep.0, remove.0, None);
        match result {
            Err(SoccerError::MergeConflict { match_id, .. }) => assert_eq!(match_id.as_str(), "m1"),
            unexpected => panic!("expected a merge conflict, got {:?}", unexpected),
        }

        // nothing moved
        assert!(db.find_team(remove).unwrap().is_some());
        let m1 = db.get_match(&MatchId::new("m1")).unwrap().unwrap();
        assert_eq!((m1.home_team, m1.away_team), (keep, remove));
        let m2 = db.get_match(&MatchId::new("m2")).unwrap().unwrap();
        assert_eq!(m2.home_team, remove);
    }

    #[test]
    fn test_failed_merge_rolls_back() {
        let mut db = Database::in_memory().unwrap();
        let ars = make_team(&db, "Arsenal");
        let keep = make_player(&db, "fbref", "a1", "Ben White");
        let remove = make_player(&db, "transfermarkt", "t1", "Benjamin White");
        db.upsert_player_season_stat(&make_stat(remove, ars, 29)).unwrap();
        db.upsert_injury(&InjuryRecord {
            player_id: PlayerId(remove),
            team_id: Some(ars),
            injury_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            injury_type: None,
            expected_return_date: None,
            actual_return_date: None,
            status: InjuryStatus::Out,
        })
        .unwrap();

        // injury_records is rewritten after player_stats, so the failure lands mid-merge
        db.conn_for_tests()
            .execute_batch(
                "CREATE TRIGGER fail_injury_move BEFORE UPDATE ON injury_records
                 BEGIN SELECT RAISE(ABORT, 'injury table locked'); END;",
            )
            .unwrap();

        let result = merge_entities(&mut db, EntityType::Player, keep, remove, None);
        assert!(matches!(result, Err(SoccerError::Database(_))));

        assert!(db.get_master_entity(EntityType::Player, keep).unwrap().is_some());
        assert!(db.get_master_entity(EntityType::Player, remove).unwrap().is_some());
        assert_eq!(
            count(&db, &format!("SELECT COUNT(*) FROM player_stats WHERE player_id = {}", remove)),
            1
        );
        assert_eq!(
            count(&db, &format!("SELECT COUNT(*) FROM injury_records WHERE player_id = {}", remove)),
            1
        );
        assert_eq!(db.find_mapping(EntityType::Player, "transfermarkt", "t1").unwrap(), Some(remove));
        assert_eq!(db.mappings_for(EntityType::Player, keep).unwrap().len(), 1);
    }
}

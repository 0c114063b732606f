//! Candidate pair scoring
//!
//! Composite score = 0.6 * name similarity + 0.3 * exact birth date
//! + 0.1 * position credit.

use std::collections::HashSet;

use super::similarity::{NameSimilarity, SequenceRatio};
use super::Candidate;
use crate::data::records::MasterEntity;
use crate::data::Database;
use crate::{EntityType, Result};

// Weights in tenths so that exact sums such as 0.6 + 0.3 land on 0.9
const NAME_WEIGHT: f64 = 6.0;
const BIRTH_DATE_WEIGHT: f64 = 3.0;
const POSITION_WEIGHT: f64 = 1.0;
/// Credit for two recorded but different positions
const POSITION_PARTIAL: f64 = 0.3;

fn position_credit(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a.map(str::trim), b.map(str::trim)) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            if a.eq_ignore_ascii_case(b) {
                1.0
            } else {
                POSITION_PARTIAL
            }
        }
        _ => 0.0,
    }
}

/// Scores pairs of master records with a pluggable name measure
pub struct CandidateScorer<S: NameSimilarity = SequenceRatio> {
    similarity: S,
    name_floor: f64,
}

impl CandidateScorer<SequenceRatio> {
    pub fn new(name_floor: f64) -> Self {
        CandidateScorer::with_similarity(SequenceRatio, name_floor)
    }
}

impl<S: NameSimilarity> CandidateScorer<S> {
    pub fn with_similarity(similarity: S, name_floor: f64) -> Self {
        CandidateScorer {
            similarity,
            name_floor,
        }
    }

    /// Score one pair, None if it is the same record or the names are too far apart
    pub fn score_pair(&self, a: &MasterEntity, b: &MasterEntity) -> Option<Candidate> {
        if a.id == b.id {
            return None;
        }
        let name_similarity = self.similarity.score(&a.name, &b.name);
        if name_similarity < self.name_floor {
            return None;
        }

        let birth_match = match (a.birth_date, b.birth_date) {
            (Some(x), Some(y)) if x == y => 1.0,
            _ => 0.0,
        };
        let position = position_credit(a.position.as_deref(), b.position.as_deref());

        Some(Candidate {
            entity_type: a.entity_type,
            id_a: a.id,
            id_b: b.id,
            score: (NAME_WEIGHT * name_similarity
                + BIRTH_DATE_WEIGHT * birth_match
                + POSITION_WEIGHT * position)
                / 10.0,
            name_similarity,
        })
    }

    /// All pairs across the two sides, best first. A pair seen from both
    /// directions is reported once.
    pub fn rank(&self, side_a: &[MasterEntity], side_b: &[MasterEntity]) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = side_a
            .iter()
            .flat_map(|a| side_b.iter().filter_map(move |b| self.score_pair(a, b)))
            .collect();

        Self::sort_and_dedupe(&mut candidates);
        candidates
    }

    /// Duplicate pairs inside one list of records, best first. Pairs whose
    /// birth dates are both known and differ are never reported.
    pub fn rank_within(&self, records: &[MasterEntity]) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = records
            .iter()
            .enumerate()
            .flat_map(move |(i, a)| {
                records[i + 1..].iter().filter_map(move |b| {
                    if let (Some(x), Some(y)) = (a.birth_date, b.birth_date) {
                        if x != y {
                            return None;
                        }
                    }
                    let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };
                    self.score_pair(first, second)
                })
            })
            .collect();

        Self::sort_and_dedupe(&mut candidates);
        candidates
    }

    fn sort_and_dedupe(candidates: &mut Vec<Candidate>) {
        candidates.sort_by(|x, y| {
            y.score
                .total_cmp(&x.score)
                .then_with(|| (x.id_a, x.id_b).cmp(&(y.id_a, y.id_b)))
        });

        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert((c.id_a.min(c.id_b), c.id_a.max(c.id_b))));
    }
}

/// Candidate duplicates between the records known to two sources
pub fn find_candidates<S: NameSimilarity>(
    db: &Database,
    entity_type: EntityType,
    source_a: &str,
    source_b: &str,
    scorer: &CandidateScorer<S>,
) -> Result<Vec<Candidate>> {
    let side_a = db.entities_from_source(entity_type, source_a)?;
    let side_b = db.entities_from_source(entity_type, source_b)?;
    let candidates = scorer.rank(&side_a, &side_b);

    log::info!(
        "{} candidates: {} {} x {} {} -> {} pairs",
        entity_type,
        side_a.len(),
        source_a,
        side_b.len(),
        source_b,
        candidates.len()
    );
    Ok(candidates)
}

/// Candidate duplicates among every master record of a type, whichever
/// source introduced them
pub fn find_duplicates<S: NameSimilarity>(
    db: &Database,
    entity_type: EntityType,
    scorer: &CandidateScorer<S>,
) -> Result<Vec<Candidate>> {
    let records = db.all_master_entities(entity_type)?;
    let candidates = scorer.rank_within(&records);

    log::info!(
        "{} duplicates: {} records -> {} pairs",
        entity_type,
        records.len(),
        candidates.len()
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_player(id: i64, name: &str, born: Option<(i32, u32, u32)>, position: Option<&str>) -> MasterEntity {
        MasterEntity {
            entity_type: EntityType::Player,
            id,
            name: name.to_string(),
            birth_date: born.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            nationality: None,
            position: position.map(str::to_string),
        }
    }

    #[test]
    fn test_identical_name_and_birth_date() {
        let scorer = CandidateScorer::new(0.80);
        let a = make_player(1, "William Saliba", Some((2001, 3, 24)), None);
        let b = make_player(2, "William Saliba", Some((2001, 3, 24)), None);

        let candidate = scorer.score_pair(&a, &b).unwrap();
        assert!(candidate.score >= 0.9);
        assert_eq!(candidate.name_similarity, 1.0);
    }

    #[test]
    fn test_position_credit() {
        assert_eq!(position_credit(Some("DF"), Some("df")), 1.0);
        assert_eq!(position_credit(Some("DF"), Some("MF")), POSITION_PARTIAL);
        assert_eq!(position_credit(Some("DF"), None), 0.0);
        assert_eq!(position_credit(Some(""), Some("DF")), 0.0);

        let scorer = CandidateScorer::new(0.80);
        let a = make_player(1, "Ben White", Some((1997, 10, 8)), Some("DF"));
        let b = make_player(2, "Ben White", Some((1997, 10, 8)), Some("DF"));
        assert!((scorer.score_pair(&a, &b).unwrap().score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_floor_and_self_pairs() {
        let scorer = CandidateScorer::new(0.80);
        let a = make_player(1, "Gabriel Jesus", None, None);
        let b = make_player(2, "Gabriel Martinelli", None, None);
        assert!(scorer.score_pair(&a, &b).is_none());
        assert!(scorer.score_pair(&a, &a).is_none());
    }

    #[test]
    fn test_rank_orders_and_dedupes() {
        let scorer = CandidateScorer::new(0.80);
        let side_a = vec![
            make_player(1, "Declan Rice", None, None),
            make_player(3, "Kai Havertz", Some((1999, 6, 11)), None),
        ];
        let side_b = vec![
            make_player(2, "Declan Rice", None, None),
            make_player(4, "Kai Havertz", Some((1999, 6, 11)), None),
            make_player(1, "Declan Rice", None, None),
        ];
        let mut side_a_mirror = side_a.clone();
        side_a_mirror.push(make_player(2, "Declan Rice", None, None));

        let ranked = scorer.rank(&side_a_mirror, &side_b);
        let pairs: Vec<(i64, i64)> = ranked.iter().map(|c| (c.id_a, c.id_b)).collect();
        assert_eq!(pairs, vec![(3, 4), (1, 2)]);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_find_candidates_from_store() {
        let db = Database::in_memory().unwrap();
        let born = NaiveDate::from_ymd_opt(2001, 9, 5).unwrap();
        let a = MasterEntity::new(EntityType::Player, "Bukayo Saka").with_birth_date(born);
        let b = MasterEntity::new(EntityType::Player, "Bukayo  Saka").with_birth_date(born);
        db.register_source_entity("fbref", "p1", &a, 1.0).unwrap();
        db.register_source_entity("transfermarkt", "433177", &b, 1.0).unwrap();

        let scorer = CandidateScorer::new(0.80);
        let found = find_candidates(&db, EntityType::Player, "fbref", "transfermarkt", &scorer).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].score > 0.85);
    }

    #[test]
    fn test_rank_within_pairs_each_record_once() {
        let scorer = CandidateScorer::new(0.80);
        let records = vec![
            make_player(5, "Declan Rice", None, Some("MF")),
            make_player(2, "Declan Rice", None, Some("MF")),
            make_player(7, "Declan  Rice", None, None),
            make_player(9, "Bukayo Saka", None, None),
        ];

        let ranked = scorer.rank_within(&records);
        let pairs: Vec<(i64, i64)> = ranked.iter().map(|c| (c.id_a, c.id_b)).collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], (2, 5));
        assert!(pairs.iter().all(|(a, b)| a < b));
    }

    #[test]
    fn test_rank_within_skips_different_birth_dates() {
        let scorer = CandidateScorer::new(0.80);
        let records = vec![
            make_player(1, "Danny Ward", Some((1991, 12, 9)), None),
            make_player(2, "Danny Ward", Some((1993, 6, 22)), None),
            make_player(3, "Danny Ward", None, None),
        ];

        let pairs: Vec<(i64, i64)> = scorer
            .rank_within(&records)
            .iter()
            .map(|c| (c.id_a, c.id_b))
            .collect();
        assert_eq!(pairs, vec![(1, 3), (2, 3)]);
    }

    #[test]
    fn test_find_duplicates_ignores_sources() {
        let db = Database::in_memory().unwrap();
        let born = NaiveDate::from_ymd_opt(1999, 6, 11).unwrap();
        let player = MasterEntity::new(EntityType::Player, "Kai Havertz").with_birth_date(born);
        // two sightings from the same source that were never linked
        db.register_source_entity("fbref", "fb1", &player, 1.0).unwrap();
        db.register_source_entity("fbref", "fb2", &player, 1.0).unwrap();

        let scorer = CandidateScorer::new(0.80);
        assert!(find_candidates(&db, EntityType::Player, "fbref", "transfermarkt", &scorer)
            .unwrap()
            .is_empty());
        let found = find_duplicates(&db, EntityType::Player, &scorer).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].score >= 0.9);
    }
}

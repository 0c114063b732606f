//! Reconciliation pass: find, partition, group, merge

use serde::{Deserialize, Serialize};

use super::candidates::{find_candidates, find_duplicates, CandidateScorer};
use super::merge::merge_entities;
use super::merge_groups::DisjointSet;
use super::similarity::NameSimilarity;
use super::{Candidate, MergeOutcome};
use crate::data::Database;
use crate::{EntityType, ReconcileConfig, Result, SoccerError};

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Pairs above the name floor
    pub candidates: usize,
    /// Pairs at or above the auto-merge threshold
    pub eligible: Vec<Candidate>,
    /// Pairs queued for manual review
    pub queued: usize,
    /// (keep, removed) for every merge performed
    pub merged: Vec<(i64, i64)>,
    pub already_merged: usize,
    /// (keep, remove) pairs the store refused to merge, e.g. two teams that
    /// have played each other
    pub conflicts: Vec<(i64, i64)>,
}

/// Reconcile one entity type across the two configured sources using the
/// default sequence-ratio name measure
pub fn reconcile_identities(
    db: &mut Database,
    entity_type: EntityType,
    config: &ReconcileConfig,
) -> Result<ReconcileReport> {
    let scorer = CandidateScorer::new(config.name_similarity_floor);
    reconcile_with(db, entity_type, config, &scorer)
}

/// Reconcile with an explicit scorer.
///
/// Pairs below the auto-merge threshold are only queued for review. Pairs
/// at or above it are merged when `config.auto_merge` is set: they are first
/// grouped transitively and each group is merged into its lowest master id,
/// whichever source that record came from.
pub fn reconcile_with<S: NameSimilarity>(
    db: &mut Database,
    entity_type: EntityType,
    config: &ReconcileConfig,
    scorer: &CandidateScorer<S>,
) -> Result<ReconcileReport> {
    let candidates = find_candidates(db, entity_type, &config.source_a, &config.source_b, scorer)?;
    resolve(db, entity_type, config, candidates)
}

/// Look for duplicates among all master records of a type, not just across
/// the two configured sources, using the default name measure
pub fn dedupe_identities(
    db: &mut Database,
    entity_type: EntityType,
    config: &ReconcileConfig,
) -> Result<ReconcileReport> {
    let scorer = CandidateScorer::new(config.name_similarity_floor);
    dedupe_with(db, entity_type, config, &scorer)
}

/// Within-type duplicate pass with an explicit scorer. Same review and
/// auto-merge policy as `reconcile_with`.
pub fn dedupe_with<S: NameSimilarity>(
    db: &mut Database,
    entity_type: EntityType,
    config: &ReconcileConfig,
    scorer: &CandidateScorer<S>,
) -> Result<ReconcileReport> {
    let candidates = find_duplicates(db, entity_type, scorer)?;
    resolve(db, entity_type, config, candidates)
}

fn resolve(
    db: &mut Database,
    entity_type: EntityType,
    config: &ReconcileConfig,
    candidates: Vec<Candidate>,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport {
        candidates: candidates.len(),
        ..ReconcileReport::default()
    };

    for candidate in candidates {
        if candidate.score >= config.auto_merge_threshold {
            report.eligible.push(candidate);
        } else {
            db.queue_review(
                entity_type,
                candidate.id_a,
                candidate.id_b,
                candidate.score,
                candidate.name_similarity,
            )?;
            report.queued += 1;
        }
    }

    if !config.auto_merge {
        if !report.eligible.is_empty() {
            log::info!(
                "{} {} pairs eligible for auto-merge; auto_merge is off",
                report.eligible.len(),
                entity_type
            );
        }
        return Ok(report);
    }

    let mut groups = DisjointSet::new();
    for candidate in &report.eligible {
        groups.union(candidate.id_a, candidate.id_b);
    }

    for (keep, members) in groups.groups() {
        for remove in members.into_iter().filter(|id| *id != keep) {
            match merge_entities(db, entity_type, keep, remove, None) {
                Ok(MergeOutcome::Merged { keep, removed }) => report.merged.push((keep, removed)),
                Ok(MergeOutcome::AlreadyMerged) => report.already_merged += 1,
                Err(SoccerError::MergeConflict { .. }) => report.conflicts.push((keep, remove)),
                Err(e) => return Err(e),
            }
        }
    }

    log::info!(
        "Reconciled {}: {} candidates, {} merged, {} queued for review",
        entity_type,
        report.candidates,
        report.merged.len(),
        report.queued
    );
    Ok(report)
}

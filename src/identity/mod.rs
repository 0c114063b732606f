//! Cross-source identity reconciliation
//!
//! Finds master records that describe the same real-world entity under
//! different source ids, scores them, and merges accepted duplicates while
//! keeping every reference consistent.

pub mod candidates;
pub mod merge;
pub mod merge_groups;
pub mod reconcile;
pub mod similarity;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::EntityType;

pub use candidates::{find_candidates, find_duplicates, CandidateScorer};
pub use merge::merge_entities;
pub use merge_groups::DisjointSet;
pub use reconcile::{dedupe_identities, reconcile_identities, ReconcileReport};
pub use similarity::{JaroWinkler, NameSimilarity, SequenceRatio};

/// A scored pair of master records that may be the same entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub entity_type: EntityType,
    /// Record seen in the first source
    pub id_a: i64,
    /// Record seen in the second source
    pub id_b: i64,
    /// Composite score in [0, 1]
    pub score: f64,
    pub name_similarity: f64,
}

/// Result of a merge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOutcome {
    Merged { keep: i64, removed: i64 },
    /// The losing record was already gone (or keep == remove); nothing changed
    AlreadyMerged,
}

/// Display fields to overwrite on the surviving record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOverrides {
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub position: Option<String>,
}

impl FieldOverrides {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.birth_date.is_none()
            && self.nationality.is_none()
            && self.position.is_none()
    }
}

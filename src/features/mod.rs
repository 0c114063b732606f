//! Point-in-time feature computation
//!
//! The temporal state tracker and the pure formulas it is built from.

pub mod elo;
pub mod metrics;
pub mod pythagorean;
pub mod record;
pub mod rolling;
pub mod schedule;
pub mod team_state;
pub mod team_stats;
pub mod tracker;
pub mod venue;

pub use record::FeatureRecord;
pub use team_state::{TeamSnapshot, TeamTemporalState};
pub use tracker::{MatchSnapshot, MatchStep, TemporalStateTracker};
pub use venue::VenueBook;

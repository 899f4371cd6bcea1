//! Pairwise ranking: TrueSkill beliefs, the comparison stack and matchmaking.

/// Ranking engine: comparisons, undo, phase, leaderboard.
pub mod engine;
/// Normal-distribution helpers for the update rule.
pub mod gaussian;
/// Next-pair selection per phase.
pub mod matchmaker;
/// Rating records and the comparison stack.
pub mod store;
/// Two-player belief update.
pub mod trueskill;

pub use engine::{LeaderboardEntry, PoolChange, PoolMember, RankingEngine, RankingError, RankingStats};
pub use matchmaker::{Matchmaker, MatchmakingParams};
pub use store::{ComparisonLog, ComparisonRecord, RatedPhoto, RatingStore};
pub use trueskill::{Rating, RatingParams, rate_pair};

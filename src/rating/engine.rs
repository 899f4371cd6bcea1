use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::{ComparisonSeq, ContentId, Outcome, Phase, PhotoId};

use super::{
    matchmaker::{Matchmaker, MatchmakingParams},
    store::{ComparisonLog, ComparisonRecord, RatedPhoto, RatingStore},
    trueskill::{Rating, RatingParams, rate_pair},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankingError {
    #[error("nothing to rank yet: {eligible} photo(s) in the pool")]
    InsufficientPool { eligible: usize },
    #[error("{0} is not in the ranking pool")]
    UnknownIdentity(ContentId),
    #[error("cannot compare {0} with itself")]
    SamePhoto(ContentId),
    #[error("no comparison to undo")]
    NothingToUndo,
    #[error("comparison #{0} is out of order")]
    OutOfOrder(ComparisonSeq),
}

impl RankingError {
    /// Errors the caller should show as a state, not a failure.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            RankingError::InsufficientPool { .. } | RankingError::NothingToUndo
        )
    }
}

/// A photo eligible for ranking, as produced by hashing an accepted photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMember {
    pub content_id: ContentId,
    pub location: PathBuf,
    pub photo: Option<PhotoId>,
}

/// What a pool sync changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolChange {
    /// New identities, with default priors.
    pub entered: Vec<RatedPhoto>,
    /// Known identities whose file moved or were re-linked to a photo.
    pub relocated: Vec<RatedPhoto>,
    /// Identities that left the accepted set.
    pub removed: Vec<RatedPhoto>,
}

impl PoolChange {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.relocated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based rank.
    pub rank: usize,
    pub content_id: ContentId,
    pub photo: Option<PhotoId>,
    pub location: PathBuf,
    /// `mu - k * sigma`.
    pub score: f64,
    pub mu: f64,
    pub sigma: f64,
    pub comparisons: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingStats {
    pub phase: Phase,
    /// Comparisons that updated ratings.
    pub total_comparisons: u64,
    pub skipped_comparisons: u64,
    pub total_photos: usize,
    /// `sigma >= 0.6 * sigma0`.
    pub high_uncertainty: usize,
    pub medium_uncertainty: usize,
    /// `sigma < 0.3 * sigma0`.
    pub low_uncertainty: usize,
    pub avg_comparisons: f64,
}

/// Applies comparison outcomes, derives the phase and serves the leaderboard.
#[derive(Debug)]
pub struct RankingEngine {
    store: RatingStore,
    history: ComparisonLog,
    matchmaker: Matchmaker,
    params: RatingParams,
}

impl RankingEngine {
    pub fn new(params: RatingParams, matchmaking: MatchmakingParams) -> Self {
        Self {
            store: RatingStore::new(),
            history: ComparisonLog::new(),
            matchmaker: Matchmaker::new(matchmaking),
            params,
        }
    }

    pub(crate) fn from_parts(
        params: RatingParams,
        matchmaking: MatchmakingParams,
        entries: Vec<RatedPhoto>,
        history: Vec<ComparisonRecord>,
        next_seq: ComparisonSeq,
    ) -> Result<Self, RankingError> {
        Ok(Self {
            store: RatingStore::from_entries(entries),
            history: ComparisonLog::from_parts(history, next_seq).map_err(RankingError::OutOfOrder)?,
            matchmaker: Matchmaker::new(matchmaking),
            params,
        })
    }

    pub(crate) fn export_parts(&self) -> (Vec<RatedPhoto>, Vec<ComparisonRecord>, ComparisonSeq) {
        let (records, next_seq) = self.history.export_parts();
        (self.store.export_entries(), records, next_seq)
    }

    pub fn params(&self) -> &RatingParams {
        &self.params
    }

    pub fn store(&self) -> &RatingStore {
        &self.store
    }

    pub fn history(&self) -> &ComparisonLog {
        &self.history
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    /// Current phase, derived from the store on every call.
    ///
    /// Refine once every rated photo has `min_comparisons`, or once the
    /// optional bootstrap budget of decisive comparisons is spent.
    pub fn phase(&self) -> Phase {
        if self
            .params
            .bootstrap_budget
            .is_some_and(|budget| self.history.decisive_count() >= budget)
        {
            return Phase::Refine;
        }
        let covered = !self.store.is_empty()
            && self
                .store
                .iter()
                .all(|p| p.rating.comparisons >= self.params.min_comparisons);
        if covered { Phase::Refine } else { Phase::Bootstrap }
    }

    /// Reconciles the pool with the current set of eligible photos.
    ///
    /// New identities get default priors, known ones keep their rating and
    /// pick up the new location. With `prune`, identities missing from
    /// `members` are dropped.
    pub fn sync_pool(&mut self, members: Vec<PoolMember>, prune: bool) -> PoolChange {
        let mut change = PoolChange::default();
        let mut seen: hashbrown::HashSet<ContentId> = hashbrown::HashSet::new();

        for member in members {
            if !seen.insert(member.content_id.clone()) {
                // Same bytes under two paths: first one wins.
                continue;
            }
            match self.store.get(&member.content_id) {
                Some(existing) => {
                    let moved = existing.location != member.location
                        || (member.photo.is_some() && existing.photo != member.photo);
                    if moved {
                        self.store
                            .relocate(&member.content_id, member.location, member.photo);
                        if let Some(entry) = self.store.get(&member.content_id) {
                            change.relocated.push(entry.clone());
                        }
                    }
                }
                None => {
                    let entry = RatedPhoto {
                        content_id: member.content_id,
                        rating: Rating::prior(&self.params),
                        location: member.location,
                        photo: member.photo,
                    };
                    self.store.insert(entry.clone());
                    change.entered.push(entry);
                }
            }
        }

        if prune {
            let stale: Vec<ContentId> = self
                .store
                .ordered_ids()
                .iter()
                .filter(|id| !seen.contains(*id))
                .cloned()
                .collect();
            for id in stale {
                if let Some(removed) = self.store.remove(&id) {
                    change.removed.push(removed);
                }
            }
        }

        debug!(
            entered = change.entered.len(),
            relocated = change.relocated.len(),
            removed = change.removed.len(),
            pool = self.store.len(),
            "ranking pool synced"
        );
        change
    }

    /// Picks the next pair for the current phase.
    pub fn next_pair(&mut self) -> Result<(ContentId, ContentId), RankingError> {
        let phase = self.phase();
        self.matchmaker
            .select_pair(&self.store, phase, self.params.beta)
            .ok_or(RankingError::InsufficientPool {
                eligible: self.store.len(),
            })
    }

    /// Records one judgment and applies the rating update.
    ///
    /// The returned record carries both pre-update ratings, which is all
    /// [`RankingEngine::undo`] needs.
    pub fn compare(
        &mut self,
        left: &str,
        right: &str,
        outcome: Outcome,
    ) -> Result<ComparisonRecord, RankingError> {
        if left == right {
            return Err(RankingError::SamePhoto(left.to_string()));
        }
        let left_before = self
            .store
            .rating(left)
            .ok_or_else(|| RankingError::UnknownIdentity(left.to_string()))?;
        let right_before = self
            .store
            .rating(right)
            .ok_or_else(|| RankingError::UnknownIdentity(right.to_string()))?;

        let (left_after, right_after) = rate_pair(left_before, right_before, outcome, &self.params);
        self.store.set_rating(left, left_after);
        self.store.set_rating(right, right_after);

        if !self.matchmaker.is_recent_pair(left, right) {
            self.matchmaker.note_pair(left, right);
        }

        let record = ComparisonRecord {
            seq: self.history.take_next_seq(),
            left: left.to_string(),
            right: right.to_string(),
            outcome,
            left_before,
            right_before,
            ts_ms: crate::session::now_ms(),
        };
        self.history.push(record.clone());

        debug!(seq = record.seq, left, right, ?outcome, "comparison committed");
        Ok(record)
    }

    /// Pops the latest comparison and restores both pre-update ratings.
    ///
    /// Identities that have since left the pool are skipped.
    pub fn undo(&mut self) -> Result<ComparisonRecord, RankingError> {
        let record = self.history.pop().ok_or(RankingError::NothingToUndo)?;
        self.store.set_rating(&record.left, record.left_before);
        self.store.set_rating(&record.right, record.right_before);
        debug!(seq = record.seq, "comparison undone");
        Ok(record)
    }

    /// Top `limit` photos by conservative score, best first.
    ///
    /// Ties keep pool-entry order, so repeated queries return the same order.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let k = self.params.score_k;
        let mut ranked: Vec<&RatedPhoto> = self.store.iter().collect();
        ranked.sort_by(|a, b| b.rating.score(k).total_cmp(&a.rating.score(k)));

        ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(idx, p)| LeaderboardEntry {
                rank: idx + 1,
                content_id: p.content_id.clone(),
                photo: p.photo.clone(),
                location: p.location.clone(),
                score: p.rating.score(k),
                mu: p.rating.mu,
                sigma: p.rating.sigma,
                comparisons: p.rating.comparisons,
            })
            .collect()
    }

    pub fn stats(&self) -> RankingStats {
        let sigma0 = self.params.sigma0;
        let total_photos = self.store.len();
        let (mut high, mut medium, mut low) = (0, 0, 0);
        let mut comparisons = 0u64;

        for p in self.store.iter() {
            comparisons += u64::from(p.rating.comparisons);
            if p.rating.sigma >= 0.6 * sigma0 {
                high += 1;
            } else if p.rating.sigma < 0.3 * sigma0 {
                low += 1;
            } else {
                medium += 1;
            }
        }

        RankingStats {
            phase: self.phase(),
            total_comparisons: self.history.decisive_count(),
            skipped_comparisons: self.history.skipped_count(),
            total_photos,
            high_uncertainty: high,
            medium_uncertainty: medium,
            low_uncertainty: low,
            avg_comparisons: if total_photos == 0 {
                0.0
            } else {
                comparisons as f64 / total_photos as f64
            },
        }
    }

    /// Rebuilds a journaled pool entry; known identities are relocated.
    pub(crate) fn replay_entered(&mut self, entry: RatedPhoto) {
        if self.store.contains(&entry.content_id) {
            self.store
                .relocate(&entry.content_id, entry.location, entry.photo);
        } else {
            self.store.insert(entry);
        }
    }

    pub(crate) fn replay_left(&mut self, content_id: &str) {
        self.store.remove(content_id);
    }

    /// Re-applies a journaled comparison using the ratings it produced.
    ///
    /// Nothing changes unless both photos are pooled and the record sits
    /// above the current history.
    pub(crate) fn replay_compared(
        &mut self,
        record: ComparisonRecord,
        left_after: Rating,
        right_after: Rating,
    ) -> Result<(), RankingError> {
        for id in [&record.left, &record.right] {
            if !self.store.contains(id) {
                return Err(RankingError::UnknownIdentity(id.clone()));
            }
        }
        if !self.history.accepts(record.seq) {
            return Err(RankingError::OutOfOrder(record.seq));
        }

        self.store.set_rating(&record.left, left_after);
        self.store.set_rating(&record.right, right_after);
        self.history.push(record);
        Ok(())
    }

    pub(crate) fn replay_undo(&mut self, seq: ComparisonSeq) -> Result<(), RankingError> {
        match self.history.peek() {
            Some(top) if top.seq == seq => {
                self.undo()?;
                Ok(())
            }
            _ => Err(RankingError::NothingToUndo),
        }
    }
}

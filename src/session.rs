//! Session aggregate: triage and ranking state for one photo collection.
//!
//! [`Session`] is the authoritative in-memory state. Every committed
//! mutation appends a [`StoredOp`] to an internal buffer that the runtime
//! drains into the journal; [`Session::apply_replayed_op`] rebuilds the same
//! state from that journal.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    core::{
        catalog::{CatalogError, FolderSummary, PhotoCatalog, Registration, StatusCounts},
        decisions::{DecisionLog, DecisionRecord},
    },
    fs::FileMover,
    op::{Op, StoredOp},
    photo::{Photo, PhotoDraft, SideEffect},
    rating::{
        ComparisonRecord, LeaderboardEntry, MatchmakingParams, PoolChange, PoolMember, RankingEngine, RankingError,
        RankingStats, RatedPhoto, Rating, RatingParams,
    },
    triage::{DecisionPlan, Destinations, TriageController, TriageError, UndoPlan},
    types::{Action, ComparisonSeq, ContentId, DecisionSeq, OpSeq, Outcome, Phase, PhotoId, Status},
};

/// Everything a session needs besides its persisted state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    pub destinations: Destinations,
    pub rating: RatingParams,
    pub matchmaking: MatchmakingParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshotV1 {
    pub next_op_seq: OpSeq,
    pub photos: Vec<Photo>,
    pub retired: Vec<PathBuf>,
    pub decisions: Vec<DecisionRecord>,
    pub next_decision_seq: DecisionSeq,
    pub ratings: Vec<RatedPhoto>,
    pub comparisons: Vec<ComparisonRecord>,
    pub next_comparison_seq: ComparisonSeq,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("op {seq}: {source}")]
    Triage {
        seq: OpSeq,
        #[source]
        source: TriageError,
    },
    #[error("op {seq}: {source}")]
    Ranking {
        seq: OpSeq,
        #[source]
        source: RankingError,
    },
    #[error("snapshot: {0}")]
    Snapshot(#[from] CatalogError),
    #[error("snapshot: {0}")]
    SnapshotRanking(#[source] RankingError),
}

/// Tally of a batch registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: usize,
    pub already_present: usize,
    /// Paths already registered from a different source folder.
    pub conflicts: Vec<PhotoId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowseSort {
    /// Discovery order.
    #[default]
    Discovery,
    /// Case-insensitive file name.
    Filename,
    /// Leaderboard score, best first; unranked photos last.
    ScoreDesc,
    /// Leaderboard score, worst first; unranked photos last.
    ScoreAsc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseItem {
    pub photo: Photo,
    /// Present when the photo is in the ranking pool.
    pub rating: Option<Rating>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowsePage {
    pub items: Vec<BrowseItem>,
    pub total: usize,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
    /// At least 1, even when empty.
    pub total_pages: usize,
}

#[derive(Debug)]
pub struct Session {
    triage: TriageController,
    ranking: RankingEngine,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            triage: TriageController::new(settings.destinations),
            ranking: RankingEngine::new(settings.rating, settings.matchmaking),
            pending_ops: Vec::new(),
            next_op_seq: 1,
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshotV1, settings: SessionSettings) -> Result<Self, ReplayError> {
        let mut catalog = PhotoCatalog::new();
        for photo in snapshot.photos {
            catalog.restore(photo)?;
        }
        for folder in &snapshot.retired {
            catalog.retire_folder(folder);
        }

        let log = DecisionLog::from_parts(snapshot.decisions, snapshot.next_decision_seq);
        let ranking = RankingEngine::from_parts(
            settings.rating,
            settings.matchmaking,
            snapshot.ratings,
            snapshot.comparisons,
            snapshot.next_comparison_seq,
        )
        .map_err(ReplayError::SnapshotRanking)?;

        Ok(Self {
            triage: TriageController::from_parts(catalog, log, settings.destinations),
            ranking,
            pending_ops: Vec::new(),
            next_op_seq: snapshot.next_op_seq.max(1),
        })
    }

    pub fn export_snapshot(&self) -> SessionSnapshotV1 {
        let (photos, retired) = self.triage.catalog().export_parts();
        let (decisions, next_decision_seq) = self.triage.log().export_parts();
        let (ratings, comparisons, next_comparison_seq) = self.ranking.export_parts();
        SessionSnapshotV1 {
            next_op_seq: self.next_op_seq,
            photos,
            retired,
            decisions,
            next_decision_seq,
            ratings,
            comparisons,
            next_comparison_seq,
        }
    }

    pub fn triage(&self) -> &TriageController {
        &self.triage
    }

    pub fn ranking(&self) -> &RankingEngine {
        &self.ranking
    }

    pub fn photo(&self, id: &Path) -> Option<&Photo> {
        self.triage.catalog().get(id)
    }

    pub fn set_destinations(&mut self, destinations: Destinations) {
        self.triage.set_destinations(destinations);
    }

    // ---- triage ----

    pub fn register(&mut self, draft: PhotoDraft) -> Result<Registration, TriageError> {
        let id = draft.id.clone();
        let outcome = self.triage.register(draft)?;
        if outcome == Registration::Added {
            if let Some(photo) = self.triage.catalog().get(&id).cloned() {
                self.emit(Op::Registered { photo });
            }
        }
        Ok(outcome)
    }

    /// Registers a scan; conflicting paths are collected, not fatal.
    pub fn register_all(&mut self, drafts: impl IntoIterator<Item = PhotoDraft>) -> ScanSummary {
        let mut summary = ScanSummary::default();
        for draft in drafts {
            let id = draft.id.clone();
            match self.register(draft) {
                Ok(Registration::Added) => summary.added += 1,
                Ok(Registration::AlreadyPresent) => summary.already_present += 1,
                Err(_) => summary.conflicts.push(id),
            }
        }
        info!(
            added = summary.added,
            already_present = summary.already_present,
            conflicts = summary.conflicts.len(),
            "scan registered"
        );
        summary
    }

    /// Next photo to triage, or `None` when every photo is decided.
    pub fn present_next(&mut self) -> Result<Option<Photo>, TriageError> {
        let Some(presented) = self.triage.present_next()? else {
            return Ok(None);
        };
        if presented.requeued {
            self.emit(Op::Requeued {
                photo: presented.photo.id.clone(),
            });
        }
        Ok(Some(presented.photo))
    }

    pub fn plan_decision(&self, id: &Path, action: Action) -> Result<DecisionPlan, TriageError> {
        self.triage.plan_decision(id, action)
    }

    pub fn commit_decision(
        &mut self,
        plan: &DecisionPlan,
        side_effect: Option<SideEffect>,
    ) -> Result<DecisionRecord, TriageError> {
        let record = self.triage.commit_decision(plan, side_effect)?;
        self.emit(Op::Decided {
            record: record.clone(),
        });
        Ok(record)
    }

    pub fn decide(&mut self, mover: &dyn FileMover, id: &Path, action: Action) -> Result<DecisionRecord, TriageError> {
        let plan = self.plan_decision(id, action)?;
        let side_effect = plan.perform(mover)?;
        self.commit_decision(&plan, side_effect)
    }

    pub fn plan_undo(&self) -> Result<UndoPlan, TriageError> {
        self.triage.plan_undo()
    }

    pub fn commit_undo(&mut self, plan: &UndoPlan) -> Result<DecisionRecord, TriageError> {
        let record = self.triage.commit_undo(plan)?;
        self.emit(Op::DecisionUndone {
            seq: record.seq,
            photo: record.photo.clone(),
        });
        Ok(record)
    }

    pub fn undo_triage(&mut self, mover: &dyn FileMover) -> Result<DecisionRecord, TriageError> {
        let plan = self.plan_undo()?;
        plan.perform(mover)?;
        self.commit_undo(&plan)
    }

    /// Hides `folder` from triage; returns false if it was already retired.
    pub fn retire_folder(&mut self, folder: &Path) -> bool {
        if self.triage.catalog().is_retired(folder) {
            return false;
        }
        self.triage.retire_folder(folder);
        self.emit(Op::FolderRetired {
            folder: folder.to_path_buf(),
        });
        true
    }

    pub fn stats(&self) -> StatusCounts {
        self.triage.stats()
    }

    pub fn folder_summaries(&self) -> Vec<FolderSummary> {
        self.triage.catalog().folder_summaries()
    }

    /// Lists photos with `status`, one page at a time.
    ///
    /// `page` is 1-based; page 0 is treated as page 1.
    pub fn browse(&self, status: Status, sort: BrowseSort, page: usize, per_page: usize) -> BrowsePage {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let k = self.ranking.params().score_k;
        let store = self.ranking.store();

        let mut items: Vec<BrowseItem> = self
            .triage
            .catalog()
            .list_by_status(status)
            .map(|photo| {
                let rating = store
                    .content_id_of(&photo.id)
                    .and_then(|cid| store.rating(cid));
                BrowseItem {
                    photo: photo.clone(),
                    rating,
                    score: rating.map(|r| r.score(k)),
                }
            })
            .collect();

        match sort {
            BrowseSort::Discovery => {}
            BrowseSort::Filename => items.sort_by(|a, b| {
                a.photo
                    .filename
                    .to_lowercase()
                    .cmp(&b.photo.filename.to_lowercase())
            }),
            BrowseSort::ScoreDesc => items.sort_by(|a, b| by_score(a.score, b.score, true)),
            BrowseSort::ScoreAsc => items.sort_by(|a, b| by_score(a.score, b.score, false)),
        }

        let total = items.len();
        let total_pages = total.div_ceil(per_page).max(1);
        let items = items
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        BrowsePage {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    // ---- ranking ----

    /// Accepted photos and their current locations, the input to hashing.
    pub fn pool_candidates(&self) -> Vec<(PhotoId, PathBuf)> {
        self.triage.accepted_locations()
    }

    /// Applies a hashed pool; see [`RankingEngine::sync_pool`].
    pub fn sync_pool(&mut self, members: Vec<PoolMember>, prune: bool) -> PoolChange {
        let change = self.ranking.sync_pool(members, prune);
        for entry in change.entered.iter().chain(&change.relocated) {
            self.emit(Op::PoolEntered {
                entry: entry.clone(),
            });
        }
        for removed in &change.removed {
            self.emit(Op::PoolLeft {
                content_id: removed.content_id.clone(),
            });
        }
        info!(
            entered = change.entered.len(),
            removed = change.removed.len(),
            pool = self.ranking.store().len(),
            "ranking pool updated"
        );
        change
    }

    pub fn phase(&self) -> Phase {
        self.ranking.phase()
    }

    /// Selection only touches matchmaking memory, which is not journaled.
    pub fn next_pair(&mut self) -> Result<(ContentId, ContentId), RankingError> {
        self.ranking.next_pair()
    }

    pub fn compare(&mut self, left: &str, right: &str, outcome: Outcome) -> Result<ComparisonRecord, RankingError> {
        let record = self.ranking.compare(left, right, outcome)?;
        let store = self.ranking.store();
        let left_after = store.rating(left).unwrap_or(record.left_before);
        let right_after = store.rating(right).unwrap_or(record.right_before);
        self.emit(Op::Compared {
            record: record.clone(),
            left_after,
            right_after,
        });
        Ok(record)
    }

    pub fn undo_ranking(&mut self) -> Result<ComparisonRecord, RankingError> {
        let record = self.ranking.undo()?;
        self.emit(Op::ComparisonUndone { seq: record.seq });
        Ok(record)
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.ranking.leaderboard(limit)
    }

    pub fn ranking_stats(&self) -> RankingStats {
        self.ranking.stats()
    }

    // ---- journal ----

    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), ReplayError> {
        let seq = stored.seq;
        let triage = |source| ReplayError::Triage { seq, source };
        let ranking = |source| ReplayError::Ranking { seq, source };

        match stored.op {
            Op::Registered { photo } => self.triage.replay_registered(photo).map_err(triage)?,
            Op::Decided { record } => self.triage.replay_decided(record).map_err(triage)?,
            Op::DecisionUndone { seq: decision, .. } => self.triage.replay_undone(decision).map_err(triage)?,
            Op::Requeued { photo } => self.triage.replay_requeued(&photo).map_err(triage)?,
            Op::FolderRetired { folder } => self.triage.replay_retired(&folder),
            Op::PoolEntered { entry } => self.ranking.replay_entered(entry),
            Op::PoolLeft { content_id } => self.ranking.replay_left(&content_id),
            Op::Compared {
                record,
                left_after,
                right_after,
            } => self
                .ranking
                .replay_compared(record, left_after, right_after)
                .map_err(ranking)?,
            Op::ComparisonUndone { seq: comparison } => self.ranking.replay_undo(comparison).map_err(ranking)?,
        }

        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
        debug!(seq, "op replayed");
        Ok(())
    }

    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn emit(&mut self, op: Op) {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        self.pending_ops.push(StoredOp {
            seq,
            ts_ms: now_ms(),
            op,
        });
    }
}

/// Scored items first; unscored ones keep their relative order at the end.
fn by_score(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.total_cmp(&a),
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Runtime event stream payloads.

use std::path::PathBuf;

use crate::types::{Action, ContentId, OpSeq, Outcome, Phase, PhotoId, Status};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A rescan registered new photos.
    Scanned {
        /// Newly registered photos.
        added: usize,
    },
    /// A triage decision was committed.
    Decided {
        /// Decided photo.
        id: PhotoId,
        /// Requested action.
        action: Action,
        /// Where the file ended up, if it moved.
        moved_to: Option<PathBuf>,
    },
    /// The latest triage decision was reverted.
    TriageUndone {
        /// Photo whose status was restored.
        id: PhotoId,
        /// Status it is back in.
        status: Status,
    },
    /// A skipped photo came back to the head of the queue.
    Requeued {
        /// Re-presented photo.
        id: PhotoId,
    },
    /// A source folder was retired.
    FolderRetired {
        /// Retired folder.
        folder: PathBuf,
    },
    /// The ranking pool was reconciled with the accepted photos.
    PoolSynced {
        /// Identities added.
        entered: usize,
        /// Identities removed.
        removed: usize,
        /// Pool size afterwards.
        pool: usize,
    },
    /// A comparison was committed.
    Compared {
        /// Left identity.
        left: ContentId,
        /// Right identity.
        right: ContentId,
        /// Judgment.
        outcome: Outcome,
    },
    /// The latest comparison was reverted.
    RankingUndone {
        /// Left identity of the reverted comparison.
        left: ContentId,
        /// Right identity of the reverted comparison.
        right: ContentId,
    },
    /// The matchmaking phase changed.
    PhaseChanged {
        /// New phase.
        phase: Phase,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}

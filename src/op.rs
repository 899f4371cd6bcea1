//! Journaled mutation model and persistence wrappers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    core::decisions::DecisionRecord,
    photo::Photo,
    rating::{ComparisonRecord, RatedPhoto, Rating},
    types::{ComparisonSeq, ContentId, DecisionSeq, OpSeq, PhotoId},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Committed session mutation, appended to the journal.
///
/// Ops carry results rather than requests: replaying them never touches the
/// filesystem and never re-runs the rating update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// A photo was discovered.
    Registered {
        /// Registered photo, as materialized in the catalog.
        photo: Photo,
    },
    /// A triage decision was committed.
    Decided {
        /// Committed record, including the performed move.
        record: DecisionRecord,
    },
    /// The latest triage decision was reverted.
    DecisionUndone {
        /// Sequence of the reverted decision.
        seq: DecisionSeq,
        /// Photo whose status was restored.
        photo: PhotoId,
    },
    /// A skipped photo reached the head of the queue and is pending again.
    Requeued {
        /// Re-presented photo.
        photo: PhotoId,
    },
    /// A source folder was hidden from triage.
    FolderRetired {
        /// Retired folder.
        folder: PathBuf,
    },
    /// A content identity entered the ranking pool, or moved.
    PoolEntered {
        /// Entry as stored, including its rating.
        entry: RatedPhoto,
    },
    /// A content identity left the ranking pool.
    PoolLeft {
        /// Removed identity.
        content_id: ContentId,
    },
    /// A comparison was committed.
    Compared {
        /// Record with both pre-update ratings.
        record: ComparisonRecord,
        /// Left rating after the update.
        left_after: Rating,
        /// Right rating after the update.
        right_after: Rating,
    },
    /// The latest comparison was reverted.
    ComparisonUndone {
        /// Sequence of the reverted comparison.
        seq: ComparisonSeq,
    },
}

impl Op {
    /// Short, stable label stored alongside the payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Op::Registered { .. } => "registered",
            Op::Decided { .. } => "decided",
            Op::DecisionUndone { .. } => "decision_undone",
            Op::Requeued { .. } => "requeued",
            Op::FolderRetired { .. } => "folder_retired",
            Op::PoolEntered { .. } => "pool_entered",
            Op::PoolLeft { .. } => "pool_left",
            Op::Compared { .. } => "compared",
            Op::ComparisonUndone { .. } => "comparison_undone",
        }
    }
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}

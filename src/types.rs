//! Shared identities and the small enums that drive triage and ranking.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Triage-domain identity: the absolute path a photo was discovered at.
pub type PhotoId = PathBuf;
/// Ranking-domain identity: hex digest of the photo's bytes.
pub type ContentId = String;
/// Monotonic journal sequence number.
pub type OpSeq = u64;
/// Monotonic decision sequence number.
pub type DecisionSeq = u64;
/// Monotonic comparison sequence number.
pub type ComparisonSeq = u64;

/// Triage disposition of a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Waiting for a decision.
    Pending,
    /// Kept; relocated to the accepted folder.
    Accepted,
    /// Discarded; relocated to the rejected folder.
    Rejected,
    /// Deferred; waits at the back of the queue.
    Skipped,
}

impl Status {
    /// All statuses, in display order.
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Accepted,
        Status::Rejected,
        Status::Skipped,
    ];

    /// True while the photo still belongs to the triage queue.
    pub fn is_queued(self) -> bool {
        matches!(self, Status::Pending | Status::Skipped)
    }

    /// Lowercase label used for storage and display.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Accepted => "accepted",
            Status::Rejected => "rejected",
            Status::Skipped => "skipped",
        }
    }

    /// Parses the label produced by [`Status::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "accepted" => Some(Status::Accepted),
            "rejected" => Some(Status::Rejected),
            "skipped" => Some(Status::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triage action requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Keep the photo.
    Accept,
    /// Discard the photo.
    Reject,
    /// Defer the photo.
    Skip,
}

impl Action {
    /// Status a pending photo ends up in after this action.
    pub fn target_status(self) -> Status {
        match self {
            Action::Accept => Status::Accepted,
            Action::Reject => Status::Rejected,
            Action::Skip => Status::Skipped,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Accept => "accept",
            Action::Reject => "reject",
            Action::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Result of one pairwise judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The left photo is better.
    LeftWin,
    /// The right photo is better.
    RightWin,
    /// Neither is clearly better.
    Tie,
    /// No judgment; ratings stay untouched.
    Skip,
}

impl Outcome {
    /// True for outcomes that update ratings.
    pub fn is_decisive(self) -> bool {
        !matches!(self, Outcome::Skip)
    }
}

/// Matchmaking phase, derived from the rating store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Broad, even coverage: least-compared photos first.
    Bootstrap,
    /// Information-seeking: uncertain, closely matched pairs first.
    Refine,
}

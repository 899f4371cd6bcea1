use serde::{Deserialize, Serialize};

use crate::{
    photo::SideEffect,
    types::{DecisionSeq, PhotoId, Status},
};

/// One committed triage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub seq: DecisionSeq,
    pub photo: PhotoId,
    pub previous_status: Status,
    pub new_status: Status,
    /// The relocation performed when the decision was committed, if any.
    pub side_effect: Option<SideEffect>,
    /// Queue position before the decision, restored on undo.
    pub queue_key_before: u64,
    /// Queue position after the decision; differs from `queue_key_before` for skips.
    pub queue_key_after: u64,
    pub ts_ms: u64,
}

/// Append-only stack of triage decisions.
///
/// Undo always pops the highest sequence number. Sequence numbers are never
/// reused, even after a record has been popped.
#[derive(Debug, Default)]
pub struct DecisionLog {
    records: Vec<DecisionRecord>,
    next_seq: DecisionSeq,
}

impl DecisionLog {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(records: Vec<DecisionRecord>, next_seq: DecisionSeq) -> Self {
        let floor = records.last().map(|r| r.seq + 1).unwrap_or(1);
        Self {
            records,
            next_seq: next_seq.max(floor),
        }
    }

    pub(crate) fn export_parts(&self) -> (Vec<DecisionRecord>, DecisionSeq) {
        (self.records.clone(), self.next_seq)
    }

    pub fn take_next_seq(&mut self) -> DecisionSeq {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Pushes a committed record; its sequence must be above every record on the stack.
    pub fn push(&mut self, record: DecisionRecord) -> bool {
        if self.records.last().is_some_and(|top| top.seq >= record.seq) {
            return false;
        }
        self.next_seq = self.next_seq.max(record.seq + 1);
        self.records.push(record);
        true
    }

    pub fn peek(&self) -> Option<&DecisionRecord> {
        self.records.last()
    }

    pub fn pop(&mut self) -> Option<DecisionRecord> {
        self.records.pop()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DecisionRecord> + '_ {
        self.records.iter()
    }
}

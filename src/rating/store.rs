use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::{ComparisonSeq, ContentId, Outcome, PhotoId};

use super::trueskill::Rating;

/// A photo in the ranking pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedPhoto {
    pub content_id: ContentId,
    pub rating: Rating,
    /// Current file location, for display.
    pub location: PathBuf,
    /// Triage identity the photo entered ranking from.
    pub photo: Option<PhotoId>,
}

/// Rating beliefs keyed by content identity, in pool-entry order.
#[derive(Debug, Default)]
pub struct RatingStore {
    entries: HashMap<ContentId, RatedPhoto>,
    order: Vec<ContentId>,
    pos: HashMap<ContentId, usize>,
    by_photo: HashMap<PhotoId, ContentId>,
}

impl RatingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: Vec<RatedPhoto>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            store.insert(entry);
        }
        store
    }

    pub(crate) fn export_entries(&self) -> Vec<RatedPhoto> {
        self.iter().cloned().collect()
    }

    /// Adds a photo; returns false if the content identity is already rated.
    pub fn insert(&mut self, entry: RatedPhoto) -> bool {
        if self.entries.contains_key(&entry.content_id) {
            return false;
        }
        let id = entry.content_id.clone();
        if let Some(photo) = &entry.photo {
            self.by_photo.insert(photo.clone(), id.clone());
        }
        self.pos.insert(id.clone(), self.order.len());
        self.order.push(id.clone());
        self.entries.insert(id, entry);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<RatedPhoto> {
        let entry = self.entries.remove(id)?;
        if let Some(idx) = self.pos.remove(id) {
            self.order.remove(idx);
            for (i, later) in self.order.iter().enumerate().skip(idx) {
                self.pos.insert(later.clone(), i);
            }
        }
        if let Some(photo) = &entry.photo {
            if self.by_photo.get(photo).is_some_and(|c| c == id) {
                self.by_photo.remove(photo);
            }
        }
        Some(entry)
    }

    /// Refreshes where a rated photo lives without touching its rating.
    pub fn relocate(&mut self, id: &str, location: PathBuf, photo: Option<PhotoId>) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.location = location;
            if let Some(photo) = photo {
                self.by_photo.insert(photo.clone(), id.to_string());
                entry.photo = Some(photo);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&RatedPhoto> {
        self.entries.get(id)
    }

    pub fn rating(&self, id: &str) -> Option<Rating> {
        self.entries.get(id).map(|e| e.rating)
    }

    pub fn set_rating(&mut self, id: &str, rating: Rating) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.rating = rating;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn content_id_of(&self, photo: &Path) -> Option<&ContentId> {
        self.by_photo.get(photo)
    }

    /// Position in pool-entry order; used as the deterministic tie-breaker.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.pos.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ordered_ids(&self) -> &[ContentId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &RatedPhoto> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }
}

/// One ranking judgment plus the ratings it replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub seq: ComparisonSeq,
    pub left: ContentId,
    pub right: ContentId,
    pub outcome: Outcome,
    pub left_before: Rating,
    pub right_before: Rating,
    pub ts_ms: u64,
}

/// Stack of comparisons; undo restores the stored pre-update ratings.
#[derive(Debug, Default)]
pub struct ComparisonLog {
    records: Vec<ComparisonRecord>,
    next_seq: ComparisonSeq,
    decisive: u64,
}

impl ComparisonLog {
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            ..Self::default()
        }
    }

    /// Rebuilds the stack; `Err` carries the first record that is out of order.
    pub(crate) fn from_parts(records: Vec<ComparisonRecord>, next_seq: ComparisonSeq) -> Result<Self, ComparisonSeq> {
        let mut log = Self::new();
        for record in records {
            let seq = record.seq;
            if !log.push(record) {
                return Err(seq);
            }
        }
        log.next_seq = log.next_seq.max(next_seq);
        Ok(log)
    }

    pub(crate) fn export_parts(&self) -> (Vec<ComparisonRecord>, ComparisonSeq) {
        (self.records.clone(), self.next_seq)
    }

    pub fn take_next_seq(&mut self) -> ComparisonSeq {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// True if a record with `seq` may go on top of the stack.
    pub fn accepts(&self, seq: ComparisonSeq) -> bool {
        self.records.last().is_none_or(|top| top.seq < seq)
    }

    pub fn push(&mut self, record: ComparisonRecord) -> bool {
        if !self.accepts(record.seq) {
            return false;
        }
        if record.outcome.is_decisive() {
            self.decisive += 1;
        }
        self.next_seq = self.next_seq.max(record.seq + 1);
        self.records.push(record);
        true
    }

    pub fn peek(&self) -> Option<&ComparisonRecord> {
        self.records.last()
    }

    pub fn pop(&mut self) -> Option<ComparisonRecord> {
        let record = self.records.pop()?;
        if record.outcome.is_decisive() {
            self.decisive -= 1;
        }
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Comparisons that updated ratings.
    pub fn decisive_count(&self) -> u64 {
        self.decisive
    }

    pub fn skipped_count(&self) -> u64 {
        self.records.len() as u64 - self.decisive
    }
}

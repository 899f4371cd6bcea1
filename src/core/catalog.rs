use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    photo::{Photo, PhotoDraft},
    types::{PhotoId, Status},
};

use super::indices::FolderIndex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("{id:?} is already registered from {existing_folder:?}")]
    DuplicateIdentity {
        id: PhotoId,
        existing_folder: PathBuf,
    },
    #[error("no photo registered at {0:?}")]
    MissingPhoto(PhotoId),
}

/// Outcome of [`PhotoCatalog::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First time this identity was seen.
    Added,
    /// Same identity from the same folder; nothing changed.
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
}

impl StatusCounts {
    /// Photos that have had any decision applied.
    pub fn processed(&self) -> usize {
        self.accepted + self.rejected + self.skipped
    }

    fn bump(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Pending => self.pending += 1,
            Status::Accepted => self.accepted += 1,
            Status::Rejected => self.rejected += 1,
            Status::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub folder: PathBuf,
    pub photo_count: usize,
    pub decided_count: usize,
    pub retired: bool,
}

/// Registry of discovered photos and their triage status.
///
/// Discovery order is kept in `order` and never changes. The triage queue is
/// a separate ordering keyed by `Photo::queue_key`, so skipping a photo can
/// push it to the back without disturbing listings.
#[derive(Debug, Default)]
pub struct PhotoCatalog {
    photos: HashMap<PhotoId, Photo>,
    order: Vec<PhotoId>,
    by_folder: FolderIndex,
    queue: BTreeMap<u64, PhotoId>,
    retired: HashSet<PathBuf>,
    next_queue_key: u64,
}

impl PhotoCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn export_parts(&self) -> (Vec<Photo>, Vec<PathBuf>) {
        let photos = self
            .order
            .iter()
            .filter_map(|id| self.photos.get(id).cloned())
            .collect();
        let mut retired: Vec<PathBuf> = self.retired.iter().cloned().collect();
        retired.sort();
        (photos, retired)
    }

    /// Adds a photo in `Pending` status.
    pub fn register(&mut self, draft: PhotoDraft) -> Result<Registration, CatalogError> {
        if let Some(existing) = self.photos.get(&draft.id) {
            if existing.source_folder == draft.source_folder {
                return Ok(Registration::AlreadyPresent);
            }
            return Err(CatalogError::DuplicateIdentity {
                id: draft.id,
                existing_folder: existing.source_folder.clone(),
            });
        }

        let photo = Photo {
            location: draft.id.clone(),
            id: draft.id,
            source_folder: draft.source_folder,
            filename: draft.filename,
            status: Status::Pending,
            discovered: self.order.len() as u64,
            queue_key: self.next_queue_key,
        };
        self.insert_photo(photo);
        Ok(Registration::Added)
    }

    /// Re-inserts a fully materialized photo, as read back from the journal.
    pub(crate) fn restore(&mut self, photo: Photo) -> Result<(), CatalogError> {
        if let Some(existing) = self.photos.get(&photo.id) {
            return Err(CatalogError::DuplicateIdentity {
                id: photo.id,
                existing_folder: existing.source_folder.clone(),
            });
        }
        self.insert_photo(photo);
        Ok(())
    }

    /// Sets the status and returns the previous one.
    ///
    /// Queue membership follows the status: accepted and rejected photos
    /// leave the queue, pending and skipped photos stay at their current key.
    pub fn set_status(&mut self, id: &Path, status: Status) -> Result<Status, CatalogError> {
        let photo = self
            .photos
            .get_mut(id)
            .ok_or_else(|| CatalogError::MissingPhoto(id.to_path_buf()))?;
        let previous = photo.status;
        photo.status = status;

        if status.is_queued() {
            self.queue.insert(photo.queue_key, photo.id.clone());
        } else {
            self.queue.remove(&photo.queue_key);
        }
        Ok(previous)
    }

    /// Moves a queued photo to the back of the queue; returns its old key.
    pub fn send_to_back(&mut self, id: &Path) -> Result<u64, CatalogError> {
        let new_key = self.take_queue_key();
        self.set_queue_key(id, new_key)
    }

    /// Puts a photo back at a previously held queue position; returns the key it had.
    pub fn set_queue_key(&mut self, id: &Path, key: u64) -> Result<u64, CatalogError> {
        let photo = self
            .photos
            .get_mut(id)
            .ok_or_else(|| CatalogError::MissingPhoto(id.to_path_buf()))?;
        let previous = photo.queue_key;
        if self.queue.get(&previous) == Some(&photo.id) {
            self.queue.remove(&previous);
        }
        photo.queue_key = key;
        if photo.status.is_queued() {
            self.queue.insert(key, photo.id.clone());
        }
        self.next_queue_key = self.next_queue_key.max(key.saturating_add(1));
        Ok(previous)
    }

    pub fn set_location(&mut self, id: &Path, location: PathBuf) -> Result<PathBuf, CatalogError> {
        let photo = self
            .photos
            .get_mut(id)
            .ok_or_else(|| CatalogError::MissingPhoto(id.to_path_buf()))?;
        Ok(std::mem::replace(&mut photo.location, location))
    }

    pub fn get(&self, id: &Path) -> Option<&Photo> {
        self.photos.get(id)
    }

    pub fn contains(&self, id: &Path) -> bool {
        self.photos.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ordered_ids(&self) -> &[PhotoId] {
        &self.order
    }

    /// Photos with `status`, in discovery order, excluding retired folders.
    ///
    /// The iterator is `Clone`, so callers can restart it cheaply.
    pub fn list_by_status(&self, status: Status) -> impl Iterator<Item = &Photo> + Clone + '_ {
        self.order
            .iter()
            .filter_map(|id| self.photos.get(id))
            .filter(move |p| p.status == status && !self.retired.contains(&p.source_folder))
    }

    /// Queued photos (pending or skipped) front to back.
    pub fn queue(&self) -> impl Iterator<Item = &Photo> + Clone + '_ {
        self.queue
            .values()
            .filter_map(|id| self.photos.get(id))
            .filter(|p| !self.retired.contains(&p.source_folder))
    }

    pub fn queue_head(&self) -> Option<&Photo> {
        self.queue().next()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for photo in self.photos.values() {
            if !self.retired.contains(&photo.source_folder) {
                counts.bump(photo.status);
            }
        }
        counts
    }

    /// Hides a source folder from the queue, listings and counts.
    ///
    /// Returns how many photos were hidden; retiring twice is a no-op.
    pub fn retire_folder(&mut self, folder: &Path) -> usize {
        if !self.retired.insert(folder.to_path_buf()) {
            return 0;
        }
        self.by_folder.get(folder).map(Vec::len).unwrap_or(0)
    }

    pub fn is_retired(&self, folder: &Path) -> bool {
        self.retired.contains(folder)
    }

    pub fn folder_summaries(&self) -> Vec<FolderSummary> {
        let mut out: Vec<FolderSummary> = self
            .by_folder
            .iter()
            .map(|(folder, ids)| FolderSummary {
                folder: folder.clone(),
                photo_count: ids.len(),
                decided_count: ids
                    .iter()
                    .filter_map(|id| self.photos.get(id))
                    .filter(|p| p.status != Status::Pending)
                    .count(),
                retired: self.retired.contains(folder),
            })
            .collect();
        out.sort_by(|a, b| a.folder.cmp(&b.folder));
        out
    }

    fn insert_photo(&mut self, photo: Photo) {
        let id = photo.id.clone();
        self.by_folder
            .entry(photo.source_folder.clone())
            .or_default()
            .push(id.clone());
        if photo.status.is_queued() {
            self.queue.insert(photo.queue_key, id.clone());
        }
        self.next_queue_key = self.next_queue_key.max(photo.queue_key.saturating_add(1));
        self.order.push(id.clone());
        self.photos.insert(id, photo);
    }

    fn take_queue_key(&mut self) -> u64 {
        let key = self.next_queue_key;
        self.next_queue_key += 1;
        key
    }
}

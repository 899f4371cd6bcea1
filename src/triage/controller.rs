use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    core::{
        catalog::{CatalogError, PhotoCatalog, Registration, StatusCounts},
        decisions::{DecisionLog, DecisionRecord},
    },
    fs::{FileMover, MoveError},
    photo::{Photo, PhotoDraft, SideEffect},
    types::{Action, DecisionSeq, PhotoId, Status},
};

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("cannot {action} {id:?}: photo is {status}")]
    InvalidTransition {
        id: PhotoId,
        status: Status,
        action: Action,
    },
    #[error("no photo registered at {0:?}")]
    UnknownPhoto(PhotoId),
    #[error("could not {action} {id:?}: {source}")]
    Move {
        id: PhotoId,
        action: Action,
        #[source]
        source: MoveError,
    },
    #[error("undo of {id:?} failed, nothing changed: {source}")]
    UndoFailed {
        id: PhotoId,
        #[source]
        source: MoveError,
    },
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("decision #{expected} is no longer the latest")]
    OutOfOrder { expected: DecisionSeq },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl TriageError {
    /// Errors the caller should show as a message, not a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, TriageError::NothingToUndo)
    }
}

/// Folders accepted and rejected photos are moved into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destinations {
    pub accepted: PathBuf,
    pub rejected: PathBuf,
}

impl Destinations {
    pub fn new(accepted: impl Into<PathBuf>, rejected: impl Into<PathBuf>) -> Self {
        Self {
            accepted: accepted.into(),
            rejected: rejected.into(),
        }
    }

    /// Target folder for `action`; skips stay in place.
    pub fn dir_for(&self, action: Action) -> Option<&Path> {
        match action {
            Action::Accept => Some(&self.accepted),
            Action::Reject => Some(&self.rejected),
            Action::Skip => None,
        }
    }
}

/// A validated decision whose file move has not happened yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPlan {
    pub photo: PhotoId,
    pub action: Action,
    /// Current location of the file.
    pub from: PathBuf,
    pub filename: String,
    pub destination_dir: Option<PathBuf>,
}

impl DecisionPlan {
    /// Runs the move, if the action needs one. Touches no triage state.
    pub fn perform(&self, mover: &dyn FileMover) -> Result<Option<SideEffect>, TriageError> {
        let Some(dir) = &self.destination_dir else {
            return Ok(None);
        };

        let to = mover.resolve_destination(dir, &self.filename);
        mover.move_file(&self.from, &to).map_err(|source| {
            warn!(photo = ?self.photo, action = %self.action, error = %source, "move failed");
            TriageError::Move {
                id: self.photo.clone(),
                action: self.action,
                source,
            }
        })?;

        Ok(Some(SideEffect {
            from: self.from.clone(),
            to,
        }))
    }
}

/// The latest decision, ready to be reversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoPlan {
    pub seq: DecisionSeq,
    pub photo: PhotoId,
    pub side_effect: Option<SideEffect>,
}

impl UndoPlan {
    /// Moves the file back where it came from, if the decision moved it.
    pub fn perform(&self, mover: &dyn FileMover) -> Result<(), TriageError> {
        let Some(effect) = &self.side_effect else {
            return Ok(());
        };
        mover.move_file(&effect.to, &effect.from).map_err(|source| {
            warn!(photo = ?self.photo, error = %source, "reverse move failed");
            TriageError::UndoFailed {
                id: self.photo.clone(),
                source,
            }
        })
    }
}

/// Result of [`TriageController::present_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presented {
    pub photo: Photo,
    /// The photo came back from `Skipped` and is `Pending` again.
    pub requeued: bool,
}

/// Orchestrates triage over the catalog and the decision stack.
#[derive(Debug)]
pub struct TriageController {
    catalog: PhotoCatalog,
    log: DecisionLog,
    destinations: Destinations,
}

impl TriageController {
    pub fn new(destinations: Destinations) -> Self {
        Self {
            catalog: PhotoCatalog::new(),
            log: DecisionLog::new(),
            destinations,
        }
    }

    pub(crate) fn from_parts(catalog: PhotoCatalog, log: DecisionLog, destinations: Destinations) -> Self {
        Self {
            catalog,
            log,
            destinations,
        }
    }

    pub fn catalog(&self) -> &PhotoCatalog {
        &self.catalog
    }

    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    pub fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    pub fn set_destinations(&mut self, destinations: Destinations) {
        self.destinations = destinations;
    }

    /// Registers a scanned photo; rescans of known photos are no-ops.
    pub fn register(&mut self, draft: PhotoDraft) -> Result<Registration, TriageError> {
        Ok(self.catalog.register(draft)?)
    }

    /// Head of the triage queue, without re-presenting it.
    pub fn current(&self) -> Option<&Photo> {
        self.catalog.queue_head()
    }

    /// Returns the photo to show next, or `None` when triage is done.
    ///
    /// A skipped photo that reaches the head of the queue becomes `Pending`
    /// again so it can be decided.
    pub fn present_next(&mut self) -> Result<Option<Presented>, TriageError> {
        let Some(head) = self.catalog.queue_head() else {
            return Ok(None);
        };
        let id = head.id.clone();

        let requeued = head.status == Status::Skipped;
        if requeued {
            self.catalog.set_status(&id, Status::Pending)?;
            debug!(photo = ?id, "skipped photo re-presented");
        }

        let photo = self
            .catalog
            .get(&id)
            .cloned()
            .ok_or(TriageError::UnknownPhoto(id))?;
        Ok(Some(Presented { photo, requeued }))
    }

    /// Validates `action` on `id` and works out where the file should go.
    pub fn plan_decision(&self, id: &Path, action: Action) -> Result<DecisionPlan, TriageError> {
        let photo = self
            .catalog
            .get(id)
            .ok_or_else(|| TriageError::UnknownPhoto(id.to_path_buf()))?;
        if photo.status != Status::Pending {
            return Err(TriageError::InvalidTransition {
                id: id.to_path_buf(),
                status: photo.status,
                action,
            });
        }

        Ok(DecisionPlan {
            photo: photo.id.clone(),
            action,
            from: photo.location.clone(),
            filename: photo.filename.clone(),
            destination_dir: self.destinations.dir_for(action).map(Path::to_path_buf),
        })
    }

    /// Records a decision whose move (if any) has already happened.
    pub fn commit_decision(
        &mut self,
        plan: &DecisionPlan,
        side_effect: Option<SideEffect>,
    ) -> Result<DecisionRecord, TriageError> {
        let photo = self
            .catalog
            .get(&plan.photo)
            .ok_or_else(|| TriageError::UnknownPhoto(plan.photo.clone()))?;
        if photo.status != Status::Pending {
            return Err(TriageError::InvalidTransition {
                id: plan.photo.clone(),
                status: photo.status,
                action: plan.action,
            });
        }

        let new_status = plan.action.target_status();
        let previous_status = self.catalog.set_status(&plan.photo, new_status)?;
        let queue_key_before = if plan.action == Action::Skip {
            self.catalog.send_to_back(&plan.photo)?
        } else {
            photo_queue_key(&self.catalog, &plan.photo)?
        };
        let queue_key_after = photo_queue_key(&self.catalog, &plan.photo)?;
        if let Some(effect) = &side_effect {
            self.catalog.set_location(&plan.photo, effect.to.clone())?;
        }

        let record = DecisionRecord {
            seq: self.log.take_next_seq(),
            photo: plan.photo.clone(),
            previous_status,
            new_status,
            side_effect,
            queue_key_before,
            queue_key_after,
            ts_ms: crate::session::now_ms(),
        };
        self.log.push(record.clone());

        debug!(seq = record.seq, photo = ?record.photo, status = %new_status, "decision committed");
        Ok(record)
    }

    /// Plans, moves and commits in one call.
    ///
    /// If the move fails nothing is committed and the photo stays `Pending`.
    pub fn decide(
        &mut self,
        mover: &dyn FileMover,
        id: &Path,
        action: Action,
    ) -> Result<DecisionRecord, TriageError> {
        let plan = self.plan_decision(id, action)?;
        let side_effect = plan.perform(mover)?;
        self.commit_decision(&plan, side_effect)
    }

    pub fn plan_undo(&self) -> Result<UndoPlan, TriageError> {
        let top = self.log.peek().ok_or(TriageError::NothingToUndo)?;
        Ok(UndoPlan {
            seq: top.seq,
            photo: top.photo.clone(),
            side_effect: top.side_effect.clone(),
        })
    }

    /// Pops the planned record and restores status, location and queue position.
    pub fn commit_undo(&mut self, plan: &UndoPlan) -> Result<DecisionRecord, TriageError> {
        match self.log.peek() {
            Some(top) if top.seq == plan.seq => {}
            Some(_) => return Err(TriageError::OutOfOrder { expected: plan.seq }),
            None => return Err(TriageError::NothingToUndo),
        }
        if !self.catalog.contains(&plan.photo) {
            return Err(TriageError::UnknownPhoto(plan.photo.clone()));
        }

        let record = self.log.pop().ok_or(TriageError::NothingToUndo)?;
        self.revert(&record)?;

        debug!(seq = record.seq, photo = ?record.photo, status = %record.previous_status, "decision undone");
        Ok(record)
    }

    /// Reverts the latest decision, moving its file back first.
    ///
    /// A failed reverse move leaves both the catalog and the log untouched.
    pub fn undo(&mut self, mover: &dyn FileMover) -> Result<DecisionRecord, TriageError> {
        let plan = self.plan_undo()?;
        plan.perform(mover)?;
        self.commit_undo(&plan)
    }

    pub fn stats(&self) -> StatusCounts {
        self.catalog.counts()
    }

    pub fn retire_folder(&mut self, folder: &Path) -> usize {
        let hidden = self.catalog.retire_folder(folder);
        debug!(?folder, hidden, "source folder retired");
        hidden
    }

    /// Accepted photos and where their files are now, in discovery order.
    pub fn accepted_locations(&self) -> Vec<(PhotoId, PathBuf)> {
        self.catalog
            .list_by_status(Status::Accepted)
            .map(|p| (p.id.clone(), p.location.clone()))
            .collect()
    }

    pub(crate) fn replay_registered(&mut self, photo: Photo) -> Result<(), TriageError> {
        Ok(self.catalog.restore(photo)?)
    }

    pub(crate) fn replay_decided(&mut self, record: DecisionRecord) -> Result<(), TriageError> {
        self.catalog.set_status(&record.photo, record.new_status)?;
        self.catalog
            .set_queue_key(&record.photo, record.queue_key_after)?;
        if let Some(effect) = &record.side_effect {
            self.catalog.set_location(&record.photo, effect.to.clone())?;
        }
        if !self.log.push(record) {
            return Err(TriageError::OutOfOrder {
                expected: self.log.peek().map(|r| r.seq).unwrap_or(0),
            });
        }
        Ok(())
    }

    pub(crate) fn replay_undone(&mut self, seq: DecisionSeq) -> Result<(), TriageError> {
        match self.log.peek() {
            Some(top) if top.seq == seq => {}
            _ => return Err(TriageError::OutOfOrder { expected: seq }),
        }
        if let Some(record) = self.log.pop() {
            self.revert(&record)?;
        }
        Ok(())
    }

    pub(crate) fn replay_requeued(&mut self, id: &Path) -> Result<(), TriageError> {
        self.catalog.set_status(id, Status::Pending)?;
        Ok(())
    }

    pub(crate) fn replay_retired(&mut self, folder: &Path) {
        self.catalog.retire_folder(folder);
    }

    fn revert(&mut self, record: &DecisionRecord) -> Result<(), TriageError> {
        self.catalog
            .set_status(&record.photo, record.previous_status)?;
        self.catalog
            .set_queue_key(&record.photo, record.queue_key_before)?;
        if let Some(effect) = &record.side_effect {
            self.catalog
                .set_location(&record.photo, effect.from.clone())?;
        }
        Ok(())
    }
}

fn photo_queue_key(catalog: &PhotoCatalog, id: &Path) -> Result<u64, CatalogError> {
    catalog
        .get(id)
        .map(|p| p.queue_key)
        .ok_or_else(|| CatalogError::MissingPhoto(id.to_path_buf()))
}

use std::{
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use hashbrown::HashSet;
use tempfile::TempDir;

use shortlist::{
    core::catalog::{CatalogError, Registration},
    fs::{FileMover, FsMover, MoveError},
    photo::PhotoDraft,
    triage::{Destinations, TriageController, TriageError},
    types::{Action, Status},
};

/// In-memory filesystem: a set of paths that exist.
#[derive(Default)]
struct MemFs {
    files: Mutex<HashSet<PathBuf>>,
    broken: Mutex<HashSet<PathBuf>>,
}

impl MemFs {
    fn with(paths: &[&str]) -> Self {
        let fs = Self::default();
        for p in paths {
            fs.files.lock().unwrap().insert(PathBuf::from(p));
        }
        fs
    }

    fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains(Path::new(path))
    }

    fn break_path(&self, path: &str) {
        self.broken.lock().unwrap().insert(PathBuf::from(path));
    }

    fn heal(&self) {
        self.broken.lock().unwrap().clear();
    }
}

impl FileMover for MemFs {
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), MoveError> {
        if self.broken.lock().unwrap().contains(from) {
            return Err(MoveError::Io {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source: io::Error::other("injected failure"),
            });
        }
        let mut files = self.files.lock().unwrap();
        if !files.contains(from) {
            return Err(MoveError::SourceMissing(from.to_path_buf()));
        }
        if files.contains(to) {
            return Err(MoveError::DestinationExists(to.to_path_buf()));
        }
        files.remove(from);
        files.insert(to.to_path_buf());
        Ok(())
    }
}

fn controller(paths: &[&str]) -> TriageController {
    let mut triage = TriageController::new(Destinations::new("/keep", "/discard"));
    for p in paths {
        triage
            .register(PhotoDraft::from_path(*p, "/photos"))
            .unwrap();
    }
    triage
}

fn status(triage: &TriageController, path: &str) -> Status {
    triage.catalog().get(Path::new(path)).unwrap().status
}

#[test]
fn accept_then_undo_restores_status_and_file() {
    let fs = MemFs::with(&["/photos/p.jpg"]);
    let mut triage = controller(&["/photos/p.jpg"]);

    let record = triage
        .decide(&fs, Path::new("/photos/p.jpg"), Action::Accept)
        .unwrap();
    assert_eq!(record.previous_status, Status::Pending);
    assert_eq!(record.new_status, Status::Accepted);
    assert!(fs.exists("/keep/p.jpg"));
    assert!(!fs.exists("/photos/p.jpg"));
    assert_eq!(
        triage.catalog().get(Path::new("/photos/p.jpg")).unwrap().location,
        PathBuf::from("/keep/p.jpg")
    );

    triage.undo(&fs).unwrap();
    assert_eq!(status(&triage, "/photos/p.jpg"), Status::Pending);
    assert!(fs.exists("/photos/p.jpg"));
    assert!(!fs.exists("/keep/p.jpg"));

    let err = triage.undo(&fs).unwrap_err();
    assert!(matches!(err, TriageError::NothingToUndo));
    assert!(err.is_benign());
}

#[test]
fn undo_on_empty_log_changes_nothing() {
    let fs = MemFs::with(&["/photos/a.jpg"]);
    let mut triage = controller(&["/photos/a.jpg"]);
    let before = triage.catalog().get(Path::new("/photos/a.jpg")).cloned();

    assert!(matches!(triage.undo(&fs), Err(TriageError::NothingToUndo)));
    assert_eq!(triage.catalog().get(Path::new("/photos/a.jpg")).cloned(), before);
    assert!(triage.log().is_empty());
}

#[test]
fn failed_move_leaves_photo_pending() {
    let fs = MemFs::with(&["/photos/a.jpg"]);
    fs.break_path("/photos/a.jpg");
    let mut triage = controller(&["/photos/a.jpg"]);

    let err = triage
        .decide(&fs, Path::new("/photos/a.jpg"), Action::Reject)
        .unwrap_err();
    assert!(matches!(err, TriageError::Move { action: Action::Reject, .. }));
    assert_eq!(status(&triage, "/photos/a.jpg"), Status::Pending);
    assert!(triage.log().is_empty());

    // Retrying after the fault clears is safe.
    fs.heal();
    triage
        .decide(&fs, Path::new("/photos/a.jpg"), Action::Reject)
        .unwrap();
    assert!(fs.exists("/discard/a.jpg"));
}

#[test]
fn failed_reverse_move_is_atomic() {
    let fs = MemFs::with(&["/photos/a.jpg"]);
    let mut triage = controller(&["/photos/a.jpg"]);
    triage
        .decide(&fs, Path::new("/photos/a.jpg"), Action::Accept)
        .unwrap();

    fs.break_path("/keep/a.jpg");
    let err = triage.undo(&fs).unwrap_err();
    assert!(matches!(err, TriageError::UndoFailed { .. }));
    assert_eq!(status(&triage, "/photos/a.jpg"), Status::Accepted);
    assert_eq!(triage.log().len(), 1);
    assert!(fs.exists("/keep/a.jpg"));

    fs.heal();
    triage.undo(&fs).unwrap();
    assert_eq!(status(&triage, "/photos/a.jpg"), Status::Pending);
}

#[test]
fn undo_fails_when_original_path_is_taken() {
    let fs = MemFs::with(&["/photos/a.jpg"]);
    let mut triage = controller(&["/photos/a.jpg"]);
    triage
        .decide(&fs, Path::new("/photos/a.jpg"), Action::Accept)
        .unwrap();
    fs.files.lock().unwrap().insert(PathBuf::from("/photos/a.jpg"));

    let err = triage.undo(&fs).unwrap_err();
    match err {
        TriageError::UndoFailed { source, .. } => {
            assert!(matches!(source, MoveError::DestinationExists(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(status(&triage, "/photos/a.jpg"), Status::Accepted);
}

#[test]
fn deciding_a_decided_photo_is_an_invalid_transition() {
    let fs = MemFs::with(&["/photos/a.jpg"]);
    let mut triage = controller(&["/photos/a.jpg"]);
    triage
        .decide(&fs, Path::new("/photos/a.jpg"), Action::Accept)
        .unwrap();

    let err = triage
        .decide(&fs, Path::new("/photos/a.jpg"), Action::Reject)
        .unwrap_err();
    assert!(matches!(
        err,
        TriageError::InvalidTransition {
            status: Status::Accepted,
            action: Action::Reject,
            ..
        }
    ));
    assert!(matches!(
        triage.decide(&fs, Path::new("/photos/missing.jpg"), Action::Skip),
        Err(TriageError::UnknownPhoto(_))
    ));
}

#[test]
fn multi_step_undo_walks_back_in_order() {
    let fs = MemFs::with(&["/photos/a.jpg", "/photos/b.jpg", "/photos/c.jpg"]);
    let mut triage = controller(&["/photos/a.jpg", "/photos/b.jpg", "/photos/c.jpg"]);

    triage.decide(&fs, Path::new("/photos/a.jpg"), Action::Accept).unwrap();
    triage.decide(&fs, Path::new("/photos/b.jpg"), Action::Reject).unwrap();
    triage.decide(&fs, Path::new("/photos/c.jpg"), Action::Skip).unwrap();

    let undone: Vec<PathBuf> = (0..3).map(|_| triage.undo(&fs).unwrap().photo).collect();
    assert_eq!(
        undone,
        vec![
            PathBuf::from("/photos/c.jpg"),
            PathBuf::from("/photos/b.jpg"),
            PathBuf::from("/photos/a.jpg"),
        ]
    );
    for p in ["/photos/a.jpg", "/photos/b.jpg", "/photos/c.jpg"] {
        assert_eq!(status(&triage, p), Status::Pending);
        assert!(fs.exists(p));
    }
}

#[test]
fn skip_goes_to_the_back_and_comes_back_pending() {
    let fs = MemFs::with(&["/photos/a.jpg", "/photos/b.jpg"]);
    let mut triage = controller(&["/photos/a.jpg", "/photos/b.jpg"]);

    let first = triage.present_next().unwrap().unwrap();
    assert_eq!(first.photo.id, PathBuf::from("/photos/a.jpg"));
    triage.decide(&fs, Path::new("/photos/a.jpg"), Action::Skip).unwrap();
    assert!(fs.exists("/photos/a.jpg"));

    let next = triage.present_next().unwrap().unwrap();
    assert_eq!(next.photo.id, PathBuf::from("/photos/b.jpg"));
    assert!(!next.requeued);
    triage.decide(&fs, Path::new("/photos/b.jpg"), Action::Accept).unwrap();

    let again = triage.present_next().unwrap().unwrap();
    assert_eq!(again.photo.id, PathBuf::from("/photos/a.jpg"));
    assert!(again.requeued);
    assert_eq!(status(&triage, "/photos/a.jpg"), Status::Pending);

    triage.decide(&fs, Path::new("/photos/a.jpg"), Action::Reject).unwrap();
    assert!(triage.present_next().unwrap().is_none());
}

#[test]
fn undoing_a_skip_restores_queue_position() {
    let fs = MemFs::with(&["/photos/a.jpg", "/photos/b.jpg"]);
    let mut triage = controller(&["/photos/a.jpg", "/photos/b.jpg"]);

    triage.decide(&fs, Path::new("/photos/a.jpg"), Action::Skip).unwrap();
    assert_eq!(triage.current().unwrap().id, PathBuf::from("/photos/b.jpg"));

    triage.undo(&fs).unwrap();
    assert_eq!(triage.current().unwrap().id, PathBuf::from("/photos/a.jpg"));
    assert_eq!(status(&triage, "/photos/a.jpg"), Status::Pending);
}

#[test]
fn registration_is_idempotent_per_folder() {
    let mut triage = controller(&["/photos/a.jpg"]);
    assert_eq!(
        triage
            .register(PhotoDraft::from_path("/photos/a.jpg", "/photos"))
            .unwrap(),
        Registration::AlreadyPresent
    );
    assert_eq!(triage.catalog().len(), 1);

    let err = triage
        .register(PhotoDraft::from_path("/photos/a.jpg", "/elsewhere"))
        .unwrap_err();
    assert!(matches!(
        err,
        TriageError::Catalog(CatalogError::DuplicateIdentity { .. })
    ));
}

#[test]
fn retired_folders_leave_queue_and_counts() {
    let mut triage = TriageController::new(Destinations::new("/keep", "/discard"));
    triage.register(PhotoDraft::from_path("/a/1.jpg", "/a")).unwrap();
    triage.register(PhotoDraft::from_path("/b/1.jpg", "/b")).unwrap();
    triage.register(PhotoDraft::from_path("/a/2.jpg", "/a")).unwrap();
    assert_eq!(triage.stats().pending, 3);

    assert_eq!(triage.retire_folder(Path::new("/a")), 2);
    assert_eq!(triage.stats().pending, 1);
    assert_eq!(triage.stats().total, 1);
    assert_eq!(triage.current().unwrap().id, PathBuf::from("/b/1.jpg"));

    let summaries = triage.catalog().folder_summaries();
    assert_eq!(summaries.len(), 2);
    assert!(summaries[0].retired);
    assert_eq!(summaries[0].photo_count, 2);
}

#[test]
fn list_by_status_is_restartable_and_in_discovery_order() {
    let fs = MemFs::with(&["/photos/a.jpg", "/photos/b.jpg", "/photos/c.jpg"]);
    let mut triage = controller(&["/photos/a.jpg", "/photos/b.jpg", "/photos/c.jpg"]);
    triage.decide(&fs, Path::new("/photos/c.jpg"), Action::Accept).unwrap();
    triage.decide(&fs, Path::new("/photos/a.jpg"), Action::Accept).unwrap();

    let accepted = triage.catalog().list_by_status(Status::Accepted);
    let first: Vec<_> = accepted.clone().map(|p| p.filename.clone()).collect();
    let second: Vec<_> = accepted.map(|p| p.filename.clone()).collect();
    assert_eq!(first, vec!["a.jpg", "c.jpg"]);
    assert_eq!(first, second);
}

#[test]
fn real_files_round_trip_with_collision_free_names() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("in");
    let keep = tmp.path().join("keep");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::create_dir_all(&keep).unwrap();
    std::fs::write(source.join("shot.jpg"), b"new").unwrap();
    std::fs::write(keep.join("shot.jpg"), b"already here").unwrap();

    let mut triage = TriageController::new(Destinations::new(&keep, tmp.path().join("discard")));
    let id = source.join("shot.jpg");
    triage.register(PhotoDraft::from_path(&id, &source)).unwrap();

    let record = triage.decide(&FsMover, &id, Action::Accept).unwrap();
    let moved_to = record.side_effect.unwrap().to;
    assert_eq!(moved_to, keep.join("shot_1.jpg"));
    assert_eq!(std::fs::read(&moved_to).unwrap(), b"new");
    assert_eq!(std::fs::read(keep.join("shot.jpg")).unwrap(), b"already here");
    assert!(!id.exists());

    triage.undo(&FsMover).unwrap();
    assert_eq!(std::fs::read(&id).unwrap(), b"new");
    assert!(!moved_to.exists());
}

#[test]
fn reject_creates_missing_destination() {
    let tmp = TempDir::new().unwrap();
    let id = tmp.path().join("x.png");
    std::fs::write(&id, b"png").unwrap();
    let discard = tmp.path().join("nested").join("discard");

    let mut triage = TriageController::new(Destinations::new(tmp.path().join("keep"), &discard));
    triage.register(PhotoDraft::from_path(&id, tmp.path())).unwrap();
    triage.decide(&FsMover, &id, Action::Reject).unwrap();
    assert!(discard.join("x.png").exists());
}

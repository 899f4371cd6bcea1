//! Filesystem collaborators: moving files, hashing content and scanning folders.
//!
//! The core only talks to the [`FileMover`] and [`ContentHasher`] traits; the
//! concrete types here are the defaults the runtime wires in.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use thiserror::Error;

use crate::types::ContentId;

/// SHA-256 content hashing with a stat-keyed cache.
pub mod hash;
/// Rename-or-copy file mover.
pub mod mover;
/// Recursive image discovery.
pub mod scan;

pub use hash::{HashCache, HashOutcome, Sha256Hasher};
pub use mover::FsMover;
pub use scan::{SUPPORTED_EXTENSIONS, scan_folders};

/// Failure to relocate a file.
#[derive(Debug, Error)]
pub enum MoveError {
    /// Nothing exists at the source path.
    #[error("source file {0:?} does not exist")]
    SourceMissing(PathBuf),
    /// The destination is occupied; moves never overwrite.
    #[error("destination {0:?} already exists")]
    DestinationExists(PathBuf),
    /// Any other I/O failure.
    #[error("moving {from:?} to {to:?} failed: {source}")]
    Io {
        /// Source path.
        from: PathBuf,
        /// Destination path.
        to: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Performs the physical relocation of photo files.
pub trait FileMover: Send + Sync {
    /// Picks the destination path for `filename` inside `dir`.
    fn resolve_destination(&self, dir: &Path, filename: &str) -> PathBuf {
        dir.join(filename)
    }

    /// Moves `from` to `to`. Used both to commit and to reverse decisions.
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), MoveError>;
}

/// Derives a content identity from a file; equal bytes give equal identities.
pub trait ContentHasher: Send + Sync {
    /// Hashes the file at `path`.
    fn hash(&self, path: &Path) -> io::Result<ContentId>;
}

/// Coarse cancellation signal, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once [`CancelFlag::cancel`] has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

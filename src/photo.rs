//! Photo records as tracked by the triage catalog.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{PhotoId, Status};

/// Discovered photo plus its current disposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    /// Absolute path at discovery time.
    pub id: PhotoId,
    /// Source folder the scan found it under.
    pub source_folder: PathBuf,
    /// File name, used for destination naming and sorting.
    pub filename: String,
    /// Current triage status.
    pub status: Status,
    /// Where the file lives right now.
    pub location: PathBuf,
    /// Discovery index; stable sort key for listings.
    pub discovered: u64,
    /// Position in the triage queue; larger is further back.
    pub queue_key: u64,
}

/// One scanner result: `(identity, source_folder, filename)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoDraft {
    /// Absolute path of the discovered file.
    pub id: PhotoId,
    /// Folder the scan started from.
    pub source_folder: PathBuf,
    /// File name component of `id`.
    pub filename: String,
}

impl PhotoDraft {
    /// Builds a draft from an absolute file path and the folder it was found under.
    pub fn from_path(path: impl Into<PathBuf>, source_folder: impl Into<PathBuf>) -> Self {
        let id = path.into();
        let filename = file_name_of(&id);
        Self {
            id,
            source_folder: source_folder.into(),
            filename,
        }
    }
}

/// A file relocation that was actually performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffect {
    /// Where the file was before the move.
    pub from: PathBuf,
    /// Where the file is after the move.
    pub to: PathBuf,
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

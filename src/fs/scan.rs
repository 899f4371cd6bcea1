use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::photo::PhotoDraft;

/// Extensions (lowercase) treated as photos.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif",
    "heic", "heif", "avif", "jxl",
    "raw",
    "cr2", "cr3", "crw",
    "nef", "nrw",
    "arw", "srf", "sr2",
    "orf",
    "rw2",
    "raf",
    "pef", "ptx",
    "srw",
    "x3f",
    "dng",
    "3fr", "fff",
    "iiq",
    "rwl",
    "dcr", "kdc",
    "erf",
    "mrw",
    "bay",
    "ari",
];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Recursively scans `folders` and interleaves their photos round-robin.
///
/// Missing folders are skipped. Identities are absolute paths.
pub fn scan_folders(folders: &[PathBuf]) -> Vec<PhotoDraft> {
    let per_folder: Vec<Vec<PhotoDraft>> = folders.iter().map(|f| scan_one(f)).collect();

    let longest = per_folder.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(per_folder.iter().map(Vec::len).sum());
    for i in 0..longest {
        for drafts in &per_folder {
            if let Some(draft) = drafts.get(i) {
                out.push(draft.clone());
            }
        }
    }
    out
}

fn scan_one(folder: &Path) -> Vec<PhotoDraft> {
    let root = match std::path::absolute(folder) {
        Ok(root) => root,
        Err(err) => {
            warn!(?folder, error = %err, "cannot resolve source folder");
            return Vec::new();
        }
    };
    if !root.is_dir() {
        warn!(folder = ?root, "source folder does not exist");
        return Vec::new();
    }

    let mut drafts: Vec<PhotoDraft> = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
        .map(|entry| PhotoDraft::from_path(entry.into_path(), root.clone()))
        .collect();
    drafts.dedup_by(|a, b| a.id == b.id);

    debug!(folder = ?root, found = drafts.len(), "scanned source folder");
    drafts
}

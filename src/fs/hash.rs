use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    time::SystemTime,
};

use hashbrown::HashMap;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::types::ContentId;

use super::{CancelFlag, ContentHasher};

/// SHA-256 over the file bytes, or over a fixed-size prefix plus the file length.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher {
    /// Hash at most this many leading bytes; `None` hashes the whole file.
    pub prefix_bytes: Option<u64>,
}

impl ContentHasher for Sha256Hasher {
    fn hash(&self, path: &Path) -> io::Result<ContentId> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut reader: Box<dyn Read> = match self.prefix_bytes {
            Some(limit) => Box::new(file.take(limit)),
            None => Box::new(file),
        };

        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        if self.prefix_bytes.is_some() {
            hasher.update(len.to_le_bytes());
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl Stamp {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Remembers digests by path, invalidated when size or mtime change.
#[derive(Debug, Default)]
pub struct HashCache {
    entries: HashMap<PathBuf, (Stamp, ContentId)>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, path: &Path, stamp: &Stamp) -> Option<&ContentId> {
        self.entries
            .get(path)
            .filter(|(cached, _)| cached == stamp)
            .map(|(_, id)| id)
    }
}

/// Result of hashing a batch of files.
#[derive(Debug, Default)]
pub struct HashOutcome {
    /// Files hashed (or served from cache), in input order.
    pub hashed: Vec<(PathBuf, ContentId)>,
    /// Files that could not be read.
    pub failed: Vec<PathBuf>,
    /// True when the batch stopped early on cancellation.
    pub cancelled: bool,
}

/// Hashes `paths` one at a time, checking `cancel` before each file.
pub fn hash_all(
    hasher: &dyn ContentHasher,
    cache: &mut HashCache,
    paths: Vec<PathBuf>,
    cancel: &CancelFlag,
) -> HashOutcome {
    let mut out = HashOutcome::default();

    for path in paths {
        if cancel.is_cancelled() {
            out.cancelled = true;
            break;
        }

        let stamp = match Stamp::of(&path) {
            Ok(stamp) => stamp,
            Err(err) => {
                warn!(?path, error = %err, "cannot stat photo for hashing");
                out.failed.push(path);
                continue;
            }
        };

        if let Some(id) = cache.lookup(&path, &stamp) {
            out.hashed.push((path, id.clone()));
            continue;
        }

        match hasher.hash(&path) {
            Ok(id) => {
                cache.entries.insert(path.clone(), (stamp, id.clone()));
                out.hashed.push((path, id));
            }
            Err(err) => {
                warn!(?path, error = %err, "cannot hash photo");
                out.failed.push(path);
            }
        }
    }

    out
}

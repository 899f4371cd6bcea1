use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

use super::{FileMover, MoveError};

/// Moves files with `rename`, falling back to copy + remove across filesystems.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMover;

impl FileMover for FsMover {
    /// Appends `_1`, `_2`, ... to the stem until the name is free.
    fn resolve_destination(&self, dir: &Path, filename: &str) -> PathBuf {
        let candidate = dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }

        let stem = candidate
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = candidate
            .extension()
            .map(|s| s.to_string_lossy().into_owned());

        let mut counter = 1u32;
        loop {
            let name = match &ext {
                Some(ext) => format!("{stem}_{counter}.{ext}"),
                None => format!("{stem}_{counter}"),
            };
            let path = dir.join(name);
            if !path.exists() {
                return path;
            }
            counter += 1;
        }
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), MoveError> {
        if !from.exists() {
            return Err(MoveError::SourceMissing(from.to_path_buf()));
        }
        if to.exists() {
            return Err(MoveError::DestinationExists(to.to_path_buf()));
        }

        let io_err = |source| MoveError::Io {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        };

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        if let Err(rename_err) = fs::rename(from, to) {
            debug!(?from, ?to, error = %rename_err, "rename failed, copying instead");
            copy_then_remove(from, to, |from, to| fs::copy(from, to)).map_err(io_err)?;
        }
        Ok(())
    }
}

/// Copies `from` to `to`, then removes `from`.
///
/// On any failure `to` is removed again, so a retry never trips over a
/// partial file and exactly one copy survives.
fn copy_then_remove(
    from: &Path,
    to: &Path,
    copy: impl FnOnce(&Path, &Path) -> io::Result<u64>,
) -> io::Result<()> {
    if let Err(copy_err) = copy(from, to) {
        let _ = fs::remove_file(to);
        return Err(copy_err);
    }
    if let Err(remove_err) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(remove_err);
    }
    Ok(())
}

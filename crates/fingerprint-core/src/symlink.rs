//! Symlink chain resolution with cycle detection. A symlink's content is
//! always hashed by its link text (see
//! [`crate::hash::hash_symlink_target`]) — this resolver exists purely for
//! the traversal tier, which needs to know whether a symlink's chain
//! eventually lands on a directory outside the roots it's already walking
//! so it can dispatch a new traversal task for it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FingerprintError, Result};

/// Follow a chain of symlinks to its final, non-symlink target.
pub fn resolve_chain(start: &Path) -> Result<PathBuf> {
    let mut seen = HashSet::new();
    let mut current = start.to_path_buf();

    loop {
        let meta = fs::symlink_metadata(&current).map_err(|e| io_err(&current, e))?;
        if !meta.file_type().is_symlink() {
            return Ok(current);
        }
        if !seen.insert(current.clone()) {
            return Err(FingerprintError::SymlinkCycle(start.to_path_buf()));
        }
        let target = fs::read_link(&current).map_err(|e| io_err(&current, e))?;
        current = if target.is_absolute() {
            target
        } else {
            current
                .parent()
                .map(|p| p.join(&target))
                .unwrap_or(target)
        };
    }
}

fn io_err(path: &Path, source: std::io::Error) -> FingerprintError {
    FingerprintError::Io { path: path.to_path_buf(), source }
}

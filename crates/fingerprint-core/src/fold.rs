//! Folds per-file digests into one directory-level fingerprint. Paths sort
//! in reverse-lexicographic order before folding so the result is
//! deterministic regardless of traversal or scheduling order, and a
//! duplicate relative path (possible when multiple `--inputs` roots
//! overlap) is kept only once. The BLAKE3 hasher's own output is then
//! truncated to its low 8 bytes, interpreted as a little-endian u64 — the
//! fingerprint.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which path bytes, if any, get folded in alongside each file's digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintMode {
    /// Hash-only: no path bytes are mixed in, and broken symlinks (which
    /// have no stable content to hash) are excluded entirely.
    Default,
    /// Mix in each entry's absolute path; broken symlinks are included
    /// with a sentinel digest so their presence still affects the result.
    Absolute,
    /// Mix in each entry's path relative to its search root; broken
    /// symlinks are included with a sentinel digest.
    Relative,
}

#[derive(Debug, Clone)]
pub struct FileDigest {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub digest: Vec<u8>,
    pub broken_symlink: bool,
    pub size: u64,
    pub inode: u64,
    pub mtime_ns: u64,
    pub mode: u32,
}

pub fn fold(mut digests: Vec<FileDigest>, mode: FingerprintMode) -> u64 {
    digests.sort_by(|a, b| b.relative_path.cmp(&a.relative_path));
    digests.dedup_by(|a, b| a.relative_path == b.relative_path);

    let mut hasher = blake3::Hasher::new();
    for d in &digests {
        if mode == FingerprintMode::Default && d.broken_symlink {
            continue;
        }
        match mode {
            FingerprintMode::Default => {}
            FingerprintMode::Absolute => {
                hasher.update(d.absolute_path.to_string_lossy().as_bytes());
                hasher.update(&[0u8]);
            }
            FingerprintMode::Relative => {
                hasher.update(d.relative_path.to_string_lossy().as_bytes());
                hasher.update(&[0u8]);
            }
        }
        hasher.update(&d.digest);
    }
    let full = hasher.finalize();
    u64::from_le_bytes(full.as_bytes()[..8].try_into().expect("8 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(path: &str, byte: u8) -> FileDigest {
        FileDigest {
            relative_path: PathBuf::from(path),
            absolute_path: PathBuf::from("/root").join(path),
            digest: vec![byte; 4],
            broken_symlink: false,
            size: 4,
            inode: 1,
            mtime_ns: 0,
            mode: 0o644,
        }
    }

    fn broken(path: &str) -> FileDigest {
        FileDigest {
            relative_path: PathBuf::from(path),
            absolute_path: PathBuf::from("/root").join(path),
            digest: vec![0xFF; 8],
            broken_symlink: true,
            size: 0,
            inode: 0,
            mtime_ns: 0,
            mode: 0,
        }
    }

    #[test]
    fn fold_is_independent_of_input_order() {
        let a = fold(vec![digest("b", 1), digest("a", 2)], FingerprintMode::Relative);
        let b = fold(vec![digest("a", 2), digest("b", 1)], FingerprintMode::Relative);
        assert_eq!(a, b);
    }

    #[test]
    fn fold_deduplicates_by_relative_path() {
        let a = fold(vec![digest("x", 1)], FingerprintMode::Relative);
        let b = fold(vec![digest("x", 1), digest("x", 1)], FingerprintMode::Relative);
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_changes_the_fold() {
        let a = fold(vec![digest("x", 1)], FingerprintMode::Relative);
        let b = fold(vec![digest("x", 2)], FingerprintMode::Relative);
        assert_ne!(a, b);
    }

    #[test]
    fn default_mode_excludes_broken_symlinks_others_include_them() {
        let with_broken = vec![digest("x", 1), broken("y")];
        let without_broken = vec![digest("x", 1)];
        assert_eq!(fold(with_broken.clone(), FingerprintMode::Default), fold(without_broken, FingerprintMode::Default));
        assert_ne!(
            fold(with_broken.clone(), FingerprintMode::Relative),
            fold(vec![digest("x", 1)], FingerprintMode::Relative)
        );
    }

    #[test]
    fn absolute_and_relative_modes_differ_when_roots_differ() {
        let a = FileDigest {
            relative_path: PathBuf::from("x"),
            absolute_path: PathBuf::from("/root/a/x"),
            digest: vec![1; 4],
            broken_symlink: false,
            size: 4,
            inode: 1,
            mtime_ns: 0,
            mode: 0o644,
        };
        let b = FileDigest {
            relative_path: PathBuf::from("x"),
            absolute_path: PathBuf::from("/root/b/x"),
            digest: vec![1; 4],
            broken_symlink: false,
            size: 4,
            inode: 2,
            mtime_ns: 0,
            mode: 0o644,
        };
        assert_eq!(fold(vec![a.clone()], FingerprintMode::Relative), fold(vec![b.clone()], FingerprintMode::Relative));
        assert_ne!(fold(vec![a], FingerprintMode::Absolute), fold(vec![b], FingerprintMode::Absolute));
    }
}

//! Four-tier fingerprint pipeline: a traversal queue discovers entries
//! (dispatching newly-found external directories back into itself), a
//! CPU-core-bounded worker pool hashes each file or symlink concurrently
//! (the original motivation is that a single core's SIMD hash unit
//! saturates well before the disk does, so more than `num_cpus` hashing
//! threads buys nothing), and a final serial step folds the results
//! deterministically into one 64-bit fingerprint.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cache::{self, XattrMode};
use crate::error::{FingerprintError, Result};
use crate::fileinfo;
use crate::fold::{self, FileDigest, FingerprintMode};
use crate::hash::HashAlgorithm;
use crate::symlink;
use crate::traversal::{self, Entry, EntryType, TraversalOptions};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub algorithm: HashAlgorithm,
    pub xattr_mode: XattrMode,
    pub fingerprint_mode: FingerprintMode,
    pub max_concurrency: usize,
    pub traversal: TraversalOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            algorithm: HashAlgorithm::Blake3,
            xattr_mode: XattrMode::Off,
            fingerprint_mode: FingerprintMode::Relative,
            max_concurrency: 0,
            traversal: TraversalOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub algorithm: HashAlgorithm,
    pub digest: u64,
    pub files: Vec<FileDigest>,
}

impl Fingerprint {
    /// 16 lowercase hex chars — the canonical text form of the 64-bit
    /// fingerprint.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.digest)
    }
}

pub fn fingerprint_directory(root: &Path, options: &PipelineOptions) -> Result<Fingerprint> {
    let entries = traversal::walk(root, &options.traversal)?;
    let digests = hash_entries(entries, options)?;
    let root_digest = fold::fold(digests.clone(), options.fingerprint_mode);
    Ok(Fingerprint { algorithm: options.algorithm, digest: root_digest, files: digests })
}

/// Fingerprint an arbitrary set of paths together, folding into one
/// result. A directory contributes its whole tree, namespaced under its
/// own basename so two sibling roots can't collide; a file or symlink
/// contributes itself under its own basename.
pub fn fingerprint_paths(paths: &[PathBuf], options: &PipelineOptions) -> Result<Fingerprint> {
    let mut all_digests = Vec::new();

    for path in paths {
        let namespace = PathBuf::from(path.file_name().unwrap_or(path.as_os_str()));
        let meta = std::fs::symlink_metadata(path)
            .map_err(|e| crate::error::FingerprintError::Io { path: path.clone(), source: e })?;

        if meta.is_dir() {
            let entries = traversal::walk(path, &options.traversal)?;
            let digests = hash_entries(entries, options)?;
            all_digests.extend(digests.into_iter().map(|d| FileDigest {
                relative_path: namespace.join(&d.relative_path),
                ..d
            }));
        } else {
            let is_symlink = meta.file_type().is_symlink();
            let broken = is_symlink && symlink::resolve_chain(path).is_err();
            let entry = Entry {
                path: path.clone(),
                relative_path: namespace,
                file_type: if is_symlink { EntryType::Symlink } else { EntryType::File },
                broken_symlink: broken,
            };
            all_digests.push(hash_entry(&entry, options)?);
        }
    }

    let root_digest = fold::fold(all_digests.clone(), options.fingerprint_mode);
    Ok(Fingerprint { algorithm: options.algorithm, digest: root_digest, files: all_digests })
}

/// Run the CPU-core-bounded hashing tier over a flat list of entries,
/// each already carrying its relative path from traversal.
pub fn hash_entries(entries: Vec<Entry>, options: &PipelineOptions) -> Result<Vec<FileDigest>> {
    let worker_count = if options.max_concurrency == 0 {
        num_cpus::get().max(1)
    } else {
        options.max_concurrency
    };

    let (work_tx, work_rx) = crossbeam_channel::unbounded::<Entry>();
    for entry in entries {
        work_tx.send(entry).expect("receiver outlives senders within scope");
    }
    drop(work_tx);

    let results: Mutex<Vec<FileDigest>> = Mutex::new(Vec::new());
    let first_error: Mutex<Option<crate::error::FingerprintError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let work_rx = work_rx.clone();
            let results = &results;
            let first_error = &first_error;
            scope.spawn(move || {
                while let Ok(entry) = work_rx.recv() {
                    match hash_entry(&entry, options) {
                        Ok(digest) => results.lock().expect("poisoned").push(digest),
                        Err(e) => {
                            let mut slot = first_error.lock().expect("poisoned");
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                        }
                    }
                }
            });
        }
    });

    if let Some(e) = first_error.into_inner().expect("poisoned") {
        return Err(e);
    }
    Ok(results.into_inner().expect("poisoned"))
}

fn hash_entry(entry: &Entry, options: &PipelineOptions) -> Result<FileDigest> {
    let (digest, size, inode, mtime_ns, mode) = if entry.broken_symlink {
        (vec![0xFFu8; options.algorithm.digest_len()], 0, 0, 0, 0)
    } else {
        match entry.file_type {
            EntryType::Symlink => {
                let meta = std::fs::symlink_metadata(&entry.path)
                    .map_err(|e| FingerprintError::Io { path: entry.path.clone(), source: e })?;
                let target = std::fs::read_link(&entry.path)
                    .map_err(|e| FingerprintError::Io { path: entry.path.clone(), source: e })?;
                let digest = crate::hash::hash_symlink_target(&target, options.algorithm);
                (digest, meta.size(), meta.ino(), fileinfo::mtime_ns(&meta), meta.mode())
            }
            EntryType::File => {
                let meta = std::fs::metadata(&entry.path)
                    .map_err(|e| FingerprintError::Io { path: entry.path.clone(), source: e })?;
                let digest = cache::hash_file_cached(&entry.path, options.algorithm, options.xattr_mode)?;
                (digest, meta.size(), meta.ino(), fileinfo::mtime_ns(&meta), meta.mode())
            }
        }
    };
    Ok(FileDigest {
        relative_path: entry.relative_path.clone(),
        absolute_path: entry.path.clone(),
        digest,
        broken_symlink: entry.broken_symlink,
        size,
        inode,
        mtime_ns,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fingerprints_a_small_tree_deterministically() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();

        let options = PipelineOptions::default();
        let first = fingerprint_directory(dir.path(), &options).unwrap();
        let second = fingerprint_directory(dir.path(), &options).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.files.len(), 2);
        assert_eq!(first.to_hex().len(), 16);
    }

    #[test]
    fn changing_a_file_changes_the_fingerprint() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let options = PipelineOptions::default();
        let before = fingerprint_directory(dir.path(), &options).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"goodbye").unwrap();
        let after = fingerprint_directory(dir.path(), &options).unwrap();
        assert_ne!(before.digest, after.digest);
    }

    #[test]
    fn default_mode_fingerprint_is_unaffected_by_renaming_without_content_change() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let options = PipelineOptions { fingerprint_mode: FingerprintMode::Default, ..PipelineOptions::default() };
        let before = fingerprint_directory(dir.path(), &options).unwrap();
        std::fs::rename(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
        let after = fingerprint_directory(dir.path(), &options).unwrap();
        assert_eq!(before.digest, after.digest);
    }
}

//! Directory traversal: physical (never follows a symlinked directory into
//! its own recursion) and single-device (never crosses into a different
//! filesystem than the root it started from), mirroring
//! `FTS_PHYSICAL | FTS_XDEV`. A symlink is always collected as a hashable
//! entry (it is hashed by its link text, never by following it), but when
//! its chain resolves to a directory that lies outside every root walked
//! so far, that directory is dispatched back into this same traversal
//! queue as a brand-new task with its own device boundary — this is how an
//! externally-linked-in directory's contents still end up in the result.
//! Only files and symlinks are collected; directories are recursed into
//! but never themselves aggregated. Entries can additionally be filtered
//! by a glob matched against the basename or a regex matched against the
//! full path.

use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{FingerprintError, Result};
use crate::symlink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub file_type: EntryType,
    /// Set for a symlink whose chain doesn't resolve to anything (a
    /// nonexistent target or a cycle). Broken symlinks are still hashed by
    /// their link text, but are excluded from the fold in `default` mode.
    pub broken_symlink: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    pub glob: Option<glob::Pattern>,
    pub regex: Option<regex::Regex>,
}

impl TraversalOptions {
    fn matches(&self, path: &Path) -> bool {
        if let Some(pattern) = &self.glob {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !pattern.matches(name) {
                return false;
            }
        }
        if let Some(re) = &self.regex {
            if !re.is_match(&path.to_string_lossy()) {
                return false;
            }
        }
        true
    }
}

struct WalkTask {
    dir: PathBuf,
    relative_prefix: PathBuf,
    dev: u64,
}

pub fn walk(root: &Path, options: &TraversalOptions) -> Result<Vec<Entry>> {
    let root_dev = std::fs::metadata(root).map_err(|e| io_err(root, e))?.dev();
    let worker_count = num_cpus::get().max(1);

    let (task_tx, task_rx) = crossbeam_channel::unbounded::<WalkTask>();
    let pending = AtomicUsize::new(1);
    task_tx
        .send(WalkTask { dir: root.to_path_buf(), relative_prefix: PathBuf::new(), dev: root_dev })
        .expect("channel outlives senders within this scope");

    let known_roots: Mutex<Vec<PathBuf>> = Mutex::new(vec![root.to_path_buf()]);
    let dispatched: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());
    let results: Mutex<Vec<Entry>> = Mutex::new(Vec::new());
    let first_error: Mutex<Option<FingerprintError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let task_rx = task_rx.clone();
            let task_tx = task_tx.clone();
            let pending = &pending;
            let known_roots = &known_roots;
            let dispatched = &dispatched;
            let results = &results;
            let first_error = &first_error;
            scope.spawn(move || loop {
                let task = match task_rx.recv_timeout(Duration::from_millis(20)) {
                    Ok(task) => task,
                    Err(_) => {
                        if pending.load(Ordering::SeqCst) == 0 {
                            break;
                        }
                        continue;
                    }
                };
                let outcome = process_dir(&task, options, known_roots, dispatched, &task_tx, pending);
                match outcome {
                    Ok(mut found) => results.lock().expect("poisoned").append(&mut found),
                    Err(e) => {
                        let mut slot = first_error.lock().expect("poisoned");
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    if let Some(e) = first_error.into_inner().expect("poisoned") {
        return Err(e);
    }
    Ok(results.into_inner().expect("poisoned"))
}

fn process_dir(
    task: &WalkTask,
    options: &TraversalOptions,
    known_roots: &Mutex<Vec<PathBuf>>,
    dispatched: &Mutex<HashSet<PathBuf>>,
    task_tx: &crossbeam_channel::Sender<WalkTask>,
    pending: &AtomicUsize,
) -> Result<Vec<Entry>> {
    let mut out = Vec::new();
    let read_dir = std::fs::read_dir(&task.dir).map_err(|e| io_err(&task.dir, e))?;

    for entry in read_dir {
        let entry = entry.map_err(|e| io_err(&task.dir, e))?;
        let path = entry.path();
        let relative_path = task.relative_prefix.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;

        if file_type.is_symlink() {
            let broken = dispatch_if_external_directory(&path, &relative_path, known_roots, dispatched, task_tx, pending);
            if options.matches(&path) {
                out.push(Entry { path, relative_path, file_type: EntryType::Symlink, broken_symlink: broken });
            }
            continue;
        }

        if file_type.is_dir() {
            if let Ok(meta) = std::fs::metadata(&path) {
                if meta.dev() == task.dev {
                    pending.fetch_add(1, Ordering::SeqCst);
                    let _ = task_tx.send(WalkTask { dir: path, relative_prefix: relative_path, dev: task.dev });
                }
            }
            continue;
        }

        if options.matches(&path) {
            out.push(Entry { path, relative_path, file_type: EntryType::File, broken_symlink: false });
        }
    }

    Ok(out)
}

/// Resolves `path`'s symlink chain. If it lands on a directory not already
/// covered by a root we're walking, dispatches a fresh traversal task for
/// it and records it as a new root. Returns whether the symlink is broken
/// (unresolvable chain or cycle).
fn dispatch_if_external_directory(
    path: &Path,
    relative_path: &Path,
    known_roots: &Mutex<Vec<PathBuf>>,
    dispatched: &Mutex<HashSet<PathBuf>>,
    task_tx: &crossbeam_channel::Sender<WalkTask>,
    pending: &AtomicUsize,
) -> bool {
    let target = match symlink::resolve_chain(path) {
        Ok(target) => target,
        Err(_) => return true,
    };
    let meta = match std::fs::metadata(&target) {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    if !meta.is_dir() {
        return false;
    }

    let already_known = known_roots.lock().expect("poisoned").iter().any(|r| target.starts_with(r));
    if already_known {
        return false;
    }
    let newly_dispatched = dispatched.lock().expect("poisoned").insert(target.clone());
    if !newly_dispatched {
        return false;
    }

    known_roots.lock().expect("poisoned").push(target.clone());
    pending.fetch_add(1, Ordering::SeqCst);
    let _ = task_tx.send(WalkTask { dir: target, relative_prefix: relative_path.to_path_buf(), dev: meta.dev() });
    false
}

fn io_err(path: &Path, source: std::io::Error) -> FingerprintError {
    FingerprintError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink as make_symlink;
    use tempfile::tempdir;

    #[test]
    fn walks_nested_files_but_does_not_aggregate_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"b").unwrap();

        let entries = walk(dir.path(), &TraversalOptions::default()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.relative_path.clone()).collect();
        assert!(names.contains(&PathBuf::from("a.txt")));
        assert!(names.contains(&PathBuf::from("sub/b.txt")));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn glob_filters_by_basename() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("a.log"), b"a").unwrap();
        let options = TraversalOptions { glob: Some(glob::Pattern::new("*.txt").unwrap()), regex: None };
        let entries = walk(dir.path(), &options).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative_path, PathBuf::from("a.txt"));
    }

    #[test]
    fn symlinked_external_directory_is_dispatched_and_its_files_collected() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("external.txt"), b"e").unwrap();
        make_symlink(outside.path(), root.path().join("link")).unwrap();

        let entries = walk(root.path(), &TraversalOptions::default()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.relative_path.clone()).collect();
        assert!(names.iter().any(|p| p == Path::new("link")));
        assert!(names.iter().any(|p| p == Path::new("link/external.txt")));
    }

    #[test]
    fn broken_symlink_is_collected_and_marked_broken() {
        let dir = tempdir().unwrap();
        make_symlink(dir.path().join("nonexistent"), dir.path().join("dangling")).unwrap();
        let entries = walk(dir.path(), &TraversalOptions::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].broken_symlink);
    }
}

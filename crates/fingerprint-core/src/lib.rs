//! Concurrent, content-addressed directory hasher: walk a tree, hash every
//! file (optionally caching digests in an extended attribute keyed on
//! inode/size/mtime), and fold the per-file digests into one directory
//! fingerprint. Snapshots of a fingerprint run can be written to disk and
//! diffed against a later run.

pub mod cache;
pub mod error;
pub mod fileinfo;
pub mod fold;
pub mod hash;
pub mod inputs;
pub mod pipeline;
pub mod snapshot;
pub mod symlink;
pub mod traversal;

pub use cache::XattrMode;
pub use error::{FingerprintError, Result};
pub use fold::FingerprintMode;
pub use hash::HashAlgorithm;
pub use pipeline::{fingerprint_directory, fingerprint_paths, Fingerprint, PipelineOptions};
pub use snapshot::{FingerprintParams, Snapshot, SnapshotDiff, SnapshotEntry, SnapshotFormat};
pub use traversal::TraversalOptions;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("symlink cycle detected resolving {0}")]
    SymlinkCycle(PathBuf),

    #[error("invalid glob pattern '{0}': {1}")]
    InvalidGlob(String, String),

    #[error("invalid regex pattern '{0}': {1}")]
    InvalidRegex(String, regex::Error),

    #[error("unrecognized snapshot format: {0}")]
    UnrecognizedFormat(String),

    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("malformed inputs file entry: {0}")]
    MalformedInputsEntry(String),
}

pub type Result<T> = std::result::Result<T, FingerprintError>;

//! Error kinds per the propagation policy: malformed-input and resolution
//! errors are fatal and abort before scheduling; graph errors are fatal
//! and abort before scheduling; io errors are recorded per-task and only
//! stop the run under `stop_on_error`; cancellation is the scheduler
//! unwinding after `stop_on_error` observed a recorded error.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("malformed playlist step: {0}")]
    MalformedInput(String),

    #[error("unbalanced sources/destinations: {sources} source(s), {destinations} destination(s)")]
    UnbalancedCardinality { sources: usize, destinations: usize },

    #[error("unexpandable variable '{0}' in strict mode")]
    UnexpandableVariable(String),

    #[error("duplicate producer for output {0}")]
    DuplicateProducer(PathBuf),

    #[error("exclusive-input violation on {0}")]
    ExclusiveInputViolation(PathBuf),

    #[error("cyclic dependency detected; {0} task(s) never became ready")]
    CyclicDependency(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run stopped after first error: {0}")]
    Cancellation(Box<ReplayError>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReplayError>;

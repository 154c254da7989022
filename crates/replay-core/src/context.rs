//! Shared, read-mostly state every task body and handler sees while
//! running: the expanded environment, run-wide flags, and the single
//! atomic error slot `stop_on_error` cancellation checks against.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ReplayError;
use crate::serializer::OutputSerializer;

#[derive(Debug, Clone)]
pub struct Flags {
    pub concurrent: bool,
    pub verbose: bool,
    pub dry_run: bool,
    pub stop_on_error: bool,
    pub force: bool,
    pub ordered_output: bool,
    pub analyze_dependencies_only: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            concurrent: false,
            verbose: false,
            dry_run: false,
            stop_on_error: false,
            force: false,
            ordered_output: true,
            analyze_dependencies_only: false,
        }
    }
}

/// The one piece of genuinely shared mutable state in a run: the first
/// error observed by any task, recorded at most once. A worker checks this
/// before starting a new task when `stop_on_error` is set, and the
/// scheduler surfaces it as [`ReplayError::Cancellation`] once the run
/// unwinds.
#[derive(Default)]
pub struct ErrorSlot(Mutex<Option<ReplayError>>);

impl ErrorSlot {
    pub fn record(&self, err: ReplayError) {
        let mut slot = self.0.lock().expect("error slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().expect("error slot poisoned").is_some()
    }

    pub fn take(&self) -> Option<ReplayError> {
        self.0.lock().expect("error slot poisoned").take()
    }
}

pub struct Context {
    pub env: HashMap<String, String>,
    pub flags: Flags,
    pub errors: ErrorSlot,
    pub serializer: OutputSerializer,
}

impl Context {
    pub fn new(env: HashMap<String, String>, flags: Flags) -> Self {
        let ordered = flags.ordered_output;
        Context {
            env,
            flags,
            errors: ErrorSlot::default(),
            serializer: OutputSerializer::new(ordered),
        }
    }
}

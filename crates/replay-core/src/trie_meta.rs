//! Per-node metadata attached to the path trie used for dependency
//! inference. Each node tracks whether some task produces it, whether an
//! ancestor directory is itself produced by a task (so consumers under that
//! ancestor implicitly depend on it too), and whether the node was claimed
//! as an exclusive input (move/delete) by some task.

use crate::task::TaskId;

#[derive(Debug, Default, Clone)]
pub struct ProducerMeta {
    /// The task that writes this exact path, if any.
    pub producer: Option<TaskId>,
    /// The task that consumed this path as an exclusive input (move source
    /// or delete target). At most one task may claim a path this way.
    pub exclusive_claim: Option<TaskId>,
    /// True once some task has registered a plain (non-exclusive) read of
    /// this path as an input.
    pub has_consumer: bool,
}

impl ProducerMeta {
    pub fn is_produced(&self) -> bool {
        self.producer.is_some()
    }
}

//! Ordering strategy for per-task output (echo text, and captured
//! stdout/stderr from `execute`) under concurrent scheduling.
//!
//! Tasks can finish in any order once scheduled concurrently, but a user
//! watching output expects it in playlist declaration order unless they
//! asked otherwise. In ordered mode each task's text is buffered until
//! every lower-indexed task has flushed; in unordered mode text is written
//! as soon as it arrives, serialized only by a mutex so lines from
//! different tasks never interleave mid-write. stdout and stderr are
//! tracked as independent streams so a task's own stdout/stderr ordering
//! doesn't block on the other stream.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use crate::task::TaskId;

pub struct OutputSerializer {
    ordered: bool,
    stdout: Mutex<SerializerState>,
    stderr: Mutex<SerializerState>,
}

struct SerializerState {
    next_to_flush: TaskId,
    pending: HashMap<TaskId, String>,
}

impl SerializerState {
    fn new() -> Self {
        SerializerState { next_to_flush: 0, pending: HashMap::new() }
    }
}

impl OutputSerializer {
    pub fn new(ordered: bool) -> Self {
        OutputSerializer {
            ordered,
            stdout: Mutex::new(SerializerState::new()),
            stderr: Mutex::new(SerializerState::new()),
        }
    }

    /// Record `text` as task `task_id`'s stdout, flushing it (and any
    /// now-unblocked successors) to the process's stdout. Used by `echo`
    /// and `execute`'s captured stdout.
    pub fn submit(&self, task_id: TaskId, text: String) {
        self.submit_stdout(task_id, text);
    }

    pub fn submit_stdout(&self, task_id: TaskId, text: String) {
        let mut state = self.stdout.lock().expect("output serializer poisoned");
        self.flush(&mut state, task_id, text, &mut std::io::stdout());
    }

    pub fn submit_stderr(&self, task_id: TaskId, text: String) {
        let mut state = self.stderr.lock().expect("output serializer poisoned");
        self.flush(&mut state, task_id, text, &mut std::io::stderr());
    }

    fn flush(&self, state: &mut SerializerState, task_id: TaskId, text: String, writer: &mut dyn Write) {
        if !self.ordered {
            let _ = writeln!(writer, "{text}");
            return;
        }
        state.pending.insert(task_id, text);
        while let Some(text) = state.pending.remove(&state.next_to_flush) {
            let _ = writeln!(writer, "{text}");
            state.next_to_flush += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_mode_accepts_any_submission_order() {
        let serializer = OutputSerializer::new(false);
        serializer.submit(2, "c".into());
        serializer.submit(0, "a".into());
        serializer.submit(1, "b".into());
    }

    #[test]
    fn ordered_mode_buffers_until_predecessors_flush() {
        let serializer = OutputSerializer::new(true);
        serializer.submit(1, "b".into());
        {
            let state = serializer.stdout.lock().unwrap();
            assert_eq!(state.next_to_flush, 0);
            assert!(state.pending.contains_key(&1));
        }
        serializer.submit(0, "a".into());
        {
            let state = serializer.stdout.lock().unwrap();
            assert_eq!(state.next_to_flush, 2);
            assert!(state.pending.is_empty());
        }
    }

    #[test]
    fn stdout_and_stderr_are_tracked_independently() {
        let serializer = OutputSerializer::new(true);
        serializer.submit_stderr(1, "err-b".into());
        serializer.submit_stdout(0, "out-a".into());
        {
            let stdout_state = serializer.stdout.lock().unwrap();
            assert_eq!(stdout_state.next_to_flush, 1);
        }
        {
            let stderr_state = serializer.stderr.lock().unwrap();
            assert_eq!(stderr_state.next_to_flush, 0);
            assert!(stderr_state.pending.contains_key(&1));
        }
    }
}

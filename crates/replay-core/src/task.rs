//! The scheduled unit of work: one [`Action`] plus the dependency-graph
//! bookkeeping the scheduler needs to know when it becomes runnable.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::action::Action;
use crate::context::Context;
use crate::error::Result;

pub type TaskId = usize;

/// A task's executable body is erased behind this trait so the scheduler
/// doesn't need to match on [`Action`] variants itself; `Action` is the one
/// implementor, but tests substitute stub bodies to exercise the scheduler
/// in isolation from the filesystem.
pub trait TaskBody: Send + Sync {
    fn run(&self, task_id: TaskId, ctx: &Context) -> Result<()>;
    fn describe(&self) -> String;
}

impl TaskBody for Action {
    fn run(&self, task_id: TaskId, ctx: &Context) -> Result<()> {
        crate::handlers::execute_for_task(self, task_id, ctx)
    }

    fn describe(&self) -> String {
        match self {
            Action::Clone { from, to, .. } => format!("clone {} -> {}", from.display(), to.display()),
            Action::Move { from, to, .. } => format!("move {} -> {}", from.display(), to.display()),
            Action::Hardlink { from, to, .. } => {
                format!("hardlink {} -> {}", from.display(), to.display())
            }
            Action::Symlink { from, to, .. } => {
                format!("symlink {} -> {}", from.display(), to.display())
            }
            Action::Create { to, .. } => format!("create {}", to.display()),
            Action::CreateDirectory { to } => format!("create-directory {}", to.display()),
            Action::Delete { item, .. } => format!("delete {}", item.display()),
            Action::Execute { tool, arguments, .. } => {
                format!("execute {} {}", tool.display(), arguments.join(" "))
            }
            Action::Echo { content } => format!("echo {content}"),
        }
    }
}

pub struct Task {
    pub id: TaskId,
    pub body: Box<dyn TaskBody>,
    pub inputs: Vec<PathBuf>,
    pub exclusive_inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Count of not-yet-satisfied producer dependencies. A task is runnable
    /// once this reaches zero. Decremented with `fetch_sub`; the thread
    /// that observes the post-decrement value hit zero is the one that
    /// schedules the task, so a task never runs twice and never needs a
    /// separate "ready" queue entry lock.
    pub pending: AtomicUsize,
    /// Tasks whose `pending` counter should be decremented once this task
    /// finishes (successfully or not — failed producers still unblock
    /// consumers so `stop_on_error` can observe and cancel them instead of
    /// the run hanging on an unsatisfiable wait).
    pub next_tasks: Vec<TaskId>,
    pub executed: AtomicBool,
}

impl Task {
    pub fn new(id: TaskId, body: Box<dyn TaskBody>, inputs: Vec<PathBuf>, exclusive_inputs: Vec<PathBuf>, outputs: Vec<PathBuf>) -> Self {
        Task {
            id,
            body,
            inputs,
            exclusive_inputs,
            outputs,
            pending: AtomicUsize::new(0),
            next_tasks: Vec::new(),
            executed: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    /// Decrement the pending-input counter and report whether this call is
    /// the one that brought it to zero.
    pub fn arm(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn describe(&self) -> String {
        self.body.describe()
    }

    pub fn run(&self, ctx: &Context) -> Result<()> {
        self.body.run(self.id, ctx)
    }
}

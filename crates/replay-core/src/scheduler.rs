//! Executes a built [`Graph`] either strictly in declaration order or with
//! a worker pool gated by a maximum concurrency, driven by the atomic
//! decrement-and-test on each task's pending-input counter: the worker
//! whose `arm()` call observes the counter hit zero is the one that
//! enqueues the task, so no separate "ready" lock is needed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{trace, warn};

use crate::context::Context;
use crate::error::{ReplayError, Result};
use crate::graph::Graph;
use crate::task::TaskId;

#[derive(Debug, Clone, Copy)]
pub enum ConcurrencyPolicy {
    /// Execute tasks one at a time, in playlist declaration order among
    /// whatever is currently ready (a stable, deterministic run).
    Serial,
    /// Execute ready tasks across a worker pool. `max == 0` means
    /// unbounded — in practice bounded by the number of logical CPUs,
    /// since that's the real limit on useful parallelism for filesystem
    /// and process-spawning work.
    Concurrent { max: usize },
}

pub fn run(graph: &Graph, ctx: &Context, policy: ConcurrencyPolicy) -> Result<()> {
    match policy {
        ConcurrencyPolicy::Serial => run_serial(graph, ctx),
        ConcurrencyPolicy::Concurrent { max } => run_concurrent(graph, ctx, max),
    }
}

fn run_serial(graph: &Graph, ctx: &Context) -> Result<()> {
    let tasks = &graph.tasks;
    let mut queue: VecDeque<TaskId> = graph.roots.iter().copied().collect();
    let mut processed = 0usize;

    while let Some(id) = queue.pop_front() {
        if ctx.flags.stop_on_error && ctx.errors.is_set() {
            break;
        }
        let task = &tasks[id];
        trace!(task = id, body = %task.describe(), "running");
        if let Err(e) = task.run(ctx) {
            warn!(task = id, error = %e, "task failed");
            ctx.errors.record(e);
        }
        task.executed.store(true, Ordering::Release);
        processed += 1;
        for &next in &task.next_tasks {
            if tasks[next].arm() {
                queue.push_back(next);
            }
        }
    }

    finish(tasks.len(), processed, ctx)
}

fn run_concurrent(graph: &Graph, ctx: &Context, max: usize) -> Result<()> {
    let tasks = &graph.tasks;
    let worker_count = if max == 0 { num_cpus::get().max(1) } else { max };

    let (tx, rx) = crossbeam_channel::unbounded::<TaskId>();
    for &root in &graph.roots {
        tx.send(root).expect("receiver outlives senders within scope");
    }

    let active = AtomicUsize::new(graph.roots.len());
    let processed = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let rx = rx.clone();
            let tx = tx.clone();
            let active = &active;
            let processed = &processed;
            scope.spawn(move || loop {
                if active.load(Ordering::Acquire) == 0 {
                    return;
                }
                match rx.recv_timeout(Duration::from_millis(10)) {
                    Ok(id) => {
                        if ctx.flags.stop_on_error && ctx.errors.is_set() {
                            // Abandon this task: don't run it, don't arm its
                            // successors. `processed` stays short of
                            // `total` so `finish` reports `Cancellation`
                            // rather than success.
                            active.fetch_sub(1, Ordering::AcqRel);
                            continue;
                        }
                        let task = &tasks[id];
                        trace!(task = id, body = %task.describe(), "running");
                        if let Err(e) = task.run(ctx) {
                            warn!(task = id, error = %e, "task failed");
                            ctx.errors.record(e);
                        }
                        task.executed.store(true, Ordering::Release);
                        processed.fetch_add(1, Ordering::AcqRel);
                        for &next in &task.next_tasks {
                            if tasks[next].arm() {
                                active.fetch_add(1, Ordering::AcqRel);
                                let _ = tx.send(next);
                            }
                        }
                        active.fetch_sub(1, Ordering::AcqRel);
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                }
            });
        }
    });

    finish(tasks.len(), processed.load(Ordering::Acquire), ctx)
}

fn finish(total: usize, processed: usize, ctx: &Context) -> Result<()> {
    if processed < total {
        if let Some(err) = ctx.errors.take() {
            return Err(ReplayError::Cancellation(Box::new(err)));
        }
        return Err(ReplayError::CyclicDependency(total - processed));
    }
    if let Some(err) = ctx.errors.take() {
        return Err(err);
    }
    Ok(())
}

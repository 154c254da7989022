//! Two-pass dependency graph construction.
//!
//! Pass 1 walks every task once and registers its outputs in the path
//! trie. Two tasks claiming the same output is rejected by default; with
//! `force` set, the later task simply takes over as the producer (logged
//! via `warn!`) instead of erroring.
//!
//! Pass 2 walks every task's inputs and exclusive inputs, resolving each to
//! either its exact producer or, failing that, the nearest producing
//! ancestor directory (so writing a directory's tree implicitly satisfies
//! anything that merely reads a path underneath it). Exclusive inputs
//! (move sources, delete targets) are additionally checked against a
//! second claimant.

use std::path::Path;
use std::sync::atomic::Ordering;

use pathtrie::{NodeId, Trie};
use tracing::warn;

use crate::action::{Action, ParsedAction};
use crate::error::{ReplayError, Result};
use crate::task::{Task, TaskId};
use crate::trie_meta::ProducerMeta;

pub struct Graph {
    pub trie: Trie<ProducerMeta>,
    pub tasks: Vec<Task>,
    pub roots: Vec<TaskId>,
}

/// Plain-data view of a built graph for `--analyze-dependencies` output,
/// independent of the scheduler so it can be printed without running
/// anything.
pub struct GraphSummary {
    pub task_count: usize,
    pub root_count: usize,
    pub edges: Vec<(TaskId, TaskId)>,
    pub descriptions: Vec<String>,
}

pub fn summarize(graph: &Graph) -> GraphSummary {
    let mut edges = Vec::new();
    for task in &graph.tasks {
        for &next in &task.next_tasks {
            edges.push((task.id, next));
        }
    }
    GraphSummary {
        task_count: graph.tasks.len(),
        root_count: graph.roots.len(),
        edges,
        descriptions: graph.tasks.iter().map(|t| t.describe()).collect(),
    }
}

pub fn build(actions: Vec<ParsedAction>, force: bool) -> Result<Graph> {
    let mut trie: Trie<ProducerMeta> = Trie::new();
    let mut tasks: Vec<Task> = Vec::with_capacity(actions.len());

    // Pass 1: register every output, then build the Task list.
    for (id, parsed) in actions.iter().enumerate() {
        for out in &parsed.outputs {
            let node = trie.find_or_insert(&path_key(out));
            let meta = trie.meta_mut(node);
            if let Some(existing) = meta.producer {
                if !force {
                    return Err(ReplayError::DuplicateProducer(out.clone()));
                }
                warn!(path = %out.display(), previous_task = existing, new_task = id, "duplicate producer, force overriding");
            }
            meta.producer = Some(id);
        }
    }
    for (id, parsed) in actions.into_iter().enumerate() {
        let ParsedAction {
            action,
            inputs,
            exclusive_inputs,
            outputs,
        } = parsed;
        let body: Box<dyn crate::task::TaskBody> = Box::new(action);
        tasks.push(Task::new(id, body, inputs, exclusive_inputs, outputs));
    }

    // Pass 2: link every input/exclusive-input to its producer, if any.
    let mut edges: Vec<(TaskId, TaskId)> = Vec::new();
    for task in &tasks {
        for input in &task.inputs {
            let node = trie.find_or_insert(&path_key(input));
            trie.meta_mut(node).has_consumer = true;
            if let Some(producer) = find_producer(&trie, node) {
                if producer != task.id {
                    edges.push((producer, task.id));
                }
            }
        }
        for excl in &task.exclusive_inputs {
            let node = trie.find_or_insert(&path_key(excl));
            {
                let meta = trie.meta_mut(node);
                match meta.exclusive_claim {
                    Some(existing) if existing != task.id => {
                        return Err(ReplayError::ExclusiveInputViolation(excl.clone()));
                    }
                    _ => meta.exclusive_claim = Some(task.id),
                }
            }
            if let Some(producer) = find_producer(&trie, node) {
                if producer != task.id {
                    edges.push((producer, task.id));
                }
            }
        }
    }

    edges.sort_unstable();
    edges.dedup();
    for (producer, consumer) in edges {
        tasks[producer].next_tasks.push(consumer);
        tasks[consumer].pending.fetch_add(1, Ordering::Relaxed);
    }

    let roots = tasks.iter().filter(|t| t.is_ready()).map(|t| t.id).collect();

    Ok(Graph { trie, tasks, roots })
}

/// A task whose exact path has no registered producer inherits the nearest
/// ancestor directory's producer, if any — writing `/out` implicitly
/// satisfies a read of `/out/child.txt`.
fn find_producer(trie: &Trie<ProducerMeta>, node: NodeId) -> Option<TaskId> {
    if let Some(p) = trie.meta(node).producer {
        return Some(p);
    }
    trie.ancestors(node).find_map(|ancestor| trie.meta(ancestor).producer)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ParsedAction;
    use std::path::PathBuf;

    fn parsed(action: Action, inputs: &[&str], exclusive: &[&str], outputs: &[&str]) -> ParsedAction {
        ParsedAction {
            action,
            inputs: inputs.iter().map(PathBuf::from).collect(),
            exclusive_inputs: exclusive.iter().map(PathBuf::from).collect(),
            outputs: outputs.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn independent_tasks_are_all_roots() {
        let a = parsed(Action::Echo { content: "a".into() }, &[], &[], &["/out/a"]);
        let b = parsed(Action::Echo { content: "b".into() }, &[], &[], &["/out/b"]);
        let graph = build(vec![a, b], false).unwrap();
        assert_eq!(graph.roots.len(), 2);
    }

    #[test]
    fn consumer_depends_on_exact_producer() {
        let producer = parsed(Action::Create { to: PathBuf::from("/out/x"), content: String::new(), permissions: None }, &[], &[], &["/out/x"]);
        let consumer = parsed(Action::Echo { content: "consume".into() }, &["/out/x"], &[], &["/out/y"]);
        let graph = build(vec![producer, consumer], false).unwrap();
        assert_eq!(graph.roots, vec![0]);
        assert_eq!(graph.tasks[0].next_tasks, vec![1]);
    }

    #[test]
    fn consumer_depends_on_ancestor_producer() {
        let producer = parsed(Action::CreateDirectory { to: PathBuf::from("/out/dir") }, &[], &[], &["/out/dir"]);
        let consumer = parsed(Action::Echo { content: "consume".into() }, &["/out/dir/child.txt"], &[], &[]);
        let graph = build(vec![producer, consumer], false).unwrap();
        assert_eq!(graph.roots, vec![0]);
        assert_eq!(graph.tasks[0].next_tasks, vec![1]);
    }

    #[test]
    fn duplicate_producer_is_rejected() {
        let a = parsed(Action::Echo { content: "a".into() }, &[], &[], &["/out/x"]);
        let b = parsed(Action::Echo { content: "b".into() }, &[], &[], &["/out/x"]);
        assert!(matches!(build(vec![a, b], false), Err(ReplayError::DuplicateProducer(_))));
    }

    #[test]
    fn duplicate_producer_with_force_lets_second_win() {
        let a = parsed(Action::Echo { content: "a".into() }, &[], &[], &["/out/x"]);
        let b = parsed(Action::Echo { content: "b".into() }, &[], &[], &["/out/x"]);
        let graph = build(vec![a, b], true).unwrap();
        let node = graph.trie.find(&path_key(Path::new("/out/x"))).unwrap();
        assert_eq!(graph.trie.meta(node).producer, Some(1));
    }

    #[test]
    fn double_exclusive_claim_is_rejected() {
        let a = parsed(Action::Delete { item: PathBuf::from("/out/x"), recursive: false }, &[], &["/out/x"], &[]);
        let b = parsed(Action::Delete { item: PathBuf::from("/out/x"), recursive: false }, &[], &["/out/x"], &[]);
        assert!(matches!(build(vec![a, b], false), Err(ReplayError::ExclusiveInputViolation(_))));
    }
}

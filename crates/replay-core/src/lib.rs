//! Action-graph scheduler core: turns a declarative playlist of filesystem
//! actions into a dependency graph (via a shared [`pathtrie::Trie`]) and
//! executes it either strictly in order or across a bounded worker pool.
//!
//! This crate has no CLI or server surface of its own — see `replay-cli`
//! for the playlist-file and streaming-stdin front ends and the Unix
//! domain socket server mode.

pub mod action;
pub mod context;
pub mod env;
pub mod error;
pub mod graph;
pub mod handlers;
pub mod ingress;
pub mod parser;
pub mod scheduler;
pub mod serializer;
pub mod task;
pub mod trie_meta;

pub use action::{Action, ParsedAction, StepDescriptor};
pub use context::{Context, Flags};
pub use error::{ReplayError, Result};
pub use graph::{Graph, GraphSummary};
pub use parser::ActionParser;
pub use scheduler::ConcurrencyPolicy;
pub use task::{Task, TaskId};

use std::collections::HashMap;

/// Parse, build the dependency graph for, and execute a playlist — the
/// common path for both a one-shot CLI invocation and a server's
/// per-connection request handling.
pub fn run_playlist(
    steps: Vec<StepDescriptor>,
    env: HashMap<String, String>,
    flags: Flags,
    policy: ConcurrencyPolicy,
    strict_env: bool,
) -> Result<()> {
    let parser = ActionParser::new(env.clone(), strict_env);
    let actions = parser.parse_all(steps)?;
    let built = graph::build(actions, flags.force)?;
    let ctx = Context::new(env, flags);
    scheduler::run(&built, &ctx, policy)
}

/// Parse and build the dependency graph without executing it, for
/// `--analyze-dependencies` mode.
pub fn analyze_playlist(
    steps: Vec<StepDescriptor>,
    env: HashMap<String, String>,
    strict_env: bool,
    force: bool,
) -> Result<GraphSummary> {
    let parser = ActionParser::new(env, strict_env);
    let actions = parser.parse_all(steps)?;
    let built = graph::build(actions, force)?;
    Ok(graph::summarize(&built))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::StepDescriptor;

    fn step(json: &str) -> StepDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn run_playlist_executes_independent_echoes_serially() {
        let steps = vec![
            step(r#"{"action":"echo","content":"one"}"#),
            step(r#"{"action":"echo","content":"two"}"#),
        ];
        let result = run_playlist(
            steps,
            HashMap::new(),
            Flags::default(),
            ConcurrencyPolicy::Serial,
            false,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn analyze_playlist_reports_dependency_edge_without_running_anything() {
        let steps = vec![
            step(r#"{"action":"create-directory","to":"/tmp/replay-analyze-demo"}"#),
            step(r#"{"action":"echo","content":"child"}"#),
        ];
        let summary = analyze_playlist(steps, HashMap::new(), false, false).unwrap();
        assert_eq!(summary.task_count, 2);
    }
}

//! Action descriptors: the typed record a single playlist step deserializes
//! into, and the concrete [`Action`] variants the scheduler executes.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{ReplayError, Result};

/// One resolved, executable unit produced by the parser from a single
/// playlist step. A step with multiple sources fans out into multiple
/// `ParsedAction`s, one per source, each independently tracked by the task
/// graph builder.
#[derive(Debug, Clone)]
pub struct ParsedAction {
    pub action: Action,
    pub inputs: Vec<PathBuf>,
    pub exclusive_inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum Action {
    Clone {
        from: PathBuf,
        to: PathBuf,
        force: bool,
        permissions: Option<u32>,
    },
    Move {
        from: PathBuf,
        to: PathBuf,
        force: bool,
        permissions: Option<u32>,
    },
    Hardlink {
        from: PathBuf,
        to: PathBuf,
        force: bool,
    },
    Symlink {
        from: PathBuf,
        to: PathBuf,
        force: bool,
    },
    Create {
        to: PathBuf,
        content: String,
        permissions: Option<u32>,
    },
    CreateDirectory {
        to: PathBuf,
    },
    Delete {
        item: PathBuf,
        recursive: bool,
    },
    Execute {
        tool: PathBuf,
        arguments: Vec<String>,
        stdin: Option<PathBuf>,
        stdout: Option<PathBuf>,
        env: HashMap<String, String>,
    },
    Echo {
        content: String,
    },
}

impl ParsedAction {
    fn new(action: Action) -> Self {
        let (inputs, exclusive_inputs, outputs) = match &action {
            Action::Clone { from, to, .. } => (vec![from.clone()], vec![], vec![to.clone()]),
            Action::Move { from, to, .. } => (vec![], vec![from.clone()], vec![to.clone()]),
            Action::Hardlink { from, to, .. } => (vec![from.clone()], vec![], vec![to.clone()]),
            Action::Symlink { from, to, .. } => (vec![from.clone()], vec![], vec![to.clone()]),
            Action::Create { to, .. } => (vec![], vec![], vec![to.clone()]),
            Action::CreateDirectory { to } => (vec![], vec![], vec![to.clone()]),
            Action::Delete { item, .. } => (vec![], vec![item.clone()], vec![]),
            Action::Execute { stdin, stdout, .. } => {
                let inputs = stdin.iter().cloned().collect();
                let outputs = stdout.iter().cloned().collect();
                (inputs, vec![], outputs)
            }
            Action::Echo { .. } => (vec![], vec![], vec![]),
        };
        ParsedAction {
            action,
            inputs,
            exclusive_inputs,
            outputs,
        }
    }
}

/// A single `string` or a `list` of strings — both appear in playlists for
/// `from`/`to`/`items`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Raw shape of one playlist step, as deserialized from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDescriptor {
    pub action: String,
    #[serde(default)]
    from: Option<OneOrMany>,
    #[serde(default)]
    to: Option<OneOrMany>,
    #[serde(default)]
    items: Option<OneOrMany>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
    #[serde(default)]
    stdin: Option<String>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    recursive: bool,
    #[serde(default)]
    permissions: Option<String>,
}

impl StepDescriptor {
    /// Expand `${VAR}`/`$(VAR)` in every string-valued field against `env`,
    /// failing on an unknown variable only when `strict` is set.
    pub fn expand_variables(&mut self, env: &HashMap<String, String>, strict: bool) -> Result<()> {
        let mut expand_one = |s: &str| -> Result<String> {
            crate::env::expand(s, env, strict)
                .map_err(ReplayError::UnexpandableVariable)
        };

        if let Some(from) = &mut self.from {
            expand_one_or_many(from, &mut expand_one)?;
        }
        if let Some(to) = &mut self.to {
            expand_one_or_many(to, &mut expand_one)?;
        }
        if let Some(items) = &mut self.items {
            expand_one_or_many(items, &mut expand_one)?;
        }
        if let Some(content) = &mut self.content {
            *content = expand_one(content)?;
        }
        if let Some(tool) = &mut self.tool {
            *tool = expand_one(tool)?;
        }
        if let Some(arguments) = &mut self.arguments {
            for arg in arguments.iter_mut() {
                *arg = expand_one(arg)?;
            }
        }
        if let Some(stdin) = &mut self.stdin {
            *stdin = expand_one(stdin)?;
        }
        if let Some(stdout) = &mut self.stdout {
            *stdout = expand_one(stdout)?;
        }
        Ok(())
    }

    /// Turn the resolved descriptor into zero or more executable units.
    pub fn into_parsed_actions(self) -> Result<Vec<ParsedAction>> {
        match self.action.as_str() {
            "clone" | "move" | "hardlink" | "symlink" => self.parse_source_destination(),
            "create" => {
                let to = self
                    .to
                    .ok_or_else(|| ReplayError::MalformedInput("create requires 'to'".into()))?
                    .into_vec();
                let to = single(to, "to")?;
                let content = self
                    .content
                    .ok_or_else(|| ReplayError::MalformedInput("create requires 'content'".into()))?;
                let permissions = parse_permissions(self.permissions.as_deref())?;
                Ok(vec![ParsedAction::new(Action::Create {
                    to: PathBuf::from(to),
                    content,
                    permissions,
                })])
            }
            "create-directory" => {
                let to = self
                    .to
                    .ok_or_else(|| ReplayError::MalformedInput("create-directory requires 'to'".into()))?
                    .into_vec();
                let to = single(to, "to")?;
                Ok(vec![ParsedAction::new(Action::CreateDirectory {
                    to: PathBuf::from(to),
                })])
            }
            "delete" => {
                let items = self
                    .items
                    .ok_or_else(|| ReplayError::MalformedInput("delete requires 'items'".into()))?
                    .into_vec();
                Ok(items
                    .into_iter()
                    .map(|item| {
                        ParsedAction::new(Action::Delete {
                            item: PathBuf::from(item),
                            recursive: self.recursive,
                        })
                    })
                    .collect())
            }
            "execute" => {
                let tool = self
                    .tool
                    .ok_or_else(|| ReplayError::MalformedInput("execute requires 'tool'".into()))?;
                Ok(vec![ParsedAction::new(Action::Execute {
                    tool: PathBuf::from(tool),
                    arguments: self.arguments.unwrap_or_default(),
                    stdin: self.stdin.map(PathBuf::from),
                    stdout: self.stdout.map(PathBuf::from),
                    env: self.env.unwrap_or_default(),
                })])
            }
            "echo" => {
                let content = self
                    .content
                    .ok_or_else(|| ReplayError::MalformedInput("echo requires 'content'".into()))?;
                Ok(vec![ParsedAction::new(Action::Echo { content })])
            }
            other => Err(ReplayError::MalformedInput(format!(
                "unrecognized action kind '{other}'"
            ))),
        }
    }

    fn parse_source_destination(self) -> Result<Vec<ParsedAction>> {
        let from = self
            .from
            .ok_or_else(|| ReplayError::MalformedInput(format!("{} requires 'from'", self.action)))?
            .into_vec();
        let to = self
            .to
            .ok_or_else(|| ReplayError::MalformedInput(format!("{} requires 'to'", self.action)))?
            .into_vec();

        let pairs = materialize_pairs(&from, &to)?;
        let permissions = parse_permissions(self.permissions.as_deref())?;

        let make = |from: PathBuf, to: PathBuf| -> Action {
            match self.action.as_str() {
                "clone" => Action::Clone {
                    from,
                    to,
                    force: self.force,
                    permissions,
                },
                "move" => Action::Move {
                    from,
                    to,
                    force: self.force,
                    permissions,
                },
                "hardlink" => Action::Hardlink {
                    from,
                    to,
                    force: self.force,
                },
                "symlink" => Action::Symlink {
                    from,
                    to,
                    force: self.force,
                },
                _ => unreachable!("filtered by caller"),
            }
        };

        Ok(pairs
            .into_iter()
            .map(|(from, to)| ParsedAction::new(make(from, to)))
            .collect())
    }
}

/// Pair sources to destinations: when there's exactly one destination and
/// more than one source, treat the destination as a directory and append
/// each source's basename; when counts match, pair 1:1. Any other mismatch
/// is a user error.
fn materialize_pairs(from: &[String], to: &[String]) -> Result<Vec<(PathBuf, PathBuf)>> {
    if from.is_empty() || to.is_empty() {
        return Err(ReplayError::UnbalancedCardinality {
            sources: from.len(),
            destinations: to.len(),
        });
    }

    if to.len() == 1 && from.len() > 1 {
        let dir = PathBuf::from(&to[0]);
        return Ok(from
            .iter()
            .map(|src| {
                let src_path = PathBuf::from(src);
                let basename = src_path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| src_path.clone());
                (src_path, dir.join(basename))
            })
            .collect());
    }

    if from.len() == to.len() {
        return Ok(from
            .iter()
            .zip(to.iter())
            .map(|(f, t)| (PathBuf::from(f), PathBuf::from(t)))
            .collect());
    }

    Err(ReplayError::UnbalancedCardinality {
        sources: from.len(),
        destinations: to.len(),
    })
}

fn single(mut v: Vec<String>, field: &str) -> Result<String> {
    if v.len() != 1 {
        return Err(ReplayError::MalformedInput(format!(
            "'{field}' must be a single path, got {}",
            v.len()
        )));
    }
    Ok(v.pop().unwrap())
}

fn parse_permissions(raw: Option<&str>) -> Result<Option<u32>> {
    match raw {
        None => Ok(None),
        Some(s) => u32::from_str_radix(s.trim_start_matches("0o"), 8)
            .map(Some)
            .map_err(|_| ReplayError::MalformedInput(format!("invalid permissions '{s}'"))),
    }
}

fn expand_one_or_many(
    value: &mut OneOrMany,
    expand: &mut impl FnMut(&str) -> Result<String>,
) -> Result<()> {
    match value {
        OneOrMany::One(s) => *s = expand(s)?,
        OneOrMany::Many(v) => {
            for s in v.iter_mut() {
                *s = expand(s)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(json: &str) -> StepDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn clone_with_single_source_and_dest() {
        let s = step(r#"{"action":"clone","from":"/tmp/a","to":"/tmp/b"}"#);
        let parsed = s.into_parsed_actions().unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].inputs, vec![PathBuf::from("/tmp/a")]);
        assert_eq!(parsed[0].outputs, vec![PathBuf::from("/tmp/b")]);
    }

    #[test]
    fn clone_fans_out_one_task_per_source_into_directory() {
        let s = step(r#"{"action":"clone","from":["/tmp/a","/tmp/b"],"to":"/tmp/dest"}"#);
        let parsed = s.into_parsed_actions().unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].outputs, vec![PathBuf::from("/tmp/dest/a")]);
        assert_eq!(parsed[1].outputs, vec![PathBuf::from("/tmp/dest/b")]);
    }

    #[test]
    fn mismatched_cardinality_is_an_error() {
        let s = step(r#"{"action":"clone","from":["/a","/b"],"to":["/x","/y","/z"]}"#);
        assert!(s.into_parsed_actions().is_err());
    }

    #[test]
    fn move_marks_source_as_exclusive_input() {
        let s = step(r#"{"action":"move","from":"/tmp/a","to":"/tmp/b"}"#);
        let parsed = s.into_parsed_actions().unwrap();
        assert_eq!(parsed[0].exclusive_inputs, vec![PathBuf::from("/tmp/a")]);
        assert!(parsed[0].inputs.is_empty());
    }

    #[test]
    fn delete_fans_out_one_task_per_item() {
        let s = step(r#"{"action":"delete","items":["/a","/b","/c"]}"#);
        let parsed = s.into_parsed_actions().unwrap();
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn variable_expansion_applies_to_all_string_fields() {
        let mut s = step(r#"{"action":"create","to":"${DIR}/out.txt","content":"hello $(NAME)"}"#);
        let mut env = HashMap::new();
        env.insert("DIR".to_string(), "/tmp".to_string());
        env.insert("NAME".to_string(), "world".to_string());
        s.expand_variables(&env, false).unwrap();
        let parsed = s.into_parsed_actions().unwrap();
        match &parsed[0].action {
            Action::Create { to, content, .. } => {
                assert_eq!(to, &PathBuf::from("/tmp/out.txt"));
                assert_eq!(content, "hello world");
            }
            _ => panic!("expected Create"),
        }
    }
}

//! Turns a playlist's raw step descriptors into the flat list of
//! [`ParsedAction`]s the graph builder consumes: expand variables against
//! the run's environment, then materialize each step into its one or more
//! executable units.

use std::collections::HashMap;

use crate::action::{ParsedAction, StepDescriptor};
use crate::error::Result;

pub struct ActionParser {
    env: HashMap<String, String>,
    strict_env: bool,
}

impl ActionParser {
    pub fn new(env: HashMap<String, String>, strict_env: bool) -> Self {
        ActionParser { env, strict_env }
    }

    pub fn parse_all(&self, steps: Vec<StepDescriptor>) -> Result<Vec<ParsedAction>> {
        let mut actions = Vec::new();
        for mut step in steps {
            step.expand_variables(&self.env, self.strict_env)?;
            actions.extend(step.into_parsed_actions()?);
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(json: &str) -> StepDescriptor {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn expands_then_materializes_each_step() {
        let mut env = HashMap::new();
        env.insert("ROOT".to_string(), "/tmp".to_string());
        let parser = ActionParser::new(env, false);
        let steps = vec![
            step(r#"{"action":"create-directory","to":"${ROOT}/out"}"#),
            step(r#"{"action":"create","to":"${ROOT}/out/a.txt","content":"hi"}"#),
        ];
        let actions = parser.parse_all(steps).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1].outputs[0], std::path::PathBuf::from("/tmp/out/a.txt"));
    }

    #[test]
    fn strict_mode_propagates_unexpandable_variable_error() {
        let parser = ActionParser::new(HashMap::new(), true);
        let steps = vec![step(r#"{"action":"echo","content":"${MISSING}"}"#)];
        assert!(parser.parse_all(steps).is_err());
    }
}

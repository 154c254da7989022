//! Reading an `--inputs` file: one path (or bare name to filter for) per
//! line, blank lines and `#`-comments skipped, with `${VAR}`/`$(VAR)`
//! environment expansion.
//!
//! The expansion itself is `replay_core::env::expand` — the original tool
//! calls the identical helper from its action-step parser and its
//! `--inputs` reader, so this crate reuses it rather than reimplementing
//! the same byte-scanning logic.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

use crate::error::{FingerprintError, Result};

pub fn read_inputs_file<R: Read>(reader: R, env: &HashMap<String, String>) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line.map_err(|e| FingerprintError::Io { path: "<inputs file>".into(), source: e })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        // `strict` is always false here: an unresolvable variable in an
        // inputs file degrades to an empty expansion rather than aborting
        // the whole fingerprint run, matching the non-strict default used
        // for action steps.
        let expanded = replay_core::env::expand(trimmed, env, false)
            .expect("strict=false never returns Err");
        lines.push(expanded);
    }
    Ok(lines)
}

//! Reading a playlist: either a single JSON array document, or a streaming
//! newline-delimited sequence of step objects (the shape used when a
//! caller pipes steps into stdin or a long-lived server connection as they
//! become known, rather than writing the whole playlist up front).

use std::io::{BufRead, BufReader, Read};

use crate::action::StepDescriptor;
use crate::error::Result;

/// Parse a playlist as a single JSON array: `[ {...}, {...} ]`.
pub fn read_playlist_array<R: Read>(reader: R) -> Result<Vec<StepDescriptor>> {
    let steps: Vec<StepDescriptor> = serde_json::from_reader(reader)?;
    Ok(steps)
}

/// Parse a playlist as newline-delimited JSON objects, one step per line.
/// Blank lines are skipped so trailing newlines don't produce a parse
/// error.
pub fn read_ndjson<R: Read>(reader: R) -> Result<Vec<StepDescriptor>> {
    let buf = BufReader::new(reader);
    let mut steps = Vec::new();
    for line in buf.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        steps.push(serde_json::from_str(trimmed)?);
    }
    Ok(steps)
}

/// Parse a single step object — used by a server connection's incremental
/// `queue-action-dictionary`/`queue-action-line` messages, which add one
/// step at a time to a batch instead of submitting a whole playlist
/// document up front.
pub fn read_single_step(text: &str) -> Result<StepDescriptor> {
    Ok(serde_json::from_str(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_json_array_playlist() {
        let input = br#"[{"action":"echo","content":"a"},{"action":"echo","content":"b"}]"#;
        let steps = read_playlist_array(&input[..]).unwrap();
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn reads_ndjson_skipping_blank_lines() {
        let input = "{\"action\":\"echo\",\"content\":\"a\"}\n\n{\"action\":\"echo\",\"content\":\"b\"}\n";
        let steps = read_ndjson(input.as_bytes()).unwrap();
        assert_eq!(steps.len(), 2);
    }
}

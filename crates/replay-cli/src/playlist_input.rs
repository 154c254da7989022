//! Shared playlist-text parsing for the `run`/`stream` subcommands and the
//! server's `RunPlaylist` request, so both paths agree on array-vs-NDJSON
//! handling.

use replay_core::{Result, StepDescriptor};

pub fn parse_text(text: &str, ndjson: bool) -> Result<Vec<StepDescriptor>> {
    if ndjson {
        replay_core::ingress::read_ndjson(text.as_bytes())
    } else {
        replay_core::ingress::read_playlist_array(text.as_bytes())
    }
}

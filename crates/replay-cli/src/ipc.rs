//! Length-prefixed binary framing for server mode, carrying bincode-encoded
//! requests/responses over a Unix domain socket. The 8-byte header mirrors
//! the teacher daemon's frame layout (magic + type/version + flags +
//! length + sequence id); the payload length field is widened to `u32`
//! here since a playlist can easily exceed 64KB.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const MAGIC: [u8; 2] = *b"RP";
pub const PROTOCOL_VERSION: u8 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Request = 0,
    Response = 1,
}

impl TryFrom<u8> for FrameType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameType::Request),
            1 => Ok(FrameType::Response),
            _ => Err(()),
        }
    }
}

/// 12-byte frame header: magic(2) + type_ver(1) + flags(1) + length(4) +
/// seq_id(4).
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub magic: [u8; 2],
    pub type_ver: u8,
    pub flags: u8,
    pub length: u32,
    pub seq_id: u32,
}

impl FrameHeader {
    pub const SIZE: usize = 12;
    pub const MAX_LENGTH: usize = 64 * 1024 * 1024;

    pub fn new(frame_type: FrameType, length: u32, seq_id: u32) -> Self {
        FrameHeader {
            magic: MAGIC,
            type_ver: ((frame_type as u8) << 4) | (PROTOCOL_VERSION & 0x0f),
            flags: 0,
            length,
            seq_id,
        }
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::try_from(self.type_ver >> 4).ok()
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.magic);
        out[2] = self.type_ver;
        out[3] = self.flags;
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8..12].copy_from_slice(&self.seq_id.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: [u8; Self::SIZE]) -> Option<Self> {
        if buf[0..2] != MAGIC {
            return None;
        }
        Some(FrameHeader {
            magic: [buf[0], buf[1]],
            type_ver: buf[2],
            flags: buf[3],
            length: u32::from_le_bytes(buf[4..8].try_into().ok()?),
            seq_id: u32::from_le_bytes(buf[8..12].try_into().ok()?),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ServerRequest {
    /// Run a whole playlist in one shot, carried as its raw JSON-array (or
    /// NDJSON) source text (the CLI and the graph builder are the only
    /// things that need to understand step shape; the wire format treats
    /// it opaquely).
    RunPlaylist {
        steps_json: String,
        ndjson: bool,
        env: HashMap<String, String>,
        strict_env: bool,
        concurrent: bool,
        max_concurrency: usize,
        stop_on_error: bool,
        force: bool,
        dry_run: bool,
        ordered_output: bool,
        verbose: bool,
    },
    Ping,

    /// Open an incremental batch on this connection: the steps that make
    /// it up arrive one at a time over subsequent `QueueActionDictionary`/
    /// `QueueActionLine` messages rather than all at once, and execution
    /// doesn't start until `FinishAndWait`. A connection may only have one
    /// open batch; a second `StartServer` replaces it.
    StartServer {
        batch_name: String,
        env: HashMap<String, String>,
        strict_env: bool,
        concurrent: bool,
        max_concurrency: usize,
        stop_on_error: bool,
        force: bool,
        dry_run: bool,
        ordered_output: bool,
        verbose: bool,
    },
    /// Queue one already-parsed step object onto the open batch.
    QueueActionDictionary { step_json: String },
    /// Queue one step parsed from a single NDJSON line onto the open
    /// batch — equivalent to `QueueActionDictionary`, offered separately
    /// because a caller streaming raw NDJSON text doesn't need to parse
    /// it into a dictionary itself first.
    QueueActionLine { line: String },
    /// Stop accepting more steps, build the dependency graph from
    /// everything queued so far, and run it to completion before
    /// responding.
    FinishAndWait,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ServerResponse {
    Ok,
    Error(String),
    Pong,
    /// Unsolicited keep-alive pushed while a `FinishAndWait` run is still
    /// in progress, so a client waiting on a long batch knows the
    /// connection is still alive.
    Heartbeat,
    /// Pushed to every open connection when the server is shutting down,
    /// immediately before it closes the socket.
    Exiting,
}

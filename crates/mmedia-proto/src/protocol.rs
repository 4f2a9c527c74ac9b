use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::model::{NowPlaying, PlaybackState};

/// Current engine-link protocol version.  Bump this when the wire format
/// changes in a breaking way.  The session checks it on Hello and refuses to
/// drive an incompatible engine.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from the session to the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum EngineCommand {
    Play,
    Pause,
    PlayFromId {
        id: String,
        #[serde(default)]
        extras: Option<serde_json::Value>,
    },
    /// Ask the engine to re-send its current state and metadata.
    GetState,
}

/// Messages pushed from the playback engine to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum EngineBroadcast {
    /// Sent immediately on connect: version + full snapshot.
    Hello {
        protocol_version: u32,
        state: PlaybackState,
        now_playing: NowPlaying,
    },
    PlaybackState {
        data: PlaybackState,
    },
    Metadata {
        data: NowPlaying,
    },
    Error {
        message: String,
    },
}

/// Wrapper for socket communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(EngineCommand),
    Broadcast(EngineBroadcast),
}

/// Largest frame body either side accepts.  A header announcing more than
/// this means the stream cannot be trusted any further.
pub const MAX_FRAME_LEN: usize = 1 << 20;

impl Message {
    /// 4-byte big-endian length header followed by the JSON body.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        anyhow::ensure!(
            body.len() <= MAX_FRAME_LEN,
            "message of {} bytes exceeds the {} byte frame limit",
            body.len(),
            MAX_FRAME_LEN
        );
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&u32::try_from(body.len())?.to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode the frame at the front of `data`, returning the message and the
    /// bytes it occupied.
    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        let declared = declared_len(data).context("incomplete frame header")?;
        anyhow::ensure!(
            declared <= MAX_FRAME_LEN,
            "frame of {} bytes exceeds the {} byte limit",
            declared,
            MAX_FRAME_LEN
        );
        let body = data
            .get(4..4 + declared)
            .context("incomplete frame body")?;
        Ok((serde_json::from_slice(body)?, 4 + declared))
    }
}

/// Body length announced by the header at the front of `data`, whether or not
/// the body has arrived yet.
pub fn declared_len(data: &[u8]) -> Option<usize> {
    let header: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

/// Body length of the frame at the front of `data`, if the whole frame has
/// arrived.
pub fn frame_len(data: &[u8]) -> Option<usize> {
    let len = declared_len(data)?;
    (data.len() >= 4 + len).then_some(len)
}

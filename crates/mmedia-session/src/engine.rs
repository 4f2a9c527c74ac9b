//! Playback engine link.
//!
//! ```text
//!   RemoteEngine::connect(address)
//!         │
//!         ├── Hello read inline (version check, initial state + metadata)
//!         ├── writer_task   ← EngineCommand via mpsc, framed → socket
//!         └── reader_task   ← framed EngineBroadcast from socket
//!                                └── EngineEvent → event channel (arrival order)
//! ```
//!
//! The session only sees the [`PlaybackEngine`] command surface and the
//! [`EngineEvent`] stream; what the engine does with a command is its own
//! business.

use std::sync::Arc;
use std::time::Duration;

use mmedia_proto::model::{NowPlaying, PlaybackState};
use mmedia_proto::protocol::{
    declared_len, EngineBroadcast, EngineCommand, Message, MAX_FRAME_LEN, PROTOCOL_VERSION,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const HELLO_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Push notifications from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PlaybackStateChanged(PlaybackState),
    MetadataChanged(NowPlaying),
    /// The link to the engine is gone.
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine link closed")]
    Closed,
    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    /// The stream cannot be resynchronised after this; the link is dropped.
    #[error("engine sent a {len} byte frame, limit is {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("engine speaks protocol {found}, expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Commands the session forwards to the engine.
pub trait PlaybackEngine: Send + Sync + 'static {
    fn play(&self) -> Result<(), EngineError>;
    fn pause(&self) -> Result<(), EngineError>;
    fn play_from_id(&self, id: &str, extras: Option<serde_json::Value>) -> Result<(), EngineError>;
}

// ── Remote engine ─────────────────────────────────────────────────────────────

/// Engine reached over TCP with the framed JSON protocol.
pub struct RemoteEngine {
    address: String,
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl RemoteEngine {
    /// Connect, check the engine's Hello and start the I/O tasks.  The
    /// returned channel starts with the Hello snapshot (state, then metadata)
    /// and ends with [`EngineEvent::Disconnected`].
    pub async fn connect(
        address: &str,
    ) -> Result<(Arc<Self>, mpsc::Receiver<EngineEvent>), EngineError> {
        let stream = TcpStream::connect(address).await?;
        let (mut read_half, write_half) = stream.into_split();
        let mut read_buf: Vec<u8> = Vec::with_capacity(4096);

        let hello = tokio::time::timeout(HELLO_TIMEOUT, read_frame(&mut read_half, &mut read_buf))
            .await
            .map_err(|_| EngineError::Protocol("no Hello from engine".to_string()))??;

        let (state, now_playing) = match hello {
            Message::Broadcast(EngineBroadcast::Hello {
                protocol_version,
                state,
                now_playing,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(EngineError::VersionMismatch {
                        expected: PROTOCOL_VERSION,
                        found: protocol_version,
                    });
                }
                (state, now_playing)
            }
            other => {
                return Err(EngineError::Protocol(format!(
                    "expected Hello, got {:?}",
                    other
                )))
            }
        };
        info!("engine: connected to {} (protocol v{})", address, PROTOCOL_VERSION);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let _ = event_tx.send(EngineEvent::PlaybackStateChanged(state)).await;
        let _ = event_tx.send(EngineEvent::MetadataChanged(now_playing)).await;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(write_half, cmd_rx));
        tokio::spawn(reader_task(read_half, read_buf, event_tx, cmd_tx.clone()));

        Ok((
            Arc::new(Self {
                address: address.to_string(),
                tx: cmd_tx,
            }),
            event_rx,
        ))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn send(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        debug!("engine: -> {:?}", cmd);
        self.tx.send(cmd).map_err(|_| EngineError::Closed)
    }
}

impl PlaybackEngine for RemoteEngine {
    fn play(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Play)
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Pause)
    }

    fn play_from_id(&self, id: &str, extras: Option<serde_json::Value>) -> Result<(), EngineError> {
        self.send(EngineCommand::PlayFromId {
            id: id.to_string(),
            extras,
        })
    }
}

/// Read until one whole frame is buffered and decode it.  A header larger
/// than [`MAX_FRAME_LEN`] is refused before its body is buffered.
async fn read_frame(read_half: &mut OwnedReadHalf, buf: &mut Vec<u8>) -> Result<Message, EngineError> {
    let mut tmp = [0u8; 4096];
    loop {
        if let Some(len) = declared_len(buf) {
            if len > MAX_FRAME_LEN {
                return Err(EngineError::FrameTooLarge {
                    len,
                    max: MAX_FRAME_LEN,
                });
            }
            if buf.len() >= 4 + len {
                let frame: Vec<u8> = buf.drain(..4 + len).collect();
                return Message::decode(&frame)
                    .map(|(msg, _)| msg)
                    .map_err(|e| EngineError::Protocol(e.to_string()));
            }
        }
        match read_half.read(&mut tmp).await? {
            0 => return Err(EngineError::Closed),
            n => buf.extend_from_slice(&tmp[..n]),
        }
    }
}

async fn writer_task(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<EngineCommand>) {
    while let Some(cmd) = rx.recv().await {
        let encoded = match Message::Command(cmd).encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("engine: failed to encode command: {}", e);
                continue;
            }
        };
        if let Err(e) = write_half.write_all(&encoded).await {
            warn!("engine: write failed: {}", e);
            break;
        }
    }
    debug!("engine: writer task exiting");
}

async fn reader_task(
    mut read_half: OwnedReadHalf,
    mut read_buf: Vec<u8>,
    event_tx: mpsc::Sender<EngineEvent>,
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
) {
    loop {
        let msg = match read_frame(&mut read_half, &mut read_buf).await {
            Ok(msg) => msg,
            Err(EngineError::Protocol(e)) => {
                // The bad frame is already consumed; ask for a fresh snapshot.
                warn!("engine: undecodable frame, requesting state: {}", e);
                let _ = cmd_tx.send(EngineCommand::GetState);
                continue;
            }
            Err(e) => {
                warn!("engine: link lost: {}", e);
                break;
            }
        };

        let events = match msg {
            Message::Broadcast(EngineBroadcast::Hello {
                state, now_playing, ..
            }) => vec![
                EngineEvent::PlaybackStateChanged(state),
                EngineEvent::MetadataChanged(now_playing),
            ],
            Message::Broadcast(EngineBroadcast::PlaybackState { data }) => {
                vec![EngineEvent::PlaybackStateChanged(data)]
            }
            Message::Broadcast(EngineBroadcast::Metadata { data }) => {
                vec![EngineEvent::MetadataChanged(data)]
            }
            Message::Broadcast(EngineBroadcast::Error { message }) => {
                warn!("engine: reported error: {}", message);
                Vec::new()
            }
            Message::Command(cmd) => {
                warn!("engine: ignoring unexpected command {:?}", cmd);
                Vec::new()
            }
        };
        for event in events {
            if event_tx.send(event).await.is_err() {
                debug!("engine: event receiver gone, reader exiting");
                return;
            }
        }
    }
    let _ = event_tx.send(EngineEvent::Disconnected).await;
}

// ── Null engine ───────────────────────────────────────────────────────────────

/// Engine used when none is configured: commands are logged and dropped.
pub struct NullEngine {
    // Held so the event channel stays open for the life of the engine.
    _events: mpsc::Sender<EngineEvent>,
}

impl NullEngine {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(1);
        (Arc::new(Self { _events: tx }), rx)
    }
}

impl PlaybackEngine for NullEngine {
    fn play(&self) -> Result<(), EngineError> {
        info!("engine: play (no engine configured)");
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        info!("engine: pause (no engine configured)");
        Ok(())
    }

    fn play_from_id(&self, id: &str, _extras: Option<serde_json::Value>) -> Result<(), EngineError> {
        info!("engine: play_from_id {:?} (no engine configured)", id);
        Ok(())
    }
}

//! Session struct definition
//!
//! Represents one connected client: its identity, display name and
//! outbound line sink.

use std::sync::{Arc, OnceLock};

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AppError, SendError};
use crate::protocol::{ChatLineCodec, ServerLine};
use crate::types::SessionId;

/// Name shown in logs for a session that has not finished the handshake
pub const UNNAMED: &str = "Unknown";

/// Sending half of a session's outbound line queue
pub type LineSender = mpsc::UnboundedSender<Arc<str>>;

/// Receiving half, drained by the session's writer task
pub type LineReceiver = mpsc::UnboundedReceiver<Arc<str>>;

/// Connected session information
///
/// The outbound queue has exactly one consumer (the writer task), so lines
/// from concurrent broadcasters are never interleaved on the wire.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Remote address, for logging
    pub peer: String,
    /// Display name, set once by the handshake
    name: OnceLock<String>,
    /// Server → Client line queue
    sender: LineSender,
}

impl Session {
    /// Create a new session with the given ID and sender channel
    pub fn new(id: SessionId, peer: impl Into<String>, sender: LineSender) -> Self {
        Self {
            id,
            peer: peer.into(),
            name: OnceLock::new(),
            sender,
        }
    }

    /// Create a session together with the receiver its writer task drains
    pub fn with_channel(peer: impl Into<String>) -> (Self, LineReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(SessionId::new(), peer, tx), rx)
    }

    /// Queue one line for this session
    ///
    /// Never waits on the network. Returns an error if the writer task
    /// has ended (client disconnected).
    pub fn send_line(&self, line: Arc<str>) -> Result<(), SendError> {
        self.sender.send(line).map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a protocol line for this session
    pub fn send(&self, line: &ServerLine) -> Result<(), SendError> {
        self.send_line(Arc::from(line.to_string()))
    }

    /// The display name, if the handshake has completed
    pub fn name(&self) -> Option<&str> {
        self.name.get().map(String::as_str)
    }

    /// Get the display name for this session
    ///
    /// Returns the name if set, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(UNNAMED)
    }

    /// Check if this session has completed the handshake
    pub fn has_name(&self) -> bool {
        self.name.get().is_some()
    }

    /// Set the display name
    ///
    /// Only the first call takes effect; returns false if a name was
    /// already assigned.
    pub fn set_name(&self, name: String) -> bool {
        self.name.set(name).is_ok()
    }
}

/// Drain a session's outbound queue into the connection's write half
///
/// Ends when the queue closes, when `shutdown` fires, or on a write error.
/// The transport is closed on the way out; a failed close is only logged.
pub async fn write_outbound<W>(
    mut receiver: LineReceiver,
    mut sink: FramedWrite<W, ChatLineCodec>,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    let result = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break Ok(()),
            line = receiver.recv() => match line {
                Some(line) => {
                    if let Err(e) = sink.send(line).await {
                        break Err(AppError::from(e));
                    }
                }
                None => break Ok(()),
            },
        }
    };

    // Refuse further lines before closing so broadcasters see a closed sink
    receiver.close();

    if let Err(e) = SinkExt::<Arc<str>>::close(&mut sink).await {
        warn!("Couldn't close connection: {}", e);
    }
    debug!("Writer task ended");

    result
}

//! Error types for the chat server
//!
//! Defines application-level errors, outbound send errors and registry errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::AnyDelimiterCodecError;

use crate::types::SessionId;

/// Application-level errors
///
/// Per-connection variants terminate only the affected connection;
/// `Accept` is fatal to the server process.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on a connection (fatal for that connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error, including an over-long line
    #[error("Line codec error: {0}")]
    Lines(#[from] AnyDelimiterCodecError),

    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Listener failed to accept (fatal to the server)
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// Client could not reach the server
    #[error("Could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Message send errors
///
/// Occurs when writing to a session whose writer task has ended.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Session registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A session with this identity is already registered
    #[error("Session {0} is already registered")]
    DuplicateSession(SessionId),
}

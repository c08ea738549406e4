//! Line-Oriented TCP Chat Library
//!
//! A multi-client chat server and terminal client speaking newline-delimited
//! text over TCP, built on tokio.
//!
//! # Features
//! - Name handshake on connect
//! - Broadcast of chat lines to every other connected client
//! - Join and leave announcements
//! - `/quit` command, stream closure and I/O errors all end a session cleanly
//! - Graceful server shutdown
//!
//! # Architecture
//! - `SessionRegistry` is the only shared mutable state: a lock-protected
//!   map of live sessions. The lock covers membership, never network I/O.
//! - `Broadcaster` snapshots the registry and queues a line on every other
//!   session's outbound channel.
//! - Each connection runs a `ConnectionSupervisor` task (handshake, receive
//!   loop, guaranteed cleanup) plus a writer task that owns the socket's
//!   write half.
//! - `ChatServer` owns the listener and spawns a supervisor per connection.
//!
//! # Example
//! ```ignore
//! use line_chat::{ChatConfig, ChatServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(&ChatConfig::default()).await.unwrap();
//!     server.run(CancellationToken::new()).await.unwrap();
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod supervisor;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{BroadcastReport, Broadcaster};
pub use client::{chat, run_client, ClientExit};
pub use config::ChatConfig;
pub use error::{AppError, RegistryError, SendError};
pub use protocol::{ChatLineCodec, ClientLine, ServerLine};
pub use registry::SessionRegistry;
pub use server::ChatServer;
pub use session::Session;
pub use supervisor::{Closed, ConnectionSupervisor, Membership, SupervisorState, TerminationCause};
pub use types::SessionId;

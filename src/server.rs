//! ChatServer implementation
//!
//! Owns the listening socket and the session registry, and spawns one
//! connection supervisor per accepted connection. The accept loop never
//! waits on any connection's I/O.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broadcast::Broadcaster;
use crate::config::ChatConfig;
use crate::error::AppError;
use crate::registry::SessionRegistry;
use crate::supervisor::ConnectionSupervisor;

/// The chat server process
pub struct ChatServer {
    listener: TcpListener,
    broadcaster: Broadcaster,
    max_line_length: usize,
}

impl ChatServer {
    /// Bind the listening socket described by `config`
    pub async fn bind(config: &ChatConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| AppError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;

        Ok(Self {
            listener,
            broadcaster: Broadcaster::new(SessionRegistry::new()),
            max_line_length: config.max_line_length,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared registry of live sessions
    pub fn registry(&self) -> &SessionRegistry {
        self.broadcaster.registry()
    }

    /// Run the accept loop
    ///
    /// Returns `Ok` once `shutdown` is cancelled; live connections are
    /// cancelled through child tokens and clean up on their own.
    /// An accept failure is fatal and returned as `AppError::Accept`.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        info!("Chat Server is running on {}", self.local_addr()?);

        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.dispatch(stream, addr, &shutdown),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break Err(AppError::Accept(e));
                    }
                },
            }
        };

        // Listener-level failure also ends every live connection
        shutdown.cancel();
        result
    }

    /// Spawn a supervisor for one accepted connection
    fn dispatch(&self, stream: TcpStream, addr: SocketAddr, shutdown: &CancellationToken) {
        info!("New client connected: {}", addr);

        let supervisor = ConnectionSupervisor::new(
            addr.to_string(),
            self.broadcaster.clone(),
            shutdown.child_token(),
            self.max_line_length,
        );
        debug!("Session {} assigned to {}", supervisor.session().id, addr);

        let (reader, writer) = stream.into_split();
        tokio::spawn(supervisor.run(reader, writer));
    }
}

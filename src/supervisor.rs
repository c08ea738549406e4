//! Per-connection supervisor
//!
//! Drives one session from accept to cleanup:
//!
//! ```text
//! Connecting -> AwaitingName -> Active -> Terminating -> Closed
//!      \______________\_____________________^
//! ```
//!
//! Registry membership is held by a [`Membership`] guard. Releasing it
//! removes the session and announces the departure, exactly once, on every
//! exit path: quit, end of stream, read/write error, server shutdown, and
//! the supervisor future being dropped.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::error::{AppError, RegistryError};
use crate::protocol::{line_codec, ChatLineCodec, ClientLine, ServerLine};
use crate::session::{write_outbound, LineReceiver, Session};

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Transport accepted, session built, not registered
    Connecting,
    /// Registered and prompted; waiting for the name line
    AwaitingName,
    /// Named and announced; relaying chat lines
    Active,
    /// Closing the transport and leaving the registry
    Terminating,
    /// Final
    Closed,
}

impl SupervisorState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Connecting, AwaitingName)
                | (Connecting, Terminating)
                | (AwaitingName, Active)
                | (AwaitingName, Terminating)
                | (Active, Terminating)
                | (Terminating, Closed)
        )
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    /// Client sent the quit command
    Quit,
    /// Remote closed its stream
    EndOfStream,
    /// Reading a line failed (I/O error or over-long line)
    ReadFailed(String),
    /// The outbound writer stopped
    WriteFailed(String),
    /// Registry refused the session
    Rejected(String),
    /// Server is shutting down
    Shutdown,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCause::Quit => f.write_str("quit"),
            TerminationCause::EndOfStream => f.write_str("end of stream"),
            TerminationCause::ReadFailed(e) => write!(f, "read failed: {}", e),
            TerminationCause::WriteFailed(e) => write!(f, "write failed: {}", e),
            TerminationCause::Rejected(e) => write!(f, "rejected: {}", e),
            TerminationCause::Shutdown => f.write_str("server shutdown"),
        }
    }
}

/// Result of a finished supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closed {
    /// What triggered termination
    pub cause: TerminationCause,
    /// Whether "<name> has left the chat!" was broadcast
    pub departure_announced: bool,
}

/// Scoped registry membership
///
/// Created by registering a session; released explicitly or on drop.
#[derive(Debug)]
pub struct Membership {
    broadcaster: Broadcaster,
    session: Arc<Session>,
    released: bool,
}

impl Membership {
    /// Add `session` to the broadcaster's registry
    pub fn register(broadcaster: &Broadcaster, session: Arc<Session>) -> Result<Self, RegistryError> {
        broadcaster.registry().add(Arc::clone(&session))?;
        Ok(Self {
            broadcaster: broadcaster.clone(),
            session,
            released: false,
        })
    }

    /// Leave the registry now
    ///
    /// Returns true if this call announced the departure; false if the
    /// membership was already released. A session that never finished the
    /// handshake is announced under the placeholder name.
    pub fn release(mut self) -> bool {
        self.leave()
    }

    fn leave(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        self.broadcaster.registry().remove(self.session.id);

        let name = self.session.display_name();
        if self.session.has_name() {
            info!("{} has left the chat", name);
        } else {
            info!("Session {} left before sending a name", self.session.id);
        }
        self.broadcaster.broadcast(
            self.session.id,
            &ServerLine::Left {
                name: name.to_string(),
            },
        );
        true
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.leave();
    }
}

/// Supervisor for a single accepted connection
pub struct ConnectionSupervisor {
    session: Arc<Session>,
    receiver: LineReceiver,
    broadcaster: Broadcaster,
    shutdown: CancellationToken,
    max_line_length: usize,
    state: SupervisorState,
}

impl ConnectionSupervisor {
    /// Build the session for a freshly accepted connection (`Connecting`)
    pub fn new(
        peer: impl Into<String>,
        broadcaster: Broadcaster,
        shutdown: CancellationToken,
        max_line_length: usize,
    ) -> Self {
        let (session, receiver) = Session::with_channel(peer);
        Self {
            session: Arc::new(session),
            receiver,
            broadcaster,
            shutdown,
            max_line_length,
            state: SupervisorState::Connecting,
        }
    }

    /// The supervised session
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Current lifecycle state
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Run the connection to completion
    ///
    /// `reader` and `writer` are the two halves of the transport; both are
    /// closed by the time this returns.
    pub async fn run<R, W>(self, reader: R, writer: W) -> Closed
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            session,
            receiver,
            broadcaster,
            shutdown,
            max_line_length,
            state,
        } = self;
        let peer = session.peer.clone();

        // Stopping the writer closes the transport; fires on every exit
        let writer_stop = shutdown.child_token();
        let _writer_guard = writer_stop.clone().drop_guard();
        let sink = FramedWrite::new(writer, ChatLineCodec::new());
        let write_task = tokio::spawn(write_outbound(receiver, sink, writer_stop.clone()));

        let mut conversation = Conversation {
            session,
            broadcaster,
            shutdown,
            lines: FramedRead::new(reader, line_codec(max_line_length)),
            write_task: Some(write_task),
            state,
        };

        // Queued ahead of registration so it is always the first line out
        if let Err(e) = conversation.session.send(&ServerLine::Prompt) {
            debug!("Prompt for {} not queued: {}", conversation.session.id, e);
        }

        let (cause, membership) =
            match Membership::register(&conversation.broadcaster, conversation.session.clone()) {
                Ok(membership) => {
                    conversation.advance(SupervisorState::AwaitingName);
                    (conversation.converse().await, Some(membership))
                }
                Err(e) => {
                    error!("Failed to register session from {}: {}", peer, e);
                    (TerminationCause::Rejected(e.to_string()), None)
                }
            };

        conversation.advance(SupervisorState::Terminating);
        let (session, mut state) = conversation.close(&writer_stop).await;

        let departure_announced = membership.map(Membership::release).unwrap_or(false);

        advance(&mut state, SupervisorState::Closed, &session);
        info!(
            "Client disconnected: {} ({}, {})",
            peer,
            session.display_name(),
            cause
        );

        Closed {
            cause,
            departure_announced,
        }
    }
}

/// Live half of a supervisor: the read stream plus the writer task
struct Conversation<R> {
    session: Arc<Session>,
    broadcaster: Broadcaster,
    shutdown: CancellationToken,
    lines: FramedRead<R, ChatLineCodec>,
    write_task: Option<JoinHandle<Result<(), AppError>>>,
    state: SupervisorState,
}

/// What woke the supervisor up
enum Event {
    Line(String),
    Stop(TerminationCause),
    WriterExited(TerminationCause),
}

impl<R> Conversation<R>
where
    R: AsyncRead + Unpin,
{
    fn advance(&mut self, next: SupervisorState) {
        advance(&mut self.state, next, &self.session);
    }

    /// Handshake then receive loop; returns once termination is triggered
    async fn converse(&mut self) -> TerminationCause {
        let name = match self.next_line().await {
            Ok(name) => name,
            Err(cause) => return cause,
        };
        self.session.set_name(name.clone());
        self.advance(SupervisorState::Active);

        info!("{} joined from {}", name, self.session.peer);
        self.broadcaster
            .broadcast(self.session.id, &ServerLine::Joined { name: name.clone() });

        loop {
            let line = match self.next_line().await {
                Ok(line) => line,
                Err(cause) => return cause,
            };
            match ClientLine::parse(line) {
                ClientLine::Quit => return TerminationCause::Quit,
                ClientLine::Chat(text) => {
                    self.broadcaster.broadcast(
                        self.session.id,
                        &ServerLine::Chat {
                            from: name.clone(),
                            text,
                        },
                    );
                }
            }
        }
    }

    /// Block on the next inbound line
    ///
    /// The only suspension point; also wakes on shutdown or writer exit.
    async fn next_line(&mut self) -> Result<String, TerminationCause> {
        let event = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Event::Stop(TerminationCause::Shutdown),
            exit = writer_exit(&mut self.write_task) => Event::WriterExited(exit),
            line = self.lines.next() => match line {
                Some(Ok(line)) => Event::Line(line),
                Some(Err(e)) => Event::Stop(TerminationCause::ReadFailed(e.to_string())),
                None => Event::Stop(TerminationCause::EndOfStream),
            },
        };

        match event {
            Event::Line(line) => Ok(line),
            Event::Stop(cause) => Err(cause),
            Event::WriterExited(cause) => {
                self.write_task = None;
                Err(cause)
            }
        }
    }

    /// Close both halves of the transport and hand back the session
    async fn close(self, writer_stop: &CancellationToken) -> (Arc<Session>, SupervisorState) {
        let Self {
            session,
            lines,
            write_task,
            state,
            ..
        } = self;
        drop(lines);

        writer_stop.cancel();
        if let Some(task) = write_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Writer for {} ended with error: {}", session.id, e),
                Err(e) => warn!("Writer task for {} failed: {}", session.id, e),
            }
        }

        (session, state)
    }
}

/// Resolves when the writer task ends; pending forever once it has been reaped
async fn writer_exit(task: &mut Option<JoinHandle<Result<(), AppError>>>) -> TerminationCause {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    match handle.await {
        Ok(Ok(())) => TerminationCause::WriteFailed("outbound sink closed".to_string()),
        Ok(Err(e)) => TerminationCause::WriteFailed(e.to_string()),
        Err(e) => TerminationCause::WriteFailed(e.to_string()),
    }
}

fn advance(state: &mut SupervisorState, next: SupervisorState, session: &Session) {
    if !state.can_transition_to(next) {
        warn!(
            "Session {}: unexpected transition {:?} -> {:?}",
            session.id, state, next
        );
    }
    debug!("Session {}: {:?} -> {:?}", session.id, state, next);
    *state = next;
}

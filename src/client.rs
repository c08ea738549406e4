//! Terminal chat client
//!
//! Forwards local input lines to the server and prints every line the
//! server sends, until `/quit`, end of local input, or connection loss.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::AppError;
use crate::protocol::{is_quit, ChatLineCodec, QUIT_COMMAND};

/// Printed once the connection is up
pub const CONNECTED_BANNER: &str = "Connected to chat server. Type '/quit' to exit.";

/// Printed when the server side goes away
pub const DISCONNECTED: &str = "Disconnected from server";

/// How a client session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// User typed the quit command
    Quit,
    /// Local input reached end of file
    InputClosed,
    /// Server closed the connection or it failed
    Disconnected,
}

/// Connect to the configured server and chat over stdin/stdout
pub async fn run_client(config: &ChatConfig) -> Result<ClientExit, AppError> {
    let stream = TcpStream::connect(&config.connect_addr)
        .await
        .map_err(|source| AppError::Connect {
            addr: config.connect_addr.clone(),
            source,
        })?;
    debug!("Connected to {}", config.connect_addr);

    let (reader, writer) = stream.into_split();
    chat(reader, writer, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Relay lines between a server connection and a local terminal
///
/// Server lines are printed as they arrive while local input is read, so
/// neither direction waits on the other. Server lines carry a name prefix on
/// top of the sender's text, so they are read without a length limit.
pub async fn chat<R, W, I, O>(
    server_read: R,
    server_write: W,
    input: I,
    output: O,
) -> Result<ClientExit, AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut from_server = FramedRead::new(server_read, ChatLineCodec::new());
    let mut to_server = FramedWrite::new(server_write, ChatLineCodec::new());
    let mut local_input = FramedRead::new(input, ChatLineCodec::new());
    let mut local_output = FramedWrite::new(output, ChatLineCodec::new());

    local_output.send(CONNECTED_BANNER).await?;

    loop {
        tokio::select! {
            line = from_server.next() => match line {
                Some(Ok(line)) => local_output.send(line).await?,
                Some(Err(e)) => {
                    debug!("Server read failed: {}", e);
                    local_output.send(DISCONNECTED).await?;
                    return Ok(ClientExit::Disconnected);
                }
                None => {
                    local_output.send(DISCONNECTED).await?;
                    return Ok(ClientExit::Disconnected);
                }
            },
            line = local_input.next() => match line {
                Some(Ok(line)) if is_quit(&line) => {
                    if let Err(e) = to_server.send(QUIT_COMMAND).await {
                        debug!("Failed to send quit: {}", e);
                    }
                    return Ok(ClientExit::Quit);
                }
                Some(Ok(line)) => {
                    if let Err(e) = to_server.send(line).await {
                        debug!("Server write failed: {}", e);
                        local_output.send(DISCONNECTED).await?;
                        return Ok(ClientExit::Disconnected);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(ClientExit::InputClosed),
            },
        }
    }
}

//! Line protocol definitions
//!
//! Newline-delimited text in both directions. No framing beyond the line,
//! no acknowledgment, no heartbeat.

use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

/// First line sent to every new connection
pub const NAME_PROMPT: &str = "Enter your name:";

/// Token that ends a session (matched case-insensitively)
pub const QUIT_COMMAND: &str = "/quit";

/// Newline-framed text codec
///
/// A trailing `\r` is stripped and invalid UTF-8 is replaced with U+FFFD
/// rather than treated as an error.
#[derive(Debug, Clone)]
pub struct ChatLineCodec {
    inner: AnyDelimiterCodec,
}

impl ChatLineCodec {
    /// Codec with no line length limit
    pub fn new() -> Self {
        Self {
            inner: AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec()),
        }
    }

    /// Codec that rejects lines longer than `max_line_length` bytes
    pub fn new_with_max_length(max_line_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_line_length,
            ),
        }
    }
}

impl Default for ChatLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn into_line(chunk: Bytes) -> String {
    let text: &[u8] = &chunk;
    let text = text.strip_suffix(b"\r").unwrap_or(text);
    String::from_utf8_lossy(text).into_owned()
}

impl Decoder for ChatLineCodec {
    type Item = String;
    type Error = AnyDelimiterCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        Ok(self.inner.decode(buf)?.map(into_line))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        Ok(self.inner.decode_eof(buf)?.map(into_line))
    }
}

impl<T> Encoder<T> for ChatLineCodec
where
    T: AsRef<str>,
{
    type Error = AnyDelimiterCodecError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(line, dst)
    }
}

/// Build the line codec used for inbound client traffic
pub fn line_codec(max_line_length: usize) -> ChatLineCodec {
    ChatLineCodec::new_with_max_length(max_line_length)
}

/// Client → Server line after the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Leave the chat
    Quit,
    /// Any other text, broadcast verbatim
    Chat(String),
}

impl ClientLine {
    /// Classify one inbound line
    pub fn parse(line: String) -> Self {
        if is_quit(&line) {
            ClientLine::Quit
        } else {
            ClientLine::Chat(line)
        }
    }
}

/// Whether a line is the quit command
pub fn is_quit(line: &str) -> bool {
    line.eq_ignore_ascii_case(QUIT_COMMAND)
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Name prompt, sent once right after accept
    Prompt,
    /// Another session finished its handshake
    Joined { name: String },
    /// Another session disconnected
    Left { name: String },
    /// Chat text from another session
    Chat { from: String, text: String },
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLine::Prompt => f.write_str(NAME_PROMPT),
            ServerLine::Joined { name } => write!(f, "{} has joined the chat!", name),
            ServerLine::Left { name } => write!(f, "{} has left the chat!", name),
            ServerLine::Chat { from, text } => write!(f, "{}: {}", from, text),
        }
    }
}

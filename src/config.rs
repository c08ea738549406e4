//! Fixed runtime configuration
//!
//! There is no configuration file and no address flags. The binary always
//! uses `ChatConfig::default()`; tests build their own with an ephemeral port.

/// Port the server listens on and the client connects to
pub const DEFAULT_PORT: u16 = 12345;

/// Host the client connects to
pub const DEFAULT_HOST: &str = "localhost";

/// Longest accepted inbound line, in bytes
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Addresses and limits for one server or client run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Address the server binds to
    pub bind_addr: String,
    /// Address the client connects to
    pub connect_addr: String,
    /// Longest accepted line before the connection is dropped
    pub max_line_length: usize,
}

impl ChatConfig {
    /// Config for a server bound to the given address
    pub fn with_bind_addr(addr: impl Into<String>) -> Self {
        Self {
            bind_addr: addr.into(),
            ..Self::default()
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            connect_addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

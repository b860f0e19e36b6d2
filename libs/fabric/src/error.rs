use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not connect to {servers}: {reason}")]
    Connect { servers: String, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Request to '{subject}' timed out after {}ms", timeout.as_millis())]
    Timeout { subject: String, timeout: Duration },

    #[error("No responders for '{subject}'")]
    NoResponders { subject: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unsupported request data type: {0}")]
    UnsupportedType(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    pub fn connect(servers: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connect {
            servers: servers.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] pbxlink_fabric::Error),

    #[error("Invalid call: {0}")]
    InvalidCall(String),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Dial worker did not complete")]
    WorkerFailed,
}

impl Error {
    pub fn invalid_call(msg: impl Into<String>) -> Self {
        Self::InvalidCall(msg.into())
    }

    pub fn not_connected() -> Self {
        Self::Transport(pbxlink_fabric::Error::NotConnected)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_not_connected())
    }

    pub fn is_connect_error(&self) -> bool {
        matches!(self, Self::Transport(pbxlink_fabric::Error::Connect { .. }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

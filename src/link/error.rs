use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No route to link peer {0}")]
    UnknownPeer(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

pub type LinkResult<T> = Result<T, LinkError>;

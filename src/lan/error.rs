use thiserror::Error;

#[derive(Error, Debug)]
pub enum LanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind failed on {addr}: {source}")]
    BindFailed {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported message over LAN: {0}")]
    Unsupported(&'static str),

    #[error("Malformed rendezvous request: {0}")]
    MalformedRendezvous(String),
}

pub type LanResult<T> = Result<T, LanError>;

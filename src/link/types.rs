use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed size of payload chunks and acknowledgement reads
pub const CHUNK_SIZE: usize = 1024;

pub const START_OF_FILE: &[u8] = b"START_OF_FILE";
pub const READY: &[u8] = b"READY";
pub const FILE_EXISTS: &[u8] = b"FILE_EXISTS";
pub const EOF: &[u8] = b"EOF";
pub const START_OF_INSTANCE: &[u8] = b"START_OF_INSTANCE";
pub const END_OF_INSTANCE: &[u8] = b"END_OF_INSTANCE";

/// Acknowledgement written by the receiving side; senders discard its content
pub const ACK: &[u8] = b"ACK";

/// How a file exchange ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Content streamed in `chunks` chunks
    Sent { bytes: u64, chunks: u32 },

    /// The peer already holds a file with that name
    AlreadyPresent,
}

/// Short-range link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Hardware address to socket address map used by the TCP-backed connector
    pub peers: HashMap<String, SocketAddr>,

    /// Where received files are stored
    pub download_dir: PathBuf,

    /// Accept inbound link sessions on this address
    pub listen: Option<SocketAddr>,

    /// Bound on every read/write of a session
    pub io_timeout_ms: u64,

    /// Accept poll interval of the listener loop
    pub poll_timeout_ms: u64,
}

impl LinkConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            peers: HashMap::new(),
            download_dir: PathBuf::from("downloads"),
            listen: None,
            io_timeout_ms: 30_000,
            poll_timeout_ms: 1_500,
        }
    }
}

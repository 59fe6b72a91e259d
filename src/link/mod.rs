//! Short-range point-to-point link
//!
//! Framed request/response exchanges over one exclusively owned duplex
//! connection per exchange: plain text, stop-and-wait file transfer and
//! structured-instance transfer with an optional attached file.

pub mod adapter;
pub mod connector;
pub mod error;
pub mod receiver;
pub mod transmitter;
pub mod types;

pub use adapter::LinkAdapter;
pub use connector::{LinkConnector, TcpLinkConnector};
pub use error::{LinkError, LinkResult};
pub use receiver::LinkReceiver;
pub use transmitter::LinkTransmitter;
pub use types::{FileOutcome, LinkConfig, CHUNK_SIZE};

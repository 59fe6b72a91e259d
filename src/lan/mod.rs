//! Local-network adapter
//!
//! A stream endpoint and a datagram endpoint, each with its own service
//! loop. Datagram senders that cannot fit a payload in one datagram ask the
//! receiver to call them back over a stream connection.

pub mod adapter;
pub mod error;
pub mod types;
pub mod workers;

pub use adapter::LanAdapter;
pub use error::{LanError, LanResult};
pub use types::{LanConfig, LanProtocol, DATAGRAM_SIZE, START_OF_PACKET};

pub mod error;
pub mod queue;
pub mod types;

pub use error::{QueueError, QueueResult};
pub use queue::PriorityQueue;
pub use types::{priority_key, QueueStats, QueuedEnvelope, PRIORITY_CEILING};

use crate::message::Message;

/// Buffer every adapter pushes received payloads into
pub type InboundQueue = PriorityQueue<Message>;

/// Buffer the dispatcher's transmission loop drains
pub type OutboundQueue = PriorityQueue<QueuedEnvelope>;

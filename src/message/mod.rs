pub mod envelope;
pub mod types;

pub use envelope::{Envelope, EnvelopeBuilder, Outbound, DEFAULT_PRIORITY, DEFAULT_TTL};
pub use types::{Instance, Message, MessageVariant, TransportKind};

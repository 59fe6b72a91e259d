//! Priority dispatcher
//!
//! Admission into the outbound queue, the transmission loop and the
//! application side of the inbound queue.

pub mod dispatcher;
pub mod error;

pub use dispatcher::{Delivery, Dispatcher, IDLE_INTERVAL};
pub use error::{DispatchError, DispatchResult};

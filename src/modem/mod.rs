//! Serial text-messaging adapter
//!
//! One long-lived AT command session per device, a poll loop that drains
//! unread messages from device storage, and outbound text messages.

pub mod codes;
pub mod error;
#[cfg(feature = "serial")]
pub mod serial;
pub mod session;
pub mod sms;
pub mod types;

pub use codes::DeviceFault;
pub use error::{ModemError, ModemResult};
pub use session::{CommandOutput, ModemSession};
pub use sms::{InboundHook, SmsAdapter, SmsHook};
pub use types::{SmsConfig, SmsRecord};

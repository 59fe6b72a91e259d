use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Terminates the body of an outgoing text message (Ctrl-Z)
pub const END_OF_MESSAGE: char = '\x1a';

pub const LIST_RESPONSE: &str = "+CMGL";
pub const SEND_CONFIRMATION: &str = "+CMGS";
pub const OK: &str = "OK";

pub const LIST_UNREAD: &str = "AT+CMGL=\"REC UNREAD\"\r";
pub const PURGE_READ_AND_SENT: &str = "AT+CMGD=1,2\r";

/// Serial messaging adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub port: Option<String>,
    pub baud_rate: u32,

    /// How long a command waits for further response lines
    pub read_timeout_ms: u64,

    /// Pause between unread-message queries
    pub poll_interval_ms: u64,

    /// Outbound message-center number, without the leading `+`
    pub message_center: String,

    /// Stripped from sender numbers before the contact lookup
    pub country_prefix: String,

    /// Operator gateway whose messages are dropped without a warning
    pub system_sender: String,
}

impl SmsConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            read_timeout_ms: 5_000,
            poll_interval_ms: 3_000,
            message_center: String::new(),
            country_prefix: "+549".to_string(),
            system_sender: "876966".to_string(),
        }
    }
}

/// One unread message taken from a list response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRecord {
    /// Storage index on the device
    pub index: u32,
    pub sender: String,
    pub body: String,
}

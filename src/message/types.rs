use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Payload carried through the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    PlainText { body: String },
    FileRef { path: PathBuf },
    Instance(Instance),
}

/// Pre-built structured payload, optionally carrying a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<PathBuf>,
}

impl Message {
    pub fn text(body: impl Into<String>) -> Self {
        Message::PlainText { body: body.into() }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Message::FileRef { path: path.into() }
    }

    pub fn instance(payload: serde_json::Value) -> Self {
        Message::Instance(Instance {
            payload,
            attachment: None,
        })
    }

    pub fn instance_with_file(payload: serde_json::Value, path: impl Into<PathBuf>) -> Self {
        Message::Instance(Instance {
            payload,
            attachment: Some(path.into()),
        })
    }

    /// Interpret a bare string the way an application hands it over:
    /// a path to an existing file becomes a file reference, anything
    /// else is plain text.
    pub fn infer(input: &str) -> Self {
        if Path::new(input).is_file() {
            Message::file(input)
        } else {
            Message::text(input)
        }
    }

    pub fn variant(&self) -> MessageVariant {
        match self {
            Message::PlainText { .. } => MessageVariant::PlainText,
            Message::FileRef { .. } => MessageVariant::FileRef,
            Message::Instance(_) => MessageVariant::Instance,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::PlainText { body } => Some(body),
            _ => None,
        }
    }

    /// Serialized form used when an instance crosses a byte-oriented link
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl From<&str> for Message {
    fn from(body: &str) -> Self {
        Message::text(body)
    }
}

impl From<String> for Message {
    fn from(body: String) -> Self {
        Message::PlainText { body }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageVariant {
    PlainText,
    FileRef,
    Instance,
}

impl MessageVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageVariant::PlainText => "plain_text",
            MessageVariant::FileRef => "file_ref",
            MessageVariant::Instance => "instance",
        }
    }
}

/// Transports a message can be pinned to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Lan,
    Link,
    Sms,
}

impl TransportKind {
    /// Fallback order used when no transport is preferred
    pub const FALLBACK_ORDER: [TransportKind; 3] =
        [TransportKind::Lan, TransportKind::Link, TransportKind::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Lan => "lan",
            TransportKind::Link => "link",
            TransportKind::Sms => "sms",
        }
    }

    /// Whether this transport can carry `message` without losing its type.
    /// The LAN moves a single byte stream, so files and attachments need
    /// the link's file protocol.
    pub fn carries(&self, message: &Message) -> bool {
        match (self, message) {
            (TransportKind::Link, _) => true,
            (TransportKind::Lan, Message::PlainText { .. }) => true,
            (TransportKind::Lan, Message::Instance(instance)) => instance.attachment.is_none(),
            (TransportKind::Lan, Message::FileRef { .. }) => false,
            (TransportKind::Sms, message) => message.variant() == MessageVariant::PlainText,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use crate::message::types::{Message, TransportKind};
use std::time::Duration;

/// Priority stamped on messages that do not set one
pub const DEFAULT_PRIORITY: i32 = 10;

/// Time a message may wait in the outbound queue before being discarded
pub const DEFAULT_TTL: Duration = Duration::from_secs(20);

/// A payload plus its dispatch metadata.
///
/// Built once through [`EnvelopeBuilder`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    message: Message,
    destination: String,
    preferred_transport: Option<TransportKind>,
    priority: i32,
    ttl: Duration,
}

impl Envelope {
    pub fn builder(message: impl Into<Message>) -> EnvelopeBuilder {
        EnvelopeBuilder::new(message.into())
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn preferred_transport(&self) -> Option<TransportKind> {
        self.preferred_transport
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Copy of this envelope pinned to another transport
    pub(crate) fn with_preferred_transport(mut self, transport: Option<TransportKind>) -> Self {
        if transport.is_some() {
            self.preferred_transport = transport;
        }
        self
    }
}

/// Builder for envelopes
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    message: Message,
    destination: Option<String>,
    preferred_transport: Option<TransportKind>,
    priority: i32,
    ttl: Duration,
}

impl EnvelopeBuilder {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            destination: None,
            preferred_transport: None,
            priority: DEFAULT_PRIORITY,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn preferred_transport(mut self, transport: TransportKind) -> Self {
        self.preferred_transport = Some(transport);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns `None` when no destination was given
    pub fn build(self) -> Option<Envelope> {
        let destination = self.destination?;
        Some(Envelope {
            message: self.message,
            destination,
            preferred_transport: self.preferred_transport,
            priority: self.priority,
            ttl: self.ttl,
        })
    }
}

/// What an application hands to `send`: either a bare payload, which
/// needs a receiver, or a complete envelope.
#[derive(Debug, Clone)]
pub enum Outbound {
    Payload(Message),
    Envelope(Envelope),
}

impl From<Message> for Outbound {
    fn from(message: Message) -> Self {
        Outbound::Payload(message)
    }
}

impl From<Envelope> for Outbound {
    fn from(envelope: Envelope) -> Self {
        Outbound::Envelope(envelope)
    }
}

impl From<&str> for Outbound {
    fn from(input: &str) -> Self {
        Outbound::Payload(Message::infer(input))
    }
}

impl From<String> for Outbound {
    fn from(input: String) -> Self {
        Outbound::Payload(Message::infer(&input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let envelope = Envelope::builder("hola")
            .destination("client01")
            .build()
            .unwrap();

        assert_eq!(envelope.priority(), DEFAULT_PRIORITY);
        assert_eq!(envelope.ttl(), DEFAULT_TTL);
        assert_eq!(envelope.destination(), "client01");
        assert!(envelope.preferred_transport().is_none());
    }

    #[test]
    fn test_builder_requires_destination() {
        assert!(Envelope::builder("orphan").priority(50).build().is_none());
    }

    #[test]
    fn test_preferred_transport_override() {
        let envelope = Envelope::builder("x")
            .destination("client01")
            .preferred_transport(TransportKind::Sms)
            .build()
            .unwrap();

        let kept = envelope.clone().with_preferred_transport(None);
        assert_eq!(kept.preferred_transport(), Some(TransportKind::Sms));

        let pinned = envelope.with_preferred_transport(Some(TransportKind::Lan));
        assert_eq!(pinned.preferred_transport(), Some(TransportKind::Lan));
    }
}

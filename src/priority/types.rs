use crate::message::Envelope;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Upper bound of the priority scale; the queue key is `PRIORITY_CEILING - priority`
pub const PRIORITY_CEILING: i64 = 100;

/// Ordering key for a priority: smaller keys dequeue first
pub fn priority_key(priority: i32) -> i64 {
    PRIORITY_CEILING - priority as i64
}

/// Envelope as stored in the outbound queue
#[derive(Debug, Clone)]
pub struct QueuedEnvelope {
    pub id: Uuid,
    pub envelope: Envelope,
    pub enqueued_at: Instant,
    pub timestamp: DateTime<Utc>,
}

impl QueuedEnvelope {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            envelope,
            enqueued_at: Instant::now(),
            timestamp: Utc::now(),
        }
    }

    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// A message whose time in the queue reached its ttl is discarded unsent
    pub fn is_expired(&self) -> bool {
        self.wait_time() >= self.envelope.ttl()
    }

    pub fn key(&self) -> i64 {
        priority_key(self.envelope.priority())
    }
}

/// Running totals of one queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_key() {
        assert_eq!(priority_key(10), 90);
        assert_eq!(priority_key(100), 0);
        assert!(priority_key(80) < priority_key(10));
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let envelope = Envelope::builder("late")
            .destination("client01")
            .ttl(Duration::ZERO)
            .build()
            .unwrap();

        assert!(QueuedEnvelope::new(envelope).is_expired());
    }

    #[test]
    fn test_default_ttl_not_expired() {
        let envelope = Envelope::builder("fresh")
            .destination("client01")
            .build()
            .unwrap();

        assert!(!QueuedEnvelope::new(envelope).is_expired());
    }
}

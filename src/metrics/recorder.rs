//! Metrics recorder for relay operations

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!(
        "commrelay_messages_enqueued_total",
        "Messages accepted into the outbound queue"
    );
    describe_counter!(
        "commrelay_messages_rejected_total",
        "Messages refused at admission"
    );
    describe_counter!(
        "commrelay_messages_delivered_total",
        "Delivery attempts that succeeded"
    );
    describe_counter!(
        "commrelay_messages_failed_total",
        "Delivery attempts that failed"
    );
    describe_counter!(
        "commrelay_messages_expired_total",
        "Messages discarded unsent after their ttl"
    );
    describe_counter!(
        "commrelay_messages_received_total",
        "Messages pushed into the inbound queue"
    );
    describe_counter!(
        "commrelay_device_errors_total",
        "Error markers reported by the serial device"
    );

    describe_counter!(
        "commrelay_payload_errors_total",
        "Messages a transport could not turn into a payload"
    );

    describe_gauge!(
        "commrelay_queue_depth",
        "Current number of items in a queue"
    );

    describe_histogram!(
        "commrelay_queue_wait_seconds",
        "Time a message waited in the outbound queue"
    );
}

/// Record a message accepted for transmission
pub fn record_enqueued(priority: i32) {
    counter!("commrelay_messages_enqueued_total", "priority" => priority.to_string())
        .increment(1);
}

/// Record an admission rejection
pub fn record_rejected(reason: &'static str) {
    counter!("commrelay_messages_rejected_total", "reason" => reason).increment(1);
}

/// Record the outcome of one delivery attempt
pub fn record_delivery(transport: &'static str, delivered: bool, waited: Duration) {
    if delivered {
        counter!("commrelay_messages_delivered_total", "transport" => transport).increment(1);
    } else {
        counter!("commrelay_messages_failed_total", "transport" => transport).increment(1);
    }
    histogram!("commrelay_queue_wait_seconds").record(waited.as_secs_f64());
}

/// Record a message dropped after its ttl
pub fn record_expired() {
    counter!("commrelay_messages_expired_total").increment(1);
}

/// Record a message landing in the inbound queue
pub fn record_received(transport: &'static str) {
    counter!("commrelay_messages_received_total", "transport" => transport).increment(1);
}

/// Record an error marker returned by the modem
pub fn record_device_error(kind: &'static str) {
    counter!("commrelay_device_errors_total", "kind" => kind).increment(1);
}

/// Record a message a transport refused or failed to encode
pub fn record_payload_error(transport: &'static str) {
    counter!("commrelay_payload_errors_total", "transport" => transport).increment(1);
}

/// Update queue depth gauge
pub fn set_queue_depth(queue: &'static str, depth: usize) {
    gauge!("commrelay_queue_depth", "queue" => queue).set(depth as f64);
}

//! Metrics and observability module
//!
//! Key metrics exposed:
//! - Admission outcomes (enqueued, rejected by reason)
//! - Delivery outcomes per transport and expiries
//! - Inbound traffic per transport
//! - Queue depths

pub mod exporter;
pub mod recorder;

pub use exporter::{render_metrics, start_metrics_server, MetricsConfig, MetricsError};
pub use recorder::{
    init_metrics, record_delivery, record_device_error, record_enqueued, record_expired,
    record_payload_error, record_received, record_rejected, set_queue_depth,
};

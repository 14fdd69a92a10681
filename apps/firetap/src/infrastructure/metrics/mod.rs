//! Metrics Instrumentation
//!
//! Stream lifecycle counters recorded through the `metrics` facade. The
//! library never installs a recorder; the embedding binary decides whether
//! and how metrics are exported. Without a recorder every call here is a
//! no-op.
//!
//! The loss counter is the observability half of the retry policy: redials
//! are immediate and unbounded, so a persistently failing endpoint shows up
//! as a fast-growing `firetap_connection_losses_total` rather than as an
//! error surfaced to the consumer.

use metrics::{counter, describe_counter};

/// Register metric descriptions. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "firetap_connections_opened_total",
        "Connection attempts opened against the filter endpoint"
    );
    describe_counter!(
        "firetap_recycles_total",
        "Forced connection recycles triggered by the keepalive timer"
    );
    describe_counter!(
        "firetap_connection_losses_total",
        "Connection losses by kind; each one triggers an immediate redial"
    );
    describe_counter!(
        "firetap_records_delivered_total",
        "Annotated records handed to the consumer"
    );
}

/// Record a connection attempt.
pub fn record_connection_opened() {
    counter!("firetap_connections_opened_total").increment(1);
}

/// Record a forced recycle.
pub fn record_recycle() {
    counter!("firetap_recycles_total").increment(1);
}

/// Record a connection loss with its kind label.
pub fn record_connection_loss(kind: &'static str) {
    counter!("firetap_connection_losses_total", "kind" => kind).increment(1);
}

/// Record one record delivered to the consumer.
pub fn record_record_delivered() {
    counter!("firetap_records_delivered_total").increment(1);
}

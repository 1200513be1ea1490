//! Metric descriptions for observability

use metrics::{describe_counter, describe_histogram};

/// Register descriptions for every metric rollcall emits
pub fn init_metrics() {
    // Identity link protocol
    describe_counter!("link.started", "Authorization round trips started");
    describe_counter!("link.completed", "Identity exchanges completed");
    describe_counter!("link.flagged", "Completed links that tripped the deny-list");
    describe_counter!("link.failed", "Identity exchanges that failed upstream");

    // Timeout sweep
    describe_counter!("sweep.examined", "Pending memberships examined per sweep");
    describe_counter!("sweep.kicked", "Members removed for missing the deadline");
    describe_counter!("sweep.reminded", "Deadline reminders attempted");
    describe_counter!("sweep.failed", "Sweep units that failed and will retry");
    describe_histogram!("sweep.duration_ms", "Wall time of one full sweep in milliseconds");

    // Rally dispatch
    describe_counter!("rally.dispatches", "Rally dispatches that moved at least one member");
    describe_counter!("rally.moved", "Members relocated by rally dispatches");
    describe_counter!("rally.failed", "Relocations that failed during rally dispatches");
}

//! Topology and routing metrics
//!
//! Emitted through the `metrics` facade; install any recorder/exporter to
//! collect them:
//! - Probe outcomes and latency per node
//! - Node role and availability
//! - Node selection failures
//! - Command duration and errors
//! - Pool connection churn

use crate::node::Role;
use std::time::{Duration, Instant};

/// Record the outcome of an ismaster probe
pub fn record_probe(address: &str, success: bool, duration: Duration) {
    let status = if success { "ok" } else { "error" };
    metrics::counter!(
        "shoal_probes_total",
        "address" => address.to_string(),
        "status" => status,
    )
    .increment(1);

    if success {
        metrics::histogram!(
            "shoal_probe_duration_seconds",
            "address" => address.to_string(),
        )
        .record(duration.as_secs_f64());
    }
}

/// Update node role gauge after a probe
pub fn update_node_role(address: &str, role: Role, available: bool) {
    let value = match (available, role) {
        (false, _) => 0.0,
        (true, Role::Unknown) => 1.0,
        (true, Role::Secondary) => 2.0,
        (true, Role::Primary) => 3.0,
    };

    metrics::gauge!(
        "shoal_node_role",
        "address" => address.to_string(),
    )
    .set(value);
}

/// Record a completed refresh pass
pub fn record_refresh_pass(duration: Duration) {
    metrics::counter!("shoal_refresh_passes_total").increment(1);
    metrics::histogram!("shoal_refresh_pass_duration_seconds").record(duration.as_secs_f64());
}

/// Record that no node matched a read preference in time
pub fn record_selection_failure(read_preference: &str) {
    metrics::counter!(
        "shoal_selection_failures_total",
        "read_preference" => read_preference.to_string(),
    )
    .increment(1);
}

/// Record a new connection opened by a pool
pub fn record_connection_established(address: &str) {
    metrics::counter!(
        "shoal_connections_opened_total",
        "address" => address.to_string(),
    )
    .increment(1);
}

/// Record a connection closed instead of being pooled
pub fn record_connection_evicted(address: &str) {
    metrics::counter!(
        "shoal_connections_evicted_total",
        "address" => address.to_string(),
    )
    .increment(1);
}

/// Record idle connection count for a pool
pub fn record_idle_connections(address: &str, count: usize) {
    metrics::gauge!(
        "shoal_pool_idle_connections",
        "address" => address.to_string(),
    )
    .set(count as f64);
}

/// Timer for measuring command duration
pub struct CommandTimer {
    verb: String,
    read_preference: &'static str,
    start: Instant,
}

impl CommandTimer {
    pub fn new(verb: &str, read_preference: &'static str) -> Self {
        Self {
            verb: verb.to_string(),
            read_preference,
            start: Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        let duration = self.start.elapsed();
        metrics::histogram!(
            "shoal_command_duration_seconds",
            "command" => self.verb.clone(),
            "read_preference" => self.read_preference,
        )
        .record(duration.as_secs_f64());
        metrics::counter!(
            "shoal_commands_total",
            "command" => self.verb,
            "status" => "ok",
        )
        .increment(1);
    }

    /// Record failure
    pub fn error(self, error_type: &'static str) {
        metrics::counter!(
            "shoal_commands_total",
            "command" => self.verb.clone(),
            "status" => "error",
        )
        .increment(1);
        metrics::counter!(
            "shoal_command_errors_total",
            "command" => self.verb,
            "error_type" => error_type,
        )
        .increment(1);
    }
}

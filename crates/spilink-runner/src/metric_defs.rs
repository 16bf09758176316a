//! Metric declarations for the bridge.
//!
//! Counters are recorded through the `metrics` facade; they cost nothing
//! unless the embedding process installs a recorder.

use metrics::{describe_counter, Unit};
use tracing::trace;

/// A counter declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "spilink.bus.transfers").
    pub name: &'static str,
    /// Human-readable description of the metric.
    pub description: &'static str,
    /// The unit of measurement.
    pub unit: Unit,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter with the given name, counted in [`Unit::Count`].
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            description: "",
            unit: Unit::Count,
            labels: &[],
        }
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        describe_counter!(self.name, self.unit, self.description);
        trace!("registered counter {} labels={:?}", self.name, self.labels);
    }

    /// Whether `key` is one of the declared label keys.
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains(&key)
    }
}

/// Full-duplex transfers performed, headers and payloads alike.
///
/// Labels: kind (`header` or `payload`)
pub const BUS_TRANSFERS: Metric = Metric::counter("spilink.bus.transfers")
    .with_description("SPI transfers performed")
    .with_labels(&["kind"]);

/// Requests answered with `Busy` and re-issued.
///
/// Labels: request
pub const BUSY_RETRIES: Metric = Metric::counter("spilink.exchange.busy_retries")
    .with_description("Requests re-issued after a busy response")
    .with_labels(&["request"]);

/// Requests refused with an error code.
///
/// Labels: request, code
pub const REJECTED_REQUESTS: Metric = Metric::counter("spilink.exchange.rejected")
    .with_description("Requests rejected by the controller")
    .with_labels(&["request", "code"]);

/// Protocol violations observed.
pub const PROTOCOL_VIOLATIONS: Metric = Metric::counter("spilink.exchange.protocol_violations")
    .with_description("Headers that violated the protocol");

/// Command bytes handed to the controller.
pub const COMMAND_BYTES: Metric = Metric::counter("spilink.channel.command_bytes")
    .with_description("Command text bytes submitted to the controller")
    .with_unit(Unit::Bytes);

/// Reply bytes relayed to the text channel.
pub const REPLY_BYTES: Metric = Metric::counter("spilink.channel.reply_bytes")
    .with_description("Reply text bytes relayed from the controller")
    .with_unit(Unit::Bytes);

/// All metrics, for bulk registration.
pub const ALL_METRICS: &[Metric] = &[
    BUS_TRANSFERS,
    BUSY_RETRIES,
    REJECTED_REQUESTS,
    PROTOCOL_VIOLATIONS,
    COMMAND_BYTES,
    REPLY_BYTES,
];

/// Describe every metric. Call once at startup after installing a recorder.
pub fn describe_metrics() {
    for metric in ALL_METRICS {
        metric.describe();
    }
}

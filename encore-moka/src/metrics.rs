//! Moka backend occupancy metrics.
//!
//! Enable the `metrics` feature to publish:
//!
//! - `encore_moka_entries` - number of stored responses (gauge)
//! - `encore_moka_size_bytes` - weighted size in bytes (gauge)
//!
//! Both carry a `backend` label.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for the entry count gauge.
    pub static ref MOKA_ENTRIES: &'static str = {
        metrics::describe_gauge!(
            "encore_moka_entries",
            "Number of responses held by the Moka backend."
        );
        "encore_moka_entries"
    };

    /// Metric name for the weighted size gauge.
    pub static ref MOKA_SIZE_BYTES: &'static str = {
        metrics::describe_gauge!(
            "encore_moka_size_bytes",
            "Weighted size of the Moka backend in bytes."
        );
        "encore_moka_size_bytes"
    };
}

/// Publishes the current occupancy of the backend labelled `backend`.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_occupancy(backend: &str, entries: u64, size_bytes: u64) {
    metrics::gauge!(*MOKA_ENTRIES, "backend" => backend.to_string()).set(entries as f64);
    metrics::gauge!(*MOKA_SIZE_BYTES, "backend" => backend.to_string()).set(size_bytes as f64);
}

/// No-op without the `metrics` feature.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_occupancy(_backend: &str, _entries: u64, _size_bytes: u64) {}

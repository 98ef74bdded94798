//! Metrics declaration and recording.
//!
//! With the `metrics` feature enabled every actor reports, labelled by its name:
//!
//! - `encore_cache_hit_total` - answered from storage
//! - `encore_coalesced_total` - waited on another caller's execution
//! - `encore_action_executed_total` - actions that ran to completion
//! - `encore_action_failed_total` - actions that returned an error
//! - `encore_action_duration_seconds` - action run time
//!
//! Without the feature the recording functions compile to nothing.

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of requests answered from storage.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "encore_cache_hit_total",
            "Total number of requests answered from a stored response."
        );
        "encore_cache_hit_total"
    };
    /// Track number of requests that awaited an in-flight execution.
    pub static ref COALESCED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "encore_coalesced_total",
            "Total number of requests that awaited another request's execution."
        );
        "encore_coalesced_total"
    };
    /// Track number of executed actions.
    pub static ref ACTION_EXECUTED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "encore_action_executed_total",
            "Total number of actions executed."
        );
        "encore_action_executed_total"
    };
    /// Track number of failed actions.
    pub static ref ACTION_FAILED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "encore_action_failed_total",
            "Total number of actions that returned an error."
        );
        "encore_action_failed_total"
    };
    /// Histogram of action run time.
    pub static ref ACTION_DURATION: &'static str = {
        metrics::describe_histogram!(
            "encore_action_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of executed actions in seconds."
        );
        "encore_action_duration_seconds"
    };
}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_hit(actor: &str) {
    metrics::counter!(*CACHE_HIT_COUNTER, "actor" => actor.to_string()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_hit(_actor: &str) {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_coalesced(actor: &str) {
    metrics::counter!(*COALESCED_COUNTER, "actor" => actor.to_string()).increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_coalesced(_actor: &str) {}

#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_action(actor: &str, duration: Duration, succeeded: bool) {
    let name = if succeeded {
        *ACTION_EXECUTED_COUNTER
    } else {
        *ACTION_FAILED_COUNTER
    };
    metrics::counter!(name, "actor" => actor.to_string()).increment(1);
    metrics::histogram!(*ACTION_DURATION, "actor" => actor.to_string())
        .record(duration.as_secs_f64());
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_action(_actor: &str, _duration: Duration, _succeeded: bool) {}

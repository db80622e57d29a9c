//! Prometheus metrics collection for parley.
//!
//! Exposed on an HTTP endpoint (see [`crate::http`]).
//!
//! - `parley_events_total{event}` - Client events processed by name
//! - `parley_event_duration_seconds{event}` - Event handling latency
//! - `parley_event_errors_total{event,error}` - Failed events by error code
//! - `parley_broadcast_fanout` - Handles reached per room broadcast

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Messages persisted (sends and forwards).
pub static MESSAGES_PERSISTED: OnceLock<IntCounter> = OnceLock::new();

/// Outbound frames dropped because a handle's queue was full or closed.
pub static FRAMES_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Inbound events rejected by the per-connection rate limiter.
pub static RATE_LIMITED: OnceLock<IntCounter> = OnceLock::new();

/// Upgrades refused by the token check.
pub static AUTH_REJECTED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

/// Live connection handles.
pub static CONNECTED_HANDLES: OnceLock<IntGauge> = OnceLock::new();

/// Identities with at least one live handle.
pub static ONLINE_IDENTITIES: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Per-event metrics
// ========================================================================

pub static EVENT_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

pub static EVENT_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

pub static EVENT_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Handles reached per room broadcast.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded. Calling
/// it again is harmless.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                let m = $init.expect(concat!(stringify!($metric), " creation failed"));
                if let Err(e) = r.register(Box::new(m.clone())) {
                    tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                }
                let _ = $metric.set(m);
            }
        };
    }

    register!(MESSAGES_PERSISTED, IntCounter::new("parley_messages_persisted_total", "Messages persisted"));
    register!(FRAMES_DROPPED, IntCounter::new("parley_frames_dropped_total", "Outbound frames dropped due to backpressure or closed handles"));
    register!(RATE_LIMITED, IntCounter::new("parley_rate_limited_total", "Inbound events rejected by rate limiting"));
    register!(AUTH_REJECTED, IntCounter::new("parley_auth_rejected_total", "Connections refused by token verification"));
    register!(CONNECTED_HANDLES, IntGauge::new("parley_connected_handles", "Live connection handles"));
    register!(ONLINE_IDENTITIES, IntGauge::new("parley_online_identities", "Identities with at least one live handle"));

    register!(EVENT_COUNTER, IntCounterVec::new(Opts::new("parley_events_total", "Client events processed by name"), &["event"]));
    register!(EVENT_LATENCY, HistogramVec::new(
        HistogramOpts::new("parley_event_duration_seconds", "Client event latency by name")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["event"]));
    register!(EVENT_ERRORS, IntCounterVec::new(Opts::new("parley_event_errors_total", "Client event errors by name and code"), &["event", "error"]));
    register!(BROADCAST_FANOUT, Histogram::with_opts(
        HistogramOpts::new("parley_broadcast_fanout", "Handles reached per room broadcast")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Record an event execution with latency.
#[inline]
pub fn record_event(event: &str, duration_secs: f64) {
    if let Some(c) = EVENT_COUNTER.get() {
        c.with_label_values(&[event]).inc();
    }
    if let Some(h) = EVENT_LATENCY.get() {
        h.with_label_values(&[event]).observe(duration_secs);
    }
}

/// Record a failed event.
#[inline]
pub fn record_event_error(event: &str, error: &str) {
    if let Some(c) = EVENT_ERRORS.get() {
        c.with_label_values(&[event, error]).inc();
    }
}

/// Record how many handles a room broadcast reached.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn inc(counter: &OnceLock<IntCounter>) {
    if let Some(c) = counter.get() {
        c.inc();
    }
}

#[inline]
pub fn set_gauge(gauge: &OnceLock<IntGauge>, value: usize) {
    if let Some(g) = gauge.get() {
        g.set(value as i64);
    }
}

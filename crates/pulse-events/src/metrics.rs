//! Prometheus metrics for the event bus

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

/// Events handed to the broker, by routing key
pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_events_published_total",
        "Total number of events published",
        &["routing_key"]
    )
    .expect("Failed to register pulse_events_published_total metric")
});

/// Events the broker rejected or never acknowledged
pub static EVENTS_PUBLISH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_events_publish_failures_total",
        "Total number of events that failed to publish",
        &["routing_key"]
    )
    .expect("Failed to register pulse_events_publish_failures_total metric")
});

pub static EVENTS_CONSUMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_events_consumed_total",
        "Total number of events handled successfully",
        &["queue", "routing_key"]
    )
    .expect("Failed to register pulse_events_consumed_total metric")
});

/// Failed handler attempts (each retry counts)
pub static EVENT_HANDLER_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_event_handler_failures_total",
        "Total number of failed event handler attempts",
        &["queue", "routing_key"]
    )
    .expect("Failed to register pulse_event_handler_failures_total metric")
});

pub static EVENTS_DEAD_LETTERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pulse_events_dead_lettered_total",
        "Total number of events moved to the dead-letter queue",
        &["queue", "routing_key"]
    )
    .expect("Failed to register pulse_events_dead_lettered_total metric")
});

pub static EVENT_HANDLER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pulse_event_handler_duration_seconds",
        "Event handler latency in seconds",
        &["queue"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register pulse_event_handler_duration_seconds metric")
});

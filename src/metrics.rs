// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

// Without the observability feature the macros only borrow their arguments.
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = (&$name, &$value $(, &$label, &$label_value)*);
    }};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$name;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = (&$name, &$value $(, &$label, &$label_value)*);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = (&$name, &$value $(, &$label, &$label_value)*);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = &$name;
        $(let _ = (&$label, &$label_value);)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {{
        let _ = (&$name, &$unit, &$desc);
    }};
    ($name:expr, $desc:expr) => {{
        let _ = (&$name, &$desc);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {{
        let _ = (&$name, &$desc);
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {{
        let _ = (&$name, &$unit, &$desc);
    }};
    ($name:expr, $desc:expr) => {{
        let _ = (&$name, &$desc);
    }};
}

#[cfg(not(feature = "observability"))]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

use std::time::Duration;

/// Registers descriptions for every metric the SDK emits. Call once at startup.
pub fn describe_metrics() {
    describe_counter!("discovery_runs_total", "Completed discovery runs.");
    describe_gauge!("discovery_expected_units", "Units (addresses or factory indexes) in the last discovery run.");
    describe_gauge!("discovery_pools_discovered", "Pools built by the last discovery run.");
    describe_counter!("discovery_units_dropped_total", "Discovery units dropped after a transport or integrity failure.");
    describe_histogram!("discovery_duration_ms", "Wall time of a discovery run.");

    describe_gauge!("graph_nodes", "Tokens currently in the graph.");
    describe_gauge!("graph_edges", "Pools currently in the graph.");
    describe_counter!("trim_edges_removed_total", "Pools removed by liquidity trimming.");

    describe_counter!("refresh_total", "Completed per-block reserve refreshes.");
    describe_counter!("refresh_pool_failures_total", "Pools whose reserve refresh failed.");
    describe_counter!("refresh_heads_skipped_total", "Heads collapsed by catch-up refreshes.");
    describe_gauge!("refresh_pools_refreshed", "Pools refreshed by the last reserve refresh.");
    describe_histogram!("refresh_duration_ms", "Wall time of a full reserve refresh.");
}

pub fn record_discovery(expected: usize, discovered: usize, dropped: usize, elapsed: Duration) {
    increment_counter!("discovery_runs_total");
    gauge!("discovery_expected_units", expected as f64);
    gauge!("discovery_pools_discovered", discovered as f64);
    counter!("discovery_units_dropped_total", dropped as u64);
    histogram!("discovery_duration_ms", elapsed.as_millis() as f64);
}

pub fn record_graph_size(nodes: usize, edges: usize) {
    gauge!("graph_nodes", nodes as f64);
    gauge!("graph_edges", edges as f64);
}

pub fn record_trim(edges_removed: usize) {
    counter!("trim_edges_removed_total", edges_removed as u64);
}

pub fn record_refresh(refreshed: usize, failed: usize, skipped: usize, elapsed: Duration) {
    increment_counter!("refresh_total");
    counter!("refresh_pool_failures_total", failed as u64);
    counter!("refresh_heads_skipped_total", skipped as u64);
    gauge!("refresh_pools_refreshed", refreshed as f64);
    histogram!("refresh_duration_ms", elapsed.as_millis() as f64);
}

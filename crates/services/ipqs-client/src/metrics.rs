use prometheus::{
    opts, register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use lazy_static::lazy_static;

lazy_static! {
    pub static ref LOOKUP_CACHE_HITS_TOTAL: IntCounter =
        register_int_counter!(
            opts!("ipqs_lookup_cache_hits_total", "Lookups answered from a fresh cache entry")
        ).unwrap();

    pub static ref LOOKUP_CACHE_MISSES_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("ipqs_lookup_cache_misses_total", "Lookups that required a backend round trip"),
            &["reason"] // "absent", "expired" or "disabled"
        ).unwrap();

    pub static ref LOOKUP_ROUND_TRIPS_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("ipqs_lookup_round_trips_total", "Completed backend round trips, by verdict"),
            &["verdict"]
        ).unwrap();

    pub static ref LOOKUP_TRANSPORT_FAILURES_TOTAL: IntCounter =
        register_int_counter!(
            opts!("ipqs_lookup_transport_failures_total", "Round trips that failed below the HTTP layer")
        ).unwrap();

    pub static ref LOOKUP_CANCELLATIONS_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("ipqs_lookup_cancellations_total", "Lookups abandoned before the backend answered"),
            &["reason"] // "cancelled" or "deadline"
        ).unwrap();

    pub static ref LOOKUP_CACHE_SIZE: IntGauge =
        register_int_gauge!(
            opts!("ipqs_lookup_cache_size", "Entries held across all verdict caches, expired ones included")
        ).unwrap();
}

/// Renders every registered metric in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_contains_lookup_metrics() {
        LOOKUP_CACHE_HITS_TOTAL.inc();
        LOOKUP_ROUND_TRIPS_TOTAL.with_label_values(&["good"]).inc();
        let text = gather_text();
        assert!(text.contains("ipqs_lookup_cache_hits_total"));
        assert!(text.contains("ipqs_lookup_round_trips_total"));
    }
}

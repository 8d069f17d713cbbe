//! Prometheus-compatible `/metrics` endpoint.
//!
//! All metrics are derived from the in-memory ring-buffer window. Because the
//! buffer has a fixed capacity, values represent a **sliding window** of recent
//! requests rather than lifetime counters. Use `TYPE gauge` throughout for
//! semantic accuracy — values may decrease as old entries rotate out.
//!
//! Metric families:
//! - `route_gateway_window_size`        — entries currently in the ring buffer
//! - `route_gateway_requests`           — per-tier/basis/outcome request counts
//! - `route_gateway_latency_ms_sum`     — sum of latencies per tier (for avg)
//! - `route_gateway_latency_ms_count`   — denominator matching the sum above
//! - `route_gateway_fallbacks_total`    — requests that used availability fallback
//! - `route_gateway_errors_total`       — requests that returned an error

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::router::RouterState;

/// `GET /metrics` — renders Prometheus text format.
pub async fn metrics(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
    let entries = state.traffic.recent(usize::MAX).await;

    let window_size = entries.len();
    let mut fallbacks: u64 = 0;
    let mut errors: u64 = 0;

    // (tier, basis, success) -> count
    let mut request_counts: HashMap<(String, String, bool), u64> = HashMap::new();
    // tier -> (latency_sum_ms, count)
    let mut latency: HashMap<String, (u64, u64)> = HashMap::new();

    for e in &entries {
        if e.fell_back {
            fallbacks += 1;
        }
        if !e.success {
            errors += 1;
        }

        *request_counts
            .entry((e.chosen_tier.clone(), e.basis.clone(), e.success))
            .or_default() += 1;

        let lat = latency.entry(e.chosen_tier.clone()).or_default();
        lat.0 += e.latency_ms;
        lat.1 += 1;
    }

    let mut out = String::with_capacity(1024);

    out.push_str("# HELP route_gateway_window_size Number of requests currently held in the ring-buffer window.\n");
    out.push_str("# TYPE route_gateway_window_size gauge\n");
    out.push_str(&format!("route_gateway_window_size {window_size}\n\n"));

    out.push_str("# HELP route_gateway_requests Request count in the current window, labelled by tier, basis, and outcome.\n");
    out.push_str("# TYPE route_gateway_requests gauge\n");
    let mut req_rows: Vec<_> = request_counts.iter().collect();
    req_rows.sort_by(|a, b| a.0.cmp(b.0));
    for ((tier, basis, success), count) in req_rows {
        let success_str = if *success { "true" } else { "false" };
        out.push_str(&format!(
            "route_gateway_requests{{tier=\"{tier}\",basis=\"{basis}\",success=\"{success_str}\"}} {count}\n"
        ));
    }
    out.push('\n');

    out.push_str("# HELP route_gateway_latency_ms_sum Sum of request latency (ms) in the current window, grouped by tier.\n");
    out.push_str("# TYPE route_gateway_latency_ms_sum gauge\n");
    out.push_str("# HELP route_gateway_latency_ms_count Number of observations for the latency sum above.\n");
    out.push_str("# TYPE route_gateway_latency_ms_count gauge\n");
    let mut lat_rows: Vec<_> = latency.iter().collect();
    lat_rows.sort_by(|a, b| a.0.cmp(b.0));
    for (tier, (sum, count)) in lat_rows {
        out.push_str(&format!("route_gateway_latency_ms_sum{{tier=\"{tier}\"}} {sum}\n"));
        out.push_str(&format!("route_gateway_latency_ms_count{{tier=\"{tier}\"}} {count}\n"));
    }
    out.push('\n');

    out.push_str("# HELP route_gateway_fallbacks_total Requests that retried on the opposite tier under availability mode, in the current window.\n");
    out.push_str("# TYPE route_gateway_fallbacks_total gauge\n");
    out.push_str(&format!("route_gateway_fallbacks_total {fallbacks}\n\n"));

    out.push_str("# HELP route_gateway_errors_total Requests that returned an error in the current window.\n");
    out.push_str("# TYPE route_gateway_errors_total gauge\n");
    out.push_str(&format!("route_gateway_errors_total {errors}\n"));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        out,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        decision::{Basis, RoutingDecision},
        models::Tier,
        traffic::{TrafficEntry, TrafficLog},
    };

    fn entry(tier: Tier, latency_ms: u64, success: bool, fell_back: bool) -> TrafficEntry {
        let decision = RoutingDecision::new("q".into(), tier, "gpt-4o".into(), None, Basis::Difficulty);
        let e = TrafficEntry::from_decision(&decision, latency_ms, success);
        if fell_back {
            e.mark_fell_back()
        } else {
            e
        }
    }

    fn mock_log() -> Arc<TrafficLog> {
        let log = Arc::new(TrafficLog::new(100));
        log.push(entry(Tier::Strong, 120, true, false));
        log.push(entry(Tier::Strong, 95, true, false));
        log.push(entry(Tier::Weak, 430, true, false));
        log.push(entry(Tier::Strong, 80, false, false));
        log
    }

    #[tokio::test]
    async fn window_size_equals_entry_count() {
        let log = mock_log();
        let entries = log.recent(usize::MAX).await;
        assert_eq!(entries.len(), 4);
    }

    #[tokio::test]
    async fn error_count_is_accurate() {
        let log = mock_log();
        let entries = log.recent(usize::MAX).await;
        let errors = entries.iter().filter(|e| !e.success).count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn latency_sum_is_accurate() {
        let log = mock_log();
        let entries = log.recent(usize::MAX).await;
        let sum: u64 = entries
            .iter()
            .filter(|e| e.chosen_tier == "strong")
            .map(|e| e.latency_ms)
            .sum();
        // 120 + 95 + 80 = 295
        assert_eq!(sum, 295);
    }

    #[tokio::test]
    async fn fallback_count_is_accurate() {
        let log = Arc::new(TrafficLog::new(100));
        log.push(entry(Tier::Strong, 10, true, false));
        log.push(entry(Tier::Weak, 20, true, true));

        let entries = log.recent(usize::MAX).await;
        let fallbacks = entries.iter().filter(|e| e.fell_back).count();
        assert_eq!(fallbacks, 1);
    }
}

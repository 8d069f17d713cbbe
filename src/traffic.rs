//! In-memory traffic log exposed through the admin API.
//!
//! [`TrafficLog`] is a fixed-capacity ring-buffer: once full, the oldest entry
//! is evicted to make room for the newest. This gives a bounded, O(1) memory
//! footprint regardless of request volume. [`TrafficEntry`] records a routing
//! decision's `chosen_tier`/`chosen_model`/`basis`/`predicted_semantic`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{decision::RoutingDecision, policy::OptimizationTarget};

/// Fixed-capacity ring-buffer of recent [`TrafficEntry`] records.
///
/// Safe to share across threads via `Arc<TrafficLog>`. [`push`][Self::push] uses
/// a non-blocking `try_lock` so it never delays request handling; in the
/// unlikely event of lock contention the entry is silently dropped.
pub struct TrafficLog {
    capacity: usize,
    entries: Mutex<VecDeque<TrafficEntry>>,
}

impl TrafficLog {
    /// Create a new log with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record a completed request.
    ///
    /// Best-effort, non-blocking: if the mutex is contended the entry is
    /// dropped rather than blocking the request path.
    pub fn push(&self, entry: TrafficEntry) {
        if let Ok(mut entries) = self.entries.try_lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    /// Return up to `limit` recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<TrafficEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Compute aggregate statistics over all buffered entries.
    pub async fn stats(&self) -> TrafficStats {
        let entries = self.entries.lock().await;
        let total = entries.len();
        let avg_latency_ms = if total == 0 {
            0.0
        } else {
            entries.iter().map(|e| e.latency_ms as f64).sum::<f64>() / total as f64
        };

        let error_count = entries.iter().filter(|e| !e.success).count();
        let fallback_count = entries.iter().filter(|e| e.fell_back).count();

        let mut tier_counts: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();
        for entry in entries.iter() {
            *tier_counts.entry(entry.chosen_tier.clone()).or_default() += 1;
        }

        TrafficStats {
            total_requests: total,
            error_count,
            fallback_count,
            avg_latency_ms,
            tier_counts,
        }
    }
}

/// A single request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEntry {
    /// Unique request ID.
    pub id: String,
    /// Timestamp of the request.
    pub timestamp: DateTime<Utc>,
    /// The query that was routed (truncated by the caller if sensitive/long).
    pub query: String,
    /// Tier the Routing Policy chose (`"strong"` or `"weak"`).
    pub chosen_tier: String,
    /// Model name ultimately sent to the backend.
    pub chosen_model: String,
    /// One-line explanation of why this tier was chosen.
    pub basis: String,
    /// Semantic route name, when the basis was a semantic match.
    pub predicted_semantic: Option<String>,
    /// Optimization target requested, if any.
    pub optimization_target: Option<String>,
    /// Whether availability fallback retried on the opposite tier.
    pub fell_back: bool,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Whether the backend ultimately returned a success response.
    pub success: bool,
    /// Error description when `success` is `false`.
    pub error: Option<String>,
}

impl TrafficEntry {
    pub fn from_decision(decision: &RoutingDecision, latency_ms: u64, success: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            query: decision.query.clone(),
            chosen_tier: decision.chosen_tier.to_string(),
            chosen_model: decision.chosen_model_name.clone(),
            basis: decision.basis.to_string(),
            predicted_semantic: decision.predicted_semantic.clone(),
            optimization_target: decision.optimization_target.map(|t| t.to_string()),
            fell_back: false,
            latency_ms,
            success,
            error: None,
        }
    }

    /// Mark this entry as having retried on the opposite tier during
    /// availability fallback.
    pub fn mark_fell_back(mut self) -> Self {
        self.fell_back = true;
        self
    }

    /// Build an entry for a request that failed before a [`RoutingDecision`]
    /// could be reached (or whose decision was reached but the backend call
    /// itself failed) — there is no tier/model/basis to report, only the
    /// query and how long it took to fail.
    pub fn failed(query: String, latency_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            query,
            chosen_tier: String::new(),
            chosen_model: String::new(),
            basis: String::new(),
            predicted_semantic: None,
            optimization_target: None,
            fell_back: false,
            latency_ms,
            success: false,
            error: None,
        }
    }

    /// Attach an error description for failed requests.
    pub fn with_error(mut self, err: &str) -> Self {
        self.error = Some(err.to_string());
        self
    }
}

/// Aggregate statistics derived from all buffered [`TrafficEntry`] records.
#[derive(Debug, Serialize)]
pub struct TrafficStats {
    pub total_requests: usize,
    /// Number of requests that returned an error.
    pub error_count: usize,
    /// Number of requests that used availability fallback.
    pub fallback_count: usize,
    pub avg_latency_ms: f64,
    pub tier_counts: std::collections::HashMap<String, usize>,
}

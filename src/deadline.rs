//! Deadline propagation for a single inbound request.
//!
//! Builds on the `tower-http` `TimeoutLayer` (the HTTP edge timeout) and the
//! `tokio::select!` cancellation idiom used by `main.rs`'s `shutdown_signal`.
//! A [`Deadline`] carries that same idea down into the Completion Driver so
//! every outbound call — classifier embedding, difficulty scoring, backend
//! chat completion, and an availability-fallback retry — shares one absolute
//! point in time instead of each getting its own independent timeout budget.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;

/// An absolute point in time by which a request must produce a response.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        Self(Instant::now() + duration)
    }

    /// Run `future` but fail with [`AppError::DeadlineExceeded`] if it hasn't
    /// resolved by this deadline.
    pub async fn guard<F, T>(&self, future: F) -> Result<T, AppError>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::time::timeout_at(self.0, future)
            .await
            .map_err(|_| AppError::DeadlineExceeded)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn has_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_passes_through_fast_futures() {
        let deadline = Deadline::after(Duration::from_millis(200));
        let result = deadline.guard(async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn guard_times_out_slow_futures() {
        let deadline = Deadline::after(Duration::from_millis(10));
        let result = deadline
            .guard(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                42
            })
            .await;
        assert!(matches!(result, Err(AppError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn has_elapsed_reflects_past_deadlines() {
        let deadline = Deadline::after(Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(deadline.has_elapsed());
    }
}

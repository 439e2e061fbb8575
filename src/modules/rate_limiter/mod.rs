use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
pub const BACKOFF_FACTOR: u32 = 2;
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct LimiterState {
    current_backoff: Duration,
    last_error: Option<Instant>,
    last_request: Option<Instant>,
    min_interval: Duration,
}

/// Throttle shared by every request of a run.
///
/// All state changes happen under one async mutex, and `before_request` holds
/// it while sleeping, so waiting callers are released one at a time.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_min_interval(MIN_REQUEST_INTERVAL)
    }

    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                current_backoff: INITIAL_BACKOFF,
                last_error: None,
                last_request: None,
                min_interval,
            }),
        }
    }

    /// Wait until a request may be sent.
    pub async fn before_request(&self) {
        let mut state = self.state.lock().await;

        if let Some(last_error) = state.last_error {
            let since_error = last_error.elapsed();
            if since_error < state.current_backoff {
                let remaining = state.current_backoff - since_error;
                debug!("Backing off for {:.1}s", remaining.as_secs_f64());
                sleep(remaining).await;
            }
        }

        if let Some(last_request) = state.last_request {
            let since_request = last_request.elapsed();
            if since_request < state.min_interval {
                sleep(state.min_interval - since_request).await;
            }
        }

        state.last_request = Some(Instant::now());
    }

    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.current_backoff = INITIAL_BACKOFF;
        state.last_error = None;
    }

    /// Record a rate-limit response and return the new backoff.
    pub async fn on_rate_limit(&self) -> Duration {
        let mut state = self.state.lock().await;
        state.last_error = Some(Instant::now());
        state.current_backoff = (state.current_backoff * BACKOFF_FACTOR).min(MAX_BACKOFF);
        state.current_backoff
    }

    #[cfg(test)]
    async fn current_backoff(&self) -> Duration {
        self.state.lock().await.current_backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn backoff_doubles_and_resets() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.on_rate_limit().await, Duration::from_secs(2));
        assert_eq!(limiter.on_rate_limit().await, Duration::from_secs(4));
        limiter.on_success().await;
        assert_eq!(limiter.current_backoff().await, INITIAL_BACKOFF);
    }

    #[tokio::test]
    async fn backoff_is_capped() {
        let limiter = RateLimiter::new();
        let mut last = Duration::ZERO;
        for _ in 0..10 {
            last = limiter.on_rate_limit().await;
        }
        assert_eq!(last, MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_out_the_backoff_window() {
        let limiter = RateLimiter::new();
        limiter.on_rate_limit().await;

        let started = Instant::now();
        limiter.before_request().await;
        assert!(started.elapsed() >= Duration::from_secs(2));

        limiter.on_success().await;
        let started = Instant::now();
        limiter.before_request().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spaced_apart() {
        let limiter = Arc::new(RateLimiter::new());
        let started = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.before_request().await;
                Instant::now()
            }));
        }
        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }
        issued.sort();

        for pair in issued.windows(2) {
            assert!(pair[1] - pair[0] >= MIN_REQUEST_INTERVAL);
        }
        assert!(started.elapsed() >= MIN_REQUEST_INTERVAL * 4);
    }
}

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Spaces out requests to a third-party API: a minimum gap between calls plus
/// a soft per-minute ceiling.
pub struct RateLimiter {
    state: Arc<Mutex<RateLimitState>>,
    min_interval: Duration,
    max_per_minute: u32,
}

struct RateLimitState {
    last_request: Option<Instant>,
    requests_this_minute: u32,
    minute_start: Instant,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, max_per_minute: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateLimitState {
                last_request: None,
                requests_this_minute: 0,
                minute_start: Instant::now(),
            })),
            min_interval,
            max_per_minute: max_per_minute.max(1),
        }
    }

    /// Nominatim's usage policy: at most one request per second.
    pub fn nominatim() -> Self {
        Self::new(Duration::from_secs(1), 60)
    }

    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait_duration = self.min_interval - elapsed;
                tracing::debug!("Throttling request for {:?}", wait_duration);
                sleep(wait_duration).await;
            }
        }

        let minute_elapsed = state.minute_start.elapsed();
        if minute_elapsed < Duration::from_secs(60) {
            if state.requests_this_minute >= self.max_per_minute {
                let wait_time = Duration::from_secs(60) - minute_elapsed;
                tracing::info!("Per-minute limit reached, waiting {:?}", wait_time);
                sleep(wait_time).await;
                state.requests_this_minute = 0;
                state.minute_start = Instant::now();
            }
        } else {
            state.requests_this_minute = 0;
            state.minute_start = Instant::now();
        }

        state.requests_this_minute += 1;
        state.last_request = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::nominatim()
    }
}

//! Request budget for the LLM client.
//!
//! The budget is a window of `window` length admitting `max_requests`
//! requests. The count resets once the window has fully elapsed. A caller
//! over budget is not rejected: [`acquire`] sleeps until the window resets
//! and then proceeds.

use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration
};

use tokio::time::{Instant, sleep};
use tracing::info;

use crate::config::RateLimitConfig;

/// Admission control for outgoing requests.
pub trait RateLimiter: Send + Sync {
    /// Take one slot, or report how long until one frees up.
    fn try_acquire(&self) -> Result<(), Duration>;
}

/// Wait until `limiter` admits one request.
pub async fn acquire(limiter: &dyn RateLimiter) {
    loop {
        match limiter.try_acquire() {
            Ok(()) => return,
            Err(wait) => {
                info!(
                    wait_secs = wait.as_secs_f64(),
                    "LLM request budget exhausted, waiting for window reset"
                );
                sleep(wait).await;
            }
        }
    }
}

/// Current window state.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub window_start:  Instant,
    pub request_count: u32
}

/// Fixed-length window counter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window:       Duration,
    state:        Mutex<RateWindow>
}

impl FixedWindowLimiter {
    /// A zero budget is raised to one request per window.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(RateWindow {
                window_start:  Instant::now(),
                request_count: 0
            })
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    pub fn snapshot(&self) -> RateWindow {
        *self.lock()
    }

    /// The window is plain data, so a panic elsewhere never leaves it
    /// half-updated; a poisoned lock is taken over as is.
    fn lock(&self) -> MutexGuard<'_, RateWindow> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.window_start);
        if elapsed >= self.window {
            state.window_start = now;
            state.request_count = 0;
        }
        if state.request_count < self.max_requests {
            state.request_count += 1;
            Ok(())
        } else {
            Err(self.window.saturating_sub(elapsed))
        }
    }
}

/// Limiter that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn try_acquire(&self) -> Result<(), Duration> {
        Ok(())
    }
}

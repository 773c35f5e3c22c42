//! Token bucket shared by every in-flight completion call.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::core::context::RequestContext;
use crate::errors::SummaryError;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Permits bursts up to `capacity` and refills continuously at `refill_per_sec`.
///
/// Waiters queue on a FIFO mutex and the head of the queue sleeps while
/// holding it, so tokens are handed out first-come-first-served. A cancelled
/// waiter drops its place without affecting anyone behind it.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Bucket sized for `requests_per_minute`, starting full.
    /// Returns `None` for zero, meaning no limit.
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Option<Self> {
        if requests_per_minute == 0 {
            return None;
        }
        let capacity = f64::from(requests_per_minute);
        Some(Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut state) = self.state.try_lock() else {
            return false;
        };
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Waits for a token.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::RateLimitWaitCancelled`] if `ctx` is cancelled
    /// or its deadline passes before a token becomes available.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<(), SummaryError> {
        let mut state = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(SummaryError::RateLimitWaitCancelled),
            guard = self.state.lock() => guard,
        };

        loop {
            self.refill(&mut state);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return Ok(());
            }

            let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec);
            debug!("Rate limiter empty, waiting {:?} for next token", wait);

            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(SummaryError::RateLimitWaitCancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }
}

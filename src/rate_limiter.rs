//! Admission control for outbound generation requests
//!
//! Counts requests per fixed one-minute epoch. The counter is reset by a
//! separate ticker task rather than a sliding window, so a burst right before
//! a tick can be followed by another burst right after it.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Length of one accounting epoch
pub const EPOCH: Duration = Duration::from_secs(60);

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 20;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: u32 = 5;

const REQUESTS_PER_MINUTE_RANGE: (u32, u32) = (1, 100);
const MAX_CONCURRENT_RANGE: (u32, u32) = (1, 20);

/// Limits applied to the generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub max_concurrent_requests: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl RateLimitSettings {
    /// Force both values into their accepted ranges
    pub fn clamped(self) -> Self {
        Self {
            requests_per_minute: self
                .requests_per_minute
                .clamp(REQUESTS_PER_MINUTE_RANGE.0, REQUESTS_PER_MINUTE_RANGE.1),
            max_concurrent_requests: self
                .max_concurrent_requests
                .clamp(MAX_CONCURRENT_RANGE.0, MAX_CONCURRENT_RANGE.1),
        }
    }
}

/// Answer to an admission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was consumed, go ahead
    Admit,
    /// Epoch is full; try again after this long
    WaitFor(Duration),
}

#[derive(Debug)]
struct EpochState {
    requests_this_epoch: u32,
    epoch_start: Instant,
    last_request_at: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit_per_minute: u32,
    state: Mutex<EpochState>,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit_per_minute,
            state: Mutex::new(EpochState {
                requests_this_epoch: 0,
                epoch_start: Instant::now(),
                last_request_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EpochState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn limit_per_minute(&self) -> u32 {
        self.limit_per_minute
    }

    pub fn try_admit(&self) -> Admission {
        self.try_admit_at(Instant::now())
    }

    pub fn try_admit_at(&self, now: Instant) -> Admission {
        let mut state = self.lock();
        if state.requests_this_epoch >= self.limit_per_minute {
            let wait = match state.last_request_at {
                Some(last) => EPOCH.saturating_sub(now.saturating_duration_since(last)),
                None => EPOCH.saturating_sub(now.saturating_duration_since(state.epoch_start)),
            };
            return Admission::WaitFor(wait);
        }
        state.requests_this_epoch += 1;
        state.last_request_at = Some(now);
        Admission::Admit
    }

    /// Start a new epoch with an empty counter
    pub fn reset_epoch(&self) {
        let mut state = self.lock();
        tracing::debug!(
            requests = state.requests_this_epoch,
            limit = self.limit_per_minute,
            "Rate limit epoch reset"
        );
        state.requests_this_epoch = 0;
        state.epoch_start = Instant::now();
    }

    pub fn requests_this_epoch(&self) -> u32 {
        self.lock().requests_this_epoch
    }

    /// Fixed sleep after every admitted dispatch
    pub fn pacing_delay(&self) -> Duration {
        pacing_delay(self.limit_per_minute)
    }

    /// Reset the epoch every [`EPOCH`] until cancelled. The first reset
    /// happens one full epoch after the call.
    pub fn spawn_epoch_ticker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + EPOCH, EPOCH);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => limiter.reset_epoch(),
                }
            }
            tracing::debug!("Epoch ticker stopped");
        })
    }
}

pub fn pacing_delay(limit_per_minute: u32) -> Duration {
    Duration::from_millis(60_000 / u64::from(limit_per_minute.max(1)))
}

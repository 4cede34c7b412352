//! Invocation Gateway - Quota Pacing and Retry
//!
//! Every call to the generative backend goes through [`Gateway::invoke`].
//! The gateway holds no business logic: it admits calls against a fixed
//! per-window budget and retries rate-limit failures with linear backoff.
//!
//! The limiter lock is only held for the check/increment/reset step, never
//! across a sleep.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{
    BackendError, BaseAssetRequest, GenerativeBackend, Operation, OperationOutput,
    TranslationRequest, VariantRequest,
};
use crate::settings::Settings;

pub const QUOTA_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("{operation} still rate limited after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: BackendError,
    },

    #[error("{operation} returned an unexpected payload kind")]
    UnexpectedOutput { operation: &'static str },
}

// --- Time ---

/// Time source for the limiter and backoff; swapped out in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

/// A clock that only moves when slept on or advanced. Sleeps are recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(vec![]),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

// --- Quota ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterState {
    pub count: u32,
    pub window_start: Instant,
}

/// Fixed-window admission counter.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<RateLimiterState>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            limit: limit.max(1),
            window,
            state: Mutex::new(RateLimiterState {
                count: 0,
                window_start: now,
            }),
            clock,
        }
    }

    pub fn per_minute(limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self::new(limit, QUOTA_WINDOW, clock)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn snapshot(&self) -> RateLimiterState {
        *self.state.lock()
    }

    /// Block until the caller is admitted. Returns the time spent waiting.
    pub fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = self.clock.now();
                let elapsed = now.saturating_duration_since(state.window_start);
                if elapsed >= self.window {
                    state.count = 0;
                    state.window_start = now;
                }
                if state.count < self.limit {
                    state.count += 1;
                    return waited;
                }
                self.window - elapsed
            };

            info!(
                limit = self.limit,
                sleep_secs = wait.as_secs_f64(),
                "Rate limit reached, waiting for the next window"
            );
            self.clock.sleep(wait);
            waited += wait;
        }
    }
}

// --- Retry ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Multiplied by the retry number (1, 2, 3...).
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_step: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff_step * retry
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub attempts: u64,
    pub retries: u64,
    pub failures: u64,
}

// --- Gateway ---

pub struct Gateway {
    backend: Arc<dyn GenerativeBackend>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    attempts: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

impl Gateway {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            limiter,
            retry,
            clock,
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Gateway on the real clock, configured from settings.
    pub fn from_settings(backend: Arc<dyn GenerativeBackend>, settings: &Settings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = RateLimiter::per_minute(settings.rpm_limit, clock.clone());
        let retry = RetryPolicy {
            max_retries: settings.max_retries,
            backoff_step: settings.retry_backoff(),
        };
        Self::new(backend, limiter, retry, clock)
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub fn invoke(&self, operation: &Operation) -> Result<OperationOutput, GatewayError> {
        let name = operation.name();
        let mut retry = 0u32;

        loop {
            self.limiter.acquire();
            self.attempts.fetch_add(1, Ordering::Relaxed);
            debug!(operation = name, attempt = retry + 1, "Invoking backend");

            let err = match self.backend.execute(operation) {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            if !err.is_rate_limited() {
                self.failures.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::Backend {
                    operation: name,
                    source: err,
                });
            }

            if retry >= self.retry.max_retries {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(operation = name, attempts = retry + 1, error = %err, "Retries exhausted");
                return Err(GatewayError::RetriesExhausted {
                    operation: name,
                    attempts: retry + 1,
                    last: err,
                });
            }

            retry += 1;
            self.retries.fetch_add(1, Ordering::Relaxed);
            let delay = self.retry.delay_for_retry(retry);
            warn!(
                operation = name,
                retry,
                max_retries = self.retry.max_retries,
                delay_secs = delay.as_secs_f64(),
                error = %err,
                "Rate limited, backing off"
            );
            self.clock.sleep(delay);
        }
    }

    pub fn generate_base_asset(&self, request: BaseAssetRequest) -> Result<Vec<u8>, GatewayError> {
        match self.invoke(&Operation::GenerateBaseAsset(request))? {
            OperationOutput::Image(bytes) => Ok(bytes),
            OperationOutput::Text(_) => Err(GatewayError::UnexpectedOutput {
                operation: "generate_base_asset",
            }),
        }
    }

    pub fn translate(&self, request: TranslationRequest) -> Result<String, GatewayError> {
        match self.invoke(&Operation::TranslateText(request))? {
            OperationOutput::Text(text) => Ok(text),
            OperationOutput::Image(_) => Err(GatewayError::UnexpectedOutput {
                operation: "translate_text",
            }),
        }
    }

    pub fn compose(&self, request: VariantRequest) -> Result<Vec<u8>, GatewayError> {
        match self.invoke(&Operation::ComposeVariant(request))? {
            OperationOutput::Image(bytes) => Ok(bytes),
            OperationOutput::Text(_) => Err(GatewayError::UnexpectedOutput {
                operation: "compose_variant",
            }),
        }
    }
}

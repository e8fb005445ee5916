//! Retry policies for transient unit failures (rate limits, timeouts,
//! transient provider unavailability) — exponential backoff with jitter,
//! applied around a single node's `execute`, never around a whole
//! pipeline or layer.
//!
//! Only [`crate::error::GavelError::is_retryable`] errors are ever
//! retried; validation failures, budget breaches, and cancellation always
//! propagate on the first attempt.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GavelError;
use crate::state::State;
use crate::unit::{Executable, ExecutionContext, Outcome};

/// The shape of the delay schedule across attempts. `Exponential` is the
/// default and what every directly-constructed `RetryPolicy` gets unless
/// told otherwise; `Constant`/`Linear` exist for specs that declare a
/// gentler schedule than doubling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Constant,
    Exponential,
    Linear,
}

/// Configuration for retrying a single unit's execution.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry, in seconds.
    pub initial_interval: f64,
    /// Multiplier applied to the interval after each retry. Only consulted
    /// under `BackoffKind::Exponential`.
    pub backoff_factor: f64,
    /// Upper bound on the delay, in seconds, regardless of attempt count.
    pub max_interval: f64,
    /// Whether to randomize each delay by a factor in `0.5..=1.5` to
    /// avoid many concurrent callers retrying in lockstep.
    pub jitter: bool,
    /// Shape of the delay schedule across attempts.
    pub backoff: BackoffKind,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 30.0,
            jitter: true,
            backoff: BackoffKind::Exponential,
        }
    }

    pub fn with_backoff_kind(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// No retries: the first failure is final. Used as the default for
    /// units that don't declare a retry policy in their spec.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: 0.0,
            backoff_factor: 1.0,
            max_interval: 0.0,
            jitter: false,
            backoff: BackoffKind::Exponential,
        }
    }

    /// Delay before attempt `attempt` (0-indexed, so `attempt` is the
    /// number of attempts already made), capped at `max_interval`, with
    /// optional jitter. The schedule's shape is `self.backoff`.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt >= self.max_attempts {
            return Duration::from_secs(0);
        }
        let base_delay = match self.backoff {
            BackoffKind::Constant => self.initial_interval,
            BackoffKind::Exponential => self.initial_interval * self.backoff_factor.powi(attempt as i32),
            BackoffKind::Linear => self.initial_interval * (attempt as f64 + 1.0),
        };
        let capped = base_delay.min(self.max_interval);
        let final_delay = if self.jitter && capped > 0.0 {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped * jitter_factor
        } else {
            capped
        };
        Duration::from_secs_f64(final_delay.max(0.0))
    }

    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Tracks attempts made against a policy for a single execution.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempts: usize,
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self, error: Option<String>) {
        self.attempts += 1;
        self.last_error = error;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_error = None;
    }
}

/// Run `attempt` under `policy`, retrying only on
/// [`GavelError::is_retryable`] failures, sleeping between attempts
/// according to the policy's backoff schedule.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, GavelError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, GavelError>>,
{
    let mut state = RetryState::new();
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                state.record_attempt(Some(err.to_string()));
                if !err.is_retryable() || !policy.should_retry(state.attempts) {
                    return Err(err);
                }
                let delay = policy.calculate_delay(state.attempts - 1);
                tracing::warn!(
                    attempt = state.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Wraps an [`Executable`] so every `execute` call runs under a
/// [`RetryPolicy`], retrying only [`GavelError::is_retryable`] failures.
///
/// `with_retry` discards intermediate attempts' partial state on
/// exhaustion (it only ever returns the final error), so the state
/// returned on failure is the state this wrapper was *handed*, not
/// whatever a failed attempt produced — the same last-known-good
/// convention `Pipeline` and the middlewares use.
pub struct RetryingExecutable {
    id: String,
    inner: Arc<dyn Executable>,
    policy: RetryPolicy,
}

impl RetryingExecutable {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Executable>, policy: RetryPolicy) -> Self {
        Self {
            id: id.into(),
            inner,
            policy,
        }
    }
}

#[async_trait]
impl Executable for RetryingExecutable {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "retry"
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.inner.validate()
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        let base_state = state.clone();
        let inner = Arc::clone(&self.inner);
        let ctx = ctx.clone();

        let result = with_retry(&self.policy, move || {
            let inner = Arc::clone(&inner);
            let ctx = ctx.clone();
            let state = state.clone();
            async move { inner.execute(&ctx, state).await.into_result() }
        })
        .await;

        match result {
            Ok(new_state) => Outcome::ok(new_state),
            Err(err) => Outcome::failed(base_state, err),
        }
    }
}

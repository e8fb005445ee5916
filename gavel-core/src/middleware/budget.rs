//! `BudgetManager`: enforces a per-request ceiling on two independent
//! resource axes at once (tokens and calls), each checked both before and
//! after the wrapped node runs.
//!
//! The pre-check exists so a request that has already exhausted its
//! budget never pays for another LLM call just to find out; the
//! post-check exists because a single call can itself blow through the
//! remaining headroom (e.g. a judge that returns a much longer completion
//! than expected). Either check raises the same terminal
//! [`crate::error::GavelError::BudgetExceeded`] — the middleware never
//! retries or degrades on its own.
//!
//! `max_tokens == 0` and `max_calls == 0` each mean that axis is
//! unbounded — a `BudgetManager` with both at zero never raises
//! `BudgetExceeded`, regardless of usage.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::GavelError;
use crate::state::{State, Usage};
use crate::unit::{Executable, ExecutionContext, Outcome};

pub use crate::error::BudgetAxis;

pub struct BudgetManager {
    id: String,
    inner: Arc<dyn Executable>,
    max_tokens: i64,
    max_calls: i64,
}

impl BudgetManager {
    pub fn new(
        id: impl Into<String>,
        inner: Arc<dyn Executable>,
        max_tokens: i64,
        max_calls: i64,
    ) -> Self {
        Self {
            id: id.into(),
            inner,
            max_tokens,
            max_calls,
        }
    }

    /// Tokens are checked before calls: if a single usage snapshot breaches
    /// both ceilings at once, the reported axis is `Tokens`.
    fn exceeded(&self, usage: Usage) -> Option<GavelError> {
        if self.max_tokens > 0 && usage.tokens > self.max_tokens {
            return Some(GavelError::BudgetExceeded {
                axis: BudgetAxis::Tokens,
                limit: self.max_tokens,
                used: usage.tokens,
                unit_name: self.id.clone(),
            });
        }
        if self.max_calls > 0 && usage.calls > self.max_calls {
            return Some(GavelError::BudgetExceeded {
                axis: BudgetAxis::Calls,
                limit: self.max_calls,
                used: usage.calls,
                unit_name: self.id.clone(),
            });
        }
        None
    }
}

#[async_trait]
impl Executable for BudgetManager {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "budget_manager"
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.max_tokens < 0 || self.max_calls < 0 {
            return Err(GavelError::configuration(format!(
                "budget_manager '{}' has a negative max_tokens or max_calls",
                self.id
            )));
        }
        self.inner.validate()
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        let pre_usage = state.budget_usage();
        tracing::info!(
            budget_manager_id = %self.id,
            max_tokens = self.max_tokens,
            max_calls = self.max_calls,
            tokens = pre_usage.tokens,
            calls = pre_usage.calls,
            "budget pre-check"
        );
        if let Some(err) = self.exceeded(pre_usage) {
            tracing::warn!(budget_manager_id = %self.id, "budget exceeded before execution");
            return Outcome::failed(state, err);
        }

        let outcome = self.inner.execute(ctx, state).await;
        if outcome.error.is_some() {
            return outcome;
        }

        let post_usage = outcome.state.budget_usage();
        tracing::info!(
            budget_manager_id = %self.id,
            max_tokens = self.max_tokens,
            max_calls = self.max_calls,
            tokens = post_usage.tokens,
            calls = post_usage.calls,
            "budget post-check"
        );
        if let Some(err) = self.exceeded(post_usage) {
            tracing::warn!(budget_manager_id = %self.id, "budget exceeded after execution");
            return Outcome::failed(outcome.state, err);
        }

        outcome
    }
}

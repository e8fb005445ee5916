//! `TimeoutExecutable`: bounds how long a single wrapped node may run
//! before its execution is treated as cancelled.
//!
//! A timeout is reported the same way an explicit cancellation is — as
//! [`crate::error::GavelError::Cancelled`] — since from the caller's
//! perspective both mean "this node did not finish in time," and
//! `GavelError::is_cancellation` already sees through either wrapping.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::GavelError;
use crate::state::State;
use crate::unit::{Executable, ExecutionContext, Outcome};

pub struct TimeoutExecutable {
    id: String,
    inner: Arc<dyn Executable>,
    execution_timeout: Duration,
}

impl TimeoutExecutable {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Executable>, execution_timeout: Duration) -> Self {
        Self {
            id: id.into(),
            inner,
            execution_timeout,
        }
    }
}

#[async_trait]
impl Executable for TimeoutExecutable {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "timeout"
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.inner.validate()
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        let fallback = state.clone();
        match tokio::time::timeout(self.execution_timeout, self.inner.execute(ctx, state)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    id = %self.id,
                    timeout_secs = self.execution_timeout.as_secs_f64(),
                    "node execution timed out"
                );
                Outcome::failed(fallback, GavelError::Cancelled)
            }
        }
    }
}

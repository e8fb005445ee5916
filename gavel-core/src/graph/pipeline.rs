//! `Pipeline`: a sequential composite that threads state through its
//! children in declared order, stopping at the first failure.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::GavelError;
use crate::state::State;
use crate::unit::{Executable, ExecutionContext, Outcome};

pub struct Pipeline {
    id: String,
    children: Vec<Arc<dyn Executable>>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, children: Vec<Arc<dyn Executable>>) -> Self {
        Self {
            id: id.into(),
            children,
        }
    }

    pub fn children(&self) -> &[Arc<dyn Executable>] {
        &self.children
    }
}

#[async_trait]
impl Executable for Pipeline {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "pipeline"
    }

    fn validate(&self) -> crate::error::Result<()> {
        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        let span = tracing::debug_span!("pipeline.execute", pipeline_id = %self.id);
        let _enter = span.enter();
        let started = std::time::Instant::now();

        let mut current = state;
        for child in &self.children {
            if ctx.is_cancelled() {
                tracing::warn!(pipeline_id = %self.id, "pipeline cancelled");
                return Outcome::failed(current, GavelError::Cancelled);
            }

            let outcome = child.execute(ctx, current).await;
            current = outcome.state;
            if let Some(err) = outcome.error {
                tracing::error!(
                    pipeline_id = %self.id,
                    child_id = child.id(),
                    error = %err,
                    "pipeline child failed"
                );
                return Outcome::failed(
                    current,
                    GavelError::execution("pipeline", self.id.clone(), err),
                );
            }
        }

        tracing::debug!(
            pipeline_id = %self.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline completed"
        );
        Outcome::ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::keys;

    struct AppendUnit {
        id: String,
        suffix: String,
    }

    #[async_trait]
    impl Executable for AppendUnit {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> &'static str {
            "append"
        }
        async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
            let current = state.get(keys::QUESTION).unwrap_or_default();
            Outcome::ok(state.with(keys::QUESTION, current + &self.suffix))
        }
    }

    struct AlwaysFails {
        id: String,
    }

    #[async_trait]
    impl Executable for AlwaysFails {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> &'static str {
            "fail"
        }
        async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
            Outcome::failed(state, GavelError::configuration("nope"))
        }
    }

    #[tokio::test]
    async fn children_execute_in_declared_order() {
        let pipeline = Pipeline::new(
            "p1",
            vec![
                Arc::new(AppendUnit {
                    id: "a".to_string(),
                    suffix: "-a".to_string(),
                }),
                Arc::new(AppendUnit {
                    id: "b".to_string(),
                    suffix: "-b".to_string(),
                }),
            ],
        );
        let ctx = ExecutionContext::new("req");
        let state = State::new().with(keys::QUESTION, "q".to_string());
        let outcome = pipeline.execute(&ctx, state).await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.state.get(keys::QUESTION), Some("q-a-b".to_string()));
    }

    #[tokio::test]
    async fn stops_at_first_failure_and_wraps_with_pipeline_id() {
        let pipeline = Pipeline::new(
            "p1",
            vec![
                Arc::new(AlwaysFails { id: "a".to_string() }),
                Arc::new(AppendUnit {
                    id: "b".to_string(),
                    suffix: "-b".to_string(),
                }),
            ],
        );
        let ctx = ExecutionContext::new("req");
        let outcome = pipeline.execute(&ctx, State::new()).await;

        assert!(!outcome.is_ok());
        let err = outcome.error.unwrap();
        assert!(err.to_string().contains("p1"));
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_next_child() {
        let pipeline = Pipeline::new(
            "p1",
            vec![Arc::new(AppendUnit {
                id: "a".to_string(),
                suffix: "-a".to_string(),
            })],
        );
        let ctx = ExecutionContext::new("req");
        ctx.cancellation.cancel();

        let outcome = pipeline.execute(&ctx, State::new()).await;
        assert!(matches!(outcome.error, Some(GavelError::Cancelled)));
    }
}

//! `Layer`: a concurrent fan-out composite. Every child receives the same
//! input state; their results are merged back into a single state once
//! all children finish (or fail).

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::GavelError;
use crate::state::State;
use crate::unit::{Executable, ExecutionContext, Outcome};

/// How a `Layer` reconciles its children's independently-derived states
/// back into one.
pub enum MergeStrategy {
    /// Sort children by id, then fold their changes onto the input state
    /// in that order — later (lexicographically greater) child ids win
    /// on overlapping writes. This is the default: deterministic given
    /// the same set of child ids, with no configuration required.
    LastWriteWinsById,
    /// A caller-supplied merge function, given the input state and every
    /// successful child's `(id, State)` pair in id-sorted order.
    Custom(Arc<dyn Fn(&State, &[(String, State)]) -> State + Send + Sync>),
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::LastWriteWinsById => write!(f, "LastWriteWinsById"),
            MergeStrategy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::LastWriteWinsById
    }
}

pub struct Layer {
    id: String,
    children: Vec<Arc<dyn Executable>>,
    merge: MergeStrategy,
    concurrency: Arc<Semaphore>,
}

impl Layer {
    /// `concurrency` bounds how many children run at once; pass
    /// `usize::MAX`-sized values through [`crate::config::LayerConfig`]
    /// for "unbounded" in practice.
    pub fn new(
        id: impl Into<String>,
        children: Vec<Arc<dyn Executable>>,
        merge: MergeStrategy,
        concurrency: usize,
    ) -> Self {
        Self {
            id: id.into(),
            children,
            merge,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn children(&self) -> &[Arc<dyn Executable>] {
        &self.children
    }
}

#[async_trait]
impl Executable for Layer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "layer"
    }

    fn validate(&self) -> crate::error::Result<()> {
        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        let span = tracing::debug_span!("layer.execute", layer_id = %self.id);
        let _enter = span.enter();
        let started = std::time::Instant::now();

        if ctx.is_cancelled() {
            tracing::warn!(layer_id = %self.id, "layer cancelled before dispatch");
            return Outcome::failed(state, GavelError::Cancelled);
        }

        let futures = self.children.iter().map(|child| {
            let child = Arc::clone(child);
            let ctx = ctx.clone();
            let state = state.clone();
            let permit = Arc::clone(&self.concurrency);
            async move {
                let _permit = permit
                    .acquire()
                    .await
                    .expect("layer concurrency semaphore closed");
                let outcome = child.execute(&ctx, state).await;
                (child.id().to_string(), outcome)
            }
        });

        let results = join_all(futures).await;

        let mut successes: Vec<(String, State)> = Vec::new();
        let mut failures: Vec<(String, GavelError)> = Vec::new();

        for (child_id, outcome) in results {
            match outcome.error {
                None => successes.push((child_id, outcome.state)),
                Some(err) => {
                    tracing::error!(layer_id = %self.id, child_id = %child_id, error = %err, "layer child failed");
                    failures.push((child_id, err));
                }
            }
        }

        successes.sort_by(|a, b| a.0.cmp(&b.0));

        if failures.is_empty() {
            let merged = self.merge(&state, &successes);
            tracing::debug!(
                layer_id = %self.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                children = self.children.len(),
                "layer completed"
            );
            Outcome::ok(merged)
        } else {
            // A layer either commits every child's writes or none of them:
            // a partial merge would let the caller observe state a sibling
            // never actually finished producing. On any failure the input
            // state is returned unchanged, not the merge of whatever
            // succeeded.
            tracing::error!(
                layer_id = %self.id,
                failed = failures.len(),
                succeeded = successes.len(),
                "layer failed, discarding partial merge"
            );
            Outcome::failed(
                state,
                GavelError::Aggregate {
                    layer_id: self.id.clone(),
                    errors: failures,
                },
            )
        }
    }
}

impl Layer {
    fn merge(&self, base: &State, successes: &[(String, State)]) -> State {
        match &self.merge {
            MergeStrategy::LastWriteWinsById => {
                let mut merged = base.clone();
                for (_, child_state) in successes {
                    let diff = child_state.changed_since(base);
                    merged = merged.overlay(diff);
                }
                merged
            }
            MergeStrategy::Custom(f) => f(base, successes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{binding, keys, Key};

    fn key(name: &'static str) -> Key<String> {
        Key::new(name)
    }

    struct WriteUnit {
        id: String,
        key_name: &'static str,
        value: String,
    }

    #[async_trait]
    impl Executable for WriteUnit {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> &'static str {
            "write"
        }
        async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
            let k: Key<String> = Key::new(self.key_name);
            Outcome::ok(state.with(k, self.value.clone()))
        }
    }

    struct FailUnit {
        id: String,
    }

    #[async_trait]
    impl Executable for FailUnit {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> &'static str {
            "fail"
        }
        async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
            Outcome::failed(state, GavelError::configuration("child failed"))
        }
    }

    #[tokio::test]
    async fn independent_children_merge_without_conflict() {
        let layer = Layer::new(
            "l1",
            vec![
                Arc::new(WriteUnit {
                    id: "a".to_string(),
                    key_name: "field_a",
                    value: "va".to_string(),
                }),
                Arc::new(WriteUnit {
                    id: "b".to_string(),
                    key_name: "field_b",
                    value: "vb".to_string(),
                }),
            ],
            MergeStrategy::default(),
            4,
        );
        let ctx = ExecutionContext::new("req");
        let outcome = layer.execute(&ctx, State::new()).await;

        assert!(outcome.is_ok());
        assert_eq!(outcome.state.get(key("field_a")), Some("va".to_string()));
        assert_eq!(outcome.state.get(key("field_b")), Some("vb".to_string()));
    }

    #[tokio::test]
    async fn conflicting_writes_resolve_by_sorted_child_id() {
        let layer = Layer::new(
            "l1",
            vec![
                Arc::new(WriteUnit {
                    id: "z_child".to_string(),
                    key_name: "field",
                    value: "from_z".to_string(),
                }),
                Arc::new(WriteUnit {
                    id: "a_child".to_string(),
                    key_name: "field",
                    value: "from_a".to_string(),
                }),
            ],
            MergeStrategy::default(),
            4,
        );
        let ctx = ExecutionContext::new("req");
        let outcome = layer.execute(&ctx, State::new()).await;

        // "z_child" sorts after "a_child", so it wins the conflict.
        assert_eq!(outcome.state.get(key("field")), Some("from_z".to_string()));
    }

    #[tokio::test]
    async fn one_failing_child_discards_the_partial_merge() {
        let layer = Layer::new(
            "l1",
            vec![
                Arc::new(WriteUnit {
                    id: "ok".to_string(),
                    key_name: "field_a",
                    value: "va".to_string(),
                }),
                Arc::new(FailUnit {
                    id: "bad".to_string(),
                }),
            ],
            MergeStrategy::default(),
            4,
        );
        let ctx = ExecutionContext::new("req");
        let input = State::new();
        let outcome = layer.execute(&ctx, input.clone()).await;

        assert!(!outcome.is_ok());
        // The successful sibling's write never surfaces: the input state is
        // returned exactly as it was handed in.
        assert_eq!(outcome.state.get(key("field_a")), None);
        assert_eq!(outcome.state.get(keys::QUESTION), input.get(keys::QUESTION));
        match outcome.error.unwrap() {
            GavelError::Aggregate { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].0, "bad");
            }
            other => panic!("expected Aggregate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_merge_strategy_is_invoked_with_sorted_successes() {
        let merge = MergeStrategy::Custom(Arc::new(|base, successes| {
            let mut state = base.clone();
            for (id, _) in successes {
                state = state.with(keys::QUESTION, id.clone());
            }
            state
        }));
        let layer = Layer::new(
            "l1",
            vec![
                Arc::new(WriteUnit {
                    id: "b".to_string(),
                    key_name: "x",
                    value: "vb".to_string(),
                }),
                Arc::new(WriteUnit {
                    id: "a".to_string(),
                    key_name: "y",
                    value: "va".to_string(),
                }),
            ],
            merge,
            4,
        );
        let ctx = ExecutionContext::new("req");
        let outcome = layer.execute(&ctx, State::new()).await;
        assert_eq!(outcome.state.get(keys::QUESTION), Some("b".to_string()));
        let _ = binding(keys::QUESTION, "unused".to_string());
    }
}

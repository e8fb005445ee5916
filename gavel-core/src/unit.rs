//! The executable contract shared by units, pipelines, layers, and
//! middleware-wrapped nodes.
//!
//! Every node in a compiled graph — whether it is a leaf unit backed by an
//! LLM call, a `Pipeline` chaining several nodes in sequence, a `Layer`
//! fanning them out concurrently, or a middleware wrapping another node —
//! implements [`Executable`]. The uniform contract is what lets the
//! compiler treat a whole subgraph as a single opaque node when it is
//! embedded inside a larger one.
//!
//! `execute` never returns a bare `Result<State>`. It returns an
//! [`Outcome`] carrying the state produced so far *and* an optional error,
//! because a `Layer` must be able to report that three of four children
//! succeeded and one failed without discarding the three successful
//! states — the Rust equivalent of a node that both partially mutates
//! state and signals failure.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::GavelError;
use crate::state::State;

/// Per-execution context threaded through every node. Cheap to clone — it
/// is a handful of `Arc`/`CancellationToken` handles, not owned data.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Correlates all log events and child spans for one top-level
    /// execution.
    pub request_id: Arc<str>,
    /// Fires when the caller abandons the request; nodes should check it
    /// between steps and at the top of `execute`.
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(request_id: impl Into<Arc<str>>) -> Self {
        Self {
            request_id: request_id.into(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// A child context sharing this one's cancellation token but scoped
    /// to a different request id — used when a middleware or pipeline
    /// delegates to an inner node that should log under its own id.
    pub fn child(&self, request_id: impl Into<Arc<str>>) -> Self {
        Self {
            request_id: request_id.into(),
            cancellation: self.cancellation.clone(),
        }
    }
}

/// The result of running one [`Executable`] node: the state produced (which
/// may be identical to the input state on failure, or partially advanced),
/// plus an optional error.
///
/// `error.is_some()` always means the execution did not complete
/// successfully; callers must not trust `state` as a *complete* output in
/// that case, only as the best partial result available for diagnostics or
/// partial aggregation.
#[derive(Debug)]
pub struct Outcome {
    pub state: State,
    pub error: Option<GavelError>,
}

impl Outcome {
    pub fn ok(state: State) -> Self {
        Self { state, error: None }
    }

    pub fn failed(state: State, error: GavelError) -> Self {
        Self {
            state,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a plain `Result`, discarding the partial state on
    /// failure. Convenient at call sites that don't need partial results
    /// (e.g. `Pipeline`, which always stops at the first failure).
    pub fn into_result(self) -> crate::error::Result<State> {
        match self.error {
            None => Ok(self.state),
            Some(e) => Err(e),
        }
    }
}

/// The contract implemented by every node in a compiled graph: leaf units,
/// `Pipeline`, `Layer`, and middleware wrappers alike.
#[async_trait]
pub trait Executable: Send + Sync {
    /// Stable identifier, unique within the graph that contains this node.
    /// Used in error messages, tracing spans, and Layer merge tiebreaking.
    fn id(&self) -> &str;

    /// Human-readable type name for logging (e.g. `"judge"`,
    /// `"pipeline"`, `"budget_manager"`). Not required to be unique.
    fn kind(&self) -> &'static str;

    /// Structural self-check performed once at compile time, before any
    /// request is ever executed. Distinct from request-time failures:
    /// a unit that is well-formed but fails at runtime (e.g. an LLM call
    /// times out) reports that failure from `execute`, not `validate`.
    fn validate(&self) -> crate::error::Result<()> {
        Ok(())
    }

    /// Run this node against `state`, producing a new state (or the
    /// original, on early failure) plus an optional error.
    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome;
}

/// A [`Unit`] is the leaf-level variant of [`Executable`]: a single
/// registry-constructed node with no children. Units are registered under
/// a type string (e.g. `"score_judge"`) and implement this narrower trait;
/// [`UnitAdapter`] lifts any `Unit` into a full `Executable` so the graph
/// types never need to distinguish leaves from composites.
#[async_trait]
pub trait Unit: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> &'static str;
    fn validate(&self) -> crate::error::Result<()> {
        Ok(())
    }
    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome;
}

/// Lifts a [`Unit`] into [`Executable`]. Exists so the distinction between
/// "leaf unit" and "composite node" is a construction-time concern, not a
/// trait-level one — every node flowing through `Graph`/`Pipeline`/`Layer`
/// is simply `Arc<dyn Executable>`.
pub struct UnitAdapter<U> {
    inner: U,
}

impl<U> UnitAdapter<U> {
    pub fn new(inner: U) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<U: Unit> Executable for UnitAdapter<U> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.inner.validate()
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        self.inner.execute(ctx, state).await
    }
}

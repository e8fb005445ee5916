//! Evaluation-graph execution core.
//!
//! `gavel-core` compiles a declared graph of LLM-backed scoring units
//! into an executable pipeline, and runs it against an immutable,
//! request-scoped [`state::State`]. The pieces:
//!
//! - [`state`] — the typed, persistent state every node reads and writes.
//! - [`unit`] — the `Executable`/`Unit` contract every node implements.
//! - [`registry`] — maps type strings to unit/middleware constructors.
//! - [`graph`] — the dependency DAG plus its two executable composites,
//!   `Pipeline` (sequential) and `Layer` (concurrent fan-out).
//! - [`middleware`] — `BudgetManager` and `PositionSwap`, the two
//!   `Executable` wrappers the core ships.
//! - [`llm`] — the `provider/model[@version]` boundary to external LLM
//!   clients.
//! - [`retry`] — backoff policies for transient unit failures, and
//!   `RetryingExecutable`, the wrapper that applies them.
//! - [`timeout`] — `TimeoutExecutable`, a per-node execution deadline.
//! - [`cache`] — the single-flight, content-addressed compiled-graph
//!   cache.
//! - [`compiler`] — parse → validate → hash → cache → build → publish.
//! - [`units`] — reference `answerer`/`score_judge`/`verification`/
//!   `arithmetic_mean`/`max_pool`/`median_pool`/`exact_match`/
//!   `fuzzy_match` unit implementations and their registry factories.
//! - [`error`] — the crate's single error type, `GavelError`.
//!
//! A typical embedding registers its providers and units once:
//!
//! ```ignore
//! let llm = Arc::new(LlmRegistry::new());
//! llm.register("anthropic", my_anthropic_client);
//! let registry = Arc::new(Registry::new());
//! units::register_defaults(&registry, Arc::clone(&llm));
//!
//! let loader = GraphLoader::new(registry);
//! let graph = loader.load_yaml(spec_yaml).await?;
//! ```

pub mod cache;
pub mod compiler;
pub mod error;
pub mod graph;
pub mod llm;
pub mod middleware;
pub mod registry;
pub mod retry;
pub mod state;
pub mod timeout;
pub mod unit;
pub mod units;

pub use error::{GavelError, Result};
pub use graph::Graph;
pub use registry::Registry;
pub use state::State;
pub use unit::{Executable, ExecutionContext, Outcome};

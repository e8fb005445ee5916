//! Error types for graph construction, validation, and execution.
//!
//! `GavelError` covers every row of the error taxonomy: configuration
//! failures (compile-time), budget breaches, LLM transport/semantic
//! failures, state/contract violations, and cancellation. Every boundary
//! wraps the underlying cause with its own context while keeping the
//! source chain intact via `#[source]`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GavelError>;

/// The axis a budget ceiling applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAxis {
    Tokens,
    Calls,
}

impl std::fmt::Display for BudgetAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetAxis::Tokens => write!(f, "tokens"),
            BudgetAxis::Calls => write!(f, "calls"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GavelError {
    /// Spec parsing or validation failed at compile time. Never
    /// recoverable locally — compilation aborts and nothing is cached.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A declared node/pipeline/layer/edge referenced an id that isn't
    /// declared anywhere in the spec.
    #[error("dangling reference: {kind} '{id}' is not declared")]
    DanglingReference { kind: &'static str, id: String },

    /// Two declarations share an id that must be globally unique.
    #[error("duplicate id: '{0}' is declared more than once")]
    DuplicateId(String),

    /// The declared edges contain a cycle.
    #[error("cycle detected in graph '{graph_id}': {detail}")]
    Cycle { graph_id: String, detail: String },

    /// A per-request budget ceiling was exceeded, either before or after
    /// invoking the wrapped executable. Terminal for the current request;
    /// no retry happens at this middleware.
    #[error(
        "budget exceeded on {axis}: used {used} > limit {limit} (at '{unit_name}')"
    )]
    BudgetExceeded {
        axis: BudgetAxis,
        limit: i64,
        used: i64,
        unit_name: String,
    },

    /// The LLM transport layer failed in a way that may succeed on retry
    /// (rate limit, timeout, transient unavailability).
    #[error("LLM transport error ({provider}): {message}")]
    LlmTransport {
        provider: String,
        message: String,
        retryable: bool,
    },

    /// The LLM call failed for a reason retrying will not fix (auth
    /// failure, invalid response, token-limit violation).
    #[error("LLM semantic error ({provider}): {message}")]
    LlmSemantic { provider: String, message: String },

    /// A required key was missing from state, or a length/shape contract
    /// between keys was violated (e.g. `answers` vs `judge_scores`).
    #[error("state contract violation: {0}")]
    StateContract(String),

    /// A node, pipeline, layer, or middleware failed during execution.
    /// Wraps the underlying cause with the failing component's id.
    #[error("execution failed in {component} '{id}': {source}")]
    Execution {
        component: &'static str,
        id: String,
        #[source]
        source: Box<GavelError>,
    },

    /// Multiple children of a Layer failed concurrently. Every individual
    /// error remains inspectable via `errors`.
    #[error("layer '{layer_id}' had {} failing child/children", errors.len())]
    Aggregate {
        layer_id: String,
        errors: Vec<(String, GavelError)>,
    },

    /// The per-request cancellation token fired mid-execution.
    #[error("execution cancelled")]
    Cancelled,

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GavelError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn dangling(kind: &'static str, id: impl Into<String>) -> Self {
        Self::DanglingReference { kind, id: id.into() }
    }

    pub fn execution(component: &'static str, id: impl Into<String>, source: GavelError) -> Self {
        Self::Execution {
            component,
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// True if retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GavelError::LlmTransport { retryable: true, .. })
    }

    /// True if this is a cancellation, anywhere in the cause chain.
    pub fn is_cancellation(&self) -> bool {
        match self {
            GavelError::Cancelled => true,
            GavelError::Execution { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

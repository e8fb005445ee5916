//! Concrete unit implementations: the pieces the compiler's registry
//! resolves `unit_type` strings to. Every scoring decision here is a
//! minimal, deterministic reference implementation — a real deployment is
//! expected to register its own answerers, judges, and matchers, tuned to
//! its own provider and rubric, under the same type strings or new ones of
//! its own choosing.

pub mod answerer;
pub mod judge;
pub mod matcher;
pub mod pooling;
pub mod verification;

pub use answerer::AnswererUnit;
pub use judge::LlmJudgeUnit;
pub use matcher::{ExactMatchUnit, FuzzyMatchUnit};
pub use pooling::{PoolStrategy, PoolingUnit};
pub use verification::VerificationUnit;

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{GavelError, Result};
use crate::llm::LlmRegistry;
use crate::middleware::{BudgetManager, PositionSwap};
use crate::registry::Registry;
use crate::unit::{Executable, UnitAdapter};

#[derive(Deserialize)]
struct AnswererConfig {
    model: String,
    #[serde(default = "default_num_answers")]
    num_answers: usize,
    #[serde(default)]
    prompt_template: Option<String>,
}

fn default_num_answers() -> usize {
    1
}

#[derive(Deserialize)]
struct JudgeConfig {
    model: String,
    #[serde(default)]
    prompt_template: Option<String>,
}

#[derive(Deserialize)]
struct VerificationConfig {
    #[serde(default = "default_min_confidence")]
    min_confidence: f64,
}

fn default_min_confidence() -> f64 {
    0.0
}

#[derive(Deserialize)]
struct MatcherConfig {
    expected: String,
    #[serde(default)]
    case_sensitive: bool,
}

#[derive(Deserialize)]
struct FuzzyMatcherConfig {
    expected: String,
    #[serde(default = "default_fuzzy_threshold")]
    threshold: f64,
}

fn default_fuzzy_threshold() -> f64 {
    0.8
}

/// Per-unit budget ceiling. `0` (the default for either field) means that
/// axis is unbounded — matches [`BudgetManager`]'s own convention.
#[derive(Deserialize)]
struct BudgetConfig {
    #[serde(default)]
    max_tokens: i64,
    #[serde(default)]
    max_calls: i64,
}

fn from_yaml<T: for<'de> Deserialize<'de>>(config: &serde_yaml::Value) -> Result<T> {
    serde_yaml::from_value(config.clone())
        .map_err(|e| GavelError::configuration(format!("invalid unit configuration: {e}")))
}

/// Register the reference unit and middleware factories under their
/// canonical type strings: `answerer`, `score_judge`, `verification`,
/// `arithmetic_mean`, `max_pool`, `median_pool`, `exact_match`,
/// `fuzzy_match` as units; `budget_manager`, `position_swap` as
/// middlewares. `custom` is intentionally left unregistered — a caller
/// declaring it must register its own factory.
pub fn register_defaults(registry: &Registry, llm: Arc<LlmRegistry>) {
    registry.register_factory("answerer", {
        let llm = Arc::clone(&llm);
        Arc::new(move |config: &serde_yaml::Value| {
            let cfg: AnswererConfig = from_yaml(config)?;
            let mut unit = AnswererUnit::new(next_node_id("answerer"), cfg.model, Arc::clone(&llm))
                .with_num_answers(cfg.num_answers);
            if let Some(template) = cfg.prompt_template {
                unit = unit.with_prompt_template(template);
            }
            Ok(Arc::new(UnitAdapter::new(unit)) as Arc<dyn Executable>)
        })
    });

    registry.register_factory(
        "score_judge",
        Arc::new(move |config: &serde_yaml::Value| {
            let cfg: JudgeConfig = from_yaml(config)?;
            let mut unit = LlmJudgeUnit::new(next_node_id("score_judge"), cfg.model, Arc::clone(&llm));
            if let Some(template) = cfg.prompt_template {
                unit = unit.with_prompt_template(template);
            }
            Ok(Arc::new(UnitAdapter::new(unit)) as Arc<dyn Executable>)
        }),
    );

    registry.register_factory(
        "verification",
        Arc::new(|config: &serde_yaml::Value| {
            let cfg: VerificationConfig = from_yaml(config)?;
            Ok(Arc::new(UnitAdapter::new(VerificationUnit::new(
                next_node_id("verification"),
                cfg.min_confidence,
            ))) as Arc<dyn Executable>)
        }),
    );

    for strategy in [PoolStrategy::ArithmeticMean, PoolStrategy::MaxPool, PoolStrategy::MedianPool] {
        let type_name = match strategy {
            PoolStrategy::ArithmeticMean => "arithmetic_mean",
            PoolStrategy::MaxPool => "max_pool",
            PoolStrategy::MedianPool => "median_pool",
        };
        registry.register_factory(
            type_name,
            Arc::new(move |_config: &serde_yaml::Value| {
                Ok(Arc::new(UnitAdapter::new(PoolingUnit::new(next_node_id(type_name), strategy)))
                    as Arc<dyn Executable>)
            }),
        );
    }

    registry.register_factory(
        "exact_match",
        Arc::new(|config: &serde_yaml::Value| {
            let cfg: MatcherConfig = from_yaml(config)?;
            Ok(Arc::new(UnitAdapter::new(ExactMatchUnit::new(
                next_node_id("exact_match"),
                cfg.expected,
                cfg.case_sensitive,
            ))) as Arc<dyn Executable>)
        }),
    );

    registry.register_factory(
        "fuzzy_match",
        Arc::new(|config: &serde_yaml::Value| {
            let cfg: FuzzyMatcherConfig = from_yaml(config)?;
            Ok(Arc::new(UnitAdapter::new(FuzzyMatchUnit::new(
                next_node_id("fuzzy_match"),
                cfg.expected,
                cfg.threshold,
            ))) as Arc<dyn Executable>)
        }),
    );

    registry.register_middleware_factory(
        "budget_manager",
        Arc::new(|config: &serde_yaml::Value, inner: Arc<dyn Executable>| {
            let cfg: BudgetConfig = from_yaml(config)?;
            Ok(Arc::new(BudgetManager::new(
                next_node_id("budget_manager"),
                inner,
                cfg.max_tokens,
                cfg.max_calls,
            )) as Arc<dyn Executable>)
        }),
    );

    registry.register_middleware_factory(
        "position_swap",
        Arc::new(|_config: &serde_yaml::Value, inner: Arc<dyn Executable>| {
            Ok(Arc::new(PositionSwap::new(next_node_id("position_swap"), inner))
                as Arc<dyn Executable>)
        }),
    );
}

/// Factories only receive a node's `config`, not its spec-declared id, so
/// wrapper/adapter ids are synthesized here. They only need to be
/// distinct enough for tracing and error messages to be useful — they are
/// never looked up by name after construction (the spec-declared id wins
/// via `DeclaredId` once the compiler builds the node).
fn next_node_id(prefix: &str) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}#{n}")
}

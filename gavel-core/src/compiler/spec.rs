//! The declarative surface shape a graph is compiled from: plain
//! `serde`-deserializable structs, not the YAML/JSON parsing itself (a
//! caller hands this crate a `GraphSpec`, built by whatever concrete
//! surface syntax it wants — YAML is what [`crate::compiler::mod@super`]'s
//! convenience loader uses, but the compiler only ever sees this typed
//! form).
//!
//! Every struct here rejects unknown fields: a spec with a typo'd field
//! name fails to parse instead of silently ignoring the typo, the same
//! strictness the teacher's loaders apply to their own surface formats.

use serde::{Deserialize, Serialize};

/// A full declared graph: version, metadata, the flat pool of declared
/// units, and the `graph` section wiring them into pipelines, layers, and
/// the edges between those.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphSpec {
    pub version: String,
    pub metadata: Metadata,
    pub units: Vec<UnitSpec>,
    pub graph: GraphSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One declared unit: a leaf node (by registry type string) plus the
/// ambient wrappers (`retry`, `timeout`, `budget`, `middlewares`) applied
/// around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub budget: Option<BudgetSpec>,
    #[serde(default = "default_config")]
    pub parameters: serde_yaml::Value,
    #[serde(default)]
    pub retry: Option<RetrySpec>,
    #[serde(default)]
    pub timeout: Option<TimeoutSpec>,
    #[serde(default)]
    pub middlewares: Vec<MiddlewareSpec>,
}

/// The declarative `type` enum a node's leaf behavior is chosen from.
/// Maps 1:1 to the registry type string each variant's snake_case name
/// spells (see [`UnitType::registry_type`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Answerer,
    ScoreJudge,
    Verification,
    ArithmeticMean,
    MaxPool,
    MedianPool,
    ExactMatch,
    FuzzyMatch,
    Custom,
}

impl UnitType {
    pub fn registry_type(self) -> &'static str {
        match self {
            UnitType::Answerer => "answerer",
            UnitType::ScoreJudge => "score_judge",
            UnitType::Verification => "verification",
            UnitType::ArithmeticMean => "arithmetic_mean",
            UnitType::MaxPool => "max_pool",
            UnitType::MedianPool => "median_pool",
            UnitType::ExactMatch => "exact_match",
            UnitType::FuzzyMatch => "fuzzy_match",
            UnitType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetSpec {
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub max_calls: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Constant,
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySpec {
    pub max_attempts: usize,
    #[serde(default = "default_backoff_type")]
    pub backoff_type: BackoffType,
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

fn default_backoff_type() -> BackoffType {
    BackoffType::Exponential
}

fn default_initial_wait_ms() -> u64 {
    500
}

fn default_max_wait_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSpec {
    pub execution_timeout_seconds: u64,
}

/// One middleware application. Middlewares listed on a unit are applied in
/// declaration order, each wrapping the previous — the first entry is the
/// innermost wrapper, closest to the unit itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiddlewareSpec {
    #[serde(rename = "type")]
    pub middleware_type: String,
    #[serde(default = "default_config")]
    pub config: serde_yaml::Value,
}

/// The wiring between declared units: which ones are grouped into
/// sequential pipelines or concurrent layers, and the dependency edges
/// between the resulting graph nodes (units not absorbed into a pipeline
/// or layer stay addressable by their own id).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphSection {
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    pub id: String,
    pub units: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    pub id: String,
    pub units: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
    /// Parsed and structurally validated, but never evaluated by the
    /// runtime: see the module docs on conditional edges in
    /// `crate::compiler::validate`.
    #[serde(default)]
    pub conditions: Option<Vec<ConditionSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default = "default_config")]
    pub parameters: serde_yaml::Value,
}

fn default_config() -> serde_yaml::Value {
    serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
}

impl GraphSpec {
    pub fn from_yaml_str(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

//! Turns a validated [`GraphSpec`] into an executable [`Graph`]: build
//! every declared unit (wrapped in its `retry`/`timeout`/`budget`/
//! `middlewares`) via the [`Registry`], fold the ones named by a
//! `pipeline`/`layer` into a [`Pipeline`]/[`Layer`] composite, and wire
//! the resulting nodes together with the declared `graph.edges`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{GavelError, Result};
use crate::graph::{Graph, Layer, MergeStrategy, Pipeline};
use crate::middleware::BudgetManager;
use crate::registry::Registry;
use crate::retry::{BackoffKind, RetryPolicy, RetryingExecutable};
use crate::state::State;
use crate::timeout::TimeoutExecutable;
use crate::unit::{Executable, ExecutionContext, Outcome};

use super::spec::{BackoffType, BudgetSpec, GraphSpec, RetrySpec, TimeoutSpec, UnitSpec};

/// Concurrency cap applied to every compiled `Layer` that doesn't specify
/// one explicitly. Mirrors the "2x logical CPUs" default called for in
/// the crate's configuration notes.
pub fn default_layer_concurrency() -> usize {
    (std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)) * 2
}

pub fn build_graph(spec: &GraphSpec, registry: &Registry) -> Result<Graph> {
    let mut units: HashMap<&str, Arc<dyn Executable>> = HashMap::with_capacity(spec.units.len());
    for unit in &spec.units {
        units.insert(unit.id.as_str(), build_unit(unit, registry)?);
    }

    let concurrency = default_layer_concurrency();
    let mut graph = Graph::new(spec.metadata.name.clone());
    let mut absorbed: HashSet<&str> = HashSet::new();

    for pipeline in &spec.graph.pipelines {
        let stages: Vec<Arc<dyn Executable>> = pipeline
            .units
            .iter()
            .map(|id| Arc::clone(units.get(id.as_str()).expect("validated: pipeline units exist")))
            .collect();
        absorbed.extend(pipeline.units.iter().map(String::as_str));
        graph.add_node(pipeline.id.clone(), Arc::new(Pipeline::new(pipeline.id.clone(), stages)))?;
    }

    for layer in &spec.graph.layers {
        let children: Vec<Arc<dyn Executable>> = layer
            .units
            .iter()
            .map(|id| Arc::clone(units.get(id.as_str()).expect("validated: layer units exist")))
            .collect();
        absorbed.extend(layer.units.iter().map(String::as_str));
        graph.add_node(
            layer.id.clone(),
            Arc::new(Layer::new(layer.id.clone(), children, MergeStrategy::default(), concurrency)),
        )?;
    }

    for unit in &spec.units {
        if !absorbed.contains(unit.id.as_str()) {
            graph.add_node(unit.id.clone(), Arc::clone(&units[unit.id.as_str()]))?;
        }
    }

    for edge in &spec.graph.edges {
        graph.add_edge(&edge.from, &edge.to)?;
    }

    graph.validate()?;
    Ok(graph)
}

fn build_unit(unit: &UnitSpec, registry: &Registry) -> Result<Arc<dyn Executable>> {
    let parameters = merge_model_into_parameters(unit);
    let mut executable = registry.create(unit.unit_type.registry_type(), &parameters)?;

    if let Some(timeout) = &unit.timeout {
        executable = wrap_timeout(&unit.id, executable, timeout);
    }
    if let Some(retry) = &unit.retry {
        executable = Arc::new(RetryingExecutable::new(
            format!("{}::retry", unit.id),
            executable,
            retry_policy_from_spec(retry),
        ));
    }
    if let Some(budget) = &unit.budget {
        executable = wrap_budget(&unit.id, executable, budget);
    }
    for middleware in &unit.middlewares {
        executable = registry.wrap(&middleware.middleware_type, &middleware.config, executable)?;
    }

    // Factories synthesize their own internal ids; every node's identity as
    // seen by tracing, error aggregation, and Layer's merge tiebreak must be
    // the id the spec declared, not whatever the factory (or a wrapper
    // constructed here) picked.
    Ok(Arc::new(DeclaredId {
        id: unit.id.clone(),
        inner: executable,
    }))
}

fn merge_model_into_parameters(unit: &UnitSpec) -> serde_yaml::Value {
    let mut mapping = match &unit.parameters {
        serde_yaml::Value::Mapping(m) => m.clone(),
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        other => {
            let mut m = serde_yaml::Mapping::new();
            m.insert(serde_yaml::Value::String("value".to_string()), other.clone());
            m
        }
    };
    if let Some(model) = &unit.model {
        mapping
            .entry(serde_yaml::Value::String("model".to_string()))
            .or_insert_with(|| serde_yaml::Value::String(model.clone()));
    }
    serde_yaml::Value::Mapping(mapping)
}

fn retry_policy_from_spec(retry: &RetrySpec) -> RetryPolicy {
    RetryPolicy::new(retry.max_attempts)
        .with_backoff_kind(match retry.backoff_type {
            BackoffType::Constant => BackoffKind::Constant,
            BackoffType::Exponential => BackoffKind::Exponential,
            BackoffType::Linear => BackoffKind::Linear,
        })
        .with_initial_interval(retry.initial_wait_ms as f64 / 1000.0)
        .with_max_interval(retry.max_wait_ms as f64 / 1000.0)
}

fn wrap_timeout(unit_id: &str, inner: Arc<dyn Executable>, timeout: &TimeoutSpec) -> Arc<dyn Executable> {
    Arc::new(TimeoutExecutable::new(
        format!("{unit_id}::timeout"),
        inner,
        Duration::from_secs(timeout.execution_timeout_seconds),
    ))
}

fn wrap_budget(unit_id: &str, inner: Arc<dyn Executable>, budget: &BudgetSpec) -> Arc<dyn Executable> {
    Arc::new(BudgetManager::new(
        format!("{unit_id}::budget"),
        inner,
        budget.max_tokens.unwrap_or(0),
        budget.max_calls.unwrap_or(0),
    ))
}

/// Relabels a node's [`Executable::id`] to the spec-declared id without
/// otherwise touching its behavior. The factory-constructed executable
/// underneath (and any retry/timeout/budget wrapper built here) may carry
/// its own internal id, but everything outside `build_unit` — error
/// messages, Layer's sorted-by-id merge, log fields — must see the id the
/// spec author wrote.
struct DeclaredId {
    id: String,
    inner: Arc<dyn Executable>,
}

#[async_trait]
impl Executable for DeclaredId {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    fn validate(&self) -> Result<()> {
        self.inner.validate()
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        self.inner.execute(ctx, state).await
    }
}

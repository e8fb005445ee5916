//! Structural validation of a parsed [`super::spec::GraphSpec`], run
//! before the spec is ever handed to the registry or the graph builder.
//!
//! This module checks everything [`super::build::build_graph`] doesn't
//! naturally catch by construction: version format, non-empty ids,
//! per-unit numeric ranges on `budget`/`retry`/`timeout`, that a unit
//! declaring `model` actually carries a parseable `provider/model`
//! reference, that `graph.pipelines`/`graph.layers`/`graph.edges` only
//! reference declared unit ids, and that a layer groups at least two
//! units (a one-unit "layer" is just a unit, declare it as one).
//!
//! Edge cycles are *not* rejected here — [`crate::graph::Graph::add_edge`]
//! already rejects and rolls back a cycle-introducing edge during
//! [`super::build::build_graph`], so duplicating that check against a
//! second, ad-hoc graph representation here would just be two sources of
//! truth for the same invariant.
//!
//! Conditional edges are accepted here and never evaluated by the
//! runtime: the compiler validates that each declared condition's `type`
//! is one of the known condition kinds and that `parameters` is a
//! mapping, so a spec that declares one is not rejected as malformed, but
//! no executor in this crate ever branches on it. This is a deliberate,
//! documented gap rather than a silent one.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::error::{GavelError, Result};
use crate::llm::ModelRef;

use super::spec::{GraphSpec, UnitSpec, UnitType};

const KNOWN_CONDITION_TYPES: &[&str] = &["verdict_pass", "score_threshold", "custom"];

pub fn validate_spec(spec: &GraphSpec) -> Result<()> {
    validate_version(&spec.version)?;
    if spec.metadata.name.trim().is_empty() {
        return Err(GavelError::configuration("graph metadata.name must not be empty"));
    }
    if spec.units.is_empty() {
        return Err(GavelError::configuration(format!(
            "graph '{}' declares no units",
            spec.metadata.name
        )));
    }

    let mut seen_ids = HashSet::new();
    for unit in &spec.units {
        validate_unit(unit)?;
        if !seen_ids.insert(unit.id.as_str()) {
            return Err(GavelError::DuplicateId(unit.id.clone()));
        }
    }

    let unit_ids: HashSet<&str> = spec.units.iter().map(|u| u.id.as_str()).collect();
    let mut node_ids: HashSet<String> = spec.units.iter().map(|u| u.id.clone()).collect();

    for pipeline in &spec.graph.pipelines {
        if pipeline.units.is_empty() {
            return Err(GavelError::configuration(format!(
                "pipeline '{}' declares no units",
                pipeline.id
            )));
        }
        for id in &pipeline.units {
            if !unit_ids.contains(id.as_str()) {
                return Err(GavelError::dangling("unit", id.clone()));
            }
        }
        if !node_ids.insert(pipeline.id.clone()) {
            return Err(GavelError::DuplicateId(pipeline.id.clone()));
        }
    }

    for layer in &spec.graph.layers {
        if layer.units.len() < 2 {
            return Err(GavelError::configuration(format!(
                "layer '{}' must group at least two units",
                layer.id
            )));
        }
        for id in &layer.units {
            if !unit_ids.contains(id.as_str()) {
                return Err(GavelError::dangling("unit", id.clone()));
            }
        }
        if !node_ids.insert(layer.id.clone()) {
            return Err(GavelError::DuplicateId(layer.id.clone()));
        }
    }

    for edge in &spec.graph.edges {
        if !node_ids.contains(&edge.from) {
            return Err(GavelError::dangling("node", edge.from.clone()));
        }
        if !node_ids.contains(&edge.to) {
            return Err(GavelError::dangling("node", edge.to.clone()));
        }
        if let Some(conditions) = &edge.conditions {
            for condition in conditions {
                if !KNOWN_CONDITION_TYPES.contains(&condition.condition_type.as_str()) {
                    return Err(GavelError::configuration(format!(
                        "edge {}->{} declares an unknown condition type '{}'",
                        edge.from, edge.to, condition.condition_type
                    )));
                }
                if !matches!(condition.parameters, serde_yaml::Value::Mapping(_)) {
                    return Err(GavelError::configuration(format!(
                        "edge {}->{} condition '{}' has parameters that are not a mapping",
                        edge.from, edge.to, condition.condition_type
                    )));
                }
            }
        }
    }

    // A unit absorbed into more than one pipeline/layer would make the
    // compiled graph's node membership ambiguous.
    let mut membership: HashMap<&str, &str> = HashMap::new();
    for pipeline in &spec.graph.pipelines {
        for id in &pipeline.units {
            if let Some(existing) = membership.insert(id.as_str(), pipeline.id.as_str()) {
                return Err(GavelError::configuration(format!(
                    "unit '{id}' is declared in both '{existing}' and '{}'",
                    pipeline.id
                )));
            }
        }
    }
    for layer in &spec.graph.layers {
        for id in &layer.units {
            if let Some(existing) = membership.insert(id.as_str(), layer.id.as_str()) {
                return Err(GavelError::configuration(format!(
                    "unit '{id}' is declared in both '{existing}' and '{}'",
                    layer.id
                )));
            }
        }
    }

    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    let re = Regex::new(r"^\d+\.\d+\.\d+$").expect("static version pattern is valid");
    if !re.is_match(version) {
        return Err(GavelError::configuration(format!(
            "version '{version}' is not a semantic version (expected MAJOR.MINOR.PATCH)"
        )));
    }
    Ok(())
}

fn validate_unit(unit: &UnitSpec) -> Result<()> {
    if unit.id.trim().is_empty() {
        return Err(GavelError::configuration("graph declares a unit with an empty id"));
    }

    let needs_model = matches!(unit.unit_type, UnitType::Answerer | UnitType::ScoreJudge);
    match (&unit.model, needs_model) {
        (Some(model), _) => {
            ModelRef::parse(model)?;
        }
        (None, true) => {
            return Err(GavelError::configuration(format!(
                "unit '{}' of type '{}' requires a 'model'",
                unit.id,
                unit.unit_type.registry_type()
            )));
        }
        (None, false) => {}
    }

    if let Some(budget) = &unit.budget {
        if budget.max_tokens.is_some_and(|v| v < 0) || budget.max_calls.is_some_and(|v| v < 0) {
            return Err(GavelError::configuration(format!(
                "unit '{}' has a negative budget limit",
                unit.id
            )));
        }
    }

    if let Some(retry) = &unit.retry {
        if retry.max_attempts == 0 {
            return Err(GavelError::configuration(format!(
                "unit '{}' retry.max_attempts must be at least 1",
                unit.id
            )));
        }
        if retry.max_wait_ms < retry.initial_wait_ms {
            return Err(GavelError::configuration(format!(
                "unit '{}' retry.max_wait_ms must be >= initial_wait_ms",
                unit.id
            )));
        }
    }

    if let Some(timeout) = &unit.timeout {
        if timeout.execution_timeout_seconds == 0 {
            return Err(GavelError::configuration(format!(
                "unit '{}' timeout.execution_timeout_seconds must be > 0",
                unit.id
            )));
        }
    }

    for middleware in &unit.middlewares {
        if middleware.middleware_type.trim().is_empty() {
            return Err(GavelError::configuration(format!(
                "unit '{}' declares a middleware with an empty type",
                unit.id
            )));
        }
    }

    Ok(())
}

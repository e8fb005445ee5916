//! The declared dependency DAG: node ids plus the edges between them,
//! reduced to an ordered sequence of parallel-eligible groups.
//!
//! `Dag` only knows about ids and dependency edges — it has no opinion on
//! what a node executes. The compiler ([`crate::compiler`]) is the only
//! caller that turns a `Dag`'s groups into an executable tree of
//! [`crate::graph::Pipeline`]/[`crate::graph::Layer`] nodes, so cycle
//! detection and topological ordering stay unit-testable independent of
//! any `Executable`.

use std::collections::{HashMap, HashSet};

use crate::error::{GavelError, Result};

/// One declared node: its id and the ids of the nodes it depends on.
#[derive(Debug, Clone)]
struct DagNode {
    id: String,
    dependencies: Vec<String>,
}

/// A dependency graph over node ids. Construction is incremental
/// (`add_node`) so a compiler can build one up while walking a parsed
/// spec and surface a `DanglingReference`/`DuplicateId` error as soon as
/// it occurs, rather than collecting everything and validating once.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    graph_id: String,
    nodes: HashMap<String, DagNode>,
    order: Vec<String>,
}

impl Dag {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Declare a node with its dependency ids. `dependencies` need not
    /// already be present — dangling references are caught by
    /// [`Dag::validate`] so a spec can declare nodes in any order.
    pub fn add_node(&mut self, id: impl Into<String>, dependencies: Vec<String>) -> Result<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(GavelError::DuplicateId(id));
        }
        self.order.push(id.clone());
        self.nodes.insert(id.clone(), DagNode { id, dependencies });
        Ok(())
    }

    /// Check that every dependency id refers to a declared node and that
    /// the graph has no cycle. Must be called before
    /// [`Dag::topological_layers`].
    pub fn validate(&self) -> Result<()> {
        for node in self.nodes.values() {
            for dep in &node.dependencies {
                if !self.nodes.contains_key(dep) {
                    return Err(GavelError::dangling("node", dep.clone()));
                }
            }
        }
        self.topological_layers().map(|_| ())
    }

    /// Reduce the DAG to an ordered sequence of groups, where every node
    /// in group `i` depends only on nodes in groups `0..i` and nodes
    /// within the same group are mutually independent (and therefore safe
    /// to run concurrently). This is Kahn's algorithm: repeatedly peel off
    /// every node whose remaining in-degree is zero.
    ///
    /// Ties within a group are broken by sorting ids, so two calls over
    /// the same `Dag` always produce the same grouping — callers that
    /// need a deterministic node order (e.g. a `Layer`'s default merge
    /// tiebreaker) can rely on this.
    pub fn topological_layers(&self) -> Result<Vec<Vec<String>>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), 0))
            .collect();
        for node in self.nodes.values() {
            *in_degree.get_mut(node.id.as_str()).unwrap() += node.dependencies.len();
        }

        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in self.nodes.values() {
            for dep in &node.dependencies {
                dependents.entry(dep.as_str()).or_default().push(&node.id);
            }
        }

        let mut layers = Vec::new();
        let mut processed: HashSet<&str> = HashSet::new();

        while processed.len() < self.nodes.len() {
            let mut ready: Vec<&str> = in_degree
                .iter()
                .filter(|(id, &deg)| deg == 0 && !processed.contains(*id))
                .map(|(id, _)| *id)
                .collect();

            if ready.is_empty() {
                return Err(GavelError::Cycle {
                    graph_id: self.graph_id.clone(),
                    detail: format!(
                        "{} node(s) form a cycle or depend on an unprocessed node",
                        self.nodes.len() - processed.len()
                    ),
                });
            }

            ready.sort_unstable();

            for &id in &ready {
                processed.insert(id);
                if let Some(deps) = dependents.get(id) {
                    for &dependent in deps {
                        *in_degree.get_mut(dependent).unwrap() -= 1;
                    }
                }
            }

            layers.push(ready.into_iter().map(str::to_string).collect());
        }

        Ok(layers)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declare a node with no dependencies yet. Equivalent to
    /// `add_node(id, vec![])`, named for the incremental build-up a
    /// compiler does when it doesn't know a node's edges until later.
    pub fn add_bare_node(&mut self, id: impl Into<String>) -> Result<()> {
        self.add_node(id, Vec::new())
    }

    /// Declare that `dst` depends on `src`. Both ids must already be
    /// declared (via [`Dag::add_node`]/[`Dag::add_bare_node`]). If the new
    /// edge would create a cycle, it is rolled back and the `Dag` is left
    /// exactly as it was before the call.
    pub fn add_edge(&mut self, src: &str, dst: &str) -> Result<()> {
        if !self.nodes.contains_key(src) {
            return Err(GavelError::dangling("node", src.to_string()));
        }
        if !self.nodes.contains_key(dst) {
            return Err(GavelError::dangling("node", dst.to_string()));
        }

        let node = self.nodes.get_mut(dst).expect("checked above");
        if node.dependencies.iter().any(|d| d == src) {
            return Err(GavelError::configuration(format!(
                "duplicate edge '{src}' -> '{dst}'"
            )));
        }
        node.dependencies.push(src.to_string());

        if self.has_cycle() {
            let node = self.nodes.get_mut(dst).expect("checked above");
            node.dependencies.pop();
            return Err(GavelError::Cycle {
                graph_id: self.graph_id.clone(),
                detail: format!("adding edge '{src}' -> '{dst}' would create a cycle"),
            });
        }

        Ok(())
    }

    /// Three-color DFS cycle check, independent of
    /// [`Dag::topological_layers`]'s Kahn-based detection — used by
    /// [`Dag::add_edge`] to test a tentative edge before committing to it.
    pub fn has_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit<'a>(
            id: &'a str,
            nodes: &'a HashMap<String, DagNode>,
            color: &mut HashMap<&'a str, Color>,
        ) -> bool {
            match color.get(id) {
                Some(Color::Black) => return false,
                Some(Color::Gray) => return true,
                _ => {}
            }
            color.insert(id, Color::Gray);
            if let Some(node) = nodes.get(id) {
                for dep in &node.dependencies {
                    if visit(dep.as_str(), nodes, color) {
                        return true;
                    }
                }
            }
            color.insert(id, Color::Black);
            false
        }

        let mut color: HashMap<&str, Color> = HashMap::new();
        for id in self.nodes.keys() {
            if visit(id.as_str(), &self.nodes, &mut color) {
                return true;
            }
        }
        false
    }

    /// Flattens [`Dag::topological_layers`] into one sequential order
    /// (concatenating layers in order, preserving each layer's sorted-id
    /// tiebreak) — what a [`crate::graph::Graph`] folds state through.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        Ok(self.topological_layers()?.into_iter().flatten().collect())
    }
}

//! Graph types: the declared dependency DAG ([`dag::Dag`]), and the two
//! composite [`crate::unit::Executable`] shapes a compiled graph is built
//! from — [`Pipeline`] for sequential chains and [`Layer`] for concurrent
//! fan-out.
//!
//! [`crate::compiler`] is the assembler: it builds each declared unit,
//! wraps pipelines/layers declared in a spec's `graph` section around
//! them, and adds the edges between them onto a [`Graph`]. `Graph` owns
//! both the dependency structure (a [`Dag`]) and the node bodies
//! (`Arc<dyn Executable>` per id), and folds a request's state through
//! the nodes in topological order.

pub mod dag;
pub mod layer;
pub mod pipeline;

pub use dag::Dag;
pub use layer::{Layer, MergeStrategy};
pub use pipeline::Pipeline;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GavelError, Result};
use crate::state::State;
use crate::unit::{Executable, ExecutionContext, Outcome};

/// The compiled, executable form of a declared graph: a dependency `Dag`
/// over node ids plus the executable body each id maps to. Execution
/// walks the `Dag`'s topological order, threading state through each
/// node in turn and stopping at the first failure.
pub struct Graph {
    id: String,
    dag: Dag,
    nodes: HashMap<String, Arc<dyn Executable>>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            dag: Dag::new(id.clone()),
            id,
            nodes: HashMap::new(),
        }
    }

    /// Declare a node and its executable body. The node starts with no
    /// edges; wire it to others with [`Graph::add_edge`].
    pub fn add_node(&mut self, id: impl Into<String>, executable: Arc<dyn Executable>) -> Result<()> {
        let id = id.into();
        self.dag.add_bare_node(id.clone())?;
        self.nodes.insert(id, executable);
        Ok(())
    }

    /// Declare that `dst` depends on `src`. Rejected (and left
    /// unapplied) if it would create a cycle — see [`Dag::add_edge`].
    pub fn add_edge(&mut self, src: &str, dst: &str) -> Result<()> {
        self.dag.add_edge(src, dst)
    }

    pub fn has_cycle(&self) -> bool {
        self.dag.has_cycle()
    }

    pub fn get_node(&self, id: &str) -> Option<&Arc<dyn Executable>> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.dag.node_ids()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[async_trait]
impl Executable for Graph {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "graph"
    }

    fn validate(&self) -> Result<()> {
        self.dag.validate()?;
        for node in self.nodes.values() {
            node.validate()?;
        }
        Ok(())
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        let span = tracing::info_span!("graph.execute", graph_id = %self.id);
        let _enter = span.enter();

        let order = match self.dag.topological_order() {
            Ok(order) => order,
            Err(e) => return Outcome::failed(state, e),
        };

        let mut current = state;
        for id in order {
            if ctx.is_cancelled() {
                return Outcome::failed(current, GavelError::Cancelled);
            }
            let node = match self.nodes.get(&id) {
                Some(n) => n,
                None => continue,
            };
            let outcome = node.execute(ctx, current).await;
            current = outcome.state;
            if let Some(err) = outcome.error {
                return Outcome::failed(
                    current,
                    GavelError::execution("graph", self.id.clone(), err),
                );
            }
        }

        Outcome::ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::keys;

    struct WriteField {
        id: String,
        key: crate::state::Key<String>,
        value: String,
    }

    #[async_trait]
    impl Executable for WriteField {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> &'static str {
            "write_field"
        }
        async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
            Outcome::ok(state.with(self.key, self.value.clone()))
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
            "always_fails"
        }
        async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
            Outcome::failed(state, GavelError::StateContract("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn executes_nodes_in_dependency_order() {
        let mut graph = Graph::new("g");
        graph
            .add_node(
                "a",
                Arc::new(WriteField {
                    id: "a".to_string(),
                    key: keys::QUESTION,
                    value: "first".to_string(),
                }),
            )
            .unwrap();
        graph
            .add_node(
                "b",
                Arc::new(WriteField {
                    id: "b".to_string(),
                    key: keys::QUESTION,
                    value: "second".to_string(),
                }),
            )
            .unwrap();
        graph.add_edge("a", "b").unwrap();

        let outcome = graph.execute(&ExecutionContext::new("req"), State::new()).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.state.get(keys::QUESTION), Some("second".to_string()));
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let mut graph = Graph::new("g");
        graph
            .add_node("a", Arc::new(AlwaysFails { id: "a".to_string() }))
            .unwrap();
        graph
            .add_node(
                "b",
                Arc::new(WriteField {
                    id: "b".to_string(),
                    key: keys::QUESTION,
                    value: "never".to_string(),
                }),
            )
            .unwrap();
        graph.add_edge("a", "b").unwrap();

        let outcome = graph.execute(&ExecutionContext::new("req"), State::new()).await;
        assert!(!outcome.is_ok());
        assert_eq!(outcome.state.get(keys::QUESTION), None);
    }

    #[test]
    fn add_edge_rejects_cycles_and_get_node_resolves_ids() {
        let mut graph = Graph::new("g");
        graph
            .add_node("a", Arc::new(AlwaysFails { id: "a".to_string() }))
            .unwrap();
        graph
            .add_node("b", Arc::new(AlwaysFails { id: "b".to_string() }))
            .unwrap();
        graph.add_edge("a", "b").unwrap();
        let err = graph.add_edge("b", "a").unwrap_err();
        assert!(matches!(err, GavelError::Cycle { .. }));
        assert!(!graph.has_cycle());
        assert!(graph.get_node("a").is_some());
        assert!(graph.get_node("missing").is_none());
    }
}

//! The type registry: maps the type strings used in a compiled spec (e.g.
//! `"score_judge"`, `"budget_manager"`) to factories that construct the
//! corresponding [`Executable`].
//!
//! Two factory kinds are registered separately because they take a
//! different shape of input. A unit factory takes only its own
//! configuration and produces a leaf node. A middleware factory also takes
//! the *inner* node it wraps, since middlewares compose around another
//! node rather than standing alone — `BudgetManager` and `PositionSwap`
//! are registered this way. Keeping the two maps apart means the compiler
//! can reject "middleware type used where a unit was expected" (and vice
//! versa) before ever calling a factory.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{GavelError, Result};
use crate::unit::Executable;

/// Builds a leaf unit from its declared configuration.
pub type UnitFactory =
    Arc<dyn Fn(&serde_yaml::Value) -> Result<Arc<dyn Executable>> + Send + Sync>;

/// Builds a middleware node that wraps `inner`.
pub type MiddlewareFactory = Arc<
    dyn Fn(&serde_yaml::Value, Arc<dyn Executable>) -> Result<Arc<dyn Executable>> + Send + Sync,
>;

/// A shared, mutable map from type string to constructor. Registration
/// happens once at startup (or in test setup); lookups happen once per
/// node during compilation, so a plain `RwLock` — favoring cheap concurrent
/// reads — is a better fit here than an async-aware lock.
#[derive(Default)]
pub struct Registry {
    units: RwLock<HashMap<String, UnitFactory>>,
    middlewares: RwLock<HashMap<String, MiddlewareFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit factory under `type_name`. Re-registering the same
    /// name replaces the previous factory, which is useful in tests that
    /// stub out a provider-backed unit with a deterministic double.
    pub fn register_factory(
        &self,
        type_name: impl Into<String>,
        factory: UnitFactory,
    ) {
        self.units
            .write()
            .expect("unit registry lock poisoned")
            .insert(type_name.into(), factory);
    }

    /// Register a middleware factory under `type_name`.
    pub fn register_middleware_factory(
        &self,
        type_name: impl Into<String>,
        factory: MiddlewareFactory,
    ) {
        self.middlewares
            .write()
            .expect("middleware registry lock poisoned")
            .insert(type_name.into(), factory);
    }

    /// Construct a leaf unit of `type_name` from `config`.
    pub fn create(&self, type_name: &str, config: &serde_yaml::Value) -> Result<Arc<dyn Executable>> {
        let factories = self.units.read().expect("unit registry lock poisoned");
        match factories.get(type_name) {
            Some(factory) => {
                tracing::debug!(unit_type = type_name, "resolved unit factory");
                factory(config)
            }
            None => {
                tracing::warn!(unit_type = type_name, "unknown unit type");
                Err(GavelError::configuration(format!(
                    "unknown unit type '{type_name}'; registered types: {}",
                    self.supported_types().join(", ")
                )))
            }
        }
    }

    /// Construct a middleware of `type_name` wrapping `inner`.
    pub fn wrap(
        &self,
        type_name: &str,
        config: &serde_yaml::Value,
        inner: Arc<dyn Executable>,
    ) -> Result<Arc<dyn Executable>> {
        let factories = self
            .middlewares
            .read()
            .expect("middleware registry lock poisoned");
        match factories.get(type_name) {
            Some(factory) => {
                tracing::debug!(middleware_type = type_name, "resolved middleware factory");
                factory(config, inner)
            }
            None => {
                tracing::warn!(middleware_type = type_name, "unknown middleware type");
                Err(GavelError::configuration(format!(
                    "unknown middleware type '{type_name}'; registered types: {}",
                    self.supported_middleware_types().join(", ")
                )))
            }
        }
    }

    pub fn supported_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .units
            .read()
            .expect("unit registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn supported_middleware_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .middlewares
            .read()
            .expect("middleware registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn has_unit_type(&self, type_name: &str) -> bool {
        self.units
            .read()
            .expect("unit registry lock poisoned")
            .contains_key(type_name)
    }

    pub fn has_middleware_type(&self, type_name: &str) -> bool {
        self.middlewares
            .read()
            .expect("middleware registry lock poisoned")
            .contains_key(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crate::unit::{ExecutionContext, Outcome};
    use async_trait::async_trait;

    struct NoopUnit {
        id: String,
    }

    #[async_trait]
    impl Executable for NoopUnit {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> &'static str {
            "noop"
        }
        async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
            Outcome::ok(state)
        }
    }

    fn noop_factory() -> UnitFactory {
        Arc::new(|_config| {
            Ok(Arc::new(NoopUnit {
                id: "noop-1".to_string(),
            }) as Arc<dyn Executable>)
        })
    }

    #[test]
    fn create_unknown_type_lists_registered_types() {
        let registry = Registry::new();
        registry.register_factory("noop", noop_factory());

        let err = registry
            .create("bogus", &serde_yaml::Value::Null)
            .unwrap_err();
        assert!(err.to_string().contains("bogus"));
        assert!(err.to_string().contains("noop"));
    }

    #[test]
    fn create_known_type_invokes_factory() {
        let registry = Registry::new();
        registry.register_factory("noop", noop_factory());

        let unit = registry.create("noop", &serde_yaml::Value::Null).unwrap();
        assert_eq!(unit.id(), "noop-1");
    }

    #[test]
    fn re_registering_replaces_factory() {
        let registry = Registry::new();
        registry.register_factory("noop", noop_factory());
        registry.register_factory(
            "noop",
            Arc::new(|_config| {
                Ok(Arc::new(NoopUnit {
                    id: "noop-2".to_string(),
                }) as Arc<dyn Executable>)
            }),
        );

        let unit = registry.create("noop", &serde_yaml::Value::Null).unwrap();
        assert_eq!(unit.id(), "noop-2");
    }

    #[test]
    fn supported_types_is_sorted() {
        let registry = Registry::new();
        registry.register_factory("zeta", noop_factory());
        registry.register_factory("alpha", noop_factory());
        assert_eq!(registry.supported_types(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn wrap_unknown_middleware_errors() {
        let registry = Registry::new();
        let inner: Arc<dyn Executable> = Arc::new(NoopUnit {
            id: "inner".to_string(),
        });
        let err = registry
            .wrap("bogus_mw", &serde_yaml::Value::Null, inner)
            .unwrap_err();
        assert!(err.to_string().contains("bogus_mw"));
    }
}

//! The graph compiler: parse → validate → content-hash → single-flight
//! cache lookup → build → publish.
//!
//! [`GraphLoader`] is the entry point a caller embeds once and reuses
//! across requests: it owns the [`Registry`] nodes are constructed from
//! and the [`GraphCache`] compiled graphs are published into, so repeated
//! loads of the same spec text (the common case — a server reloading its
//! own config, or many requests against one static pipeline) only compile
//! once.

pub mod build;
pub mod hash;
pub mod spec;
pub mod validate;

pub use spec::{GraphSpec, MiddlewareSpec, UnitSpec, UnitType};

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::cache::{CacheConfig, GraphCache};
use crate::error::{GavelError, Result};
use crate::graph::Graph;
use crate::registry::Registry;

pub struct GraphLoader {
    registry: Arc<Registry>,
    cache: GraphCache<Graph>,
}

impl GraphLoader {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_cache_config(registry, CacheConfig::default())
    }

    pub fn with_cache_config(registry: Arc<Registry>, cache_config: CacheConfig) -> Self {
        Self {
            registry,
            cache: GraphCache::new(cache_config),
        }
    }

    /// Parse, validate, and compile `yaml`, joining an in-flight compile
    /// of the same (content-hashed) spec if one is already running.
    pub async fn load_yaml(&self, yaml: &str) -> Result<Arc<Graph>> {
        let parsed = GraphSpec::from_yaml_str(yaml)?;
        self.load_spec(parsed).await
    }

    /// Read `path` from disk and compile it. The whole file is read into
    /// memory up front — specs are small, declarative documents, not
    /// streams worth chunking.
    pub async fn load_from_file(&self, path: impl AsRef<Path>) -> Result<Arc<Graph>> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(GavelError::Io)?;
        self.load_yaml(&contents).await
    }

    /// Read an entire `io::Read` stream and compile it, for callers
    /// holding a spec in something other than a file (an embedded
    /// resource, a network response already buffered to a reader).
    pub async fn load_from_reader(&self, mut reader: impl Read) -> Result<Arc<Graph>> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents).map_err(GavelError::Io)?;
        self.load_yaml(&contents).await
    }

    /// Compile an already-parsed spec. Exposed separately from
    /// [`GraphLoader::load_yaml`] so callers building specs
    /// programmatically (tests, or an alternate surface syntax) skip the
    /// YAML round-trip.
    pub async fn load_spec(&self, parsed: GraphSpec) -> Result<Arc<Graph>> {
        validate::validate_spec(&parsed)?;
        let key = hash::content_hash(&parsed)?;

        let registry = Arc::clone(&self.registry);
        let graph_name = parsed.metadata.name.clone();
        let result = self
            .cache
            .get_or_compile(&key, move || async move {
                tracing::info!(graph_name = %graph_name, hash = %key, "compiling graph (cache miss)");
                build::build_graph(&parsed, &registry)
            })
            .await;

        match &result {
            Ok(_) => tracing::info!("graph ready"),
            Err(e) => tracing::error!(error = %e, "graph compilation failed"),
        }
        result
    }

    /// Drop every cached compiled graph. Subsequent loads recompile from
    /// scratch regardless of whether the spec text has changed — useful
    /// when the registered unit/middleware factories themselves changed
    /// (a provider swap, a new unit type) and stale compiled graphs built
    /// against the old factories must not be served.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn cache_metrics(&self) -> crate::cache::CacheMetrics {
        self.cache.metrics()
    }
}

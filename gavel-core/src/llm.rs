//! The LLM provider boundary: a `provider/model[@version]` reference
//! format, and a registry that resolves such a reference to a concrete
//! [`LlmClient`].
//!
//! `LlmClient` implementations (an Anthropic client, an OpenAI client, a
//! deterministic test double) are external collaborators — this module
//! only defines the contract and the provider-name routing around it, the
//! same boundary the teacher draws around its `ChatModel` trait.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{GavelError, Result};
use crate::state::Usage;

fn model_ref_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<provider>[a-z0-9]+)/(?P<model>[A-Za-z0-9\-_.]+)(@(?P<version>[A-Za-z0-9\-_.]+))?$")
            .expect("model ref pattern is a valid regex")
    })
}

/// A parsed `provider/model[@version]` reference, e.g.
/// `anthropic/claude-3-7-sonnet@20250219`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
    pub version: Option<String>,
}

impl ModelRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let caps = model_ref_pattern().captures(raw).ok_or_else(|| {
            GavelError::configuration(format!(
                "'{raw}' is not a valid model reference; expected 'provider/model[@version]'"
            ))
        })?;
        Ok(Self {
            provider: caps["provider"].to_string(),
            model: caps["model"].to_string(),
            version: caps.name("version").map(|m| m.as_str().to_string()),
        })
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}/{}@{}", self.provider, self.model, v),
            None => write!(f, "{}/{}", self.provider, self.model),
        }
    }
}

/// A completion response paired with the resource usage it consumed.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// The contract every LLM provider client implements. Scoring semantics,
/// prompt templates, and transport details are entirely the
/// implementation's concern; the core only ever calls through this trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Issue a completion request against `model`, returning the raw
    /// response text.
    async fn complete(&self, model: &ModelRef, prompt: &str) -> Result<String>;

    /// Like [`LlmClient::complete`], but also reports the usage the call
    /// consumed — the form units that feed a budget-managed pipeline
    /// should prefer.
    async fn complete_with_usage(&self, model: &ModelRef, prompt: &str) -> Result<Completion>;

    /// A cheap, approximate token count for `text` under this provider's
    /// tokenizer. Used for pre-flight budget estimates; never exact.
    fn estimate_tokens(&self, text: &str) -> usize;
}

/// Maps provider names (the segment before `/` in a model reference) to
/// the client that serves them.
#[derive(Default)]
pub struct LlmRegistry {
    clients: RwLock<HashMap<String, Arc<dyn LlmClient>>>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: impl Into<String>, client: Arc<dyn LlmClient>) {
        self.clients
            .write()
            .expect("llm registry lock poisoned")
            .insert(provider.into(), client);
    }

    /// Parse `raw` as a [`ModelRef`] and resolve its provider segment to a
    /// registered client.
    pub fn resolve(&self, raw: &str) -> Result<(Arc<dyn LlmClient>, ModelRef)> {
        let model_ref = ModelRef::parse(raw)?;
        let clients = self.clients.read().expect("llm registry lock poisoned");
        match clients.get(&model_ref.provider) {
            Some(client) => Ok((Arc::clone(client), model_ref)),
            None => Err(GavelError::configuration(format!(
                "no LLM client registered for provider '{}'",
                model_ref.provider
            ))),
        }
    }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .read()
            .expect("llm registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

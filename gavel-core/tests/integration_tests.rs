//! End-to-end scenarios exercising the compiler and runtime together:
//! a declared YAML spec compiled through [`GraphLoader`] and executed
//! against a real [`Graph`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use gavel_core::compiler::{GraphLoader, GraphSpec};
use gavel_core::error::GavelError;
use gavel_core::llm::{Completion, LlmClient, LlmRegistry, ModelRef};
use gavel_core::registry::Registry;
use gavel_core::state::{keys, Answer, State, Usage};
use gavel_core::unit::{ExecutionContext, Outcome};
use gavel_core::{units, Executable};

/// A deterministic LLM double that returns a fixed, ordered script of
/// completions regardless of prompt content — used wherever a test needs
/// a scripted `answerer` or `score_judge` without a live provider.
struct ScriptedClient {
    responses: Mutex<Vec<&'static str>>,
}

impl ScriptedClient {
    fn new(responses: Vec<&'static str>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, _model: &ModelRef, _prompt: &str) -> gavel_core::error::Result<String> {
        unreachable!("this suite only uses complete_with_usage")
    }

    async fn complete_with_usage(
        &self,
        _model: &ModelRef,
        _prompt: &str,
    ) -> gavel_core::error::Result<Completion> {
        let mut responses = self.responses.lock().unwrap();
        let text = responses.remove(0).to_string();
        Ok(Completion {
            text,
            usage: Usage::new(5, 1),
        })
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// A deterministic LLM double whose score depends only on *when* within a
/// single forward/reversed pass it is called (first call in the pass
/// scores high, second scores low) — exactly the kind of presentation-order
/// bias `position_swap` exists to cancel.
struct PositionBiasedClient {
    calls: AtomicUsize,
    answers_per_pass: usize,
}

impl PositionBiasedClient {
    fn new(answers_per_pass: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answers_per_pass,
        }
    }
}

#[async_trait]
impl LlmClient for PositionBiasedClient {
    async fn complete(&self, _model: &ModelRef, _prompt: &str) -> gavel_core::error::Result<String> {
        unreachable!("judge uses complete_with_usage")
    }

    async fn complete_with_usage(
        &self,
        _model: &ModelRef,
        _prompt: &str,
    ) -> gavel_core::error::Result<Completion> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let position_in_pass = n % self.answers_per_pass;
        let score = if position_in_pass == 0 { 0.9 } else { 0.3 };
        Ok(Completion {
            text: format!(r#"{{"score": {score}, "confidence": 0.8, "reasoning": "r"}}"#),
            usage: Usage::new(5, 1),
        })
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

fn registry_with_defaults(llm: Arc<LlmRegistry>) -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    units::register_defaults(&registry, llm);
    registry
}

/// S1 — a linear pipeline: an `answerer` generates candidate answers from
/// a question, an `exact_match` scorer grades each against a reference,
/// and `arithmetic_mean` pools the scores into a verdict.
#[tokio::test]
async fn s1_linear_pipeline_produces_a_verdict() {
    let llm = Arc::new(LlmRegistry::new());
    llm.register("test", Arc::new(ScriptedClient::new(vec!["Paris", "London"])));
    let registry = registry_with_defaults(llm);
    let loader = GraphLoader::new(registry);

    let yaml = r#"
version: "1.0.0"
metadata:
  name: linear
units:
  - id: answerer
    type: answerer
    model: "test/model"
    parameters: { num_answers: 2 }
  - id: matcher
    type: exact_match
    parameters: { expected: "Paris", case_sensitive: false }
  - id: pool
    type: arithmetic_mean
graph:
  pipelines:
    - id: p1
      units: [answerer, matcher, pool]
  edges: []
"#;

    let graph = loader.load_yaml(yaml).await.unwrap();
    let state = State::new().with(keys::QUESTION, "what is the capital of France".to_string());

    let outcome = graph.execute(&ExecutionContext::new("req-1"), state).await;
    assert!(outcome.is_ok(), "pipeline should succeed: {:?}", outcome.error);

    let answers = outcome.state.get(keys::ANSWERS).unwrap();
    assert_eq!(answers.len(), 2);

    let verdict = outcome.state.get(keys::VERDICT).unwrap();
    assert_eq!(verdict.winner_answer.content, "Paris");
    assert!((verdict.aggregate_score - 0.5).abs() < 1e-9);
}

/// S2 — a `score_judge` wrapped in `position_swap`: the same presentation
/// bias that would otherwise favor the first-listed answer cancels out
/// after averaging forward and reversed passes.
#[tokio::test]
async fn s2_position_swap_cancels_presentation_bias() {
    let llm = Arc::new(LlmRegistry::new());
    llm.register("test", Arc::new(PositionBiasedClient::new(2)));
    let registry = registry_with_defaults(llm);
    let loader = GraphLoader::new(registry);

    let yaml = r#"
version: "1.0.0"
metadata:
  name: bias-mitigated
units:
  - id: judge
    type: score_judge
    model: "test/model"
    middlewares:
      - type: position_swap
  - id: pool
    type: arithmetic_mean
graph:
  pipelines:
    - id: p1
      units: [judge, pool]
  edges: []
"#;

    let graph = loader.load_yaml(yaml).await.unwrap();
    let state = State::new()
        .with(keys::QUESTION, "what is the capital of France".to_string())
        .with(
            keys::ANSWERS,
            vec![Answer::new("a1", "Paris"), Answer::new("a2", "Lyon")],
        );

    let outcome = graph.execute(&ExecutionContext::new("req-2"), state).await;
    assert!(outcome.is_ok(), "pipeline should succeed: {:?}", outcome.error);

    let scores = outcome.state.get(keys::JUDGE_SCORES).unwrap();
    assert_eq!(scores.len(), 2);
    assert!((scores[0].score - 0.6).abs() < 1e-9);
    assert!((scores[1].score - 0.6).abs() < 1e-9);

    // Tied scores: the pool keeps the earliest index as winner.
    let verdict = outcome.state.get(keys::VERDICT).unwrap();
    assert_eq!(verdict.winner_answer.id, "a1");

    // Four completions total: two per pass, two passes.
    assert_eq!(outcome.state.budget_usage(), Usage::new(20, 4));
}

/// S3 — a unit-level budget ceiling already exceeded by the state handed
/// to it blocks the wrapped judge before it ever calls out.
#[tokio::test]
async fn s3_budget_breach_blocks_before_invoking_inner() {
    let llm = Arc::new(LlmRegistry::new());
    llm.register("test", Arc::new(PositionBiasedClient::new(1)));
    let registry = registry_with_defaults(llm);
    let loader = GraphLoader::new(registry);

    let yaml = r#"
version: "1.0.0"
metadata:
  name: budget-pre
units:
  - id: judge
    type: score_judge
    model: "test/model"
    budget:
      max_calls: 1
graph:
  edges: []
"#;

    let graph = loader.load_yaml(yaml).await.unwrap();
    let state = State::new()
        .with(keys::QUESTION, "q".to_string())
        .with(keys::ANSWERS, vec![Answer::new("a1", "x")])
        .with(keys::BUDGET_USAGE, Usage::new(0, 5));

    let outcome = graph.execute(&ExecutionContext::new("req-3"), state).await;
    assert!(!outcome.is_ok());
    assert!(matches!(
        outcome.error.unwrap(),
        GavelError::Execution { source, .. } if matches!(*source, GavelError::BudgetExceeded { used: 5, limit: 1, .. })
    ));
    // Judge state was never touched: no judge_scores were written.
    assert!(outcome.state.get(keys::JUDGE_SCORES).is_none());
}

/// S4 — a budget ceiling only breached by the wrapped node's own
/// consumption (the pre-check passes; the post-check catches it).
#[tokio::test]
async fn s4_budget_breach_caught_after_inner_overspends() {
    let llm = Arc::new(LlmRegistry::new());
    llm.register("test", Arc::new(PositionBiasedClient::new(2)));
    let registry = registry_with_defaults(llm);
    let loader = GraphLoader::new(registry);

    let yaml = r#"
version: "1.0.0"
metadata:
  name: budget-post
units:
  - id: judge
    type: score_judge
    model: "test/model"
    budget:
      max_tokens: 5
graph:
  edges: []
"#;

    let graph = loader.load_yaml(yaml).await.unwrap();
    let state = State::new()
        .with(keys::QUESTION, "q".to_string())
        .with(
            keys::ANSWERS,
            vec![Answer::new("a1", "x"), Answer::new("a2", "y")],
        );

    let outcome = graph.execute(&ExecutionContext::new("req-4"), state).await;
    assert!(!outcome.is_ok());
    assert!(matches!(
        outcome.error.unwrap(),
        GavelError::Execution { source, .. } if matches!(*source, GavelError::BudgetExceeded { used: 10, limit: 5, .. })
    ));
    // The overspend is still visible even though the request failed.
    assert_eq!(outcome.state.budget_usage(), Usage::new(10, 2));
}

/// S5 — a spec whose declared edges form a cycle is rejected at compile
/// time, before any node runs.
#[tokio::test]
async fn s5_cycle_is_rejected_at_compile_time() {
    let llm = Arc::new(LlmRegistry::new());
    let registry = registry_with_defaults(llm);
    let loader = GraphLoader::new(registry);

    let spec = GraphSpec::from_yaml_str(
        r#"
version: "1.0.0"
metadata:
  name: cyclic
units:
  - id: a
    type: arithmetic_mean
  - id: b
    type: arithmetic_mean
graph:
  edges:
    - from: a
      to: b
    - from: b
      to: a
"#,
    )
    .unwrap();

    let err = loader.load_spec(spec).await.unwrap_err();
    assert!(matches!(err, GavelError::Cycle { .. }));
}

struct AlwaysOkUnit;

#[async_trait]
impl Executable for AlwaysOkUnit {
    fn id(&self) -> &str {
        "always_ok"
    }
    fn kind(&self) -> &'static str {
        "always_ok"
    }
    async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
        Outcome::ok(state.with(keys::QUESTION, "answered".to_string()))
    }
}

/// S6 — two units compiled into one concurrent layer: one succeeds, one
/// fails for lack of required state. The layer reports an aggregate
/// failure and returns the state it was handed, discarding the
/// successful sibling's writes along with the failed one's.
#[tokio::test]
async fn s6_layer_partial_failure_returns_pre_layer_state() {
    let llm = Arc::new(LlmRegistry::new());
    let registry = registry_with_defaults(llm);
    registry.register_factory(
        "custom",
        Arc::new(|_cfg: &serde_yaml::Value| Ok(Arc::new(AlwaysOkUnit) as Arc<dyn Executable>)),
    );
    let loader = GraphLoader::new(registry);

    let yaml = r#"
version: "1.0.0"
metadata:
  name: partial-failure
units:
  - id: ok_node
    type: custom
  - id: bad_node
    type: exact_match
    parameters: { expected: "Paris" }
graph:
  layers:
    - id: l1
      units: [ok_node, bad_node]
  edges: []
"#;

    let graph = loader.load_yaml(yaml).await.unwrap();
    // No `answers` bound: `exact_match` fails, `always_ok` doesn't need it.
    let outcome = graph.execute(&ExecutionContext::new("req-6"), State::new()).await;

    assert!(!outcome.is_ok());
    // The pre-layer input state wins: not "answered", not a partial merge.
    assert_eq!(outcome.state.get(keys::QUESTION), None);
    match outcome.error.unwrap() {
        GavelError::Execution { source, .. } => match *source {
            GavelError::Aggregate { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].0, "bad_node");
            }
            other => panic!("expected Aggregate, got {other:?}"),
        },
        other => panic!("expected Execution wrapping Aggregate, got {other:?}"),
    }
}

//! `score_judge`: scores every candidate answer against the question by
//! delegating to a registered [`LlmClient`](crate::llm::LlmClient) and
//! parsing its response as a small JSON contract.
//!
//! The actual scoring behavior — the prompt template, what the model is
//! asked to weigh, how confident it should be — is an external concern;
//! this unit only fixes the *shape* of the exchange (one completion per
//! answer, a `{score, confidence, reasoning}` response) so the rest of
//! the engine (aggregation, bias mitigation) has something uniform to
//! work with regardless of which provider answers.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{GavelError, Result};
use crate::llm::LlmRegistry;
use crate::state::{keys, JudgeSummary, State};
use crate::unit::{ExecutionContext, Outcome, Unit};

pub struct LlmJudgeUnit {
    id: String,
    model: String,
    llm: Arc<LlmRegistry>,
    prompt_template: String,
}

impl LlmJudgeUnit {
    pub fn new(id: impl Into<String>, model: impl Into<String>, llm: Arc<LlmRegistry>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            llm,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }
}

const DEFAULT_PROMPT_TEMPLATE: &str = "Question: {question}\nAnswer: {answer}\n\
Respond with a JSON object of the form {{\"score\": <0..1>, \"confidence\": <0..1>, \"reasoning\": <string>}}.";

#[async_trait]
impl Unit for LlmJudgeUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "score_judge"
    }

    fn validate(&self) -> Result<()> {
        crate::llm::ModelRef::parse(&self.model).map(|_| ())
    }

    async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
        let question = match state.get(keys::QUESTION) {
            Some(q) => q,
            None => {
                return Outcome::failed(
                    state,
                    GavelError::StateContract(format!(
                        "score_judge '{}' requires 'question' to be bound",
                        self.id
                    )),
                )
            }
        };
        let answers = state.get(keys::ANSWERS).unwrap_or_default();
        if answers.is_empty() {
            return Outcome::failed(
                state,
                GavelError::StateContract(format!(
                    "score_judge '{}' requires at least one bound answer",
                    self.id
                )),
            );
        }

        let (client, model_ref) = match self.llm.resolve(&self.model) {
            Ok(v) => v,
            Err(e) => return Outcome::failed(state, e),
        };

        let mut usage = state.budget_usage();
        let mut scores = Vec::with_capacity(answers.len());

        for answer in &answers {
            let prompt = self
                .prompt_template
                .replace("{question}", &question)
                .replace("{answer}", &answer.content);

            let completion = match client.complete_with_usage(&model_ref, &prompt).await {
                Ok(c) => c,
                Err(e) => return Outcome::failed(state.with(keys::BUDGET_USAGE, usage), e),
            };
            usage = usage.combine(completion.usage);

            match parse_judge_response(&completion.text) {
                Ok(summary) => scores.push(summary),
                Err(e) => return Outcome::failed(state.with(keys::BUDGET_USAGE, usage), e),
            }
        }

        tracing::debug!(judge_id = %self.id, answers = answers.len(), "score_judge scored all answers");
        Outcome::ok(
            state
                .with(keys::JUDGE_SCORES, scores)
                .with(keys::BUDGET_USAGE, usage),
        )
    }
}

#[derive(Deserialize)]
struct RawJudgeResponse {
    score: f64,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn parse_judge_response(text: &str) -> Result<JudgeSummary> {
    let raw: RawJudgeResponse = serde_json::from_str(text).map_err(|e| GavelError::LlmSemantic {
        provider: "unknown".to_string(),
        message: format!("judge response is not valid JSON: {e}"),
    })?;
    if !(0.0..=1.0).contains(&raw.score) || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(GavelError::LlmSemantic {
            provider: "unknown".to_string(),
            message: "judge response score/confidence must be within [0, 1]".to_string(),
        });
    }
    Ok(JudgeSummary::new(raw.score, raw.confidence, raw.reasoning))
}

//! `answerer`: generates candidate answers to `question` by delegating to
//! a registered [`LlmClient`](crate::llm::LlmClient), one completion per
//! requested candidate.
//!
//! Unlike `score_judge`, an answerer's completion is not expected to carry
//! a JSON contract — the raw completion text *is* the answer content, so
//! whatever the model returns becomes one `Answer` in `answers`.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{GavelError, Result};
use crate::llm::LlmRegistry;
use crate::state::{keys, Answer, State};
use crate::unit::{ExecutionContext, Outcome, Unit};

pub struct AnswererUnit {
    id: String,
    model: String,
    llm: Arc<LlmRegistry>,
    num_answers: usize,
    prompt_template: String,
}

const DEFAULT_PROMPT_TEMPLATE: &str = "Question: {question}\nProvide a single candidate answer.";

impl AnswererUnit {
    pub fn new(id: impl Into<String>, model: impl Into<String>, llm: Arc<LlmRegistry>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            llm,
            num_answers: 1,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }

    pub fn with_num_answers(mut self, num_answers: usize) -> Self {
        self.num_answers = num_answers;
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }
}

#[async_trait]
impl Unit for AnswererUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "answerer"
    }

    fn validate(&self) -> Result<()> {
        if self.num_answers == 0 {
            return Err(GavelError::configuration(format!(
                "answerer '{}' must generate at least one answer",
                self.id
            )));
        }
        crate::llm::ModelRef::parse(&self.model).map(|_| ())
    }

    async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
        let question = match state.get(keys::QUESTION) {
            Some(q) => q,
            None => {
                return Outcome::failed(
                    state,
                    GavelError::StateContract(format!(
                        "answerer '{}' requires 'question' to be bound",
                        self.id
                    )),
                )
            }
        };

        let (client, model_ref) = match self.llm.resolve(&self.model) {
            Ok(v) => v,
            Err(e) => return Outcome::failed(state, e),
        };

        let prompt = self.prompt_template.replace("{question}", &question);

        let mut usage = state.budget_usage();
        let mut answers = Vec::with_capacity(self.num_answers);

        for _ in 0..self.num_answers {
            let completion = match client.complete_with_usage(&model_ref, &prompt).await {
                Ok(c) => c,
                Err(e) => return Outcome::failed(state.with(keys::BUDGET_USAGE, usage), e),
            };
            usage = usage.combine(completion.usage);
            answers.push(Answer::new(Uuid::new_v4().to_string(), completion.text));
        }

        tracing::debug!(answerer_id = %self.id, generated = answers.len(), "answerer produced candidates");
        Outcome::ok(
            state
                .with(keys::ANSWERS, answers)
                .with(keys::BUDGET_USAGE, usage),
        )
    }
}

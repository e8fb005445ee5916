//! `PositionSwap`: mitigates an LLM judge's tendency to favor whichever
//! answer it sees first by running the wrapped node twice — once with the
//! declared answer order, once with it reversed — and averaging the two
//! resulting score sets back into the original order.
//!
//! This assumes the wrapped node honors the state contract that the i-th
//! `JudgeSummary` in `judge_scores` corresponds to the i-th `Answer` in
//! `answers` (see [`crate::state::JudgeSummary`]); `PositionSwap` doesn't
//! inspect *how* the inner node scores, only that it respects that
//! positional pairing.
//!
//! There is no bias to cancel with fewer than two answers: an empty
//! `answers` list is a contract violation (nothing to score), and exactly
//! one answer delegates to the inner node a single time — doubling the
//! call for a presentation order that doesn't exist would only double the
//! cost for no benefit.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::GavelError;
use crate::state::{keys, JudgeSummary, State, Usage};
use crate::unit::{Executable, ExecutionContext, Outcome};

pub struct PositionSwap {
    id: String,
    inner: Arc<dyn Executable>,
}

impl PositionSwap {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Executable>) -> Self {
        Self {
            id: id.into(),
            inner,
        }
    }

    fn average(forward: &[JudgeSummary], reversed: &[JudgeSummary]) -> Vec<JudgeSummary> {
        forward
            .iter()
            .zip(reversed.iter())
            .map(|(f, r)| JudgeSummary {
                score: (f.score + r.score) / 2.0,
                confidence: (f.confidence + r.confidence) / 2.0,
                reasoning: "Position swap: (s1 + s2) / 2 = mean".to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl Executable for PositionSwap {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "position_swap"
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.inner.validate()
    }

    async fn execute(&self, ctx: &ExecutionContext, state: State) -> Outcome {
        let span = tracing::debug_span!("position_swap.execute", id = %self.id);
        let _enter = span.enter();

        let answers = match state.get(keys::ANSWERS) {
            Some(a) => a,
            None => {
                return Outcome::failed(
                    state,
                    GavelError::StateContract(
                        "position_swap requires 'answers' to be bound".to_string(),
                    ),
                )
            }
        };

        if answers.is_empty() {
            return Outcome::failed(
                state,
                GavelError::StateContract(format!(
                    "position_swap '{}' requires at least one answer",
                    self.id
                )),
            );
        }

        if answers.len() == 1 {
            // No presentation order to bias against: delegate once.
            let outcome = self.inner.execute(ctx, state).await;
            return match outcome.error {
                None => outcome,
                Some(err) => Outcome::failed(
                    outcome.state,
                    GavelError::execution("position_swap", self.id.clone(), err),
                ),
            };
        }

        let base_usage = state.budget_usage();

        let forward_outcome = self.inner.execute(ctx, state.clone()).await;
        if let Some(err) = forward_outcome.error {
            return Outcome::failed(
                forward_outcome.state,
                GavelError::execution("position_swap", self.id.clone(), err),
            );
        }

        let mut reversed_answers = answers.clone();
        reversed_answers.reverse();
        let reversed_state = state.with(keys::ANSWERS, reversed_answers);

        let reversed_outcome = self.inner.execute(ctx, reversed_state).await;
        if let Some(err) = reversed_outcome.error {
            return Outcome::failed(
                reversed_outcome.state,
                GavelError::execution("position_swap", self.id.clone(), err),
            );
        }

        let forward_scores = forward_outcome.state.get(keys::JUDGE_SCORES).unwrap_or_default();
        let mut reversed_scores = reversed_outcome
            .state
            .get(keys::JUDGE_SCORES)
            .unwrap_or_default();

        if forward_scores.len() != answers.len() || reversed_scores.len() != answers.len() {
            return Outcome::failed(
                forward_outcome.state,
                GavelError::StateContract(format!(
                    "position_swap '{}': judge_scores length does not match answers length",
                    self.id
                )),
            );
        }

        // The reversed pass scored answers in reversed order; flip its
        // scores back so index i lines up with the original answers[i].
        reversed_scores.reverse();

        let averaged = Self::average(&forward_scores, &reversed_scores);

        let forward_delta = forward_outcome.state.budget_usage().saturating_sub(base_usage);
        let reversed_delta = reversed_outcome.state.budget_usage().saturating_sub(base_usage);
        let total_usage: Usage = base_usage.combine(forward_delta).combine(reversed_delta);

        let merged = forward_outcome
            .state
            .with(keys::JUDGE_SCORES, averaged)
            .with(keys::BUDGET_USAGE, total_usage);

        tracing::debug!(id = %self.id, answers = answers.len(), "position swap merged both passes");
        Outcome::ok(merged)
    }
}

//! `arithmetic_mean`/`max_pool`/`median_pool`: reduce `answers` +
//! `judge_scores` to a single [`Verdict`](crate::state::Verdict).
//!
//! All three pooling strategies pick the winner the same way — the
//! highest-scoring answer, ties broken by earliest position — and differ
//! only in how `aggregate_score` summarizes the full set of judge scores.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::GavelError;
use crate::state::{keys, State, Verdict};
use crate::unit::{ExecutionContext, Outcome, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStrategy {
    ArithmeticMean,
    MaxPool,
    MedianPool,
}

impl PoolStrategy {
    fn registry_type(self) -> &'static str {
        match self {
            PoolStrategy::ArithmeticMean => "arithmetic_mean",
            PoolStrategy::MaxPool => "max_pool",
            PoolStrategy::MedianPool => "median_pool",
        }
    }

    fn aggregate(self, scores: &[f64]) -> f64 {
        match self {
            PoolStrategy::ArithmeticMean => scores.iter().sum::<f64>() / scores.len() as f64,
            PoolStrategy::MaxPool => scores.iter().cloned().fold(f64::MIN, f64::max),
            PoolStrategy::MedianPool => {
                let mut sorted = scores.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        }
    }
}

pub struct PoolingUnit {
    id: String,
    strategy: PoolStrategy,
}

impl PoolingUnit {
    pub fn new(id: impl Into<String>, strategy: PoolStrategy) -> Self {
        Self {
            id: id.into(),
            strategy,
        }
    }
}

#[async_trait]
impl Unit for PoolingUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        self.strategy.registry_type()
    }

    async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
        let answers = state.get(keys::ANSWERS).unwrap_or_default();
        let scores = state.get(keys::JUDGE_SCORES).unwrap_or_default();

        if answers.is_empty() {
            return Outcome::failed(
                state,
                GavelError::StateContract(format!(
                    "{} '{}' has no answers to pool",
                    self.strategy.registry_type(),
                    self.id
                )),
            );
        }
        if answers.len() != scores.len() {
            return Outcome::failed(
                state,
                GavelError::StateContract(format!(
                    "{} '{}': {} answers but {} judge_scores",
                    self.strategy.registry_type(),
                    self.id,
                    answers.len(),
                    scores.len()
                )),
            );
        }

        // Strict `>` keeps the earliest index on ties: later candidates
        // only displace the current winner by scoring higher outright.
        let mut winner_idx = 0usize;
        for (idx, summary) in scores.iter().enumerate().skip(1) {
            if summary.score > scores[winner_idx].score {
                winner_idx = idx;
            }
        }

        let raw_scores: Vec<f64> = scores.iter().map(|s| s.score).collect();
        let aggregate_score = self.strategy.aggregate(&raw_scores);

        let verdict = Verdict {
            id: Uuid::new_v4().to_string(),
            winner_answer: answers[winner_idx].clone(),
            aggregate_score,
        };

        tracing::debug!(
            pool_id = %self.id,
            strategy = self.strategy.registry_type(),
            winner = %verdict.winner_answer.id,
            aggregate_score,
            "pooled verdict"
        );
        Outcome::ok(state.with(keys::VERDICT, verdict))
    }
}

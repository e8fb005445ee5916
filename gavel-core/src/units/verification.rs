//! `verification`: a deterministic confidence gate over `judge_scores`.
//!
//! Scores whose reported `confidence` falls below a configured threshold
//! are zeroed out in place (score set to `0.0`, reasoning annotated) so a
//! downstream pooling unit never lets a low-confidence judgment sway the
//! aggregate — the judge's own `score` is the thing being verified, not
//! recomputed.

use async_trait::async_trait;

use crate::error::GavelError;
use crate::state::{keys, JudgeSummary, State};
use crate::unit::{ExecutionContext, Outcome, Unit};

pub struct VerificationUnit {
    id: String,
    min_confidence: f64,
}

impl VerificationUnit {
    pub fn new(id: impl Into<String>, min_confidence: f64) -> Self {
        Self {
            id: id.into(),
            min_confidence,
        }
    }
}

#[async_trait]
impl Unit for VerificationUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "verification"
    }

    fn validate(&self) -> crate::error::Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(GavelError::configuration(format!(
                "verification '{}' has a min_confidence outside [0, 1]",
                self.id
            )));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
        let scores = match state.get(keys::JUDGE_SCORES) {
            Some(s) => s,
            None => {
                return Outcome::failed(
                    state,
                    GavelError::StateContract(format!(
                        "verification '{}' requires 'judge_scores' to be bound",
                        self.id
                    )),
                )
            }
        };

        let mut gated = 0usize;
        let verified: Vec<JudgeSummary> = scores
            .into_iter()
            .map(|s| {
                if s.confidence < self.min_confidence {
                    gated += 1;
                    JudgeSummary::new(
                        0.0,
                        s.confidence,
                        format!("gated: confidence {:.2} below threshold {:.2}", s.confidence, self.min_confidence),
                    )
                } else {
                    s
                }
            })
            .collect();

        tracing::debug!(verification_id = %self.id, gated, "verification applied confidence gate");
        Outcome::ok(state.with(keys::JUDGE_SCORES, verified))
    }
}

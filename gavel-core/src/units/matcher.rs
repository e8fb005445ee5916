//! `exact_match`: a deterministic, non-LLM scorer that grades each
//! answer against a configured reference string. Useful both as a real
//! scoring strategy for tasks with a known-correct answer and as a
//! dependency-free double for testing pipelines that would otherwise
//! require a live LLM judge.

use async_trait::async_trait;

use crate::error::GavelError;
use crate::state::{keys, JudgeSummary, State};
use crate::unit::{ExecutionContext, Outcome, Unit};

pub struct ExactMatchUnit {
    id: String,
    expected: String,
    case_sensitive: bool,
}

impl ExactMatchUnit {
    pub fn new(id: impl Into<String>, expected: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            id: id.into(),
            expected: expected.into(),
            case_sensitive,
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        if self.case_sensitive {
            candidate.trim() == self.expected.trim()
        } else {
            candidate.trim().eq_ignore_ascii_case(self.expected.trim())
        }
    }
}

#[async_trait]
impl Unit for ExactMatchUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "exact_match"
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.expected.trim().is_empty() {
            return Err(GavelError::configuration(format!(
                "exact_match '{}' has an empty 'expected' value",
                self.id
            )));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
        let answers = state.get(keys::ANSWERS).unwrap_or_default();
        if answers.is_empty() {
            return Outcome::failed(
                state,
                GavelError::StateContract(format!(
                    "exact_match '{}' requires at least one bound answer",
                    self.id
                )),
            );
        }

        let scores: Vec<JudgeSummary> = answers
            .iter()
            .map(|answer| {
                if self.matches(&answer.content) {
                    JudgeSummary::new(1.0, 1.0, "exact match".to_string())
                } else {
                    JudgeSummary::new(0.0, 1.0, "no match".to_string())
                }
            })
            .collect();

        Outcome::ok(state.with(keys::JUDGE_SCORES, scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Answer;

    #[tokio::test]
    async fn scores_matching_and_non_matching_answers() {
        let unit = ExactMatchUnit::new("m1", "Paris", false);
        let state = State::new().with(
            keys::ANSWERS,
            vec![Answer::new("a1", "paris"), Answer::new("a2", "London")],
        );

        let outcome = unit.execute(&ExecutionContext::new("req"), state).await;
        assert!(outcome.is_ok());
        let scores = outcome.state.get(keys::JUDGE_SCORES).unwrap();
        assert_eq!(scores[0].score, 1.0);
        assert_eq!(scores[1].score, 0.0);
    }

    #[tokio::test]
    async fn case_sensitive_mode_rejects_case_differences() {
        let unit = ExactMatchUnit::new("m1", "Paris", true);
        let state = State::new().with(keys::ANSWERS, vec![Answer::new("a1", "paris")]);
        let outcome = unit.execute(&ExecutionContext::new("req"), state).await;
        let scores = outcome.state.get(keys::JUDGE_SCORES).unwrap();
        assert_eq!(scores[0].score, 0.0);
    }

    #[test]
    fn validate_rejects_empty_expected() {
        let unit = ExactMatchUnit::new("m1", "  ", false);
        assert!(unit.validate().is_err());
    }
}

/// `fuzzy_match`: scores each answer by its normalized Levenshtein
/// similarity to a configured reference string, rather than requiring an
/// exact match. Useful for free-text answers where minor wording
/// differences shouldn't zero out an otherwise-correct response.
pub struct FuzzyMatchUnit {
    id: String,
    expected: String,
    threshold: f64,
}

impl FuzzyMatchUnit {
    pub fn new(id: impl Into<String>, expected: impl Into<String>, threshold: f64) -> Self {
        Self {
            id: id.into(),
            expected: expected.into(),
            threshold,
        }
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let cur = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j - 1])
            };
            prev_diag = cur;
        }
    }
    row[b.len()]
}

fn similarity(a: &str, b: &str) -> f64 {
    let distance = levenshtein(a, b) as f64;
    let max_len = a.chars().count().max(b.chars().count()).max(1) as f64;
    1.0 - (distance / max_len)
}

#[async_trait]
impl Unit for FuzzyMatchUnit {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "fuzzy_match"
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.expected.trim().is_empty() {
            return Err(GavelError::configuration(format!(
                "fuzzy_match '{}' has an empty 'expected' value",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(GavelError::configuration(format!(
                "fuzzy_match '{}' has a threshold outside [0, 1]",
                self.id
            )));
        }
        Ok(())
    }

    async fn execute(&self, _ctx: &ExecutionContext, state: State) -> Outcome {
        let answers = state.get(keys::ANSWERS).unwrap_or_default();
        if answers.is_empty() {
            return Outcome::failed(
                state,
                GavelError::StateContract(format!(
                    "fuzzy_match '{}' requires at least one bound answer",
                    self.id
                )),
            );
        }

        let expected = self.expected.trim().to_lowercase();
        let scores: Vec<JudgeSummary> = answers
            .iter()
            .map(|answer| {
                let sim = similarity(&answer.content.trim().to_lowercase(), &expected);
                JudgeSummary::new(
                    sim,
                    1.0,
                    format!("similarity {:.2} (threshold {:.2})", sim, self.threshold),
                )
            })
            .collect();

        Outcome::ok(state.with(keys::JUDGE_SCORES, scores))
    }
}

#[cfg(test)]
mod fuzzy_tests {
    use super::*;
    use crate::state::Answer;

    #[tokio::test]
    async fn near_match_scores_above_threshold() {
        let unit = FuzzyMatchUnit::new("f1", "Paris", 0.7);
        let state = State::new().with(keys::ANSWERS, vec![Answer::new("a1", "paris!")]);
        let outcome = unit.execute(&ExecutionContext::new("req"), state).await;
        let scores = outcome.state.get(keys::JUDGE_SCORES).unwrap();
        assert!(scores[0].score > 0.7);
    }

    #[tokio::test]
    async fn distant_answer_scores_low() {
        let unit = FuzzyMatchUnit::new("f1", "Paris", 0.7);
        let state = State::new().with(keys::ANSWERS, vec![Answer::new("a1", "completely different text")]);
        let outcome = unit.execute(&ExecutionContext::new("req"), state).await;
        let scores = outcome.state.get(keys::JUDGE_SCORES).unwrap();
        assert!(scores[0].score < 0.3);
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let unit = FuzzyMatchUnit::new("f1", "Paris", 1.5);
        assert!(unit.validate().is_err());
    }
}

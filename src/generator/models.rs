//! Request and response payloads of the question-generation and answer-grading services.

use serde::{Deserialize, Serialize};

use crate::generator::error::{UpstreamError, UpstreamResult};
use crate::state::game::Difficulty;

/// Language used when none is configured.
pub const DEFAULT_LANGUAGE: &str = "Arabic";

/// Input of the question-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub category_name: String,
    pub subcategories: Vec<String>,
    pub difficulty: Difficulty,
    pub language: String,
}

/// Raw output of the question-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl GeneratedQuestion {
    /// Parse a service reply, rejecting non-JSON payloads and blank fields.
    pub fn parse(payload: &str) -> UpstreamResult<Self> {
        let parsed: Self = serde_json::from_str(payload)
            .map_err(|err| UpstreamError::malformed(format!("generation reply: {err}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check the fields the board relies on.
    pub fn validate(&self) -> UpstreamResult<()> {
        if self.question.trim().is_empty() {
            return Err(UpstreamError::malformed("generation reply has an empty question"));
        }
        if self.correct_answer.trim().is_empty() {
            return Err(UpstreamError::malformed(
                "generation reply has an empty correct_answer",
            ));
        }
        Ok(())
    }
}

/// Input of the answer-grading service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
    pub question: String,
    pub correct_answer: String,
    pub user_answer: String,
    pub language: String,
}

/// Output of the answer-grading service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingVerdict {
    pub is_correct: bool,
    pub feedback: String,
    pub similarity: f64,
}

impl GradingVerdict {
    /// Parse a service reply, rejecting non-JSON payloads and out-of-range similarity.
    pub fn parse(payload: &str) -> UpstreamResult<Self> {
        let parsed: Self = serde_json::from_str(payload)
            .map_err(|err| UpstreamError::malformed(format!("grading reply: {err}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Similarity must be a finite number in `[0, 1]`.
    pub fn validate(&self) -> UpstreamResult<()> {
        if !(0.0..=1.0).contains(&self.similarity) {
            return Err(UpstreamError::malformed(format!(
                "grading similarity {} is outside [0, 1]",
                self.similarity
            )));
        }
        Ok(())
    }
}

pub mod error;
#[cfg(feature = "http-client")]
pub mod http;
pub mod models;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;
use uuid::Uuid;

use crate::state::game::{Category, Difficulty, Question};

use self::{
    error::UpstreamResult,
    models::{GeneratedQuestion, GenerationRequest, GradingRequest, GradingVerdict},
};

/// Abstraction over the external question-generation and answer-grading service.
pub trait QuestionService: Send + Sync {
    fn generate_question(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'static, UpstreamResult<GeneratedQuestion>>;
    fn grade_answer(
        &self,
        request: GradingRequest,
    ) -> BoxFuture<'static, UpstreamResult<GradingVerdict>>;
}

/// Issues exactly one upstream request per call and turns replies into board questions.
///
/// No caching and no retries happen here; the question cache owns both concerns.
#[derive(Clone)]
pub struct QuestionGenerationClient {
    service: Arc<dyn QuestionService>,
    language: Arc<str>,
}

impl QuestionGenerationClient {
    /// Wrap a transport, sending prompts in `language`.
    pub fn new(service: Arc<dyn QuestionService>, language: impl Into<Arc<str>>) -> Self {
        Self {
            service,
            language: language.into(),
        }
    }

    /// Language forwarded with every request.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Generate a fresh question for a board cell.
    pub async fn generate(
        &self,
        category: &Category,
        difficulty: Difficulty,
        points: u32,
    ) -> UpstreamResult<Question> {
        let request = GenerationRequest {
            category_name: category.name.clone(),
            subcategories: category.subcategories.clone(),
            difficulty,
            language: self.language.to_string(),
        };

        let generated = self.service.generate_question(request).await?;
        generated.validate()?;

        let question = Question {
            id: Uuid::new_v4().to_string(),
            category_id: category.id.clone(),
            difficulty,
            points,
            prompt_text: generated.question.trim().to_string(),
            correct_answer: generated.correct_answer.trim().to_string(),
            explanation: generated
                .explanation
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            media: None,
        };
        debug!(
            question_id = %question.id,
            category = %category.id,
            %difficulty,
            points,
            "generated question"
        );
        Ok(question)
    }

    /// Grade a player's answer against the reference answer.
    pub async fn grade(&self, question: &Question, answer: &str) -> UpstreamResult<GradingVerdict> {
        let request = GradingRequest {
            question: question.prompt_text.clone(),
            correct_answer: question.correct_answer.clone(),
            user_answer: answer.to_string(),
            language: self.language.to_string(),
        };

        let verdict = self.service.grade_answer(request).await?;
        verdict.validate()?;
        debug!(
            question_id = %question.id,
            is_correct = verdict.is_correct,
            similarity = verdict.similarity,
            "graded answer"
        );
        Ok(verdict)
    }
}

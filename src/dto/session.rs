use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    cache::CacheStats,
    dto::validation::{validate_hex_color, validate_not_blank},
    error::AppError,
    services::session_service::AnswerOutcome,
    state::{
        SessionSnapshot,
        game::{BoardCell, Category, Difficulty, Media, Question, Team, TeamId, default_team_color},
        state_machine::{GamePhase, MAX_CATEGORIES, MIN_CATEGORIES},
    },
};

/// Payload starting a new session.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    /// Team A then team B.
    #[validate(length(equal = 2), nested)]
    pub teams: Vec<TeamInput>,
    /// Board columns, 3 to 6 of them.
    #[validate(length(min = 3, max = 6), nested)]
    pub categories: Vec<CategoryInput>,
}

/// Incoming team registration.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TeamInput {
    /// Team name, unique across both teams.
    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub name: String,
    /// Player names, in roster order.
    #[serde(default)]
    pub players: Vec<String>,
    /// Optional `#RRGGBB` color; each team has a default.
    #[serde(default)]
    #[validate(custom(function = "validate_hex_color"))]
    pub color: Option<String>,
}

/// Incoming board category.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CategoryInput {
    /// Stable category identifier.
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    /// Name sent to the question generator.
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    /// Optional topics narrowing the questions.
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl StartSessionRequest {
    /// Split the payload into the seated teams and the board categories.
    pub fn into_parts(self) -> Result<([Team; 2], Vec<Category>), AppError> {
        let [team_a, team_b]: [TeamInput; 2] = self.teams.try_into().map_err(|teams: Vec<_>| {
            AppError::BadRequest(format!("exactly 2 teams are required, got {}", teams.len()))
        })?;
        if !(MIN_CATEGORIES..=MAX_CATEGORIES).contains(&self.categories.len()) {
            return Err(AppError::BadRequest(format!(
                "between {MIN_CATEGORIES} and {MAX_CATEGORIES} categories are required"
            )));
        }

        let teams = [team_a.into_team(TeamId::TeamA), team_b.into_team(TeamId::TeamB)];
        let categories = self
            .categories
            .into_iter()
            .map(|category| Category {
                id: category.id,
                name: category.name,
                subcategories: category.subcategories,
            })
            .collect();
        Ok((teams, categories))
    }
}

impl TeamInput {
    fn into_team(self, id: TeamId) -> Team {
        let color = self
            .color
            .unwrap_or_else(|| default_team_color(id).to_string());
        Team::new(id, self.name, color).with_players(self.players)
    }
}

/// Board cell chosen by the team on turn.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PickQuestionRequest {
    /// Column of the chosen cell.
    #[validate(length(min = 1))]
    pub category_id: String,
    /// Row of the chosen cell.
    pub points: u32,
}

/// Answer given by the team on turn.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    /// Free-text answer, graded by the question service.
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
}

/// Question as shown to the players; the reference answer stays on the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub category_id: String,
    pub difficulty: Difficulty,
    pub points: u32,
    pub prompt_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            category_id: question.category_id,
            difficulty: question.difficulty,
            points: question.points,
            prompt_text: question.prompt_text,
            media: question.media,
        }
    }
}

/// Public projection of the session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: GamePhase,
    pub teams: IndexMap<TeamId, Team>,
    pub current_team: Option<TeamId>,
    pub selected_categories: Vec<Category>,
    pub current_question: Option<QuestionView>,
    pub used_question_ids: Vec<String>,
    pub used_cells: Vec<BoardCell>,
    pub time_left_seconds: u32,
    pub round_number: u32,
}

impl From<SessionSnapshot> for SessionView {
    fn from(snapshot: SessionSnapshot) -> Self {
        let mut used_question_ids: Vec<String> = snapshot.used_question_ids.into_iter().collect();
        used_question_ids.sort();

        Self {
            phase: snapshot.phase,
            teams: snapshot.teams,
            current_team: snapshot.current_team,
            selected_categories: snapshot.selected_categories,
            current_question: snapshot.current_question.map(Into::into),
            used_question_ids,
            used_cells: snapshot.used_cells,
            time_left_seconds: snapshot.time_left_seconds,
            round_number: snapshot.round_number,
        }
    }
}

/// Grading result returned after an answer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub is_correct: bool,
    pub feedback: String,
    pub similarity: f64,
    pub points_awarded: u32,
    pub team: TeamId,
    pub team_score: u32,
    pub correct_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub phase: GamePhase,
}

impl From<AnswerOutcome> for AnswerResponse {
    fn from(outcome: AnswerOutcome) -> Self {
        Self {
            is_correct: outcome.is_correct,
            feedback: outcome.feedback,
            similarity: outcome.similarity,
            points_awarded: outcome.points_awarded,
            team: outcome.team,
            team_score: outcome.team_score,
            correct_answer: outcome.correct_answer,
            explanation: outcome.explanation,
            phase: outcome.phase,
        }
    }
}

/// Cache statistics exposed to operators.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsResponse {
    pub total_entries: usize,
    pub unused_entries: usize,
    pub per_category_counts: std::collections::BTreeMap<String, usize>,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            total_entries: stats.total_entries,
            unused_entries: stats.unused_entries,
            per_category_counts: stats.per_category_counts,
        }
    }
}

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::session::{
        AnswerResponse, PickQuestionRequest, QuestionView, SessionView, StartSessionRequest,
        SubmitAnswerRequest,
    },
    error::AppError,
    services::session_service,
    state::SharedContext,
};

/// Routes driving the session: lifecycle, board picks and answers.
pub fn router() -> Router<SharedContext> {
    Router::new()
        .route("/session", get(get_session).post(start_session))
        .route("/session/begin", post(begin_game))
        .route("/session/question", post(pick_question))
        .route("/session/answer", post(submit_answer))
        .route("/session/meta/open", post(open_meta))
        .route("/session/meta/close", post(close_meta))
        .route("/session/end", post(end_session))
        .route("/session/reset", post(reset_session))
}

/// Current session, with the active question's answer hidden.
pub async fn get_session(State(context): State<SharedContext>) -> Json<SessionView> {
    Json(session_service::snapshot(&context).await.into())
}

/// Register both teams and the board categories.
pub async fn start_session(
    State(context): State<SharedContext>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<Json<SessionView>, AppError> {
    payload.validate()?;
    let (teams, categories) = payload.into_parts()?;
    let snapshot = session_service::start_session(&context, teams, categories).await?;
    Ok(Json(snapshot.into()))
}

/// Confirm the categories and open the board.
pub async fn begin_game(
    State(context): State<SharedContext>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::begin_game(&context).await?.into()))
}

/// Pick a board cell for the team on turn.
pub async fn pick_question(
    State(context): State<SharedContext>,
    Json(payload): Json<PickQuestionRequest>,
) -> Result<Json<QuestionView>, AppError> {
    payload.validate()?;
    let question =
        session_service::pick_question(&context, &payload.category_id, payload.points).await?;
    Ok(Json(question.into()))
}

/// Grade the answer to the active question.
pub async fn submit_answer(
    State(context): State<SharedContext>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    payload.validate()?;
    let outcome = session_service::submit_answer(&context, &payload.answer).await?;
    Ok(Json(outcome.into()))
}

/// Show the meta screen over the board.
pub async fn open_meta(
    State(context): State<SharedContext>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::open_meta(&context).await?.into()))
}

/// Return from the meta screen to the board.
pub async fn close_meta(
    State(context): State<SharedContext>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::close_meta(&context).await?.into()))
}

/// Stop the session and return its final state.
pub async fn end_session(
    State(context): State<SharedContext>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::end_session(&context).await?.into()))
}

/// Leave the results screen for a new game.
pub async fn reset_session(
    State(context): State<SharedContext>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::reset_session(&context).await?.into()))
}

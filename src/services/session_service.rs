//! Session operations: the only entry points the UI drives the game through.
//!
//! Every mutating operation enters the context's operation gate with a try-lock, so a
//! second call while one is running fails with [`ServiceError::OperationInProgress`].
//! Operations that wait on the network plan their transition first and apply or abort it
//! once the call returns, so a failure never leaves the session half-updated.

use std::{collections::HashSet, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    cache::CacheStats,
    dao::{
        models::check_board_rules,
        snapshot_store::{clear_snapshot, read_snapshot},
    },
    error::ServiceError,
    services::countdown::start_countdown,
    state::{
        SessionSnapshot, SessionStateStore, SharedContext,
        game::{BoardCell, Category, Question, Team, TeamId, time_bonus},
        session::ClosedQuestion,
        state_machine::{
            GameEvent, GamePhase, MAX_CATEGORIES, MIN_CATEGORIES, PlanId, check_team_names,
        },
        timer::display_seconds,
        transitions::{persist_final_snapshot, persist_snapshot, run_transition_with_persist},
    },
};

/// Result of grading the active question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    /// Verdict of the grader.
    pub is_correct: bool,
    /// Grader's comment on the answer.
    pub feedback: String,
    /// Closeness of the answer to the reference, in `[0, 1]`.
    pub similarity: f64,
    /// Points added to the answering team, time bonus included.
    pub points_awarded: u32,
    /// Team that answered.
    pub team: TeamId,
    /// Score of that team after the answer.
    pub team_score: u32,
    /// Reference answer, revealed once the question is closed.
    pub correct_answer: String,
    /// Generator's explanation of the answer.
    pub explanation: Option<String>,
    /// Phase after the question was closed.
    pub phase: GamePhase,
}

/// Replace the current session with a new one for `teams` playing on `categories`.
///
/// The session is left in category selection; a warm-up prefetch for every selected
/// category is started in the background.
pub async fn start_session(
    context: &SharedContext,
    teams: [Team; 2],
    categories: Vec<Category>,
) -> Result<SessionSnapshot, ServiceError> {
    let _gate = context.try_begin_operation()?;

    let names = [teams[0].name.trim().to_string(), teams[1].name.trim().to_string()];
    check_team_names(&names).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    validate_categories(&categories)?;

    let teams = [
        Team {
            id: TeamId::TeamA,
            name: names[0].clone(),
            ..teams[0].clone()
        },
        Team {
            id: TeamId::TeamB,
            name: names[1].clone(),
            ..teams[1].clone()
        },
    ];

    let mut fresh = SessionStateStore::new(context.config().board().clone());
    fresh.transition(GameEvent::Start)?;
    fresh.seat_teams(teams);
    fresh.transition(GameEvent::TeamsValid { names })?;
    fresh.set_selected_categories(categories.clone());

    context.timer().cancel();
    let snapshot = {
        let mut session = context.session().write().await;
        *session = fresh;
        session.snapshot()
    };
    persist_snapshot(context, &snapshot).await;

    spawn_warmup(context, categories);
    info!(
        team_a = %snapshot.teams[&TeamId::TeamA].name,
        team_b = %snapshot.teams[&TeamId::TeamB].name,
        categories = snapshot.selected_categories.len(),
        "session started"
    );
    Ok(snapshot)
}

/// Confirm the categories and open the board with team A to play.
pub async fn begin_game(context: &SharedContext) -> Result<SessionSnapshot, ServiceError> {
    let _gate = context.try_begin_operation()?;

    let count = context.session().read().await.data().selected_categories.len();
    run_transition_with_persist(
        context,
        GameEvent::CategoriesChosen { count },
        || async { Ok(()) },
        |session, ()| session.open_board(TeamId::TeamA),
    )
    .await?;

    Ok(context.snapshot().await)
}

/// Put the question for a board cell on screen and start its countdown.
pub async fn pick_question(
    context: &SharedContext,
    category_id: &str,
    points: u32,
) -> Result<Question, ServiceError> {
    let _gate = context.try_begin_operation()?;

    let category = {
        let session = context.session().read().await;
        check_selection(&session, category_id, points)?
    };

    let cache = context.cache().clone();
    let difficulty = context.config().starting_difficulty();
    let question = run_transition_with_persist(
        context,
        GameEvent::QuestionPicked(BoardCell::new(category.id.clone(), points)),
        || async move {
            cache
                .get_or_generate(&category, difficulty, points)
                .await
                .map_err(ServiceError::GenerationFailure)
        },
        |session, question: Question| {
            session.set_current_question(question.clone());
            question
        },
    )
    .await?;

    let limit = context.config().board().time_limit_secs;
    start_countdown(context, Duration::from_secs(u64::from(limit)));
    info!(
        question_id = %question.id,
        category = %question.category_id,
        points,
        "question picked"
    );
    Ok(question)
}

/// Grade the answer of the team on turn and close the active question.
///
/// When grading fails the question stays active and its countdown resumes with the time
/// that was left.
pub async fn submit_answer(
    context: &SharedContext,
    answer: &str,
) -> Result<AnswerOutcome, ServiceError> {
    let _gate = context.try_begin_operation()?;

    let (question, plan_id) = {
        let mut session = context.session().write().await;
        let question = match (session.phase(), &session.data().current_question) {
            (GamePhase::Question, Some(question)) => question.clone(),
            _ => return Err(ServiceError::NoActiveQuestion),
        };
        if answer.trim().is_empty() {
            return Err(ServiceError::InvalidInput("answer must not be empty".into()));
        }
        let plan = session.plan(GameEvent::AnswerSubmitted)?;
        (question, plan.id)
    };

    let remaining = match context.timer().cancel() {
        Some(remaining) => remaining,
        None => {
            let secs = context.session().read().await.data().time_left_seconds;
            Duration::from_secs(u64::from(secs))
        }
    };
    let time_left = display_seconds(remaining);

    let verdict = match context.client().grade(&question, answer).await {
        Ok(verdict) => verdict,
        Err(err) => {
            {
                let mut session = context.session().write().await;
                abort_plan(&mut session, plan_id);
                session.set_time_left(time_left);
            }
            start_countdown(context, remaining);
            warn!(question_id = %question.id, error = %err, "grading failed; question stays active");
            return Err(ServiceError::GradingFailure(err));
        }
    };

    let limit = context.config().board().time_limit_secs;
    let points_awarded = if verdict.is_correct {
        question.points + time_bonus(time_left, limit)
    } else {
        0
    };

    let (closed, snapshot) = {
        let mut session = context.session().write().await;
        let closed = close_and_settle(context, &mut session, plan_id, points_awarded)?;
        (closed, session.snapshot())
    };
    persist_snapshot(context, &snapshot).await;

    info!(
        question_id = %closed.question.id,
        team = %closed.team,
        is_correct = verdict.is_correct,
        points_awarded,
        time_left,
        "answer graded"
    );
    Ok(AnswerOutcome {
        is_correct: verdict.is_correct,
        feedback: verdict.feedback,
        similarity: verdict.similarity,
        points_awarded,
        team: closed.team,
        team_score: closed.team_score,
        correct_answer: closed.question.correct_answer,
        explanation: closed.question.explanation,
        phase: closed.phase,
    })
}

/// Close the active question with zero points after its countdown ran out.
///
/// Does nothing unless `token` still identifies the running countdown, so a countdown
/// superseded by an answer or a newer pick never records anything.
pub async fn expire_question(context: &SharedContext, token: u64) -> Result<(), ServiceError> {
    let _gate = context.begin_operation().await;
    if !context.timer().finish(token) {
        debug!(token, "stale countdown ignored");
        return Ok(());
    }

    let snapshot = {
        let mut session = context.session().write().await;
        if session.phase() != GamePhase::Question || session.data().current_question.is_none() {
            return Ok(());
        }
        let plan = session.plan(GameEvent::TimerExpired)?;
        let closed = close_and_settle(context, &mut session, plan.id, 0)?;
        info!(question_id = %closed.question.id, team = %closed.team, "question timed out");
        session.snapshot()
    };
    persist_snapshot(context, &snapshot).await;
    Ok(())
}

/// Show the meta screen over the board.
pub async fn open_meta(context: &SharedContext) -> Result<SessionSnapshot, ServiceError> {
    simple_transition(context, GameEvent::MetaOpened).await
}

/// Return from the meta screen to the board.
pub async fn close_meta(context: &SharedContext) -> Result<SessionSnapshot, ServiceError> {
    simple_transition(context, GameEvent::MetaClosed).await
}

/// Stop the session: persist its final snapshot flagged as complete, drop the cache and
/// return to the landing screen. Returns the final snapshot.
pub async fn end_session(context: &SharedContext) -> Result<SessionSnapshot, ServiceError> {
    let _gate = context.try_begin_operation()?;

    context.timer().cancel();
    let last = context.snapshot().await;
    persist_final_snapshot(context, &last).await;

    context.cache().clear();
    context.session().write().await.reset();
    info!(
        team_a = last.score_of(TeamId::TeamA),
        team_b = last.score_of(TeamId::TeamB),
        "session ended"
    );
    Ok(last)
}

/// Leave the results screen for a new game, discarding the cache and the persisted
/// snapshot together with the session.
pub async fn reset_session(context: &SharedContext) -> Result<SessionSnapshot, ServiceError> {
    let _gate = context.try_begin_operation()?;

    let snapshots = context.snapshots();
    context
        .run_transition(
            GameEvent::Reset,
            || async move { clear_snapshot(snapshots).await.map_err(ServiceError::from) },
            |session, ()| session.reset(),
        )
        .await?;
    context.timer().cancel();
    context.cache().clear();

    info!("session reset");
    Ok(context.snapshot().await)
}

/// Restore the persisted session, if a valid one exists.
///
/// An unreadable or structurally invalid snapshot is logged and ignored. A session
/// restored on a question resumes its countdown from the stored time left.
pub async fn restore_if_available(context: &SharedContext) -> Option<SessionSnapshot> {
    let _gate = context.begin_operation().await;

    let loaded = read_snapshot(context.snapshots()).await.and_then(|snapshot| {
        if let Some(snapshot) = &snapshot {
            check_board_rules(snapshot, context.config().board())?;
        }
        Ok(snapshot)
    });
    let snapshot = match loaded {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            debug!("no session snapshot to restore");
            return None;
        }
        Err(err) => {
            warn!(error = %err, "ignoring unusable session snapshot");
            return None;
        }
    };

    context.timer().cancel();
    let restored = {
        let mut session = context.session().write().await;
        session.restore(snapshot);
        session.snapshot()
    };

    if restored.phase == GamePhase::Question {
        start_countdown(
            context,
            Duration::from_secs(u64::from(restored.time_left_seconds)),
        );
    }
    info!(phase = ?restored.phase, round = restored.round_number, "session restored");
    Some(restored)
}

/// Current session state.
pub async fn snapshot(context: &SharedContext) -> SessionSnapshot {
    context.snapshot().await
}

/// Current cache contents.
pub fn cache_stats(context: &SharedContext) -> CacheStats {
    context.cache_stats()
}

async fn simple_transition(
    context: &SharedContext,
    event: GameEvent,
) -> Result<SessionSnapshot, ServiceError> {
    let _gate = context.try_begin_operation()?;
    run_transition_with_persist(context, event, || async { Ok(()) }, |_, ()| ()).await?;
    Ok(context.snapshot().await)
}

fn validate_categories(categories: &[Category]) -> Result<(), ServiceError> {
    if !(MIN_CATEGORIES..=MAX_CATEGORIES).contains(&categories.len()) {
        return Err(ServiceError::InvalidInput(format!(
            "between {MIN_CATEGORIES} and {MAX_CATEGORIES} categories are required, got {}",
            categories.len()
        )));
    }
    if let Some(category) = categories
        .iter()
        .find(|category| category.id.trim().is_empty() || category.name.trim().is_empty())
    {
        return Err(ServiceError::InvalidInput(format!(
            "category `{}` needs an id and a name",
            category.id
        )));
    }
    let mut seen = HashSet::new();
    if let Some(category) = categories
        .iter()
        .find(|category| !seen.insert(category.id.as_str()))
    {
        return Err(ServiceError::InvalidInput(format!(
            "category `{}` selected twice",
            category.id
        )));
    }
    Ok(())
}

fn check_selection(
    session: &SessionStateStore,
    category_id: &str,
    points: u32,
) -> Result<Category, ServiceError> {
    let data = session.data();
    if data.current_team.is_none() {
        return Err(ServiceError::InvalidSelection("no team is on turn".into()));
    }
    let Some(category) = data
        .selected_categories
        .iter()
        .find(|category| category.id == category_id)
    else {
        return Err(ServiceError::InvalidSelection(format!(
            "category `{category_id}` is not on the board"
        )));
    };
    if !session.rules().point_values.contains(&points) {
        return Err(ServiceError::InvalidSelection(format!(
            "{points} is not a board value"
        )));
    }
    if data.is_cell_used(&BoardCell::new(category_id, points)) {
        return Err(ServiceError::InvalidSelection(format!(
            "{category_id}/{points} was already played"
        )));
    }
    Ok(category.clone())
}

/// Close the question under a planned transition, then move to the results when the
/// board is exhausted. Aborts the plan if it cannot be applied.
fn close_and_settle(
    context: &SharedContext,
    session: &mut SessionStateStore,
    plan_id: PlanId,
    awarded: u32,
) -> Result<ClosedQuestion, ServiceError> {
    let mut closed = match session.close_question(plan_id, awarded) {
        Ok(closed) => closed,
        Err(err) => {
            abort_plan(session, plan_id);
            return Err(err.into());
        }
    };
    context.cache().mark_used(&closed.question.id);

    if session.board_complete() {
        closed.phase = session.transition(GameEvent::AllCellsUsed)?;
        info!("every cell played; showing results");
    }
    Ok(closed)
}

fn abort_plan(session: &mut SessionStateStore, plan_id: PlanId) {
    if let Err(err) = session.abort(plan_id) {
        warn!(plan_id = %plan_id, error = ?err, "failed to abort transition");
    }
}

fn spawn_warmup(context: &SharedContext, categories: Vec<Category>) {
    context.cache().spawn_warmup(
        categories,
        vec![context.config().starting_difficulty()],
        context.config().board().point_values.clone(),
    );
}

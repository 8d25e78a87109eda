//! Authoritative session data and the validated transitions applied to it.

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use crate::state::{
    game::{BoardCell, Category, Question, Team, TeamId},
    state_machine::{
        AbortError, ApplyError, GameEvent, GamePhase, GameStateMachine, GuardViolation, Plan,
        PlanError, PlanId,
    },
};

/// Complete copy of the session state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current phase of the session flow.
    pub phase: GamePhase,
    /// Both teams keyed by identifier, in turn order.
    pub teams: IndexMap<TeamId, Team>,
    /// Team whose turn it is, once the board is open.
    pub current_team: Option<TeamId>,
    /// Categories making up the board columns.
    pub selected_categories: Vec<Category>,
    /// Question on screen, if any.
    pub current_question: Option<Question>,
    /// Identifiers of every question already answered or timed out.
    pub used_question_ids: HashSet<String>,
    /// Board cells already played, in play order.
    pub used_cells: Vec<BoardCell>,
    /// Seconds left on the countdown of the current question.
    pub time_left_seconds: u32,
    /// Round counter, incremented each time the turn returns to team A.
    pub round_number: u32,
}

impl SessionSnapshot {
    /// Snapshot of a session that has not started yet.
    pub fn empty() -> Self {
        Self {
            phase: GamePhase::Home,
            teams: IndexMap::new(),
            current_team: None,
            selected_categories: Vec::new(),
            current_question: None,
            used_question_ids: HashSet::new(),
            used_cells: Vec::new(),
            time_left_seconds: 0,
            round_number: 0,
        }
    }

    /// Score of a team, zero when the team is unknown.
    pub fn score_of(&self, team: TeamId) -> u32 {
        self.teams.get(&team).map(|t| t.score).unwrap_or(0)
    }

    /// Whether a board cell has already been played.
    pub fn is_cell_used(&self, cell: &BoardCell) -> bool {
        self.used_cells.contains(cell)
    }
}

/// Board dimensions and countdown length the store validates against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardRules {
    /// Point values available in every category column.
    pub point_values: Vec<u32>,
    /// Countdown length for a question, in seconds.
    pub time_limit_secs: u32,
}

impl Default for BoardRules {
    fn default() -> Self {
        Self {
            point_values: vec![100, 200, 300, 400, 500],
            time_limit_secs: 60,
        }
    }
}

/// Errors produced by [`SessionStateStore::transition`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The transition could not be planned.
    #[error("transition rejected: {0:?}")]
    Plan(PlanError),
    /// The planned transition could not be applied.
    #[error("transition could not be applied: {0:?}")]
    Apply(ApplyError),
}

/// Result of closing the active question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedQuestion {
    /// The question that was on screen.
    pub question: Question,
    /// Team that played the question.
    pub team: TeamId,
    /// Score of that team after the points were applied.
    pub team_score: u32,
    /// Phase reached after the transition.
    pub phase: GamePhase,
}

/// Holds the session snapshot and applies validated transitions to it.
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    rules: BoardRules,
    machine: GameStateMachine,
    data: SessionSnapshot,
}

impl SessionStateStore {
    /// Create an empty store on the landing screen.
    pub fn new(rules: BoardRules) -> Self {
        Self {
            rules,
            machine: GameStateMachine::new(),
            data: SessionSnapshot::empty(),
        }
    }

    /// Board rules the store was built with.
    pub fn rules(&self) -> &BoardRules {
        &self.rules
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.machine.phase()
    }

    /// Whether a transition is planned but not yet applied or aborted.
    pub fn has_pending(&self) -> bool {
        self.machine.pending().is_some()
    }

    /// Read-only copy of the whole session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.machine.phase(),
            ..self.data.clone()
        }
    }

    /// Borrow the session data without copying it. The phase field may lag behind
    /// [`Self::phase`]; use [`Self::snapshot`] when the phase matters.
    pub fn data(&self) -> &SessionSnapshot {
        &self.data
    }

    /// Replace the whole session with a restored snapshot.
    pub fn restore(&mut self, mut snapshot: SessionSnapshot) {
        snapshot.time_left_seconds = snapshot.time_left_seconds.min(self.rules.time_limit_secs);
        self.machine = GameStateMachine::starting_at(snapshot.phase);
        self.data = snapshot;
    }

    /// Drop every piece of session data and go back to the landing screen.
    pub fn reset(&mut self) {
        self.machine = GameStateMachine::new();
        self.data = SessionSnapshot::empty();
    }

    /// Plan a transition after checking the guards that depend on session data.
    pub fn plan(&mut self, event: GameEvent) -> Result<Plan, PlanError> {
        match &event {
            GameEvent::QuestionPicked(cell) if self.data.is_cell_used(cell) => {
                return Err(PlanError::Guard(GuardViolation::CellUsed(cell.clone())));
            }
            GameEvent::AllCellsUsed if !self.board_complete() => {
                return Err(PlanError::Guard(GuardViolation::BoardIncomplete));
            }
            _ => {}
        }
        self.machine.plan(event)
    }

    /// Apply a previously planned transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<GamePhase, ApplyError> {
        let phase = self.machine.apply(plan_id)?;
        self.data.phase = phase;
        Ok(phase)
    }

    /// Abort a previously planned transition.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        self.machine.abort(plan_id)
    }

    /// Plan and apply a transition in one step.
    pub fn transition(&mut self, event: GameEvent) -> Result<GamePhase, TransitionError> {
        let plan = self.plan(event).map_err(TransitionError::Plan)?;
        self.apply(plan.id).map_err(TransitionError::Apply)
    }

    /// Install both teams with zero scores.
    pub fn seat_teams(&mut self, teams: [Team; 2]) {
        self.data.teams = teams
            .into_iter()
            .map(|team| (team.id, Team { score: 0, ..team }))
            .collect();
    }

    /// Install the board categories.
    pub fn set_selected_categories(&mut self, categories: Vec<Category>) {
        self.data.selected_categories = categories;
    }

    /// Hand the turn to `team` and start the first round.
    pub fn open_board(&mut self, team: TeamId) {
        self.data.current_team = Some(team);
        self.data.round_number = 1;
        self.data.time_left_seconds = self.rules.time_limit_secs;
    }

    /// Put a question on screen with a full countdown.
    pub fn set_current_question(&mut self, question: Question) {
        self.data.current_question = Some(question);
        self.data.time_left_seconds = self.rules.time_limit_secs;
    }

    /// Update the countdown value shown to the players.
    pub fn set_time_left(&mut self, seconds: u32) {
        self.data.time_left_seconds = seconds.min(self.rules.time_limit_secs);
    }

    /// Add points to a team's score, returning the new score.
    pub fn apply_score(&mut self, team: TeamId, points: u32) -> Option<u32> {
        let entry = self.data.teams.get_mut(&team)?;
        entry.score = entry.score.saturating_add(points);
        Some(entry.score)
    }

    /// Remember that a question (and its board cell) has been consumed.
    pub fn record_question_used(&mut self, question_id: &str, cell: BoardCell) {
        self.data.used_question_ids.insert(question_id.to_string());
        if !self.data.used_cells.contains(&cell) {
            self.data.used_cells.push(cell);
        }
    }

    /// Pass the turn to the other team. Returns the team now playing.
    pub fn switch_turn(&mut self) -> Option<TeamId> {
        let next = self.data.current_team?.other();
        self.data.current_team = Some(next);
        if next == TeamId::TeamA {
            self.data.round_number += 1;
        }
        Some(next)
    }

    /// Whether every (category, points) cell of the board has been played.
    pub fn board_complete(&self) -> bool {
        if self.data.selected_categories.is_empty() {
            return false;
        }
        self.data.selected_categories.iter().all(|category| {
            self.rules.point_values.iter().all(|points| {
                self.data
                    .is_cell_used(&BoardCell::new(category.id.clone(), *points))
            })
        })
    }

    /// Apply a planned `AnswerSubmitted`/`TimerExpired` transition and record its outcome
    /// in one step: score, used sets, cleared question, next turn.
    ///
    /// Nothing is mutated when the plan cannot be applied.
    pub fn close_question(
        &mut self,
        plan_id: PlanId,
        awarded: u32,
    ) -> Result<ClosedQuestion, ApplyError> {
        let Some(team) = self.data.current_team else {
            return Err(ApplyError::NoPending);
        };
        if self.data.current_question.is_none() {
            return Err(ApplyError::NoPending);
        }

        let phase = self.apply(plan_id)?;
        let question = self
            .data
            .current_question
            .take()
            .ok_or(ApplyError::NoPending)?;

        let team_score = self.apply_score(team, awarded).unwrap_or(0);
        self.record_question_used(&question.id, question.cell());
        self.switch_turn();
        self.data.time_left_seconds = self.rules.time_limit_secs;

        Ok(ClosedQuestion {
            question,
            team,
            team_score,
            phase,
        })
    }
}

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state::game::BoardCell;

/// Fewest categories a board can be built from.
pub const MIN_CATEGORIES: usize = 3;
/// Most categories a board can hold.
pub const MAX_CATEGORIES: usize = 6;

/// High-level phases a session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    /// Landing screen, no session running.
    Home,
    /// Teams are being registered.
    Registration,
    /// Teams are set; the board categories are being chosen.
    CategorySelection,
    /// Board is displayed and the current team picks a cell.
    Game,
    /// A question is on screen and the countdown is running.
    Question,
    /// Side screen reachable from the board (rules, standings).
    Meta,
    /// Every cell has been played; final scores are shown.
    Results,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Leave the landing screen.
    Start,
    /// Both team names were submitted.
    TeamsValid {
        /// Names of team A and team B, in that order.
        names: [String; 2],
    },
    /// The board categories were confirmed.
    CategoriesChosen {
        /// Number of categories selected.
        count: usize,
    },
    /// The current team picked a board cell.
    QuestionPicked(BoardCell),
    /// An answer was graded for the active question.
    AnswerSubmitted,
    /// The countdown ran out for the active question.
    TimerExpired,
    /// Open the meta screen from the board.
    MetaOpened,
    /// Return from the meta screen to the board.
    MetaClosed,
    /// Every cell of the board has been consumed.
    AllCellsUsed,
    /// Go back to the landing screen after the results.
    Reset,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: GamePhase,
    /// The event that cannot be applied from this phase.
    pub event: GameEvent,
}

/// Reasons an otherwise valid transition was refused by its guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    /// A team name is blank.
    #[error("team names must not be empty")]
    EmptyTeamName,
    /// Both teams use the same name.
    #[error("team names must be distinct")]
    DuplicateTeamName,
    /// Category count is outside the allowed range.
    #[error("between {MIN_CATEGORIES} and {MAX_CATEGORIES} categories are required, got {0}")]
    CategoryCount(usize),
    /// The requested board cell was already played.
    #[error("cell {0:?} was already played")]
    CellUsed(BoardCell),
    /// The board still has unplayed cells.
    #[error("board still has unplayed cells")]
    BoardIncomplete,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
    /// The transition exists but its guard rejected the event.
    Guard(GuardViolation),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: GamePhase,
        /// Current phase.
        actual: GamePhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: GamePhase,
    /// Phase the state machine will transition to.
    pub to: GamePhase,
    /// Event that triggered this transition.
    pub event: GameEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// State machine implementing the session flow from registration to results.
#[derive(Debug, Clone)]
pub struct GameStateMachine {
    phase: GamePhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self::starting_at(GamePhase::Home)
    }
}

impl GameStateMachine {
    /// Create a new state machine initialised on the landing screen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state machine resuming at `phase`, used when a snapshot is restored.
    pub fn starting_at(phase: GamePhase) -> Self {
        Self {
            phase,
            version: 0,
            pending: None,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Phase targeted by the pending plan, if any.
    pub fn pending(&self) -> Option<GamePhase> {
        self.pending.as_ref().map(|plan| plan.to)
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: GameEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self.compute_transition(&event)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<GamePhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it, returning the state machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Compute a transition from an event if the transition is valid.
    ///
    /// Guards that only need the event payload are checked here; guards that depend on
    /// session data (played cells) are enforced by the session store before planning.
    fn compute_transition(&self, event: &GameEvent) -> Result<GamePhase, PlanError> {
        let next = match (self.phase, event) {
            (GamePhase::Home, GameEvent::Start) => GamePhase::Registration,
            (GamePhase::Registration, GameEvent::TeamsValid { names }) => {
                check_team_names(names).map_err(PlanError::Guard)?;
                GamePhase::CategorySelection
            }
            (GamePhase::CategorySelection, GameEvent::CategoriesChosen { count }) => {
                if !(MIN_CATEGORIES..=MAX_CATEGORIES).contains(count) {
                    return Err(PlanError::Guard(GuardViolation::CategoryCount(*count)));
                }
                GamePhase::Game
            }
            (GamePhase::Game, GameEvent::QuestionPicked(_)) => GamePhase::Question,
            (GamePhase::Question, GameEvent::AnswerSubmitted | GameEvent::TimerExpired) => {
                GamePhase::Game
            }
            (GamePhase::Game, GameEvent::MetaOpened) => GamePhase::Meta,
            (GamePhase::Meta, GameEvent::MetaClosed) => GamePhase::Game,
            (GamePhase::Game, GameEvent::AllCellsUsed) => GamePhase::Results,
            (GamePhase::Results, GameEvent::Reset) => GamePhase::Home,
            (from, event) => {
                return Err(PlanError::InvalidTransition(InvalidTransition {
                    from,
                    event: event.clone(),
                }));
            }
        };

        Ok(next)
    }
}

/// Team names must be non-empty and distinct, ignoring case and surrounding blanks.
pub fn check_team_names(names: &[String; 2]) -> Result<(), GuardViolation> {
    let [first, second] = names;
    let (first, second) = (first.trim(), second.trim());
    if first.is_empty() || second.is_empty() {
        return Err(GuardViolation::EmptyTeamName);
    }
    if first.to_lowercase() == second.to_lowercase() {
        return Err(GuardViolation::DuplicateTeamName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut GameStateMachine, event: GameEvent) -> GamePhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    fn teams(a: &str, b: &str) -> GameEvent {
        GameEvent::TeamsValid {
            names: [a.to_string(), b.to_string()],
        }
    }

    #[test]
    fn initial_state_is_home() {
        let sm = GameStateMachine::new();
        assert_eq!(sm.phase(), GamePhase::Home);
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut sm = GameStateMachine::new();

        assert_eq!(apply(&mut sm, GameEvent::Start), GamePhase::Registration);
        assert_eq!(
            apply(&mut sm, teams("Team A", "Team B")),
            GamePhase::CategorySelection
        );
        assert_eq!(
            apply(&mut sm, GameEvent::CategoriesChosen { count: 3 }),
            GamePhase::Game
        );
        assert_eq!(
            apply(
                &mut sm,
                GameEvent::QuestionPicked(BoardCell::new("geo", 300))
            ),
            GamePhase::Question
        );
        assert_eq!(apply(&mut sm, GameEvent::AnswerSubmitted), GamePhase::Game);
        assert_eq!(apply(&mut sm, GameEvent::MetaOpened), GamePhase::Meta);
        assert_eq!(apply(&mut sm, GameEvent::MetaClosed), GamePhase::Game);
        assert_eq!(apply(&mut sm, GameEvent::AllCellsUsed), GamePhase::Results);
        assert_eq!(apply(&mut sm, GameEvent::Reset), GamePhase::Home);
        assert_eq!(sm.version(), 9);
    }

    #[test]
    fn timer_expiry_returns_to_board() {
        let mut sm = GameStateMachine::starting_at(GamePhase::Question);
        assert_eq!(apply(&mut sm, GameEvent::TimerExpired), GamePhase::Game);
    }

    #[test]
    fn team_name_guard_rejects_blank_and_duplicate_names() {
        let mut sm = GameStateMachine::starting_at(GamePhase::Registration);

        let err = sm.plan(teams("  ", "Team B")).unwrap_err();
        assert_eq!(err, PlanError::Guard(GuardViolation::EmptyTeamName));

        let err = sm.plan(teams("Falcons", " falcons ")).unwrap_err();
        assert_eq!(err, PlanError::Guard(GuardViolation::DuplicateTeamName));

        assert_eq!(sm.phase(), GamePhase::Registration);
        assert!(sm.pending().is_none());
    }

    #[test]
    fn category_count_guard_enforces_bounds() {
        let mut sm = GameStateMachine::starting_at(GamePhase::CategorySelection);

        for count in [0, 2, 7] {
            let err = sm.plan(GameEvent::CategoriesChosen { count }).unwrap_err();
            assert_eq!(err, PlanError::Guard(GuardViolation::CategoryCount(count)));
        }

        assert_eq!(
            apply(&mut sm, GameEvent::CategoriesChosen { count: 6 }),
            GamePhase::Game
        );
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut sm = GameStateMachine::new();
        let err = sm.plan(GameEvent::AnswerSubmitted).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, GamePhase::Home);
                assert_eq!(invalid.event, GameEvent::AnswerSubmitted);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn results_is_terminal_until_reset() {
        let mut sm = GameStateMachine::starting_at(GamePhase::Results);
        assert!(sm.plan(GameEvent::Start).is_err());
        assert!(
            sm.plan(GameEvent::QuestionPicked(BoardCell::new("geo", 100)))
                .is_err()
        );
        assert_eq!(apply(&mut sm, GameEvent::Reset), GamePhase::Home);
    }

    #[test]
    fn second_plan_while_pending_is_rejected() {
        let mut sm = GameStateMachine::starting_at(GamePhase::Game);
        let plan = sm
            .plan(GameEvent::QuestionPicked(BoardCell::new("geo", 100)))
            .unwrap();
        assert_eq!(
            sm.plan(GameEvent::QuestionPicked(BoardCell::new("geo", 200)))
                .unwrap_err(),
            PlanError::AlreadyPending
        );
        assert_eq!(sm.pending(), Some(GamePhase::Question));
        sm.abort(plan.id).unwrap();
        assert!(sm.pending().is_none());
        assert_eq!(sm.phase(), GamePhase::Game);
    }

    #[test]
    fn apply_with_wrong_plan_id_keeps_pending() {
        let mut sm = GameStateMachine::new();
        let plan = sm.plan(GameEvent::Start).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(sm.apply(plan.id).unwrap(), GamePhase::Registration);
    }
}

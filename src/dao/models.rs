//! Persisted representation of a session snapshot.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    dao::storage::SnapshotError,
    state::{
        game::{BoardCell, Category, Question, Team, TeamId},
        session::{BoardRules, SessionSnapshot},
        state_machine::{GamePhase, MAX_CATEGORIES, MIN_CATEGORIES},
    },
};

/// Fixed storage key the session snapshot is written under.
pub const SNAPSHOT_KEY: &str = "gameState";

/// Wire form of [`SessionSnapshot`]. The used-question set is stored as a sorted sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    /// Phase the session was in.
    pub phase: GamePhase,
    pub teams: IndexMap<TeamId, Team>,
    pub current_team: Option<TeamId>,
    pub selected_categories: Vec<Category>,
    pub current_question: Option<Question>,
    /// Answered or timed-out question ids, sorted.
    pub used_question_ids: Vec<String>,
    pub used_cells: Vec<BoardCell>,
    pub time_left_seconds: u32,
    pub round_number: u32,
    /// Set on the final record of an ended session, which is never restored.
    #[serde(default)]
    pub is_complete: bool,
}

impl From<&SessionSnapshot> for SnapshotDocument {
    fn from(value: &SessionSnapshot) -> Self {
        let mut used_question_ids: Vec<String> =
            value.used_question_ids.iter().cloned().collect();
        used_question_ids.sort();

        Self {
            phase: value.phase,
            teams: value.teams.clone(),
            current_team: value.current_team,
            selected_categories: value.selected_categories.clone(),
            current_question: value.current_question.clone(),
            used_question_ids,
            used_cells: value.used_cells.clone(),
            time_left_seconds: value.time_left_seconds,
            round_number: value.round_number,
            is_complete: false,
        }
    }
}

impl TryFrom<SnapshotDocument> for SessionSnapshot {
    type Error = SnapshotError;

    fn try_from(doc: SnapshotDocument) -> Result<Self, Self::Error> {
        validate(&doc).map_err(SnapshotError::Corrupt)?;

        Ok(Self {
            phase: doc.phase,
            teams: doc.teams,
            current_team: doc.current_team,
            selected_categories: doc.selected_categories,
            current_question: doc.current_question,
            used_question_ids: doc.used_question_ids.into_iter().collect(),
            used_cells: doc.used_cells,
            time_left_seconds: doc.time_left_seconds,
            round_number: doc.round_number,
        })
    }
}

/// Serialize a snapshot for storage.
pub fn encode_snapshot(snapshot: &SessionSnapshot) -> Result<String, SnapshotError> {
    serde_json::to_string(&SnapshotDocument::from(snapshot)).map_err(SnapshotError::Encode)
}

/// Serialize the last snapshot of an ended session, flagged as complete.
pub fn encode_final_snapshot(snapshot: &SessionSnapshot) -> Result<String, SnapshotError> {
    let doc = SnapshotDocument {
        is_complete: true,
        ..SnapshotDocument::from(snapshot)
    };
    serde_json::to_string(&doc).map_err(SnapshotError::Encode)
}

/// Parse a stored snapshot without validating it.
pub fn decode_document(payload: &str) -> Result<SnapshotDocument, SnapshotError> {
    serde_json::from_str(payload)
        .map_err(|err| SnapshotError::Corrupt(format!("invalid JSON: {err}")))
}

/// Parse and validate a stored snapshot.
pub fn decode_snapshot(payload: &str) -> Result<SessionSnapshot, SnapshotError> {
    decode_document(payload)?.try_into()
}

fn board_open(phase: GamePhase) -> bool {
    matches!(
        phase,
        GamePhase::Game | GamePhase::Question | GamePhase::Meta | GamePhase::Results
    )
}

/// Structural checks a restored snapshot must pass before it replaces the session.
fn validate(doc: &SnapshotDocument) -> Result<(), String> {
    for (id, team) in &doc.teams {
        if *id != team.id {
            return Err(format!("team stored under `{id}` claims id `{}`", team.id));
        }
    }

    if !matches!(doc.phase, GamePhase::Home | GamePhase::Registration) {
        for id in TeamId::ALL {
            match doc.teams.get(&id) {
                Some(team) if !team.name.trim().is_empty() => {}
                Some(_) => return Err(format!("team `{id}` has an empty name")),
                None => return Err(format!("team `{id}` is missing")),
            }
        }
    }

    if let Some(current) = doc.current_team {
        if !doc.teams.contains_key(&current) {
            return Err(format!("current team `{current}` is not registered"));
        }
    }

    let category_ids: HashSet<&str> = doc
        .selected_categories
        .iter()
        .map(|category| category.id.as_str())
        .collect();
    if category_ids.len() != doc.selected_categories.len() {
        return Err("duplicate category ids".into());
    }

    if board_open(doc.phase) {
        let count = doc.selected_categories.len();
        if !(MIN_CATEGORIES..=MAX_CATEGORIES).contains(&count) {
            return Err(format!("board has {count} categories"));
        }
        if doc.current_team.is_none() {
            return Err(format!("phase {:?} requires a current team", doc.phase));
        }
    }

    match (&doc.current_question, doc.phase) {
        (Some(question), GamePhase::Question) => {
            if doc.used_question_ids.contains(&question.id) {
                return Err(format!("active question `{}` is already used", question.id));
            }
            if !category_ids.contains(question.category_id.as_str()) {
                return Err(format!(
                    "active question belongs to unknown category `{}`",
                    question.category_id
                ));
            }
            if doc.used_cells.contains(&question.cell()) {
                return Err(format!(
                    "active question sits on played cell {}/{}",
                    question.category_id, question.points
                ));
            }
        }
        (None, GamePhase::Question) => return Err("question phase without a question".into()),
        (Some(_), phase) => return Err(format!("active question while in {phase:?}")),
        (None, _) => {}
    }

    let unique_ids: HashSet<&String> = doc.used_question_ids.iter().collect();
    if unique_ids.len() != doc.used_question_ids.len() {
        return Err("duplicate used question ids".into());
    }

    let unique_cells: HashSet<&BoardCell> = doc.used_cells.iter().collect();
    if unique_cells.len() != doc.used_cells.len() {
        return Err("duplicate used cells".into());
    }
    if doc.used_cells.len() != doc.used_question_ids.len() {
        return Err(format!(
            "{} used cells for {} used questions",
            doc.used_cells.len(),
            doc.used_question_ids.len()
        ));
    }
    if let Some(cell) = doc
        .used_cells
        .iter()
        .find(|cell| !category_ids.contains(cell.category_id.as_str()))
    {
        return Err(format!("used cell references unknown category `{}`", cell.category_id));
    }

    Ok(())
}

/// Check a decoded snapshot against the board it is restored onto: every played cell and
/// the active question must sit on one of the board's point values.
pub fn check_board_rules(
    snapshot: &SessionSnapshot,
    rules: &BoardRules,
) -> Result<(), SnapshotError> {
    let off_board = snapshot
        .used_cells
        .iter()
        .cloned()
        .chain(snapshot.current_question.as_ref().map(Question::cell))
        .find(|cell| !rules.point_values.contains(&cell.points));
    match off_board {
        Some(cell) => Err(SnapshotError::Corrupt(format!(
            "cell {}/{} is not on the board",
            cell.category_id, cell.points
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::Difficulty;

    fn playing_snapshot() -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::empty();
        snapshot.phase = GamePhase::Question;
        snapshot.teams = IndexMap::from([
            (TeamId::TeamA, Team::new(TeamId::TeamA, "Team A", "#4F46E5")),
            (TeamId::TeamB, Team::new(TeamId::TeamB, "Team B", "#E11D48")),
        ]);
        snapshot.current_team = Some(TeamId::TeamB);
        snapshot.selected_categories = vec![
            Category::new("geo", "Geography"),
            Category::new("sci", "Science"),
            Category::new("art", "Art"),
        ];
        snapshot.current_question = Some(Question::new(
            "sci",
            Difficulty::Medium,
            200,
            "Boiling point of water?",
            "100",
        ));
        snapshot.used_question_ids = HashSet::from(["q-2".to_string(), "q-1".to_string()]);
        snapshot.used_cells = vec![BoardCell::new("geo", 100), BoardCell::new("art", 300)];
        snapshot.time_left_seconds = 42;
        snapshot.round_number = 2;
        snapshot
    }

    #[test]
    fn snapshot_survives_encoding() {
        let snapshot = playing_snapshot();
        let encoded = encode_snapshot(&snapshot).unwrap();
        assert_eq!(decode_snapshot(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn used_ids_are_written_as_a_sorted_sequence() {
        let encoded = encode_snapshot(&playing_snapshot()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["usedQuestionIds"], serde_json::json!(["q-1", "q-2"]));
        assert_eq!(value["phase"], "question");
        assert!(value["teams"]["teamA"].is_object());
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let encoded = encode_snapshot(&playing_snapshot()).unwrap();
        let truncated = &encoded[..encoded.len() / 2];
        assert!(matches!(
            decode_snapshot(truncated),
            Err(SnapshotError::Corrupt(_))
        ));
    }

    #[test]
    fn structural_violations_are_corrupt() {
        let mut active_but_used = playing_snapshot();
        let id = active_but_used.current_question.as_ref().unwrap().id.clone();
        active_but_used.used_question_ids.insert(id);
        active_but_used.used_cells.push(BoardCell::new("sci", 200));

        let mut question_phase_without_question = playing_snapshot();
        question_phase_without_question.current_question = None;

        let mut too_few_categories = playing_snapshot();
        too_few_categories.selected_categories.truncate(2);

        let mut unknown_cell = playing_snapshot();
        unknown_cell.used_cells[0] = BoardCell::new("history", 100);

        let mut mismatched_counts = playing_snapshot();
        mismatched_counts.used_cells.pop();

        let mut active_on_played_cell = playing_snapshot();
        active_on_played_cell.used_cells[1] = BoardCell::new("sci", 200);

        for snapshot in [
            active_but_used,
            question_phase_without_question,
            too_few_categories,
            unknown_cell,
            mismatched_counts,
            active_on_played_cell,
        ] {
            let encoded = encode_snapshot(&snapshot).unwrap();
            assert!(
                matches!(decode_snapshot(&encoded), Err(SnapshotError::Corrupt(_))),
                "accepted {snapshot:?}"
            );
        }
    }

    #[test]
    fn cells_off_the_ladder_are_rejected() {
        let rules = BoardRules::default();
        assert!(check_board_rules(&playing_snapshot(), &rules).is_ok());

        let mut odd_cell = playing_snapshot();
        odd_cell.used_cells[0] = BoardCell::new("geo", 250);
        assert!(matches!(
            check_board_rules(&odd_cell, &rules),
            Err(SnapshotError::Corrupt(_))
        ));

        let mut odd_question = playing_snapshot();
        if let Some(question) = odd_question.current_question.as_mut() {
            question.points = 700;
        }
        assert!(check_board_rules(&odd_question, &rules).is_err());
    }

    #[test]
    fn empty_session_is_valid() {
        let encoded = encode_snapshot(&SessionSnapshot::empty()).unwrap();
        assert_eq!(decode_snapshot(&encoded).unwrap(), SessionSnapshot::empty());
    }

    #[test]
    fn team_keyed_under_the_wrong_id_is_corrupt() {
        let payload = serde_json::json!({
            "phase": "home",
            "teams": { "teamA": { "id": "teamB", "name": "x", "color": "#000" } },
            "currentTeam": null,
            "selectedCategories": [],
            "currentQuestion": null,
            "usedQuestionIds": [],
            "usedCells": [],
            "timeLeftSeconds": 0,
            "roundNumber": 0
        });
        assert!(matches!(
            decode_snapshot(&payload.to_string()),
            Err(SnapshotError::Corrupt(_))
        ));
    }
}

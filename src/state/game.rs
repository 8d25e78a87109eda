use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Board category selected by the players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Stable identifier used for board cells and cache keys.
    pub id: String,
    /// Human readable name, forwarded to the question generator.
    pub name: String,
    /// Optional topics narrowing the generated questions.
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl Category {
    /// Build a category without subcategories.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            subcategories: Vec::new(),
        }
    }
}

/// Difficulty requested from the question generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Warm-up questions.
    VeryEasy,
    /// Easy questions.
    Easy,
    /// Default board difficulty.
    Medium,
    /// Hard questions.
    Hard,
    /// Expert questions.
    VeryHard,
}

impl Difficulty {
    /// Wording used when the difficulty is embedded in a generation prompt.
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::VeryEasy => "very easy",
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::VeryHard => "very hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of media attached to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still picture.
    Image,
    /// Video clip.
    Video,
    /// Audio clip.
    Audio,
}

/// Optional media shown alongside a question prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// How the client renders the attachment.
    pub kind: MediaKind,
    /// Location of the attachment.
    pub url: String,
    /// Text shown under the attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// A generated trivia question. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique identifier allocated when the question is generated.
    pub id: String,
    /// Category the question belongs to.
    pub category_id: String,
    /// Difficulty the question was generated for.
    pub difficulty: Difficulty,
    /// Base points awarded for a correct answer.
    pub points: u32,
    /// Text read to the players.
    pub prompt_text: String,
    /// Reference answer used for grading.
    pub correct_answer: String,
    /// Optional explanation returned by the generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Optional media attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
}

impl Question {
    /// Allocate a fresh question with a random identifier.
    pub fn new(
        category_id: impl Into<String>,
        difficulty: Difficulty,
        points: u32,
        prompt_text: impl Into<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category_id: category_id.into(),
            difficulty,
            points,
            prompt_text: prompt_text.into(),
            correct_answer: correct_answer.into(),
            explanation: None,
            media: None,
        }
    }

    /// Board position this question was picked for.
    pub fn cell(&self) -> BoardCell {
        BoardCell::new(self.category_id.clone(), self.points)
    }
}

/// One (category, points) position on the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCell {
    /// Column of the cell.
    pub category_id: String,
    /// Row of the cell, one of the board's point values.
    pub points: u32,
}

impl BoardCell {
    /// Build a board cell.
    pub fn new(category_id: impl Into<String>, points: u32) -> Self {
        Self {
            category_id: category_id.into(),
            points,
        }
    }
}

/// Identifier of one of the two competing teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TeamId {
    /// Team playing first.
    #[serde(rename = "teamA")]
    TeamA,
    /// Team playing second.
    #[serde(rename = "teamB")]
    TeamB,
}

impl TeamId {
    /// Both teams in turn order.
    pub const ALL: [TeamId; 2] = [TeamId::TeamA, TeamId::TeamB];

    /// The opposing team.
    pub fn other(self) -> Self {
        match self {
            TeamId::TeamA => TeamId::TeamB,
            TeamId::TeamB => TeamId::TeamA,
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamId::TeamA => f.write_str("teamA"),
            TeamId::TeamB => f.write_str("teamB"),
        }
    }
}

/// Player listed on a team roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Display name.
    pub name: String,
}

/// A competing team and its running score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Seat of the team on the board.
    pub id: TeamId,
    /// Display name, unique across both teams.
    pub name: String,
    /// Roster, in registration order.
    #[serde(default)]
    pub players: Vec<Player>,
    /// `#RRGGBB` color used by the UI.
    pub color: String,
    /// Points accumulated so far.
    #[serde(default)]
    pub score: u32,
}

impl Team {
    /// Build a team with a zero score.
    pub fn new(id: TeamId, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            players: Vec::new(),
            color: color.into(),
            score: 0,
        }
    }

    /// Builder-style helper attaching the roster.
    pub fn with_players<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.players = names
            .into_iter()
            .map(|name| Player { name: name.into() })
            .collect();
        self
    }
}

/// Default team color used when the client does not provide one.
pub fn default_team_color(id: TeamId) -> &'static str {
    match id {
        TeamId::TeamA => "#4F46E5",
        TeamId::TeamB => "#E11D48",
    }
}

/// Time bonus granted for a correct answer, at most +10 for an instant answer.
pub fn time_bonus(time_left_secs: u32, time_limit_secs: u32) -> u32 {
    if time_limit_secs == 0 {
        return 0;
    }
    let time_left = time_left_secs.min(time_limit_secs);
    10 * time_left / time_limit_secs
}

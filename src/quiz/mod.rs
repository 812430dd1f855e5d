pub mod session;
pub mod shuffle;
pub mod timer;

use std::fmt;

/// How many questions one quiz asks for.
pub const QUESTIONS_PER_QUIZ: u32 = 15;

/// Name recorded on the leaderboard when the player gives none.
pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub text: String,
    pub answers: Vec<Answer>,
}
impl Question {
    pub fn new(text: String, answers: Vec<Answer>) -> Self {
        Self { text, answers }
    }

    /// Position of the correct answer. Matching by position keeps two
    /// answers with the same text apart.
    pub fn correct_index(&self) -> Option<usize> {
        self.answers.iter().position(|a| a.is_correct)
    }

    pub fn correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|a| a.is_correct)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Answer {
    pub text: String,
    pub is_correct: bool,
}
impl Answer {
    pub fn new(text: String, is_correct: bool) -> Self {
        Self { text, is_correct }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    /// No difficulty filter.
    #[default]
    All,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::All,
    ];

    /// Value of the `difficulty` query parameter, `None` when unfiltered.
    pub fn as_query(self) -> Option<&'static str> {
        match self {
            Difficulty::Easy => Some("easy"),
            Difficulty::Medium => Some("medium"),
            Difficulty::Hard => Some("hard"),
            Difficulty::All => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::All => "All",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(label))
    }
}

/// A category as the trivia service lists it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Category {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CategoryChoice {
    #[default]
    Any,
    Specific(Category),
}

impl CategoryChoice {
    /// Key the category's scores are stored under.
    pub fn leaderboard_key(&self) -> String {
        match self {
            CategoryChoice::Any => "any".to_string(),
            CategoryChoice::Specific(category) => category.id.to_string(),
        }
    }

    pub fn id(&self) -> Option<u32> {
        match self {
            CategoryChoice::Any => None,
            CategoryChoice::Specific(category) => Some(category.id),
        }
    }
}

impl fmt::Display for CategoryChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryChoice::Any => f.write_str("All Categories"),
            CategoryChoice::Specific(category) => f.write_str(&category.name),
        }
    }
}

/// What the player picked on the start form.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuizSetup {
    pub player_name: String,
    pub category: CategoryChoice,
    pub difficulty: Difficulty,
}

impl QuizSetup {
    pub fn new(player_name: &str, category: CategoryChoice, difficulty: Difficulty) -> Self {
        Self {
            player_name: normalize_player_name(player_name),
            category,
            difficulty,
        }
    }
}

pub fn normalize_player_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        ANONYMOUS.to_string()
    } else {
        name.to_string()
    }
}

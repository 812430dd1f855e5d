//! Texts and keyboards the bot shows. Nothing in here talks to Telegram.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::leaderboard::LeaderboardEntry;
use crate::quiz::session::{Feedback, QuestionView, QuizSummary, Verdict};
use crate::quiz::timer::Ticket;
use crate::quiz::{Category, CategoryChoice, Difficulty, ANONYMOUS};

pub const ANY_CATEGORY: &str = "Any Category";
pub const NO_QUESTIONS: &str = "No questions found. Try different settings.";
pub const NO_QUESTION_SHOWN: &str = "There is no question on screen. /start begins a new quiz.";
pub const GOODBYE: &str = "Thanks for participating! 👋";
pub const CLEAR_PROMPT: &str = "Are you sure you want to clear the leaderboard?";
pub const CLEARED: &str = "Leaderboard cleared.";

const MEDALS: [&str; 3] = ["🏆", "🥈", "🥉"];
const PROGRESS_CELLS: usize = 10;
const LOW_TIME: u32 = 5;

/// What a pressed inline button asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Answer { ticket: Ticket, option: usize },
    Restart,
    Home,
    Quit,
    ClearAsk,
    ClearConfirm,
    ClearCancel,
    /// Buttons of an already revealed question.
    Noop,
}

impl Action {
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "restart" => Action::Restart,
            "home" => Action::Home,
            "quit" => Action::Quit,
            "clear" => Action::ClearAsk,
            "clear:yes" => Action::ClearConfirm,
            "clear:no" => Action::ClearCancel,
            "noop" => Action::Noop,
            _ => {
                let mut parts = data.strip_prefix("answer:")?.split(':');
                let ticket = parts.next()?.parse().ok()?;
                let option = parts.next()?.parse().ok()?;
                if parts.next().is_some() {
                    return None;
                }
                Action::Answer {
                    ticket: Ticket(ticket),
                    option,
                }
            }
        };
        Some(action)
    }

    pub fn data(&self) -> String {
        match self {
            Action::Answer { ticket, option } => format!("answer:{}:{}", ticket.0, option),
            Action::Restart => "restart".to_string(),
            Action::Home => "home".to_string(),
            Action::Quit => "quit".to_string(),
            Action::ClearAsk => "clear".to_string(),
            Action::ClearConfirm => "clear:yes".to_string(),
            Action::ClearCancel => "clear:no".to_string(),
            Action::Noop => "noop".to_string(),
        }
    }
}

fn button(text: impl Into<String>, action: Action) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.data())
}

pub fn name_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(ANONYMOUS)]])
}

pub fn category_keyboard(categories: &[Category]) -> KeyboardMarkup {
    let mut rows = vec![vec![KeyboardButton::new(ANY_CATEGORY)]];
    rows.extend(
        categories
            .iter()
            .map(|c| vec![KeyboardButton::new(c.name.clone())]),
    );
    KeyboardMarkup::new(rows)
}

/// Matches the text of a category button back to the category.
pub fn pick_category(categories: &[Category], text: &str) -> Option<CategoryChoice> {
    let text = text.trim();
    if text == ANY_CATEGORY {
        return Some(CategoryChoice::Any);
    }
    categories
        .iter()
        .find(|c| c.name == text)
        .cloned()
        .map(CategoryChoice::Specific)
}

pub fn difficulty_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        Difficulty::ALL
            .iter()
            .map(|d| KeyboardButton::new(d.label()))
            .collect::<Vec<_>>(),
    ])
}

pub fn progress_bar(number: usize, total: usize) -> String {
    let filled = if total == 0 {
        0
    } else {
        (number * PROGRESS_CELLS / total).min(PROGRESS_CELLS)
    };
    format!(
        "{}{}",
        "▰".repeat(filled),
        "▱".repeat(PROGRESS_CELLS - filled)
    )
}

pub fn countdown(remaining: u32) -> String {
    if remaining <= LOW_TIME {
        format!("⚠️ {remaining}s")
    } else {
        format!("⏳ {remaining}s")
    }
}

/// Whether a tick is worth an edit of the question message.
pub fn shows_tick(remaining: u32) -> bool {
    remaining <= LOW_TIME || remaining % 5 == 0
}

pub fn question_text(view: &QuestionView, remaining: u32) -> String {
    format!(
        "Question {}/{}  {}\n\n{}\n\nScore: {}   {}",
        view.number,
        view.total,
        progress_bar(view.number, view.total),
        view.text,
        view.score,
        countdown(remaining),
    )
}

pub fn question_keyboard(view: &QuestionView) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(view.options.iter().enumerate().map(|(option, text)| {
        vec![button(
            text.clone(),
            Action::Answer {
                ticket: view.ticket,
                option,
            },
        )]
    }))
}

/// The question's options after the reveal: correct one marked, the wrong
/// pick marked, nothing clickable any more.
pub fn revealed_keyboard(view: &QuestionView, feedback: &Feedback) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(view.options.iter().enumerate().map(|(option, text)| {
        let label = if option == feedback.correct {
            format!("✅ {text}")
        } else if Some(option) == feedback.selected {
            format!("❌ {text}")
        } else {
            text.clone()
        };
        vec![button(label, Action::Noop)]
    }))
}

pub fn feedback_text(feedback: &Feedback) -> String {
    match feedback.verdict {
        Verdict::Correct => format!("✅ Correct! 🎊🎉🎊  Score: {}", feedback.score),
        Verdict::Wrong => format!(
            "❌ Wrong! The answer was: {}\nScore: {}",
            feedback.correct_text, feedback.score
        ),
        Verdict::TimedOut => format!(
            "⏰ Time's up! The answer was: {}\nScore: {}",
            feedback.correct_text, feedback.score
        ),
    }
}

pub fn leaderboard_text(category: &CategoryChoice, entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "No scores yet.".to_string();
    }
    let mut text = format!("{category}:");
    for (index, entry) in entries.iter().enumerate() {
        let medal = MEDALS.get(index).copied().unwrap_or("");
        text.push_str(&format!(
            "\n{} {}. {} - {} pts",
            medal,
            index + 1,
            entry.name,
            entry.score
        ));
    }
    text
}

pub fn summary_text(summary: &QuizSummary) -> String {
    let note = if summary.well_done() {
        "🎉 Well done!"
    } else {
        "💡 Better luck next time!"
    };
    format!(
        "🎉 Quiz Completed!\nFinal Score: {}/{}\n{}\n\n🏅 Leaderboard\n{}",
        summary.score,
        summary.total,
        note,
        leaderboard_text(&summary.category, &summary.leaderboard)
    )
}

pub fn summary_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("🔁 Restart", Action::Restart),
            button("🏠 Home", Action::Home),
            button("👋 Quit", Action::Quit),
        ],
        vec![button("🗑️ Clear Leaderboard", Action::ClearAsk)],
    ])
}

pub fn clear_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("Yes, clear it", Action::ClearConfirm),
        button("No", Action::ClearCancel),
    ]])
}

pub fn sound_text(sound_on: bool) -> &'static str {
    if sound_on {
        "🔊 Sound On"
    } else {
        "🔇 Sound Off"
    }
}

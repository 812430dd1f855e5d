//! One quiz table per chat: glues the question source, the quiz session and
//! its countdown to the chat messages.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};

use teloxide::prelude::*;
use teloxide::types::MessageId;
use teloxide::RequestError;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;

use crate::leaderboard::{Leaderboard, StorageError};
use crate::quiz::session::{Feedback, Phase, QuestionView, QuizError, QuizSession, Step};
use crate::quiz::timer::{Countdown, Ticket, TimerEvent, TimerSink};
use crate::quiz::{Category, CategoryChoice, QuizSetup, QUESTIONS_PER_QUIZ};
use crate::trivia::{OpenTdb, SourceError};
use crate::ui;

#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Telegram(#[from] RequestError),
}

struct Table {
    session: QuizSession,
    sound_on: bool,
    /// The message showing the current question and its buttons.
    question: Option<(MessageId, QuestionView)>,
}

pub struct GameHub {
    bot: Bot,
    source: OpenTdb,
    leaderboard: Arc<Leaderboard>,
    tables: std::sync::Mutex<HashMap<ChatId, Arc<Mutex<Table>>>>,
    this: Weak<GameHub>,
}

impl GameHub {
    pub fn new(bot: Bot, source: OpenTdb, leaderboard: Arc<Leaderboard>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            bot,
            source,
            leaderboard,
            tables: std::sync::Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    /// Categories for the start form. A failure leaves only "Any Category".
    pub async fn categories(&self) -> Vec<Category> {
        match self.source.fetch_categories().await {
            Ok(categories) => categories,
            Err(err) => {
                log::warn!("Could not load categories: {}", err);
                Vec::new()
            }
        }
    }

    /// Fetches questions and shows the first one. Fails with
    /// `QuizError::EmptyResultSet` when nothing matched, and with
    /// `QuizError::Stale` when the chat moved on while the fetch was running.
    pub async fn start(&self, chat: ChatId, setup: QuizSetup) -> Result<(), GameError> {
        let table = self.table(chat);
        let ticket = table.lock().await.session.prepare(setup.clone());
        log::info!(
            "Chat {} starts a quiz: {} / {:?}",
            chat.0,
            setup.category,
            setup.difficulty
        );

        let questions = self
            .source
            .fetch_questions(&setup.category, setup.difficulty, QUESTIONS_PER_QUIZ)
            .await?;

        let mut table = table.lock().await;
        let view = table.session.begin(ticket, questions)?;
        self.show_question(chat, &mut table, view).await
    }

    pub async fn answer(
        &self,
        chat: ChatId,
        ticket: Ticket,
        option: usize,
    ) -> Result<(), GameError> {
        let table = self.table(chat);
        let mut table = table.lock().await;
        if table.session.ticket() != ticket {
            return Err(QuizError::Stale.into());
        }
        let feedback = table.session.submit_option(option)?;
        self.reveal(chat, &mut table, feedback).await
    }

    /// Answer typed out instead of tapped. Text that isn't one of the options
    /// is not taken as an answer.
    pub async fn answer_text(&self, chat: ChatId, text: &str) -> Result<(), GameError> {
        let table = self.table(chat);
        let mut table = table.lock().await;
        if table.session.phase() != Phase::InProgress {
            return Err(QuizError::NotInProgress.into());
        }
        let text = text.trim();
        let is_option = table
            .session
            .current_view()
            .is_some_and(|view| view.options.iter().any(|option| option == text));
        if !is_option {
            return Err(QuizError::NotAnswerable.into());
        }
        let feedback = table.session.submit_answer(text)?;
        self.reveal(chat, &mut table, feedback).await
    }

    /// The "next" button: leaves the current question unanswered.
    pub async fn skip(&self, chat: ChatId) -> Result<(), GameError> {
        let table = self.table(chat);
        let mut table = table.lock().await;
        let step = off_worker(|| table.session.advance())?;
        self.show_step(chat, &mut table, step).await
    }

    /// Drops the chat's quiz, if any.
    pub async fn reset(&self, chat: ChatId) {
        let table = self.table(chat);
        let mut table = table.lock().await;
        table.session.reset();
        table.question = None;
    }

    /// The chat stopped playing: its quiz and countdown go away entirely.
    pub async fn leave(&self, chat: ChatId) {
        let table = self
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chat);
        if let Some(table) = table {
            table.lock().await.session.reset();
            log::debug!("Chat {} left the table", chat.0);
        }
    }

    pub async fn toggle_sound(&self, chat: ChatId) -> bool {
        let table = self.table(chat);
        let mut table = table.lock().await;
        table.sound_on = !table.sound_on;
        table.sound_on
    }

    pub fn leaderboard_text(&self, category: &CategoryChoice) -> String {
        ui::leaderboard_text(category, &self.leaderboard.get(&category.leaderboard_key()))
    }

    pub fn clear_leaderboard(&self) -> Result<(), GameError> {
        Ok(self.leaderboard.clear()?)
    }

    fn table(&self, chat: ChatId) -> Arc<Mutex<Table>> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(chat)
            .or_insert_with(|| {
                let countdown = Countdown::new(self.timer_sink(chat));
                Arc::new(Mutex::new(Table {
                    session: QuizSession::new(Box::new(countdown), self.leaderboard.clone()),
                    sound_on: true,
                    question: None,
                }))
            })
            .clone()
    }

    /// Background events must not bring back a table the chat has left.
    fn existing_table(&self, chat: ChatId) -> Option<Arc<Mutex<Table>>> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat)
            .cloned()
    }

    fn timer_sink(&self, chat: ChatId) -> TimerSink {
        let hub = self.this.clone();
        Arc::new(move |event| {
            let Some(hub) = hub.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                if let Err(err) = hub.on_timer(chat, event).await {
                    log::error!("Timer event in chat {} failed: {}", chat.0, err);
                }
            });
        })
    }

    async fn on_timer(&self, chat: ChatId, event: TimerEvent) -> Result<(), GameError> {
        let Some(table) = self.existing_table(chat) else {
            return Ok(());
        };
        let mut table = table.lock().await;
        match event {
            TimerEvent::Tick { ticket, remaining } => {
                let current = table.session.tick(ticket, remaining).is_some();
                if !current || !ui::shows_tick(remaining) {
                    return Ok(());
                }
                if let Some((message, view)) = &table.question {
                    self.bot
                        .edit_message_text(chat, *message, ui::question_text(view, remaining))
                        .reply_markup(ui::question_keyboard(view))
                        .await?;
                }
                Ok(())
            }
            TimerEvent::Expired { ticket } => match table.session.expire(ticket) {
                Some(feedback) => self.reveal(chat, &mut table, feedback).await,
                None => Ok(()),
            },
        }
    }

    /// Shows the outcome of a question. The advance is scheduled first, so a
    /// failed message edit can't leave the quiz stuck on a revealed question.
    async fn reveal(
        &self,
        chat: ChatId,
        table: &mut Table,
        feedback: Feedback,
    ) -> Result<(), GameError> {
        let hub = self.this.clone();
        let ticket = feedback.ticket;
        let delay = feedback.advance_in;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(hub) = hub.upgrade() else {
                return;
            };
            match hub.advance_after_feedback(chat, ticket).await {
                Ok(()) | Err(GameError::Quiz(QuizError::Stale)) => {}
                Err(err) => log::error!("Advancing chat {} failed: {}", chat.0, err),
            }
        });

        let remaining = table.session.remaining();
        if let Some((message, view)) = &table.question {
            self.bot
                .edit_message_text(chat, *message, ui::question_text(view, remaining))
                .reply_markup(ui::revealed_keyboard(view, &feedback))
                .await?;
        }
        self.bot
            .send_message(chat, ui::feedback_text(&feedback))
            .disable_notification(!table.sound_on)
            .await?;
        Ok(())
    }

    async fn advance_after_feedback(
        &self,
        chat: ChatId,
        ticket: Ticket,
    ) -> Result<(), GameError> {
        let Some(table) = self.existing_table(chat) else {
            return Ok(());
        };
        let mut table = table.lock().await;
        let step = off_worker(|| table.session.advance_from(ticket))?;
        self.show_step(chat, &mut table, step).await
    }

    async fn show_step(
        &self,
        chat: ChatId,
        table: &mut Table,
        step: Step,
    ) -> Result<(), GameError> {
        match step {
            Step::Question(view) => self.show_question(chat, table, view).await,
            Step::Completed(summary) => {
                table.question = None;
                self.bot
                    .send_message(chat, ui::summary_text(&summary))
                    .reply_markup(ui::summary_keyboard())
                    .await?;
                Ok(())
            }
        }
    }

    async fn show_question(
        &self,
        chat: ChatId,
        table: &mut Table,
        view: QuestionView,
    ) -> Result<(), GameError> {
        // Until the new message is out, nothing should edit the previous one
        table.question = None;
        let message = self
            .bot
            .send_message(chat, ui::question_text(&view, view.seconds))
            .reply_markup(ui::question_keyboard(&view))
            .await?;
        table.question = Some((message.id, view));
        Ok(())
    }
}

/// Completing a quiz writes the leaderboard file. On the multi-threaded
/// runtime the worker is handed over while that happens.
fn off_worker<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    use reqwest::Url;

    use crate::quiz::{Answer, Category, Difficulty, Question};

    const CHAT: ChatId = ChatId(42);

    // Nothing listens on the discard port, so every Telegram call fails fast
    fn offline_url() -> Url {
        Url::parse("http://127.0.0.1:9/").unwrap()
    }

    fn hub_with_source(source: Url) -> Arc<GameHub> {
        let bot = Bot::new("123456:TEST").set_api_url(offline_url());
        let source = OpenTdb::new(source).unwrap();
        GameHub::new(bot, source, Arc::new(Leaderboard::in_memory()))
    }

    fn hub() -> Arc<GameHub> {
        hub_with_source(offline_url())
    }

    fn question(n: usize) -> Question {
        Question::new(
            format!("Question {n}?"),
            vec![
                Answer::new(format!("right {n}"), true),
                Answer::new(format!("wrong {n}a"), false),
                Answer::new(format!("wrong {n}b"), false),
                Answer::new(format!("wrong {n}c"), false),
            ],
        )
    }

    fn setup() -> QuizSetup {
        QuizSetup::new(
            "Ada",
            CategoryChoice::Specific(Category {
                id: 9,
                name: "General Knowledge".to_string(),
            }),
            Difficulty::Easy,
        )
    }

    /// Starts a quiz of `n` questions without going through the question
    /// source and returns the ticket of the first question.
    async fn seat(hub: &GameHub, n: usize) -> Ticket {
        let table = hub.table(CHAT);
        let mut table = table.lock().await;
        table
            .session
            .start(setup(), (0..n).map(question).collect())
            .unwrap();
        table.session.ticket()
    }

    async fn snapshot(hub: &GameHub) -> (Phase, usize, bool) {
        let table = hub.table(CHAT);
        let table = table.lock().await;
        (
            table.session.phase(),
            table.session.current_index(),
            table.session.is_revealed(),
        )
    }

    /// Answers one request for questions after `delay`, like a slow API.
    fn slow_question_source(delay: Duration) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request);
            std::thread::sleep(delay);
            let body = r#"{"response_code":0,"results":[{"question":"Q?","correct_answer":"A","incorrect_answers":["B","C","D"]}]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        });
        Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap()
    }

    #[tokio::test]
    async fn expiry_advances_even_when_telegram_fails() {
        let hub = hub();
        let ticket = seat(&hub, 2).await;

        let result = hub.on_timer(CHAT, TimerEvent::Expired { ticket }).await;
        assert!(matches!(result, Err(GameError::Telegram(_))));
        assert_eq!(snapshot(&hub).await, (Phase::InProgress, 0, true));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(snapshot(&hub).await, (Phase::InProgress, 1, false));
    }

    #[tokio::test]
    async fn answering_the_last_question_completes_and_records() {
        let hub = hub();
        let ticket = seat(&hub, 1).await;

        let _ = hub.answer(CHAT, ticket, 0).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let (phase, _, _) = snapshot(&hub).await;
        assert_eq!(phase, Phase::Completed);
        let top = hub.leaderboard.get("9");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "Ada");
        assert_eq!(top[0].score, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn completion_on_the_threaded_runtime() {
        let hub = hub();
        let ticket = seat(&hub, 1).await;

        let _ = hub.answer(CHAT, ticket, 1).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(snapshot(&hub).await.0, Phase::Completed);
        assert_eq!(hub.leaderboard.get("9")[0].score, 0);
    }

    #[tokio::test]
    async fn delayed_advance_after_reset_is_dropped() {
        let hub = hub();
        let ticket = seat(&hub, 3).await;

        let _ = hub.answer(CHAT, ticket, 0).await;
        hub.reset(CHAT).await;
        seat(&hub, 3).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(snapshot(&hub).await, (Phase::InProgress, 0, false));
    }

    #[tokio::test]
    async fn buttons_of_an_earlier_question_are_stale() {
        let hub = hub();
        let first = seat(&hub, 3).await;
        let _ = hub.skip(CHAT).await;

        assert!(matches!(
            hub.answer(CHAT, first, 0).await,
            Err(GameError::Quiz(QuizError::Stale))
        ));
        assert_eq!(snapshot(&hub).await, (Phase::InProgress, 1, false));
    }

    #[tokio::test]
    async fn reset_during_the_fetch_makes_start_stale() {
        let hub = hub_with_source(slow_question_source(Duration::from_millis(500)));

        let starting = tokio::spawn({
            let hub = hub.clone();
            async move { hub.start(CHAT, setup()).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        hub.reset(CHAT).await;

        let result = starting.await.unwrap();
        assert!(matches!(result, Err(GameError::Quiz(QuizError::Stale))));
        assert_eq!(snapshot(&hub).await.0, Phase::Idle);
    }

    #[tokio::test]
    async fn typed_text_after_completion_is_not_an_answer() {
        let hub = hub();
        seat(&hub, 1).await;
        let _ = hub.skip(CHAT).await;
        assert_eq!(snapshot(&hub).await.0, Phase::Completed);

        assert!(matches!(
            hub.answer_text(CHAT, "right 0").await,
            Err(GameError::Quiz(QuizError::NotInProgress))
        ));
    }

    #[tokio::test]
    async fn typed_option_is_judged() {
        let hub = hub();
        seat(&hub, 2).await;

        assert!(matches!(
            hub.answer_text(CHAT, "something else").await,
            Err(GameError::Quiz(QuizError::NotAnswerable))
        ));
        let _ = hub.answer_text(CHAT, " right 0 ").await;
        assert_eq!(snapshot(&hub).await, (Phase::InProgress, 0, true));
    }

    #[tokio::test]
    async fn leaving_drops_the_table_for_good() {
        let hub = hub();
        let ticket = seat(&hub, 2).await;
        let _ = hub.answer(CHAT, ticket, 0).await;

        hub.leave(CHAT).await;
        assert!(hub.existing_table(CHAT).is_none());

        // The advance scheduled by the answer finds nothing to bring back
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(hub.existing_table(CHAT).is_none());
    }
}

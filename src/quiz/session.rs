use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::leaderboard::{Leaderboard, LeaderboardEntry};
use crate::quiz::timer::{QuestionTimer, Ticket};
use crate::quiz::{CategoryChoice, Question, QuizSetup};

pub const SECONDS_PER_QUESTION: u32 = 15;

/// Pause after an answer before the next question shows up.
pub const ANSWER_ADVANCE_DELAY: Duration = Duration::from_millis(1200);

/// Pause after the timer ran out and the answer was revealed.
pub const REVEAL_ADVANCE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("no questions found for these settings")]
    EmptyResultSet,

    #[error("this request was superseded")]
    Stale,

    #[error("the current question can't be answered")]
    NotAnswerable,

    #[error("no quiz is in progress")]
    NotInProgress,

    #[error("question has no option #{0}")]
    UnknownOption(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Wrong,
    TimedOut,
}

/// Snapshot of the question on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub ticket: Ticket,
    /// 1-based.
    pub number: usize,
    pub total: usize,
    pub text: String,
    pub options: Vec<String>,
    pub score: u32,
    pub seconds: u32,
}

/// Outcome of an answer or of the timer running out. The question is revealed
/// from here on and `advance_from(ticket)` is due after `advance_in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub ticket: Ticket,
    pub verdict: Verdict,
    pub selected: Option<usize>,
    pub correct: usize,
    pub correct_text: String,
    pub score: u32,
    pub advance_in: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSummary {
    pub player_name: String,
    pub category: CategoryChoice,
    pub score: u32,
    pub total: usize,
    /// The category's leaderboard after this score was recorded.
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl QuizSummary {
    pub fn well_done(&self) -> bool {
        // Same threshold as `score < total / 2` on real numbers
        (self.score as usize) * 2 >= self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Question(QuestionView),
    Completed(QuizSummary),
}

/// One player's quiz: question list, position, score and the countdown of
/// the question on screen.
pub struct QuizSession {
    setup: Option<QuizSetup>,
    questions: Vec<Question>,
    current: usize,
    score: u32,
    phase: Phase,
    revealed: bool,
    remaining: u32,
    epoch: u64,
    pending: Option<Ticket>,
    timer: Box<dyn QuestionTimer + Send + Sync>,
    leaderboard: Arc<Leaderboard>,
}

impl QuizSession {
    pub fn new(timer: Box<dyn QuestionTimer + Send + Sync>, leaderboard: Arc<Leaderboard>) -> Self {
        Self {
            setup: None,
            questions: Vec::new(),
            current: 0,
            score: 0,
            phase: Phase::Idle,
            revealed: false,
            remaining: 0,
            epoch: 0,
            pending: None,
            timer,
            leaderboard,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn setup(&self) -> Option<&QuizSetup> {
        self.setup.as_ref()
    }

    pub fn ticket(&self) -> Ticket {
        Ticket(self.epoch)
    }

    /// Seconds left on the current question as of the last tick.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn current_view(&self) -> Option<QuestionView> {
        if self.phase != Phase::InProgress {
            return None;
        }
        let question = self.questions.get(self.current)?;
        Some(QuestionView {
            ticket: self.ticket(),
            number: self.current + 1,
            total: self.questions.len(),
            text: question.text.clone(),
            options: question.answers.iter().map(|a| a.text.clone()).collect(),
            score: self.score,
            seconds: self.remaining,
        })
    }

    /// Drops whatever was going on and reserves a ticket for fetching the
    /// questions of a new quiz.
    pub fn prepare(&mut self, setup: QuizSetup) -> Ticket {
        self.reset();
        self.setup = Some(setup);
        let ticket = self.ticket();
        self.pending = Some(ticket);
        ticket
    }

    /// Starts the quiz prepared under `ticket` with the fetched questions.
    pub fn begin(
        &mut self,
        ticket: Ticket,
        questions: Vec<Question>,
    ) -> Result<QuestionView, QuizError> {
        if self.phase != Phase::Idle || self.pending != Some(ticket) {
            return Err(QuizError::Stale);
        }
        self.pending = None;

        if questions.is_empty() {
            return Err(QuizError::EmptyResultSet);
        }

        self.questions = questions;
        self.current = 0;
        self.score = 0;
        self.phase = Phase::InProgress;
        log::debug!("Quiz started with {} questions", self.questions.len());
        Ok(self.present())
    }

    pub fn start(
        &mut self,
        setup: QuizSetup,
        questions: Vec<Question>,
    ) -> Result<QuestionView, QuizError> {
        let ticket = self.prepare(setup);
        self.begin(ticket, questions)
    }

    /// Judges the answer by its text.
    pub fn submit_answer(&mut self, selected: &str) -> Result<Feedback, QuizError> {
        let question = self.answerable()?;
        let position = question.answers.iter().position(|a| a.text == selected);
        let correct = question
            .correct_answer()
            .is_some_and(|answer| answer.text == selected);
        Ok(self.judge(position, correct))
    }

    /// Judges the answer by its position among the options.
    pub fn submit_option(&mut self, option: usize) -> Result<Feedback, QuizError> {
        let question = self.answerable()?;
        let answer = question
            .answers
            .get(option)
            .ok_or(QuizError::UnknownOption(option))?;
        let correct = answer.is_correct;
        Ok(self.judge(Some(option), correct))
    }

    /// The countdown of `ticket` reached zero: reveal the correct answer.
    pub fn expire(&mut self, ticket: Ticket) -> Option<Feedback> {
        if ticket != self.ticket() || self.answerable().is_err() {
            return None;
        }
        self.timer.stop();
        self.revealed = true;
        self.remaining = 0;
        let (correct, correct_text) = self.correct_option();
        Some(Feedback {
            ticket,
            verdict: Verdict::TimedOut,
            selected: None,
            correct,
            correct_text,
            score: self.score,
            advance_in: REVEAL_ADVANCE_DELAY,
        })
    }

    /// Records a countdown tick; `None` if it belongs to another question.
    pub fn tick(&mut self, ticket: Ticket, remaining: u32) -> Option<u32> {
        if ticket != self.ticket() || self.answerable().is_err() {
            return None;
        }
        self.remaining = remaining;
        Some(remaining)
    }

    /// Moves to the next question, or completes the quiz after the last one.
    pub fn advance(&mut self) -> Result<Step, QuizError> {
        if self.phase != Phase::InProgress {
            return Err(QuizError::NotInProgress);
        }
        self.timer.stop();
        self.current += 1;

        if self.current < self.questions.len() {
            return Ok(Step::Question(self.present()));
        }

        self.phase = Phase::Completed;
        self.epoch += 1;
        Ok(Step::Completed(self.finish()))
    }

    /// The advance scheduled after feedback for `ticket`.
    pub fn advance_from(&mut self, ticket: Ticket) -> Result<Step, QuizError> {
        if ticket != self.ticket() || self.phase != Phase::InProgress || !self.revealed {
            return Err(QuizError::Stale);
        }
        self.advance()
    }

    /// Back to idle from anywhere. Outstanding tickets become stale.
    pub fn reset(&mut self) {
        self.timer.stop();
        self.setup = None;
        self.questions.clear();
        self.current = 0;
        self.score = 0;
        self.phase = Phase::Idle;
        self.revealed = false;
        self.remaining = 0;
        self.pending = None;
        self.epoch += 1;
    }

    fn present(&mut self) -> QuestionView {
        self.epoch += 1;
        self.revealed = false;
        self.remaining = SECONDS_PER_QUESTION;
        self.timer.start(SECONDS_PER_QUESTION, self.ticket());
        // Callers only present while current < questions.len()
        self.current_view().unwrap_or_else(|| QuestionView {
            ticket: self.ticket(),
            number: self.current + 1,
            total: self.questions.len(),
            text: String::new(),
            options: Vec::new(),
            score: self.score,
            seconds: SECONDS_PER_QUESTION,
        })
    }

    fn answerable(&self) -> Result<&Question, QuizError> {
        if self.phase != Phase::InProgress || self.revealed {
            return Err(QuizError::NotAnswerable);
        }
        self.questions.get(self.current).ok_or(QuizError::NotAnswerable)
    }

    fn correct_option(&self) -> (usize, String) {
        self.questions
            .get(self.current)
            .and_then(|q| {
                let index = q.correct_index()?;
                Some((index, q.answers[index].text.clone()))
            })
            .unwrap_or_default()
    }

    fn judge(&mut self, selected: Option<usize>, correct: bool) -> Feedback {
        self.timer.stop();
        self.revealed = true;
        let verdict = if correct {
            self.score += 1;
            Verdict::Correct
        } else {
            Verdict::Wrong
        };
        let (correct_index, correct_text) = self.correct_option();
        Feedback {
            ticket: self.ticket(),
            verdict,
            selected,
            correct: correct_index,
            correct_text,
            score: self.score,
            advance_in: ANSWER_ADVANCE_DELAY,
        }
    }

    fn finish(&mut self) -> QuizSummary {
        let setup = self
            .setup
            .clone()
            .unwrap_or_else(|| QuizSetup::new("", CategoryChoice::Any, Default::default()));
        let entry = LeaderboardEntry::new(setup.player_name.clone(), self.score);
        let leaderboard = match self
            .leaderboard
            .record(&setup.category.leaderboard_key(), entry)
        {
            Ok(top) => top,
            Err(err) => {
                log::warn!("Score not saved: {}", err);
                Vec::new()
            }
        };
        log::info!(
            "{} finished with {}/{}",
            setup.player_name,
            self.score,
            self.questions.len()
        );

        QuizSummary {
            player_name: setup.player_name,
            category: setup.category,
            score: self.score,
            total: self.questions.len(),
            leaderboard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::{Answer, Category, Difficulty};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TimerCall {
        Start(u32, Ticket),
        Stop,
    }

    #[derive(Clone, Default)]
    struct FakeTimer {
        calls: Arc<Mutex<Vec<TimerCall>>>,
        running: Arc<Mutex<bool>>,
    }

    impl QuestionTimer for FakeTimer {
        fn start(&mut self, seconds: u32, ticket: Ticket) {
            self.calls.lock().unwrap().push(TimerCall::Start(seconds, ticket));
            *self.running.lock().unwrap() = true;
        }
        fn stop(&mut self) {
            self.calls.lock().unwrap().push(TimerCall::Stop);
            *self.running.lock().unwrap() = false;
        }
        fn is_running(&self) -> bool {
            *self.running.lock().unwrap()
        }
    }

    fn question(n: usize) -> Question {
        Question::new(
            format!("Question {n}?"),
            vec![
                Answer::new(format!("wrong {n}a"), false),
                Answer::new(format!("right {n}"), true),
                Answer::new(format!("wrong {n}b"), false),
                Answer::new(format!("wrong {n}c"), false),
            ],
        )
    }

    fn general_knowledge() -> QuizSetup {
        QuizSetup::new(
            "Ada",
            CategoryChoice::Specific(Category {
                id: 9,
                name: "General Knowledge".to_string(),
            }),
            Difficulty::Easy,
        )
    }

    fn session() -> (QuizSession, FakeTimer, Arc<Leaderboard>) {
        let timer = FakeTimer::default();
        let leaderboard = Arc::new(Leaderboard::in_memory());
        let session = QuizSession::new(Box::new(timer.clone()), leaderboard.clone());
        (session, timer, leaderboard)
    }

    fn started(n: usize) -> (QuizSession, FakeTimer, Arc<Leaderboard>) {
        let (mut session, timer, leaderboard) = session();
        session
            .start(general_knowledge(), (0..n).map(question).collect())
            .unwrap();
        (session, timer, leaderboard)
    }

    #[test]
    fn empty_result_set_stays_idle() {
        let (mut session, timer, _) = session();

        let err = session.start(general_knowledge(), Vec::new()).unwrap_err();

        assert_eq!(err, QuizError::EmptyResultSet);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!timer.is_running());
        assert!(session.submit_option(0).is_err());
    }

    #[test]
    fn start_shows_first_question_with_running_timer() {
        let (session, timer, _) = started(3);

        assert_eq!(session.phase(), Phase::InProgress);
        assert_eq!(session.score(), 0);
        assert_eq!(session.current_index(), 0);
        assert!(timer.is_running());
        let view = session.current_view().unwrap();
        assert_eq!((view.number, view.total), (1, 3));
        assert_eq!(view.options.len(), 4);
        assert_eq!(
            timer.calls.lock().unwrap().last(),
            Some(&TimerCall::Start(SECONDS_PER_QUESTION, session.ticket()))
        );
    }

    #[test]
    fn correct_text_scores_exactly_one() {
        let (mut session, timer, _) = started(3);

        let feedback = session.submit_answer("right 0").unwrap();

        assert_eq!(feedback.verdict, Verdict::Correct);
        assert_eq!(feedback.score, 1);
        assert_eq!(feedback.advance_in, ANSWER_ADVANCE_DELAY);
        assert_eq!(session.score(), 1);
        assert!(!timer.is_running());
    }

    #[test]
    fn wrong_text_leaves_score_and_reveals() {
        let (mut session, _, _) = started(3);

        let feedback = session.submit_answer("wrong 0b").unwrap();

        assert_eq!(feedback.verdict, Verdict::Wrong);
        assert_eq!(feedback.selected, Some(2));
        assert_eq!(feedback.correct, 1);
        assert_eq!(feedback.correct_text, "right 0");
        assert_eq!(session.score(), 0);
        assert!(session.is_revealed());
    }

    #[test]
    fn answering_twice_is_rejected() {
        let (mut session, _, _) = started(3);
        session.submit_option(1).unwrap();

        assert_eq!(session.submit_option(1), Err(QuizError::NotAnswerable));
        assert_eq!(session.score(), 1);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let (mut session, _, _) = started(1);
        assert_eq!(session.submit_option(7), Err(QuizError::UnknownOption(7)));
        assert!(!session.is_revealed());
    }

    #[test]
    fn duplicate_texts_are_told_apart_by_position() {
        let (mut session, _, _) = session();
        let tricky = Question::new(
            "Which one?".to_string(),
            vec![
                Answer::new("Same".to_string(), false),
                Answer::new("Same".to_string(), true),
                Answer::new("Other".to_string(), false),
                Answer::new("Else".to_string(), false),
            ],
        );
        session.start(general_knowledge(), vec![tricky]).unwrap();

        let feedback = session.submit_option(0).unwrap();
        assert_eq!(feedback.verdict, Verdict::Wrong);
        assert_eq!(feedback.correct, 1);
    }

    #[test]
    fn advance_completes_exactly_once_after_last_question() {
        let (mut session, _, leaderboard) = started(3);
        session.submit_option(1).unwrap();

        assert!(matches!(session.advance(), Ok(Step::Question(v)) if v.number == 2));
        assert!(matches!(session.advance(), Ok(Step::Question(v)) if v.number == 3));
        let summary = match session.advance() {
            Ok(Step::Completed(summary)) => summary,
            other => panic!("expected completion, got {other:?}"),
        };

        assert_eq!(session.phase(), Phase::Completed);
        assert_eq!(session.current_index(), 3);
        assert_eq!(session.advance(), Err(QuizError::NotInProgress));
        assert_eq!((summary.score, summary.total), (1, 3));
        assert_eq!(summary.leaderboard, vec![LeaderboardEntry::new("Ada", 1)]);
        assert_eq!(leaderboard.get("9"), summary.leaderboard);
    }

    #[test]
    fn completion_stops_the_timer() {
        let (mut session, timer, _) = started(1);
        session.advance().unwrap();
        assert!(!timer.is_running());
        assert_eq!(timer.calls.lock().unwrap().last(), Some(&TimerCall::Stop));
    }

    #[test]
    fn expiry_reveals_and_schedules_shorter_advance() {
        let (mut session, timer, _) = started(2);
        let ticket = session.ticket();

        let feedback = session.expire(ticket).unwrap();

        assert_eq!(feedback.verdict, Verdict::TimedOut);
        assert_eq!(feedback.correct, 1);
        assert_eq!(feedback.advance_in, REVEAL_ADVANCE_DELAY);
        assert!(!timer.is_running());
        assert_eq!(session.submit_option(1), Err(QuizError::NotAnswerable));
        assert!(session.expire(ticket).is_none());

        assert!(matches!(session.advance_from(ticket), Ok(Step::Question(_))));
        assert!(timer.is_running());
    }

    #[test]
    fn stale_timer_events_are_ignored() {
        let (mut session, _, _) = started(2);
        let first = session.ticket();
        session.submit_option(1).unwrap();
        session.advance_from(first).unwrap();

        assert_eq!(session.tick(first, 3), None);
        assert!(session.expire(first).is_none());
        assert_eq!(session.advance_from(first), Err(QuizError::Stale));
        assert_eq!(session.tick(session.ticket(), 9), Some(9));
        assert_eq!(session.remaining(), 9);
    }

    #[test]
    fn delayed_advance_waits_for_reveal() {
        let (mut session, _, _) = started(2);
        let ticket = session.ticket();
        assert_eq!(session.advance_from(ticket), Err(QuizError::Stale));
    }

    #[test]
    fn reset_discards_late_questions() {
        let (mut session, timer, _) = session();
        let ticket = session.prepare(general_knowledge());
        session.reset();

        assert_eq!(
            session.begin(ticket, vec![question(0)]),
            Err(QuizError::Stale)
        );
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!timer.is_running());
    }

    #[test]
    fn newer_request_supersedes_older_one() {
        let (mut session, _, _) = session();
        let old = session.prepare(general_knowledge());
        let new = session.prepare(general_knowledge());

        assert_eq!(session.begin(old, vec![question(0)]), Err(QuizError::Stale));
        assert!(session.begin(new, vec![question(0)]).is_ok());
    }

    #[test]
    fn reset_mid_quiz_returns_to_idle() {
        let (mut session, timer, leaderboard) = started(3);
        session.submit_option(1).unwrap();
        let ticket = session.ticket();

        session.reset();

        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.score(), 0);
        assert!(session.questions().is_empty());
        assert!(!timer.is_running());
        assert_eq!(session.advance_from(ticket), Err(QuizError::Stale));
        assert!(leaderboard.get("9").is_empty());
    }

    #[test]
    fn score_never_exceeds_answered_questions() {
        let (mut session, _, _) = started(4);
        for _ in 0..4 {
            session.submit_option(1).unwrap();
            assert!(session.score() as usize <= session.current_index() + 1);
            session.advance().unwrap();
        }
        assert_eq!(session.score(), 4);
    }

    #[test]
    fn result_note_threshold() {
        let summary = |score, total| QuizSummary {
            player_name: "Ada".to_string(),
            category: CategoryChoice::Any,
            score,
            total,
            leaderboard: Vec::new(),
        };
        assert!(!summary(7, 15).well_done());
        assert!(summary(8, 15).well_done());
        assert!(summary(5, 10).well_done());
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Generation number of one question presentation (or one question fetch).
/// Anything that arrives carrying an older ticket is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { ticket: Ticket, remaining: u32 },
    Expired { ticket: Ticket },
}

/// Countdown for the question on screen. The quiz session drives it and
/// stops it on every transition.
pub trait QuestionTimer {
    /// Starts counting down from `seconds`, replacing any running countdown.
    fn start(&mut self, seconds: u32, ticket: Ticket);
    /// Halts the countdown. Calling it when nothing runs is fine.
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

pub type TimerSink = Arc<dyn Fn(TimerEvent) + Send + Sync>;

/// One-second resolution countdown running as a tokio task.
pub struct Countdown {
    sink: TimerSink,
    remaining: Arc<AtomicU32>,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new(sink: TimerSink) -> Self {
        Self {
            sink,
            remaining: Arc::new(AtomicU32::new(0)),
            task: None,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Relaxed)
    }
}

impl QuestionTimer for Countdown {
    fn start(&mut self, seconds: u32, ticket: Ticket) {
        self.stop();
        self.remaining.store(seconds, Ordering::Relaxed);

        let sink = self.sink.clone();
        let remaining = self.remaining.clone();
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick of an interval completes immediately
            interval.tick().await;

            let mut left = seconds;
            while left > 0 {
                interval.tick().await;
                left -= 1;
                remaining.store(left, Ordering::Relaxed);
                sink(TimerEvent::Tick {
                    ticket,
                    remaining: left,
                });
            }
            log::debug!("Countdown {:?} expired", ticket);
            sink(TimerEvent::Expired { ticket });
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.stop();
    }
}

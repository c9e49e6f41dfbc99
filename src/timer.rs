//! Cancellable scheduled tasks.
//!
//! The state machine arms timers through a `TimerBook` and only honors a tick
//! whose token is still armed, so a late tick from a torn-down state is a
//! no-op. `Timers` runs the armed timers as tokio tasks and aborts them on
//! cancel and on drop.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// One-shot splash delay before the profile view.
    IntroDelay,
    /// Answer stopwatch, 100 ms resolution.
    Stopwatch,
    /// Simulated opponent scoring interval.
    Opponent,
    /// Challenge-a-friend countdown, 1 s resolution.
    ChallengeCountdown,
    /// Simulated friend acceptance delay.
    ChallengeConnect,
    /// Card fly-off animation before the swipe commits.
    CardFlight,
    /// Answer modal exit animation before the deck advances.
    ModalExit,
}

impl TimerKind {
    /// One-shot timers are disarmed when their tick is delivered.
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, TimerKind::Stopwatch | TimerKind::Opponent | TimerKind::ChallengeCountdown)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    Once(Duration),
    Every(Duration),
}

/// Which token is currently armed for each kind.
#[derive(Clone, Debug, Default)]
pub struct TimerBook {
    next_id: u64,
    armed: HashMap<TimerKind, TimerToken>,
}

impl TimerBook {
    /// Arm a new token for `kind`, returning the token it replaced.
    pub fn arm(&mut self, kind: TimerKind) -> (TimerToken, Option<TimerToken>) {
        self.next_id += 1;
        let token = TimerToken { kind, id: self.next_id };
        (token, self.armed.insert(kind, token))
    }

    pub fn disarm(&mut self, kind: TimerKind) -> Option<TimerToken> {
        self.armed.remove(&kind)
    }

    pub fn is_live(&self, token: TimerToken) -> bool {
        self.armed.get(&token.kind) == Some(&token)
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }
}

/// Running timer tasks, one per kind.
#[derive(Default)]
pub struct Timers {
    tasks: HashMap<TimerKind, (TimerToken, JoinHandle<()>)>,
}

impl Timers {
    /// Spawn a task that delivers `token` on `tx` per `schedule`. A task
    /// already running for the same kind is aborted first.
    pub fn start(&mut self, token: TimerToken, schedule: Schedule, tx: UnboundedSender<TimerToken>) {
        let handle = tokio::spawn(async move {
            match schedule {
                Schedule::Once(delay) => {
                    sleep(delay).await;
                    let _ = tx.send(token);
                }
                Schedule::Every(period) => {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        if tx.send(token).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        trace!(target: "session", ?token, ?schedule, "Timer started");
        if let Some((_, old)) = self.tasks.insert(token.kind, (token, handle)) {
            old.abort();
        }
    }

    pub fn cancel(&mut self, token: TimerToken) {
        if let Some((running, _)) = self.tasks.get(&token.kind) {
            if *running == token {
                if let Some((_, handle)) = self.tasks.remove(&token.kind) {
                    handle.abort();
                    trace!(target: "session", ?token, "Timer cancelled");
                }
            }
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.tasks.drain() {
            handle.abort();
        }
    }

    pub fn running(&self) -> usize {
        self.tasks.values().filter(|(_, h)| !h.is_finished()).count()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn rearming_invalidates_the_previous_token() {
        let mut book = TimerBook::default();
        let (first, replaced) = book.arm(TimerKind::Stopwatch);
        assert!(replaced.is_none());
        let (second, replaced) = book.arm(TimerKind::Stopwatch);
        assert_eq!(replaced, Some(first));
        assert!(!book.is_live(first));
        assert!(book.is_live(second));
        assert_eq!(book.disarm(TimerKind::Stopwatch), Some(second));
        assert!(!book.is_live(second));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticks_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::default();
        let mut book = TimerBook::default();
        let (token, _) = book.arm(TimerKind::Opponent);
        timers.start(token, Schedule::Every(Duration::from_millis(100)), tx);

        for _ in 0..3 {
            assert_eq!(rx.recv().await, Some(token));
        }
        timers.cancel(token);
        assert_eq!(timers.running(), 0);
        // Sender dropped with the aborted task.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn once_fires_a_single_time() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::default();
        let token = TimerToken { kind: TimerKind::IntroDelay, id: 7 };
        timers.start(token, Schedule::Once(Duration::from_secs(4)), tx);
        assert_eq!(rx.recv().await, Some(token));
        assert_eq!(rx.recv().await, None);
    }
}

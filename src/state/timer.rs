use std::{
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{task::JoinHandle, time::Instant};

/// Bookkeeping of the countdown attached to the active question.
///
/// Every arm or cancel bumps the token. The countdown task compares its own token with
/// [`QuestionTimer::is_current`] before acting, so a timer that lost a race against an
/// answer never records anything.
#[derive(Debug, Default)]
pub struct QuestionTimer {
    token: AtomicU64,
    active: Mutex<Option<Countdown>>,
}

#[derive(Debug)]
struct Countdown {
    token: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

impl QuestionTimer {
    /// Timer with no running countdown.
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, Option<Countdown>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any running countdown with a new one lasting `duration`.
    ///
    /// `spawn` receives the new token and deadline and must start the task driving the
    /// countdown. Returns the new token.
    pub fn arm<F>(&self, duration: Duration, spawn: F) -> u64
    where
        F: FnOnce(u64, Instant) -> JoinHandle<()>,
    {
        let mut active = self.active();
        if let Some(previous) = active.take() {
            previous.handle.abort();
        }
        let token = self.token.fetch_add(1, Ordering::SeqCst) + 1;
        let deadline = Instant::now() + duration;
        let handle = spawn(token, deadline);
        *active = Some(Countdown {
            token,
            deadline,
            handle,
        });
        token
    }

    /// Stop the running countdown. Returns the time that was left on it, if any.
    pub fn cancel(&self) -> Option<Duration> {
        let mut active = self.active();
        self.token.fetch_add(1, Ordering::SeqCst);
        active.take().map(|countdown| {
            countdown.handle.abort();
            countdown.deadline.saturating_duration_since(Instant::now())
        })
    }

    /// Called by the countdown task itself once it has run out. Does not abort the
    /// calling task.
    pub fn finish(&self, token: u64) -> bool {
        let mut active = self.active();
        if active.as_ref().is_some_and(|countdown| countdown.token == token) {
            active.take();
            self.token.fetch_add(1, Ordering::SeqCst);
            return true;
        }
        false
    }

    /// Whether `token` still identifies the running countdown.
    pub fn is_current(&self, token: u64) -> bool {
        self.token.load(Ordering::SeqCst) == token
    }

    /// Time left on the running countdown.
    pub fn remaining(&self) -> Option<Duration> {
        self.active()
            .as_ref()
            .map(|countdown| countdown.deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether a countdown is armed.
    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }
}

impl Drop for QuestionTimer {
    fn drop(&mut self) {
        if let Some(countdown) = self.active().take() {
            countdown.handle.abort();
        }
    }
}

/// Whole seconds shown for a remaining duration, rounded up.
pub fn display_seconds(remaining: Duration) -> u32 {
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle() -> JoinHandle<()> {
        tokio::spawn(std::future::pending())
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_reports_remaining_time_and_invalidates_token() {
        let timer = QuestionTimer::new();
        let token = timer.arm(Duration::from_secs(60), |_, _| idle());
        assert!(timer.is_current(token));

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(timer.cancel(), Some(Duration::from_secs(45)));
        assert!(!timer.is_current(token));
        assert!(!timer.is_running());
        assert_eq!(timer.cancel(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_the_previous_countdown() {
        let timer = QuestionTimer::new();
        let first = timer.arm(Duration::from_secs(60), |_, _| idle());
        let second = timer.arm(Duration::from_secs(30), |_, _| idle());
        assert!(!timer.is_current(first));
        assert!(timer.is_current(second));
        assert!(!timer.finish(first));
        assert_eq!(timer.remaining(), Some(Duration::from_secs(30)));
        assert!(timer.finish(second));
        assert!(!timer.is_running());
    }

    #[test]
    fn display_seconds_rounds_up() {
        assert_eq!(display_seconds(Duration::from_secs(45)), 45);
        assert_eq!(display_seconds(Duration::from_millis(59_999)), 60);
        assert_eq!(display_seconds(Duration::ZERO), 0);
    }
}

use std::future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// Single-slot delay timer. Arming it again before it fires pushes the
/// deadline out, so a burst of events yields one firing after the burst.
pub struct Debouncer {
    window: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Cancels any pending deadline and schedules a new one a full window from now.
    pub fn arm(&mut self) {
        let at = Instant::now() + self.window;
        match self.deadline.as_mut() {
            Some(pending) => pending.as_mut().reset(at),
            None => self.deadline = Some(Box::pin(sleep(self.window))),
        }
    }

    /// Resolves when the armed deadline passes and disarms. Never resolves
    /// while disarmed, which makes it safe as a `select!` branch.
    pub async fn fired(&mut self) {
        match self.deadline.as_mut() {
            Some(pending) => {
                pending.as_mut().await;
                self.deadline = None;
            }
            None => future::pending().await,
        }
    }
}

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

type Callback = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Session timer. Exposes how much time is left and fires two one-shot
/// callbacks: one when the remaining time crosses `warning_threshold`, one
/// when it reaches zero. Nothing fires after `cancel()` or drop.
pub struct Countdown {
    deadline: Instant,
    warning_threshold: Duration,
    on_threshold: Option<Callback>,
    on_expire: Option<Callback>,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new(total: Duration, warning_threshold: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            warning_threshold,
            on_threshold: None,
            on_expire: None,
            task: None,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Registers the warning callback. Only callbacks registered before
    /// [`start`](Self::start) fire; later ones are dropped.
    pub fn on_threshold(&mut self, cb: impl FnOnce() + Send + Sync + 'static) {
        if self.task.is_some() {
            tracing::debug!("Countdown already started, ignoring threshold callback");
            return;
        }
        self.on_threshold = Some(Box::new(cb));
    }

    /// Registers the expiry callback. Same ordering rule as
    /// [`on_threshold`](Self::on_threshold).
    pub fn on_expire(&mut self, cb: impl FnOnce() + Send + Sync + 'static) {
        if self.task.is_some() {
            tracing::debug!("Countdown already started, ignoring expiry callback");
            return;
        }
        self.on_expire = Some(Box::new(cb));
    }

    /// Arms the timer. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let deadline = self.deadline;
        // Only a crossing counts: a session that starts inside the warning
        // window never gets the warning.
        let warning = self
            .on_threshold
            .take()
            .filter(|_| self.remaining() > self.warning_threshold)
            .map(|cb| (deadline - self.warning_threshold, cb));
        let expire = self.on_expire.take();

        self.task = Some(tokio::spawn(async move {
            if let Some((warn_at, cb)) = warning {
                sleep_until(warn_at).await;
                cb();
            }
            sleep_until(deadline).await;
            if let Some(cb) = expire {
                cb();
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.on_threshold = None;
        self.on_expire = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

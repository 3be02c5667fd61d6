//! Periodic tasks with wall-clock drift correction.
//!
//! Every task owns one loop. The loop waits for the node identity, runs the
//! action once, then sleeps until `last_run + period` before each next run.
//! Time spent inside the action is absorbed by the following sleep.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::identity::IdentityCell;

pub type Action = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct PeriodicTask {
    pub name: String,
    pub period: Duration,
    action: Action,
}

impl fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("period", &self.period)
            .finish()
    }
}

impl PeriodicTask {
    pub fn new(
        name: impl Into<String>,
        period: Duration,
        action: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            period,
            action: Arc::new(action),
        }
    }

    pub fn run_once(&self) {
        (self.action)();
    }
}

/// Time left until the next run is due; zero when already overdue.
pub fn sleep_duration(last_run: Instant, period: Duration, now: Instant) -> Duration {
    (last_run + period).saturating_duration_since(now)
}

pub fn spawn_periodic(
    task: PeriodicTask,
    identity: IdentityCell,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move { run_periodic(task, identity, token).await })
}

async fn run_periodic(task: PeriodicTask, identity: IdentityCell, token: CancellationToken) {
    tokio::select! {
        biased;
        _ = token.cancelled() => return,
        _ = identity.wait() => {}
    }
    tracing::debug!(task = %task.name, period = ?task.period, "Periodic task started");

    task.run_once();
    let mut last_run = Instant::now();
    loop {
        let pause = sleep_duration(last_run, task.period, Instant::now());
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(pause) => {}
        }
        if !identity.is_resolved() {
            continue;
        }
        last_run = Instant::now();
        task.run_once();
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use carrot_shared::domain::{PendingBonus, TaskId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::Inner;

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// A spawned timer loop and the token that stops it.
pub(super) struct TimerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TimerHandle {
    pub(super) fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the loop to exit.
    pub(super) async fn join(self) {
        if let Err(e) = self.join.await
            && e.is_panic()
        {
            warn!(error=%e, "timer task panicked");
        }
    }
}

#[derive(Default)]
pub(super) struct Timers {
    tickers: Mutex<HashMap<TaskId, TimerHandle>>,
    bonuses: Mutex<HashMap<TaskId, TimerHandle>>,
}

impl Timers {
    pub(super) async fn take_ticker(&self, task: &TaskId) -> Option<TimerHandle> {
        self.tickers.lock().await.remove(task)
    }

    pub(super) async fn take_bonus(&self, task: &TaskId) -> Option<TimerHandle> {
        self.bonuses.lock().await.remove(task)
    }

    pub(super) async fn take_bonuses(&self) -> Vec<TimerHandle> {
        self.bonuses.lock().await.drain().map(|(_, h)| h).collect()
    }

    pub(super) async fn take_all(&self) -> Vec<TimerHandle> {
        let mut out: Vec<TimerHandle> = self.tickers.lock().await.drain().map(|(_, h)| h).collect();
        out.extend(self.take_bonuses().await);
        for handle in &out {
            handle.cancel();
        }
        out
    }
}

/// Starts the once-a-second loop that advances an in-progress task.
/// Replaces (and cancels) any loop already running for the task.
pub(super) async fn spawn_ticker(inner: &Arc<Inner>, task: TaskId) {
    let token = inner.shutdown.child_token();
    let join = tokio::spawn(run_ticker(Arc::downgrade(inner), task.clone(), token.clone()));
    let previous = inner
        .timers
        .tickers
        .lock()
        .await
        .insert(task, TimerHandle { token, join });
    if let Some(old) = previous {
        old.cancel();
    }
}

async fn run_ticker(weak: Weak<Inner>, task: TaskId, token: CancellationToken) {
    let mut interval = tokio::time::interval(TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = weak.upgrade() else { break };
                if !inner.tick(&task, &token).await {
                    break;
                }
            }
        }
    }
    trace!(task_id=%task, "ticker stopped");
}

/// Sleeps until the bonus is due, then credits it unless cancelled first.
pub(super) async fn spawn_bonus(inner: &Arc<Inner>, bonus: &PendingBonus) {
    let delay = (bonus.due_at - inner.clock.now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    let token = inner.shutdown.child_token();
    let join = tokio::spawn(run_bonus(
        Arc::downgrade(inner),
        bonus.task.clone(),
        delay,
        token.clone(),
    ));
    trace!(task_id=%bonus.task, delay_ms = delay.as_millis() as u64, "bonus scheduled");
    let previous = inner
        .timers
        .bonuses
        .lock()
        .await
        .insert(bonus.task.clone(), TimerHandle { token, join });
    if let Some(old) = previous {
        old.cancel();
    }
}

async fn run_bonus(weak: Weak<Inner>, task: TaskId, delay: Duration, token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {
            trace!(task_id=%task, "bonus timer cancelled");
        }
        _ = tokio::time::sleep(delay) => {
            if let Some(inner) = weak.upgrade() {
                inner.fire_bonus(&task, &token).await;
            }
        }
    }
}

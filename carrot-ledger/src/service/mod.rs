mod acl;
mod timers;

pub use acl::Operation;

use std::sync::Arc;

use carrot_shared::api::{Approval, BonusOutcome, Completion, ReportDto, ReportPeriod, ServiceEvent};
use carrot_shared::auth::{Actor, Role};
use carrot_shared::domain::{ChildAccount, ChildId, PendingBonus, Task, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::{AppConfig, ConfigError};
use crate::ledger::{
    ChildSettings, Ledger, LedgerError, LedgerSettings, NewChild, NewTask, TaskFilter,
};
use crate::storage::models::SnapshotInfo;
use crate::storage::{StorageError, Store};
use timers::Timers;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("forbidden: {actor} may not {operation}")]
    Forbidden {
        actor: String,
        operation: &'static str,
    },

    #[error("no snapshot store is configured")]
    NoStore,
}

impl ServiceError {
    pub(crate) fn forbidden(actor: &Actor, op: Operation<'_>) -> Self {
        ServiceError::Forbidden {
            actor: actor.to_string(),
            operation: op.name(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub settings: LedgerSettings,
    /// Upserted into the ledger on open.
    pub seed_children: Vec<NewChild>,
    /// Snapshots kept after each save; 0 keeps all.
    pub snapshot_history: u32,
}

impl ServiceOptions {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        Ok(ServiceOptions {
            settings: cfg.ledger_settings()?,
            seed_children: cfg.seed_children(),
            snapshot_history: cfg.snapshot_history,
        })
    }
}

#[derive(Clone)]
pub struct Service {
    inner: Arc<Inner>,
}

// Lock order: ledger, then the timer maps.
struct Inner {
    ledger: Mutex<Ledger>,
    clock: Arc<dyn Clock>,
    store: Option<Store>,
    snapshot_history: u32,
    timers: Timers,
    shutdown: CancellationToken,
    events: broadcast::Sender<ServiceEvent>,
}

impl Inner {
    fn emit(&self, event: ServiceEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    async fn save(&self, ledger: &Ledger) -> Result<(), ServiceError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store
            .save_snapshot(&ledger.to_snapshot(self.clock.now()))
            .await?;
        if self.snapshot_history > 0 {
            store.prune_snapshots(self.snapshot_history).await?;
        }
        Ok(())
    }

    /// Saves a change that is already applied. A failed save is logged and
    /// the change stays in memory.
    async fn persist(&self, ledger: &Ledger) {
        if let Err(e) = self.save(ledger).await {
            error!(error=%e, "failed to save snapshot");
        }
    }

    /// One ticker step. Returns false when the loop should stop.
    async fn tick(&self, task: &TaskId, token: &CancellationToken) -> bool {
        let mut ledger = self.ledger.lock().await;
        if token.is_cancelled() {
            return false;
        }
        match ledger.tick(task, self.clock.now()) {
            Ok(elapsed_seconds) => {
                self.emit(ServiceEvent::TimerTick {
                    task_id: task.clone(),
                    elapsed_seconds,
                });
                true
            }
            Err(e) => {
                debug!(task_id=%task, error=%e, "ticker no longer needed");
                false
            }
        }
    }

    async fn fire_bonus(&self, task: &TaskId, token: &CancellationToken) {
        let mut ledger = self.ledger.lock().await;
        if token.is_cancelled() {
            return;
        }
        self.timers.take_bonus(task).await;
        let Some(credit) = ledger.settle_bonus(task, self.clock.now()) else {
            return;
        };
        info!(
            task_id=%credit.task_id,
            child_id=%credit.child_id,
            minutes = credit.minutes,
            "streak bonus credited"
        );
        self.emit(ServiceEvent::BalanceChanged {
            child_id: credit.child_id.clone(),
            game_time_minutes: credit.game_time_minutes,
        });
        self.emit(ServiceEvent::BonusCredited(credit));
        self.persist(&ledger).await;
    }
}

impl Service {
    /// Loads the newest snapshot (or starts empty), seeds configured
    /// children, credits bonuses that fell due while nothing was running and
    /// restarts the timers of everything still in flight.
    pub async fn open(
        options: ServiceOptions,
        store: Option<Store>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let now = clock.now();
        let mut ledger = match &store {
            Some(s) => match s.load_latest().await? {
                Some(snapshot) => Ledger::from_snapshot(options.settings, snapshot)?,
                None => Ledger::new(options.settings),
            },
            None => Ledger::new(options.settings),
        };
        let before = ledger.to_snapshot(now);

        for child in options.seed_children {
            let account = ledger.upsert_child(child, now)?;
            debug!(child_id=%account.id, "child seeded from config");
        }
        for credit in ledger.settle_due_bonuses(now) {
            info!(
                task_id=%credit.task_id,
                child_id=%credit.child_id,
                minutes = credit.minutes,
                "overdue streak bonus credited"
            );
        }
        let dirty = ledger.to_snapshot(now) != before;

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let inner = Arc::new(Inner {
            ledger: Mutex::new(ledger),
            clock,
            store,
            snapshot_history: options.snapshot_history,
            timers: Timers::default(),
            shutdown: CancellationToken::new(),
            events,
        });

        {
            let ledger = inner.ledger.lock().await;
            for bonus in ledger.pending_bonuses() {
                timers::spawn_bonus(&inner, bonus).await;
            }
            for task in ledger.in_progress_tasks() {
                timers::spawn_ticker(&inner, task.id.clone()).await;
            }
            if dirty {
                inner.save(&ledger).await?;
            }
            info!(
                children = ledger.children().len(),
                tasks = ledger.tasks().len(),
                pending_bonuses = ledger.pending_bonuses().len(),
                "ledger ready"
            );
        }

        Ok(Service { inner })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.events.subscribe()
    }

    pub async fn children(&self, actor: &Actor) -> Result<Vec<ChildAccount>, ServiceError> {
        acl::authorize(actor, Operation::ListChildren)?;
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.children().into_iter().cloned().collect())
    }

    pub async fn child(&self, actor: &Actor, id: &ChildId) -> Result<ChildAccount, ServiceError> {
        acl::authorize(actor, Operation::ViewChild(id))?;
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.child(id)?.clone())
    }

    pub async fn add_child(&self, actor: &Actor, new: NewChild) -> Result<ChildAccount, ServiceError> {
        acl::authorize(actor, Operation::AddChild)?;
        let mut ledger = self.inner.ledger.lock().await;
        let account = ledger.add_child(new, self.now())?;
        self.inner.persist(&ledger).await;
        info!(child_id=%account.id, name=%account.display_name, "child added");
        Ok(account)
    }

    pub async fn update_child_settings(
        &self,
        actor: &Actor,
        id: &ChildId,
        update: ChildSettings,
    ) -> Result<ChildAccount, ServiceError> {
        acl::authorize(actor, Operation::UpdateChildSettings)?;
        let mut ledger = self.inner.ledger.lock().await;
        let account = ledger.update_child_settings(id, update)?;
        self.inner.persist(&ledger).await;
        info!(
            child_id=%id,
            daily_limit = account.daily_limit_minutes,
            locked = account.is_locked,
            "child settings updated"
        );
        Ok(account)
    }

    pub async fn reset_streak(&self, actor: &Actor, id: &ChildId) -> Result<ChildAccount, ServiceError> {
        acl::authorize(actor, Operation::ResetStreak)?;
        let mut ledger = self.inner.ledger.lock().await;
        let account = ledger.reset_streak(id)?;
        self.inner.persist(&ledger).await;
        info!(child_id=%id, "streak reset");
        Ok(account)
    }

    pub async fn adjust_game_time(
        &self,
        actor: &Actor,
        id: &ChildId,
        delta: i64,
    ) -> Result<ChildAccount, ServiceError> {
        acl::authorize(actor, Operation::AdjustGameTime)?;
        let mut ledger = self.inner.ledger.lock().await;
        let account = ledger.adjust_game_time(id, delta, self.now())?;
        self.balance_changed(&account);
        self.inner.persist(&ledger).await;
        info!(child_id=%id, delta, balance = account.game_time_minutes, "game time adjusted");
        Ok(account)
    }

    pub async fn check_spend(&self, actor: &Actor, id: &ChildId, minutes: u32) -> Result<(), ServiceError> {
        acl::authorize(actor, Operation::SpendGameTime(id))?;
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.check_spend(id, minutes, self.now())?)
    }

    pub async fn spend_game_time(
        &self,
        actor: &Actor,
        id: &ChildId,
        minutes: u32,
    ) -> Result<ChildAccount, ServiceError> {
        acl::authorize(actor, Operation::SpendGameTime(id))?;
        let mut ledger = self.inner.ledger.lock().await;
        let account = ledger.spend_game_time(id, minutes, self.now())?;
        self.balance_changed(&account);
        self.inner.persist(&ledger).await;
        info!(child_id=%id, minutes, balance = account.game_time_minutes, "game time spent");
        Ok(account)
    }

    pub async fn create_task(&self, actor: &Actor, new: NewTask) -> Result<Task, ServiceError> {
        acl::authorize(actor, Operation::CreateTask)?;
        let mut ledger = self.inner.ledger.lock().await;
        let task = ledger.create_task(new, self.now())?;
        self.task_updated(&task);
        self.inner.persist(&ledger).await;
        info!(task_id=%task.id, child_id=%task.owner, kind = task.kind.label(), "task created");
        Ok(task)
    }

    pub async fn task(&self, actor: &Actor, id: &TaskId) -> Result<Task, ServiceError> {
        let ledger = self.inner.ledger.lock().await;
        let task = ledger.task(id)?;
        acl::authorize(actor, Operation::ViewTask(&task.owner))?;
        Ok(task.clone())
    }

    /// Children only ever see their own tasks; an unscoped filter is narrowed
    /// to the asking child.
    pub async fn tasks(&self, actor: &Actor, mut filter: TaskFilter) -> Result<Vec<Task>, ServiceError> {
        if actor.role == Role::Child && filter.child.is_none() {
            filter.child = actor.child_id.clone();
        }
        acl::authorize(actor, Operation::ListTasks(filter.child.as_ref()))?;
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger
            .tasks_matching(&filter, self.now())
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn start_timer(&self, actor: &Actor, id: &TaskId) -> Result<Task, ServiceError> {
        let mut ledger = self.inner.ledger.lock().await;
        let owner = ledger.task(id)?.owner.clone();
        acl::authorize(actor, Operation::StartTimer(&owner))?;
        let task = ledger.start_timer(id, self.now())?;
        timers::spawn_ticker(&self.inner, task.id.clone()).await;
        self.task_updated(&task);
        self.inner.persist(&ledger).await;
        info!(task_id=%id, child_id=%owner, "timer started");
        Ok(task)
    }

    /// The tick loop is stopped before this returns.
    pub async fn pause_timer(&self, actor: &Actor, id: &TaskId) -> Result<Task, ServiceError> {
        let (task, ticker) = {
            let mut ledger = self.inner.ledger.lock().await;
            let owner = ledger.task(id)?.owner.clone();
            acl::authorize(actor, Operation::PauseTimer(&owner))?;
            let task = ledger.pause_timer(id, self.now())?;
            let ticker = self.inner.timers.take_ticker(id).await;
            if let Some(t) = &ticker {
                t.cancel();
            }
            self.task_updated(&task);
            self.inner.persist(&ledger).await;
            info!(
                task_id=%id,
                child_id=%owner,
                elapsed = task.elapsed_seconds().unwrap_or(0),
                "timer paused"
            );
            (task, ticker)
        };
        if let Some(t) = ticker {
            t.join().await;
        }
        Ok(task)
    }

    /// Stops a running timer and completes the task with the time counted up
    /// to now.
    pub async fn stop_timer(&self, actor: &Actor, id: &TaskId) -> Result<Completion, ServiceError> {
        let (completion, ticker) = {
            let mut ledger = self.inner.ledger.lock().await;
            let owner = ledger.task(id)?.owner.clone();
            acl::authorize(actor, Operation::CompleteTask(&owner))?;
            let now = self.now();
            let elapsed = match ledger.tick(id, now) {
                Ok(elapsed) => elapsed,
                // let the completion below report the transition error
                Err(LedgerError::InvalidTransition { .. }) => {
                    ledger.task(id)?.elapsed_seconds().unwrap_or(0)
                }
                Err(e) => return Err(e.into()),
            };
            let completion = ledger.complete_timed_task(id, elapsed, now)?;
            let ticker = self.inner.timers.take_ticker(id).await;
            if let Some(t) = &ticker {
                t.cancel();
            }
            self.after_completion(&ledger, &completion).await;
            (completion, ticker)
        };
        if let Some(t) = ticker {
            t.join().await;
        }
        Ok(completion)
    }

    /// Completes a time-tracked task with a caller-supplied elapsed value.
    /// Only parents may override the measured time.
    pub async fn complete_timed_task(
        &self,
        actor: &Actor,
        id: &TaskId,
        elapsed_seconds: u64,
    ) -> Result<Completion, ServiceError> {
        acl::authorize(actor, Operation::RecordElapsed)?;
        let (completion, ticker) = {
            let mut ledger = self.inner.ledger.lock().await;
            let completion = ledger.complete_timed_task(id, elapsed_seconds, self.now())?;
            let ticker = self.inner.timers.take_ticker(id).await;
            if let Some(t) = &ticker {
                t.cancel();
            }
            self.after_completion(&ledger, &completion).await;
            (completion, ticker)
        };
        if let Some(t) = ticker {
            t.join().await;
        }
        Ok(completion)
    }

    pub async fn complete_credit_task(&self, actor: &Actor, id: &TaskId) -> Result<Completion, ServiceError> {
        let mut ledger = self.inner.ledger.lock().await;
        let owner = ledger.task(id)?.owner.clone();
        acl::authorize(actor, Operation::CompleteTask(&owner))?;
        let completion = ledger.complete_credit_task(id, self.now())?;
        self.after_completion(&ledger, &completion).await;
        Ok(completion)
    }

    /// Picks the completion that fits the task kind: running timers are
    /// stopped, fixed-credit tasks are marked done.
    pub async fn complete(&self, actor: &Actor, id: &TaskId) -> Result<Completion, ServiceError> {
        let time_tracked = self.inner.ledger.lock().await.task(id)?.is_time_tracked();
        if time_tracked {
            self.stop_timer(actor, id).await
        } else {
            self.complete_credit_task(actor, id).await
        }
    }

    pub async fn approve(&self, actor: &Actor, id: &TaskId) -> Result<Approval, ServiceError> {
        acl::authorize(actor, Operation::Approve)?;
        let mut ledger = self.inner.ledger.lock().await;
        let approval = ledger.approve(id, self.now())?;
        self.inner.emit(ServiceEvent::TaskUpdated {
            task_id: id.clone(),
            status: TaskStatus::Approved,
        });
        self.after_approval(&approval).await;
        self.inner.persist(&ledger).await;
        Ok(approval)
    }

    pub async fn reject(&self, actor: &Actor, id: &TaskId) -> Result<Task, ServiceError> {
        acl::authorize(actor, Operation::Reject)?;
        let mut ledger = self.inner.ledger.lock().await;
        let task = ledger.reject(id, self.now())?;
        self.task_updated(&task);
        self.inner.persist(&ledger).await;
        info!(task_id=%id, child_id=%task.owner, "task rejected");
        Ok(task)
    }

    pub async fn pending_bonuses(&self, actor: &Actor) -> Result<Vec<PendingBonus>, ServiceError> {
        acl::authorize(actor, Operation::ViewPending)?;
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.pending_bonuses().to_vec())
    }

    /// Drops a bonus that has not been credited yet. Returns `None` when
    /// there was nothing to cancel.
    pub async fn cancel_bonus(&self, actor: &Actor, task: &TaskId) -> Result<Option<PendingBonus>, ServiceError> {
        acl::authorize(actor, Operation::CancelBonus)?;
        let (cancelled, timer) = {
            let mut ledger = self.inner.ledger.lock().await;
            let cancelled = ledger.cancel_bonus(task);
            let timer = self.inner.timers.take_bonus(task).await;
            if let Some(t) = &timer {
                t.cancel();
            }
            if let Some(b) = &cancelled {
                self.inner.emit(ServiceEvent::BonusCancelled {
                    task_id: b.task.clone(),
                    child_id: b.child.clone(),
                });
                self.inner.persist(&ledger).await;
                info!(task_id=%task, child_id=%b.child, "streak bonus cancelled");
            }
            (cancelled, timer)
        };
        if let Some(t) = timer {
            t.join().await;
        }
        Ok(cancelled)
    }

    pub async fn pending_approval_count(&self, actor: &Actor, child: Option<&ChildId>) -> Result<usize, ServiceError> {
        acl::authorize(actor, Operation::ViewPending)?;
        let ledger = self.inner.ledger.lock().await;
        if let Some(id) = child {
            ledger.child(id)?;
        }
        Ok(ledger.pending_approval_count(child))
    }

    pub async fn report(&self, actor: &Actor, child: &ChildId, period: ReportPeriod) -> Result<ReportDto, ServiceError> {
        acl::authorize(actor, Operation::Report)?;
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.report(child, period, self.now())?)
    }

    pub async fn snapshots(&self, actor: &Actor) -> Result<Vec<SnapshotInfo>, ServiceError> {
        acl::authorize(actor, Operation::ManageSnapshots)?;
        let store = self.inner.store.as_ref().ok_or(ServiceError::NoStore)?;
        Ok(store.list_snapshots().await?)
    }

    pub async fn prune_snapshots(&self, actor: &Actor, keep: u32) -> Result<usize, ServiceError> {
        acl::authorize(actor, Operation::ManageSnapshots)?;
        let store = self.inner.store.as_ref().ok_or(ServiceError::NoStore)?;
        let _ledger = self.inner.ledger.lock().await;
        Ok(store.prune_snapshots(keep).await?)
    }

    /// Waits until every scheduled bonus has fired or been cancelled.
    pub async fn drain(&self) {
        loop {
            let pending = self.inner.timers.take_bonuses().await;
            if pending.is_empty() {
                break;
            }
            debug!(count = pending.len(), "waiting for scheduled bonuses");
            for handle in pending {
                handle.join().await;
            }
        }
    }

    /// Stops every timer. Bonuses that have not fired are cancelled and
    /// never credited; running tasks stay in progress in the saved snapshot.
    /// Unlike other saves, a failed final save is returned.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.inner.shutdown.cancel();
        let (saved, handles) = {
            let mut ledger = self.inner.ledger.lock().await;
            let dropped = ledger.cancel_all_bonuses();
            for bonus in &dropped {
                info!(task_id=%bonus.task, child_id=%bonus.child, "unfired streak bonus cancelled");
                self.inner.emit(ServiceEvent::BonusCancelled {
                    task_id: bonus.task.clone(),
                    child_id: bonus.child.clone(),
                });
            }
            let handles = self.inner.timers.take_all().await;
            let saved = if dropped.is_empty() {
                Ok(())
            } else {
                self.inner.save(&ledger).await
            };
            (saved, handles)
        };
        for handle in handles {
            handle.join().await;
        }
        debug!("service stopped");
        saved
    }

    fn task_updated(&self, task: &Task) {
        self.inner.emit(ServiceEvent::TaskUpdated {
            task_id: task.id.clone(),
            status: task.status,
        });
    }

    fn balance_changed(&self, account: &ChildAccount) {
        self.inner.emit(ServiceEvent::BalanceChanged {
            child_id: account.id.clone(),
            game_time_minutes: account.game_time_minutes,
        });
    }

    async fn after_completion(&self, ledger: &Ledger, completion: &Completion) {
        info!(
            task_id=%completion.task.id,
            child_id=%completion.task.owner,
            auto_approved = completion.approval.is_some(),
            "task completed"
        );
        self.task_updated(&completion.task);
        if let Some(approval) = &completion.approval {
            self.after_approval(approval).await;
        }
        self.inner.persist(ledger).await;
    }

    async fn after_approval(&self, approval: &Approval) {
        info!(
            task_id=%approval.task_id,
            child_id=%approval.child_id,
            minutes = approval.minutes_earned,
            streak = approval.streak_count,
            "task approved"
        );
        self.inner.emit(ServiceEvent::BalanceChanged {
            child_id: approval.child_id.clone(),
            game_time_minutes: approval.game_time_minutes,
        });
        if let Some(BonusOutcome::Scheduled { minutes, due_at }) = &approval.bonus {
            let bonus = PendingBonus {
                task: approval.task_id.clone(),
                child: approval.child_id.clone(),
                minutes: *minutes,
                due_at: *due_at,
            };
            timers::spawn_bonus(&self.inner, &bonus).await;
        }
    }
}

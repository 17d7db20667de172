mod error;
mod report;
mod usage;
mod window;

use std::collections::BTreeMap;

use carrot_shared::api::{Approval, BonusCredit, BonusOutcome, Completion};
use carrot_shared::domain::{
    ChildAccount, ChildId, EntryKind, JournalEntry, PendingBonus, Task, TaskId, TaskKind,
    TaskStatus,
};
use carrot_shared::snapshot::{SNAPSHOT_VERSION, Snapshot};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

pub use error::{Action, Entity, LedgerError};
pub use report::{Period, TaskFilter};

#[derive(Debug, Clone)]
pub struct StreakRule {
    /// A bonus is granted whenever the streak is a multiple of this.
    pub every: u32,
    pub bonus_minutes: u32,
    /// Zero credits the bonus together with the approval.
    pub bonus_delay: Duration,
}

impl Default for StreakRule {
    fn default() -> Self {
        StreakRule {
            every: 3,
            bonus_minutes: 5,
            bonus_delay: Duration::zero(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// When false, completing a task approves it on the spot.
    pub require_approval: bool,
    /// Game-time minutes earned per whole minute of tracked task time.
    pub time_ratio: u32,
    pub default_credit_minutes: u32,
    pub default_daily_limit_minutes: u32,
    /// When false a paused timer starts again from zero.
    pub keep_elapsed_on_pause: bool,
    pub streak: StreakRule,
    /// Day boundaries for daily limits and reports.
    pub timezone: Tz,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            require_approval: true,
            time_ratio: 1,
            default_credit_minutes: 10,
            default_daily_limit_minutes: 60,
            keep_elapsed_on_pause: false,
            streak: StreakRule::default(),
            timezone: Tz::UTC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reward {
    TimeTracked,
    /// `None` uses the configured default credit.
    FixedCredit(Option<u32>),
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner: ChildId,
    pub title: String,
    pub description: Option<String>,
    pub reward: Reward,
}

#[derive(Debug, Clone, Default)]
pub struct NewChild {
    pub id: Option<ChildId>,
    pub display_name: String,
    pub age: Option<u8>,
    pub avatar_id: Option<String>,
    pub daily_limit_minutes: Option<u32>,
    pub is_locked: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChildSettings {
    pub daily_limit_minutes: Option<u32>,
    pub is_locked: Option<bool>,
}

/// Every task and child account. Callers pass `now`; the ledger never reads
/// the clock.
#[derive(Debug, Clone)]
pub struct Ledger {
    settings: LedgerSettings,
    children: BTreeMap<ChildId, ChildAccount>,
    tasks: Vec<Task>,
    journal: Vec<JournalEntry>,
    pending_bonuses: Vec<PendingBonus>,
    next_task_seq: u64,
}

impl Ledger {
    pub fn new(settings: LedgerSettings) -> Self {
        Ledger {
            settings,
            children: BTreeMap::new(),
            tasks: Vec::new(),
            journal: Vec::new(),
            pending_bonuses: Vec::new(),
            next_task_seq: 1,
        }
    }

    /// Rebuilds a ledger from a snapshot, refusing snapshots whose tasks or
    /// bonuses point at children that do not exist.
    pub fn from_snapshot(settings: LedgerSettings, snapshot: Snapshot) -> Result<Self, LedgerError> {
        let children: BTreeMap<ChildId, ChildAccount> = snapshot
            .children
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        for task in &snapshot.tasks {
            if !children.contains_key(&task.owner) {
                return Err(LedgerError::child_not_found(&task.owner));
            }
        }
        for bonus in &snapshot.pending_bonuses {
            if !children.contains_key(&bonus.child) {
                return Err(LedgerError::child_not_found(&bonus.child));
            }
        }
        // Never hand out an id that is already taken, even if the stored
        // sequence lags behind.
        let highest = snapshot
            .tasks
            .iter()
            .filter_map(|t| t.id.0.strip_prefix("task-")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(Ledger {
            settings,
            children,
            tasks: snapshot.tasks,
            journal: snapshot.journal,
            pending_bonuses: snapshot.pending_bonuses,
            next_task_seq: snapshot.next_task_seq.max(highest + 1),
        })
    }

    pub fn to_snapshot(&self, saved_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at,
            next_task_seq: self.next_task_seq,
            children: self.children.values().cloned().collect(),
            tasks: self.tasks.clone(),
            journal: self.journal.clone(),
            pending_bonuses: self.pending_bonuses.clone(),
        }
    }

    pub fn child(&self, id: &ChildId) -> Result<&ChildAccount, LedgerError> {
        self.children
            .get(id)
            .ok_or_else(|| LedgerError::child_not_found(id))
    }

    /// Children ordered by display name.
    pub fn children(&self) -> Vec<&ChildAccount> {
        let mut out: Vec<&ChildAccount> = self.children.values().collect();
        out.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        out
    }

    pub fn task(&self, id: &TaskId) -> Result<&Task, LedgerError> {
        self.tasks
            .iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| LedgerError::task_not_found(id))
    }

    /// All tasks in creation order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn pending_bonuses(&self) -> &[PendingBonus] {
        &self.pending_bonuses
    }

    pub fn in_progress_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
    }

    pub fn add_child(&mut self, new: NewChild, now: DateTime<Utc>) -> Result<ChildAccount, LedgerError> {
        let display_name = new.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(LedgerError::InvalidInput("display name is required".into()));
        }
        let id = match new.id {
            Some(id) if id.0.trim().is_empty() => {
                return Err(LedgerError::InvalidInput("child id must not be empty".into()));
            }
            Some(id) if self.children.contains_key(&id) => {
                return Err(LedgerError::InvalidInput(format!(
                    "child id already exists: {id}"
                )));
            }
            Some(id) => id,
            None => self.unique_child_id(&display_name),
        };
        let account = ChildAccount {
            id: id.clone(),
            display_name,
            age: new.age,
            avatar_id: new.avatar_id,
            game_time_minutes: 0,
            daily_limit_minutes: new
                .daily_limit_minutes
                .unwrap_or(self.settings.default_daily_limit_minutes),
            is_locked: new.is_locked,
            streak_count: 0,
            longest_streak: 0,
            created_at: now,
        };
        self.children.insert(id, account.clone());
        Ok(account)
    }

    /// Inserts a child or refreshes the profile of an existing one. Balances
    /// and streaks of an existing child are left alone.
    pub fn upsert_child(&mut self, new: NewChild, now: DateTime<Utc>) -> Result<ChildAccount, LedgerError> {
        let id = match &new.id {
            Some(id) => id.clone(),
            None => ChildId(slug_or_default(&new.display_name)),
        };
        let Some(existing) = self.children.get_mut(&id) else {
            return self.add_child(NewChild { id: Some(id), ..new }, now);
        };
        let display_name = new.display_name.trim();
        if !display_name.is_empty() {
            existing.display_name = display_name.to_string();
        }
        if new.age.is_some() {
            existing.age = new.age;
        }
        if new.avatar_id.is_some() {
            existing.avatar_id = new.avatar_id;
        }
        Ok(existing.clone())
    }

    pub fn update_child_settings(
        &mut self,
        id: &ChildId,
        update: ChildSettings,
    ) -> Result<ChildAccount, LedgerError> {
        let child = self
            .children
            .get_mut(id)
            .ok_or_else(|| LedgerError::child_not_found(id))?;
        if let Some(limit) = update.daily_limit_minutes {
            child.daily_limit_minutes = limit;
        }
        if let Some(locked) = update.is_locked {
            child.is_locked = locked;
        }
        Ok(child.clone())
    }

    /// Explicit streak reset. The longest streak is kept.
    pub fn reset_streak(&mut self, id: &ChildId) -> Result<ChildAccount, LedgerError> {
        let child = self
            .children
            .get_mut(id)
            .ok_or_else(|| LedgerError::child_not_found(id))?;
        child.streak_count = 0;
        Ok(child.clone())
    }

    fn unique_child_id(&self, display_name: &str) -> ChildId {
        let base = slug_or_default(display_name);
        let mut candidate = ChildId(base.clone());
        let mut n = 2;
        while self.children.contains_key(&candidate) {
            candidate = ChildId(format!("{base}-{n}"));
            n += 1;
        }
        candidate
    }

    pub fn create_task(&mut self, new: NewTask, now: DateTime<Utc>) -> Result<Task, LedgerError> {
        self.child(&new.owner)?;
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(LedgerError::InvalidInput("task title is required".into()));
        }
        let kind = match new.reward {
            Reward::TimeTracked => TaskKind::time_tracked(),
            Reward::FixedCredit(minutes) => {
                let credit_minutes = minutes.unwrap_or(self.settings.default_credit_minutes);
                if credit_minutes == 0 {
                    return Err(LedgerError::InvalidAmount(
                        "credit minutes must be positive".into(),
                    ));
                }
                TaskKind::FixedCredit { credit_minutes }
            }
        };
        let task = Task {
            id: TaskId::from_seq(self.next_task_seq),
            title,
            description: new
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            owner: new.owner,
            kind,
            status: TaskStatus::Pending,
            created_at: now,
            completed_at: None,
            decided_at: None,
            minutes_earned: None,
        };
        self.next_task_seq += 1;
        self.tasks.push(task.clone());
        Ok(task)
    }

    pub fn start_timer(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Task, LedgerError> {
        let idx = self.task_index(id)?;
        let task = &mut self.tasks[idx];
        if task.status != TaskStatus::Pending || !task.is_time_tracked() {
            return Err(invalid(task, Action::Start));
        }
        if let TaskKind::TimeTracked {
            elapsed_seconds,
            last_tick_at,
        } = &mut task.kind
        {
            elapsed_seconds.get_or_insert(0);
            *last_tick_at = Some(now);
        }
        task.status = TaskStatus::InProgress;
        Ok(task.clone())
    }

    pub fn pause_timer(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Task, LedgerError> {
        let keep = self.settings.keep_elapsed_on_pause;
        let idx = self.task_index(id)?;
        let task = &mut self.tasks[idx];
        if task.status != TaskStatus::InProgress {
            return Err(invalid(task, Action::Pause));
        }
        if let TaskKind::TimeTracked {
            elapsed_seconds,
            last_tick_at,
        } = &mut task.kind
        {
            if keep {
                advance(elapsed_seconds, last_tick_at, now);
            } else {
                *elapsed_seconds = Some(0);
            }
            *last_tick_at = None;
        }
        task.status = TaskStatus::Pending;
        Ok(task.clone())
    }

    /// Counts the whole seconds that passed since the previous tick and
    /// returns the running total.
    pub fn tick(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        let idx = self.task_index(id)?;
        let task = &mut self.tasks[idx];
        if task.status != TaskStatus::InProgress {
            return Err(invalid(task, Action::Tick));
        }
        if let TaskKind::TimeTracked {
            elapsed_seconds,
            last_tick_at,
        } = &mut task.kind
        {
            return Ok(advance(elapsed_seconds, last_tick_at, now));
        }
        Err(invalid(task, Action::Tick))
    }

    pub fn complete_timed_task(
        &mut self,
        id: &TaskId,
        elapsed: u64,
        now: DateTime<Utc>,
    ) -> Result<Completion, LedgerError> {
        let idx = self.task_index(id)?;
        let task = &self.tasks[idx];
        if task.status != TaskStatus::InProgress || !task.is_time_tracked() {
            return Err(invalid(task, Action::Complete));
        }
        self.ensure_owner_for_auto_approval(idx)?;

        let before = self.tasks[idx].clone();
        let task = &mut self.tasks[idx];
        if let TaskKind::TimeTracked {
            elapsed_seconds,
            last_tick_at,
        } = &mut task.kind
        {
            *elapsed_seconds = Some(elapsed);
            *last_tick_at = None;
        }
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        self.finish_completion(idx, before, now)
    }

    pub fn complete_credit_task(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Completion, LedgerError> {
        let idx = self.task_index(id)?;
        let task = &self.tasks[idx];
        if task.status != TaskStatus::Pending || task.is_time_tracked() {
            return Err(invalid(task, Action::Complete));
        }
        self.ensure_owner_for_auto_approval(idx)?;

        let before = self.tasks[idx].clone();
        let task = &mut self.tasks[idx];
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        self.finish_completion(idx, before, now)
    }

    pub fn approve(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Approval, LedgerError> {
        let idx = self.task_index(id)?;
        let task = &self.tasks[idx];
        if task.status != TaskStatus::Completed {
            return Err(invalid(task, Action::Approve));
        }
        self.approve_index(idx, now)
    }

    pub fn reject(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Task, LedgerError> {
        let idx = self.task_index(id)?;
        let task = &mut self.tasks[idx];
        if task.status != TaskStatus::Completed {
            return Err(invalid(task, Action::Reject));
        }
        task.status = TaskStatus::Rejected;
        task.decided_at = Some(now);
        Ok(task.clone())
    }

    /// Parent override. The balance is clamped at zero; the journal records
    /// the change that was actually applied.
    pub fn adjust_game_time(
        &mut self,
        id: &ChildId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<ChildAccount, LedgerError> {
        let child = self
            .children
            .get_mut(id)
            .ok_or_else(|| LedgerError::child_not_found(id))?;
        let before = i64::from(child.game_time_minutes);
        let after = before.saturating_add(delta).clamp(0, i64::from(u32::MAX));
        child.game_time_minutes = after as u32;
        if after != before {
            self.journal.push(JournalEntry {
                at: now,
                child: id.clone(),
                task: None,
                minutes: after - before,
                kind: EntryKind::Adjustment,
            });
        }
        Ok(child.clone())
    }

    /// Credits one pending bonus regardless of its due time.
    pub fn settle_bonus(&mut self, task: &TaskId, now: DateTime<Utc>) -> Option<BonusCredit> {
        let pos = self.pending_bonuses.iter().position(|b| &b.task == task)?;
        let bonus = self.pending_bonuses.remove(pos);
        self.credit_bonus(bonus, now)
    }

    /// Credits every pending bonus that is due at `now`.
    pub fn settle_due_bonuses(&mut self, now: DateTime<Utc>) -> Vec<BonusCredit> {
        let (due, later): (Vec<PendingBonus>, Vec<PendingBonus>) = std::mem::take(&mut self.pending_bonuses)
            .into_iter()
            .partition(|b| b.due_at <= now);
        self.pending_bonuses = later;
        due.into_iter()
            .filter_map(|b| self.credit_bonus(b, now))
            .collect()
    }

    /// Drops a pending bonus without crediting it.
    pub fn cancel_bonus(&mut self, task: &TaskId) -> Option<PendingBonus> {
        let pos = self.pending_bonuses.iter().position(|b| &b.task == task)?;
        Some(self.pending_bonuses.remove(pos))
    }

    pub fn cancel_all_bonuses(&mut self) -> Vec<PendingBonus> {
        std::mem::take(&mut self.pending_bonuses)
    }

    fn credit_bonus(&mut self, bonus: PendingBonus, now: DateTime<Utc>) -> Option<BonusCredit> {
        let Some(child) = self.children.get_mut(&bonus.child) else {
            warn!(child_id=%bonus.child, task_id=%bonus.task, "bonus for unknown child dropped");
            return None;
        };
        child.game_time_minutes = child.game_time_minutes.saturating_add(bonus.minutes);
        self.journal.push(JournalEntry {
            at: now,
            child: bonus.child.clone(),
            task: Some(bonus.task.clone()),
            minutes: i64::from(bonus.minutes),
            kind: EntryKind::StreakBonus,
        });
        Some(BonusCredit {
            task_id: bonus.task,
            child_id: bonus.child,
            minutes: bonus.minutes,
            game_time_minutes: child.game_time_minutes,
        })
    }

    fn task_index(&self, id: &TaskId) -> Result<usize, LedgerError> {
        self.tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| LedgerError::task_not_found(id))
    }

    fn ensure_owner_for_auto_approval(&self, idx: usize) -> Result<(), LedgerError> {
        if !self.settings.require_approval {
            self.child(&self.tasks[idx].owner)?;
        }
        Ok(())
    }

    /// Auto-approves when approval is not required. A failed approval puts
    /// the task back the way it was.
    fn finish_completion(
        &mut self,
        idx: usize,
        before: Task,
        now: DateTime<Utc>,
    ) -> Result<Completion, LedgerError> {
        let approval = if self.settings.require_approval {
            None
        } else {
            match self.approve_index(idx, now) {
                Ok(approval) => Some(approval),
                Err(e) => {
                    self.tasks[idx] = before;
                    return Err(e);
                }
            }
        };
        Ok(Completion {
            task: self.tasks[idx].clone(),
            approval,
        })
    }

    fn minutes_for(&self, task: &Task) -> u32 {
        match task.kind {
            TaskKind::TimeTracked {
                elapsed_seconds, ..
            } => {
                let whole_minutes = elapsed_seconds.unwrap_or(0) / 60;
                u32::try_from(whole_minutes)
                    .unwrap_or(u32::MAX)
                    .saturating_mul(self.settings.time_ratio)
            }
            TaskKind::FixedCredit { credit_minutes } => credit_minutes,
        }
    }

    /// Credits a completed task and advances the owner's streak. Everything
    /// that can fail is worked out before the first write.
    fn approve_index(&mut self, idx: usize, now: DateTime<Utc>) -> Result<Approval, LedgerError> {
        let minutes = self.minutes_for(&self.tasks[idx]);
        let owner = self.tasks[idx].owner.clone();
        let streak_count = self.child(&owner)?.streak_count.saturating_add(1);

        let rule = &self.settings.streak;
        let earns_bonus = rule.every > 0 && rule.bonus_minutes > 0 && streak_count % rule.every == 0;
        let bonus = if !earns_bonus {
            None
        } else if rule.bonus_delay <= Duration::zero() {
            Some(BonusOutcome::Credited {
                minutes: rule.bonus_minutes,
            })
        } else {
            let due_at = now.checked_add_signed(rule.bonus_delay).ok_or_else(|| {
                LedgerError::InvalidInput(format!(
                    "streak bonus delay of {} ms is out of range",
                    rule.bonus_delay.num_milliseconds()
                ))
            })?;
            Some(BonusOutcome::Scheduled {
                minutes: rule.bonus_minutes,
                due_at,
            })
        };

        let Some(child) = self.children.get_mut(&owner) else {
            return Err(LedgerError::child_not_found(&owner));
        };
        let task = &mut self.tasks[idx];
        task.status = TaskStatus::Approved;
        task.decided_at = Some(now);
        task.minutes_earned = Some(minutes);
        let task_id = task.id.clone();

        child.game_time_minutes = child.game_time_minutes.saturating_add(minutes);
        self.journal.push(JournalEntry {
            at: now,
            child: owner.clone(),
            task: Some(task_id.clone()),
            minutes: i64::from(minutes),
            kind: EntryKind::TaskReward,
        });
        child.streak_count = streak_count;
        child.longest_streak = child.longest_streak.max(streak_count);

        match &bonus {
            Some(BonusOutcome::Credited { minutes }) => {
                child.game_time_minutes = child.game_time_minutes.saturating_add(*minutes);
                self.journal.push(JournalEntry {
                    at: now,
                    child: owner.clone(),
                    task: Some(task_id.clone()),
                    minutes: i64::from(*minutes),
                    kind: EntryKind::StreakBonus,
                });
            }
            Some(BonusOutcome::Scheduled { minutes, due_at }) => {
                self.pending_bonuses.push(PendingBonus {
                    task: task_id.clone(),
                    child: owner.clone(),
                    minutes: *minutes,
                    due_at: *due_at,
                });
            }
            None => {}
        }

        debug!(
            task_id=%task_id,
            child_id=%owner,
            minutes,
            streak = streak_count,
            "task approved"
        );
        Ok(Approval {
            task_id,
            child_id: owner,
            minutes_earned: minutes,
            streak_count,
            game_time_minutes: child.game_time_minutes,
            bonus,
        })
    }
}

fn invalid(task: &Task, action: Action) -> LedgerError {
    LedgerError::InvalidTransition {
        task: task.id.clone(),
        kind: task.kind.label(),
        from: task.status,
        action,
    }
}

fn advance(
    elapsed_seconds: &mut Option<u64>,
    last_tick_at: &mut Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u64 {
    if let Some(prev) = *last_tick_at {
        let secs = (now - prev).num_seconds();
        if secs > 0 {
            *elapsed_seconds = Some(elapsed_seconds.unwrap_or(0).saturating_add(secs as u64));
            *last_tick_at = Some(prev + Duration::seconds(secs));
        }
    }
    elapsed_seconds.unwrap_or(0)
}

fn slug_or_default(display_name: &str) -> String {
    let s = slug::slugify(display_name.trim());
    if s.is_empty() { "child".to_string() } else { s }
}

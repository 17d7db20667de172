use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChildId, Task, TaskId, TaskStatus};

// Approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub task_id: TaskId,
    pub child_id: ChildId,
    pub minutes_earned: u32,
    pub streak_count: u32,
    /// Balance right after the base credit (and the bonus, when immediate).
    pub game_time_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus: Option<BonusOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum BonusOutcome {
    Credited { minutes: u32 },
    Scheduled { minutes: u32, due_at: DateTime<Utc> },
}

// Completion (approval is present when auto-approval is on)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
}

// Deferred bonus credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusCredit {
    pub task_id: TaskId,
    pub child_id: ChildId,
    pub minutes: u32,
    pub game_time_minutes: u32,
}

// Reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDto {
    pub child_id: ChildId,
    pub child_name: String,
    pub period: ReportPeriod,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub tasks_completed: u32,
    pub time_earned: u32,
    pub time_used: u32,
    pub awaiting_approval: u32,
}

// Events pushed to whoever renders the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    TimerTick {
        task_id: TaskId,
        elapsed_seconds: u64,
    },
    TaskUpdated {
        task_id: TaskId,
        status: TaskStatus,
    },
    BalanceChanged {
        child_id: ChildId,
        game_time_minutes: u32,
    },
    BonusCredited(BonusCredit),
    BonusCancelled {
        task_id: TaskId,
        child_id: ChildId,
    },
}

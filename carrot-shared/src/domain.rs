use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildId(pub String);

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ChildId {
    fn from(value: &str) -> Self {
        ChildId(value.to_string())
    }
}

impl FromStr for ChildId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ChildId(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn from_seq(seq: u64) -> Self {
        TaskId(format!("task-{seq}"))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId(value.to_string())
    }
}

impl FromStr for TaskId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TaskId(s.to_string()))
    }
}

/// Where a task sits in its lifecycle.
///
/// `Approved` and `Rejected` are terminal; `InProgress` only ever applies to
/// time-tracked tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Approved,
    Rejected,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Approved | TaskStatus::Rejected)
    }

    /// Completed tasks are the ones waiting for a parent decision.
    pub fn awaits_approval(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Approved => "approved",
            TaskStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "approved" => Ok(TaskStatus::Approved),
            "rejected" => Ok(TaskStatus::Rejected),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// How a task earns game time. The variant is fixed at creation, so the
/// timer fields can only exist on time-tracked tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskKind {
    TimeTracked {
        /// Seconds counted so far; `None` until the timer first starts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_seconds: Option<u64>,
        /// Instant up to which `elapsed_seconds` has been counted. Only set
        /// while the task is in progress.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_tick_at: Option<DateTime<Utc>>,
    },
    FixedCredit {
        credit_minutes: u32,
    },
}

impl TaskKind {
    pub fn time_tracked() -> Self {
        TaskKind::TimeTracked {
            elapsed_seconds: None,
            last_tick_at: None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::TimeTracked { .. } => "time-tracked",
            TaskKind::FixedCredit { .. } => "fixed-credit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner: ChildId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_earned: Option<u32>,
}

impl Task {
    pub fn is_time_tracked(&self) -> bool {
        matches!(self.kind, TaskKind::TimeTracked { .. })
    }

    pub fn elapsed_seconds(&self) -> Option<u64> {
        match self.kind {
            TaskKind::TimeTracked {
                elapsed_seconds, ..
            } => elapsed_seconds,
            TaskKind::FixedCredit { .. } => None,
        }
    }

    pub fn credit_minutes(&self) -> Option<u32> {
        match self.kind {
            TaskKind::FixedCredit { credit_minutes } => Some(credit_minutes),
            TaskKind::TimeTracked { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildAccount {
    pub id: ChildId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_id: Option<String>,
    pub game_time_minutes: u32,
    /// 0 means no daily cap.
    pub daily_limit_minutes: u32,
    /// Blocks spending game time; earning is unaffected.
    pub is_locked: bool,
    pub streak_count: u32,
    pub longest_streak: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    TaskReward,
    StreakBonus,
    Adjustment,
    Usage,
}

/// One balance change. `minutes` is signed: credits are positive, usage and
/// downward adjustments negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub at: DateTime<Utc>,
    pub child: ChildId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,
    pub minutes: i64,
    pub kind: EntryKind,
}

/// A streak bonus that has been earned but not yet credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBonus {
    /// The approval that triggered the bonus.
    pub task: TaskId,
    pub child: ChildId,
    pub minutes: u32,
    pub due_at: DateTime<Utc>,
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Approved.is_terminal());
        assert!(TaskStatus::Rejected.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Completed.is_terminal());
    }

    #[test]
    fn status_wire_names() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, r#""in-progress""#);
        assert_eq!(
            "in-progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn kind_is_tagged() {
        let kind = TaskKind::FixedCredit { credit_minutes: 15 };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "fixed-credit");
        assert_eq!(json["credit_minutes"], 15);

        let fresh = serde_json::to_value(TaskKind::time_tracked()).unwrap();
        assert_eq!(fresh, serde_json::json!({"type": "time-tracked"}));
    }
}

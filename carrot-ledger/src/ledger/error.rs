use std::fmt;

use carrot_shared::domain::{ChildId, TaskId, TaskStatus};

/// Operations that move a task between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Tick,
    Complete,
    Approve,
    Reject,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Start => "start",
            Action::Pause => "pause",
            Action::Tick => "tick",
            Action::Complete => "complete",
            Action::Approve => "approve",
            Action::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Task(TaskId),
    Child(ChildId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Task(id) => write!(f, "task {id}"),
            Entity::Child(id) => write!(f, "child {id}"),
        }
    }
}

/// Every ledger operation either succeeds completely or returns one of these
/// with the ledger untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("cannot {action} {kind} task {task} while it is {from}")]
    InvalidTransition {
        task: TaskId,
        kind: &'static str,
        from: TaskStatus,
        action: Action,
    },

    #[error("{0} not found")]
    NotFound(Entity),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("game time is locked for {0}")]
    GameTimeLocked(ChildId),

    #[error(
        "daily limit of {limit} minutes reached for {child} ({used} used today, {requested} requested)"
    )]
    DailyLimitExceeded {
        child: ChildId,
        limit: u32,
        used: u32,
        requested: u32,
    },

    #[error("{child} has {available} minutes, {requested} requested")]
    InsufficientBalance {
        child: ChildId,
        available: u32,
        requested: u32,
    },
}

impl LedgerError {
    pub fn task_not_found(id: &TaskId) -> Self {
        LedgerError::NotFound(Entity::Task(id.clone()))
    }

    pub fn child_not_found(id: &ChildId) -> Self {
        LedgerError::NotFound(Entity::Child(id.clone()))
    }
}

use carrot_shared::auth::{Actor, Role};
use carrot_shared::domain::ChildId;

use super::ServiceError;

/// What an actor is trying to do. Variants that touch a single child carry
/// that child's id (for tasks: the owner).
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    ListChildren,
    ViewChild(&'a ChildId),
    AddChild,
    UpdateChildSettings,
    ResetStreak,
    AdjustGameTime,
    SpendGameTime(&'a ChildId),
    CreateTask,
    ListTasks(Option<&'a ChildId>),
    ViewTask(&'a ChildId),
    StartTimer(&'a ChildId),
    PauseTimer(&'a ChildId),
    CompleteTask(&'a ChildId),
    /// Completing a timed task with a given elapsed time instead of the
    /// measured one.
    RecordElapsed,
    Approve,
    Reject,
    CancelBonus,
    ViewPending,
    Report,
    ManageSnapshots,
}

impl Operation<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListChildren => "list children",
            Operation::ViewChild(_) => "view child",
            Operation::AddChild => "add child",
            Operation::UpdateChildSettings => "update child settings",
            Operation::ResetStreak => "reset streak",
            Operation::AdjustGameTime => "adjust game time",
            Operation::SpendGameTime(_) => "spend game time",
            Operation::CreateTask => "create task",
            Operation::ListTasks(_) => "list tasks",
            Operation::ViewTask(_) => "view task",
            Operation::StartTimer(_) => "start timer",
            Operation::PauseTimer(_) => "pause timer",
            Operation::CompleteTask(_) => "complete task",
            Operation::RecordElapsed => "record elapsed time",
            Operation::Approve => "approve task",
            Operation::Reject => "reject task",
            Operation::CancelBonus => "cancel bonus",
            Operation::ViewPending => "view pending approvals",
            Operation::Report => "view report",
            Operation::ManageSnapshots => "manage snapshots",
        }
    }
}

pub fn authorize(actor: &Actor, op: Operation<'_>) -> Result<(), ServiceError> {
    let decision = match actor.role {
        // Parents run the household.
        Role::Parent => Ok(()),
        Role::Child => allow_child(actor, op),
    };
    if decision.is_err() {
        tracing::warn!(
            actor = %actor,
            operation = op.name(),
            "ACL: no rule matched; denying"
        );
    }
    decision
}

fn allow_child(actor: &Actor, op: Operation<'_>) -> Result<(), ServiceError> {
    match op {
        Operation::ViewChild(child) => ensure_child(actor, child, op),
        Operation::SpendGameTime(child) => ensure_child(actor, child, op),
        Operation::ListTasks(Some(child)) => ensure_child(actor, child, op),
        Operation::ViewTask(owner) => ensure_child(actor, owner, op),
        Operation::StartTimer(owner) => ensure_child(actor, owner, op),
        Operation::PauseTimer(owner) => ensure_child(actor, owner, op),
        Operation::CompleteTask(owner) => ensure_child(actor, owner, op),
        _ => Err(ServiceError::forbidden(actor, op)),
    }
}

fn ensure_child(actor: &Actor, child: &ChildId, op: Operation<'_>) -> Result<(), ServiceError> {
    match &actor.child_id {
        Some(own) if own == child => Ok(()),
        _ => Err(ServiceError::forbidden(actor, op)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_may_do_anything() {
        let parent = Actor::parent();
        let alex = ChildId::from("alex");
        assert!(authorize(&parent, Operation::Approve).is_ok());
        assert!(authorize(&parent, Operation::SpendGameTime(&alex)).is_ok());
        assert!(authorize(&parent, Operation::ManageSnapshots).is_ok());
        assert!(authorize(&parent, Operation::RecordElapsed).is_ok());
    }

    #[test]
    fn child_is_limited_to_own_records() {
        let alex = ChildId::from("alex");
        let sam = ChildId::from("sam");
        let actor = Actor::child("alex");

        assert!(authorize(&actor, Operation::StartTimer(&alex)).is_ok());
        assert!(authorize(&actor, Operation::CompleteTask(&alex)).is_ok());
        assert!(authorize(&actor, Operation::ListTasks(Some(&alex))).is_ok());
        assert!(authorize(&actor, Operation::ViewChild(&alex)).is_ok());

        assert!(authorize(&actor, Operation::StartTimer(&sam)).is_err());
        assert!(authorize(&actor, Operation::ViewChild(&sam)).is_err());
        assert!(authorize(&actor, Operation::ListTasks(None)).is_err());
        assert!(authorize(&actor, Operation::Approve).is_err());
        assert!(authorize(&actor, Operation::AdjustGameTime).is_err());
        assert!(authorize(&actor, Operation::CreateTask).is_err());
        assert!(authorize(&actor, Operation::RecordElapsed).is_err());
    }
}

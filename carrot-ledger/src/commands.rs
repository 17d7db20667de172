use carrot_ledger::ledger::{ChildSettings, NewChild, NewTask, Reward, TaskFilter};
use carrot_ledger::service::{Service, ServiceError};
use carrot_shared::api::{Approval, BonusOutcome, Completion, ReportDto, ReportPeriod, ServiceEvent};
use carrot_shared::auth::Actor;
use carrot_shared::domain::{ChildAccount, PendingBonus, Task, TaskKind, TaskStatus};
use serde::Serialize;

use crate::cli::{BonusCommand, ChildCommand, LedgerCommand, TaskCommand, TimeCommand};

/// Result of one command, printable as text or JSON.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    Child(ChildAccount),
    Children(Vec<ChildAccount>),
    Task(Task),
    Tasks(Vec<Task>),
    Completion(Completion),
    Approval(Approval),
    Report(ReportDto),
    Pending { count: usize, tasks: Vec<Task> },
    Bonuses(Vec<PendingBonus>),
    Cancelled(Option<PendingBonus>),
    Allowed { allowed: bool },
}

pub async fn run(service: &Service, actor: &Actor, cmd: LedgerCommand) -> Result<Output, ServiceError> {
    match cmd {
        LedgerCommand::Child(cmd) => child(service, actor, cmd).await,
        LedgerCommand::Task(cmd) => task(service, actor, cmd).await,
        LedgerCommand::Time(TimeCommand::Adjust { child, delta }) => Ok(Output::Child(
            service.adjust_game_time(actor, &child, delta).await?,
        )),
        LedgerCommand::Time(TimeCommand::Spend {
            child,
            minutes,
            check,
        }) => {
            if check {
                service.check_spend(actor, &child, minutes).await?;
                Ok(Output::Allowed { allowed: true })
            } else {
                Ok(Output::Child(
                    service.spend_game_time(actor, &child, minutes).await?,
                ))
            }
        }
        LedgerCommand::Bonus(BonusCommand::List) => {
            Ok(Output::Bonuses(service.pending_bonuses(actor).await?))
        }
        LedgerCommand::Bonus(BonusCommand::Cancel { task }) => {
            Ok(Output::Cancelled(service.cancel_bonus(actor, &task).await?))
        }
        LedgerCommand::Report { child, weekly } => {
            let period = if weekly {
                ReportPeriod::Weekly
            } else {
                ReportPeriod::Daily
            };
            Ok(Output::Report(service.report(actor, &child, period).await?))
        }
        LedgerCommand::Pending { child } => {
            let count = service.pending_approval_count(actor, child.as_ref()).await?;
            let filter = TaskFilter {
                child,
                status: Some(TaskStatus::Completed),
                period: None,
                open: true,
            };
            let tasks = service.tasks(actor, filter).await?;
            Ok(Output::Pending { count, tasks })
        }
    }
}

async fn child(service: &Service, actor: &Actor, cmd: ChildCommand) -> Result<Output, ServiceError> {
    let out = match cmd {
        ChildCommand::Add {
            name,
            id,
            age,
            avatar,
            daily_limit,
        } => {
            let new = NewChild {
                id,
                display_name: name,
                age,
                avatar_id: avatar,
                daily_limit_minutes: daily_limit,
                is_locked: false,
            };
            Output::Child(service.add_child(actor, new).await?)
        }
        ChildCommand::List => Output::Children(service.children(actor).await?),
        ChildCommand::Show { id } => Output::Child(service.child(actor, &id).await?),
        ChildCommand::Settings {
            id,
            daily_limit,
            lock,
            unlock,
        } => {
            let is_locked = match (lock, unlock) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let update = ChildSettings {
                daily_limit_minutes: daily_limit,
                is_locked,
            };
            Output::Child(service.update_child_settings(actor, &id, update).await?)
        }
        ChildCommand::ResetStreak { id } => Output::Child(service.reset_streak(actor, &id).await?),
    };
    Ok(out)
}

async fn task(service: &Service, actor: &Actor, cmd: TaskCommand) -> Result<Output, ServiceError> {
    let out = match cmd {
        TaskCommand::Create {
            child,
            title,
            description,
            timed,
            credit,
        } => {
            let reward = if timed {
                Reward::TimeTracked
            } else {
                Reward::FixedCredit(credit)
            };
            let new = NewTask {
                owner: child,
                title,
                description,
                reward,
            };
            Output::Task(service.create_task(actor, new).await?)
        }
        TaskCommand::List {
            child,
            status,
            period,
            open,
        } => {
            let filter = TaskFilter {
                child,
                status,
                period,
                open,
            };
            Output::Tasks(service.tasks(actor, filter).await?)
        }
        TaskCommand::Show { id } => Output::Task(service.task(actor, &id).await?),
        TaskCommand::Start { id } => Output::Task(service.start_timer(actor, &id).await?),
        TaskCommand::Pause { id } => Output::Task(service.pause_timer(actor, &id).await?),
        TaskCommand::Stop { id } => Output::Completion(service.stop_timer(actor, &id).await?),
        TaskCommand::Complete { id, elapsed } => match elapsed {
            Some(secs) => Output::Completion(service.complete_timed_task(actor, &id, secs).await?),
            None => Output::Completion(service.complete(actor, &id).await?),
        },
        TaskCommand::Approve { id } => Output::Approval(service.approve(actor, &id).await?),
        TaskCommand::Reject { id } => Output::Task(service.reject(actor, &id).await?),
    };
    Ok(out)
}

impl Output {
    pub fn render(&self, json: bool) -> String {
        if json {
            return serde_json::to_string_pretty(self)
                .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
        }
        match self {
            Output::Child(c) => child_line(c),
            Output::Children(list) if list.is_empty() => "no children".to_string(),
            Output::Children(list) => lines(list.iter().map(child_line)),
            Output::Task(t) => task_line(t),
            Output::Tasks(list) if list.is_empty() => "no tasks".to_string(),
            Output::Tasks(list) => lines(list.iter().map(task_line)),
            Output::Completion(c) => match &c.approval {
                Some(a) => format!("{}\n{}", task_line(&c.task), approval_line(a)),
                None => format!("{}\nwaiting for approval", task_line(&c.task)),
            },
            Output::Approval(a) => approval_line(a),
            Output::Report(r) => report_text(r),
            Output::Pending { count, tasks } => {
                let mut out = format!("{count} task(s) waiting for approval");
                for t in tasks {
                    out.push('\n');
                    out.push_str(&task_line(t));
                }
                out
            }
            Output::Bonuses(list) if list.is_empty() => "no scheduled bonuses".to_string(),
            Output::Bonuses(list) => lines(list.iter().map(|b| {
                format!(
                    "+{} min for {} (after {}) due {}",
                    b.minutes,
                    b.child,
                    b.task,
                    b.due_at.format("%Y-%m-%d %H:%M:%S")
                )
            })),
            Output::Cancelled(Some(b)) => {
                format!("cancelled +{} min bonus for {}", b.minutes, b.child)
            }
            Output::Cancelled(None) => "no scheduled bonus for that task".to_string(),
            Output::Allowed { .. } => "allowed".to_string(),
        }
    }
}

/// Text for events shown by the session. Timer ticks only show up once a
/// minute.
pub fn event_line(event: &ServiceEvent) -> Option<String> {
    match event {
        ServiceEvent::TimerTick {
            task_id,
            elapsed_seconds,
        } if elapsed_seconds % 60 == 0 => {
            Some(format!("{task_id}: {}", clock_text(*elapsed_seconds)))
        }
        ServiceEvent::TimerTick { .. } => None,
        ServiceEvent::TaskUpdated { .. } => None,
        ServiceEvent::BalanceChanged { .. } => None,
        ServiceEvent::BonusCredited(c) => Some(format!(
            "streak bonus: +{} min for {} (balance {} min)",
            c.minutes, c.child_id, c.game_time_minutes
        )),
        ServiceEvent::BonusCancelled { task_id, child_id } => Some(format!(
            "streak bonus for {child_id} after {task_id} cancelled"
        )),
    }
}

fn lines(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join("\n")
}

fn child_line(c: &ChildAccount) -> String {
    let limit = match c.daily_limit_minutes {
        0 => "no daily limit".to_string(),
        n => format!("{n} min/day"),
    };
    format!(
        "{} ({}): {} min, streak {} (best {}), {}{}",
        c.display_name,
        c.id,
        c.game_time_minutes,
        c.streak_count,
        c.longest_streak,
        limit,
        if c.is_locked { ", locked" } else { "" }
    )
}

fn task_line(t: &Task) -> String {
    let detail = match &t.kind {
        TaskKind::TimeTracked {
            elapsed_seconds, ..
        } => format!("timer {}", clock_text(elapsed_seconds.unwrap_or(0))),
        TaskKind::FixedCredit { credit_minutes } => format!("{credit_minutes} min"),
    };
    let mut line = format!(
        "{} [{}] {} for {} ({})",
        t.id, t.status, t.title, t.owner, detail
    );
    if let Some(m) = t.minutes_earned {
        line.push_str(&format!(", earned {m} min"));
    }
    line
}

fn approval_line(a: &Approval) -> String {
    let mut line = format!(
        "approved {}: +{} min for {}, balance {} min, streak {}",
        a.task_id, a.minutes_earned, a.child_id, a.game_time_minutes, a.streak_count
    );
    match &a.bonus {
        Some(BonusOutcome::Credited { minutes }) => {
            line.push_str(&format!("\nstreak bonus: +{minutes} min"));
        }
        Some(BonusOutcome::Scheduled { minutes, due_at }) => {
            line.push_str(&format!(
                "\nstreak bonus: +{minutes} min at {}",
                due_at.format("%H:%M:%S")
            ));
        }
        None => {}
    }
    line
}

fn report_text(r: &ReportDto) -> String {
    let title = match r.period {
        ReportPeriod::Daily => "Today",
        ReportPeriod::Weekly => "This week",
    };
    format!(
        "{title} for {} ({})\n  tasks completed: {}\n  time earned: {} min\n  time used: {} min\n  awaiting approval: {}",
        r.child_name, r.child_id, r.tasks_completed, r.time_earned, r.time_used, r.awaiting_approval
    )
}

fn clock_text(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

use std::str::FromStr;

use carrot_shared::api::{ReportDto, ReportPeriod};
use carrot_shared::domain::{ChildId, EntryKind, Task, TaskStatus};
use chrono::{DateTime, Utc};

use super::window::{self, Window};
use super::{Ledger, LedgerError};

/// Creation-date buckets used when listing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Yesterday,
    ThisWeek,
}

impl FromStr for Period {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Period::Today),
            "yesterday" => Ok(Period::Yesterday),
            "this-week" | "week" => Ok(Period::ThisWeek),
            other => Err(format!(
                "unknown period '{other}': expected today, yesterday or this-week"
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub child: Option<ChildId>,
    pub status: Option<TaskStatus>,
    pub period: Option<Period>,
    /// Skip approved and rejected tasks.
    pub open: bool,
}

impl Ledger {
    fn period_window(&self, period: Period, now: DateTime<Utc>) -> Window {
        let tz = self.settings.timezone;
        match period {
            Period::Today => window::day(tz, now, 0),
            Period::Yesterday => window::day(tz, now, 1),
            Period::ThisWeek => window::week(tz, now),
        }
    }

    /// Tasks matching every set field of `filter`, in creation order.
    pub fn tasks_matching(&self, filter: &TaskFilter, now: DateTime<Utc>) -> Vec<&Task> {
        let window = filter.period.map(|p| self.period_window(p, now));
        self.tasks
            .iter()
            .filter(|t| filter.child.as_ref().is_none_or(|c| &t.owner == c))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| !filter.open || !t.status.is_terminal())
            .filter(|t| window.is_none_or(|w| w.contains(t.created_at)))
            .collect()
    }

    /// Completed tasks waiting for a parent decision.
    pub fn pending_approval_count(&self, child: Option<&ChildId>) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status.awaits_approval())
            .filter(|t| child.is_none_or(|c| &t.owner == c))
            .count()
    }

    pub fn report(
        &self,
        child: &ChildId,
        period: ReportPeriod,
        now: DateTime<Utc>,
    ) -> Result<ReportDto, LedgerError> {
        let account = self.child(child)?;
        let window = match period {
            ReportPeriod::Daily => window::day(self.settings.timezone, now, 0),
            ReportPeriod::Weekly => window::week(self.settings.timezone, now),
        };

        let tasks_completed = self
            .tasks
            .iter()
            .filter(|t| &t.owner == child)
            .filter(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Approved))
            .filter(|t| t.completed_at.is_some_and(|at| window.contains(at)))
            .count();

        let mut earned: i64 = 0;
        let mut used: i64 = 0;
        for entry in self
            .journal
            .iter()
            .filter(|e| &e.child == child && window.contains(e.at))
        {
            match entry.kind {
                EntryKind::TaskReward | EntryKind::StreakBonus => earned += entry.minutes,
                EntryKind::Usage => used -= entry.minutes,
                EntryKind::Adjustment => {}
            }
        }

        Ok(ReportDto {
            child_id: account.id.clone(),
            child_name: account.display_name.clone(),
            period,
            from: window.from,
            to: window.to,
            tasks_completed: to_u32(tasks_completed as i64),
            time_earned: to_u32(earned),
            time_used: to_u32(used),
            awaiting_approval: to_u32(self.pending_approval_count(Some(child)) as i64),
        })
    }
}

fn to_u32(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

use carrot_shared::domain::{ChildAccount, ChildId, EntryKind, JournalEntry};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Ledger, LedgerError, window};

impl Ledger {
    /// Minutes of game time the child has used during the current local day.
    pub fn used_today(&self, child: &ChildId, now: DateTime<Utc>) -> u32 {
        let today = window::day(self.settings.timezone, now, 0);
        let used: i64 = self
            .journal
            .iter()
            .filter(|e| e.kind == EntryKind::Usage && &e.child == child && today.contains(e.at))
            .map(|e| -e.minutes)
            .sum();
        u32::try_from(used.max(0)).unwrap_or(u32::MAX)
    }

    /// Read-only gate for consuming game time: lock first, then the daily
    /// cap, then the bank.
    pub fn check_spend(&self, child: &ChildId, minutes: u32, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if minutes == 0 {
            return Err(LedgerError::InvalidAmount(
                "minutes to spend must be positive".into(),
            ));
        }
        let account = self.child(child)?;
        if account.is_locked {
            return Err(LedgerError::GameTimeLocked(child.clone()));
        }
        if account.daily_limit_minutes > 0 {
            let used = self.used_today(child, now);
            if used.saturating_add(minutes) > account.daily_limit_minutes {
                return Err(LedgerError::DailyLimitExceeded {
                    child: child.clone(),
                    limit: account.daily_limit_minutes,
                    used,
                    requested: minutes,
                });
            }
        }
        if account.game_time_minutes < minutes {
            return Err(LedgerError::InsufficientBalance {
                child: child.clone(),
                available: account.game_time_minutes,
                requested: minutes,
            });
        }
        Ok(())
    }

    pub fn spend_game_time(
        &mut self,
        child: &ChildId,
        minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<ChildAccount, LedgerError> {
        self.check_spend(child, minutes, now)?;
        let account = self
            .children
            .get_mut(child)
            .ok_or_else(|| LedgerError::child_not_found(child))?;
        account.game_time_minutes -= minutes;
        self.journal.push(JournalEntry {
            at: now,
            child: child.clone(),
            task: None,
            minutes: -i64::from(minutes),
            kind: EntryKind::Usage,
        });
        debug!(child_id=%child, minutes, remaining = account.game_time_minutes, "game time used");
        Ok(account.clone())
    }
}

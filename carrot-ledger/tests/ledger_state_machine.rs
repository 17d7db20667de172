use carrot_ledger::ledger::{
    Action, ChildSettings, Ledger, LedgerError, LedgerSettings, NewChild, NewTask, Period, Reward,
    StreakRule, TaskFilter,
};
use carrot_shared::api::{BonusOutcome, ReportPeriod};
use carrot_shared::domain::{ChildId, EntryKind, TaskId, TaskStatus};
use chrono::{DateTime, Duration, Utc};

// A Monday morning
fn t0() -> DateTime<Utc> {
    "2024-05-06T08:00:00Z".parse().unwrap()
}

fn alex() -> ChildId {
    ChildId::from("alex")
}

fn ledger_with(settings: LedgerSettings) -> Ledger {
    let mut ledger = Ledger::new(settings);
    ledger
        .add_child(
            NewChild {
                display_name: "Alex".into(),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    ledger
}

fn ledger() -> Ledger {
    ledger_with(LedgerSettings::default())
}

fn timed(ledger: &mut Ledger, title: &str) -> TaskId {
    ledger
        .create_task(
            NewTask {
                owner: alex(),
                title: title.into(),
                description: None,
                reward: Reward::TimeTracked,
            },
            t0(),
        )
        .unwrap()
        .id
}

fn credit(ledger: &mut Ledger, minutes: Option<u32>) -> TaskId {
    ledger
        .create_task(
            NewTask {
                owner: alex(),
                title: "Feed the cat".into(),
                description: None,
                reward: Reward::FixedCredit(minutes),
            },
            t0(),
        )
        .unwrap()
        .id
}

fn approve_credit_task(ledger: &mut Ledger, minutes: u32, at: DateTime<Utc>) -> TaskId {
    let id = credit(ledger, Some(minutes));
    ledger.complete_credit_task(&id, at).unwrap();
    ledger.approve(&id, at).unwrap();
    id
}

fn balance(ledger: &Ledger) -> u32 {
    ledger.child(&alex()).unwrap().game_time_minutes
}

#[test]
fn timed_task_runs_to_approval() {
    let mut ledger = ledger();
    let id = timed(&mut ledger, "Homework");
    assert_eq!(id, TaskId::from("task-1"));

    let task = ledger.start_timer(&id, t0()).unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.elapsed_seconds(), Some(0));

    assert_eq!(ledger.tick(&id, t0() + Duration::seconds(30)).unwrap(), 30);
    assert_eq!(ledger.tick(&id, t0() + Duration::seconds(90)).unwrap(), 90);

    let done_at = t0() + Duration::seconds(125);
    let completion = ledger.complete_timed_task(&id, 125, done_at).unwrap();
    assert!(completion.approval.is_none());
    assert_eq!(completion.task.status, TaskStatus::Completed);
    assert_eq!(completion.task.elapsed_seconds(), Some(125));
    assert_eq!(completion.task.completed_at, Some(done_at));
    assert_eq!(balance(&ledger), 0);

    let approval = ledger.approve(&id, done_at).unwrap();
    // floor(125 / 60) minutes
    assert_eq!(approval.minutes_earned, 2);
    assert_eq!(approval.game_time_minutes, 2);
    assert_eq!(approval.streak_count, 1);
    assert!(approval.bonus.is_none());

    let task = ledger.task(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Approved);
    assert_eq!(task.minutes_earned, Some(2));
    assert_eq!(task.decided_at, Some(done_at));

    let entries: Vec<_> = ledger.journal().iter().map(|e| (e.kind, e.minutes)).collect();
    assert_eq!(entries, vec![(EntryKind::TaskReward, 2)]);
}

#[test]
fn fifteen_and_a_half_minutes_earn_fifteen() {
    let mut ledger = ledger();
    let id = timed(&mut ledger, "Read a chapter");
    ledger.start_timer(&id, t0()).unwrap();
    let done_at = t0() + Duration::seconds(930);
    assert_eq!(ledger.tick(&id, done_at).unwrap(), 930);
    ledger.complete_timed_task(&id, 930, done_at).unwrap();

    let approval = ledger.approve(&id, done_at).unwrap();
    assert_eq!(approval.minutes_earned, 15);
    assert_eq!(balance(&ledger), 15);
}

#[test]
fn tick_counts_only_whole_seconds() {
    let mut ledger = ledger();
    let id = timed(&mut ledger, "Practice piano");
    ledger.start_timer(&id, t0()).unwrap();

    assert_eq!(ledger.tick(&id, t0() + Duration::milliseconds(1500)).unwrap(), 1);
    // the leftover half second is carried into the next tick
    assert_eq!(ledger.tick(&id, t0() + Duration::milliseconds(2200)).unwrap(), 2);
    assert_eq!(ledger.tick(&id, t0() + Duration::milliseconds(2400)).unwrap(), 2);
    // a clock that went backwards never lowers the counter
    assert_eq!(ledger.tick(&id, t0()).unwrap(), 2);
}

#[test]
fn fixed_credit_task_uses_default_and_rejects_zero() {
    let mut ledger = ledger();
    let id = credit(&mut ledger, None);
    assert_eq!(ledger.task(&id).unwrap().credit_minutes(), Some(10));

    let err = ledger
        .create_task(
            NewTask {
                owner: alex(),
                title: "Nothing".into(),
                description: None,
                reward: Reward::FixedCredit(Some(0)),
            },
            t0(),
        )
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));

    ledger.complete_credit_task(&id, t0()).unwrap();
    let approval = ledger.approve(&id, t0()).unwrap();
    assert_eq!(approval.minutes_earned, 10);
    assert_eq!(balance(&ledger), 10);
}

#[test]
fn time_ratio_scales_tracked_minutes() {
    let mut ledger = ledger_with(LedgerSettings {
        time_ratio: 2,
        ..Default::default()
    });
    let id = timed(&mut ledger, "Read");
    ledger.start_timer(&id, t0()).unwrap();
    ledger.complete_timed_task(&id, 600, t0()).unwrap();
    assert_eq!(ledger.approve(&id, t0()).unwrap().minutes_earned, 20);
}

#[test]
fn invalid_transitions_leave_state_untouched() {
    let mut ledger = ledger();
    let timed_id = timed(&mut ledger, "Homework");
    let credit_id = credit(&mut ledger, Some(5));
    let before = ledger.to_snapshot(t0());

    let err = ledger.start_timer(&credit_id, t0()).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidTransition {
            action: Action::Start,
            from: TaskStatus::Pending,
            ..
        }
    ));
    assert!(ledger.complete_credit_task(&timed_id, t0()).is_err());
    assert!(ledger.complete_timed_task(&timed_id, 60, t0()).is_err());
    assert!(matches!(
        ledger.pause_timer(&timed_id, t0()),
        Err(LedgerError::InvalidTransition {
            action: Action::Pause,
            from: TaskStatus::Pending,
            ..
        })
    ));
    assert!(ledger.tick(&timed_id, t0()).is_err());
    assert!(ledger.approve(&credit_id, t0()).is_err());
    assert!(ledger.reject(&credit_id, t0()).is_err());
    assert!(matches!(
        ledger.approve(&TaskId::from("task-99"), t0()),
        Err(LedgerError::NotFound(_))
    ));

    assert_eq!(ledger.to_snapshot(t0()), before);
}

#[test]
fn terminal_states_do_not_move() {
    let mut ledger = ledger();
    let approved = approve_credit_task(&mut ledger, 5, t0());
    let rejected = credit(&mut ledger, Some(5));
    ledger.complete_credit_task(&rejected, t0()).unwrap();
    ledger.reject(&rejected, t0()).unwrap();
    let before = ledger.to_snapshot(t0());

    for id in [&approved, &rejected] {
        assert!(ledger.approve(id, t0()).is_err());
        assert!(ledger.reject(id, t0()).is_err());
        assert!(ledger.complete_credit_task(id, t0()).is_err());
    }
    assert_eq!(ledger.to_snapshot(t0()), before);
    assert_eq!(balance(&ledger), 5);
}

#[test]
fn reject_credits_nothing_and_keeps_streak() {
    let mut ledger = ledger();
    approve_credit_task(&mut ledger, 5, t0());
    let id = credit(&mut ledger, Some(20));
    ledger.complete_credit_task(&id, t0()).unwrap();
    let task = ledger.reject(&id, t0()).unwrap();
    assert_eq!(task.status, TaskStatus::Rejected);
    assert_eq!(task.minutes_earned, None);

    let child = ledger.child(&alex()).unwrap();
    assert_eq!(child.game_time_minutes, 5);
    assert_eq!(child.streak_count, 1);
}

#[test]
fn pause_resets_elapsed_by_default() {
    let mut ledger = ledger();
    let id = timed(&mut ledger, "Homework");
    ledger.start_timer(&id, t0()).unwrap();
    ledger.tick(&id, t0() + Duration::seconds(40)).unwrap();

    let paused = ledger.pause_timer(&id, t0() + Duration::seconds(45)).unwrap();
    assert_eq!(paused.status, TaskStatus::Pending);
    assert_eq!(paused.elapsed_seconds(), Some(0));

    ledger.start_timer(&id, t0() + Duration::seconds(100)).unwrap();
    assert_eq!(ledger.tick(&id, t0() + Duration::seconds(110)).unwrap(), 10);
}

#[test]
fn pause_can_keep_elapsed() {
    let mut ledger = ledger_with(LedgerSettings {
        keep_elapsed_on_pause: true,
        ..Default::default()
    });
    let id = timed(&mut ledger, "Homework");
    ledger.start_timer(&id, t0()).unwrap();
    ledger.tick(&id, t0() + Duration::seconds(40)).unwrap();

    // the pause itself counts the last five seconds
    let paused = ledger.pause_timer(&id, t0() + Duration::seconds(45)).unwrap();
    assert_eq!(paused.elapsed_seconds(), Some(45));

    // time spent paused is not counted
    ledger.start_timer(&id, t0() + Duration::seconds(300)).unwrap();
    assert_eq!(ledger.tick(&id, t0() + Duration::seconds(310)).unwrap(), 55);
}

#[test]
fn every_third_approval_earns_a_bonus() {
    let mut ledger = ledger();
    approve_credit_task(&mut ledger, 10, t0());
    approve_credit_task(&mut ledger, 10, t0());

    let id = credit(&mut ledger, Some(10));
    ledger.complete_credit_task(&id, t0()).unwrap();
    let approval = ledger.approve(&id, t0()).unwrap();
    assert_eq!(approval.streak_count, 3);
    assert_eq!(approval.bonus, Some(BonusOutcome::Credited { minutes: 5 }));
    assert_eq!(approval.game_time_minutes, 35);

    for _ in 0..3 {
        approve_credit_task(&mut ledger, 10, t0());
    }
    let child = ledger.child(&alex()).unwrap();
    assert_eq!(child.streak_count, 6);
    assert_eq!(child.longest_streak, 6);
    assert_eq!(child.game_time_minutes, 70);

    let bonuses = ledger
        .journal()
        .iter()
        .filter(|e| e.kind == EntryKind::StreakBonus)
        .count();
    assert_eq!(bonuses, 2);

    let child = ledger.reset_streak(&alex()).unwrap();
    assert_eq!(child.streak_count, 0);
    assert_eq!(child.longest_streak, 6);
}

#[test]
fn streak_rule_is_configurable() {
    let mut ledger = ledger_with(LedgerSettings {
        streak: StreakRule {
            every: 2,
            bonus_minutes: 7,
            bonus_delay: Duration::zero(),
        },
        ..Default::default()
    });
    approve_credit_task(&mut ledger, 1, t0());
    approve_credit_task(&mut ledger, 1, t0());
    assert_eq!(balance(&ledger), 9);
}

fn delayed_bonus_settings() -> LedgerSettings {
    LedgerSettings {
        streak: StreakRule {
            bonus_delay: Duration::milliseconds(3500),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn delayed_bonus_is_credited_once_when_due() {
    let mut ledger = ledger_with(delayed_bonus_settings());
    approve_credit_task(&mut ledger, 10, t0());
    approve_credit_task(&mut ledger, 10, t0());
    let id = credit(&mut ledger, Some(10));
    ledger.complete_credit_task(&id, t0()).unwrap();
    let approval = ledger.approve(&id, t0()).unwrap();

    let due_at = t0() + Duration::milliseconds(3500);
    assert_eq!(
        approval.bonus,
        Some(BonusOutcome::Scheduled { minutes: 5, due_at })
    );
    assert_eq!(balance(&ledger), 30);
    assert_eq!(ledger.pending_bonuses().len(), 1);

    assert!(ledger.settle_due_bonuses(t0() + Duration::seconds(3)).is_empty());
    assert_eq!(balance(&ledger), 30);

    let credited = ledger.settle_due_bonuses(due_at);
    assert_eq!(credited.len(), 1);
    assert_eq!(credited[0].task_id, id);
    assert_eq!(credited[0].game_time_minutes, 35);
    assert!(ledger.pending_bonuses().is_empty());

    assert!(ledger.settle_due_bonuses(due_at + Duration::hours(1)).is_empty());
    assert!(ledger.settle_bonus(&id, due_at).is_none());
    assert_eq!(balance(&ledger), 35);
}

fn unreachable_bonus_settings(require_approval: bool) -> LedgerSettings {
    LedgerSettings {
        require_approval,
        streak: StreakRule {
            // lands past the last representable instant
            bonus_delay: Duration::days(1_000_000_000),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[test]
fn approval_with_unrepresentable_bonus_time_changes_nothing() {
    let mut ledger = ledger_with(unreachable_bonus_settings(true));
    approve_credit_task(&mut ledger, 10, t0());
    approve_credit_task(&mut ledger, 10, t0());
    let id = credit(&mut ledger, Some(10));
    ledger.complete_credit_task(&id, t0()).unwrap();
    let before = ledger.to_snapshot(t0());

    assert!(matches!(
        ledger.approve(&id, t0()),
        Err(LedgerError::InvalidInput(_))
    ));
    assert_eq!(ledger.to_snapshot(t0()), before);
    assert_eq!(ledger.task(&id).unwrap().status, TaskStatus::Completed);
    assert_eq!(balance(&ledger), 20);
    assert_eq!(ledger.child(&alex()).unwrap().streak_count, 2);
    assert!(ledger.pending_bonuses().is_empty());
}

#[test]
fn failed_auto_approval_leaves_task_pending() {
    let mut ledger = ledger_with(unreachable_bonus_settings(false));
    for _ in 0..2 {
        let id = credit(&mut ledger, Some(10));
        ledger.complete_credit_task(&id, t0()).unwrap();
    }
    let id = credit(&mut ledger, Some(10));
    let before = ledger.to_snapshot(t0());

    assert!(ledger.complete_credit_task(&id, t0()).is_err());
    assert_eq!(ledger.to_snapshot(t0()), before);
    assert_eq!(ledger.task(&id).unwrap().status, TaskStatus::Pending);
    assert_eq!(ledger.task(&id).unwrap().completed_at, None);
}

#[test]
fn cancelled_bonus_is_never_credited() {
    let mut ledger = ledger_with(delayed_bonus_settings());
    let mut last = None;
    for _ in 0..3 {
        last = Some(approve_credit_task(&mut ledger, 10, t0()));
    }
    let last = last.unwrap();

    let cancelled = ledger.cancel_bonus(&last).unwrap();
    assert_eq!(cancelled.minutes, 5);
    assert!(ledger.cancel_bonus(&last).is_none());
    assert!(ledger.settle_due_bonuses(t0() + Duration::days(1)).is_empty());
    assert_eq!(balance(&ledger), 30);
    // the streak itself still counts
    assert_eq!(ledger.child(&alex()).unwrap().streak_count, 3);
}

#[test]
fn auto_approval_happens_on_completion() {
    let mut ledger = ledger_with(LedgerSettings {
        require_approval: false,
        ..Default::default()
    });
    let id = credit(&mut ledger, Some(15));
    let completion = ledger.complete_credit_task(&id, t0()).unwrap();
    let approval = completion.approval.unwrap();
    assert_eq!(approval.minutes_earned, 15);
    assert_eq!(completion.task.status, TaskStatus::Approved);
    assert_eq!(ledger.task(&id).unwrap().status, TaskStatus::Approved);
    assert_eq!(balance(&ledger), 15);
    assert_eq!(ledger.pending_approval_count(None), 0);
}

#[test]
fn adjustment_is_clamped_at_zero() {
    let mut ledger = ledger();
    ledger.adjust_game_time(&alex(), 10, t0()).unwrap();
    let child = ledger.adjust_game_time(&alex(), -25, t0()).unwrap();
    assert_eq!(child.game_time_minutes, 0);

    let applied: Vec<i64> = ledger.journal().iter().map(|e| e.minutes).collect();
    assert_eq!(applied, vec![10, -10]);

    // nothing to take away: no journal entry
    ledger.adjust_game_time(&alex(), -5, t0()).unwrap();
    assert_eq!(ledger.journal().len(), 2);
    assert!(matches!(
        ledger.adjust_game_time(&ChildId::from("nobody"), 5, t0()),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn spending_respects_lock_limit_and_balance() {
    let mut ledger = ledger();
    ledger.adjust_game_time(&alex(), 100, t0()).unwrap();
    ledger
        .update_child_settings(
            &alex(),
            ChildSettings {
                daily_limit_minutes: Some(30),
                is_locked: Some(true),
            },
        )
        .unwrap();

    assert!(matches!(
        ledger.spend_game_time(&alex(), 5, t0()),
        Err(LedgerError::GameTimeLocked(_))
    ));
    ledger
        .update_child_settings(
            &alex(),
            ChildSettings {
                is_locked: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    ledger.spend_game_time(&alex(), 20, t0()).unwrap();
    assert_eq!(ledger.used_today(&alex(), t0()), 20);
    match ledger.check_spend(&alex(), 15, t0()) {
        Err(LedgerError::DailyLimitExceeded {
            limit,
            used,
            requested,
            ..
        }) => assert_eq!((limit, used, requested), (30, 20, 15)),
        other => panic!("unexpected: {other:?}"),
    }
    ledger.spend_game_time(&alex(), 10, t0()).unwrap();

    // a new day starts with a fresh allowance
    let tomorrow = t0() + Duration::days(1);
    assert_eq!(ledger.used_today(&alex(), tomorrow), 0);
    ledger.spend_game_time(&alex(), 30, tomorrow).unwrap();
    assert_eq!(balance(&ledger), 40);

    ledger
        .update_child_settings(
            &alex(),
            ChildSettings {
                daily_limit_minutes: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(matches!(
        ledger.spend_game_time(&alex(), 41, tomorrow),
        Err(LedgerError::InsufficientBalance {
            available: 40,
            requested: 41,
            ..
        })
    ));
    assert!(matches!(
        ledger.spend_game_time(&alex(), 0, tomorrow),
        Err(LedgerError::InvalidAmount(_))
    ));
    ledger.spend_game_time(&alex(), 40, tomorrow).unwrap();
    assert_eq!(balance(&ledger), 0);
}

#[test]
fn daily_limit_follows_local_midnight() {
    let mut ledger = ledger_with(LedgerSettings {
        timezone: chrono_tz::Europe::Warsaw,
        ..Default::default()
    });
    ledger.adjust_game_time(&alex(), 100, t0()).unwrap();
    ledger
        .update_child_settings(
            &alex(),
            ChildSettings {
                daily_limit_minutes: Some(30),
                ..Default::default()
            },
        )
        .unwrap();

    // 21:30 UTC is 23:30 in Warsaw, 22:30 UTC is already the next local day
    let late: DateTime<Utc> = "2024-05-06T21:30:00Z".parse().unwrap();
    let after_midnight: DateTime<Utc> = "2024-05-06T22:30:00Z".parse().unwrap();
    ledger.spend_game_time(&alex(), 30, late).unwrap();
    assert!(ledger.check_spend(&alex(), 1, late).is_err());
    assert!(ledger.check_spend(&alex(), 30, after_midnight).is_ok());
}

#[test]
fn children_get_unique_slug_ids() {
    let mut ledger = ledger();
    let second = ledger
        .add_child(
            NewChild {
                display_name: "Alex".into(),
                age: Some(7),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    assert_eq!(second.id, ChildId::from("alex-2"));
    assert_eq!(second.daily_limit_minutes, 60);
    assert_eq!(second.game_time_minutes, 0);

    let named = ledger
        .add_child(
            NewChild {
                display_name: "Zoë Marie".into(),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    assert_eq!(named.id, ChildId::from("zoe-marie"));

    assert!(matches!(
        ledger.add_child(
            NewChild {
                display_name: "   ".into(),
                ..Default::default()
            },
            t0()
        ),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        ledger.add_child(
            NewChild {
                id: Some(alex()),
                display_name: "Another".into(),
                ..Default::default()
            },
            t0()
        ),
        Err(LedgerError::InvalidInput(_))
    ));

    let names: Vec<_> = ledger.children().iter().map(|c| c.id.0.clone()).collect();
    assert_eq!(names, vec!["alex", "alex-2", "zoe-marie"]);
}

#[test]
fn upsert_keeps_balance_and_streak() {
    let mut ledger = ledger();
    approve_credit_task(&mut ledger, 10, t0());
    let child = ledger
        .upsert_child(
            NewChild {
                id: Some(alex()),
                display_name: "Alexander".into(),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    assert_eq!(child.display_name, "Alexander");
    assert_eq!(child.game_time_minutes, 10);
    assert_eq!(child.streak_count, 1);
}

#[test]
fn tasks_need_an_owner_and_a_title() {
    let mut ledger = ledger();
    let missing_owner = NewTask {
        owner: ChildId::from("ghost"),
        title: "Dishes".into(),
        description: None,
        reward: Reward::TimeTracked,
    };
    assert!(matches!(
        ledger.create_task(missing_owner, t0()),
        Err(LedgerError::NotFound(_))
    ));
    let untitled = NewTask {
        owner: alex(),
        title: " ".into(),
        description: None,
        reward: Reward::TimeTracked,
    };
    assert!(matches!(
        ledger.create_task(untitled, t0()),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(ledger.tasks().is_empty());
}

#[test]
fn snapshot_restores_everything() {
    let mut ledger = ledger_with(delayed_bonus_settings());
    let running = timed(&mut ledger, "Homework");
    ledger.start_timer(&running, t0()).unwrap();
    for _ in 0..3 {
        approve_credit_task(&mut ledger, 10, t0());
    }
    let snapshot = ledger.to_snapshot(t0());
    assert_eq!(snapshot.pending_bonuses.len(), 1);

    let mut restored = Ledger::from_snapshot(delayed_bonus_settings(), snapshot.clone()).unwrap();
    assert_eq!(restored.to_snapshot(t0()), snapshot);
    assert_eq!(
        restored.tick(&running, t0() + Duration::seconds(5)).unwrap(),
        5
    );
    let next = credit(&mut restored, Some(1));
    assert_eq!(next, TaskId::from("task-5"));
}

#[test]
fn snapshot_with_unknown_owner_is_refused() {
    let mut ledger = ledger();
    credit(&mut ledger, Some(5));
    let mut snapshot = ledger.to_snapshot(t0());
    snapshot.children.clear();
    assert!(matches!(
        Ledger::from_snapshot(LedgerSettings::default(), snapshot),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn task_ids_never_repeat_after_restore() {
    let mut ledger = ledger();
    credit(&mut ledger, Some(5));
    credit(&mut ledger, Some(5));
    let mut snapshot = ledger.to_snapshot(t0());
    snapshot.next_task_seq = 1;
    let mut restored = Ledger::from_snapshot(LedgerSettings::default(), snapshot).unwrap();
    assert_eq!(credit(&mut restored, Some(5)), TaskId::from("task-3"));
}

#[test]
fn task_filters_and_reports() {
    let mut ledger = ledger();
    let yesterday = t0() - Duration::days(1);
    let old = ledger
        .create_task(
            NewTask {
                owner: alex(),
                title: "Sunday chores".into(),
                description: None,
                reward: Reward::FixedCredit(Some(10)),
            },
            yesterday,
        )
        .unwrap()
        .id;
    let today = approve_credit_task(&mut ledger, 20, t0());
    let waiting = credit(&mut ledger, Some(5));
    ledger.complete_credit_task(&waiting, t0()).unwrap();
    ledger.spend_game_time(&alex(), 15, t0()).unwrap();

    let ids = |filter: TaskFilter| -> Vec<TaskId> {
        ledger
            .tasks_matching(&filter, t0())
            .into_iter()
            .map(|t| t.id.clone())
            .collect()
    };
    assert_eq!(
        ids(TaskFilter {
            period: Some(Period::Yesterday),
            ..Default::default()
        }),
        vec![old.clone()]
    );
    assert_eq!(
        ids(TaskFilter {
            period: Some(Period::Today),
            ..Default::default()
        }),
        vec![today.clone(), waiting.clone()]
    );
    // Sunday belongs to the previous week
    assert_eq!(
        ids(TaskFilter {
            period: Some(Period::ThisWeek),
            ..Default::default()
        }),
        vec![today.clone(), waiting.clone()]
    );
    assert_eq!(
        ids(TaskFilter {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        }),
        vec![waiting.clone()]
    );
    assert_eq!(
        ids(TaskFilter {
            open: true,
            ..Default::default()
        }),
        vec![old.clone(), waiting.clone()]
    );
    assert_eq!(ledger.pending_approval_count(Some(&alex())), 1);

    let report = ledger.report(&alex(), ReportPeriod::Daily, t0()).unwrap();
    assert_eq!(report.tasks_completed, 2);
    assert_eq!(report.time_earned, 20);
    assert_eq!(report.time_used, 15);
    assert_eq!(report.awaiting_approval, 1);

    let next_week = t0() + Duration::days(7);
    let report = ledger.report(&alex(), ReportPeriod::Weekly, next_week).unwrap();
    assert_eq!(report.tasks_completed, 0);
    assert_eq!(report.time_earned, 0);
}

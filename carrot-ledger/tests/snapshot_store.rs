use std::sync::Arc;

use carrot_ledger::clock::ManualClock;
use carrot_ledger::ledger::{LedgerError, LedgerSettings, NewChild, NewTask, Reward, StreakRule};
use carrot_ledger::service::{Service, ServiceError, ServiceOptions};
use carrot_ledger::storage::{StorageError, Store};
use carrot_shared::auth::Actor;
use carrot_shared::domain::{ChildId, TaskStatus};
use carrot_shared::snapshot::{Snapshot, SnapshotError};
use chrono::{DateTime, Duration, Utc};
use diesel::sqlite::SqliteConnection;
use diesel::{Connection, RunQueryDsl};

fn t0() -> DateTime<Utc> {
    "2024-05-06T08:00:00Z".parse().unwrap()
}

async fn open_store(dir: &tempfile::TempDir) -> Store {
    let path = dir.path().join("carrot.db");
    Store::connect_sqlite(path.to_str().unwrap()).await.unwrap()
}

fn options(settings: LedgerSettings) -> ServiceOptions {
    ServiceOptions {
        settings,
        seed_children: vec![NewChild {
            id: Some(ChildId::from("alex")),
            display_name: "Alex".into(),
            ..Default::default()
        }],
        snapshot_history: 0,
    }
}

#[tokio::test]
async fn fresh_store_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    assert!(store.load_latest().await.unwrap().is_none());
    assert!(store.list_snapshots().await.unwrap().is_empty());
}

#[tokio::test]
async fn latest_snapshot_wins_and_prune_keeps_newest() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let mut ids = Vec::new();
    for seq in 1..=4u64 {
        let mut snap = Snapshot::empty(t0() + Duration::minutes(seq as i64));
        snap.next_task_seq = seq;
        ids.push(store.save_snapshot(&snap).await.unwrap());
    }
    let latest = store.load_latest().await.unwrap().unwrap();
    assert_eq!(latest.next_task_seq, 4);

    let removed = store.prune_snapshots(2).await.unwrap();
    assert_eq!(removed, 2);
    let left: Vec<i32> = store
        .list_snapshots()
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(left, vec![ids[3], ids[2]]);
    assert_eq!(store.prune_snapshots(0).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_version_is_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let mut snap = Snapshot::empty(t0());
    snap.version = 99;
    store.save_snapshot(&snap).await.unwrap();

    match store.load_latest().await {
        Err(StorageError::Snapshot(SnapshotError::UnsupportedVersion { found, .. })) => {
            assert_eq!(found, 99)
        }
        other => panic!("unexpected: {other:?}"),
    }
    // and the service refuses to start on top of it
    let clock = ManualClock::new(t0());
    let opened = Service::open(
        options(LedgerSettings::default()),
        Some(store),
        Arc::new(clock),
    )
    .await;
    assert!(matches!(opened, Err(ServiceError::Storage(_))));
}

#[tokio::test(start_paused = true)]
async fn running_timer_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(t0());
    let parent = Actor::parent();

    let service = Service::open(
        options(LedgerSettings::default()),
        Some(open_store(&dir).await),
        Arc::new(clock.clone()),
    )
    .await
    .unwrap();
    let id = service
        .create_task(
            &parent,
            NewTask {
                owner: ChildId::from("alex"),
                title: "Homework".into(),
                description: Some("Maths, page 12".into()),
                reward: Reward::TimeTracked,
            },
        )
        .await
        .unwrap()
        .id;
    service.start_timer(&parent, &id).await.unwrap();
    service.shutdown().await.unwrap();
    drop(service);

    clock.advance(Duration::minutes(20));
    let service = Service::open(
        options(LedgerSettings::default()),
        Some(open_store(&dir).await),
        Arc::new(clock.clone()),
    )
    .await
    .unwrap();
    let task = service.task(&parent, &id).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.description.as_deref(), Some("Maths, page 12"));

    let completion = service.stop_timer(&parent, &id).await.unwrap();
    assert_eq!(completion.task.elapsed_seconds(), Some(1200));
    service.approve(&parent, &id).await.unwrap();
    service.shutdown().await.unwrap();
    drop(service);

    let service = Service::open(
        options(LedgerSettings::default()),
        Some(open_store(&dir).await),
        Arc::new(clock),
    )
    .await
    .unwrap();
    let alex = service.child(&parent, &ChildId::from("alex")).await.unwrap();
    assert_eq!(alex.game_time_minutes, 20);
    assert_eq!(alex.streak_count, 1);
    service.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn overdue_bonus_is_credited_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(t0());
    let parent = Actor::parent();
    let settings = || LedgerSettings {
        streak: StreakRule {
            bonus_delay: Duration::seconds(30),
            ..Default::default()
        },
        ..Default::default()
    };

    // a store written by a process that died before the bonus fired
    let store = open_store(&dir).await;
    let service = Service::open(options(settings()), Some(store.clone()), Arc::new(clock.clone()))
        .await
        .unwrap();
    for _ in 0..3 {
        let id = service
            .create_task(
                &parent,
                NewTask {
                    owner: ChildId::from("alex"),
                    title: "Dishes".into(),
                    description: None,
                    reward: Reward::FixedCredit(Some(10)),
                },
            )
            .await
            .unwrap()
            .id;
        service.complete_credit_task(&parent, &id).await.unwrap();
        service.approve(&parent, &id).await.unwrap();
    }
    let saved = store.load_latest().await.unwrap().unwrap();
    assert_eq!(saved.pending_bonuses.len(), 1);
    drop(service);

    clock.advance(Duration::minutes(5));
    let service = Service::open(options(settings()), Some(store), Arc::new(clock))
        .await
        .unwrap();
    let alex = service.child(&parent, &ChildId::from("alex")).await.unwrap();
    assert_eq!(alex.game_time_minutes, 35);
    assert!(service.pending_bonuses(&parent).await.unwrap().is_empty());
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_save_keeps_the_applied_change() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(t0());
    let parent = Actor::parent();
    let store = open_store(&dir).await;
    let service = Service::open(
        options(LedgerSettings::default()),
        Some(store.clone()),
        Arc::new(clock),
    )
    .await
    .unwrap();
    let id = service
        .create_task(
            &parent,
            NewTask {
                owner: ChildId::from("alex"),
                title: "Walk the dog".into(),
                description: None,
                reward: Reward::FixedCredit(Some(10)),
            },
        )
        .await
        .unwrap()
        .id;
    service.complete_credit_task(&parent, &id).await.unwrap();

    // pull the table out from under the store so every save fails
    let path = dir.path().join("carrot.db");
    let mut conn = SqliteConnection::establish(path.to_str().unwrap()).unwrap();
    diesel::sql_query("DROP TABLE snapshots")
        .execute(&mut conn)
        .unwrap();
    assert!(store.load_latest().await.is_err());

    let approval = service.approve(&parent, &id).await.unwrap();
    assert_eq!(approval.minutes_earned, 10);
    let alex = service.child(&parent, &ChildId::from("alex")).await.unwrap();
    assert_eq!(alex.game_time_minutes, 10);
    assert_eq!(alex.streak_count, 1);

    assert!(matches!(
        service.approve(&parent, &id).await,
        Err(ServiceError::Ledger(LedgerError::InvalidTransition { .. }))
    ));
    let alex = service.child(&parent, &ChildId::from("alex")).await.unwrap();
    assert_eq!(alex.game_time_minutes, 10);
    service.shutdown().await.unwrap();
}

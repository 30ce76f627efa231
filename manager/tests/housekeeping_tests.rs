//! Retention pruning of history rows, session logs and system logs

mod common;

use chrono::Utc;
use serial_test::serial;
use std::path::Path;
use tempfile::TempDir;

use common::fixtures::*;
use upgrade_manager::database::{InstallAction, JobStatus, SystemOption};
use upgrade_manager::scheduler::{Housekeeper, HousekeepingScheduler};

/// Runs a job through processing and archiving with a session log on disk
async fn archived_job(
    store: &TestDatabase,
    root: &Path,
    host_id: i64,
    name: &str,
    status: JobStatus,
) -> String {
    let db = store.db();
    let id = store
        .schedule(host_id, InstallAction::PreUpgrade, &[], None, None)
        .await
        .unwrap();
    let relative = format!("{}/{}", hosts::PE1, name);
    std::fs::create_dir_all(root.join(&relative)).unwrap();
    std::fs::write(root.join(&relative).join("session.log"), "STATUS: completed\n").unwrap();

    db.mark_install_job_processing(id, Utc::now(), &relative)
        .await
        .unwrap();
    db.archive_install_job(id, status, -1, None).await.unwrap();
    relative
}

async fn keep_install_history(store: &TestDatabase, per_host: i64) {
    let db = store.db();
    let options = SystemOption {
        install_history_per_host: per_host,
        ..db.get_system_option().await.unwrap()
    };
    db.update_system_option(&options).await.unwrap();
}

#[tokio::test]
async fn pruned_history_takes_its_session_logs_along() {
    let store = TestDatabase::new().await.unwrap();
    let root = TempDir::new().unwrap();
    let host = store.add_host(hosts::PE1, "ASR9K", "10.0.0.1").await.unwrap();
    keep_install_history(&store, 2).await;

    let oldest = archived_job(&store, root.path(), host, "a", JobStatus::Completed).await;
    let middle = archived_job(&store, root.path(), host, "b", JobStatus::Completed).await;
    let newest = archived_job(&store, root.path(), host, "c", JobStatus::Completed).await;

    let report = Housekeeper::new(store.db(), root.path().to_path_buf())
        .run()
        .await
        .unwrap();

    assert_eq!(report.install_history_deleted, 1);
    assert_eq!(report.session_logs, vec![oldest.clone()]);
    assert!(!root.path().join(&oldest).exists());
    assert!(root.path().join(&middle).exists());
    assert!(root.path().join(&newest).exists());

    let history = store.db().list_install_history(Some(host), 10).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn logs_of_failed_jobs_still_listed_are_kept() {
    let store = TestDatabase::new().await.unwrap();
    let root = TempDir::new().unwrap();
    let host = store.add_host(hosts::PE1, "ASR9K", "10.0.0.1").await.unwrap();
    keep_install_history(&store, 1).await;

    let failed = archived_job(&store, root.path(), host, "failed", JobStatus::Failed).await;
    archived_job(&store, root.path(), host, "ok", JobStatus::Completed).await;

    let report = Housekeeper::new(store.db(), root.path().to_path_buf())
        .run()
        .await
        .unwrap();

    assert_eq!(report.install_history_deleted, 1);
    assert!(report.session_logs.is_empty());
    assert!(root.path().join(&failed).exists());
}

#[tokio::test]
async fn system_log_is_trimmed_only_past_the_slack() {
    let store = TestDatabase::new().await.unwrap();
    let db = store.db();
    let options = SystemOption {
        total_system_logs: 10,
        ..db.get_system_option().await.unwrap()
    };
    db.update_system_option(&options).await.unwrap();

    for i in 0..11 {
        db.add_system_log("INFO", &format!("entry {}", i), None)
            .await
            .unwrap();
    }
    assert_eq!(db.trim_system_logs(10).await.unwrap(), 0);

    db.add_system_log("INFO", "entry 11", None).await.unwrap();
    let root = TempDir::new().unwrap();
    let report = Housekeeper::new(db.clone(), root.path().to_path_buf())
        .run()
        .await
        .unwrap();
    assert_eq!(report.system_logs_deleted, 2);

    let remaining = db.list_system_logs(100).await.unwrap();
    assert_eq!(remaining.len(), 10);
    assert_eq!(remaining[0].msg, "entry 11");
    assert_eq!(remaining[9].msg, "entry 2");
}

#[tokio::test]
#[serial]
async fn scheduler_rejects_five_field_cron() {
    let store = TestDatabase::new().await.unwrap();
    let root = TempDir::new().unwrap();
    let scheduler =
        HousekeepingScheduler::new(Housekeeper::new(store.db(), root.path().to_path_buf()))
            .await
            .unwrap();

    let err = scheduler.start("30 0 * * *").await.unwrap_err();
    assert!(err.to_string().contains("6 fields"));
}

#[tokio::test]
#[serial]
async fn scheduler_accepts_the_daily_schedule() {
    let store = TestDatabase::new().await.unwrap();
    let root = TempDir::new().unwrap();
    let scheduler =
        HousekeepingScheduler::new(Housekeeper::new(store.db(), root.path().to_path_buf()))
            .await
            .unwrap();

    tokio_test::assert_ok!(
        scheduler
            .start(upgrade_manager::constants::scheduling::HOUSEKEEPING_SCHEDULE)
            .await
    );
}

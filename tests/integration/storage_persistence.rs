//! Integration tests for snapshot persistence across restarts

use std::path::PathBuf;

use fleetmon::config::{Config, StorageConfig};
use fleetmon::model::{MethodKind, Status};
use fleetmon::registry::{TargetFilter, TargetSpec};
use fleetmon::storage::{JsonFileStore, SnapshotStore};

use crate::helpers::*;

fn config_with(storage: StorageConfig) -> Config {
    Config {
        storage,
        ..idle_config()
    }
}

async fn populate_and_stop(config: Config) {
    let checker = ScriptedChecker::new(MethodKind::Icmp, &[true, false]);
    let monitor = start_monitor(config, vec![checker]).await;

    let target = monitor
        .create_target(TargetSpec::new("edge-1", "192.0.2.10", MethodKind::Icmp))
        .await
        .unwrap();
    let agent = monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();

    monitor.check_now(MethodKind::Icmp).await.unwrap();
    monitor.check_now(MethodKind::Icmp).await.unwrap();
    monitor
        .ingest_report(agent.method.secret(), agent_report(20.0, 30.0))
        .await
        .unwrap();

    assert_eq!(monitor.history(target.id, 10).await.unwrap().len(), 2);
    monitor.shutdown().await.unwrap();
}

async fn assert_restored(config: Config) {
    let monitor = start_monitor(config, vec![]).await;

    let page = monitor.list_targets(TargetFilter::default()).await.unwrap();
    assert_eq!(page.pagination.total, 2);

    let edge = page
        .data
        .iter()
        .find(|v| v.target.hostname == "edge-1")
        .unwrap();
    assert_eq!(edge.target.status, Status::Offline);
    assert_eq!(monitor.history(edge.target.id, 10).await.unwrap().len(), 2);
    assert_eq!(monitor.list_alerts(None, 10).await.unwrap().len(), 1);

    let db = page
        .data
        .iter()
        .find(|v| v.target.hostname == "db-1")
        .unwrap();
    assert_eq!(db.target.status, Status::Online);

    // secrets survive, so agents keep reporting after a restart
    let status = monitor
        .ingest_report(db.target.method.secret(), agent_report(20.0, 30.0))
        .await
        .unwrap();
    assert_eq!(status, Status::Online);

    // ids keep counting from where they were
    let next = monitor
        .create_target(TargetSpec::new("edge-2", "192.0.2.11", MethodKind::Icmp))
        .await
        .unwrap();
    assert_eq!(next.id, 3);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_json_store_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig::Json {
        path: temp_dir.path().join("data").join("db.json"),
    };

    populate_and_stop(config_with(storage.clone())).await;
    assert_restored(config_with(storage)).await;
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig::Sqlite {
        path: temp_dir.path().join("fleetmon.db"),
    };

    populate_and_stop(config_with(storage.clone())).await;
    assert_restored(config_with(storage)).await;
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path: PathBuf = temp_dir.path().join("db.json");
    std::fs::write(&path, "{ definitely not json").unwrap();

    let storage = StorageConfig::Json { path: path.clone() };
    let monitor = start_monitor(config_with(storage), vec![]).await;
    assert_eq!(monitor.stats().await.unwrap().counts.total, 0);

    monitor
        .create_target(TargetSpec::new("edge-1", "192.0.2.10", MethodKind::Icmp))
        .await
        .unwrap();
    monitor.shutdown().await.unwrap();

    // the shutdown save replaced the corrupt document
    let snapshot = JsonFileStore::new(&path).load_all().await.unwrap().unwrap();
    assert_eq!(snapshot.targets.len(), 1);
}

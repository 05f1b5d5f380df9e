//! Integration tests for the stale agent detector

use std::time::Duration;

use fleetmon::broadcast::LiveEvent;
use fleetmon::config::StaleConfig;
use fleetmon::model::{MethodKind, Status};
use fleetmon::registry::TargetSpec;

use crate::helpers::*;

#[tokio::test]
async fn test_silent_agent_goes_offline_once() {
    let mut config = idle_config();
    config.stale = StaleConfig {
        interval: 3600,
        threshold: 0,
    };
    let monitor = start_monitor(config, vec![]).await;

    let agent = monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();
    let icmp = monitor
        .create_target(TargetSpec::new("edge", "10.0.0.3", MethodKind::Icmp))
        .await
        .unwrap();

    let secret = agent.method.secret().unwrap().to_string();
    monitor
        .ingest_report(Some(&secret), agent_report(10.0, 10.0))
        .await
        .unwrap();
    let seen = monitor
        .get_target(agent.id)
        .await
        .unwrap()
        .unwrap()
        .last_seen;

    let mut events = monitor.subscribe();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(monitor.sweep_stale_now().await.unwrap(), 1);
    assert_eq!(monitor.sweep_stale_now().await.unwrap(), 0);

    let stored = monitor.get_target(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Offline);
    assert_eq!(stored.last_seen, seen);

    let untouched = monitor.get_target(icmp.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, Status::Offline);

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        LiveEvent::StatusChange {
            target_id,
            previous,
            status,
            message,
            ..
        } => {
            assert_eq!(*target_id, agent.id);
            assert_eq!(*previous, Status::Online);
            assert_eq!(*status, Status::Offline);
            assert_eq!(message, "db-1 went offline (no recent report)");
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert!(monitor.list_alerts(None, 10).await.unwrap().is_empty());

    // the next report brings it back
    let status = monitor
        .ingest_report(Some(&secret), agent_report(10.0, 10.0))
        .await
        .unwrap();
    assert_eq!(status, Status::Online);
}

#[tokio::test]
async fn test_recent_reports_are_not_stale() {
    let monitor = start_monitor(idle_config(), vec![]).await;
    let agent = monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();
    monitor
        .ingest_report(agent.method.secret(), agent_report(10.0, 10.0))
        .await
        .unwrap();

    assert_eq!(monitor.sweep_stale_now().await.unwrap(), 0);
    let stored = monitor.get_target(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Online);
}

#[tokio::test]
async fn test_periodic_sweep_runs_on_its_own() {
    let mut config = idle_config();
    config.stale = StaleConfig {
        interval: 1,
        threshold: 0,
    };
    let monitor = start_monitor(config, vec![]).await;
    let agent = monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();
    monitor
        .ingest_report(agent.method.secret(), agent_report(10.0, 10.0))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let stored = monitor.get_target(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Offline);
}

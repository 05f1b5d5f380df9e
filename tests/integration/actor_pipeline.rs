//! Integration tests for the full actor pipeline
//!
//! These tests drive checker rounds by hand and verify what reaches the state
//! actor: status transitions, alerts, stored samples and live events.

use fleetmon::broadcast::LiveEvent;
use fleetmon::model::{AlertKind, MethodKind, Severity, Status};
use fleetmon::registry::{TargetFilter, TargetSpec, TargetUpdate};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_icmp_outage_and_recovery() {
    let checker = ScriptedChecker::new(MethodKind::Icmp, &[true, false, false, true]);
    let monitor = start_monitor(idle_config(), vec![checker]).await;

    let target = monitor
        .create_target(TargetSpec::new("edge-1", "192.0.2.10", MethodKind::Icmp))
        .await
        .unwrap();
    assert_eq!(target.status, Status::Offline);

    let mut statuses = Vec::new();
    for _ in 0..4 {
        assert_eq!(monitor.check_now(MethodKind::Icmp).await.unwrap(), 1);
        let current = monitor.get_target(target.id).await.unwrap().unwrap();
        statuses.push(current.status);
    }

    assert_eq!(
        statuses,
        vec![Status::Online, Status::Offline, Status::Offline, Status::Online]
    );

    let alerts = monitor.list_alerts(None, 100).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert.kind, AlertKind::IcmpDown);
    assert_eq!(alerts[0].alert.severity, Severity::Critical);
    assert_eq!(
        alerts[0].alert.message,
        "ICMP ping failed for edge-1 (192.0.2.10)"
    );

    let history = monitor.history(target.id, 100).await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(
        history.iter().map(|s| s.reachable).collect::<Vec<_>>(),
        vec![true, false, false, true]
    );

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_live_events_follow_transitions() {
    let checker = ScriptedChecker::new(MethodKind::Icmp, &[true, true, false]);
    let monitor = start_monitor(idle_config(), vec![checker]).await;
    let target = monitor
        .create_target(TargetSpec::new("edge-1", "192.0.2.10", MethodKind::Icmp))
        .await
        .unwrap();

    let mut events = monitor.subscribe();
    for _ in 0..3 {
        monitor.check_now(MethodKind::Icmp).await.unwrap();
    }
    // round trip so every applied result has been published
    monitor.get_target(target.id).await.unwrap();

    let events = drain(&mut events);
    let updates = events
        .iter()
        .filter(|e| matches!(e, LiveEvent::MetricUpdate { .. }))
        .count();
    assert_eq!(updates, 3);

    let changes = status_changes(&events);
    assert_eq!(changes.len(), 2);
    match changes[1] {
        LiveEvent::StatusChange {
            target_id,
            previous,
            status,
            message,
            ..
        } => {
            assert_eq!(*target_id, target.id);
            assert_eq!(*previous, Status::Online);
            assert_eq!(*status, Status::Offline);
            assert_eq!(message, "edge-1 went offline (ICMP)");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_maintenance_is_never_overwritten() {
    let checker = ScriptedChecker::new(MethodKind::Http, &[false, true, false]);
    let monitor = start_monitor(idle_config(), vec![checker]).await;

    let mut spec = TargetSpec::new("web", "10.0.0.5", MethodKind::Http);
    spec.status = Some(Status::Maintenance);
    let target = monitor.create_target(spec).await.unwrap();

    let mut events = monitor.subscribe();
    for _ in 0..3 {
        monitor.check_now(MethodKind::Http).await.unwrap();
    }

    let current = monitor.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(current.status, Status::Maintenance);
    assert_eq!(monitor.history(target.id, 10).await.unwrap().len(), 3);
    assert!(monitor.list_alerts(None, 10).await.unwrap().is_empty());
    assert!(status_changes(&drain(&mut events)).is_empty());

    // leaving maintenance hands the target back to the status engine
    let update = TargetUpdate {
        status: Some(Status::Online),
        ..Default::default()
    };
    assert!(monitor.update_target(target.id, update).await.unwrap());
    monitor.check_now(MethodKind::Http).await.unwrap();

    let current = monitor.get_target(target.id).await.unwrap().unwrap();
    assert_eq!(current.status, Status::Offline);
    let alerts = monitor.list_alerts(None, 10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert.kind, AlertKind::HttpDown);
}

#[tokio::test]
async fn test_listing_carries_latest_sample() {
    let checker = ScriptedChecker::new(MethodKind::Icmp, &[true, true]);
    let monitor = start_monitor(idle_config(), vec![checker]).await;

    let mut spec = TargetSpec::new("b-host", "10.0.0.2", MethodKind::Icmp);
    spec.group = Some("Core".to_string());
    monitor.create_target(spec).await.unwrap();
    monitor
        .create_target(TargetSpec::new("a-host", "10.0.0.1", MethodKind::Http))
        .await
        .unwrap();

    monitor.check_now(MethodKind::Icmp).await.unwrap();

    let page = monitor.list_targets(TargetFilter::default()).await.unwrap();
    assert_eq!(page.pagination.total, 2);
    // online first, then by hostname
    assert_eq!(page.data[0].target.hostname, "b-host");
    assert!(page.data[0].latest.is_some());
    assert_eq!(page.data[1].target.hostname, "a-host");
    assert!(page.data[1].latest.is_none());

    assert_eq!(monitor.groups().await.unwrap(), vec!["Core", "General"]);

    let stats = monitor.stats().await.unwrap();
    assert_eq!(stats.counts.total, 2);
    assert_eq!(stats.counts.online, 1);
    assert_eq!(stats.counts.offline, 1);
}

#[tokio::test]
async fn test_delete_removes_history_and_alerts() {
    let checker = ScriptedChecker::new(MethodKind::Icmp, &[true, false]);
    let monitor = start_monitor(idle_config(), vec![checker]).await;
    let target = monitor
        .create_target(TargetSpec::new("edge-1", "192.0.2.10", MethodKind::Icmp))
        .await
        .unwrap();

    monitor.check_now(MethodKind::Icmp).await.unwrap();
    monitor.check_now(MethodKind::Icmp).await.unwrap();
    assert_eq!(monitor.list_alerts(None, 10).await.unwrap().len(), 1);

    assert!(monitor.delete_target(target.id).await.unwrap());

    assert!(monitor.history(target.id, 10).await.unwrap().is_empty());
    assert!(monitor.latest_sample(target.id).await.unwrap().is_none());
    assert!(monitor.list_alerts(None, 10).await.unwrap().is_empty());
    assert_eq!(monitor.check_now(MethodKind::Icmp).await.unwrap(), 0);
}

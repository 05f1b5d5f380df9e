//! Integration tests for agent push reports

use assert_matches::assert_matches;
use fleetmon::MonitorError;
use fleetmon::model::{AlertKind, Measurements, MethodKind, Severity, Status};
use fleetmon::monitors::agent::ReportedProcess;
use fleetmon::registry::TargetSpec;
use pretty_assertions::assert_eq;

use crate::helpers::*;

fn process(pid: u32, name: &str, cpu: f64) -> ReportedProcess {
    ReportedProcess {
        pid,
        name: name.to_string(),
        cpu,
        mem: 1.5,
        rss: 20_480,
        user: "root".to_string(),
        command: format!("/usr/bin/{name}"),
    }
}

#[tokio::test]
async fn test_every_breaching_report_raises_alert() {
    let monitor = start_monitor(idle_config(), vec![]).await;
    let agent = monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();
    let secret = agent.method.secret().unwrap().to_string();

    for _ in 0..3 {
        let status = monitor
            .ingest_report(Some(&secret), agent_report(95.0, 50.0))
            .await
            .unwrap();
        assert_eq!(status, Status::Warning);
    }

    let alerts = monitor.list_alerts(Some(false), 10).await.unwrap();
    assert_eq!(alerts.len(), 3);
    assert!(alerts.iter().all(|a| a.alert.kind == AlertKind::HighCpu));
    assert!(alerts.iter().all(|a| a.alert.severity == Severity::Critical));
    assert_eq!(alerts[0].alert.message, "CPU usage at 95.0% on db-1");

    let status = monitor
        .ingest_report(Some(&secret), agent_report(10.0, 96.5))
        .await
        .unwrap();
    assert_eq!(status, Status::Warning);
    let newest = &monitor.list_alerts(None, 1).await.unwrap()[0];
    assert_eq!(newest.alert.kind, AlertKind::HighMemory);

    let status = monitor
        .ingest_report(Some(&secret), agent_report(10.0, 20.0))
        .await
        .unwrap();
    assert_eq!(status, Status::Online);
    assert_eq!(monitor.stats().await.unwrap().active_alerts, 4);
}

#[tokio::test]
async fn test_report_updates_hardware_and_processes() {
    let monitor = start_monitor(idle_config(), vec![]).await;
    let agent = monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();
    let secret = agent.method.secret().unwrap().to_string();

    let mut report = agent_report(30.0, 40.0);
    report.cpu_cores = Some(16);
    report.ram_total_mb = Some(65_536);
    report.processes = Some(vec![
        process(10, "sshd", 0.1),
        process(20, "postgres", 42.0),
        process(30, "nginx", 7.5),
    ]);
    monitor.ingest_report(Some(&secret), report).await.unwrap();

    // zero and absent values keep what is known
    let mut report = agent_report(30.0, 40.0);
    report.cpu_cores = Some(0);
    monitor.ingest_report(Some(&secret), report).await.unwrap();

    let stored = monitor.get_target(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.hardware.cpu_cores, 16);
    assert_eq!(stored.hardware.ram_total_mb, 65_536);
    assert_eq!(stored.hardware.disk_total_gb, 0);
    assert!(stored.last_seen.is_some());

    // a report without a process list keeps the previous one
    let processes = monitor.processes(agent.id).await.unwrap();
    assert_eq!(
        processes.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        vec!["postgres", "nginx", "sshd"]
    );

    let latest = monitor.latest_sample(agent.id).await.unwrap().unwrap();
    assert!(latest.reachable);
    assert_matches!(latest.measurements, Measurements::Agent(m) if m.cpu_percent == 30.0);

    assert!(monitor.delete_target(agent.id).await.unwrap());
    assert!(monitor.processes(agent.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_reports_change_nothing() {
    let monitor = start_monitor(idle_config(), vec![]).await;
    monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();
    let before = monitor.stats().await.unwrap();

    assert_matches!(
        monitor.ingest_report(None, agent_report(99.0, 99.0)).await,
        Err(MonitorError::MissingSecret)
    );
    assert_matches!(
        monitor
            .ingest_report(Some("not-a-secret"), agent_report(99.0, 99.0))
            .await,
        Err(MonitorError::UnknownSecret)
    );

    assert_eq!(monitor.stats().await.unwrap(), before);
    assert!(monitor.list_alerts(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_secret_of_non_agent_target_is_unknown() {
    let monitor = start_monitor(idle_config(), vec![]).await;
    let icmp = monitor
        .create_target(TargetSpec::new("edge", "10.0.0.3", MethodKind::Icmp))
        .await
        .unwrap();
    assert_eq!(icmp.method.secret(), None);

    let agent = monitor
        .create_target(TargetSpec::new("db-1", "10.0.0.2", MethodKind::Agent))
        .await
        .unwrap();
    let other = monitor
        .create_target(TargetSpec::new("db-2", "10.0.0.4", MethodKind::Agent))
        .await
        .unwrap();
    assert_ne!(agent.method.secret(), other.method.secret());
}

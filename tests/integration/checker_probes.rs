//! Integration tests for the protocol checkers against local endpoints

use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use fleetmon::checkers::{Checker, DnsChecker, HttpChecker, PortChecker};
use fleetmon::config::ProbeConfig;
use fleetmon::model::{Measurements, MethodKind, PortProtocol, Target};
use fleetmon::registry::{TargetRegistry, TargetSpec};
use tokio::net::{TcpListener, UdpSocket};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn register(spec: TargetSpec) -> Target {
    TargetRegistry::new().create(spec).unwrap()
}

fn http_target(url: String) -> Target {
    let mut spec = TargetSpec::new("web", "127.0.0.1", MethodKind::Http);
    spec.url = Some(url);
    register(spec)
}

fn port_target(port: u16, protocol: PortProtocol) -> Target {
    let mut spec = TargetSpec::new("svc", "127.0.0.1", MethodKind::TcpUdp);
    spec.port = Some(port);
    spec.protocol = Some(protocol);
    register(spec)
}

#[tokio::test]
async fn test_http_status_decides_reachability() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("all good"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();

    let result = checker
        .probe(&http_target(format!("{}/health", mock_server.uri())))
        .await;
    assert!(result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Http {
            status_code: Some(200),
            body_size: 8,
            ..
        }
    );

    let result = checker
        .probe(&http_target(format!("{}/missing", mock_server.uri())))
        .await;
    assert!(result.reachable);

    let result = checker
        .probe(&http_target(format!("{}/broken", mock_server.uri())))
        .await;
    assert!(!result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Http {
            status_code: Some(503),
            ..
        }
    );
}

#[tokio::test]
async fn test_http_redirect_is_the_targets_answer() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://127.0.0.1:1/gone"),
        )
        .mount(&mock_server)
        .await;

    let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
    let result = checker
        .probe(&http_target(format!("{}/moved", mock_server.uri())))
        .await;

    assert!(result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Http {
            status_code: Some(302),
            ..
        }
    );
}

#[tokio::test]
async fn test_http_body_size_counts_every_chunk() {
    let mock_server = MockServer::start().await;
    let body = vec![b'x'; 512 * 1024];
    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&mock_server)
        .await;

    let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
    let result = checker
        .probe(&http_target(format!("{}/large", mock_server.uri())))
        .await;

    assert!(result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Http {
            body_size: 524_288,
            ..
        }
    );
}

#[tokio::test]
async fn test_http_connection_failure_has_no_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
    let result = checker
        .probe(&http_target(format!("http://127.0.0.1:{port}/")))
        .await;

    assert!(!result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Http {
            status_code: None,
            ..
        }
    );
}

#[tokio::test]
async fn test_tcp_open_and_closed_ports() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().port();

    let closed_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = closed_listener.local_addr().unwrap().port();
    drop(closed_listener);

    let checker = PortChecker::with_timeout(Duration::from_millis(500));

    let result = checker.probe(&port_target(open, PortProtocol::Tcp)).await;
    assert!(result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Port { port, protocol: PortProtocol::Tcp, .. } if port == open
    );

    let result = checker.probe(&port_target(closed, PortProtocol::Tcp)).await;
    assert!(!result.reachable);
}

#[tokio::test]
async fn test_silent_udp_port_counts_as_open() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();

    let checker = PortChecker::with_timeout(Duration::from_millis(200));
    let result = checker.probe(&port_target(port, PortProtocol::Udp)).await;

    assert!(result.reachable);
}

#[tokio::test]
async fn test_answering_udp_port_is_open() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();

    let echo = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let (n, peer) = socket.recv_from(&mut buf).await.unwrap();
        socket.send_to(&buf[..n], peer).await.unwrap();
    });

    let checker = PortChecker::with_timeout(Duration::from_secs(2));
    let result = checker.probe(&port_target(port, PortProtocol::Udp)).await;

    assert!(result.reachable);
    echo.await.unwrap();
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_refused_udp_port_is_closed() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    drop(socket);

    let checker = PortChecker::with_timeout(Duration::from_secs(1));
    let result = checker.probe(&port_target(port, PortProtocol::Udp)).await;

    assert!(!result.reachable);
}

#[tokio::test]
async fn test_dns_bad_resolver_fails_immediately() {
    let mut spec = TargetSpec::new("resolver", "not-an-ip", MethodKind::Dns);
    spec.lookup_domain = Some("example.com".to_string());
    let target = register(spec);

    let checker = DnsChecker::with_timeout(Duration::from_secs(5));
    let started = Instant::now();
    let result = checker.probe(&target).await;

    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Dns { ref error_code, .. } if error_code.as_deref() == Some("EBADRESOLVER")
    );
}

#[tokio::test]
async fn test_dns_silent_resolver_times_out() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let resolver = socket.local_addr().unwrap().to_string();

    let target = register(TargetSpec::new("resolver", resolver, MethodKind::Dns));
    let checker = DnsChecker::with_timeout(Duration::from_millis(200));
    let result = checker.probe(&target).await;

    assert!(!result.reachable);
    assert_matches!(
        result.measurements,
        Measurements::Dns { ref error_code, .. } if error_code.as_deref() == Some("ETIMEOUT")
    );
    drop(socket);
}

use host_telemetry::config::BrokerConfig;
use host_telemetry::error::{ConnectFailure, LinkError, PublishError};
use host_telemetry::metrics::MetricsSnapshot;
use host_telemetry::mqtt::MqttTransport;
use host_telemetry::publisher::{ConnectionState, PublishLifecycle};
use std::net::TcpListener;
use std::time::{Duration, Instant};

/// A loopback port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn loopback(port: u16) -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".to_string(),
        port,
        client_id: "host-telemetry-test".to_string(),
        credentials: None,
        keep_alive: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn unreachable_broker_reports_connect_failure() {
    let broker = loopback(closed_port());
    let mut lifecycle = PublishLifecycle::new(MqttTransport::new(broker), "test/prefix");

    lifecycle.connect().await.unwrap();

    let mut failure = None;
    for _ in 0..100 {
        failure = lifecycle.last_failure();
        if failure.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(matches!(
        failure,
        Some(LinkError::Connect(ConnectFailure::Transport(_)))
    ));
    assert_eq!(lifecycle.state(), ConnectionState::Disconnected);

    let snap = MetricsSnapshot {
        cpu_percent: 1.0,
        ram_percent: 1.0,
        ram_used_gb: 1.0,
        ram_total_gb: 2.0,
        disk_percent: 1.0,
        disk_used_gb: 1.0,
        disk_free_gb: 1.0,
        disk_total_gb: 2.0,
        disk_read_rate: 0.0,
        disk_write_rate: 0.0,
        net_recv_rate: 0.0,
        net_sent_rate: 0.0,
        timestamp_ms: 1,
    };
    assert_eq!(lifecycle.publish(&snap), Err(PublishError::NotConnected));

    lifecycle.disconnect().await;
    assert_eq!(lifecycle.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn pending_session_is_dropped_without_grace_period() {
    // Accepts at the TCP level but never answers CONNECT.
    let silent = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = silent.local_addr().unwrap().port();
    let mut lifecycle = PublishLifecycle::new(MqttTransport::new(loopback(port)), "test/prefix");

    lifecycle.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(lifecycle.state(), ConnectionState::Disconnected);

    let started = Instant::now();
    lifecycle.connect().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));

    let started = Instant::now();
    lifecycle.disconnect().await;
    assert!(started.elapsed() < Duration::from_millis(500));
    drop(silent);
}

//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> build -> start -> ingest -> health -> shutdown.

use std::time::Duration;

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

use ironlog_core::config::IronlogConfig;
use ironlog_daemon::orchestrator::Orchestrator;

/// Config with syslog on ephemeral loopback ports and a file sink in `dir`.
fn file_sink_config(dir: &TempDir) -> IronlogConfig {
    let sink_path = dir.path().join("bulk.ndjson");
    let pid_path = dir.path().join("ironlog.pid");
    let toml_str = format!(
        r#"
[general]
log_level = "info"
pid_file = "{pid}"

[syslog]
host = "127.0.0.1"
port = "0"
bulk_actions = 1000
flush_interval_ms = 60000

[sink]
kind = "file"
path = "{sink}"
"#,
        pid = pid_path.display(),
        sink = sink_path.display(),
    );
    IronlogConfig::parse(&toml_str).expect("failed to parse test config")
}

#[tokio::test]
async fn test_build_with_syslog_disabled() {
    let config = IronlogConfig::parse("[syslog]\nenabled = false\n").unwrap();
    let mut orchestrator = Orchestrator::build_from_config(config).await.unwrap();
    assert!(orchestrator.syslog().is_none());

    orchestrator.start().await.unwrap();
    let health = orchestrator.health().await;
    assert!(health.status.is_healthy());
    assert!(!health.modules[0].enabled);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = IronlogConfig::parse("[syslog]\nbulk_actions = 0\n").unwrap();
    assert!(Orchestrator::build_from_config(config).await.is_err());

    let config = IronlogConfig::parse("[syslog]\nport = \"9600-9500\"\n").unwrap();
    let err = Orchestrator::build_from_config(config).await.err().unwrap();
    assert!(err.to_string().contains("port"), "got: {err}");
}

#[tokio::test]
async fn test_messages_flow_to_file_sink_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let config = file_sink_config(&dir);
    let pid_path = dir.path().join("ironlog.pid");
    let sink_path = dir.path().join("bulk.ndjson");

    let mut orchestrator = Orchestrator::build_from_config(config).await.unwrap();
    orchestrator.start().await.unwrap();
    assert!(pid_path.exists(), "PID file should exist while running");
    assert!(orchestrator.health().await.status.is_healthy());

    let service = orchestrator.syslog().unwrap();
    let udp = service.udp_local_addr().unwrap();
    let tcp = service.tcp_local_addr().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(b"<34>Oct 11 22:14:15 mymachine su: 'su root' failed", udp)
        .await
        .unwrap();
    let mut stream = TcpStream::connect(tcp).await.unwrap();
    stream
        .write_all(b"<165>1 2003-10-11T22:14:15.003Z host.example.com evntslog: hello\n")
        .await
        .unwrap();

    let stats = service.stats();
    tokio::time::timeout(Duration::from_secs(5), async {
        while stats.records_queued() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    orchestrator.shutdown().await.unwrap();
    assert!(!pid_path.exists(), "PID file should be removed on shutdown");

    let content = std::fs::read_to_string(&sink_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    for action in [lines[0], lines[2]] {
        let action: serde_json::Value = serde_json::from_str(action).unwrap();
        assert!(action["index"]["_index"].as_str().unwrap().starts_with("syslog-"));
        assert_eq!(action["index"]["_type"], "syslog");
    }
    assert!(content.contains("'su root' failed"));
    assert!(content.contains("evntslog: hello"));
}

#[tokio::test]
async fn test_duplicate_pid_file_prevents_start() {
    let dir = TempDir::new().unwrap();
    let config = file_sink_config(&dir);
    std::fs::write(dir.path().join("ironlog.pid"), "424242").unwrap();

    let mut orchestrator = Orchestrator::build_from_config(config).await.unwrap();
    let err = orchestrator.start().await.unwrap_err();
    assert!(err.to_string().contains("424242"), "got: {err}");
    assert!(orchestrator.health().await.status.is_unhealthy());
    assert!(!orchestrator.syslog().unwrap().is_running());

    // Shutdown after a failed start leaves the service and the other PID file alone
    orchestrator.shutdown().await.unwrap();
    let content = std::fs::read_to_string(dir.path().join("ironlog.pid")).unwrap();
    assert_eq!(content, "424242");
}

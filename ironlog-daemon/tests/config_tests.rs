//! Configuration loading tests for the daemon.
//!
//! Verifies that the shipped example config loads and converts into a valid
//! syslog configuration, and that environment overrides reach the service.

use std::path::PathBuf;

use serial_test::serial;

use ironlog_core::config::IronlogConfig;
use ironlog_syslog::SyslogConfig;

fn example_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("workspace root")
        .join("ironlog.toml.example")
}

#[tokio::test]
async fn test_example_config_is_valid_for_syslog() {
    let config = IronlogConfig::from_file(example_path()).await.unwrap();
    config.validate().unwrap();

    let syslog = SyslogConfig::from_core(&config.syslog);
    syslog.validate().unwrap();
    assert_eq!(syslog.port_range().unwrap().ports().len(), 101);
    assert_eq!(syslog.udp_buffer_size(), 65_536);
}

#[tokio::test]
async fn test_missing_config_file() {
    let err = IronlogConfig::load("/nonexistent/ironlog.toml").await.unwrap_err();
    assert!(err.to_string().contains("not found"), "got: {err}");
}

#[tokio::test]
#[serial]
async fn test_env_override_reaches_syslog_config() {
    // SAFETY: serialized with other env-mutating tests
    unsafe {
        std::env::set_var("IRONLOG_SYSLOG_PORT", "514,1514");
        std::env::set_var("IRONLOG_SYSLOG_BULK_ACTIONS", "250");
    }
    let result = IronlogConfig::load(example_path()).await;
    unsafe {
        std::env::remove_var("IRONLOG_SYSLOG_PORT");
        std::env::remove_var("IRONLOG_SYSLOG_BULK_ACTIONS");
    }

    let syslog = SyslogConfig::from_core(&result.unwrap().syslog);
    assert_eq!(syslog.port_range().unwrap().ports(), &[514, 1514]);
    assert_eq!(syslog.bulk_actions, 250);
}

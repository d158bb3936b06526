//! Service orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `ironlog-daemon`.
//! It validates configuration, installs the metrics recorder, builds the
//! document sink and the syslog service, and runs the main loop until a
//! shutdown signal arrives.
//!
//! # Shutdown Order
//!
//! 1. Background tasks (uptime updater) receive the broadcast shutdown
//! 2. Syslog service stops its listeners, drains its queue and flushes
//! 3. PID file is removed

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use ironlog_core::config::{GeneralConfig, IronlogConfig};
use ironlog_core::pipeline::{HealthStatus, Pipeline};
use ironlog_syslog::{SyslogConfig, SyslogService};

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::sink::NdjsonSink;

/// Interval between health reports in the main loop.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between uptime metric updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Module name used in health reports.
const SYSLOG_MODULE: &str = "syslog";

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: IronlogConfig,
    /// Syslog service, `None` when `[syslog] enabled = false`.
    syslog: Option<SyslogService<NdjsonSink>>,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
    /// Background task handles started by [`Orchestrator::start`].
    tasks: Vec<tokio::task::JoinHandle<()>>,
    /// Whether this instance wrote the PID file and owns its removal.
    owns_pid_file: bool,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = IronlogConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics recorder cannot be installed
    /// - The sink cannot be opened or the syslog settings are invalid
    pub async fn build_from_config(config: IronlogConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let syslog = if config.syslog.enabled {
            tracing::info!("initializing syslog service");
            let sink = NdjsonSink::from_config(&config.sink).await?;
            let service = SyslogService::new(SyslogConfig::from_core(&config.syslog), Arc::new(sink))
                .map_err(|e| anyhow::anyhow!("failed to build syslog service: {}", e))?;
            Some(service)
        } else {
            tracing::warn!("syslog service disabled, daemon will idle until shutdown");
            None
        };

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        let (shutdown_tx, _) = broadcast::channel(16);
        Ok(Self {
            config,
            syslog,
            shutdown_tx,
            start_time: Instant::now(),
            tasks: Vec::new(),
            owns_pid_file: false,
        })
    }

    /// Start the daemon, wait for a shutdown signal, then shut down.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut health_interval = tokio::time::interval_at(
            tokio::time::Instant::now() + HEALTH_CHECK_INTERVAL,
            HEALTH_CHECK_INTERVAL,
        );
        let shutdown_signal = wait_for_shutdown_signal();
        tokio::pin!(shutdown_signal);

        tracing::info!("entering main event loop");
        let signal = loop {
            tokio::select! {
                signal = &mut shutdown_signal => break signal?,
                _ = health_interval.tick() => self.report_health().await,
            }
        };
        tracing::info!(signal = signal, "shutdown signal received");

        self.shutdown().await
    }

    /// Write the PID file, start the syslog service and background tasks.
    ///
    /// On failure the PID file is removed again.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(path) = pid_file_path(&self.config.general) {
            write_pid_file(path)?;
            self.owns_pid_file = true;
        }

        if let Some(service) = self.syslog.as_mut() {
            if let Err(e) = service.start().await {
                if let Some(path) = pid_file_path(&self.config.general) {
                    remove_pid_file(path);
                }
                self.owns_pid_file = false;
                return Err(anyhow::anyhow!("failed to start syslog service: {}", e));
            }
            tracing::info!(
                udp = ?service.udp_local_addr(),
                tcp = ?service.tcp_local_addr(),
                "syslog service running"
            );
        }

        if self.config.metrics.enabled {
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.tasks
                .push(spawn_uptime_updater(self.start_time, shutdown_rx));
        }
        Ok(())
    }

    /// Stop background tasks and the syslog service, then remove the PID file.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        let mut result = Ok(());
        if let Some(service) = self.syslog.as_mut().filter(|s| s.is_running()) {
            if let Err(e) = service.stop().await {
                tracing::error!(error = %e, "failed to stop syslog service");
                result = Err(anyhow::anyhow!("failed to stop syslog service: {}", e));
            }
        }

        if let Some(path) = pid_file_path(&self.config.general).filter(|_| self.owns_pid_file) {
            remove_pid_file(path);
            self.owns_pid_file = false;
        }
        tracing::info!(uptime_secs = self.start_time.elapsed().as_secs(), "ironlog-daemon shut down");
        result
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let status = match &self.syslog {
            Some(service) => service.health_check().await,
            None => HealthStatus::Healthy,
        };
        let modules = vec![ModuleHealth {
            name: SYSLOG_MODULE.to_owned(),
            enabled: self.syslog.is_some(),
            status,
        }];

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &IronlogConfig {
        &self.config
    }

    /// Get the syslog service, if enabled.
    pub fn syslog(&self) -> Option<&SyslogService<NdjsonSink>> {
        self.syslog.as_ref()
    }

    async fn report_health(&self) {
        let health = self.health().await;
        match &health.status {
            HealthStatus::Healthy => {
                tracing::debug!(uptime_secs = health.uptime_secs, "daemon healthy");
            }
            HealthStatus::Degraded(reason) => {
                tracing::warn!(reason = %reason, "daemon degraded");
            }
            HealthStatus::Unhealthy(reason) => {
                tracing::warn!(reason = %reason, "daemon unhealthy");
            }
        }
        if let Some(service) = &self.syslog {
            let stats = service.stats();
            tracing::debug!(
                records_queued = stats.records_queued(),
                records_flushed = stats.records_flushed(),
                bulks_failed = stats.bulks_failed(),
                items_failed = stats.items_failed(),
                "syslog writer statistics"
            );
        }
    }
}

/// PID file path, `None` when `general.pid_file` is empty.
fn pid_file_path(config: &GeneralConfig) -> Option<&Path> {
    let pid_file = config.pid_file.as_str();
    (!pid_file.is_empty()).then(|| Path::new(pid_file))
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl+C handler: {}", e))?;
    Ok("CTRL_C")
}

/// Write the current process PID to a file.
///
/// Fails if the file already exists or the created path is not a regular
/// file. Parent directories get mode 0700, the file itself 0600.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    use ironlog_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use ironlog_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_write_pid_file_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("subdir").join("test.pid");

        write_pid_file(&pid_file).expect("write_pid_file should create parent directory");

        let content = fs::read_to_string(&pid_file).expect("should read PID file");
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_write_pid_file_fails_if_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("dup.pid");
        fs::write(&pid_file, "12345").unwrap();

        let err_msg = write_pid_file(&pid_file).unwrap_err().to_string();
        assert!(err_msg.contains("already exists"), "got: {err_msg}");
        assert!(err_msg.contains("12345"), "got: {err_msg}");
    }

    #[test]
    fn test_remove_pid_file_handles_nonexistent_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        remove_pid_file(&dir.path().join("missing.pid"));
    }

    #[tokio::test]
    async fn test_uptime_updater_stops_on_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let task = spawn_uptime_updater(Instant::now(), rx);
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("updater should stop")
            .unwrap();
    }
}

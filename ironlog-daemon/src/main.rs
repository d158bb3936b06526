use anyhow::Result;
use clap::Parser;

use ironlog_core::config::IronlogConfig;
use ironlog_daemon::cli::DaemonCli;
use ironlog_daemon::logging;
use ironlog_daemon::orchestrator::Orchestrator;
use ironlog_syslog::SyslogConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = IronlogConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();

    // CLI flags take precedence over the file and the environment
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(pid_file) = cli.pid_file {
        config.general.pid_file = pid_file;
    }
    if let Some(port) = cli.port {
        config.syslog.port = port;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        if config.syslog.enabled {
            SyslogConfig::from_core(&config.syslog)
                .validate()
                .map_err(|e| anyhow::anyhow!("syslog config validation failed: {}", e))?;
        }
        println!("configuration {} is valid", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "ironlog-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await
}

//! syslog 서비스 -- 리스너, 파서, 배치 작성기의 생명주기를 관리합니다.
//!
//! [`SyslogService`]는 core의 [`Pipeline`] trait을 구현하여
//! `ironlog-daemon`에서 start/stop/health_check 순서로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! UDP listener ─┐
//!               ├─> Ingest (parse -> document -> index name) -> WriterHandle -> BatchWriter -> DocumentSink
//! TCP listener ─┘
//! ```
//!
//! UDP와 TCP는 독립적으로 바인드됩니다. 한쪽만 실패하면 경고 후 나머지로 계속 동작하며
//! 상태는 `Degraded`로 보고됩니다. 활성화된 전송이 모두 실패하면 시작이 실패합니다.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ironlog_core::error::{IronlogError, PipelineError};
use ironlog_core::pipeline::{HealthStatus, Pipeline};

use crate::config::SyslogConfig;
use crate::error::SyslogError;
use crate::index::IndexNameResolver;
use crate::listener::port::{self, PortRange};
use crate::listener::{Ingest, TcpSyslogListener, UdpSyslogListener};
use crate::parser::MessageParser;
use crate::sink::DocumentSink;
use crate::writer::{BatchWriter, WriterSettings, WriterStats};

/// 서비스 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    /// 생성됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// syslog 수신 서비스
///
/// # 사용 예시
/// ```ignore
/// use ironlog_syslog::{SyslogConfig, SyslogService};
///
/// let mut service = SyslogService::new(SyslogConfig::default(), Arc::new(my_sink))?;
/// service.start().await?;
/// // ...
/// service.stop().await?;
/// ```
pub struct SyslogService<S: DocumentSink> {
    config: SyslogConfig,
    sink: Arc<S>,
    parser: Arc<MessageParser>,
    index: IndexNameResolver,
    ports: PortRange,
    state: ServiceState,
    writer: Option<BatchWriter>,
    /// 마지막으로 시작된 작성기의 통계 (정지 후에도 유지)
    stats: Arc<WriterStats>,
    cancel: CancellationToken,
    listeners: Vec<JoinHandle<()>>,
    udp_local_addr: Option<SocketAddr>,
    tcp_local_addr: Option<SocketAddr>,
    /// 바인드에 실패한 전송과 사유
    failed_transports: Vec<String>,
}

impl<S: DocumentSink> SyslogService<S> {
    /// 설정을 검증하고 서비스를 생성합니다.
    ///
    /// 파서, 인덱스 결정기, 포트 범위는 여기서 한 번만 만들어집니다.
    pub fn new(config: SyslogConfig, sink: Arc<S>) -> Result<Self, SyslogError> {
        config.validate()?;
        let parser = Arc::new(config.message_parser()?);
        let index = config.index_resolver()?;
        let ports = config.port_range()?;

        Ok(Self {
            config,
            sink,
            parser,
            index,
            ports,
            state: ServiceState::Initialized,
            writer: None,
            stats: Arc::new(WriterStats::default()),
            cancel: CancellationToken::new(),
            listeners: Vec::new(),
            udp_local_addr: None,
            tcp_local_addr: None,
            failed_transports: Vec::new(),
        })
    }

    /// 리스너와 배치 작성기가 동작 중인지 여부
    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }

    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    /// UDP 리스너가 바인드된 주소
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.udp_local_addr
    }

    /// TCP 리스너가 바인드된 주소
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        self.tcp_local_addr
    }

    /// 배치 작성기 통계
    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &SyslogConfig {
        &self.config
    }

    pub fn parser(&self) -> &MessageParser {
        &self.parser
    }

    async fn start_inner(&mut self) -> Result<(), SyslogError> {
        let host = port::resolve_host(&self.config.host).await?;

        let writer = BatchWriter::spawn(WriterSettings::from_config(&self.config), Arc::clone(&self.sink));
        let ingest = Arc::new(Ingest::new(
            Arc::clone(&self.parser),
            self.index.clone(),
            self.config.doc_type.as_str(),
            writer.handle(),
        ));
        let cancel = CancellationToken::new();
        let mut failed = Vec::new();
        let mut last_error = None;

        if self.config.udp_enabled {
            match UdpSyslogListener::bind(
                host,
                &self.ports,
                self.config.receive_buffer_size,
                self.config.udp_buffer_size(),
            ) {
                Ok(listener) => {
                    self.udp_local_addr = Some(listener.local_addr());
                    self.listeners
                        .push(tokio::spawn(listener.run(Arc::clone(&ingest), cancel.clone())));
                }
                Err(e) => {
                    warn!(ports = self.ports.spec(), error = %e, "udp transport unavailable");
                    failed.push(format!("udp: {e}"));
                    last_error = Some(e);
                }
            }
        }

        if self.config.tcp_enabled {
            match TcpSyslogListener::bind(
                host,
                &self.ports,
                self.config.receive_buffer_size,
                self.config.tcp.clone(),
            ) {
                Ok(listener) => {
                    self.tcp_local_addr = Some(listener.local_addr());
                    self.listeners
                        .push(tokio::spawn(listener.run(Arc::clone(&ingest), cancel.clone())));
                }
                Err(e) => {
                    warn!(ports = self.ports.spec(), error = %e, "tcp transport unavailable");
                    failed.push(format!("tcp: {e}"));
                    last_error = Some(e);
                }
            }
        }

        if self.listeners.is_empty() {
            writer.close().await?;
            return Err(last_error.unwrap_or_else(|| SyslogError::Config {
                field: "udp_enabled".to_owned(),
                reason: "at least one of udp or tcp must be enabled".to_owned(),
            }));
        }

        self.stats = writer.stats();
        self.writer = Some(writer);
        self.cancel = cancel;
        self.failed_transports = failed;
        Ok(())
    }
}

impl<S: DocumentSink> Pipeline for SyslogService<S> {
    async fn start(&mut self) -> Result<(), IronlogError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(host = %self.config.host, port = %self.config.port, "starting syslog service");
        self.start_inner().await?;
        self.state = ServiceState::Running;
        info!(
            udp = ?self.udp_local_addr,
            tcp = ?self.tcp_local_addr,
            index = %self.config.index,
            "syslog service started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IronlogError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping syslog service");

        // 1. 리스너 종료 (TCP는 열린 연결이 끝날 때까지 대기)
        self.cancel.cancel();
        for task in self.listeners.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "syslog listener task failed");
            }
        }

        // 2. 큐에 남은 요청을 마지막으로 플러시
        if let Some(writer) = self.writer.take() {
            writer.close().await?;
        }

        self.udp_local_addr = None;
        self.tcp_local_addr = None;
        self.failed_transports.clear();
        self.state = ServiceState::Stopped;
        info!(
            records_flushed = self.stats.records_flushed(),
            bulks_failed = self.stats.bulks_failed(),
            "syslog service stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                let writer_closed = self
                    .writer
                    .as_ref()
                    .is_none_or(|writer| writer.handle().is_closed());
                if writer_closed {
                    HealthStatus::Unhealthy("batch writer stopped".to_owned())
                } else if !self.failed_transports.is_empty() {
                    HealthStatus::Degraded(self.failed_transports.join("; "))
                } else {
                    HealthStatus::Healthy
                }
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

//! syslog 수신 설정
//!
//! [`SyslogConfig`]는 core의 [`SyslogSection`](ironlog_core::config::SyslogSection)을
//! 기반으로 리스너와 배치 작성기가 직접 사용하는 형태(시간은 `Duration`,
//! 예측 버퍼 크기는 확정값)로 변환한 설정입니다.
//!
//! # 사용 예시
//! ```
//! use ironlog_core::config::IronlogConfig;
//! use ironlog_syslog::config::SyslogConfig;
//!
//! let core_config = IronlogConfig::default();
//! let config = SyslogConfig::from_core(&core_config.syslog);
//! config.validate().unwrap();
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use ironlog_core::config::SyslogSection;
use serde::{Deserialize, Serialize};

use crate::error::SyslogError;
use crate::index::IndexNameResolver;
use crate::listener::port::PortRange;
use crate::parser::{FieldNames, MessageParser, PatternSet};

/// UDP 데이터그램 최대 크기. 수신 버퍼 예측값은 이 값으로 제한됩니다.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(3600);

/// syslog 수신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyslogConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 호스트
    pub host: String,
    /// 포트 범위 명세 ("9500-9600", "514", "514,1514")
    pub port: String,
    pub udp_enabled: bool,
    pub tcp_enabled: bool,
    /// 이 개수에 도달하면 플러시
    pub bulk_actions: usize,
    /// 누적 추정 크기가 이 값에 도달하면 플러시
    pub bulk_size_bytes: u64,
    /// 주기적 플러시 간격
    pub flush_interval: Duration,
    /// 동시 진행 플러시 수 (0이면 배치 태스크에서 직접 커밋)
    pub concurrent_requests: usize,
    /// SO_RCVBUF
    pub receive_buffer_size: usize,
    /// 수신 버퍼 예측 크기
    pub receive_predictor_size: usize,
    /// 리스너 → 배치 작성기 작업 큐 용량
    pub queue_capacity: usize,
    /// 인덱스 이름 또는 strftime 템플릿
    pub index: String,
    pub index_is_timewindow: bool,
    pub doc_type: String,
    pub patterns: BTreeMap<String, String>,
    pub field_names: BTreeMap<String, String>,
    pub tcp: TcpOptions,
}

/// TCP 리스너 옵션
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpOptions {
    pub reuse_address: bool,
    pub no_delay: bool,
    pub keep_alive: bool,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 한 줄(메시지)의 최대 바이트
    pub max_message_size: usize,
    /// 유휴 연결을 닫기까지의 시간
    pub connection_timeout: Duration,
}

impl Default for TcpOptions {
    fn default() -> Self {
        SyslogConfig::default().tcp
    }
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self::from_core(&SyslogSection::default())
    }
}

impl SyslogConfig {
    /// core의 `SyslogSection`에서 설정을 생성합니다.
    pub fn from_core(core: &SyslogSection) -> Self {
        Self {
            enabled: core.enabled,
            host: core.host.clone(),
            port: core.port.clone(),
            udp_enabled: core.udp_enabled,
            tcp_enabled: core.tcp_enabled,
            bulk_actions: core.bulk_actions,
            bulk_size_bytes: core.bulk_size_bytes,
            flush_interval: Duration::from_millis(core.flush_interval_ms),
            concurrent_requests: core.concurrent_requests,
            receive_buffer_size: core.receive_buffer_size,
            receive_predictor_size: core
                .receive_predictor_size
                .unwrap_or(core.receive_buffer_size),
            queue_capacity: core.queue_capacity,
            index: core.index.clone(),
            index_is_timewindow: core.index_is_timewindow,
            doc_type: core.doc_type.clone(),
            patterns: core.patterns.clone(),
            field_names: core.field_names.clone(),
            tcp: TcpOptions {
                reuse_address: core.tcp.reuse_address,
                no_delay: core.tcp.no_delay,
                keep_alive: core.tcp.keep_alive,
                max_connections: core.tcp.max_connections,
                max_message_size: core.tcp.max_message_size,
                connection_timeout: Duration::from_secs(core.tcp.connection_timeout_secs),
            },
        }
    }

    /// UDP 수신 버퍼 크기 (예측값, 최대 데이터그램 크기로 제한)
    pub fn udp_buffer_size(&self) -> usize {
        self.receive_predictor_size.clamp(1, MAX_DATAGRAM_SIZE)
    }

    /// 포트 범위 명세를 해석합니다.
    pub fn port_range(&self) -> Result<PortRange, SyslogError> {
        PortRange::parse(&self.port)
    }

    /// 인덱스 이름 결정기를 생성합니다.
    pub fn index_resolver(&self) -> Result<IndexNameResolver, SyslogError> {
        IndexNameResolver::new(&self.index, self.index_is_timewindow)
    }

    /// 필드명 매핑과 추출 패턴이 적용된 메시지 파서를 생성합니다.
    pub fn message_parser(&self) -> Result<MessageParser, SyslogError> {
        Ok(MessageParser::new()
            .with_field_names(FieldNames::with_overrides(&self.field_names)?)
            .with_patterns(PatternSet::compile(&self.patterns)?))
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SyslogError> {
        if self.host.is_empty() {
            return Err(invalid("host", "must not be empty"));
        }
        self.port_range()?;

        if self.enabled && !self.udp_enabled && !self.tcp_enabled {
            return Err(invalid(
                "udp_enabled",
                "at least one of udp or tcp must be enabled",
            ));
        }
        if self.bulk_actions == 0 {
            return Err(invalid("bulk_actions", "must be greater than 0"));
        }
        if self.bulk_size_bytes == 0 {
            return Err(invalid("bulk_size_bytes", "must be greater than 0"));
        }
        if self.flush_interval.is_zero() || self.flush_interval > MAX_FLUSH_INTERVAL {
            return Err(invalid("flush_interval_ms", "must be 1-3600000"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be greater than 0"));
        }
        if self.receive_predictor_size == 0 {
            return Err(invalid("receive_predictor_size", "must be greater than 0"));
        }
        if self.doc_type.is_empty() {
            return Err(invalid("doc_type", "must not be empty"));
        }
        if self.tcp.max_connections == 0 {
            return Err(invalid("tcp.max_connections", "must be greater than 0"));
        }
        if self.tcp.max_message_size == 0 {
            return Err(invalid("tcp.max_message_size", "must be greater than 0"));
        }
        if self.tcp.connection_timeout.is_zero() {
            return Err(invalid(
                "tcp.connection_timeout_secs",
                "must be greater than 0",
            ));
        }

        self.index_resolver()?;
        self.message_parser()?;
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> SyslogError {
    SyslogError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// syslog 설정 빌더
#[derive(Default)]
pub struct SyslogConfigBuilder {
    config: SyslogConfig,
}

impl SyslogConfigBuilder {
    /// 기본값으로 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// 포트 범위 명세를 설정합니다.
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.config.port = port.into();
        self
    }

    pub fn udp_enabled(mut self, enabled: bool) -> Self {
        self.config.udp_enabled = enabled;
        self
    }

    pub fn tcp_enabled(mut self, enabled: bool) -> Self {
        self.config.tcp_enabled = enabled;
        self
    }

    pub fn bulk_actions(mut self, actions: usize) -> Self {
        self.config.bulk_actions = actions;
        self
    }

    pub fn bulk_size_bytes(mut self, bytes: u64) -> Self {
        self.config.bulk_size_bytes = bytes;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn concurrent_requests(mut self, requests: usize) -> Self {
        self.config.concurrent_requests = requests;
        self
    }

    pub fn receive_buffer_size(mut self, bytes: usize) -> Self {
        self.config.receive_buffer_size = bytes;
        self
    }

    pub fn receive_predictor_size(mut self, bytes: usize) -> Self {
        self.config.receive_predictor_size = bytes;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 인덱스 이름과 시간 템플릿 여부를 설정합니다.
    pub fn index(mut self, index: impl Into<String>, is_timewindow: bool) -> Self {
        self.config.index = index.into();
        self.config.index_is_timewindow = is_timewindow;
        self
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.config.doc_type = doc_type.into();
        self
    }

    /// 추출 패턴을 하나 추가합니다.
    pub fn pattern(mut self, field: impl Into<String>, regex: impl Into<String>) -> Self {
        self.config.patterns.insert(field.into(), regex.into());
        self
    }

    /// 논리 역할의 출력 필드명을 재정의합니다.
    pub fn field_name(mut self, role: impl Into<String>, name: impl Into<String>) -> Self {
        self.config.field_names.insert(role.into(), name.into());
        self
    }

    pub fn tcp(mut self, tcp: TcpOptions) -> Self {
        self.config.tcp = tcp;
        self
    }

    /// 설정을 검증하고 `SyslogConfig`를 생성합니다.
    pub fn build(self) -> Result<SyslogConfig, SyslogError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SyslogConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_converts_units() {
        let core = SyslogSection {
            flush_interval_ms: 250,
            receive_buffer_size: 4096,
            receive_predictor_size: None,
            ..Default::default()
        };
        let config = SyslogConfig::from_core(&core);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.receive_predictor_size, 4096);
        assert_eq!(config.tcp.connection_timeout, Duration::from_secs(300));
    }

    #[test]
    fn udp_buffer_is_capped_at_datagram_size() {
        let config = SyslogConfig::default();
        assert_eq!(config.udp_buffer_size(), MAX_DATAGRAM_SIZE);

        let small = SyslogConfigBuilder::new()
            .receive_predictor_size(2048)
            .build()
            .unwrap();
        assert_eq!(small.udp_buffer_size(), 2048);
    }

    #[test]
    fn builder_rejects_zero_bulk_actions() {
        let err = SyslogConfigBuilder::new().bulk_actions(0).build().unwrap_err();
        assert!(matches!(err, SyslogError::Config { ref field, .. } if field == "bulk_actions"));
    }

    #[test]
    fn builder_rejects_out_of_range_flush_interval() {
        assert!(SyslogConfigBuilder::new()
            .flush_interval(Duration::ZERO)
            .build()
            .is_err());
        assert!(SyslogConfigBuilder::new()
            .flush_interval(Duration::from_secs(7200))
            .build()
            .is_err());
    }

    #[test]
    fn builder_rejects_bad_port_spec() {
        assert!(SyslogConfigBuilder::new().port("abc").build().is_err());
        assert!(SyslogConfigBuilder::new().port("9600-9500").build().is_err());
    }

    #[test]
    fn builder_rejects_pattern_without_group() {
        let result = SyslogConfigBuilder::new().pattern("code", r"\d+").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_unknown_field_role() {
        let result = SyslogConfigBuilder::new().field_name("pid", "p").build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_no_transport() {
        let result = SyslogConfigBuilder::new()
            .udp_enabled(false)
            .tcp_enabled(false)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn message_parser_applies_field_names() {
        let config = SyslogConfigBuilder::new()
            .field_name("host", "hostname")
            .build()
            .unwrap();
        let parser = config.message_parser().unwrap();
        assert_eq!(parser.field_names().host, "hostname");
    }
}

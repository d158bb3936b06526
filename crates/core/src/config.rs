//! 설정 관리: ironlog.toml 파싱 및 런타임 설정
//!
//! [`IronlogConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONLOG_SYSLOG_PORT=514` 형식)
//! 3. 설정 파일 (`ironlog.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironlog_core::error::IronlogError> {
//! use ironlog_core::config::IronlogConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronlogConfig::load("ironlog.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronlogConfig::parse("[syslog]\nport = \"514\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronlogError};

/// 필드 이름 맵에서 허용되는 논리 역할
pub const FIELD_ROLES: [&str; 5] = ["host", "facility", "severity", "timestamp", "message"];

/// Ironlog 통합 설정
///
/// `ironlog.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronlogConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// syslog 수신/배치 설정
    #[serde(default)]
    pub syslog: SyslogSection,
    /// 문서 싱크 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IronlogConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronlogError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronlogError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronlogError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronlogError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronlogError> {
        toml::from_str(toml_str).map_err(|e| {
            IronlogError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONLOG_{SECTION}_{FIELD}`
    /// 예: `IRONLOG_SYSLOG_BULK_ACTIONS=500`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONLOG_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONLOG_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "IRONLOG_GENERAL_PID_FILE");

        // Syslog
        override_bool(&mut self.syslog.enabled, "IRONLOG_SYSLOG_ENABLED");
        override_string(&mut self.syslog.host, "IRONLOG_SYSLOG_HOST");
        override_string(&mut self.syslog.port, "IRONLOG_SYSLOG_PORT");
        override_bool(&mut self.syslog.udp_enabled, "IRONLOG_SYSLOG_UDP_ENABLED");
        override_bool(&mut self.syslog.tcp_enabled, "IRONLOG_SYSLOG_TCP_ENABLED");
        override_usize(&mut self.syslog.bulk_actions, "IRONLOG_SYSLOG_BULK_ACTIONS");
        override_u64(
            &mut self.syslog.bulk_size_bytes,
            "IRONLOG_SYSLOG_BULK_SIZE_BYTES",
        );
        override_u64(
            &mut self.syslog.flush_interval_ms,
            "IRONLOG_SYSLOG_FLUSH_INTERVAL_MS",
        );
        override_usize(
            &mut self.syslog.concurrent_requests,
            "IRONLOG_SYSLOG_CONCURRENT_REQUESTS",
        );
        override_usize(
            &mut self.syslog.receive_buffer_size,
            "IRONLOG_SYSLOG_RECEIVE_BUFFER_SIZE",
        );
        override_usize(
            &mut self.syslog.queue_capacity,
            "IRONLOG_SYSLOG_QUEUE_CAPACITY",
        );
        override_string(&mut self.syslog.index, "IRONLOG_SYSLOG_INDEX");
        override_bool(
            &mut self.syslog.index_is_timewindow,
            "IRONLOG_SYSLOG_INDEX_IS_TIMEWINDOW",
        );
        override_string(&mut self.syslog.doc_type, "IRONLOG_SYSLOG_DOC_TYPE");

        // Sink
        override_string(&mut self.sink.kind, "IRONLOG_SINK_KIND");
        override_string(&mut self.sink.path, "IRONLOG_SINK_PATH");

        // Metrics
        override_bool(&mut self.metrics.enabled, "IRONLOG_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "IRONLOG_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "IRONLOG_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 포트 범위 문법, 정규식, 인덱스 템플릿 같은 syslog 전용 검증은
    /// `ironlog-syslog`의 `SyslogConfig::validate()`에서 수행합니다.
    pub fn validate(&self) -> Result<(), IronlogError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.syslog.enabled {
            if self.syslog.host.trim().is_empty() {
                return Err(invalid("syslog.host", "must not be empty".to_owned()));
            }
            if self.syslog.port.trim().is_empty() {
                return Err(invalid("syslog.port", "must not be empty".to_owned()));
            }
            if !self.syslog.udp_enabled && !self.syslog.tcp_enabled {
                return Err(invalid(
                    "syslog.udp_enabled",
                    "at least one of udp_enabled/tcp_enabled must be true".to_owned(),
                ));
            }
            if self.syslog.bulk_actions == 0 {
                return Err(invalid("syslog.bulk_actions", "must be greater than 0".to_owned()));
            }
            if self.syslog.bulk_size_bytes == 0 {
                return Err(invalid(
                    "syslog.bulk_size_bytes",
                    "must be greater than 0".to_owned(),
                ));
            }
            if self.syslog.flush_interval_ms == 0 {
                return Err(invalid(
                    "syslog.flush_interval_ms",
                    "must be greater than 0".to_owned(),
                ));
            }
            if self.syslog.queue_capacity == 0 {
                return Err(invalid(
                    "syslog.queue_capacity",
                    "must be greater than 0".to_owned(),
                ));
            }
            if self.syslog.index.is_empty() {
                return Err(invalid("syslog.index", "must not be empty".to_owned()));
            }
            for role in self.syslog.field_names.keys() {
                if !FIELD_ROLES.contains(&role.as_str()) {
                    return Err(invalid(
                        "syslog.field_names",
                        format!(
                            "unknown role '{}', expected one of: {}",
                            role,
                            FIELD_ROLES.join(", ")
                        ),
                    ));
                }
            }
        }

        // sink 검증
        let valid_sinks = ["stdout", "file"];
        if !valid_sinks.contains(&self.sink.kind.as_str()) {
            return Err(invalid(
                "sink.kind",
                format!("must be one of: {}", valid_sinks.join(", ")),
            ));
        }
        if self.sink.kind == "file" && self.sink.path.is_empty() {
            return Err(invalid(
                "sink.path",
                "path must not be empty when sink.kind is 'file'".to_owned(),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be 1-65535".to_owned()));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> IronlogError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// syslog 수신 및 배치 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogSection {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 호스트
    pub host: String,
    /// 포트 또는 포트 범위 ("514", "9500-9600", "514,1514")
    pub port: String,
    /// UDP 수신 활성화
    pub udp_enabled: bool,
    /// TCP 수신 활성화
    pub tcp_enabled: bool,
    /// 플러시당 최대 레코드 수
    pub bulk_actions: usize,
    /// 플러시당 최대 누적 바이트
    pub bulk_size_bytes: u64,
    /// 주기적 플러시 간격 (밀리초)
    pub flush_interval_ms: u64,
    /// 동시 진행 가능한 플러시 수 (0이면 배치 태스크에서 직접 플러시)
    pub concurrent_requests: usize,
    /// 소켓 수신 버퍼 크기 (SO_RCVBUF, 바이트)
    pub receive_buffer_size: usize,
    /// 수신 버퍼 예측 크기 (미지정 시 receive_buffer_size)
    pub receive_predictor_size: Option<usize>,
    /// 리스너와 배치 작성기 사이 작업 큐 용량
    pub queue_capacity: usize,
    /// 인덱스 이름 또는 시간 템플릿 (chrono strftime)
    pub index: String,
    /// `index`를 시간 템플릿으로 해석할지 여부
    pub index_is_timewindow: bool,
    /// 문서 타입 태그
    pub doc_type: String,
    /// 출력 필드명 → 정규식 (첫 번째 캡처 그룹이 값)
    pub patterns: BTreeMap<String, String>,
    /// 논리 역할 → 출력 필드명
    pub field_names: BTreeMap<String, String>,
    /// TCP 전용 설정
    #[serde(default)]
    pub tcp: TcpSection,
}

impl Default for SyslogSection {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_owned(),
            port: "9500-9600".to_owned(),
            udp_enabled: true,
            tcp_enabled: true,
            bulk_actions: 1000,
            bulk_size_bytes: 5 * 1024 * 1024, // 5MB
            flush_interval_ms: 5_000,
            concurrent_requests: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
            receive_buffer_size: 10 * 1024 * 1024, // 10MB
            receive_predictor_size: None,
            queue_capacity: 10_000,
            index: "syslog-%Y.%m.%d".to_owned(),
            index_is_timewindow: true,
            doc_type: "syslog".to_owned(),
            patterns: BTreeMap::new(),
            field_names: BTreeMap::new(),
            tcp: TcpSection::default(),
        }
    }
}

/// TCP 리스너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpSection {
    /// SO_REUSEADDR
    pub reuse_address: bool,
    /// TCP_NODELAY
    pub no_delay: bool,
    /// SO_KEEPALIVE
    pub keep_alive: bool,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 메시지 크기 (바이트)
    pub max_message_size: usize,
    /// 유휴 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for TcpSection {
    fn default() -> Self {
        Self {
            reuse_address: true,
            no_delay: true,
            keep_alive: true,
            max_connections: 256,
            max_message_size: 1024 * 1024, // 1MB
            connection_timeout_secs: 300,
        }
    }
}

/// 문서 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// 싱크 종류 (stdout, file)
    pub kind: String,
    /// 파일 싱크 경로
    pub path: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: "stdout".to_owned(),
            path: String::new(),
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = IronlogConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.syslog.port, "9500-9600");
        assert_eq!(config.syslog.bulk_actions, 1000);
        assert_eq!(config.syslog.bulk_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.syslog.flush_interval_ms, 5000);
        assert!(config.syslog.concurrent_requests >= 1);
        assert!(config.syslog.index_is_timewindow);
        assert_eq!(config.sink.kind, "stdout");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        IronlogConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = IronlogConfig::parse("").unwrap();
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.syslog.doc_type, "syslog");
        assert!(config.syslog.tcp.no_delay);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[syslog]
port = "5514"
bulk_actions = 10

[syslog.patterns]
error_code = 'error_code: (\d+)'

[syslog.field_names]
host = "hostname"

[syslog.tcp]
max_connections = 8
"#;
        let config = IronlogConfig::parse(toml).unwrap();
        assert_eq!(config.syslog.port, "5514");
        assert_eq!(config.syslog.bulk_actions, 10);
        // bulk_size_bytes는 기본값 유지
        assert_eq!(config.syslog.bulk_size_bytes, 5 * 1024 * 1024);
        assert_eq!(
            config.syslog.patterns.get("error_code").map(String::as_str),
            Some(r"error_code: (\d+)")
        );
        assert_eq!(
            config.syslog.field_names.get("host").map(String::as_str),
            Some("hostname")
        );
        assert_eq!(config.syslog.tcp.max_connections, 8);
        assert!(config.syslog.tcp.keep_alive);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = IronlogConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            IronlogError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = IronlogConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_zero_bulk_actions() {
        let mut config = IronlogConfig::default();
        config.syslog.bulk_actions = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bulk_actions"));
    }

    #[test]
    fn validate_skips_syslog_checks_when_disabled() {
        let mut config = IronlogConfig::default();
        config.syslog.enabled = false;
        config.syslog.bulk_actions = 0;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_both_transports_disabled() {
        let mut config = IronlogConfig::default();
        config.syslog.udp_enabled = false;
        config.syslog.tcp_enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_field_role() {
        let mut config = IronlogConfig::default();
        config
            .syslog
            .field_names
            .insert("program".to_owned(), "prog".to_owned());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("program"));
    }

    #[test]
    fn validate_rejects_file_sink_without_path() {
        let mut config = IronlogConfig::default();
        config.sink.kind = "file".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sink.path"));
    }

    #[test]
    #[serial]
    fn env_override_applies_to_syslog_section() {
        let mut config = IronlogConfig::default();
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe {
            std::env::set_var("IRONLOG_SYSLOG_PORT", "1514");
            std::env::set_var("IRONLOG_SYSLOG_BULK_ACTIONS", "25");
        }
        config.apply_env_overrides();
        assert_eq!(config.syslog.port, "1514");
        assert_eq!(config.syslog.bulk_actions, 25);
        unsafe {
            std::env::remove_var("IRONLOG_SYSLOG_PORT");
            std::env::remove_var("IRONLOG_SYSLOG_BULK_ACTIONS");
        }
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = true;
        // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_IRONLOG_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_IRONLOG_BOOL_BAD");
        assert!(val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_IRONLOG_BOOL_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 7u64;
        override_u64(&mut val, "TEST_IRONLOG_NONEXISTENT_12345");
        assert_eq!(val, 7);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = IronlogConfig::default();
        config
            .syslog
            .patterns
            .insert("pid".to_owned(), r"\[(\d+)\]".to_owned());
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = IronlogConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.syslog.port, config.syslog.port);
        assert_eq!(parsed.syslog.patterns, config.syslog.patterns);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = IronlogConfig::from_file("/nonexistent/path/ironlog.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IronlogError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}

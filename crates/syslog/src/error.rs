//! syslog 파이프라인 에러 타입
//!
//! [`SyslogError`]는 설정, 바인딩, 채널 통신 등 파이프라인 내부의 에러를 표현합니다.
//! `From<SyslogError> for IronlogError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 메시지 단위 디코딩 실패는 [`MalformedMessage`](crate::parser::MalformedMessage),
//! 싱크 커밋 실패는 [`SinkError`](crate::sink::SinkError)로 따로 표현하며,
//! 배치 작성기가 기록만 하고 호출자에게 전파하지 않습니다.

use ironlog_core::error::{ConfigError, IronlogError, PipelineError};

/// syslog 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SyslogError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 포트 범위의 모든 후보에 바인드 실패
    #[error("no port available for {protocol} in range [{ports}]: {source}")]
    NoPortAvailable {
        /// 전송 프로토콜 (udp, tcp)
        protocol: &'static str,
        /// 설정된 포트 범위
        ports: String,
        /// 마지막 바인드 시도의 에러
        #[source]
        source: std::io::Error,
    },

    /// 호스트 이름 해석 실패
    #[error("failed to resolve host '{host}': {reason}")]
    Resolve {
        /// 설정된 호스트
        host: String,
        /// 실패 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<SyslogError> for IronlogError {
    fn from(err: SyslogError) -> Self {
        match err {
            SyslogError::Config { field, reason } => {
                IronlogError::Config(ConfigError::InvalidValue { field, reason })
            }
            SyslogError::Channel(reason) => {
                IronlogError::Pipeline(PipelineError::ChannelSend(reason))
            }
            other => IronlogError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

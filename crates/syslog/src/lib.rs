#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`listener`]: UDP/TCP 리스너, 포트 범위 바인드, 공통 수신 처리기
//! - [`parser`]: syslog 헤더 디코더, 타임스탬프 캐시, 내장 JSON 파서, 패턴 추출
//! - [`index`]: 고정 또는 시간 템플릿 기반 인덱스 이름 결정
//! - [`batch`]: 대기 중인 색인 요청 묶음
//! - [`writer`]: 임계값/타이머 기반 배치 작성기와 동시 커밋 제한
//! - [`sink`]: 문서 싱크 trait과 벌크 요청/응답 타입
//! - [`service`]: 전체 서비스 생명주기 (Pipeline trait 구현)
//! - [`config`]: syslog 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! UDP/TCP listeners -> MessageParser -> document -> BatchWriter -> DocumentSink
//!        |                  |                          |
//!   PortRange bind    RFC 3164/5424, @cee:     count/size/interval flush
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod index;
pub mod service;
pub mod sink;
pub mod writer;

pub mod listener;
pub mod parser;

// --- 주요 타입 re-export ---

// 서비스
pub use service::SyslogService;

// 설정
pub use config::{SyslogConfig, SyslogConfigBuilder, TcpOptions};

// 에러
pub use error::SyslogError;

// 파서
pub use parser::{
    EmbeddedJsonParser, Facility, FieldNames, JsonError, JsonValue, MalformedMessage,
    MessageParser, PatternSet, Severity, SyslogRecord, TimestampCache,
};

// 리스너
pub use listener::{Envelope, Ingest, PortRange, Protocol, TcpSyslogListener, UdpSyslogListener};

// 배치 작성
pub use batch::Batch;
pub use index::IndexNameResolver;
pub use writer::{BatchWriter, WriterHandle, WriterSettings, WriterStats};

// 싱크
pub use sink::{BulkItemResponse, BulkRequest, BulkResponse, DocumentSink, IndexRequest, SinkError};

//! syslog 디코딩 모듈 -- PRI, RFC 3164 / RFC 5424 타임스탬프, 호스트명, 본문
//!
//! [`MessageParser`]가 원시 텍스트 한 줄을 [`SyslogRecord`]로 변환합니다.
//! 구조적 위반은 [`MalformedMessage`]로 보고되며, 리스너는 해당 메시지만 버립니다.
//!
//! # 구성
//! - [`facility`], [`severity`]: 고정 코드 ↔ 레이블 테이블
//! - [`timestamp`]: RFC 5424 접두사 캐시와 두 타임스탬프 형식의 해석
//! - [`json`]: `@cee:` 페이로드용 스트리밍 JSON 디코더
//! - [`message`]: 위 요소를 조합하는 메시지 파서
//!
//! # 사용 예시
//! ```
//! use ironlog_syslog::parser::{Facility, MessageParser, Severity};
//!
//! let parser = MessageParser::new();
//! let record = parser
//!     .parse("<34>Oct 11 22:14:15 mymachine su: 'su root' failed")
//!     .unwrap();
//! assert_eq!(record.facility, Facility::Auth);
//! assert_eq!(record.severity, Severity::Critical);
//! assert_eq!(record.host, "mymachine");
//! ```

pub mod facility;
pub mod json;
pub mod message;
pub mod severity;
pub mod timestamp;

pub use facility::Facility;
pub use json::{EmbeddedJsonParser, JsonError, JsonValue};
pub use message::{FieldNames, MalformedMessage, MessageParser, PatternSet, SyslogRecord};
pub use severity::Severity;
pub use timestamp::TimestampCache;

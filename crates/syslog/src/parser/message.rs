//! syslog 메시지 파서 -- `<PRI>[1 ]TIMESTAMP HOSTNAME MESSAGE`
//!
//! # 처리 순서
//! 1. PRI: `<`로 시작하고 6자 이내에 `>`가 있어야 함. facility = pri / 8, severity = pri % 8
//! 2. 버전 표식 `"1 "`가 있으면 건너뜀 (RFC 5424)
//! 3. 타임스탬프: `-`는 현재 시각, 대문자로 시작하면 RFC 3164 (15자), 그 외는 RFC 5424
//! 4. 호스트명: 다음 공백까지
//! 5. 본문: 호스트명 뒤 전체. 뒤에 아무것도 없으면 원본 전체
//! 6. 본문이 `@cee:`로 시작하면 표식을 떼고 JSON 객체 디코딩을 시도 (실패는 무시)
//! 7. 추출 패턴마다 첫 번째 캡처 그룹을 필드로 추가
//!
//! 신뢰할 수 없는 입력에서 패닉하지 않도록 모든 부분 문자열은 `str::get`으로 자릅니다.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::facility::Facility;
use super::json;
use super::severity::Severity;
use super::timestamp::{self, RFC3164_LEN, TimestampCache};
use crate::error::SyslogError;

/// 구조화 페이로드 표식
pub const CEE_MARKER: &str = "@cee:";

/// PRI 닫는 괄호 `>`의 최대 위치
const MAX_PRI_END: usize = 6;

/// 단일 메시지 디코딩 실패
///
/// `Display`는 사람이 읽을 수 있는 사유이고, [`fragment`](Self::fragment)는
/// 문제가 된 부분 문자열입니다. 리스너는 이 에러를 기록하고 메시지를 버립니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    /// `<` 또는 `>`를 찾지 못함
    #[error("bad format: invalid priority: cannot find {bracket:?} bracket")]
    PriorityBracketMissing { bracket: char, fragment: String },

    /// 괄호 안이 숫자가 아님
    #[error("bad format: invalid priority: not a number")]
    InvalidPriority { fragment: String },

    #[error("bad format: invalid facility code {code}")]
    InvalidFacility { code: u32, fragment: String },

    #[error("bad format: invalid severity code {code}")]
    InvalidSeverity { code: u32, fragment: String },

    #[error("bad format: no data except priority")]
    NoDataAfterPriority { fragment: String },

    #[error("bad syslog format (missing hostname)")]
    MissingHostname { fragment: String },

    #[error("bad timestamp format")]
    BadTimestampFormat { fragment: String },

    #[error("bad format: not a valid RFC5424 timestamp")]
    BadTimestamp { fragment: String },

    #[error("bad format: invalid timestamp (fractional portion)")]
    BadFractionalSeconds { fragment: String },

    #[error("bad format: invalid timezone")]
    BadTimezone { fragment: String },
}

impl MalformedMessage {
    /// 문제가 된 부분 문자열
    pub fn fragment(&self) -> &str {
        match self {
            Self::PriorityBracketMissing { fragment, .. }
            | Self::InvalidPriority { fragment }
            | Self::InvalidFacility { fragment, .. }
            | Self::InvalidSeverity { fragment, .. }
            | Self::NoDataAfterPriority { fragment }
            | Self::MissingHostname { fragment }
            | Self::BadTimestampFormat { fragment }
            | Self::BadTimestamp { fragment }
            | Self::BadFractionalSeconds { fragment }
            | Self::BadTimezone { fragment } => fragment,
        }
    }
}

/// 다섯 가지 논리 필드 역할의 출력 필드명
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    pub host: String,
    pub facility: String,
    pub severity: String,
    pub timestamp: String,
    pub message: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            host: "host".to_owned(),
            facility: "facility".to_owned(),
            severity: "severity".to_owned(),
            timestamp: "timestamp".to_owned(),
            message: "message".to_owned(),
        }
    }
}

impl FieldNames {
    /// 기본값(항등 매핑)에 역할 → 출력명 재정의를 적용합니다.
    ///
    /// 알 수 없는 역할이나 빈 출력명은 설정 에러입니다.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, SyslogError> {
        let mut names = Self::default();
        for (role, name) in overrides {
            if name.is_empty() {
                return Err(SyslogError::Config {
                    field: format!("field_names.{role}"),
                    reason: "output field name must not be empty".to_owned(),
                });
            }
            let slot = match role.as_str() {
                "host" => &mut names.host,
                "facility" => &mut names.facility,
                "severity" => &mut names.severity,
                "timestamp" => &mut names.timestamp,
                "message" => &mut names.message,
                other => {
                    return Err(SyslogError::Config {
                        field: format!("field_names.{other}"),
                        reason: "unknown field role (expected host, facility, severity, timestamp or message)"
                            .to_owned(),
                    });
                }
            };
            slot.clone_from(name);
        }
        Ok(names)
    }
}

/// 출력 필드명 → 정규식 추출 패턴 목록
///
/// 각 정규식은 캡처 그룹을 최소 하나 가져야 하며, 첫 번째 그룹이 필드 값이 됩니다.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<(String, Regex)>,
}

impl PatternSet {
    /// 필드명 → 정규식 문자열 맵에서 패턴을 컴파일합니다.
    pub fn compile(patterns: &BTreeMap<String, String>) -> Result<Self, SyslogError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for (field, pattern) in patterns {
            let regex = Regex::new(pattern)?;
            if regex.captures_len() < 2 {
                return Err(SyslogError::Config {
                    field: format!("patterns.{field}"),
                    reason: format!("pattern '{pattern}' has no capture group"),
                });
            }
            compiled.push((field.clone(), regex));
        }
        Ok(Self { patterns: compiled })
    }

    /// 등록된 패턴 수
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// 패턴이 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 본문에 패턴을 적용합니다. 매치가 없거나 첫 그룹이 참여하지 않은 패턴은 생략됩니다.
    pub fn extract(&self, body: &str) -> Vec<(String, String)> {
        self.patterns
            .iter()
            .filter_map(|(field, regex)| {
                let value = regex.captures(body)?.get(1)?.as_str();
                Some((field.clone(), value.to_owned()))
            })
            .collect()
    }
}

/// 디코딩된 syslog 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct SyslogRecord {
    pub facility: Facility,
    pub severity: Severity,
    /// UTC epoch 밀리초
    pub timestamp_millis: i64,
    pub host: String,
    /// 본문 (`@cee:` 표식이 있었다면 제거된 상태)
    pub message: String,
    /// `@cee:` JSON 객체에서 병합된 필드 (삽입 순서 유지)
    pub structured: Map<String, Value>,
    /// 추출 패턴으로 얻은 필드
    pub extracted: Vec<(String, String)>,
}

impl SyslogRecord {
    /// 출력용 타임스탬프 (`2003-10-11T22:14:15.003Z`)
    pub fn formatted_timestamp(&self) -> String {
        timestamp::format_millis(self.timestamp_millis)
    }

    /// 필드명 매핑을 적용해 문서 필드를 `doc`에 이어 붙입니다.
    ///
    /// 순서: facility, severity, timestamp, host, 병합된 JSON 필드, message, 패턴 필드
    pub fn write_fields(&self, names: &FieldNames, doc: &mut Map<String, Value>) {
        doc.insert(
            names.facility.clone(),
            Value::String(self.facility.label().to_owned()),
        );
        doc.insert(
            names.severity.clone(),
            Value::String(self.severity.label().to_owned()),
        );
        doc.insert(
            names.timestamp.clone(),
            Value::String(self.formatted_timestamp()),
        );
        doc.insert(names.host.clone(), Value::String(self.host.clone()));
        for (key, value) in &self.structured {
            doc.insert(key.clone(), value.clone());
        }
        doc.insert(names.message.clone(), Value::String(self.message.clone()));
        for (field, value) in &self.extracted {
            doc.insert(field.clone(), Value::String(value.clone()));
        }
    }
}

/// syslog 메시지 파서
///
/// 필드명과 패턴은 생성 시점에 고정되며 이후 변경되지 않으므로,
/// 여러 리스너 태스크가 `Arc<MessageParser>`로 락 없이 공유합니다.
/// 내부 [`TimestampCache`]만 동기화됩니다.
pub struct MessageParser {
    field_names: FieldNames,
    patterns: PatternSet,
    cache: TimestampCache,
}

impl MessageParser {
    /// 기본 필드명, 패턴 없음, 기본 캐시 용량으로 파서를 생성합니다.
    pub fn new() -> Self {
        Self {
            field_names: FieldNames::default(),
            patterns: PatternSet::default(),
            cache: TimestampCache::default(),
        }
    }

    /// 출력 필드명을 설정합니다.
    pub fn with_field_names(mut self, field_names: FieldNames) -> Self {
        self.field_names = field_names;
        self
    }

    /// 추출 패턴을 설정합니다.
    pub fn with_patterns(mut self, patterns: PatternSet) -> Self {
        self.patterns = patterns;
        self
    }

    /// 타임스탬프 캐시 용량을 설정합니다.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = TimestampCache::new(capacity);
        self
    }

    pub fn field_names(&self) -> &FieldNames {
        &self.field_names
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn cache(&self) -> &TimestampCache {
        &self.cache
    }

    /// 현재 시각 기준으로 메시지를 파싱합니다.
    pub fn parse(&self, raw: &str) -> Result<SyslogRecord, MalformedMessage> {
        self.parse_at(raw, Utc::now())
    }

    /// `now`를 현재 시각으로 삼아 메시지를 파싱합니다.
    ///
    /// `now`는 `-` 타임스탬프의 값이자 RFC 3164 연도 추정의 기준입니다.
    pub fn parse_at(&self, raw: &str, now: DateTime<Utc>) -> Result<SyslogRecord, MalformedMessage> {
        let whole = || raw.to_owned();
        let bytes = raw.as_bytes();
        let len = bytes.len();

        // 1. PRI
        if bytes.first() != Some(&b'<') {
            return Err(MalformedMessage::PriorityBracketMissing {
                bracket: '<',
                fragment: whole(),
            });
        }
        let end = match raw.find('>') {
            Some(end) if end <= MAX_PRI_END => end,
            _ => {
                return Err(MalformedMessage::PriorityBracketMissing {
                    bracket: '>',
                    fragment: whole(),
                });
            }
        };
        let pri_text = raw.get(1..end).unwrap_or_default();
        let pri: u32 = pri_text
            .parse()
            .map_err(|_| MalformedMessage::InvalidPriority {
                fragment: pri_text.to_owned(),
            })?;
        let facility =
            Facility::from_code(pri / 8).ok_or_else(|| MalformedMessage::InvalidFacility {
                code: pri / 8,
                fragment: pri_text.to_owned(),
            })?;
        let severity =
            Severity::from_code(pri % 8).ok_or_else(|| MalformedMessage::InvalidSeverity {
                code: pri % 8,
                fragment: pri_text.to_owned(),
            })?;
        if len <= end + 1 {
            return Err(MalformedMessage::NoDataAfterPriority { fragment: whole() });
        }
        let mut pos = end + 1;

        // 2. 버전 표식
        if len > pos + 2 && &bytes[pos..pos + 2] == b"1 " {
            pos += 2;
        }

        // 3. 타임스탬프
        let timestamp_millis = match bytes[pos] {
            b'-' => {
                if len <= pos + 2 {
                    return Err(MalformedMessage::MissingHostname { fragment: whole() });
                }
                pos += 2;
                now.timestamp_millis()
            }
            b'A'..=b'Z' => {
                if len <= pos + RFC3164_LEN {
                    return Err(MalformedMessage::BadTimestampFormat { fragment: whole() });
                }
                let field = raw.get(pos..pos + RFC3164_LEN).ok_or_else(|| {
                    MalformedMessage::BadTimestampFormat { fragment: whole() }
                })?;
                pos += RFC3164_LEN + 1;
                timestamp::resolve_rfc3164(field, now)
            }
            _ => {
                let sp = find_space(bytes, pos)
                    .ok_or_else(|| MalformedMessage::BadTimestampFormat { fragment: whole() })?;
                let field = raw
                    .get(pos..sp)
                    .ok_or_else(|| MalformedMessage::BadTimestampFormat { fragment: whole() })?;
                let millis = timestamp::parse_rfc5424(field, &self.cache)?;
                pos = sp + 1;
                millis
            }
        };

        // 4. 호스트명
        let ns = find_space(bytes, pos)
            .ok_or_else(|| MalformedMessage::MissingHostname { fragment: whole() })?;
        let host = raw
            .get(pos..ns)
            .ok_or_else(|| MalformedMessage::MissingHostname { fragment: whole() })?;

        // 5. 본문 (공백은 ASCII이므로 ns + 1은 항상 문자 경계)
        let mut body = if len > ns + 1 { &raw[ns + 1..] } else { raw };

        // 6. 구조화 페이로드
        let mut structured = Map::new();
        if let Some(payload) = body.strip_prefix(CEE_MARKER) {
            body = payload;
            if let Ok(json::JsonValue::Object(entries)) = json::parse_str(payload) {
                for (key, value) in entries {
                    structured.insert(key, value.into());
                }
            }
        }

        // 7. 추출 패턴
        let extracted = self.patterns.extract(body);

        Ok(SyslogRecord {
            facility,
            severity,
            timestamp_millis,
            host: host.to_owned(),
            message: body.to_owned(),
            structured,
            extracted,
        })
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_space(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|b| *b == b' ')
        .map(|offset| from + offset)
}

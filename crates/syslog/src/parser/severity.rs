//! syslog severity 코드 테이블 (0-7, 0이 가장 심각)

use std::fmt;

/// syslog severity
///
/// `Ord`는 숫자 코드 기준이므로 `Emergency < Debug`입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

const SEVERITIES: [Severity; 8] = [
    Severity::Emergency,
    Severity::Alert,
    Severity::Critical,
    Severity::Error,
    Severity::Warning,
    Severity::Notice,
    Severity::Informational,
    Severity::Debug,
];

const LABELS: [&str; 8] = [
    "EMERGENCY",
    "ALERT",
    "CRITICAL",
    "ERROR",
    "WARNING",
    "NOTICE",
    "INFORMATIONAL",
    "DEBUG",
];

impl Severity {
    /// 숫자 코드로 severity를 찾습니다. 범위(0-7)를 벗어나면 `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| SEVERITIES.get(idx).copied())
    }

    /// 레이블로 severity를 찾습니다. 빈 문자열이나 알 수 없는 레이블은 `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        LABELS
            .iter()
            .position(|l| *l == label)
            .map(|idx| SEVERITIES[idx])
    }

    /// 숫자 코드
    pub fn code(self) -> u8 {
        self as u8
    }

    /// 출력용 레이블
    pub fn label(self) -> &'static str {
        LABELS[self as usize]
    }

    /// 전체 severity 목록 (코드 순)
    pub fn all() -> &'static [Severity] {
        &SEVERITIES
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

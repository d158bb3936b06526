//! syslog facility 코드 테이블 (0-23)

use std::fmt;

/// syslog facility
///
/// 판별값이 곧 RFC 5424 숫자 코드입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Facility {
    Kernel = 0,
    User = 1,
    Mail = 2,
    Daemon = 3,
    Auth = 4,
    Syslog = 5,
    Lpr = 6,
    News = 7,
    Uucp = 8,
    Cron = 9,
    AuthPriv = 10,
    Ftp = 11,
    Ntp = 12,
    Audit = 13,
    Alert = 14,
    Clock = 15,
    Local0 = 16,
    Local1 = 17,
    Local2 = 18,
    Local3 = 19,
    Local4 = 20,
    Local5 = 21,
    Local6 = 22,
    Local7 = 23,
}

/// 코드 순서대로 정렬된 전체 facility
const FACILITIES: [Facility; 24] = [
    Facility::Kernel,
    Facility::User,
    Facility::Mail,
    Facility::Daemon,
    Facility::Auth,
    Facility::Syslog,
    Facility::Lpr,
    Facility::News,
    Facility::Uucp,
    Facility::Cron,
    Facility::AuthPriv,
    Facility::Ftp,
    Facility::Ntp,
    Facility::Audit,
    Facility::Alert,
    Facility::Clock,
    Facility::Local0,
    Facility::Local1,
    Facility::Local2,
    Facility::Local3,
    Facility::Local4,
    Facility::Local5,
    Facility::Local6,
    Facility::Local7,
];

const LABELS: [&str; 24] = [
    "KERNEL", "USER", "MAIL", "DAEMON", "AUTH", "SYSLOG", "LPR", "NEWS", "UUCP", "CRON",
    "AUTHPRIV", "FTP", "NTP", "AUDIT", "ALERT", "CLOCK", "LOCAL0", "LOCAL1", "LOCAL2", "LOCAL3",
    "LOCAL4", "LOCAL5", "LOCAL6", "LOCAL7",
];

impl Facility {
    /// 숫자 코드로 facility를 찾습니다. 범위(0-23)를 벗어나면 `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| FACILITIES.get(idx).copied())
    }

    /// 레이블로 facility를 찾습니다 (대소문자 구분).
    pub fn from_label(label: &str) -> Option<Self> {
        LABELS
            .iter()
            .position(|l| *l == label)
            .map(|idx| FACILITIES[idx])
    }

    /// 숫자 코드
    pub fn code(self) -> u8 {
        self as u8
    }

    /// 출력용 레이블
    pub fn label(self) -> &'static str {
        LABELS[self as usize]
    }

    /// 전체 facility 목록 (코드 순)
    pub fn all() -> &'static [Facility] {
        &FACILITIES
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

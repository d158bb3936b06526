//! 문서 대상 인덱스 이름 결정
//!
//! 설정의 `index_is_timewindow` 플래그로 고정 이름과 시간 템플릿을 명시적으로 구분합니다.
//! 시간 템플릿은 chrono strftime 형식(`syslog-%Y.%m.%d`)이며 UTC 기준으로 평가됩니다.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::error::SyslogError;

/// 인덱스 이름 결정기
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexNameResolver {
    /// 항상 같은 이름
    Static(String),
    /// 현재 시각으로 포맷하는 템플릿
    TimeWindow(String),
}

impl IndexNameResolver {
    /// 이름(또는 템플릿)과 시간 템플릿 여부로 결정기를 생성합니다.
    ///
    /// 템플릿에 해석할 수 없는 지정자가 있으면 설정 에러입니다.
    pub fn new(index: &str, is_timewindow: bool) -> Result<Self, SyslogError> {
        if index.is_empty() {
            return Err(SyslogError::Config {
                field: "index".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if !is_timewindow {
            return Ok(Self::Static(index.to_owned()));
        }
        if StrftimeItems::new(index).any(|item| matches!(item, Item::Error)) {
            return Err(SyslogError::Config {
                field: "index".to_owned(),
                reason: format!("'{index}' is not a valid time template"),
            });
        }
        Ok(Self::TimeWindow(index.to_owned()))
    }

    /// `now` 시점의 인덱스 이름
    pub fn resolve(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Static(name) => name.clone(),
            Self::TimeWindow(template) => {
                let mut name = String::with_capacity(template.len() + 8);
                match write!(name, "{}", now.format_with_items(StrftimeItems::new(template))) {
                    Ok(()) => name,
                    Err(_) => template.clone(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 23, 59, 59).unwrap()
    }

    #[test]
    fn static_name_ignores_time() {
        let resolver = IndexNameResolver::new("logs-%Y", false).unwrap();
        assert_eq!(resolver.resolve(at(2024, 1, 2)), "logs-%Y");
    }

    #[test]
    fn time_window_formats_now() {
        let resolver = IndexNameResolver::new("syslog-%Y.%m.%d", true).unwrap();
        assert_eq!(resolver.resolve(at(2024, 1, 2)), "syslog-2024.01.02");
        assert_eq!(resolver.resolve(at(2024, 12, 31)), "syslog-2024.12.31");
    }

    #[test]
    fn time_window_without_specifiers_is_constant() {
        let resolver = IndexNameResolver::new("syslog", true).unwrap();
        assert_eq!(resolver.resolve(at(2024, 1, 2)), "syslog");
    }

    #[test]
    fn invalid_template_is_rejected() {
        assert!(matches!(
            IndexNameResolver::new("syslog-%Q", true),
            Err(SyslogError::Config { .. })
        ));
        assert!(IndexNameResolver::new("", false).is_err());
    }
}

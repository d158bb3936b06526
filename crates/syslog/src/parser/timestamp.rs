//! syslog 타임스탬프 해석 -- RFC 3164 / RFC 5424
//!
//! RFC 5424 타임스탬프의 고정 길이 접두사(`yyyy-MM-ddTHH:mm:ss`, 19자)는
//! [`TimestampCache`]로 메모이제이션합니다. 캐시는 성능 최적화일 뿐이므로
//! 미스가 나면 항상 다시 계산하고, 용량을 넘으면 오래된 항목부터 밀어냅니다.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Datelike, Months, NaiveDateTime, Utc};

use super::message::MalformedMessage;

/// RFC 5424 날짜-시간 접두사 길이 (소수 초, 타임존 제외)
pub const RFC5424_PREFIX_LEN: usize = 19;

/// RFC 3164 타임스탬프 필드 길이 (`"Oct 11 22:14:15"`)
pub const RFC3164_LEN: usize = 15;

/// 타임스탬프 캐시 기본 용량
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

const RFC5424_PREFIX_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// RFC 5424 접두사 → epoch 밀리초 캐시
///
/// 여러 리스너 태스크에서 동시에 접근합니다. 같은 키를 두 태스크가
/// 동시에 계산할 수 있지만(at-least-once) 결과는 항상 동일합니다.
pub struct TimestampCache {
    state: Mutex<CacheState>,
    capacity: usize,
}

struct CacheState {
    entries: HashMap<String, i64>,
    /// 삽입 순서 (FIFO 축출)
    order: VecDeque<String>,
}

impl TimestampCache {
    /// 주어진 최대 항목 수로 캐시를 생성합니다. 용량 0은 1로 취급합니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY)),
                order: VecDeque::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY)),
            }),
            capacity,
        }
    }

    /// 접두사에 해당하는 epoch 밀리초(UTC)를 반환합니다.
    ///
    /// 캐시에 없으면 계산 후 저장합니다. 날짜로 해석할 수 없으면 `None`이며
    /// 실패 결과는 캐시하지 않습니다.
    pub fn get_or_compute(&self, prefix: &str) -> Option<i64> {
        {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(millis) = state.entries.get(prefix) {
                return Some(*millis);
            }
        }

        // 락 밖에서 계산
        let millis = parse_rfc5424_prefix(prefix)?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.entries.contains_key(prefix) {
            while state.entries.len() >= self.capacity {
                match state.order.pop_front() {
                    Some(oldest) => {
                        state.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            state.entries.insert(prefix.to_owned(), millis);
            state.order.push_back(prefix.to_owned());
        }
        Some(millis)
    }

    /// 현재 캐시된 항목 수
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// 캐시가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 최대 항목 수
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TimestampCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// `yyyy-MM-ddTHH:mm:ss` 접두사를 UTC epoch 밀리초로 변환합니다.
pub fn parse_rfc5424_prefix(prefix: &str) -> Option<i64> {
    if prefix.len() != RFC5424_PREFIX_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(prefix, RFC5424_PREFIX_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// RFC 5424 타임스탬프 전체(`2003-10-11T22:14:15.003-07:00`)를 UTC epoch 밀리초로 변환합니다.
///
/// 소수 초는 밀리초로 반올림해 더하고, 오프셋은 빼서 UTC로 정규화합니다.
pub fn parse_rfc5424(timestamp: &str, cache: &TimestampCache) -> Result<i64, MalformedMessage> {
    let fragment = || timestamp.to_owned();

    if timestamp.len() <= RFC5424_PREFIX_LEN {
        return Err(MalformedMessage::BadTimestamp { fragment: fragment() });
    }
    let prefix = timestamp
        .get(..RFC5424_PREFIX_LEN)
        .ok_or_else(|| MalformedMessage::BadTimestamp { fragment: fragment() })?;
    let mut millis = cache
        .get_or_compute(prefix)
        .ok_or_else(|| MalformedMessage::BadTimestamp { fragment: fragment() })?;

    let bytes = timestamp.as_bytes();
    let mut pos = RFC5424_PREFIX_LEN;

    if bytes[pos] == b'.' {
        let digits_start = pos + 1;
        let digits_end = bytes[digits_start..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |off| digits_start + off);
        if digits_end == digits_start {
            return Err(MalformedMessage::BadFractionalSeconds { fragment: fragment() });
        }
        let fraction: f64 = timestamp[pos..digits_end]
            .parse()
            .map_err(|_| MalformedMessage::BadFractionalSeconds { fragment: fragment() })?;
        // 소수 초는 1 미만이므로 결과는 0..=1000 범위
        #[allow(clippy::cast_possible_truncation)]
        let fraction_millis = (fraction * 1000.0).round() as i64;
        millis += fraction_millis;
        pos = digits_end;
    }

    match bytes.get(pos) {
        Some(&b'Z') => Ok(millis),
        Some(&sign @ (b'+' | b'-')) => {
            let zone = bytes
                .get(pos + 1..pos + 6)
                .ok_or_else(|| MalformedMessage::BadTimezone { fragment: fragment() })?;
            let well_formed = zone[0].is_ascii_digit()
                && zone[1].is_ascii_digit()
                && zone[2] == b':'
                && zone[3].is_ascii_digit()
                && zone[4].is_ascii_digit();
            if !well_formed {
                return Err(MalformedMessage::BadTimezone { fragment: fragment() });
            }
            let hours = i64::from(zone[0] - b'0') * 10 + i64::from(zone[1] - b'0');
            let minutes = i64::from(zone[3] - b'0') * 10 + i64::from(zone[4] - b'0');
            let offset_millis = (hours * 60 + minutes) * 60_000;
            if sign == b'+' {
                Ok(millis - offset_millis)
            } else {
                Ok(millis + offset_millis)
            }
        }
        _ => Err(MalformedMessage::BadTimezone { fragment: fragment() }),
    }
}

/// RFC 3164 타임스탬프(`"Oct 11 22:14:15"`, `"Oct  1 22:14:15"`)를 UTC epoch 밀리초로 변환합니다.
///
/// 연도가 없으므로 `now`의 연도를 붙인 뒤, 결과가 한 달 넘게 미래면 전년도,
/// 한 달 넘게 과거면 다음 해로 옮깁니다. 해석할 수 없으면 0을 반환합니다.
pub fn resolve_rfc3164(field: &str, now: DateTime<Utc>) -> i64 {
    let collapsed = field.replacen("  ", " ", 1);

    // 윤년(2000)을 기준으로 월/일/시각을 먼저 검증
    let Ok(reference) =
        NaiveDateTime::parse_from_str(&format!("2000 {collapsed}"), "%Y %b %d %H:%M:%S")
    else {
        return 0;
    };

    let year = now.year();
    let Some(fixed) = with_year(reference, year) else {
        return 0;
    };
    let now_naive = now.naive_utc();

    let one_month = Months::new(1);
    let adjusted_year = if fixed > now_naive
        && fixed
            .checked_sub_months(one_month)
            .is_some_and(|earlier| earlier > now_naive)
    {
        year - 1
    } else if fixed < now_naive
        && fixed
            .checked_add_months(one_month)
            .is_some_and(|later| later < now_naive)
    {
        year + 1
    } else {
        year
    };

    with_year(reference, adjusted_year)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0)
}

/// 연도를 바꾸되, 평년의 2월 29일은 2월 28일로 보정합니다.
fn with_year(dt: NaiveDateTime, year: i32) -> Option<NaiveDateTime> {
    dt.with_year(year)
        .or_else(|| dt.with_day(28).and_then(|d| d.with_year(year)))
}

/// epoch 밀리초를 `2003-10-11T22:14:15.003Z` 형식으로 출력합니다.
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

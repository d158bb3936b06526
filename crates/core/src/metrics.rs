//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironlog_`
//! - 모듈명: `syslog_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(ironlog_core::metrics::SYSLOG_MESSAGES_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 전송 프로토콜 레이블 키 (udp, tcp)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Syslog 메트릭 ─────────────────────────────────────────────────

/// Syslog: 수신한 원시 메시지 수 (counter, label: protocol)
pub const SYSLOG_MESSAGES_RECEIVED_TOTAL: &str = "ironlog_syslog_messages_received_total";

/// Syslog: 형식 오류로 버려진 메시지 수 (counter, label: protocol)
pub const SYSLOG_MESSAGES_MALFORMED_TOTAL: &str = "ironlog_syslog_messages_malformed_total";

/// Syslog: 배치 작성기에 전달된 레코드 수 (counter)
pub const SYSLOG_RECORDS_QUEUED_TOTAL: &str = "ironlog_syslog_records_queued_total";

/// Syslog: 실행된 벌크 요청 수 (counter, label: result)
pub const SYSLOG_BULK_REQUESTS_TOTAL: &str = "ironlog_syslog_bulk_requests_total";

/// Syslog: 벌크 응답에서 실패한 개별 항목 수 (counter)
pub const SYSLOG_BULK_ITEMS_FAILED_TOTAL: &str = "ironlog_syslog_bulk_items_failed_total";

/// Syslog: 진행 중인 벌크 요청 수 (gauge)
pub const SYSLOG_BULK_IN_FLIGHT: &str = "ironlog_syslog_bulk_in_flight";

/// Syslog: 벌크 요청 소요 시간 (histogram, 초)
pub const SYSLOG_BULK_DURATION_SECONDS: &str = "ironlog_syslog_bulk_duration_seconds";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "ironlog_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "ironlog_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `ironlog-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        SYSLOG_MESSAGES_RECEIVED_TOTAL,
        "Total number of raw syslog messages received per transport"
    );
    describe_counter!(
        SYSLOG_MESSAGES_MALFORMED_TOTAL,
        "Total number of syslog messages dropped because they could not be decoded"
    );
    describe_counter!(
        SYSLOG_RECORDS_QUEUED_TOTAL,
        "Total number of decoded records handed to the batch writer"
    );
    describe_counter!(
        SYSLOG_BULK_REQUESTS_TOTAL,
        "Total number of bulk requests committed to the sink, by result"
    );
    describe_counter!(
        SYSLOG_BULK_ITEMS_FAILED_TOTAL,
        "Total number of individual bulk items reported as failed by the sink"
    );
    describe_gauge!(
        SYSLOG_BULK_IN_FLIGHT,
        "Number of bulk requests currently awaiting a sink response"
    );
    describe_histogram!(
        SYSLOG_BULK_DURATION_SECONDS,
        "Time to commit a single bulk request in seconds"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Ironlog daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        SYSLOG_MESSAGES_RECEIVED_TOTAL,
        SYSLOG_MESSAGES_MALFORMED_TOTAL,
        SYSLOG_RECORDS_QUEUED_TOTAL,
        SYSLOG_BULK_REQUESTS_TOTAL,
        SYSLOG_BULK_ITEMS_FAILED_TOTAL,
        SYSLOG_BULK_IN_FLIGHT,
        SYSLOG_BULK_DURATION_SECONDS,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_ironlog_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("ironlog_"),
                "Metric '{}' does not start with 'ironlog_' prefix",
                name
            );
        }
    }

    #[test]
    fn counters_end_with_total() {
        let counters = [
            SYSLOG_MESSAGES_RECEIVED_TOTAL,
            SYSLOG_MESSAGES_MALFORMED_TOTAL,
            SYSLOG_RECORDS_QUEUED_TOTAL,
            SYSLOG_BULK_REQUESTS_TOTAL,
            SYSLOG_BULK_ITEMS_FAILED_TOTAL,
        ];
        for name in counters {
            assert!(name.ends_with("_total"), "{name} should end with _total");
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 없어도 패닉하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_PROTOCOL, LABEL_RESULT] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}

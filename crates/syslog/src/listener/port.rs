//! 포트 범위 해석과 순차 바인드
//!
//! `"9500-9600"`, `"514"`, `"514,1514,9000-9001"` 형식을 지원합니다.
//! 후보 포트를 순서대로 시도하며, 범위 안의 개별 바인드 실패는 예상된 상황이므로
//! `debug` 레벨로만 기록합니다.

use std::io;
use std::net::{IpAddr, SocketAddr};

use tracing::debug;

use crate::error::SyslogError;

/// 바인드 후보 포트 목록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRange {
    spec: String,
    ports: Vec<u16>,
}

impl PortRange {
    /// 포트 명세를 해석합니다. 범위는 양 끝을 포함합니다.
    pub fn parse(spec: &str) -> Result<Self, SyslogError> {
        let invalid = |reason: String| SyslogError::Config {
            field: "port".to_owned(),
            reason,
        };

        let mut ports = Vec::new();
        for part in spec.split(',').map(str::trim) {
            if part.is_empty() {
                return Err(invalid(format!("empty entry in port spec '{spec}'")));
            }
            let (start, end) = match part.split_once('-') {
                Some((start, end)) => (parse_port(start.trim()), parse_port(end.trim())),
                None => (parse_port(part), parse_port(part)),
            };
            let (Some(start), Some(end)) = (start, end) else {
                return Err(invalid(format!("'{part}' is not a port or port range")));
            };
            if start > end {
                return Err(invalid(format!("range '{part}' is reversed")));
            }
            ports.extend(start..=end);
        }

        Ok(Self {
            spec: spec.to_owned(),
            ports,
        })
    }

    /// 원본 명세 문자열
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// 시도 순서대로 정렬된 후보 포트
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// 후보 포트를 순서대로 `bind`에 넘겨 처음 성공한 결과를 반환합니다.
    ///
    /// 모든 후보가 실패하면 마지막 에러를 담은 `NoPortAvailable`을 반환합니다.
    pub fn bind_first<T>(
        &self,
        protocol: &'static str,
        host: IpAddr,
        mut bind: impl FnMut(SocketAddr) -> io::Result<T>,
    ) -> Result<(T, SocketAddr), SyslogError> {
        let mut last_error = None;
        for port in &self.ports {
            let address = SocketAddr::new(host, *port);
            match bind(address) {
                Ok(bound) => return Ok((bound, address)),
                Err(e) => {
                    debug!(protocol, %address, error = %e, "bind attempt failed, trying next port");
                    last_error = Some(e);
                }
            }
        }
        Err(SyslogError::NoPortAvailable {
            protocol,
            ports: self.spec.clone(),
            source: last_error.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no candidate ports")
            }),
        })
    }
}

fn parse_port(s: &str) -> Option<u16> {
    s.parse().ok()
}

/// 바인드 호스트를 IP 주소로 해석합니다.
pub async fn resolve_host(host: &str) -> Result<IpAddr, SyslogError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| SyslogError::Resolve {
            host: host.to_owned(),
            reason: e.to_string(),
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| SyslogError::Resolve {
            host: host.to_owned(),
            reason: "no addresses found".to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn parses_single_port() {
        assert_eq!(PortRange::parse("514").unwrap().ports(), &[514]);
    }

    #[test]
    fn parses_inclusive_range() {
        let range = PortRange::parse("9500-9502").unwrap();
        assert_eq!(range.ports(), &[9500, 9501, 9502]);
        assert_eq!(range.spec(), "9500-9502");
    }

    #[test]
    fn parses_mixed_list() {
        let range = PortRange::parse("514, 1514,9000-9001").unwrap();
        assert_eq!(range.ports(), &[514, 1514, 9000, 9001]);
    }

    #[test]
    fn rejects_malformed_specs() {
        for spec in ["", "abc", "9600-9500", "70000", "1,,2", "-5"] {
            assert!(PortRange::parse(spec).is_err(), "{spec} should be rejected");
        }
    }

    #[test]
    fn skips_occupied_ports() {
        // 임시 포트 세 개를 확보한 뒤 마지막 하나만 풀어 둔다
        let first = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let second = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let third = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let ports = [&first, &second, &third].map(|l| l.local_addr().unwrap().port());
        drop(third);

        let range = PortRange::parse(&format!("{},{},{}", ports[0], ports[1], ports[2])).unwrap();
        let (listener, address) = range
            .bind_first("tcp", LOCALHOST, TcpListener::bind)
            .unwrap();
        assert_eq!(address.port(), ports[2]);
        assert_eq!(listener.local_addr().unwrap().port(), ports[2]);
    }

    #[test]
    fn exhausted_range_reports_last_error() {
        let first = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let second = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let spec = format!(
            "{},{}",
            first.local_addr().unwrap().port(),
            second.local_addr().unwrap().port()
        );
        let range = PortRange::parse(&spec).unwrap();

        let mut attempts = 0;
        let err = range
            .bind_first("tcp", LOCALHOST, |addr| {
                attempts += 1;
                TcpListener::bind(addr)
            })
            .unwrap_err();
        assert_eq!(attempts, 2);
        match err {
            SyslogError::NoPortAvailable { protocol, ports, source } => {
                assert_eq!(protocol, "tcp");
                assert_eq!(ports, spec);
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn resolves_literal_and_named_hosts() {
        assert_eq!(resolve_host("127.0.0.1").await.unwrap(), LOCALHOST);
        assert!(resolve_host("localhost").await.unwrap().is_loopback());
    }
}

//! 전송 계층 리스너
//!
//! UDP와 TCP 리스너는 수신한 원시 메시지를 공통 [`Ingest`]에 넘깁니다.
//! [`Ingest`]는 파싱, 문서 조립, 인덱스 이름 결정을 수행한 뒤 배치 작성기에 요청을 추가합니다.
//!
//! - [`port`]: 포트 범위 해석과 순차 바인드
//! - [`udp`]: 데이터그램 하나가 메시지 하나
//! - [`tcp`]: 연결별 개행 프레이밍

pub mod port;
pub mod tcp;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use ironlog_core::metrics as m;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SyslogError;
use crate::index::IndexNameResolver;
use crate::parser::{MessageParser, SyslogRecord};
use crate::sink::IndexRequest;
use crate::writer::WriterHandle;

pub use port::PortRange;
pub use tcp::TcpSyslogListener;
pub use udp::UdpSyslogListener;

/// 전송 프로토콜
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 메시지가 도착한 전송 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub protocol: Protocol,
    /// 메시지를 받은 로컬 주소
    pub local: SocketAddr,
    /// 송신자 주소
    pub remote: SocketAddr,
}

impl Envelope {
    pub fn new(protocol: Protocol, local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            protocol,
            local,
            remote,
        }
    }

    /// 전송 정보와 레코드 필드를 합쳐 문서를 조립합니다.
    ///
    /// 필드 순서: protocol, local, remote, 그 뒤로 [`SyslogRecord::write_fields`] 순서
    pub fn document(&self, record: &SyslogRecord, parser: &MessageParser) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert(
            "protocol".to_owned(),
            Value::String(self.protocol.as_str().to_owned()),
        );
        doc.insert("local".to_owned(), Value::String(self.local.to_string()));
        doc.insert("remote".to_owned(), Value::String(self.remote.to_string()));
        record.write_fields(parser.field_names(), &mut doc);
        doc
    }
}

/// 리스너가 공유하는 수신 처리기
///
/// 구성 요소는 모두 생성 이후 읽기 전용이므로 `Arc<Ingest>` 하나를 모든 리스너 태스크가 공유합니다.
pub struct Ingest {
    parser: Arc<MessageParser>,
    index: IndexNameResolver,
    doc_type: String,
    writer: WriterHandle,
}

impl Ingest {
    pub fn new(
        parser: Arc<MessageParser>,
        index: IndexNameResolver,
        doc_type: impl Into<String>,
        writer: WriterHandle,
    ) -> Self {
        Self {
            parser,
            index,
            doc_type: doc_type.into(),
            writer,
        }
    }

    /// 원시 메시지 하나를 처리합니다.
    ///
    /// 형식 오류 메시지는 기록 후 버리고 `Ok(())`를 반환합니다.
    /// 에러는 배치 작성기가 닫혀 더 이상 요청을 받을 수 없을 때만 반환됩니다.
    pub async fn handle(&self, envelope: &Envelope, payload: &[u8]) -> Result<(), SyslogError> {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Ok(());
        }

        let protocol = envelope.protocol.as_str();
        metrics::counter!(m::SYSLOG_MESSAGES_RECEIVED_TOTAL, m::LABEL_PROTOCOL => protocol)
            .increment(1);

        let record = match self.parser.parse(text) {
            Ok(record) => record,
            Err(e) => {
                debug!(
                    protocol,
                    remote = %envelope.remote,
                    error = %e,
                    fragment = e.fragment(),
                    "dropping malformed syslog message"
                );
                metrics::counter!(m::SYSLOG_MESSAGES_MALFORMED_TOTAL, m::LABEL_PROTOCOL => protocol)
                    .increment(1);
                return Ok(());
            }
        };

        let doc = envelope.document(&record, &self.parser);
        let source = match serde_json::to_string(&Value::Object(doc)) {
            Ok(source) => source,
            Err(e) => {
                debug!(protocol, error = %e, "failed to serialize syslog document");
                return Ok(());
            }
        };

        let request = IndexRequest::new(self.index.resolve(Utc::now()), self.doc_type.as_str(), source);
        self.writer.add(request).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use crate::sink::{BulkItemResponse, BulkRequest, BulkResponse, DocumentSink, SinkError};

    /// 커밋된 요청을 모두 보관하는 싱크
    #[derive(Default)]
    pub struct RecordingSink {
        pub committed: Mutex<Vec<BulkRequest>>,
    }

    impl RecordingSink {
        pub fn sources(&self) -> Vec<String> {
            self.committed
                .lock()
                .unwrap()
                .iter()
                .flat_map(|bulk| bulk.requests.iter().map(|r| r.source.clone()))
                .collect()
        }
    }

    impl DocumentSink for RecordingSink {
        async fn commit(&self, request: BulkRequest) -> Result<BulkResponse, SinkError> {
            let items = request.requests.iter().map(BulkItemResponse::success).collect();
            self.committed.lock().unwrap().push(request);
            Ok(BulkResponse {
                items,
                took: std::time::Duration::ZERO,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;
    use crate::writer::{BatchWriter, WriterSettings};
    use std::net::{IpAddr, Ipv4Addr};

    fn envelope() -> Envelope {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Envelope::new(
            Protocol::Udp,
            SocketAddr::new(ip, 9500),
            SocketAddr::new(ip, 40000),
        )
    }

    fn ingest(writer: &BatchWriter) -> Ingest {
        Ingest::new(
            Arc::new(MessageParser::new()),
            IndexNameResolver::new("syslog", false).unwrap(),
            "syslog",
            writer.handle(),
        )
    }

    #[test]
    fn protocol_labels() {
        assert_eq!(Protocol::Udp.to_string(), "udp");
        assert_eq!(Protocol::Tcp.as_str(), "tcp");
    }

    #[test]
    fn document_starts_with_transport_fields() {
        let parser = MessageParser::new();
        let record = parser
            .parse("<34>Oct 11 22:14:15 mymachine su: 'su root' failed")
            .unwrap();
        let doc = envelope().document(&record, &parser);
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(
            &keys[..7],
            &["protocol", "local", "remote", "facility", "severity", "timestamp", "host"]
        );
        assert_eq!(doc["protocol"], "udp");
        assert_eq!(doc["local"], "127.0.0.1:9500");
        assert_eq!(doc["remote"], "127.0.0.1:40000");
        assert_eq!(doc["facility"], "AUTH");
        assert_eq!(doc["severity"], "CRITICAL");
    }

    #[tokio::test]
    async fn valid_message_reaches_sink() {
        let sink = Arc::new(RecordingSink::default());
        let writer = BatchWriter::spawn(WriterSettings::default(), Arc::clone(&sink));
        let ingest = ingest(&writer);

        ingest
            .handle(&envelope(), b"<13>Oct 11 22:14:15 host app: hello\r\n")
            .await
            .unwrap();
        writer.close().await.unwrap();

        let sources = sink.sources();
        assert_eq!(sources.len(), 1);
        let doc: Value = serde_json::from_str(&sources[0]).unwrap();
        assert_eq!(doc["host"], "host");
        assert_eq!(doc["message"], "app: hello");
    }

    #[tokio::test]
    async fn malformed_and_blank_messages_are_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let writer = BatchWriter::spawn(WriterSettings::default(), Arc::clone(&sink));
        let ingest = ingest(&writer);

        ingest.handle(&envelope(), b"no priority here").await.unwrap();
        ingest.handle(&envelope(), b"\r\n").await.unwrap();
        ingest.handle(&envelope(), b"<999>Oct 11 22:14:15 h m").await.unwrap();
        writer.close().await.unwrap();

        assert!(sink.sources().is_empty());
    }

    #[tokio::test]
    async fn closed_writer_is_reported() {
        let sink = Arc::new(RecordingSink::default());
        let writer = BatchWriter::spawn(WriterSettings::default(), Arc::clone(&sink));
        let ingest = ingest(&writer);
        writer.close().await.unwrap();

        let err = ingest
            .handle(&envelope(), b"<13>Oct 11 22:14:15 host app: hello")
            .await
            .unwrap_err();
        assert!(matches!(err, SyslogError::Channel(_)));
    }
}

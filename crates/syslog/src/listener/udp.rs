//! UDP syslog 리스너
//!
//! 데이터그램 하나를 메시지 하나로 취급합니다.
//! 읽기 버퍼보다 긴 데이터그램은 운영체제가 잘라서 전달합니다.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::port::PortRange;
use super::{Envelope, Ingest, Protocol};
use crate::error::SyslogError;

/// 바인드된 UDP 리스너
pub struct UdpSyslogListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buffer_size: usize,
}

impl UdpSyslogListener {
    /// 포트 범위에서 처음 바인드에 성공한 포트로 리스너를 생성합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn bind(
        host: IpAddr,
        ports: &PortRange,
        receive_buffer_size: usize,
        buffer_size: usize,
    ) -> Result<Self, SyslogError> {
        let (socket, _) = ports.bind_first(Protocol::Udp.as_str(), host, |addr| {
            create_socket(addr, receive_buffer_size)
        })?;
        let local_addr = socket.local_addr()?;
        info!(%local_addr, "udp syslog listener bound");
        Ok(Self {
            socket,
            local_addr,
            buffer_size: buffer_size.max(1),
        })
    }

    /// 실제로 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 취소될 때까지 데이터그램을 수신합니다.
    ///
    /// 배치 작성기가 닫히면 더 이상 전달할 곳이 없으므로 루프를 끝냅니다.
    pub async fn run(self, ingest: Arc<Ingest>, cancel: CancellationToken) {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, remote)) => {
                        let envelope = Envelope::new(Protocol::Udp, self.local_addr, remote);
                        if let Err(e) = ingest.handle(&envelope, &buf[..len]).await {
                            warn!(error = %e, "udp listener cannot forward messages, stopping");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(local_addr = %self.local_addr, error = %e, "udp receive failed");
                    }
                },
            }
        }
        info!(local_addr = %self.local_addr, "udp syslog listener stopped");
    }
}

fn create_socket(addr: SocketAddr, receive_buffer_size: usize) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(SockProtocol::UDP))?;

    if let Err(e) = socket.set_recv_buffer_size(receive_buffer_size) {
        warn!(
            requested = receive_buffer_size,
            error = %e,
            "failed to set udp receive buffer size, using system default"
        );
    }

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::RecordingSink;
    use super::*;
    use crate::index::IndexNameResolver;
    use crate::parser::MessageParser;
    use crate::writer::{BatchWriter, WriterSettings};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener =
            UdpSyslogListener::bind(LOCALHOST, &PortRange::parse("0").unwrap(), 65_536, 1024)
                .unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn skips_port_held_by_another_socket() {
        let held = std::net::UdpSocket::bind((LOCALHOST, 0)).unwrap();
        let held_port = held.local_addr().unwrap().port();
        let range = PortRange::parse(&format!("{held_port},0")).unwrap();

        let listener = UdpSyslogListener::bind(LOCALHOST, &range, 65_536, 1024).unwrap();
        assert_ne!(listener.local_addr().port(), held_port);
    }

    #[tokio::test]
    async fn datagrams_become_documents() {
        let sink = Arc::new(RecordingSink::default());
        let writer = BatchWriter::spawn(WriterSettings::default(), Arc::clone(&sink));
        let ingest = Arc::new(Ingest::new(
            Arc::new(MessageParser::new()),
            IndexNameResolver::new("syslog", false).unwrap(),
            "syslog",
            writer.handle(),
        ));

        let listener =
            UdpSyslogListener::bind(LOCALHOST, &PortRange::parse("0").unwrap(), 65_536, 1024)
                .unwrap();
        let target = listener.local_addr();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.run(ingest, cancel.clone()));

        let client = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        client
            .send_to(b"<13>Oct 11 22:14:15 host app: first", target)
            .await
            .unwrap();
        client.send_to(b"garbage", target).await.unwrap();
        client
            .send_to(b"<13>Oct 11 22:14:15 host app: second", target)
            .await
            .unwrap();

        let stats = writer.stats();
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.records_queued() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        task.await.unwrap();
        writer.close().await.unwrap();

        let sources = sink.sources();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].contains("app: first"));
        assert!(sources[1].contains("app: second"));
    }
}

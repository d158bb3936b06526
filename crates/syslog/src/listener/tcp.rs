//! TCP syslog 리스너
//!
//! 개행으로 구분된 메시지를 연결별 태스크에서 순서대로 처리합니다.
//! 동시 연결 수는 세마포어로 제한하며, 한도를 넘는 연결은 즉시 닫습니다.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol as SockProtocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::port::PortRange;
use super::{Envelope, Ingest, Protocol};
use crate::config::TcpOptions;
use crate::error::SyslogError;

/// listen 대기열 길이
const LISTEN_BACKLOG: i32 = 1024;

/// accept 실패 후 재시도 전 대기 시간
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// 바인드된 TCP 리스너
pub struct TcpSyslogListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: TcpOptions,
}

impl TcpSyslogListener {
    /// 포트 범위에서 처음 바인드에 성공한 포트로 리스너를 생성합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn bind(
        host: IpAddr,
        ports: &PortRange,
        receive_buffer_size: usize,
        options: TcpOptions,
    ) -> Result<Self, SyslogError> {
        let (listener, _) = ports.bind_first(Protocol::Tcp.as_str(), host, |addr| {
            create_listener(addr, receive_buffer_size, options.reuse_address)
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, max_connections = options.max_connections, "tcp syslog listener bound");
        Ok(Self {
            listener,
            local_addr,
            options,
        })
    }

    /// 실제로 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 취소될 때까지 연결을 수락합니다.
    ///
    /// 취소되면 수락을 멈추고 열려 있는 연결 태스크가 모두 끝날 때까지 기다립니다.
    pub async fn run(self, ingest: Arc<Ingest>, cancel: CancellationToken) {
        let limit = Arc::new(Semaphore::new(self.options.max_connections.max(1)));
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                            warn!(
                                %remote,
                                max_connections = self.options.max_connections,
                                "max connections reached, rejecting connection"
                            );
                            continue;
                        };
                        debug!(%remote, "accepted tcp connection");
                        configure_stream(&stream, &self.options);
                        let connection = Connection {
                            envelope: Envelope::new(Protocol::Tcp, self.local_addr, remote),
                            ingest: Arc::clone(&ingest),
                            max_message_size: self.options.max_message_size,
                            idle_timeout: self.options.connection_timeout,
                            _permit: permit,
                        };
                        connections.spawn(connection.serve(stream, cancel.clone()));
                    }
                    Err(e) => {
                        warn!(local_addr = %self.local_addr, error = %e, "tcp accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "tcp connection task failed");
                    }
                }
            }
        }

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "tcp connection task failed");
            }
        }
        info!(local_addr = %self.local_addr, "tcp syslog listener stopped");
    }
}

/// 연결 하나의 처리 상태. 태스크가 끝나면 연결 허가도 반환됩니다.
struct Connection {
    envelope: Envelope,
    ingest: Arc<Ingest>,
    max_message_size: usize,
    idle_timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    async fn serve(self, stream: TcpStream, cancel: CancellationToken) {
        let remote = self.envelope.remote;
        let mut reader = BufReader::new(stream);
        let mut line = Vec::with_capacity(1024);
        // 개행까지 포함해 한 줄을 최대 max_message_size + 1 바이트까지 읽는다
        let read_limit = self.max_message_size as u64 + 1;

        loop {
            line.clear();
            let mut limited = (&mut reader).take(read_limit);
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = timeout(self.idle_timeout, limited.read_until(b'\n', &mut line)) => read,
            };

            match read {
                Err(_) => {
                    debug!(%remote, "closing idle tcp connection");
                    break;
                }
                Ok(Err(e)) => {
                    debug!(%remote, error = %e, "tcp read failed");
                    break;
                }
                Ok(Ok(0)) => {
                    debug!(%remote, "tcp connection closed by peer");
                    break;
                }
                Ok(Ok(_)) => {
                    if line.len() > self.max_message_size && line.last() != Some(&b'\n') {
                        warn!(
                            %remote,
                            max_message_size = self.max_message_size,
                            "message exceeds max size, closing connection"
                        );
                        break;
                    }
                    if let Err(e) = self.ingest.handle(&self.envelope, &line).await {
                        warn!(%remote, error = %e, "tcp connection cannot forward messages, closing");
                        break;
                    }
                }
            }
        }
    }
}

fn create_listener(
    addr: SocketAddr,
    receive_buffer_size: usize,
    reuse_address: bool,
) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(SockProtocol::TCP))?;
    socket.set_reuse_address(reuse_address)?;

    if let Err(e) = socket.set_recv_buffer_size(receive_buffer_size) {
        warn!(
            requested = receive_buffer_size,
            error = %e,
            "failed to set tcp receive buffer size, using system default"
        );
    }

    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

fn configure_stream(stream: &TcpStream, options: &TcpOptions) {
    if let Err(e) = stream.set_nodelay(options.no_delay) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }
    if options.keep_alive {
        if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&TcpKeepalive::new()) {
            debug!(error = %e, "failed to enable SO_KEEPALIVE");
        }
    }
}

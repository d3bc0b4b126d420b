//! TCP byte source.
//!
//! Two modes, selected by the configured address: a non-empty address
//! connects out as a client; an empty address binds the port and waits
//! for the telemetry bridge to connect in. Either way, a connection that
//! drops mid-stream is re-established inside [`read_chunk`] with a short
//! pause between attempts, so a flaky network link self-heals without
//! operator involvement. The retry loop only ends when the reader task
//! owning this source is cancelled (source switch or shutdown).
//!
//! [`read_chunk`]: super::ByteSource::read_chunk

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{info, warn};

use super::ByteSource;
use crate::{CoreError, Result};

const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// TCP socket source, client or listen mode.
pub struct TcpSource {
    stream: Option<TcpStream>,
    listener: Option<TcpListener>,
    address: String,
    port: u16,
}

impl TcpSource {
    /// Establish the source.
    ///
    /// Client mode connects immediately and fails fast on refusal, so a
    /// bad request leaves the manager idle rather than wedged. Listen
    /// mode binds immediately (failing fast on a busy port) and accepts
    /// the peer lazily on the first read.
    pub async fn connect(address: &str, port: u16) -> Result<Self> {
        if address.is_empty() {
            let listener = TcpListener::bind(("0.0.0.0", port)).await.map_err(|err| {
                CoreError::network_error(address, port, "bind failed", err)
            })?;
            info!(port, "listening for telemetry peer");
            Ok(Self { stream: None, listener: Some(listener), address: String::new(), port })
        } else {
            let stream = TcpStream::connect((address, port)).await.map_err(|err| {
                CoreError::network_error(address, port, "connect failed", err)
            })?;
            info!(address, port, "connected to telemetry server");
            Ok(Self { stream: Some(stream), listener: None, address: address.to_string(), port })
        }
    }

    /// Re-establish the connection, pausing between attempts until one
    /// succeeds. Runs inside the reader task, so cancellation of that
    /// task bounds the retries.
    async fn reconnect(&mut self) {
        loop {
            let attempt = match &self.listener {
                Some(listener) => listener.accept().await.map(|(stream, peer)| {
                    info!(%peer, "telemetry peer connected");
                    stream
                }),
                None => TcpStream::connect((self.address.as_str(), self.port)).await,
            };
            match attempt {
                Ok(stream) => {
                    self.stream = Some(stream);
                    return;
                }
                Err(err) => {
                    warn!(address = %self.address, port = self.port, %err, "reconnect failed");
                    sleep(RETRY_PAUSE).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl ByteSource for TcpSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                self.reconnect().await;
                continue;
            };
            match stream.read(buf).await {
                Ok(0) => {
                    warn!(address = %self.address, port = self.port, "peer closed connection");
                    self.stream = None;
                }
                Ok(read) => return Ok(read),
                Err(err) => {
                    warn!(address = %self.address, port = self.port, %err, "socket read failed");
                    self.stream = None;
                }
            }
        }
    }

    fn describe(&self) -> String {
        if self.address.is_empty() {
            format!("tcp listen :{}", self.port)
        } else {
            format!("tcp {}:{}", self.address, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn client_mode_fails_fast_when_refused() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let err = TcpSource::connect("127.0.0.1", port).await.err().expect("must fail");
        assert!(matches!(err, CoreError::Network { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn client_mode_reads_server_bytes() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.expect("accept");
            peer.write_all(b"t1101AA\r").await.expect("write");
        });

        let mut source = TcpSource::connect("127.0.0.1", port).await.expect("connect");
        let mut buf = [0u8; 64];
        let read = source.read_chunk(&mut buf).await.expect("read");
        assert_eq!(&buf[..read], b"t1101AA\r");
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn listen_mode_accepts_on_first_read() {
        let mut source = TcpSource::connect("", 0).await.expect("bind");
        let port = source
            .listener
            .as_ref()
            .expect("listen mode")
            .local_addr()
            .expect("addr")
            .port();

        let client = tokio::spawn(async move {
            let mut peer = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
            peer.write_all(b"t2401FF\r").await.expect("write");
        });

        let mut buf = [0u8; 64];
        let read = source.read_chunk(&mut buf).await.expect("read");
        assert_eq!(&buf[..read], b"t2401FF\r");
        client.await.expect("client task");
    }

    #[tokio::test]
    async fn listen_mode_survives_peer_reconnect() {
        let mut source = TcpSource::connect("", 0).await.expect("bind");
        let port = source
            .listener
            .as_ref()
            .expect("listen mode")
            .local_addr()
            .expect("addr")
            .port();

        let peers = tokio::spawn(async move {
            {
                let mut first = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
                first.write_all(b"first").await.expect("write");
                first.shutdown().await.expect("shutdown");
            }
            let mut second = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
            second.write_all(b"second").await.expect("write");
        });

        let mut buf = [0u8; 64];
        let mut collected = Vec::new();
        while collected.len() < "firstsecond".len() {
            let read = source.read_chunk(&mut buf).await.expect("read");
            collected.extend_from_slice(&buf[..read]);
        }
        assert_eq!(&collected, b"firstsecond");
        peers.await.expect("peer task");
    }
}

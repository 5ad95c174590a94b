/*!
 * Telnet transport for [`ShellSession`](super::ShellSession).
 *
 * Plain TCP with in-band option negotiation stripped from the byte stream.
 * Every option the server offers or requests is refused.
 */
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use super::{ShellConnector, ShellTransport};
use crate::error::{GatewayError, Result};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IacState {
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Splits a raw telnet stream into terminal data and negotiation replies
#[derive(Debug)]
struct IacFilter {
    state: IacState,
}

impl IacFilter {
    fn new() -> Self {
        Self {
            state: IacState::Data,
        }
    }

    /// Append the data bytes of `raw` to `data` and return the replies owed
    /// to the server
    fn feed(&mut self, raw: &[u8], data: &mut BytesMut) -> Vec<u8> {
        let mut replies = Vec::new();

        for &byte in raw {
            self.state = match (self.state, byte) {
                (IacState::Data, IAC) => IacState::Iac,
                (IacState::Data, b) => {
                    data.extend_from_slice(&[b]);
                    IacState::Data
                }
                (IacState::Iac, IAC) => {
                    data.extend_from_slice(&[IAC]);
                    IacState::Data
                }
                (IacState::Iac, cmd @ WILL..=DONT) => IacState::Option(cmd),
                (IacState::Iac, SB) => IacState::Sub,
                (IacState::Iac, _) => IacState::Data,
                (IacState::Option(cmd), option) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    IacState::Data
                }
                (IacState::Sub, IAC) => IacState::SubIac,
                (IacState::Sub, _) => IacState::Sub,
                (IacState::SubIac, SE) => IacState::Data,
                (IacState::SubIac, _) => IacState::Sub,
            };
        }

        replies
    }
}

/// A connected telnet stream
#[derive(Debug)]
pub struct TelnetTransport {
    stream: TcpStream,
    buffer: BytesMut,
    filter: IacFilter,
}

impl TelnetTransport {
    /// Wrap a connected stream
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            filter: IacFilter::new(),
        }
    }

    fn take_through(&mut self, marker: &[u8]) -> Option<Vec<u8>> {
        let pos = self
            .buffer
            .windows(marker.len())
            .position(|window| window == marker)?;
        let chunk = self.buffer.split_to(pos + marker.len());
        Some(chunk.to_vec())
    }

    async fn read_through(&mut self, marker: &[u8]) -> Result<Vec<u8>> {
        loop {
            if let Some(chunk) = self.take_through(marker) {
                return Ok(chunk);
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let mut raw = [0u8; 1024];
        let n = self.stream.read(&mut raw).await?;
        if n == 0 {
            return Err(GatewayError::connection("telnet connection closed"));
        }
        let replies = self.filter.feed(&raw[..n], &mut self.buffer);
        if !replies.is_empty() {
            trace!("Refusing {} telnet option(s)", replies.len() / 3);
            self.stream.write_all(&replies).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ShellTransport for TelnetTransport {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    async fn read_until(&mut self, marker: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if marker.is_empty() {
            let all = self.buffer.to_vec();
            self.buffer.advance(all.len());
            return Ok(all);
        }

        match tokio::time::timeout(timeout, self.read_through(marker)).await {
            Ok(chunk) => chunk,
            Err(_) => Err(GatewayError::timeout(format!(
                "no {:?} within {:?}",
                String::from_utf8_lossy(marker),
                timeout
            ))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Opens telnet sessions
#[derive(Debug, Clone)]
pub struct TelnetConnector {
    connect_timeout: Duration,
}

impl TelnetConnector {
    /// Create a connector that gives up on connects after `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn open(&self, host: &str, port: u16) -> Result<TcpStream> {
        tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| GatewayError::timeout(format!("connect to {}:{}", host, port)))?
            .map_err(|e| GatewayError::connection(format!("{}:{}: {}", host, port, e)))
    }
}

#[async_trait]
impl ShellConnector for TelnetConnector {
    async fn probe(&self, host: &str, port: u16) -> bool {
        match self.open(host, port).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Port {} on {} is closed: {}", port, host, e);
                false
            }
        }
    }

    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn ShellTransport>> {
        let stream = self.open(host, port).await?;
        Ok(Box::new(TelnetTransport::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_filter_strips_negotiation() {
        let mut filter = IacFilter::new();
        let mut data = BytesMut::new();

        let raw = [
            IAC, DO, 1, b'l', b'o', IAC, WILL, 3, b'g', IAC, IAC, IAC, SB, 24, 1, IAC, SE, b'!',
        ];
        let replies = filter.feed(&raw, &mut data);

        assert_eq!(&data[..], &[b'l', b'o', b'g', IAC, b'!']);
        assert_eq!(replies, vec![IAC, WONT, 1, IAC, DONT, 3]);
    }

    #[test]
    fn test_filter_split_sequence() {
        let mut filter = IacFilter::new();
        let mut data = BytesMut::new();

        assert!(filter.feed(&[b'a', IAC], &mut data).is_empty());
        let replies = filter.feed(&[DO, 31, b'b'], &mut data);

        assert_eq!(&data[..], b"ab");
        assert_eq!(replies, vec![IAC, WONT, 31]);
    }

    #[tokio::test]
    async fn test_read_until_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(&[IAC, DO, 1]).await.unwrap();
            socket.write_all(b"Welcome\r\nlogin: ").await.unwrap();
            let mut reply = [0u8; 3];
            socket.read_exact(&mut reply).await.unwrap();
            assert_eq!(reply, [IAC, WONT, 1]);
            let mut line = vec![0u8; 7];
            socket.read_exact(&mut line).await.unwrap();
            assert_eq!(&line, b"admin\r\n");
            socket.write_all(b"admin\r\n# ").await.unwrap();
        });

        let connector = TelnetConnector::new(Duration::from_secs(2));
        let mut transport = connector.connect("127.0.0.1", port).await.unwrap();
        let banner = transport
            .read_until(b"login: ", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(banner, b"Welcome\r\nlogin: ");

        transport.write_all(b"admin\r\n").await.unwrap();
        let prompt = transport
            .read_until(b"\r\n# ", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(prompt, b"admin\r\n# ");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_until_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let connector = TelnetConnector::new(Duration::from_secs(2));
        let mut transport = connector.connect("127.0.0.1", port).await.unwrap();
        let err = transport
            .read_until(b"login: ", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = TelnetConnector::new(Duration::from_secs(2));
        assert!(connector.probe("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = TelnetConnector::new(Duration::from_millis(500));
        assert!(!connector.probe("127.0.0.1", port).await);
    }
}

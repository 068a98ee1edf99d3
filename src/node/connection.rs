use crate::error::{RingError, RingResult};

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Bound on connect and on every read of a client-initiated call.
pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// One request/reply conversation over a TCP connection, framed by newlines.
///
/// Outbound connections bound every read by [`PEER_TIMEOUT`]; accepted
/// connections read without a deadline.
pub struct LineStream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    remote: SocketAddr,
    read_timeout: Option<Duration>,
}

impl LineStream {
    pub fn accepted(stream: TcpStream, remote: SocketAddr) -> Self {
        Self::from_stream(stream, remote, None)
    }

    pub async fn connect(host: &str, port: u16) -> RingResult<Self> {
        let target = format!("{}:{}", host, port);
        let refused = |e: std::io::Error| {
            RingError::PeerUnreachable(format!("Cannot connect to {}: {}", target, e))
        };
        let stream = tokio::time::timeout(PEER_TIMEOUT, TcpStream::connect(&target))
            .await
            .map_err(|_| RingError::PeerUnreachable(format!("Timed out connecting to {}", target)))?
            .map_err(refused)?;

        let remote = stream.peer_addr().map_err(refused)?;
        Ok(Self::from_stream(stream, remote, Some(PEER_TIMEOUT)))
    }

    fn from_stream(stream: TcpStream, remote: SocketAddr, read_timeout: Option<Duration>) -> Self {
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
            remote,
            read_timeout,
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    pub async fn send_line(&mut self, line: &str) -> RingResult<()> {
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');

        self.writer
            .write_all(framed.as_bytes())
            .await
            .map_err(|e| self.unreachable(e))?;
        self.writer.flush().await.map_err(|e| self.unreachable(e))
    }

    /// Next line without its terminator, `None` once the peer closed the connection.
    pub async fn next_line(&mut self) -> RingResult<Option<String>> {
        let mut line = String::new();
        let read = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.reader.read_line(&mut line))
                .await
                .map_err(|_| {
                    RingError::PeerUnreachable(format!("Timed out waiting for {}", self.remote))
                })?,
            None => self.reader.read_line(&mut line).await,
        };

        match read.map_err(|e| self.unreachable(e))? {
            0 => Ok(None),
            _ => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    }

    /// Like [`LineStream::next_line`] but a closed connection is an error.
    pub async fn read_line(&mut self) -> RingResult<String> {
        self.next_line().await?.ok_or_else(|| {
            RingError::PeerUnreachable(format!("Connection closed by {}", self.remote))
        })
    }

    /// Sends one line and returns the single reply line.
    pub async fn request(host: &str, port: u16, line: &str) -> RingResult<String> {
        let mut stream = Self::connect(host, port).await?;
        stream.send_line(line).await?;
        stream.read_line().await
    }

    fn unreachable(&self, err: std::io::Error) -> RingError {
        RingError::PeerUnreachable(format!("I/O error with {}: {}", self.remote, err))
    }
}

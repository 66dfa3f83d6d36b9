use crate::error::TransportError;
use crate::frame::LineDecoder;
use crate::status::ConnectionRole;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

const READ_CHUNK_BYTES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens byte streams to an endpoint. Production code uses [`TcpConnector`];
/// anything that yields an async read/write stream can stand in for it.
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", self.connect_timeout),
            )),
        }
    }
}

/// An exclusively owned line-framed connection.
///
/// The stream is released exactly once: by [`LineConnection::close`], which is
/// idempotent, or by drop when the owning task is cancelled before it could
/// close. Every session pairs `open` with `close` on its normal paths and relies
/// on drop only for cancellation.
pub struct LineConnection<S> {
    endpoint: Endpoint,
    role: ConnectionRole,
    stream: Option<S>,
    decoder: LineDecoder,
    read_buf: Vec<u8>,
}

impl<S> LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn open<C>(
        connector: &C,
        endpoint: &Endpoint,
        role: ConnectionRole,
    ) -> Result<Self, TransportError>
    where
        C: Connector<Stream = S>,
    {
        let stream = connector
            .connect(endpoint)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        debug!(event = "connection_opened", role = %role, endpoint = %endpoint);
        Ok(Self::from_stream(stream, endpoint.clone(), role))
    }

    pub fn from_stream(stream: S, endpoint: Endpoint, role: ConnectionRole) -> Self {
        Self {
            endpoint,
            role,
            stream: Some(stream),
            decoder: LineDecoder::default(),
            read_buf: vec![0u8; READ_CHUNK_BYTES],
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Next complete line, or [`TransportError::Timeout`] once `timeout` passes
    /// without one. The socket read is raced against the deadline; bytes of an
    /// unfinished line stay buffered for the next call.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.decoder.next_line() {
                return line.map_err(TransportError::from);
            }
            let stream = self.stream.as_mut().ok_or(TransportError::Released)?;
            let read =
                match tokio::time::timeout_at(deadline, stream.read(&mut self.read_buf)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(TransportError::Timeout(timeout)),
                };
            if read == 0 {
                return Err(TransportError::Closed);
            }
            self.decoder.push_chunk(&self.read_buf[..read])?;
        }
    }

    pub async fn write_frame(
        &mut self,
        frame: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Released)?;
        let send = async {
            stream.write_all(frame).await?;
            stream.flush().await
        };
        match tokio::time::timeout(timeout, send).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write timed out after {timeout:?}"),
            ))),
        }
    }

    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if let Err(err) = stream.shutdown().await {
            debug!(event = "connection_shutdown_error", role = %self.role, error = %err);
        }
        drop(stream);
        debug!(event = "connection_closed", role = %self.role, endpoint = %self.endpoint);
    }
}

impl<S> Drop for LineConnection<S> {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            debug!(
                event = "connection_released_on_drop",
                role = %self.role,
                endpoint = %self.endpoint
            );
        }
    }
}

/// Hands out a single pre-made in-memory stream; later connects are refused.
#[cfg(test)]
pub(crate) struct OneShotConnector(std::sync::Mutex<Option<tokio::io::DuplexStream>>);

#[cfg(test)]
impl OneShotConnector {
    pub(crate) fn new(stream: tokio::io::DuplexStream) -> Self {
        Self(std::sync::Mutex::new(Some(stream)))
    }
}

#[cfg(test)]
impl Connector for OneShotConnector {
    type Stream = tokio::io::DuplexStream;

    async fn connect(&self, _endpoint: &Endpoint) -> io::Result<Self::Stream> {
        let stream = self.0.lock().expect("connector lock").take();
        stream.ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "already used"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};
    use tokio::net::TcpListener;

    fn pair() -> (LineConnection<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(1024);
        let conn = LineConnection::from_stream(
            client,
            Endpoint::new("test", 5000),
            ConnectionRole::Read,
        );
        (conn, server)
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_partial_line_for_next_read() {
        let (mut conn, mut server) = pair();
        server.write_all(b"Hello wor").await.expect("write");

        let err = conn
            .read_line(Duration::from_secs(1))
            .await
            .expect_err("partial line must not be emitted");
        assert!(matches!(err, TransportError::Timeout(_)));

        server.write_all(b"ld\nnext").await.expect("write");
        let line = conn.read_line(Duration::from_secs(1)).await.expect("line");
        assert_eq!(line, b"Hello world".to_vec());
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_without_leaking_its_tail() {
        let (mut conn, mut server) = pair();
        conn.decoder = LineDecoder::new(8);
        server.write_all(b"0123456789").await.expect("write");

        let err = conn
            .read_line(Duration::from_secs(1))
            .await
            .expect_err("oversized");
        assert!(matches!(err, TransportError::Frame(_)));

        server.write_all(b"ABC\nnext\n").await.expect("write");
        let line = conn.read_line(Duration::from_secs(1)).await.expect("line");
        assert_eq!(line, b"next".to_vec());
    }

    #[tokio::test]
    async fn end_of_stream_reports_closed() {
        let (mut conn, server) = pair();
        drop(server);
        let err = conn
            .read_line(Duration::from_secs(1))
            .await
            .expect_err("eof");
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut conn, mut server) = pair();
        conn.close().await;
        conn.close().await;
        assert!(conn.stream.is_none());

        let mut buf = [0u8; 8];
        let read = server.read(&mut buf).await.expect("read after close");
        assert_eq!(read, 0);

        let err = conn
            .write_frame(b"late\n\n", Duration::from_secs(1))
            .await
            .expect_err("released");
        assert!(matches!(err, TransportError::Released));
    }

    #[tokio::test]
    async fn dropping_connection_releases_stream() {
        let (conn, mut server) = pair();
        drop(conn);
        let mut buf = [0u8; 8];
        let read = server.read(&mut buf).await.expect("read after drop");
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn tcp_connector_opens_and_frames_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            stream.write_all(b"greeting\r\n").await.expect("write");
            let mut received = Vec::new();
            stream.read_to_end(&mut received).await.expect("read");
            received
        });

        let endpoint = Endpoint::new("127.0.0.1", port);
        let mut conn =
            LineConnection::open(&TcpConnector::default(), &endpoint, ConnectionRole::Write)
                .await
                .expect("open");
        let line = conn.read_line(Duration::from_secs(3)).await.expect("line");
        assert_eq!(line, b"greeting".to_vec());
        conn.write_frame(b"hi\n\n", Duration::from_secs(1))
            .await
            .expect("write");
        conn.close().await;

        let received = server.await.expect("join server");
        assert_eq!(received, b"hi\n\n".to_vec());
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let endpoint = Endpoint::new("127.0.0.1", port);
        let result: Result<LineConnection<TcpStream>, _> =
            LineConnection::open(&TcpConnector::default(), &endpoint, ConnectionRole::Read).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}

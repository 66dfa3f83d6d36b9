#![allow(dead_code)]

use minechat_core::{Connector, Credential, Endpoint, SupervisorConfig};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

pub const READ_PORT: u16 = 5000;
pub const WRITE_PORT: u16 = 5050;
pub const GREETING: &[u8] =
    b"Hello %username%! Enter your personal hash or leave it empty to create new account.\n";

/// Server side of one accepted connection; `usize` is the connection index
/// per port, starting at zero.
pub type Script = Arc<dyn Fn(usize, DuplexStream) + Send + Sync>;

/// Bytes each write connection received, keyed by connection index.
pub type Recorder = Arc<Mutex<HashMap<usize, Vec<u8>>>>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PortStats {
    pub opened: usize,
    pub live: usize,
}

#[derive(Default)]
struct Inner {
    scripts: Mutex<HashMap<u16, Script>>,
    stats: Mutex<HashMap<u16, PortStats>>,
    refusals: Mutex<HashMap<u16, (usize, usize)>>,
    overlapped: AtomicBool,
}

/// In-memory connector that counts opened and still-live streams per port and
/// notes whether a stream was opened while an earlier one was still live.
#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Arc<Inner>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, port: u16, script: Script) {
        self.inner
            .scripts
            .lock()
            .expect("scripts lock")
            .insert(port, script);
    }

    /// Refuses the next `count` connects to `port` before accepting any.
    pub fn refuse_first(&self, port: u16, count: usize) {
        self.inner
            .refusals
            .lock()
            .expect("refusals lock")
            .insert(port, (count, 0));
    }

    /// Connects to `port` refused so far.
    pub fn refused(&self, port: u16) -> usize {
        self.inner
            .refusals
            .lock()
            .expect("refusals lock")
            .get(&port)
            .map_or(0, |(_, refused)| *refused)
    }

    pub fn stats(&self, port: u16) -> PortStats {
        self.inner
            .stats
            .lock()
            .expect("stats lock")
            .get(&port)
            .copied()
            .unwrap_or_default()
    }

    pub fn overlapped(&self) -> bool {
        self.inner.overlapped.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    type Stream = TrackedStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<TrackedStream> {
        let port = endpoint.port;
        if let Some((remaining, refused)) =
            self.inner.refusals.lock().expect("refusals lock").get_mut(&port)
        {
            if *remaining > 0 {
                *remaining -= 1;
                *refused += 1;
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
        }
        let index = {
            let mut stats = self.inner.stats.lock().expect("stats lock");
            let entry = stats.entry(port).or_default();
            if entry.live > 0 {
                self.inner.overlapped.store(true, Ordering::SeqCst);
            }
            entry.live += 1;
            entry.opened += 1;
            entry.opened - 1
        };
        let script = self
            .inner
            .scripts
            .lock()
            .expect("scripts lock")
            .get(&port)
            .cloned();
        let (client, server) = duplex(64 * 1024);
        match script {
            Some(script) => script(index, server),
            None => drop(server),
        }
        Ok(TrackedStream {
            inner: client,
            port,
            owner: self.inner.clone(),
        })
    }
}

pub struct TrackedStream {
    inner: DuplexStream,
    port: u16,
    owner: Arc<Inner>,
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        if let Ok(mut stats) = self.owner.stats.lock() {
            if let Some(entry) = stats.get_mut(&self.port) {
                entry.live = entry.live.saturating_sub(1);
            }
        }
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

pub fn config(credential: Credential) -> SupervisorConfig {
    SupervisorConfig {
        read_endpoint: Endpoint::new("chat.test", READ_PORT),
        write_endpoint: Endpoint::new("chat.test", WRITE_PORT),
        credential,
        ..SupervisorConfig::default()
    }
}

async fn hold_until_eof(server: &mut DuplexStream) {
    let mut buf = [0u8; 256];
    while let Ok(read) = server.read(&mut buf).await {
        if read == 0 {
            break;
        }
    }
}

/// Read port that never says anything.
pub fn silent_read_server() -> Script {
    Arc::new(|_index: usize, mut server: DuplexStream| {
        tokio::spawn(async move { hold_until_eof(&mut server).await });
    })
}

/// Read port that sends `lines` on every connection, then stays quiet.
pub fn read_server_lines(lines: &'static [&'static str]) -> Script {
    Arc::new(move |_index: usize, mut server: DuplexStream| {
        tokio::spawn(async move {
            for line in lines {
                if server.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
            hold_until_eof(&mut server).await;
        });
    })
}

/// Read port whose first connection is closed by the server after `after`.
pub fn read_server_dropping_first(after: Duration) -> Script {
    Arc::new(move |index: usize, mut server: DuplexStream| {
        tokio::spawn(async move {
            if index == 0 {
                tokio::time::sleep(after).await;
                drop(server);
                return;
            }
            hold_until_eof(&mut server).await;
        });
    })
}

/// Write port: greets, answers the first `\n\n`-terminated request with
/// `reply(index)` and records everything the client wrote.
pub fn write_server(
    recorder: Recorder,
    reply: impl Fn(usize) -> &'static [u8] + Send + Sync + 'static,
) -> Script {
    Arc::new(move |index: usize, mut server: DuplexStream| {
        let reply = reply(index);
        let recorder = recorder.clone();
        tokio::spawn(async move {
            if server.write_all(GREETING).await.is_err() {
                return;
            }
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            let mut replied = false;
            loop {
                let read = match server.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(read) => read,
                };
                received.extend_from_slice(&buf[..read]);
                recorder
                    .lock()
                    .expect("recorder lock")
                    .insert(index, received.clone());
                if !replied && received.ends_with(b"\n\n") {
                    replied = true;
                    if server.write_all(reply).await.is_err() {
                        break;
                    }
                }
            }
        });
    })
}

pub fn recorded(recorder: &Recorder, index: usize) -> Vec<u8> {
    recorder
        .lock()
        .expect("recorder lock")
        .get(&index)
        .cloned()
        .unwrap_or_default()
}

/// Polls `check` every 10ms until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

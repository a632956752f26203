//! In-memory transports and a scripted connector.
//!
//! Everything the session core does (pooling, redirects, cookies, auth
//! retries, timeouts) is observable against a scripted peer without
//! opening a socket: [`ServerConnector`] hands out one end of an
//! in-memory duplex pair per dial and answers each request with the next
//! canned response, recording what it saw.

use crate::{Connector, TlsConfig};
use async_trait::async_trait;
use courier_http::{BoxedTransport, Result};
use futures_lite::{future::block_on, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll, Waker},
    time::Duration,
};
use url::Url;

/// One direction of an in-memory connection: a growable byte buffer with
/// a read cursor, a parked-reader waker, and a closed flag.
#[derive(Default)]
pub struct CloseableCursor(Mutex<CursorInner>);

#[derive(Default)]
struct CursorInner {
    data: Vec<u8>,
    cursor: usize,
    waker: Option<Waker>,
    closed: bool,
}

impl CloseableCursor {
    /// Close this direction, waking any parked reader. Subsequent reads
    /// see eof once the remaining bytes are consumed; writes are
    /// discarded.
    pub fn close(&self) {
        let mut inner = self.0.lock();
        inner.closed = true;
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }

    /// Whether every written byte has been read.
    pub fn is_current(&self) -> bool {
        let inner = self.0.lock();
        inner.cursor == inner.data.len()
    }
}

impl Debug for CloseableCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let inner = self.0.lock();
        f.debug_struct("CloseableCursor")
            .field("data", &String::from_utf8_lossy(&inner.data))
            .field("cursor", &inner.cursor)
            .field("closed", &inner.closed)
            .finish()
    }
}

impl AsyncRead for &CloseableCursor {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.0.lock();
        if inner.cursor < inner.data.len() {
            let bytes = buf.len().min(inner.data.len() - inner.cursor);
            buf[..bytes].copy_from_slice(&inner.data[inner.cursor..inner.cursor + bytes]);
            inner.cursor += bytes;
            Poll::Ready(Ok(bytes))
        } else if inner.closed {
            Poll::Ready(Ok(0))
        } else {
            inner.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl AsyncWrite for &CloseableCursor {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.0.lock();
        if inner.closed {
            Poll::Ready(Ok(0))
        } else {
            inner.data.extend_from_slice(buf);
            if let Some(waker) = inner.waker.take() {
                waker.wake();
            }
            Poll::Ready(Ok(buf.len()))
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        CloseableCursor::close(*self);
        Poll::Ready(Ok(()))
    }
}

/// One end of an in-memory connection pair.
#[derive(Clone, Debug)]
pub struct TestTransport {
    /// the cursor this end reads from
    pub read: Arc<CloseableCursor>,

    /// the cursor this end writes to
    pub write: Arc<CloseableCursor>,
}

impl TestTransport {
    /// Construct a connected pair. Bytes written to either end become
    /// readable at the other, and either end can close.
    pub fn new() -> (TestTransport, TestTransport) {
        let a = Arc::new(CloseableCursor::default());
        let b = Arc::new(CloseableCursor::default());

        (
            TestTransport {
                read: Arc::clone(&a),
                write: Arc::clone(&b),
            },
            TestTransport { read: b, write: a },
        )
    }

    /// Close the outgoing direction, which the peer observes as eof.
    pub fn close(&self) {
        self.write.close();
    }
}

impl AsyncRead for TestTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut &*self.read).poll_read(cx, buf)
    }
}

impl AsyncWrite for TestTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut &*self.write).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut &*self.write).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut &*self.write).poll_close(cx)
    }
}

/// One canned response in a [`ServerConnector`] script.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    bytes: Vec<u8>,
    close_after: bool,
    delay: Option<Duration>,
}

impl ScriptedResponse {
    /// A response from raw wire bytes.
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: raw.into(),
            close_after: false,
            delay: None,
        }
    }

    /// A 200 response with a content-length body.
    pub fn ok(body: &str) -> Self {
        Self::new(format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ))
    }

    /// Close the connection after sending this response, as a server
    /// hanging up on an idle keep-alive connection does.
    pub fn then_close(mut self) -> Self {
        self.close_after = true;
        self
    }

    /// Sleep before sending this response.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A connector that answers every request from a shared script of canned
/// responses, in order, across however many connections get dialed.
///
/// Each dial produces an in-memory pair serviced by a background thread
/// that reads requests (head plus content-length body) and replays the
/// next scripted response, recording everything it reads.
#[derive(Clone)]
pub struct ServerConnector {
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<String>>>,
    dials: Arc<AtomicUsize>,
}

impl ServerConnector {
    /// Build a connector that will serve these responses in order.
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Arc::new(Mutex::new(responses.into_iter().collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
            dials: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// How many connections have been dialed.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Every request received so far, head and body, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// The nth request received.
    ///
    /// Panics when fewer than `index + 1` requests have arrived.
    pub fn request(&self, index: usize) -> String {
        self.requests.lock()[index].clone()
    }
}

impl Debug for ServerConnector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnector")
            .field("queued", &self.script.lock().len())
            .field("requests", &self.requests.lock().len())
            .field("dials", &self.dials())
            .finish()
    }
}

#[async_trait]
impl Connector for ServerConnector {
    async fn connect(&self, _url: &Url, _tls: &TlsConfig) -> Result<BoxedTransport> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        let (client_side, server_side) = TestTransport::new();
        let script = Arc::clone(&self.script);
        let requests = Arc::clone(&self.requests);

        std::thread::spawn(move || block_on(serve(server_side, script, requests)));

        Ok(BoxedTransport::new(client_side))
    }
}

async fn serve(
    mut transport: TestTransport,
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<String>>>,
) {
    loop {
        let Some(request) = read_request(&mut transport).await else {
            return;
        };
        requests.lock().push(request);

        let Some(response) = script.lock().pop_front() else {
            transport.close();
            return;
        };

        if let Some(delay) = response.delay {
            std::thread::sleep(delay);
        }

        if transport.write_all(&response.bytes).await.is_err() {
            return;
        }

        if response.close_after {
            transport.close();
            return;
        }
    }
}

async fn read_request(transport: &mut TestTransport) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(index) = memchr::memmem::find(&buf, b"\r\n\r\n") {
            break index + 4;
        }
        match transport.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(bytes) => buf.extend_from_slice(&chunk[..bytes]),
        }
    };

    let content_length = String::from_utf8_lossy(&buf[..head_end])
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        match transport.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(bytes) => buf.extend_from_slice(&chunk[..bytes]),
        }
    }

    Some(String::from_utf8_lossy(&buf).into_owned())
}

use courier_http::{
    content_encoding, BoxedTransport, Headers, ReceivedBody, Status, Version,
};
use futures_lite::{AsyncRead, AsyncReadExt, Stream};
use std::{
    fmt::{self, Debug, Display, Formatter},
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use url::Url;

/// A complete, buffered http response.
///
/// An error status (4xx/5xx) is still a normal `Response`; call
/// [`Response::error_for_status`] to turn one into an [`HttpError`].
#[derive(Debug)]
pub struct Response {
    pub(crate) status: Status,
    pub(crate) reason: String,
    pub(crate) version: Version,
    pub(crate) headers: Headers,
    pub(crate) body: Vec<u8>,
    pub(crate) url: Url,
    pub(crate) elapsed: Duration,
    pub(crate) history: Vec<Response>,
}

impl Response {
    /// the response status
    pub fn status(&self) -> Status {
        self.status
    }

    /// the reason phrase as the server sent it
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// the negotiated http version
    pub fn version(&self) -> Version {
        self.version
    }

    /// the response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// the body bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// take ownership of the body bytes
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// The body decoded as text using the charset declared by the
    /// content-type header. Malformed sequences become replacement
    /// characters.
    pub fn text(&self) -> String {
        let (text, _, _) = content_encoding(&self.headers).decode(&self.body);
        text.into_owned()
    }

    /// The url of the last hop actually issued; redirects make this
    /// differ from the url the request started with.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// wall-clock time from first dial to the end of this response's head
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Responses for the redirect hops that led here, in order. Empty
    /// when the request was answered directly.
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    /// Whether the status is one a client follows (301, 302, 303, 307,
    /// 308).
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirect()
    }

    /// Pass the response through when its status is below 400, and
    /// produce an [`HttpError`] carrying the status, reason, and final
    /// url otherwise.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_error() {
            Err(HttpError {
                status: self.status,
                reason: self.reason,
                url: self.url,
            })
        } else {
            Ok(self)
        }
    }
}

/// An http application error produced by
/// [`Response::error_for_status`]: a well-formed response whose status
/// was 400 or above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    status: Status,
    reason: String,
    url: Url,
}

impl HttpError {
    /// the error status
    pub fn status(&self) -> Status {
        self.status
    }

    /// the reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// the url that produced the error
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status, self.reason, self.url)
    }
}

impl std::error::Error for HttpError {}

/// A response whose body has not been read yet.
///
/// The body is a finite, non-restartable sequence of byte chunks coupled
/// to the connection that produced it: draining it to the end releases
/// the connection back to the session pool, and dropping it early closes
/// the connection instead.
#[derive(Debug)]
pub struct StreamedResponse {
    pub(crate) status: Status,
    pub(crate) reason: String,
    pub(crate) version: Version,
    pub(crate) headers: Headers,
    pub(crate) url: Url,
    pub(crate) elapsed: Duration,
    pub(crate) history: Vec<Response>,
    pub(crate) body: BodyStream,
}

impl StreamedResponse {
    /// the response status
    pub fn status(&self) -> Status {
        self.status
    }

    /// the reason phrase as the server sent it
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// the negotiated http version
    pub fn version(&self) -> Version {
        self.version
    }

    /// the response headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// the url of the last hop actually issued
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// wall-clock time from first dial to the end of this response's head
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// responses for the redirect hops that led here, in order
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    /// Take the lazy body.
    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Borrow the lazy body, for incremental reads that keep the rest of
    /// the response around.
    pub fn body_mut(&mut self) -> &mut BodyStream {
        &mut self.body
    }
}

/// The lazy byte sequence of a [`StreamedResponse`].
///
/// Implements both [`AsyncRead`] and [`Stream`] of byte chunks. The
/// request deadline extends over the drain: reads past the deadline fail
/// with a timeout and drop the connection.
pub struct BodyStream {
    pub(crate) inner: ReceivedBody<'static, BoxedTransport>,
    pub(crate) deadline: Option<async_io::Timer>,
    pub(crate) timed_out: bool,
}

impl BodyStream {
    fn check_deadline(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        // a fired timer must not be polled again
        if !self.timed_out {
            let expired = self
                .deadline
                .as_mut()
                .is_some_and(|timer| Pin::new(timer).poll(cx).is_ready());

            if expired {
                self.deadline = None;
                self.timed_out = true;
            }
        }

        if self.timed_out {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request deadline elapsed while streaming the body",
            ));
        }

        Ok(())
    }

    /// Read the remaining chunks into one buffer.
    pub async fn read_bytes(mut self) -> courier_http::Result<Vec<u8>> {
        let mut content = Vec::new();
        let mut buf = vec![0; 16 * 1024];
        loop {
            match self.read(&mut buf).await {
                Ok(0) => return Ok(content),
                Ok(bytes) => content.extend_from_slice(&buf[..bytes]),
                Err(error) if error.kind() == io::ErrorKind::TimedOut => {
                    return Err(courier_http::Error::TimedOut)
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Read the remaining chunks as text, decoded with the response
    /// charset.
    pub async fn read_string(self) -> courier_http::Result<String> {
        let encoding = self.inner.encoding();
        let bytes = self.read_bytes().await?;
        let (text, _, _) = encoding.decode(&bytes);
        Ok(text.into_owned())
    }

    /// Read and discard the remaining chunks, releasing the connection
    /// for reuse.
    pub async fn drain(self) -> courier_http::Result<u64> {
        let mut total = 0;
        let mut this = self;
        let mut buf = vec![0; 16 * 1024];
        loop {
            match this.read(&mut buf).await {
                Ok(0) => return Ok(total),
                Ok(bytes) => total += bytes as u64,
                Err(error) if error.kind() == io::ErrorKind::TimedOut => {
                    return Err(courier_http::Error::TimedOut)
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

impl AsyncRead for BodyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if let Err(error) = self.check_deadline(cx) {
            return Poll::Ready(Err(error));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Stream for BodyStream {
    type Item = io::Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Err(error) = self.check_deadline(cx) {
            return Poll::Ready(Some(Err(error)));
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Debug for BodyStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("inner", &self.inner)
            .field("deadline", &self.deadline.is_some())
            .field("timed_out", &self.timed_out)
            .finish()
    }
}

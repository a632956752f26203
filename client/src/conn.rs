use crate::{
    plan::RequestPlan,
    pool::{Connection, Origin, Pool},
    response::{BodyStream, Response, StreamedResponse},
    AuthContext, Client,
};
use courier_http::{
    content_encoding, BoxedTransport, Buffer, Error, Headers, KnownHeaderName, Method,
    ReceivedBody, ReceivedBodyState, Result, Status, Version,
};
use futures_lite::{future::poll_once, io, AsyncReadExt, AsyncWriteExt};
use memchr::memmem::Finder;
use std::{
    io::Write,
    time::{Duration, Instant},
};
use url::Url;

const MAX_RESPONSE_HEADERS: usize = 128;

/// One completed send/receive exchange: the parsed response head plus the
/// connection it arrived on, with the body not yet consumed.
#[derive(Debug)]
pub(crate) struct Conn {
    pub(crate) status: Status,
    pub(crate) reason: String,
    pub(crate) version: Version,
    pub(crate) response_headers: Headers,
    pub(crate) method: Method,
    pub(crate) buffer: Buffer,
    pub(crate) body_state: ReceivedBodyState,
    pub(crate) connection: Option<Connection>,
    pub(crate) hop_elapsed: Duration,
}

/// Run a single hop of `plan`: materialize the request, send it on a
/// pooled or fresh connection, parse the response head, fold `Set-Cookie`
/// values into the jar, and perform at most one automatic retry when a
/// 401 carries a challenge the plan's auth scheme can absorb.
pub(crate) async fn exchange(client: &Client, plan: &mut RequestPlan) -> Result<Conn> {
    let hop_started = Instant::now();
    let origin = Origin::from_url(&plan.url)?;

    // a connection deliberately carried from the 401 to the retry
    let mut carried: Option<Connection> = None;

    loop {
        let headers = materialize_headers(client, plan).await?;
        let head = build_head(plan.method, &plan.url, &headers)?;

        let mut connection =
            acquire_and_send_head(client, plan, &origin, &head, carried.take()).await?;

        if let Some(mut body) = plan.body.take_for_send()? {
            io::copy(&mut body, &mut connection.transport).await?;
        }

        let mut conn = receive_head(client, plan.method, connection).await?;

        integrate_cookies(client, &plan.url, &conn.response_headers).await;

        if conn.status == Status::UNAUTHORIZED && !plan.auth_retried {
            let challenged = plan
                .auth
                .as_ref()
                .is_some_and(|auth| auth.handle_challenge(&conn.response_headers));

            if challenged {
                plan.auth_retried = true;
                log::debug!("absorbed auth challenge from {origin}; retrying once");
                carried = conn.reclaim(client.max_body_length).await;
                continue;
            }
        }

        conn.hop_elapsed = hop_started.elapsed();
        return Ok(conn);
    }
}

/// Session defaults and plan headers have already been merged into
/// `plan.headers`; this fills in the per-hop parts: `Host`, the jar's
/// `Cookie` header (unless the plan carries its own), body framing, and
/// credentials.
async fn materialize_headers(client: &Client, plan: &RequestPlan) -> Result<Headers> {
    let mut headers = plan.headers.clone();

    let host = plan.url.host_str().ok_or(Error::InvalidUrl)?;
    headers.try_insert_with(KnownHeaderName::Host, || match plan.url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    });

    if !headers.has_header(KnownHeaderName::Cookie) {
        let jar = client.jar.read().await;
        let cookie = jar.cookie_header(&plan.url);
        if !cookie.is_empty() {
            headers.insert(KnownHeaderName::Cookie, cookie);
        }
    }

    if plan.body.is_present() {
        match plan.body.content_length() {
            Some(length) => headers.insert(KnownHeaderName::ContentLength, length),
            None => headers.insert(KnownHeaderName::TransferEncoding, "chunked"),
        }
    }

    if let Some(auth) = &plan.auth {
        let uri = request_target(&plan.url);
        auth.apply(
            &mut headers,
            &AuthContext {
                method: plan.method,
                uri: &uri,
            },
        );
    }

    Ok(headers)
}

/// the request-line target: path plus query
pub(crate) fn request_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

fn build_head(method: Method, url: &Url, headers: &Headers) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(128);
    write!(buf, "{method} {} HTTP/1.1\r\n", request_target(url))?;

    for (name, values) in headers {
        for value in values {
            write!(buf, "{name}: ")?;
            buf.extend_from_slice(value.as_ref());
            buf.extend_from_slice(b"\r\n");
        }
    }

    buf.extend_from_slice(b"\r\n");

    log::trace!(
        "{}",
        String::from_utf8_lossy(&buf).replace("\r\n", "\r\n> ")
    );

    Ok(buf)
}

/// Find a connection that will take the request head: the carried
/// connection from an auth retry, then pooled candidates, then a fresh
/// dial.
///
/// A pooled socket may have been closed by the peer while idle. A healthy
/// idle connection has nothing to read, so a candidate whose probe read
/// is ready (data or eof) is stale and dropped; one whose head write
/// fails is likewise dropped. The head write doubles as the liveness
/// test, which is what makes stale-socket handling transparent: by the
/// time a candidate is accepted, the head is already on it.
async fn acquire_and_send_head(
    client: &Client,
    plan: &RequestPlan,
    origin: &Origin,
    head: &[u8],
    carried: Option<Connection>,
) -> Result<Connection> {
    let mut probe = [0u8; 1];

    if let Some(mut connection) = carried {
        if poll_once(connection.transport.read(&mut probe)).await.is_none()
            && connection.transport.write_all(head).await.is_ok()
        {
            return Ok(connection);
        }
        log::debug!("carried connection to {origin} went stale");
    }

    while let Some(mut candidate) = client.pool.checkout(origin) {
        if poll_once(candidate.transport.read(&mut probe)).await.is_none()
            && candidate.transport.write_all(head).await.is_ok()
        {
            log::debug!("reusing pooled connection to {origin}");
            return Ok(candidate);
        }
        log::debug!("discarding stale pooled connection to {origin}");
    }

    let transport = client.connector.connect(&plan.url, &plan.tls).await?;
    log::debug!("opened new connection to {origin}");
    let mut connection = Connection::new(transport, origin.clone());
    connection.transport.write_all(head).await?;
    Ok(connection)
}

async fn receive_head(client: &Client, method: Method, connection: Connection) -> Result<Conn> {
    let mut conn = Conn {
        status: Status::OK,
        reason: String::new(),
        version: Version::Http1_1,
        response_headers: Headers::new(),
        method,
        buffer: Buffer::with_capacity(256),
        body_state: ReceivedBodyState::Start,
        connection: Some(connection),
        hop_elapsed: Duration::ZERO,
    };

    // informational responses precede the real head
    loop {
        conn.parse_head(client.max_head_length).await?;
        if !conn.status.is_informational() {
            break;
        }
        log::debug!("skipping interim {} response", conn.status);
        conn.response_headers = Headers::new();
    }

    conn.validate_response_headers()?;
    Ok(conn)
}

async fn integrate_cookies(client: &Client, url: &Url, response_headers: &Headers) {
    let Some(values) = response_headers.get_values(KnownHeaderName::SetCookie) else {
        return;
    };

    let mut jar = client.jar.write().await;
    for value in values {
        match value.as_str() {
            Some(value) => {
                jar.set_from_header(value, url);
            }
            None => log::debug!("ignoring non-utf8 set-cookie header"),
        }
    }
}

impl Conn {
    async fn read_head(&mut self, max_head_length: usize) -> Result<usize> {
        let Self {
            buffer,
            connection: Some(connection),
            ..
        } = self
        else {
            return Err(Error::Closed);
        };

        let finder = Finder::new(b"\r\n\r\n");
        let mut len = buffer.len();

        if len > 0 {
            if let Some(index) = finder.find(&buffer[..len]) {
                return Ok(index + 4);
            }
        }

        let mut search_start = len.saturating_sub(3);

        loop {
            buffer.expand();
            let bytes = connection.transport.read(&mut buffer[len..]).await?;
            len += bytes;

            if let Some(index) = finder.find(&buffer[search_start..len]) {
                buffer.truncate(len);
                return Ok(search_start + index + 4);
            }

            search_start = len.saturating_sub(3);

            if bytes == 0 {
                return if len == 0 {
                    Err(Error::Closed)
                } else {
                    Err(Error::InvalidResponse)
                };
            }

            if len >= max_head_length {
                return Err(Error::HeadersTooLong);
            }
        }
    }

    async fn parse_head(&mut self, max_head_length: usize) -> Result<()> {
        let head_offset = self.read_head(max_head_length).await?;

        log::trace!(
            "{}",
            String::from_utf8_lossy(&self.buffer[..head_offset]).replace("\r\n", "\r\n< ")
        );

        let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
        let mut parsed = httparse::Response::new(&mut headers);

        match parsed.parse(&self.buffer[..head_offset])? {
            httparse::Status::Complete(parsed_len) if parsed_len == head_offset => {}
            _ => return Err(Error::InvalidResponse),
        }

        self.status = Status::try_from(parsed.code.ok_or(Error::InvalidResponse)?)?;
        self.version = parsed
            .version
            .and_then(Version::from_minor)
            .ok_or(Error::InvalidResponse)?;
        self.reason = parsed.reason.unwrap_or_default().to_string();

        for header in parsed.headers.iter() {
            self.response_headers
                .append(header.name, header.value.to_vec());
        }

        self.buffer.skip_front(head_offset);
        Ok(())
    }

    fn validate_response_headers(&self) -> Result<()> {
        let chunked = self
            .response_headers
            .eq_ignore_ascii_case(KnownHeaderName::TransferEncoding, "chunked");

        if self.response_headers.has_header(KnownHeaderName::ContentLength) {
            if chunked {
                return Err(Error::UnexpectedHeader("content-length"));
            }

            let parsable = self
                .response_headers
                .get_str(KnownHeaderName::ContentLength)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .is_some();

            if !parsable {
                return Err(Error::MalformedHeader("content-length".into()));
            }
        }

        Ok(())
    }

    /// head responses and the bodiless statuses have no body no matter
    /// what the headers claim; otherwise content-length or chunked
    /// decides
    pub(crate) fn content_length(&self) -> Option<u64> {
        if self.method == Method::Head
            || self.status == Status::NO_CONTENT
            || self.status == Status::NOT_MODIFIED
        {
            return Some(0);
        }

        if self
            .response_headers
            .eq_ignore_ascii_case(KnownHeaderName::TransferEncoding, "chunked")
        {
            return None;
        }

        self.response_headers
            .get_str(KnownHeaderName::ContentLength)
            .and_then(|value| value.trim().parse().ok())
            .or(Some(0))
    }

    pub(crate) fn is_keep_alive(&self) -> bool {
        match self.version {
            Version::Http1_1 => !self
                .response_headers
                .contains_ignore_ascii_case(KnownHeaderName::Connection, "close"),
            Version::Http1_0 => self
                .response_headers
                .contains_ignore_ascii_case(KnownHeaderName::Connection, "keep-alive"),
        }
    }

    /// Buffer the whole response body, leaving the connection in place
    /// for [`Conn::release`].
    pub(crate) async fn read_body(&mut self, max_len: Option<u64>) -> Result<Vec<u8>> {
        let content_length = self.content_length();
        let encoding = content_encoding(&self.response_headers);

        let Self {
            buffer,
            body_state,
            connection: Some(connection),
            ..
        } = self
        else {
            return Err(Error::Closed);
        };

        ReceivedBody::<BoxedTransport>::new(
            content_length,
            buffer,
            &mut connection.transport,
            body_state,
            None,
            encoding,
            max_len,
        )
        .read_bytes()
        .await
    }

    /// Check the connection back into the pool when this exchange ended
    /// cleanly (body fully read, both sides keep-alive); drop it
    /// otherwise.
    pub(crate) fn release(&mut self, pool: &Pool) {
        let reusable = self.body_state == ReceivedBodyState::End && self.is_keep_alive();
        match self.connection.take() {
            Some(connection) if reusable => pool.checkin(connection),
            _ => {}
        }
    }

    /// Drain the body so the connection can carry the auth retry;
    /// a connection that is not keep-alive is dropped instead.
    async fn reclaim(mut self, max_len: Option<u64>) -> Option<Connection> {
        if !self.is_keep_alive() {
            return None;
        }
        self.read_body(max_len).await.ok()?;
        self.connection.take()
    }

    /// Convert this exchange into a streamed response whose body owns the
    /// connection. Draining the body hands the connection back to the
    /// pool (when keep-alive permits); dropping the body drops the
    /// connection.
    pub(crate) fn into_streamed(
        mut self,
        pool: &Pool,
        url: Url,
        history: Vec<Response>,
        elapsed: Duration,
        deadline: Option<Instant>,
    ) -> Result<StreamedResponse> {
        let content_length = self.content_length();
        let encoding = content_encoding(&self.response_headers);
        let keep_alive = self.is_keep_alive();

        let Connection {
            transport,
            origin,
            created,
            ..
        } = self.connection.take().ok_or(Error::Closed)?;

        let on_completion = keep_alive.then(|| {
            let pool = pool.clone();
            Box::new(move |transport: BoxedTransport| {
                pool.checkin(Connection {
                    transport,
                    origin: origin.clone(),
                    created,
                    last_used: Instant::now(),
                    reused: true,
                });
            }) as Box<dyn Fn(BoxedTransport) + Send + Sync>
        });

        let inner = ReceivedBody::new(
            content_length,
            std::mem::take(&mut self.buffer),
            transport,
            self.body_state,
            on_completion,
            encoding,
            None,
        );

        Ok(StreamedResponse {
            status: self.status,
            reason: std::mem::take(&mut self.reason),
            version: self.version,
            headers: std::mem::take(&mut self.response_headers),
            url,
            elapsed,
            history,
            body: BodyStream {
                inner,
                deadline: deadline.map(async_io::Timer::at),
                timed_out: false,
            },
        })
    }
}

use crate::{
    jar::CookieJar,
    plan::{PlanBody, RequestPlan},
    pool::{Pool, DEFAULT_IDLE_WINDOW, DEFAULT_MAX_IDLE_PER_ORIGIN},
    redirects, Auth, Connector, RequestOptions, Response, StreamedResponse, TlsConfig,
};
use async_io::Timer;
use async_lock::RwLock;
use courier_http::{Error, Headers, KnownHeaderName, Method, Result};
use futures_lite::FutureExt;
use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use url::Url;

const USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_REDIRECTS: u32 = 30;
const DEFAULT_MAX_HEAD_LENGTH: usize = 1024 * 1024;

/// Something that can become the absolute url of a request.
pub trait IntoUrl {
    /// Produce an absolute http(s) url, or explain why not.
    fn into_url(self) -> Result<Url>;
}

impl IntoUrl for Url {
    fn into_url(self) -> Result<Url> {
        match self.scheme() {
            "http" | "https" => {}
            _ => return Err(Error::InvalidScheme),
        }

        if self.host_str().is_none() {
            return Err(Error::InvalidUrl);
        }

        Ok(self)
    }
}

impl IntoUrl for &str {
    fn into_url(self) -> Result<Url> {
        Url::parse(self)
            .map_err(|_| Error::InvalidUrl)
            .and_then(IntoUrl::into_url)
    }
}

impl IntoUrl for String {
    fn into_url(self) -> Result<Url> {
        self.as_str().into_url()
    }
}

impl IntoUrl for &Url {
    fn into_url(self) -> Result<Url> {
        self.clone().into_url()
    }
}

/// An http session: a connection pool, cookie jar, and request defaults
/// behind one handle.
///
/// Sequential requests on one session observe each other's cookie and
/// auth-state updates. A `Client` is cheap to clone; clones share the
/// pool and the jar. Concurrent use of one session from several tasks is
/// not coordinated here and needs external serialization.
///
/// ```no_run
/// use courier_client::{Client, RequestOptions, TcpConfig};
///
/// # futures_lite::future::block_on(async {
/// let client = Client::new(TcpConfig::default());
/// let response = client
///     .get("http://example.com/", RequestOptions::new())
///     .await?;
/// assert!(response.status().is_success());
/// # courier_client::Result::Ok(()) });
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) pool: Pool,
    pub(crate) jar: Arc<RwLock<CookieJar>>,
    default_headers: Arc<Headers>,
    auth: Option<Auth>,
    tls: TlsConfig,
    timeout: Duration,
    max_redirects: u32,
    cross_origin_auth: bool,
    pub(crate) max_head_length: usize,
    pub(crate) max_body_length: Option<u64>,
}

macro_rules! method {
    ($fn_name:ident, $streamed_fn_name:ident, $method:ident) => {
        #[doc = concat!(
            "Perform a ", stringify!($method), " request to `url`, returning the \
             buffered response."
        )]
        pub async fn $fn_name(
            &self,
            url: impl IntoUrl,
            options: RequestOptions,
        ) -> Result<Response> {
            self.request(Method::$method, url, options).await
        }

        #[doc = concat!(
            "Perform a ", stringify!($method), " request to `url`, returning a \
             response whose body is read lazily from the connection."
        )]
        pub async fn $streamed_fn_name(
            &self,
            url: impl IntoUrl,
            options: RequestOptions,
        ) -> Result<StreamedResponse> {
            self.request_streamed(Method::$method, url, options).await
        }
    };
}

impl Client {
    /// Construct a session that dials through `connector`, with default
    /// settings: a 30 second timeout, 30 redirects, certificate
    /// verification on, and an empty cookie jar.
    pub fn new(connector: impl Connector) -> Self {
        Self {
            connector: Arc::new(connector),
            pool: Pool::new(DEFAULT_MAX_IDLE_PER_ORIGIN, DEFAULT_IDLE_WINDOW),
            jar: Arc::new(RwLock::new(CookieJar::new())),
            default_headers: Arc::new(
                Headers::new()
                    .with_inserted_header(KnownHeaderName::UserAgent, USER_AGENT)
                    .with_inserted_header(KnownHeaderName::Accept, "*/*"),
            ),
            auth: None,
            tls: TlsConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            cross_origin_auth: false,
            max_head_length: DEFAULT_MAX_HEAD_LENGTH,
            max_body_length: None,
        }
    }

    method!(get, get_streamed, Get);
    method!(post, post_streamed, Post);
    method!(put, put_streamed, Put);
    method!(patch, patch_streamed, Patch);
    method!(delete, delete_streamed, Delete);
    method!(head, head_streamed, Head);
    method!(options, options_streamed, Options);

    /// Perform a request, following redirects and buffering the body.
    pub async fn request(
        &self,
        method: Method,
        url: impl IntoUrl,
        options: RequestOptions,
    ) -> Result<Response> {
        if self.pool.is_closed() {
            return Err(Error::Closed);
        }

        let plan = self.build_plan(method, url.into_url()?, options);
        let timeout = plan.timeout;
        self.with_deadline(timeout, redirects::follow(self, plan))
            .await
    }

    /// Perform a request, following redirects, and return as soon as the
    /// terminal response's head has been parsed. The body is a lazy byte
    /// sequence owning the connection; the request deadline covers its
    /// drain.
    pub async fn request_streamed(
        &self,
        method: Method,
        url: impl IntoUrl,
        options: RequestOptions,
    ) -> Result<StreamedResponse> {
        if self.pool.is_closed() {
            return Err(Error::Closed);
        }

        let plan = self.build_plan(method, url.into_url()?, options);
        let timeout = plan.timeout;
        let deadline = Instant::now() + timeout;
        self.with_deadline(
            timeout,
            redirects::follow_streamed(self, plan, Some(deadline)),
        )
        .await
    }

    /// Drop all pooled connections and refuse further requests.
    pub fn close(&self) {
        self.pool.close();
    }

    /// borrow the default request headers
    pub fn default_headers(&self) -> &Headers {
        &self.default_headers
    }

    /// Mutably borrow the default request headers, copying on write when
    /// they are shared with another clone of this session.
    pub fn default_headers_mut(&mut self) -> &mut Headers {
        Arc::make_mut(&mut self.default_headers)
    }

    /// chainable method to set a default request header
    pub fn with_default_header(
        mut self,
        name: impl Into<courier_http::HeaderName>,
        values: impl Into<courier_http::HeaderValues>,
    ) -> Self {
        self.default_headers_mut().insert(name, values);
        self
    }

    /// chainable method to remove a default request header
    pub fn without_default_header(mut self, name: impl Into<courier_http::HeaderName>) -> Self {
        self.default_headers_mut().remove(name);
        self
    }

    /// The session's cookie jar handle. Cookies set by responses land
    /// here; the handle can be cloned, inspected, and seeded.
    pub fn cookie_jar(&self) -> &Arc<RwLock<CookieJar>> {
        &self.jar
    }

    /// chainable method to substitute a cookie jar, e.g. one shared with
    /// another session or pre-seeded
    pub fn with_cookie_jar(mut self, jar: Arc<RwLock<CookieJar>>) -> Self {
        self.jar = jar;
        self
    }

    /// set the default auth applied to every request
    pub fn set_auth(&mut self, auth: Auth) {
        self.auth = Some(auth);
    }

    /// chainable [`Client::set_auth`]
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.set_auth(auth);
        self
    }

    /// set the tls trust and verification configuration
    pub fn set_tls_config(&mut self, tls: TlsConfig) {
        self.tls = tls;
    }

    /// chainable [`Client::set_tls_config`]
    pub fn with_tls_config(mut self, tls: TlsConfig) -> Self {
        self.set_tls_config(tls);
        self
    }

    /// set the default per-request deadline
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// chainable [`Client::set_timeout`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// set the default redirect limit
    pub fn set_max_redirects(&mut self, max_redirects: u32) {
        self.max_redirects = max_redirects;
    }

    /// chainable [`Client::set_max_redirects`]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.set_max_redirects(max_redirects);
        self
    }

    /// keep credentials on redirects that leave the original origin
    /// (default off)
    pub fn with_cross_origin_auth(mut self, cross_origin_auth: bool) -> Self {
        self.cross_origin_auth = cross_origin_auth;
        self
    }

    /// cap the size of a response head (default 1 MiB)
    pub fn with_max_head_length(mut self, max_head_length: usize) -> Self {
        self.max_head_length = max_head_length;
        self
    }

    /// cap the size of buffered response bodies (default unlimited);
    /// streamed bodies are never limited
    pub fn with_max_body_length(mut self, max_body_length: u64) -> Self {
        self.max_body_length = Some(max_body_length);
        self
    }

    /// tune the connection pool: per-origin idle cap (default 8) and
    /// idle window (default 90 seconds)
    pub fn with_pool_config(mut self, max_idle_per_origin: usize, idle_window: Duration) -> Self {
        self.pool = Pool::new(max_idle_per_origin, idle_window);
        self
    }

    fn build_plan(&self, method: Method, url: Url, options: RequestOptions) -> RequestPlan {
        let mut headers = Headers::clone(&self.default_headers);
        if let Some(option_headers) = options.headers {
            headers.insert_all(option_headers);
        }

        let mut body = PlanBody::None;
        let mut content_type = None;

        if let Some(raw) = options.body {
            body = match raw.fixed_bytes() {
                Some(bytes) => PlanBody::Bytes(bytes.to_vec()),
                None => PlanBody::Streaming(Some(raw)),
            };
        } else if let Some(json) = options.json {
            content_type = Some("application/json");
            body = PlanBody::Bytes(json.into_bytes());
        } else if let Some(data) = options.data {
            content_type = Some("application/x-www-form-urlencoded");
            body = PlanBody::Bytes(data.into_bytes());
        }

        if let Some(content_type) = content_type {
            headers.try_insert(KnownHeaderName::ContentType, content_type);
        }

        let mut tls = self.tls.clone();
        if let Some(verify) = options.verify {
            tls.verify = verify;
        }

        RequestPlan {
            method,
            url,
            headers,
            body,
            timeout: options.timeout.unwrap_or(self.timeout),
            max_redirects: options.max_redirects.unwrap_or(self.max_redirects),
            allow_redirects: options.allow_redirects.unwrap_or(true),
            tls,
            auth: options.auth.or_else(|| self.auth.clone()),
            cross_origin_auth: options.cross_origin_auth.unwrap_or(self.cross_origin_auth),
            history: Vec::new(),
            auth_retried: false,
        }
    }

    async fn with_deadline<T>(
        &self,
        duration: Duration,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        future
            .or(async {
                Timer::after(duration).await;
                Err(Error::TimedOut)
            })
            .await
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pool", &self.pool)
            .field("default_headers", &self.default_headers)
            .field("auth", &self.auth)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .field("max_redirects", &self.max_redirects)
            .field("cross_origin_auth", &self.cross_origin_auth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::IntoUrl;
    use courier_http::Error;

    #[test]
    fn url_validation() {
        assert!("http://example.com/a".into_url().is_ok());
        assert!("https://example.com".into_url().is_ok());
        assert!(matches!(
            "ftp://example.com/".into_url(),
            Err(Error::InvalidScheme)
        ));
        assert!(matches!(
            "data:text/plain,hi".into_url(),
            Err(Error::InvalidScheme)
        ));
        assert!(matches!("/relative".into_url(), Err(Error::InvalidUrl)));
        assert!(matches!("not a url".into_url(), Err(Error::InvalidUrl)));
    }
}

use crate::Auth;
use courier_http::{Body, Headers};
use std::{path::PathBuf, time::Duration};

/// Per-request settings, each overriding the session default when set.
///
/// ```
/// use courier_client::RequestOptions;
/// use std::time::Duration;
///
/// let options = RequestOptions::new()
///     .with_header("x-request-id", "abc123")
///     .with_data("k=v")
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct RequestOptions {
    /// headers for this request. a name also present in the session
    /// defaults replaces the default value; otherwise it is additive.
    pub headers: Option<Headers>,

    /// a pre-serialized json body. sets `Content-Type: application/json`
    /// unless an explicit content-type was provided.
    pub json: Option<String>,

    /// a urlencoded form body. sets
    /// `Content-Type: application/x-www-form-urlencoded` unless an
    /// explicit content-type was provided.
    pub data: Option<String>,

    /// a raw request body. takes precedence over `json` and `data`.
    pub body: Option<Body>,

    /// overall deadline for this request, redirects included
    pub timeout: Option<Duration>,

    /// redirect limit for this request
    pub max_redirects: Option<u32>,

    /// whether to follow redirects at all
    pub allow_redirects: Option<bool>,

    /// whether to verify tls certificates. `Some(false)` uses an
    /// ephemeral unverified tls configuration for this request only.
    pub verify: Option<bool>,

    /// authentication for this request, overriding the session auth
    pub auth: Option<Auth>,

    /// whether to keep `Authorization` and auth state on redirects that
    /// leave the original origin
    pub cross_origin_auth: Option<bool>,
}

impl RequestOptions {
    /// Construct an empty set of options; every field defers to the
    /// session default.
    pub fn new() -> Self {
        Self::default()
    }

    /// chainable setter for a single header
    pub fn with_header(
        mut self,
        name: impl Into<courier_http::HeaderName>,
        value: impl Into<courier_http::HeaderValues>,
    ) -> Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .insert(name, value);
        self
    }

    /// chainable setter for [`RequestOptions::json`]
    pub fn with_json(mut self, json: impl Into<String>) -> Self {
        self.json = Some(json.into());
        self
    }

    /// chainable setter for [`RequestOptions::data`]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// chainable setter for [`RequestOptions::body`]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// chainable setter for [`RequestOptions::timeout`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// chainable setter for [`RequestOptions::max_redirects`]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// chainable setter for [`RequestOptions::allow_redirects`]
    pub fn with_allow_redirects(mut self, allow_redirects: bool) -> Self {
        self.allow_redirects = Some(allow_redirects);
        self
    }

    /// chainable setter for [`RequestOptions::verify`]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    /// chainable setter for [`RequestOptions::auth`]
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// chainable setter for [`RequestOptions::cross_origin_auth`]
    pub fn with_cross_origin_auth(mut self, cross_origin_auth: bool) -> Self {
        self.cross_origin_auth = Some(cross_origin_auth);
        self
    }
}

/// TLS trust and verification settings, shared by all requests on a
/// session unless a request disables verification.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// whether to verify the server certificate chain and name
    pub verify: bool,

    /// a pem file of additional trust anchors. when set, replaces the
    /// built-in webpki roots.
    pub ca_file: Option<PathBuf>,

    /// a directory of pem trust anchor files. when set, replaces the
    /// built-in webpki roots.
    pub ca_path: Option<PathBuf>,

    /// pem client certificate chain for mutual tls
    pub client_cert: Option<PathBuf>,

    /// pem client private key for mutual tls
    pub client_key: Option<PathBuf>,

    /// the name to use for sni and certificate verification in place of
    /// the url host
    pub hostname: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify: true,
            ca_file: None,
            ca_path: None,
            client_cert: None,
            client_key: None,
            hostname: None,
        }
    }
}

impl TlsConfig {
    /// Construct the default configuration: verification on, webpki
    /// roots, no client certificate.
    pub fn new() -> Self {
        Self::default()
    }

    /// chainable setter for [`TlsConfig::verify`]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// chainable setter for [`TlsConfig::ca_file`]
    pub fn with_ca_file(mut self, ca_file: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(ca_file.into());
        self
    }

    /// chainable setter for [`TlsConfig::ca_path`]
    pub fn with_ca_path(mut self, ca_path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }

    /// chainable setter for [`TlsConfig::hostname`]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

use std::{
    fmt::{self, Display, Formatter},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use url::Url;

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// sent only on same-site requests
    Strict,
    /// sent on same-site requests and top-level cross-site navigations
    Lax,
    /// sent on all requests
    None,
}

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    expires: Option<SystemTime>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    /// Construct a session cookie for an explicit domain and path.
    ///
    /// The domain is stored case-folded with any leading dot removed, and
    /// matches subdomains; see [`Cookie::with_host_only`] for exact-host
    /// cookies.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let mut domain: String = domain.into();
        domain.make_ascii_lowercase();
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.trim_start_matches('.').to_string(),
            host_only: false,
            path: path.into(),
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// the cookie name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// the cookie value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// the domain this cookie is scoped to, without a leading dot
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// the path this cookie is scoped to
    pub fn path(&self) -> &str {
        &self.path
    }

    /// the expiry instant; None for a session cookie
    pub fn expires(&self) -> Option<SystemTime> {
        self.expires
    }

    /// whether this cookie is only sent over https
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// whether this cookie is hidden from script access
    pub fn http_only(&self) -> bool {
        self.http_only
    }

    /// the samesite attribute, when one was set
    pub fn same_site(&self) -> Option<SameSite> {
        self.same_site
    }

    /// chainable setter for the expiry instant
    pub fn with_expires(mut self, expires: SystemTime) -> Self {
        self.expires = Some(expires);
        self
    }

    /// chainable setter for the secure flag
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// chainable setter for the httponly flag
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// chainable setter for the samesite attribute
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// chainable setter for host-only matching: the cookie is sent to its
    /// exact domain and never to subdomains
    pub fn with_host_only(mut self, host_only: bool) -> Self {
        self.host_only = host_only;
        self
    }

    /// Whether this cookie's expiry has passed. Session cookies never
    /// expire.
    pub fn is_expired(&self) -> bool {
        match self.expires {
            None => false,
            Some(expires) => SystemTime::now() > expires,
        }
    }

    /// rfc 6265 §5.1.3: the request host equals the cookie domain, or is
    /// a dot-separated suffix of it (unless the cookie is host-only)
    fn domain_matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if host == self.domain {
            return true;
        }
        if self.host_only {
            return false;
        }
        host.len() > self.domain.len()
            && host.ends_with(&self.domain)
            && host.as_bytes()[host.len() - self.domain.len() - 1] == b'.'
    }

    /// rfc 6265 §5.1.4 path matching
    fn path_matches(&self, request_path: &str) -> bool {
        let request_path = if request_path.is_empty() {
            "/"
        } else {
            request_path
        };

        request_path == self.path
            || (request_path.starts_with(&self.path)
                && (self.path.ends_with('/')
                    || request_path.as_bytes().get(self.path.len()) == Some(&b'/')))
    }

    /// Whether this cookie should be sent on a request to `url`.
    pub fn matches(&self, url: &Url) -> bool {
        if self.is_expired() {
            return false;
        }

        if self.secure && url.scheme() != "https" {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };

        self.domain_matches(host) && self.path_matches(url.path())
    }
}

impl Display for Cookie {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// rfc 6265 cookie storage: uniqueness on `(name, domain, path)`,
/// insertion-ordered, serialized longest-path-first.
///
/// `Domain` attributes are accepted whenever they are the request host or
/// a dot-boundary suffix of it; the public suffix list is not consulted,
/// so a cookie scoped to e.g. `co.uk` will be stored if a server on a
/// `co.uk` host sets one.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    /// Construct an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cookie, replacing any existing cookie with the same
    /// `(name, domain, path)`. Replacement preserves the original's
    /// position in insertion order.
    pub fn set(&mut self, cookie: Cookie) {
        match self.cookies.iter_mut().find(|existing| {
            existing.name == cookie.name
                && existing.domain == cookie.domain
                && existing.path == cookie.path
        }) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// Parse one `Set-Cookie` header value received from `request_url`
    /// and store the result. Returns false when the header is malformed
    /// or the cookie is rejected (a `Domain` attribute that the request
    /// host does not match).
    pub fn set_from_header(&mut self, set_cookie: &str, request_url: &Url) -> bool {
        let Some(request_host) = request_url.host_str() else {
            return false;
        };
        let request_host = request_host.to_ascii_lowercase();

        let mut parts = set_cookie.split(';');

        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            log::debug!("ignoring set-cookie without a name=value pair");
            return false;
        };

        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return false;
        }

        let mut domain = None;
        let mut path = None;
        let mut expires = None;
        let mut max_age = None;
        let mut secure = false;
        let mut http_only = false;
        let mut same_site = None;

        for attribute in parts {
            let (key, attr_value) = match attribute.split_once('=') {
                Some((key, value)) => (key.trim().to_ascii_lowercase(), value.trim()),
                None => (attribute.trim().to_ascii_lowercase(), ""),
            };

            match key.as_str() {
                "expires" => expires = httpdate::parse_http_date(attr_value).ok(),
                "max-age" => max_age = attr_value.parse::<i64>().ok(),
                "domain" => {
                    let candidate = attr_value.trim_start_matches('.').to_ascii_lowercase();
                    if !candidate.is_empty() {
                        domain = Some(candidate);
                    }
                }
                "path" => {
                    if attr_value.starts_with('/') {
                        path = Some(attr_value.to_string());
                    }
                }
                "secure" => secure = true,
                "httponly" => http_only = true,
                "samesite" => {
                    same_site = match attr_value.to_ascii_lowercase().as_str() {
                        "strict" => Some(SameSite::Strict),
                        "lax" => Some(SameSite::Lax),
                        "none" => Some(SameSite::None),
                        _ => None,
                    }
                }
                _ => {}
            }
        }

        // a Domain attribute must cover the request host; otherwise the
        // cookie is rejected outright
        let (domain, host_only) = match domain {
            Some(domain) if domain == request_host => (domain, false),
            Some(domain) => {
                let dotted = format!(".{domain}");
                if request_host.ends_with(&dotted) {
                    (domain, false)
                } else {
                    log::debug!("rejecting cookie {name} scoped to foreign domain {domain}");
                    return false;
                }
            }
            None => (request_host, true),
        };

        // max-age wins over expires; zero or negative means expired now
        let expires = match max_age {
            Some(seconds) if seconds <= 0 => Some(UNIX_EPOCH),
            Some(seconds) => Some(SystemTime::now() + Duration::from_secs(seconds as u64)),
            None => expires,
        };

        let mut cookie = Cookie::new(name, value, domain, path.unwrap_or_else(|| default_path(request_url)))
            .with_secure(secure)
            .with_http_only(http_only)
            .with_host_only(host_only);
        cookie.expires = expires;
        cookie.same_site = same_site;

        self.set(cookie);
        true
    }

    /// All unexpired cookies matching this url, ordered by path length
    /// descending with ties broken by insertion order.
    pub fn cookies_for(&self, url: &Url) -> Vec<&Cookie> {
        let mut matches: Vec<&Cookie> = self
            .cookies
            .iter()
            .filter(|cookie| cookie.matches(url))
            .collect();
        matches.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        matches
    }

    /// The `Cookie` header value for a request to this url, or an empty
    /// string when nothing matches (callers omit the header).
    pub fn cookie_header(&self, url: &Url) -> String {
        self.cookies_for(url)
            .iter()
            .map(|cookie| cookie.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Remove the cookie with this name and domain. With a path, only
    /// that exact triple is removed; without one, every path for the
    /// name/domain pair is.
    pub fn remove(&mut self, name: &str, domain: &str, path: Option<&str>) {
        let domain = domain.trim_start_matches('.').to_ascii_lowercase();
        self.cookies.retain(|cookie| {
            !(cookie.name == name
                && cookie.domain == domain
                && path.map_or(true, |path| cookie.path == path))
        });
    }

    /// Drop every expired cookie.
    pub fn remove_expired(&mut self) {
        self.cookies.retain(|cookie| !cookie.is_expired());
    }

    /// Drop every cookie.
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// The number of stored cookies, expired ones included.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether the jar is empty.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Iterate over stored cookies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }
}

impl<'a> IntoIterator for &'a CookieJar {
    type Item = &'a Cookie;
    type IntoIter = std::slice::Iter<'a, Cookie>;

    fn into_iter(self) -> Self::IntoIter {
        self.cookies.iter()
    }
}

/// rfc 6265 §5.1.4: the request path up to but not including its last
/// slash, or `/` when that leaves nothing
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(index) if index > 0 => path[..index].to_string(),
        _ => "/".to_string(),
    }
}

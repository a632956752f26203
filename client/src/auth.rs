use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use courier_http::{Headers, KnownHeaderName, Method};
use md5::{Digest as _, Md5};
use parking_lot::Mutex;
use rand::Rng;
use sha2::Sha256;
use std::{
    fmt::{self, Debug, Formatter, Write},
    sync::Arc,
};

/// What an auth scheme gets to look at while attaching credentials: the
/// method and request target feed digest's HA2.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext<'a> {
    /// the request method
    pub method: Method,

    /// the request target (path plus query) as it appears on the request
    /// line
    pub uri: &'a str,
}

/// A user-defined credential applicator, for schemes beyond the built-in
/// three.
///
/// Stateful schemes keep their state behind interior mutability so that
/// absorbing a challenge is an explicit transition on a shared handle
/// rather than a hidden side effect.
pub trait AuthScheme: Debug + Send + Sync + 'static {
    /// Attach credentials to an outgoing request.
    fn apply(&self, headers: &mut Headers, context: &AuthContext<'_>);

    /// Absorb a 401 response. Returning true requests one automatic
    /// retry of the request with the freshly absorbed state.
    fn handle_challenge(&self, response_headers: &Headers) -> bool {
        let _ = response_headers;
        false
    }

    /// Duplicate this scheme. Stateful schemes decide whether the copy
    /// shares state with the original.
    fn clone_scheme(&self) -> Box<dyn AuthScheme>;
}

/// Credentials attached to a session or to a single request.
#[non_exhaustive]
pub enum Auth {
    /// rfc 7617 basic auth
    Basic {
        /// the username
        username: String,
        /// the password
        password: String,
    },

    /// rfc 6750 bearer tokens
    Bearer {
        /// the token, sent verbatim
        token: String,
    },

    /// rfc 7616 digest auth
    Digest(DigestAuth),

    /// a user-defined scheme
    Custom(Box<dyn AuthScheme>),
}

impl Auth {
    /// Basic credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// A bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer {
            token: token.into(),
        }
    }

    /// Digest credentials. No header is sent until a server challenge
    /// has been absorbed.
    pub fn digest(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Digest(DigestAuth::new(username, password))
    }

    pub(crate) fn apply(&self, headers: &mut Headers, context: &AuthContext<'_>) {
        match self {
            Auth::Basic { username, password } => {
                let credentials = BASE64.encode(format!("{username}:{password}"));
                headers.insert(KnownHeaderName::Authorization, format!("Basic {credentials}"));
            }

            Auth::Bearer { token } => {
                headers.insert(KnownHeaderName::Authorization, format!("Bearer {token}"));
            }

            Auth::Digest(digest) => digest.apply(headers, context),

            Auth::Custom(scheme) => scheme.apply(headers, context),
        }
    }

    /// Basic and bearer ignore challenges; digest absorbs one and asks
    /// for a retry.
    pub(crate) fn handle_challenge(&self, response_headers: &Headers) -> bool {
        match self {
            Auth::Basic { .. } | Auth::Bearer { .. } => false,
            Auth::Digest(digest) => digest.handle_challenge(response_headers),
            Auth::Custom(scheme) => scheme.handle_challenge(response_headers),
        }
    }
}

impl Clone for Auth {
    fn clone(&self) -> Self {
        match self {
            Auth::Basic { username, password } => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            Auth::Bearer { token } => Auth::Bearer {
                token: token.clone(),
            },
            Auth::Digest(digest) => Auth::Digest(digest.clone()),
            Auth::Custom(scheme) => Auth::Custom(scheme.clone_scheme()),
        }
    }
}

impl Debug for Auth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"..")
                .finish(),
            Auth::Bearer { .. } => f.debug_struct("Bearer").field("token", &"..").finish(),
            Auth::Digest(digest) => Debug::fmt(digest, f),
            Auth::Custom(scheme) => Debug::fmt(scheme, f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestHash {
    Md5,
    Sha256,
}

impl DigestHash {
    fn digest(&self, input: &str) -> String {
        match self {
            DigestHash::Md5 => hex(&Md5::digest(input.as_bytes())),
            DigestHash::Sha256 => hex(&Sha256::digest(input.as_bytes())),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[derive(Debug, Clone)]
struct DigestChallenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    // the qop we will answer with, when the server offered auth
    qop: Option<String>,
    // the algorithm token exactly as the server sent it, echoed back
    algorithm: Option<String>,
    hash: DigestHash,
    session: bool,
    nc: u32,
}

/// rfc 7616 digest credentials.
///
/// The challenge lives behind a shared lock: clones of this value (for
/// example, the per-request copy of a session's auth) observe and advance
/// the same nonce count, and a challenge absorbed by one response is
/// visible to the next request.
#[derive(Clone)]
pub struct DigestAuth {
    username: String,
    password: String,
    challenge: Arc<Mutex<Option<DigestChallenge>>>,
}

impl Debug for DigestAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuth")
            .field("username", &self.username)
            .field("password", &"..")
            .field("challenged", &self.challenge.lock().is_some())
            .finish()
    }
}

impl DigestAuth {
    /// Construct digest credentials with no challenge state.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            challenge: Arc::new(Mutex::new(None)),
        }
    }

    fn apply(&self, headers: &mut Headers, context: &AuthContext<'_>) {
        let mut guard = self.challenge.lock();
        let Some(challenge) = guard.as_mut() else {
            // first contact: send nothing and wait for the 401
            return;
        };

        challenge.nc += 1;
        let nc = format!("{:08x}", challenge.nc);
        let cnonce = cnonce();

        let hash = challenge.hash;
        let mut ha1 = hash.digest(&format!(
            "{}:{}:{}",
            self.username, challenge.realm, self.password
        ));
        if challenge.session {
            ha1 = hash.digest(&format!("{ha1}:{}:{cnonce}", challenge.nonce));
        }

        let ha2 = hash.digest(&format!("{}:{}", context.method, context.uri));

        let response = match &challenge.qop {
            Some(qop) => hash.digest(&format!(
                "{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}",
                challenge.nonce
            )),
            None => hash.digest(&format!("{ha1}:{}:{ha2}", challenge.nonce)),
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\"",
            self.username, challenge.realm, challenge.nonce, context.uri
        );

        if let Some(qop) = &challenge.qop {
            let _ = write!(header, ", qop={qop}, nc={nc}, cnonce=\"{cnonce}\"");
        }

        let _ = write!(header, ", response=\"{response}\"");

        if let Some(opaque) = &challenge.opaque {
            let _ = write!(header, ", opaque=\"{opaque}\"");
        }

        if let Some(algorithm) = &challenge.algorithm {
            let _ = write!(header, ", algorithm={algorithm}");
        }

        headers.insert(KnownHeaderName::Authorization, header);
    }

    fn handle_challenge(&self, response_headers: &Headers) -> bool {
        let Some(values) = response_headers.get_values(KnownHeaderName::WwwAuthenticate) else {
            return false;
        };

        for value in values {
            let Some(value) = value.as_str() else {
                continue;
            };

            let trimmed = value.trim_start();
            let Some(params) = strip_scheme(trimmed, "digest") else {
                continue;
            };

            let params = parse_challenge_params(params);
            let find = |key: &str| {
                params
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
            };

            let (Some(realm), Some(nonce)) = (find("realm"), find("nonce")) else {
                continue;
            };

            let algorithm = find("algorithm");
            let (hash, session) = match algorithm.as_deref() {
                None => (DigestHash::Md5, false),
                Some(token) if token.eq_ignore_ascii_case("md5") => (DigestHash::Md5, false),
                Some(token) if token.eq_ignore_ascii_case("md5-sess") => (DigestHash::Md5, true),
                Some(token) if token.eq_ignore_ascii_case("sha-256") => {
                    (DigestHash::Sha256, false)
                }
                Some(token) if token.eq_ignore_ascii_case("sha-256-sess") => {
                    (DigestHash::Sha256, true)
                }
                Some(other) => {
                    log::debug!("ignoring digest challenge with unsupported algorithm {other}");
                    continue;
                }
            };

            // answer with qop=auth when offered; auth-int requires a body
            // hash and is not supported
            let qop = find("qop").and_then(|offered| {
                offered
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("auth"))
                    .then(|| "auth".to_string())
            });

            *self.challenge.lock() = Some(DigestChallenge {
                realm,
                nonce,
                opaque: find("opaque"),
                qop,
                algorithm,
                hash,
                session,
                nc: 0,
            });

            return true;
        }

        false
    }
}

/// 16 hex characters from the thread-local cryptographic rng.
fn cnonce() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, rest) = value.split_at(value.len().min(scheme.len()));
    (head.eq_ignore_ascii_case(scheme) && rest.starts_with(|c: char| c.is_ascii_whitespace()))
        .then(|| rest.trim_start())
}

/// Parse `key=value, key="quoted, value"` challenge parameters, handling
/// commas inside quoted strings and `\"` escapes.
fn parse_challenge_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace() || *c == ',') {
            chars.next();
        }

        let mut key = String::new();
        while matches!(chars.peek(), Some(c) if *c != '=' && *c != ',' && !c.is_ascii_whitespace())
        {
            key.push(chars.next().unwrap());
        }

        if key.is_empty() {
            break;
        }

        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace()) {
            chars.next();
        }

        if chars.peek() != Some(&'=') {
            // valueless token; skip it
            continue;
        }
        chars.next();

        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    other => value.push(other),
                }
            }
        } else {
            while matches!(chars.peek(), Some(c) if *c != ',') {
                value.push(chars.next().unwrap());
            }
            value.truncate(value.trim_end().len());
        }

        params.push((key.to_ascii_lowercase(), value));
    }

    params
}

#[cfg(test)]
mod tests {
    use super::{cnonce, parse_challenge_params, Auth, AuthContext, DigestHash};
    use courier_http::{Headers, KnownHeaderName, Method};

    fn context() -> AuthContext<'static> {
        AuthContext {
            method: Method::Get,
            uri: "/a",
        }
    }

    #[test]
    fn basic_sets_base64_credentials() {
        let mut headers = Headers::new();
        Auth::basic("user", "pass").apply(&mut headers, &context());
        assert_eq!(
            headers.get_str(KnownHeaderName::Authorization),
            // base64("user:pass")
            Some("Basic dXNlcjpwYXNz")
        );
    }

    #[test]
    fn bearer_sets_token() {
        let mut headers = Headers::new();
        Auth::bearer("tok123").apply(&mut headers, &context());
        assert_eq!(
            headers.get_str(KnownHeaderName::Authorization),
            Some("Bearer tok123")
        );
    }

    #[test]
    fn basic_and_bearer_ignore_challenges() {
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::WwwAuthenticate, "Basic realm=\"r\"");
        assert!(!Auth::basic("u", "p").handle_challenge(&headers));
        assert!(!Auth::bearer("t").handle_challenge(&headers));
    }

    #[test]
    fn digest_is_silent_before_challenge() {
        let mut headers = Headers::new();
        Auth::digest("u", "p").apply(&mut headers, &context());
        assert!(!headers.has_header(KnownHeaderName::Authorization));
    }

    #[test]
    fn digest_challenge_response_matches_rfc_formula() {
        let auth = Auth::digest("u", "p");

        let mut response_headers = Headers::new();
        response_headers.insert(
            KnownHeaderName::WwwAuthenticate,
            "Digest realm=\"r\", nonce=\"n\", qop=\"auth\"",
        );
        assert!(auth.handle_challenge(&response_headers));

        let mut headers = Headers::new();
        auth.apply(&mut headers, &context());
        let header = headers.get_str(KnownHeaderName::Authorization).unwrap();

        assert!(header.starts_with("Digest username=\"u\", realm=\"r\", nonce=\"n\", uri=\"/a\""));
        assert!(header.contains("qop=auth"));
        assert!(header.contains("nc=00000001"));

        let cnonce = extract(header, "cnonce=\"");
        assert_eq!(cnonce.len(), 16);
        assert!(cnonce.chars().all(|c| c.is_ascii_hexdigit()));

        let ha1 = DigestHash::Md5.digest("u:r:p");
        let ha2 = DigestHash::Md5.digest("GET:/a");
        let expected = DigestHash::Md5.digest(&format!("{ha1}:n:00000001:{cnonce}:auth:{ha2}"));
        assert_eq!(extract(header, "response=\""), expected);
    }

    #[test]
    fn digest_nc_increments_across_clones() {
        let auth = Auth::digest("u", "p");
        let mut response_headers = Headers::new();
        response_headers.insert(
            KnownHeaderName::WwwAuthenticate,
            "Digest realm=\"r\", nonce=\"n\"",
        );
        assert!(auth.handle_challenge(&response_headers));

        // a per-request clone shares challenge state with the session copy
        let clone = auth.clone();
        let mut headers = Headers::new();
        clone.apply(&mut headers, &context());
        let mut headers = Headers::new();
        auth.apply(&mut headers, &context());

        // no qop offered, so nc is not serialized, but the response uses
        // the no-qop formula
        let header = headers.get_str(KnownHeaderName::Authorization).unwrap();
        let ha1 = DigestHash::Md5.digest("u:r:p");
        let ha2 = DigestHash::Md5.digest("GET:/a");
        let expected = DigestHash::Md5.digest(&format!("{ha1}:n:{ha2}"));
        assert_eq!(extract(header, "response=\""), expected);
    }

    #[test]
    fn digest_echoes_opaque_and_algorithm() {
        let auth = Auth::digest("u", "p");
        let mut response_headers = Headers::new();
        response_headers.insert(
            KnownHeaderName::WwwAuthenticate,
            "Digest realm=\"r\", nonce=\"n\", opaque=\"xyz\", algorithm=MD5",
        );
        assert!(auth.handle_challenge(&response_headers));

        let mut headers = Headers::new();
        auth.apply(&mut headers, &context());
        let header = headers.get_str(KnownHeaderName::Authorization).unwrap();
        assert!(header.contains("opaque=\"xyz\""));
        assert!(header.contains("algorithm=MD5"));
    }

    #[test]
    fn unsupported_algorithm_is_not_absorbed() {
        let auth = Auth::digest("u", "p");
        let mut response_headers = Headers::new();
        response_headers.insert(
            KnownHeaderName::WwwAuthenticate,
            "Digest realm=\"r\", nonce=\"n\", algorithm=TIGER-192",
        );
        assert!(!auth.handle_challenge(&response_headers));
    }

    #[test]
    fn challenge_param_parsing() {
        let params = parse_challenge_params(
            "realm=\"with, comma\", nonce=abc, qop=\"auth,auth-int\", stale=true",
        );
        assert_eq!(
            params,
            vec![
                ("realm".to_string(), "with, comma".to_string()),
                ("nonce".to_string(), "abc".to_string()),
                ("qop".to_string(), "auth,auth-int".to_string()),
                ("stale".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn cnonce_is_sixteen_hex_chars() {
        let value = cnonce();
        assert_eq!(value.len(), 16);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
    }

    fn extract(header: &str, prefix: &str) -> String {
        let start = header.find(prefix).unwrap() + prefix.len();
        header[start..].chars().take_while(|c| *c != '"').collect()
    }
}

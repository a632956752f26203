use std::fmt::{self, Debug, Display, Formatter};

/// The value of a single http header.
///
/// Header values are usually utf8, but nothing on the wire guarantees it,
/// so the raw bytes are retained and `as_str` is fallible.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderValue(HeaderValueRepr);

#[derive(Clone, PartialEq, Eq)]
enum HeaderValueRepr {
    Utf8(String),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    /// This value as a str, if it is valid utf8.
    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            HeaderValueRepr::Utf8(s) => Some(s),
            HeaderValueRepr::Bytes(_) => None,
        }
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        Self(HeaderValueRepr::Utf8(s))
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        Self(HeaderValueRepr::Utf8(s.to_string()))
    }
}

impl From<Vec<u8>> for HeaderValue {
    fn from(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(s) => Self(HeaderValueRepr::Utf8(s)),
            Err(e) => Self(HeaderValueRepr::Bytes(e.into_bytes())),
        }
    }
}

impl From<&[u8]> for HeaderValue {
    fn from(bytes: &[u8]) -> Self {
        bytes.to_vec().into()
    }
}

impl From<u64> for HeaderValue {
    fn from(n: u64) -> Self {
        Self(HeaderValueRepr::Utf8(n.to_string()))
    }
}

impl AsRef<[u8]> for HeaderValue {
    fn as_ref(&self) -> &[u8] {
        match &self.0 {
            HeaderValueRepr::Utf8(s) => s.as_bytes(),
            HeaderValueRepr::Bytes(b) => b,
        }
    }
}

impl Display for HeaderValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0 {
            HeaderValueRepr::Utf8(s) => f.write_str(s),
            HeaderValueRepr::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl Debug for HeaderValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0 {
            HeaderValueRepr::Utf8(s) => Debug::fmt(s, f),
            HeaderValueRepr::Bytes(b) => write!(f, "{b:?}"),
        }
    }
}

impl PartialEq<str> for HeaderValue {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == Some(other)
    }
}

impl PartialEq<&str> for HeaderValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

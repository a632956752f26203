use std::{
    borrow::Cow,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// The name of an http header.
///
/// Names the client works with directly are represented by
/// [`KnownHeaderName`]; anything else is carried as a lowercased string.
/// Comparison and hashing are case-insensitive because construction
/// normalizes: parsing a known name always yields the `Known` variant, and
/// custom names are folded to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderName(HeaderNameRepr);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HeaderNameRepr {
    Known(KnownHeaderName),
    Custom(Cow<'static, str>),
}

/// Header names with dedicated representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum KnownHeaderName {
    /// accept
    Accept,
    /// authorization
    Authorization,
    /// connection
    Connection,
    /// content-length
    ContentLength,
    /// content-type
    ContentType,
    /// cookie
    Cookie,
    /// date
    Date,
    /// host
    Host,
    /// location
    Location,
    /// server
    Server,
    /// set-cookie
    SetCookie,
    /// transfer-encoding
    TransferEncoding,
    /// user-agent
    UserAgent,
    /// www-authenticate
    WwwAuthenticate,
}

impl KnownHeaderName {
    /// The canonical wire spelling of this header name.
    pub const fn as_str(&self) -> &'static str {
        use KnownHeaderName::*;
        match self {
            Accept => "Accept",
            Authorization => "Authorization",
            Connection => "Connection",
            ContentLength => "Content-Length",
            ContentType => "Content-Type",
            Cookie => "Cookie",
            Date => "Date",
            Host => "Host",
            Location => "Location",
            Server => "Server",
            SetCookie => "Set-Cookie",
            TransferEncoding => "Transfer-Encoding",
            UserAgent => "User-Agent",
            WwwAuthenticate => "WWW-Authenticate",
        }
    }
}

impl FromStr for KnownHeaderName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use KnownHeaderName::*;
        if !s.is_ascii() {
            return Err(());
        }

        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(Accept),
            "authorization" => Ok(Authorization),
            "connection" => Ok(Connection),
            "content-length" => Ok(ContentLength),
            "content-type" => Ok(ContentType),
            "cookie" => Ok(Cookie),
            "date" => Ok(Date),
            "host" => Ok(Host),
            "location" => Ok(Location),
            "server" => Ok(Server),
            "set-cookie" => Ok(SetCookie),
            "transfer-encoding" => Ok(TransferEncoding),
            "user-agent" => Ok(UserAgent),
            "www-authenticate" => Ok(WwwAuthenticate),
            _ => Err(()),
        }
    }
}

impl Display for KnownHeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HeaderName {
    /// This header name as a str. Known names use their canonical
    /// spelling; custom names are lowercase.
    pub fn as_str(&self) -> &str {
        match &self.0 {
            HeaderNameRepr::Known(known) => known.as_str(),
            HeaderNameRepr::Custom(custom) => custom,
        }
    }

    pub(crate) fn is_known(&self, known: KnownHeaderName) -> bool {
        matches!(&self.0, HeaderNameRepr::Known(k) if *k == known)
    }
}

impl From<KnownHeaderName> for HeaderName {
    fn from(known: KnownHeaderName) -> Self {
        Self(HeaderNameRepr::Known(known))
    }
}

impl From<&str> for HeaderName {
    fn from(s: &str) -> Self {
        match s.parse::<KnownHeaderName>() {
            Ok(known) => Self(HeaderNameRepr::Known(known)),
            Err(()) => Self(HeaderNameRepr::Custom(Cow::Owned(s.to_ascii_lowercase()))),
        }
    }
}

impl From<String> for HeaderName {
    fn from(s: String) -> Self {
        match s.parse::<KnownHeaderName>() {
            Ok(known) => Self(HeaderNameRepr::Known(known)),
            Err(()) => {
                let mut s = s;
                s.make_ascii_lowercase();
                Self(HeaderNameRepr::Custom(Cow::Owned(s)))
            }
        }
    }
}

impl PartialEq<KnownHeaderName> for HeaderName {
    fn eq(&self, other: &KnownHeaderName) -> bool {
        self.is_known(*other)
    }
}

impl Display for HeaderName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for HeaderName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

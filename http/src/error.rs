use std::{borrow::Cow, io};
use thiserror::Error;

/// Concrete failures that can occur while dialing, writing, or reading an
/// http exchange.
///
/// Application-level http errors (a well-formed response with status >= 400)
/// are not represented here; those are ordinary responses.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// the url was malformed or missing required components
    #[error("invalid url")]
    InvalidUrl,

    /// the url scheme was something other than http or https
    #[error("invalid url scheme")]
    InvalidScheme,

    /// the hostname did not resolve to any address
    #[error("dns resolution failed")]
    ResolveFailed,

    /// a tcp connection could not be established
    #[error("connection failed")]
    ConnectionFailed,

    /// the tls handshake did not complete
    #[error("tls handshake failed")]
    TlsHandshakeFailed,

    /// the operation did not complete within its deadline
    #[error("operation timed out")]
    TimedOut,

    /// the redirect limit was exceeded
    #[error("too many redirects")]
    TooManyRedirects,

    /// a buffered response body exceeded the configured limit
    #[error("response body larger than {0} byte limit")]
    BodyTooLarge(u64),

    /// the response head could not be parsed as http/1.x
    #[error("invalid http response")]
    InvalidResponse,

    /// the peer closed the connection, or the session was closed
    #[error("connection closed")]
    Closed,

    /// the operation was cancelled before it completed
    #[error("operation cancelled")]
    Cancelled,

    /// a reserved extension point was exercised
    #[error("not implemented")]
    NotImplemented,

    /// the response head was longer than allowed
    #[error("headers were malformed or longer than allowed")]
    HeadersTooLong,

    /// a header could not be parsed
    #[error("malformed http header {0}")]
    MalformedHeader(Cow<'static, str>),

    /// a header that does not make sense in context, such as
    /// content-length alongside transfer-encoding
    #[error("unexpected header: {0}")]
    UnexpectedHeader(&'static str),

    /// [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// A stable numeric identifier for this error kind, suitable for
    /// logging and interop with non-rust callers. Identifiers are never
    /// reassigned between releases.
    pub fn code(&self) -> u16 {
        match self {
            Error::InvalidUrl => 1,
            Error::InvalidScheme => 2,
            Error::ResolveFailed => 3,
            Error::ConnectionFailed => 4,
            Error::TlsHandshakeFailed => 5,
            Error::TimedOut => 6,
            Error::TooManyRedirects => 7,
            Error::BodyTooLarge(_) => 8,
            Error::InvalidResponse => 9,
            Error::Closed => 10,
            Error::Cancelled => 11,
            Error::NotImplemented => 12,
            Error::HeadersTooLong => 13,
            Error::MalformedHeader(_) => 14,
            Error::UnexpectedHeader(_) => 15,
            Error::Io(_) => 16,
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(error: httparse::Error) -> Self {
        log::debug!("response head parse error: {error}");
        Error::InvalidResponse
    }
}

/// this crate's result type
pub type Result<T> = std::result::Result<T, Error>;

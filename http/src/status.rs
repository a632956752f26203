use crate::Error;
use std::fmt::{self, Display, Formatter};

/// An HTTP response status code.
///
/// Stored as the raw three-digit code so that unrecognized codes coming
/// off the wire survive parsing. Well-known codes are available as
/// associated constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Status(u16);

impl Status {
    /// 100 Continue
    pub const CONTINUE: Status = Status(100);
    /// 200 OK
    pub const OK: Status = Status(200);
    /// 201 Created
    pub const CREATED: Status = Status(201);
    /// 204 No Content
    pub const NO_CONTENT: Status = Status(204);
    /// 301 Moved Permanently
    pub const MOVED_PERMANENTLY: Status = Status(301);
    /// 302 Found
    pub const FOUND: Status = Status(302);
    /// 303 See Other
    pub const SEE_OTHER: Status = Status(303);
    /// 304 Not Modified
    pub const NOT_MODIFIED: Status = Status(304);
    /// 307 Temporary Redirect
    pub const TEMPORARY_REDIRECT: Status = Status(307);
    /// 308 Permanent Redirect
    pub const PERMANENT_REDIRECT: Status = Status(308);
    /// 400 Bad Request
    pub const BAD_REQUEST: Status = Status(400);
    /// 401 Unauthorized
    pub const UNAUTHORIZED: Status = Status(401);
    /// 403 Forbidden
    pub const FORBIDDEN: Status = Status(403);
    /// 404 Not Found
    pub const NOT_FOUND: Status = Status(404);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Status = Status(500);
    /// 502 Bad Gateway
    pub const BAD_GATEWAY: Status = Status(502);
    /// 503 Service Unavailable
    pub const SERVICE_UNAVAILABLE: Status = Status(503);

    /// The numeric code.
    pub const fn code(&self) -> u16 {
        self.0
    }

    /// 1xx
    pub const fn is_informational(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    /// 2xx
    pub const fn is_success(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// True for the five statuses a client follows: 301, 302, 303, 307,
    /// and 308. Other 3xx codes (such as 304 Not Modified) are terminal.
    pub const fn is_redirect(&self) -> bool {
        matches!(self.0, 301 | 302 | 303 | 307 | 308)
    }

    /// 4xx or 5xx
    pub const fn is_error(&self) -> bool {
        self.0 >= 400 && self.0 < 600
    }

    /// The reason phrase registered for this code, if any. Servers may
    /// send a different phrase on the wire; this is the registry spelling.
    pub const fn canonical_reason(&self) -> Option<&'static str> {
        match self.0 {
            100 => Some("Continue"),
            101 => Some("Switching Protocols"),
            200 => Some("OK"),
            201 => Some("Created"),
            202 => Some("Accepted"),
            204 => Some("No Content"),
            206 => Some("Partial Content"),
            301 => Some("Moved Permanently"),
            302 => Some("Found"),
            303 => Some("See Other"),
            304 => Some("Not Modified"),
            307 => Some("Temporary Redirect"),
            308 => Some("Permanent Redirect"),
            400 => Some("Bad Request"),
            401 => Some("Unauthorized"),
            403 => Some("Forbidden"),
            404 => Some("Not Found"),
            405 => Some("Method Not Allowed"),
            408 => Some("Request Timeout"),
            409 => Some("Conflict"),
            410 => Some("Gone"),
            413 => Some("Content Too Large"),
            418 => Some("I'm a teapot"),
            429 => Some("Too Many Requests"),
            500 => Some("Internal Server Error"),
            501 => Some("Not Implemented"),
            502 => Some("Bad Gateway"),
            503 => Some("Service Unavailable"),
            504 => Some("Gateway Timeout"),
            _ => None,
        }
    }
}

impl TryFrom<u16> for Status {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self, Error> {
        if (100..600).contains(&code) {
            Ok(Status(code))
        } else {
            Err(Error::InvalidResponse)
        }
    }
}

impl From<Status> for u16 {
    fn from(status: Status) -> u16 {
        status.0
    }
}

impl PartialEq<u16> for Status {
    fn eq(&self, other: &u16) -> bool {
        self.0 == *other
    }
}

impl PartialEq<Status> for u16 {
    fn eq(&self, other: &Status) -> bool {
        *self == other.0
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

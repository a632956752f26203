use std::fmt::{self, Display, Formatter};

/// The http versions this crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/1.0, which defaults to connection-per-request
    Http1_0,

    /// HTTP/1.1, which defaults to keep-alive
    Http1_1,
}

impl Version {
    /// Build a version from the minor digit of an `HTTP/1.x` status line.
    pub const fn from_minor(minor: u8) -> Option<Self> {
        match minor {
            0 => Some(Version::Http1_0),
            1 => Some(Version::Http1_1),
            _ => None,
        }
    }

    /// The wire representation, e.g. `HTTP/1.1`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Version::Http1_0 => "HTTP/1.0",
            Version::Http1_1 => "HTTP/1.1",
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::Http1_1
    }
}

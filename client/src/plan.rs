use crate::{Auth, Response, TlsConfig};
use courier_http::{Body, Error, Headers, Method, Result};
use std::time::Duration;
use url::Url;

/// An outgoing request body the redirect and auth machinery can replay.
#[derive(Debug, Default)]
pub(crate) enum PlanBody {
    #[default]
    None,

    /// in-memory content; replayable any number of times
    Bytes(Vec<u8>),

    /// a streaming body; consumed by the first send, after which a replay
    /// (redirect with method preserved, or an auth retry) fails
    Streaming(Option<Body>),
}

impl PlanBody {
    pub(crate) fn content_length(&self) -> Option<u64> {
        match self {
            PlanBody::None => Some(0),
            PlanBody::Bytes(bytes) => Some(bytes.len() as u64),
            PlanBody::Streaming(Some(body)) => body.len(),
            PlanBody::Streaming(None) => Some(0),
        }
    }

    pub(crate) fn is_present(&self) -> bool {
        !matches!(self, PlanBody::None)
    }

    /// The body to write for this hop.
    pub(crate) fn take_for_send(&mut self) -> Result<Option<Body>> {
        match self {
            PlanBody::None => Ok(None),
            PlanBody::Bytes(bytes) => Ok(Some(Body::new_fixed(bytes.clone()))),
            PlanBody::Streaming(body) => match body.take() {
                Some(body) => Ok(Some(body)),
                None => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "streaming request body cannot be replayed",
                ))),
            },
        }
    }

    pub(crate) fn drop_content(&mut self) {
        *self = PlanBody::None;
    }
}

/// The resolved intent for one request: session defaults merged with the
/// caller's options, plus the state the redirect engine mutates between
/// hops.
#[derive(Debug)]
pub(crate) struct RequestPlan {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: Headers,
    pub(crate) body: PlanBody,
    pub(crate) timeout: Duration,
    pub(crate) max_redirects: u32,
    pub(crate) allow_redirects: bool,
    pub(crate) tls: TlsConfig,
    pub(crate) auth: Option<Auth>,
    pub(crate) cross_origin_auth: bool,
    pub(crate) history: Vec<Response>,
    /// set once the single automatic digest retry has been spent
    pub(crate) auth_retried: bool,
}

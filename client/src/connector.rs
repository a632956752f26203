use crate::TlsConfig;
use async_trait::async_trait;
use courier_http::{BoxedTransport, Result};
use url::Url;

/// Dials transports for the session.
///
/// The session core never touches sockets directly; everything it sends
/// goes through a `Connector`, which is what makes the client
/// executor-agnostic and lets tests substitute in-memory transports. The
/// tls settings are passed per call because a request can override
/// certificate verification without mutating the session's shared
/// configuration.
///
/// Implementations map their failures onto the error taxonomy:
/// [`Error::ResolveFailed`](courier_http::Error::ResolveFailed) for dns,
/// [`Error::ConnectionFailed`](courier_http::Error::ConnectionFailed) for
/// tcp, and
/// [`Error::TlsHandshakeFailed`](courier_http::Error::TlsHandshakeFailed)
/// for tls.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a transport to the origin of `url`, handshaken and ready
    /// for a request head.
    async fn connect(&self, url: &Url, tls: &TlsConfig) -> Result<BoxedTransport>;
}

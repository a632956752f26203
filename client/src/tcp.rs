use crate::{Connector, TlsConfig};
use async_io::Timer;
use async_net::TcpStream;
use async_trait::async_trait;
use courier_http::{BoxedTransport, Error, Result};
use futures_lite::FutureExt;
use std::{net::SocketAddr, time::Duration};
use url::{Host, Url};

/// Dials plaintext tcp connections with `async-net`.
///
/// Speaks `http` urls only; wrap it in
/// [`RustlsConfig`](crate::RustlsConfig) for `https`.
#[derive(Debug, Clone, Copy)]
pub struct TcpConfig {
    /// disable [nagle's algorithm](https://en.wikipedia.org/wiki/Nagle%27s_algorithm)
    pub nodelay: Option<bool>,

    /// time-to-live for outgoing packets
    pub ttl: Option<u32>,

    /// deadline for establishing one tcp connection, distinct from the
    /// request deadline (whichever fires first wins)
    pub connect_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            nodelay: None,
            ttl: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl TcpConfig {
    /// constructs a default TcpConfig
    pub fn new() -> Self {
        Self::default()
    }

    /// chainable setter for [`TcpConfig::nodelay`]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = Some(nodelay);
        self
    }

    /// chainable setter for [`TcpConfig::ttl`]
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// chainable setter for [`TcpConfig::connect_timeout`]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    async fn resolve(url: &Url) -> Result<Vec<SocketAddr>> {
        let host = url.host().ok_or(Error::InvalidUrl)?;
        let port = url.port_or_known_default().ok_or(Error::InvalidUrl)?;

        let addrs = match host {
            Host::Domain(domain) => async_net::resolve((domain, port)).await.map_err(|error| {
                log::debug!("failed to resolve {domain}: {error}");
                Error::ResolveFailed
            })?,
            Host::Ipv4(ip) => vec![SocketAddr::from((ip, port))],
            Host::Ipv6(ip) => vec![SocketAddr::from((ip, port))],
        };

        if addrs.is_empty() {
            return Err(Error::ResolveFailed);
        }

        Ok(addrs)
    }
}

#[async_trait]
impl Connector for TcpConfig {
    async fn connect(&self, url: &Url, _tls: &TlsConfig) -> Result<BoxedTransport> {
        if url.scheme() != "http" {
            return Err(Error::InvalidScheme);
        }

        let addrs = Self::resolve(url).await?;

        let mut tcp = None;
        for addr in addrs {
            let attempt = async { Some(TcpStream::connect(addr).await) }
                .or(async {
                    Timer::after(self.connect_timeout).await;
                    None
                })
                .await;

            match attempt {
                None => return Err(Error::TimedOut),
                Some(Ok(stream)) => {
                    tcp = Some(stream);
                    break;
                }
                Some(Err(error)) => {
                    log::debug!("connection attempt to {addr} failed: {error}");
                }
            }
        }

        let tcp = tcp.ok_or(Error::ConnectionFailed)?;

        if let Some(nodelay) = self.nodelay {
            tcp.set_nodelay(nodelay).map_err(Error::Io)?;
        }

        if let Some(ttl) = self.ttl {
            tcp.set_ttl(ttl).map_err(Error::Io)?;
        }

        Ok(BoxedTransport::new(tcp))
    }
}

use crate::{Connector, TlsConfig};
use async_trait::async_trait;
use courier_http::{BoxedTransport, Error, Result};
use futures_rustls::TlsConnector;
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    client::WantsClientCert,
    crypto::{ring, CryptoProvider},
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    ClientConfig, ConfigBuilder, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};
use url::Url;

/// Layers tls over an inner dialer: `https` urls are dialed through the
/// inner connector and handshaken with rustls; `http` urls pass straight
/// through.
///
/// ```no_run
/// use courier_client::{Client, RustlsConfig, TcpConfig};
///
/// let client = Client::new(RustlsConfig::new(TcpConfig::default()));
/// ```
#[derive(Debug, Clone)]
pub struct RustlsConfig<C> {
    tcp: C,
}

impl<C> RustlsConfig<C> {
    /// Wrap an inner dialer.
    pub fn new(tcp: C) -> Self {
        Self { tcp }
    }
}

impl<C: Default> Default for RustlsConfig<C> {
    fn default() -> Self {
        Self { tcp: C::default() }
    }
}

#[async_trait]
impl<C: Connector> Connector for RustlsConfig<C> {
    async fn connect(&self, url: &Url, tls: &TlsConfig) -> Result<BoxedTransport> {
        match url.scheme() {
            "https" => {
                // the inner dialer speaks plain tcp; hand it the same
                // authority under http
                let mut tcp_url = url.clone();
                let _ = tcp_url.set_port(url.port_or_known_default());
                tcp_url
                    .set_scheme("http")
                    .map_err(|()| Error::InvalidUrl)?;

                let tcp = self.tcp.connect(&tcp_url, tls).await?;

                let name = match &tls.hostname {
                    Some(hostname) => hostname.clone(),
                    None => url.host_str().ok_or(Error::InvalidUrl)?.to_string(),
                };

                let server_name = ServerName::try_from(name).map_err(|error| {
                    log::debug!("unusable tls server name: {error}");
                    Error::TlsHandshakeFailed
                })?;

                let config = client_config(tls)?;
                let stream = TlsConnector::from(config)
                    .connect(server_name, tcp)
                    .await
                    .map_err(|error| {
                        log::debug!("tls handshake with {url} failed: {error}");
                        Error::TlsHandshakeFailed
                    })?;

                Ok(BoxedTransport::new(stream))
            }

            "http" => self.tcp.connect(url, tls).await,

            _ => Err(Error::InvalidScheme),
        }
    }
}

fn client_config(tls: &TlsConfig) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(ring::default_provider());

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|error| {
            log::warn!("no usable tls protocol versions: {error}");
            Error::TlsHandshakeFailed
        })?;

    let builder = if tls.verify {
        builder.with_root_certificates(trust_anchors(tls)?)
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
    };

    let config = match (&tls.client_cert, &tls.client_key) {
        (Some(cert), Some(key)) => client_auth(builder, cert, key)?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            log::warn!("client_cert and client_key must be configured together");
            return Err(Error::TlsHandshakeFailed);
        }
    };

    Ok(Arc::new(config))
}

fn trust_anchors(tls: &TlsConfig) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();

    if tls.ca_file.is_none() && tls.ca_path.is_none() {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(roots);
    }

    if let Some(ca_file) = &tls.ca_file {
        add_pem_anchors(&mut roots, ca_file)?;
    }

    if let Some(ca_path) = &tls.ca_path {
        let entries = std::fs::read_dir(ca_path).map_err(Error::Io)?;
        for entry in entries {
            add_pem_anchors(&mut roots, &entry.map_err(Error::Io)?.path())?;
        }
    }

    if roots.is_empty() {
        log::warn!("configured trust anchors contained no usable certificates");
        return Err(Error::TlsHandshakeFailed);
    }

    Ok(roots)
}

fn add_pem_anchors(roots: &mut RootCertStore, path: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(path).map_err(Error::Io)?);
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(Error::Io)?;
        if let Err(error) = roots.add(cert) {
            log::debug!("skipping unusable certificate in {path:?}: {error}");
        }
    }
    Ok(())
}

fn client_auth(
    builder: ConfigBuilder<ClientConfig, WantsClientCert>,
    cert: &Path,
    key: &Path,
) -> Result<ClientConfig> {
    let mut reader = BufReader::new(File::open(cert).map_err(Error::Io)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<CertificateDer<'static>>>>()
        .map_err(Error::Io)?;

    let mut reader = BufReader::new(File::open(key).map_err(Error::Io)?);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut reader)
        .map_err(Error::Io)?
        .ok_or_else(|| {
            log::warn!("no private key found in {key:?}");
            Error::TlsHandshakeFailed
        })?;

    builder.with_client_auth_cert(certs, key).map_err(|error| {
        log::warn!("client certificate rejected: {error}");
        Error::TlsHandshakeFailed
    })
}

/// Accepts any certificate. Installed only when a session or request
/// disabled verification.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0
            .signature_verification_algorithms
            .supported_schemes()
    }
}

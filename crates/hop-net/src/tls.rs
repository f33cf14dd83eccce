//! TLS upgrade for page and prefetch requests.

use hop_core::HopError;
use hop_core::HopResult;
use std::io::Read;
use std::io::Write;
use std::net::TcpStream;

#[cfg(feature = "tls-rustls")]
use rustls::ClientConfig;
#[cfg(feature = "tls-rustls")]
use rustls::RootCertStore;
#[cfg(feature = "tls-rustls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "tls-rustls")]
use std::sync::Arc;

/// Controls which trust anchors verify server certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustStoreMode {
    /// Embedded Mozilla/WebPKI roots only.
    #[default]
    WebPkiOnly,
    /// WebPKI roots merged with operating-system roots (enterprise/local CAs).
    WebPkiAndOs,
}

impl TrustStoreMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "webpki" | "webpki-only" => Some(Self::WebPkiOnly),
            "os" | "webpki-and-os" => Some(Self::WebPkiAndOs),
            _ => None,
        }
    }
}

/// Any duplex byte stream a request can be written to.
pub trait IoStream: Read + Write + Send {}
impl<T> IoStream for T where T: Read + Write + Send {}

pub type BoxedIoStream = Box<dyn IoStream>;

/// Builds a reusable TLS client configuration. Construction is the expensive
/// part (root store loading), so callers keep one per client.
#[cfg(feature = "tls-rustls")]
#[derive(Clone)]
pub struct TlsConnector {
    config: Arc<ClientConfig>,
}

#[cfg(feature = "tls-rustls")]
impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

#[cfg(feature = "tls-rustls")]
impl TlsConnector {
    pub fn new(mode: TrustStoreMode) -> HopResult<Self> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|error| {
                HopError::new(
                    "net.tls.config_versions_invalid",
                    format!("failed to configure TLS protocol versions: {error}"),
                )
            })?
            .with_root_certificates(root_store(mode)?)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn connect(&self, mut stream: TcpStream, host: &str) -> HopResult<BoxedIoStream> {
        let server_name = ServerName::try_from(host.to_owned()).map_err(|error| {
            HopError::new(
                "net.tls.server_name_invalid",
                format!("invalid TLS server name `{host}`: {error}"),
            )
        })?;

        let mut connection = rustls::ClientConnection::new(self.config.clone(), server_name)
            .map_err(|error| {
                HopError::new(
                    "net.tls.connection_init_failed",
                    format!("failed to initialize TLS connection for `{host}`: {error}"),
                )
            })?;

        connection.complete_io(&mut stream).map_err(|error| {
            HopError::new(
                "net.tls.handshake_failed",
                format!("TLS handshake failed for `{host}`: {error}"),
            )
        })?;

        Ok(Box::new(rustls::StreamOwned::new(connection, stream)))
    }
}

#[cfg(feature = "tls-rustls")]
fn root_store(mode: TrustStoreMode) -> HopResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if mode == TrustStoreMode::WebPkiAndOs {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            tracing::warn!(%error, "skipping unreadable operating-system root");
        }

        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "merged operating-system roots");
    }

    if roots.is_empty() {
        return Err(HopError::new(
            "net.tls.root_store_empty",
            "no trust anchors available for TLS verification",
        ));
    }

    Ok(roots)
}

#[cfg(not(feature = "tls-rustls"))]
#[derive(Debug, Clone)]
pub struct TlsConnector;

#[cfg(not(feature = "tls-rustls"))]
impl TlsConnector {
    pub fn new(_mode: TrustStoreMode) -> HopResult<Self> {
        Ok(Self)
    }

    pub fn connect(&self, _stream: TcpStream, _host: &str) -> HopResult<BoxedIoStream> {
        Err(HopError::new(
            "net.tls.backend_unavailable",
            "rustls backend is disabled for this build; enable `hop-net/tls-rustls`",
        ))
    }
}

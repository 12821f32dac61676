//! OIDC provider thumbprints
//!
//! IAM requires a SHA-1 certificate thumbprint when registering an OIDC
//! provider but does not validate it for managed cluster issuers. A value is
//! obtained from the issuer's served chain when reachable, otherwise from a
//! well-known root CA constant.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_lc_rs::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};
#[cfg(test)]
use mockall::automock;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// Thumbprint of the root CA that signs managed cluster issuer endpoints
pub const ROOT_CA_THUMBPRINT: &str = "9e99a48a9960b14926bb7f3b02e22da2b0ab7280";

/// A 40-character lower-case hex SHA-1 thumbprint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbprint(String);

impl Thumbprint {
    /// Accept exactly 40 hex characters (case-insensitive)
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.len() != 40 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::thumbprint(format!(
                "'{}' is not a 40-character hex thumbprint",
                value
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// SHA-1 of a DER-encoded certificate
    pub fn of_der(der: &[u8]) -> Self {
        let hash = digest(&SHA1_FOR_LEGACY_USE_ONLY, der);
        Self(hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Thumbprint of the top (last served) certificate of a chain
    pub fn of_chain(chain: &[Vec<u8>]) -> Result<Self> {
        chain
            .last()
            .map(|der| Self::of_der(der))
            .ok_or_else(|| Error::thumbprint("issuer served an empty certificate chain"))
    }

    /// Hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of an issuer's served certificate chain
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CertificateChainSource: Send + Sync {
    /// DER certificates in the order the server sent them
    async fn fetch_chain(&self, host: &str) -> Result<Vec<Vec<u8>>>;
}

/// Fetches the chain with a direct TLS handshake
#[derive(Clone, Debug)]
pub struct TlsChainFetcher {
    port: u16,
    timeout: Duration,
}

impl TlsChainFetcher {
    /// Create a fetcher for port 443 with a 10s connect/read timeout
    pub fn new() -> Self {
        Self {
            port: 443,
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for TlsChainFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateChainSource for TlsChainFetcher {
    async fn fetch_chain(&self, host: &str) -> Result<Vec<Vec<u8>>> {
        let host = host.to_string();
        let port = self.port;
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || fetch_chain_blocking(&host, port, timeout))
            .await
            .map_err(|e| Error::thumbprint(format!("certificate fetch task failed: {}", e)))?
    }
}

fn fetch_chain_blocking(host: &str, port: u16, timeout: Duration) -> Result<Vec<Vec<u8>>> {
    let tls_err = |e: rustls::Error| Error::thumbprint(format!("TLS handshake with {} failed: {}", host, e));

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(tls_err)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(ChainCapture { provider }))
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::thumbprint(format!("invalid issuer host '{}': {}", host, e)))?;
    let mut conn = rustls::ClientConnection::new(Arc::new(config), server_name).map_err(tls_err)?;

    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::thumbprint(format!("{} did not resolve", host)))?;
    let mut sock = TcpStream::connect_timeout(&addr, timeout)?;
    sock.set_read_timeout(Some(timeout))?;
    sock.set_write_timeout(Some(timeout))?;

    while conn.is_handshaking() {
        conn.complete_io(&mut sock)?;
    }

    let chain: Vec<Vec<u8>> = conn
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
        .unwrap_or_default();
    debug!(host = %host, certificates = chain.len(), "Fetched issuer certificate chain");
    Ok(chain)
}

/// Accepts any server certificate so the chain can be read.
///
/// The chain is only hashed, never trusted; handshake signatures are still
/// checked.
#[derive(Debug)]
struct ChainCapture {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for ChainCapture {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// External cluster-operations tool that can register the provider itself
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterOpsHelper: Send + Sync {
    /// Whether the tool is installed and runnable
    async fn is_available(&self) -> bool;

    /// Register the cluster's OIDC provider
    async fn associate_oidc_provider(&self, cluster: &str, region: &str) -> Result<()>;
}

/// `eksctl`, which resolves the issuer from inside the cluster's network
#[derive(Clone, Debug, Default)]
pub struct Eksctl;

/// The command `eksctl` runs to register a provider
pub fn eksctl_associate_command(cluster: &str, region: &str) -> String {
    format!(
        "eksctl utils associate-iam-oidc-provider --cluster {} --region {} --approve",
        cluster, region
    )
}

#[async_trait]
impl ClusterOpsHelper for Eksctl {
    async fn is_available(&self) -> bool {
        Command::new("eksctl")
            .arg("version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    async fn associate_oidc_provider(&self, cluster: &str, region: &str) -> Result<()> {
        let output = Command::new("eksctl")
            .args([
                "utils",
                "associate-iam-oidc-provider",
                "--cluster",
                cluster,
                "--region",
                region,
                "--approve",
            ])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::thumbprint(format!(
                "eksctl associate-iam-oidc-provider failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

//! OIDC provider registration
//!
//! Every cluster with workload identity needs one trust anchor registered
//! for its token issuer. The anchor is created once and never mutated; an
//! existing registration (found by its deterministic ARN) short-circuits
//! everything below.

pub mod thumbprint;

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::aws::IdentityProviderRegistry;
use crate::config::ResolvedConfig;
use crate::{Error, Result, FEDERATION_AUDIENCE};

pub use thumbprint::{
    eksctl_associate_command, CertificateChainSource, ClusterOpsHelper, Eksctl, Thumbprint,
    TlsChainFetcher, ROOT_CA_THUMBPRINT,
};

/// How the registration thumbprint is obtained
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThumbprintStrategy {
    /// Try the helper, then the TLS chain, then the root CA constant
    #[default]
    Auto,
    /// Only the external helper
    Helper,
    /// Only the issuer's served chain
    Tls,
    /// Only the root CA constant
    Static,
}

impl ThumbprintStrategy {
    fn sources(self) -> &'static [ThumbprintStrategy] {
        match self {
            Self::Auto => &[Self::Helper, Self::Tls, Self::Static],
            Self::Helper => &[Self::Helper],
            Self::Tls => &[Self::Tls],
            Self::Static => &[Self::Static],
        }
    }

    fn is_pinned(self) -> bool {
        self != Self::Auto
    }
}

impl FromStr for ThumbprintStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "helper" => Ok(Self::Helper),
            "tls" => Ok(Self::Tls),
            "static" => Ok(Self::Static),
            _ => Err(format!(
                "invalid thumbprint strategy '{}', expected one of: auto, helper, tls, static",
                s
            )),
        }
    }
}

impl fmt::Display for ThumbprintStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Helper => write!(f, "helper"),
            Self::Tls => write!(f, "tls"),
            Self::Static => write!(f, "static"),
        }
    }
}

/// Registrar options
#[derive(Clone, Copy, Debug, Default)]
pub struct OidcOptions {
    /// Thumbprint strategy
    pub strategy: ThumbprintStrategy,
    /// Print the helper invocation instead of running it
    pub dry_run: bool,
}

/// Ensure the cluster's OIDC provider is registered. Returns its ARN.
pub async fn ensure_oidc_provider<R, H, C>(
    registry: &R,
    helper: &H,
    chains: &C,
    config: &ResolvedConfig,
    options: &OidcOptions,
) -> Result<String>
where
    R: IdentityProviderRegistry + ?Sized,
    H: ClusterOpsHelper + ?Sized,
    C: CertificateChainSource + ?Sized,
{
    let arn = config.oidc_provider_arn();
    if registry.get_provider(&arn).await?.is_some() {
        info!(provider = %arn, "OIDC provider already registered");
        return Ok(arn);
    }

    let pinned = options.strategy.is_pinned();
    for source in options.strategy.sources() {
        match source {
            ThumbprintStrategy::Helper => {
                if !helper.is_available().await {
                    if pinned {
                        return Err(Error::precondition(
                            "eksctl is required by --thumbprint-strategy helper but was not found",
                            "install eksctl: https://eksctl.io/installation/",
                        ));
                    }
                    debug!("eksctl not installed, skipping helper registration");
                    continue;
                }

                if options.dry_run {
                    println!(
                        "[dry-run] {}",
                        eksctl_associate_command(&config.cluster_name, &config.region)
                    );
                    return Ok(arn);
                }

                info!(cluster = %config.cluster_name, "Registering OIDC provider with eksctl");
                match helper
                    .associate_oidc_provider(&config.cluster_name, &config.region)
                    .await
                {
                    Ok(()) => {
                        if registry.get_provider(&arn).await?.is_some() {
                            return Ok(arn);
                        }
                        if pinned {
                            return Err(Error::thumbprint(format!(
                                "eksctl reported success but {} is not registered",
                                arn
                            )));
                        }
                        warn!(provider = %arn, "eksctl reported success but provider is missing");
                    }
                    Err(e) if pinned => return Err(e),
                    Err(e) => warn!(error = %e, "eksctl registration failed, trying next strategy"),
                }
            }
            ThumbprintStrategy::Tls => {
                let host = config.issuer.host();
                let fetched = chains
                    .fetch_chain(host)
                    .await
                    .and_then(|chain| Thumbprint::of_chain(&chain));
                match fetched {
                    Ok(tp) => return register(registry, config, &arn, &tp).await,
                    Err(e) if pinned => return Err(e),
                    Err(e) => warn!(host = %host, error = %e, "Issuer chain unavailable, trying next strategy"),
                }
            }
            ThumbprintStrategy::Static | ThumbprintStrategy::Auto => {
                let tp = Thumbprint::parse(ROOT_CA_THUMBPRINT)?;
                return register(registry, config, &arn, &tp).await;
            }
        }
    }

    Err(Error::thumbprint(format!(
        "no thumbprint strategy succeeded for issuer {}",
        config.issuer.as_str()
    )))
}

async fn register<R: IdentityProviderRegistry + ?Sized>(
    registry: &R,
    config: &ResolvedConfig,
    arn: &str,
    thumbprint: &Thumbprint,
) -> Result<String> {
    info!(issuer = %config.issuer.as_str(), thumbprint = %thumbprint, "Registering OIDC provider");
    match registry
        .create_provider(config.issuer.as_str(), FEDERATION_AUDIENCE, thumbprint.as_str())
        .await
    {
        Ok(created) => Ok(created),
        Err(e) if e.is_already_exists() => {
            debug!(provider = %arn, "OIDC provider registered concurrently");
            Ok(arn.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

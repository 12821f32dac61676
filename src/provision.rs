//! End-to-end provisioning
//!
//! Trust anchor, role, managed policy, attachment; in that order, each step
//! idempotent and each failure fatal. Documents are rendered before the first
//! mutating call so template problems leave the account untouched. Nothing
//! is rolled back: a later failure leaves earlier objects in place, and a
//! re-run converges.

use tracing::info;

use crate::aws::{IamApi, IdentityProviderRegistry};
use crate::config::ResolvedConfig;
use crate::document::{PolicySource, TrustPolicy};
use crate::iam::{ensure_attached, ensure_policy, ensure_role};
use crate::oidc::{ensure_oidc_provider, CertificateChainSource, ClusterOpsHelper, OidcOptions};
use crate::Result;

/// Inputs beyond the resolved configuration
#[derive(Clone, Debug, Default)]
pub struct ProvisionRequest {
    /// Where the permission template comes from
    pub policy: PolicySource,
    /// Trust anchor options
    pub oidc: OidcOptions,
}

/// ARNs of everything provisioned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provisioned {
    /// OIDC provider
    pub provider_arn: String,
    /// Workload role
    pub role_arn: String,
    /// Managed permission policy
    pub policy_arn: String,
}

/// Provision the trust anchor, role and policy for `config`.
pub async fn provision<R, I, H, C>(
    registry: &R,
    iam: &I,
    helper: &H,
    chains: &C,
    config: &ResolvedConfig,
    request: &ProvisionRequest,
) -> Result<Provisioned>
where
    R: IdentityProviderRegistry + ?Sized,
    I: IamApi + ?Sized,
    H: ClusterOpsHelper + ?Sized,
    C: CertificateChainSource + ?Sized,
{
    let trust = TrustPolicy::for_config(config).to_json()?;
    let permissions = request.policy.document(config).await?.to_json()?;

    let provider_arn = ensure_oidc_provider(registry, helper, chains, config, &request.oidc).await?;
    let role_arn = ensure_role(iam, &config.role_name, &trust).await?;
    let policy_arn = ensure_policy(iam, &config.policy_name, &config.policy_arn(), &permissions).await?;
    ensure_attached(iam, &role_arn, &policy_arn).await?;

    info!(
        role = %role_arn,
        policy = %policy_arn,
        subject = %config.subject(),
        "Workload identity provisioned"
    );
    Ok(Provisioned {
        provider_arn,
        role_arn,
        policy_arn,
    })
}

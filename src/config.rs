//! Parameter resolution
//!
//! Validates the identifiers an operator supplies, derives everything else
//! (account, partition, issuer, VPC) from the cloud, and freezes the result
//! into one [`ResolvedConfig`] that every component receives explicitly.

use tracing::info;

use crate::aws::{AccountApi, ClusterApi};
use crate::{Error, Result, FEDERATION_AUDIENCE};

/// Maximum IAM role name length
const MAX_ROLE_NAME_LEN: usize = 64;
/// Maximum IAM managed policy name length
const MAX_POLICY_NAME_LEN: usize = 128;

/// Raw parameters as supplied by the operator
#[derive(Clone, Debug, Default)]
pub struct Parameters {
    /// Managed cluster name
    pub cluster_name: String,
    /// Cloud region
    pub region: String,
    /// Namespace of the workload's service account
    pub namespace: String,
    /// Service account (principal) name
    pub service_account: String,
    /// Role name override
    pub role_name: Option<String>,
    /// Policy name override
    pub policy_name: Option<String>,
    /// Name of the data resource the permission policy is scoped to
    pub resource_name: Option<String>,
}

impl Parameters {
    /// Check every identifier's shape. Makes no remote calls.
    pub fn validate(&self) -> Result<()> {
        validate_cluster_name(&self.cluster_name)?;
        validate_region(&self.region)?;
        validate_dns_label("namespace", &self.namespace)?;
        validate_service_account(&self.service_account)?;
        if let Some(name) = &self.role_name {
            validate_iam_name("role name", name, MAX_ROLE_NAME_LEN)?;
        }
        if let Some(name) = &self.policy_name {
            validate_iam_name("policy name", name, MAX_POLICY_NAME_LEN)?;
        }
        if let Some(name) = &self.resource_name {
            validate_resource_name(name)?;
        }
        Ok(())
    }

    /// Role name, explicit or `<cluster>-<service-account>`
    pub fn effective_role_name(&self) -> String {
        self.role_name.clone().unwrap_or_else(|| {
            truncate(
                format!("{}-{}", self.cluster_name, self.service_account),
                MAX_ROLE_NAME_LEN,
            )
        })
    }

    /// Policy name, explicit or `<cluster>-<service-account>-policy`
    pub fn effective_policy_name(&self) -> String {
        self.policy_name.clone().unwrap_or_else(|| {
            truncate(
                format!("{}-{}-policy", self.cluster_name, self.service_account),
                MAX_POLICY_NAME_LEN,
            )
        })
    }

    /// Data resource name, explicit or the cluster name
    pub fn effective_resource_name(&self) -> String {
        self.resource_name
            .clone()
            .unwrap_or_else(|| self.cluster_name.clone())
    }

    /// Validate, then derive only the account and resource names.
    ///
    /// Never looks at the cluster, so teardown still works after the
    /// cluster is gone or federation was disabled.
    pub async fn resolve_identity<A>(&self, accounts: &A) -> Result<ResolvedIdentity>
    where
        A: AccountApi + ?Sized,
    {
        self.validate()?;

        let account_id = accounts.caller_account_id().await.map_err(|e| {
            Error::precondition(
                format!("cannot resolve AWS account from current credentials: {}", e),
                "aws sts get-caller-identity",
            )
        })?;

        Ok(ResolvedIdentity {
            partition: partition_for_region(&self.region).to_string(),
            account_id,
            role_name: self.effective_role_name(),
            policy_name: self.effective_policy_name(),
        })
    }

    /// Validate, then derive account, partition, issuer and network from the cloud.
    pub async fn resolve<C, A>(self, clusters: &C, accounts: &A) -> Result<ResolvedConfig>
    where
        C: ClusterApi + ?Sized,
        A: AccountApi + ?Sized,
    {
        let resource_name = self.effective_resource_name();
        if self.resource_name.is_none() {
            validate_resource_name(&resource_name).map_err(|_| {
                Error::validation(format!(
                    "cluster name '{}' is not usable as a resource name (3-255 characters); pass --resource-name",
                    self.cluster_name
                ))
            })?;
        }

        let identity = self.resolve_identity(accounts).await?;

        let cluster = clusters
            .describe_cluster(&self.cluster_name)
            .await?
            .ok_or_else(|| {
                Error::precondition(
                    format!(
                        "cluster '{}' not found in region {}",
                        self.cluster_name, self.region
                    ),
                    format!("aws eks list-clusters --region {}", self.region),
                )
            })?;

        let issuer = cluster
            .issuer
            .filter(|i| !i.is_empty())
            .ok_or_else(|| {
                Error::precondition(
                    format!(
                        "OIDC federation is not enabled on cluster '{}'",
                        self.cluster_name
                    ),
                    format!(
                        "eksctl utils associate-iam-oidc-provider --cluster {} --region {} --approve",
                        self.cluster_name, self.region
                    ),
                )
            })?;
        let issuer = IssuerUrl::parse(&issuer)?;

        let resolved = ResolvedConfig {
            role_name: identity.role_name,
            policy_name: identity.policy_name,
            resource_name,
            partition: identity.partition,
            cluster_name: self.cluster_name,
            region: self.region,
            namespace: self.namespace,
            service_account: self.service_account,
            account_id: identity.account_id,
            issuer,
            vpc_id: cluster.vpc_id,
        };

        info!(
            cluster = %resolved.cluster_name,
            account = %resolved.account_id,
            issuer = %resolved.issuer.as_str(),
            "Resolved parameters"
        );
        Ok(resolved)
    }
}

/// Account and names of the owned role and policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// ARN partition
    pub partition: String,
    /// Account that owns the role and policy
    pub account_id: String,
    /// Role name
    pub role_name: String,
    /// Managed policy name
    pub policy_name: String,
}

impl ResolvedIdentity {
    /// ARN of the managed policy
    pub fn policy_arn(&self) -> String {
        format!(
            "arn:{}:iam::{}:policy/{}",
            self.partition, self.account_id, self.policy_name
        )
    }
}

/// Immutable configuration shared by every component
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Managed cluster name
    pub cluster_name: String,
    /// Cloud region
    pub region: String,
    /// ARN partition (`aws`, `aws-cn`, `aws-us-gov`)
    pub partition: String,
    /// Account that owns every resource
    pub account_id: String,
    /// Workload namespace
    pub namespace: String,
    /// Workload service account
    pub service_account: String,
    /// Role name
    pub role_name: String,
    /// Managed policy name
    pub policy_name: String,
    /// Data resource the permission policy is scoped to
    pub resource_name: String,
    /// Cluster token issuer
    pub issuer: IssuerUrl,
    /// Cluster VPC
    pub vpc_id: Option<String>,
}

impl ResolvedConfig {
    /// Token subject the role trusts
    pub fn subject(&self) -> String {
        service_account_subject(&self.namespace, &self.service_account)
    }

    /// Token audience the role trusts
    pub fn audience(&self) -> &'static str {
        FEDERATION_AUDIENCE
    }

    /// ARN of the cluster's OIDC trust anchor
    pub fn oidc_provider_arn(&self) -> String {
        format!(
            "arn:{}:iam::{}:oidc-provider/{}",
            self.partition,
            self.account_id,
            self.issuer.host_path()
        )
    }

    /// ARN of the managed policy
    pub fn policy_arn(&self) -> String {
        format!(
            "arn:{}:iam::{}:policy/{}",
            self.partition, self.account_id, self.policy_name
        )
    }

    /// ARN the role will have
    pub fn role_arn(&self) -> String {
        format!(
            "arn:{}:iam::{}:role/{}",
            self.partition, self.account_id, self.role_name
        )
    }
}

/// `system:serviceaccount:<namespace>:<name>`
pub fn service_account_subject(namespace: &str, service_account: &str) -> String {
    format!("system:serviceaccount:{}:{}", namespace, service_account)
}

/// An `https://` OIDC issuer URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuerUrl(String);

impl IssuerUrl {
    /// Parse an issuer URL; only `https` issuers are accepted
    pub fn parse(url: &str) -> Result<Self> {
        let trimmed = url.trim().trim_end_matches('/');
        let rest = trimmed
            .strip_prefix("https://")
            .ok_or_else(|| Error::validation(format!("issuer '{}' is not an https URL", url)))?;
        if rest.is_empty() || rest.starts_with('/') {
            return Err(Error::validation(format!("issuer '{}' has no host", url)));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Full URL
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host and path without scheme; the provider ARN suffix and condition key prefix
    pub fn host_path(&self) -> &str {
        self.0.trim_start_matches("https://")
    }

    /// Host only
    pub fn host(&self) -> &str {
        let host_path = self.host_path();
        host_path.split('/').next().unwrap_or(host_path)
    }
}

/// ARN partition for a region
pub fn partition_for_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else {
        "aws"
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        s.truncate(max);
        while s.ends_with(['-', '_', '.']) {
            s.pop();
        }
    }
    s
}

/// 1-100 chars, alphanumeric first, then alphanumerics, `-` and `_`
pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("cluster name is required (--cluster-name)"));
    }
    if name.len() > 100 {
        return Err(Error::validation(format!(
            "cluster name '{}' exceeds 100 characters",
            name
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(Error::validation(format!(
            "cluster name '{}' must start with a letter or digit and contain only letters, digits, '-' and '_'",
            name
        )));
    }
    Ok(())
}

/// `<area>[-gov|-iso...]-<direction>-<n>`, e.g. `us-east-1`, `us-gov-west-1`
pub fn validate_region(region: &str) -> Result<()> {
    if region.is_empty() {
        return Err(Error::validation("region is required (--region)"));
    }
    let parts: Vec<&str> = region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts[0].len() == 2
        && parts[..parts.len() - 1]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts
            .last()
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(Error::validation(format!(
            "region '{}' is not a valid region identifier (expected e.g. us-east-1)",
            region
        )));
    }
    Ok(())
}

/// RFC 1123 label: lower-case alphanumerics and `-`, alphanumeric at both ends, max 63
pub fn validate_dns_label(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(format!("{} is required", what)));
    }
    if !is_dns_label(value) {
        return Err(Error::validation(format!(
            "{} '{}' must be a lower-case RFC 1123 label (max 63 chars)",
            what, value
        )));
    }
    Ok(())
}

/// RFC 1123 subdomain: dot-separated labels, max 253
pub fn validate_service_account(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("service account name is required"));
    }
    if name.len() > 253 || !name.split('.').all(is_dns_label) {
        return Err(Error::validation(format!(
            "service account '{}' must be a lower-case RFC 1123 subdomain",
            name
        )));
    }
    Ok(())
}

fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

fn validate_iam_name(what: &str, name: &str, max: usize) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= max
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c));
    if !valid {
        return Err(Error::validation(format!(
            "{} '{}' must be 1-{} characters of letters, digits and +=,.@_-",
            what, name, max
        )));
    }
    Ok(())
}

fn validate_resource_name(name: &str) -> Result<()> {
    let valid = (3..=255).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c));
    if !valid {
        return Err(Error::validation(format!(
            "resource name '{}' must be 3-255 characters of letters, digits and _.-",
            name
        )));
    }
    Ok(())
}

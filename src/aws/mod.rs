//! Cloud API seams
//!
//! One trait per collaborator API. The reconcilers only ever talk to these
//! traits, so they run unchanged against the AWS SDK ([`sdk`]), the dry-run
//! decorator ([`dry_run`]), and test doubles.
//!
//! Lookups return `Ok(None)` for a missing object. Mutating calls return the
//! classified [`ApiError`](crate::error::ApiError) unchanged so each call site
//! can apply its own [`ErrorPolicy`](crate::error::ErrorPolicy).

pub mod dry_run;
pub mod sdk;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::error::ApiResult;

/// An IAM role as returned by the registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleInfo {
    /// Role name
    pub name: String,
    /// Role ARN
    pub arn: String,
}

/// A customer-managed policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyInfo {
    /// Policy ARN
    pub arn: String,
    /// Id of the version currently marked default
    pub default_version_id: Option<String>,
}

/// One retained version of a managed policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyVersion {
    /// Version id (`v1`, `v2`, ...)
    pub version_id: String,
    /// Whether this is the default (active) version
    pub is_default: bool,
    /// Creation time, when the registry reports it
    pub created: Option<DateTime<Utc>>,
}

/// Status of an asynchronous service-linked-role deletion task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeletionStatus {
    /// Accepted but not yet running
    NotStarted,
    /// Running
    InProgress,
    /// Role deleted
    Succeeded,
    /// Deletion failed; `reason` is the provider's stated cause
    Failed {
        /// Provider-supplied failure reason
        reason: Option<String>,
    },
}

impl DeletionStatus {
    /// True for `Succeeded` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

impl fmt::Display for DeletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NOT_STARTED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed { .. } => write!(f, "FAILED"),
        }
    }
}

/// Which load-balancer API reported a resource
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadBalancerGeneration {
    /// Classic load balancers (elasticloadbalancing)
    Legacy,
    /// Application/network/gateway load balancers (elasticloadbalancingv2)
    Current,
}

/// A load balancer that depends on the service-linked role
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancerRef {
    /// Load balancer name
    pub name: String,
    /// Listing API that returned it
    pub generation: LoadBalancerGeneration,
    /// Type reported by the API (`classic`, `application`, `network`, ...)
    pub kind: String,
}

impl fmt::Display for LoadBalancerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// The parts of a managed cluster description irsa consumes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Cluster name
    pub name: String,
    /// OIDC issuer URL, absent when federation is not enabled
    pub issuer: Option<String>,
    /// VPC the cluster runs in
    pub vpc_id: Option<String>,
}

/// Identity-provider registry (OIDC trust anchors)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProviderRegistry: Send + Sync {
    /// Look up a provider by ARN; returns its issuer URL
    async fn get_provider(&self, arn: &str) -> ApiResult<Option<String>>;

    /// Register a provider; returns its ARN
    async fn create_provider(
        &self,
        issuer_url: &str,
        client_id: &str,
        thumbprint: &str,
    ) -> ApiResult<String>;
}

/// IAM roles, managed policies, attachments and service-linked-role deletion
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IamApi: Send + Sync {
    /// Look up a role by name
    async fn get_role(&self, name: &str) -> ApiResult<Option<RoleInfo>>;

    /// Create a role with the given trust document
    async fn create_role(&self, name: &str, trust_document: &str) -> ApiResult<RoleInfo>;

    /// Replace a role's trust document
    async fn update_trust_policy(&self, name: &str, trust_document: &str) -> ApiResult<()>;

    /// Delete a role
    async fn delete_role(&self, name: &str) -> ApiResult<()>;

    /// Look up a managed policy by ARN
    async fn get_policy(&self, arn: &str) -> ApiResult<Option<PolicyInfo>>;

    /// Create a managed policy; its first version becomes default
    async fn create_policy(&self, name: &str, document: &str) -> ApiResult<PolicyInfo>;

    /// Delete a managed policy (all non-default versions must be gone)
    async fn delete_policy(&self, arn: &str) -> ApiResult<()>;

    /// List retained versions in registry order
    async fn list_policy_versions(&self, arn: &str) -> ApiResult<Vec<PolicyVersion>>;

    /// Create a version, optionally marking it default; returns its id
    async fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ApiResult<String>;

    /// Delete a non-default version
    async fn delete_policy_version(&self, arn: &str, version_id: &str) -> ApiResult<()>;

    /// Attach a managed policy to a role
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()>;

    /// Detach a managed policy from a role
    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()>;

    /// ARNs of managed policies attached to a role
    async fn list_attached_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>>;

    /// Names of inline policies on a role
    async fn list_inline_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>>;

    /// Delete an inline policy from a role
    async fn delete_inline_role_policy(&self, role_name: &str, policy_name: &str)
        -> ApiResult<()>;

    /// Submit deletion of a service-linked role; returns the task id
    async fn delete_service_linked_role(&self, role_name: &str) -> ApiResult<String>;

    /// Status of a service-linked-role deletion task
    async fn deletion_status(&self, task_id: &str) -> ApiResult<DeletionStatus>;
}

/// Managed cluster API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Describe a cluster; `None` when it does not exist
    async fn describe_cluster(&self, name: &str) -> ApiResult<Option<ClusterInfo>>;
}

/// Caller identity
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Account id of the credentials in use
    async fn caller_account_id(&self) -> ApiResult<String>;
}

/// Load-balancer APIs, both generations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// All classic load balancers in the region
    async fn list_legacy(&self) -> ApiResult<Vec<LoadBalancerRef>>;

    /// All v2 load balancers in the region
    async fn list_current(&self) -> ApiResult<Vec<LoadBalancerRef>>;

    /// ARN of the target group with the given name
    async fn find_target_group(&self, name: &str) -> ApiResult<Option<String>>;
}

/// Extract the role name from a role ARN (`arn:...:role/path/name`).
pub fn role_name_from_arn(arn: &str) -> Option<&str> {
    let resource = arn.splitn(6, ':').nth(5)?;
    let path = resource.strip_prefix("role/")?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

//! In-memory cloud for integration tests
//!
//! Enforces the same constraints the real registry does: at most five
//! versions per policy, the default version cannot be deleted, roles and
//! policies with attachments cannot be deleted.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use irsa::aws::{
    AccountApi, ClusterApi, ClusterInfo, DeletionStatus, IamApi, IdentityProviderRegistry,
    LoadBalancerApi, LoadBalancerGeneration, LoadBalancerRef, PolicyInfo, PolicyVersion, RoleInfo,
};
use irsa::config::{IssuerUrl, ResolvedConfig};
use irsa::error::{ApiError, ApiErrorKind, ApiResult};
use irsa::prompt::Confirm;

pub const ACCOUNT: &str = "123456789012";
pub const CLUSTER: &str = "prod-east";
pub const REGION: &str = "us-east-1";
pub const ISSUER: &str = "https://oidc.eks.us-east-1.amazonaws.com/id/EXAMPLED539D4633E53DE1B71EXAMPLE";

pub fn config() -> ResolvedConfig {
    ResolvedConfig {
        cluster_name: CLUSTER.to_string(),
        region: REGION.to_string(),
        partition: "aws".to_string(),
        account_id: ACCOUNT.to_string(),
        namespace: "orders".to_string(),
        service_account: "orders-api".to_string(),
        role_name: "prod-east-orders-api".to_string(),
        policy_name: "prod-east-orders-api-policy".to_string(),
        resource_name: "orders".to_string(),
        issuer: IssuerUrl::parse(ISSUER).unwrap(),
        vpc_id: Some("vpc-0abc123".to_string()),
    }
}

#[derive(Clone, Debug)]
pub struct FakeRole {
    pub arn: String,
    pub trust: String,
    pub attached: Vec<String>,
    pub inline: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct FakeVersion {
    pub id: String,
    pub document: String,
    pub is_default: bool,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct FakePolicy {
    pub name: String,
    pub versions: Vec<FakeVersion>,
    pub next_version: u32,
}

impl FakePolicy {
    pub fn default_version(&self) -> Option<&FakeVersion> {
        self.versions.iter().find(|v| v.is_default)
    }
}

#[derive(Debug, Default)]
pub struct State {
    pub providers: HashMap<String, String>,
    pub roles: BTreeMap<String, FakeRole>,
    pub policies: BTreeMap<String, FakePolicy>,
    pub clusters: HashMap<String, ClusterInfo>,
    pub legacy_lbs: Vec<LoadBalancerRef>,
    pub current_lbs: Vec<LoadBalancerRef>,
    pub service_linked_role: bool,
    /// Statuses returned in order; the last one repeats
    pub deletion_script: Vec<DeletionStatus>,
    pub status_checks: u32,
    /// Load-balancer count observed at each deletion call
    pub deletion_calls: Vec<usize>,
    pub failing: HashSet<&'static str>,
    pub calls: Vec<&'static str>,
    pub clock: u32,
}

#[derive(Debug, Default)]
pub struct FakeCloud {
    pub state: Mutex<State>,
}

impl FakeCloud {
    /// A cluster with federation enabled and nothing provisioned
    pub fn new() -> Self {
        let cloud = Self::default();
        {
            let mut s = cloud.state();
            s.clusters.insert(
                CLUSTER.to_string(),
                ClusterInfo {
                    name: CLUSTER.to_string(),
                    issuer: Some(ISSUER.to_string()),
                    vpc_id: Some("vpc-0abc123".to_string()),
                },
            );
            s.service_linked_role = true;
            s.deletion_script = vec![DeletionStatus::Succeeded];
        }
        cloud
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == operation).count()
    }

    pub fn add_load_balancer(&self, name: &str, generation: LoadBalancerGeneration) {
        let kind = match generation {
            LoadBalancerGeneration::Legacy => "classic",
            LoadBalancerGeneration::Current => "application",
        };
        let lb = LoadBalancerRef {
            name: name.to_string(),
            generation,
            kind: kind.to_string(),
        };
        let mut s = self.state();
        match generation {
            LoadBalancerGeneration::Legacy => s.legacy_lbs.push(lb),
            LoadBalancerGeneration::Current => s.current_lbs.push(lb),
        }
    }

    /// Seed a policy with `count` versions, the newest default
    pub fn seed_policy(&self, arn: &str, name: &str, count: u32) {
        let mut s = self.state();
        let versions = (1..=count)
            .map(|n| FakeVersion {
                id: format!("v{}", n),
                document: format!("{{\"seed\":{}}}", n),
                is_default: n == count,
                created: timestamp(n),
            })
            .collect();
        s.clock = count;
        s.policies.insert(
            arn.to_string(),
            FakePolicy {
                name: name.to_string(),
                versions,
                next_version: count + 1,
            },
        );
    }

    pub fn policy(&self, arn: &str) -> Option<FakePolicy> {
        self.state().policies.get(arn).cloned()
    }

    pub fn role(&self, name: &str) -> Option<FakeRole> {
        self.state().roles.get(name).cloned()
    }

    fn enter(&self, operation: &'static str) -> ApiResult<std::sync::MutexGuard<'_, State>> {
        let mut s = self.state();
        s.calls.push(operation);
        if s.failing.contains(operation) {
            return Err(ApiError::other(operation, "injected failure"));
        }
        Ok(s)
    }
}

fn timestamp(tick: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(tick as i64)
}

fn policy_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

#[async_trait]
impl IdentityProviderRegistry for FakeCloud {
    async fn get_provider(&self, arn: &str) -> ApiResult<Option<String>> {
        let s = self.enter("iam:GetOpenIDConnectProvider")?;
        Ok(s.providers.get(arn).cloned())
    }

    async fn create_provider(
        &self,
        issuer_url: &str,
        _client_id: &str,
        thumbprint: &str,
    ) -> ApiResult<String> {
        const OP: &str = "iam:CreateOpenIDConnectProvider";
        let mut s = self.enter(OP)?;
        assert_eq!(thumbprint.len(), 40, "thumbprint must be 40 hex chars");
        let arn = format!(
            "arn:aws:iam::{}:oidc-provider/{}",
            ACCOUNT,
            issuer_url.trim_start_matches("https://")
        );
        if s.providers.contains_key(&arn) {
            return Err(ApiError::new(OP, ApiErrorKind::AlreadyExists, "provider exists"));
        }
        s.providers.insert(arn.clone(), issuer_url.to_string());
        Ok(arn)
    }
}

#[async_trait]
impl IamApi for FakeCloud {
    async fn get_role(&self, name: &str) -> ApiResult<Option<RoleInfo>> {
        let s = self.enter("iam:GetRole")?;
        Ok(s.roles.get(name).map(|r| RoleInfo {
            name: name.to_string(),
            arn: r.arn.clone(),
        }))
    }

    async fn create_role(&self, name: &str, trust_document: &str) -> ApiResult<RoleInfo> {
        const OP: &str = "iam:CreateRole";
        let mut s = self.enter(OP)?;
        if s.roles.contains_key(name) {
            return Err(ApiError::new(OP, ApiErrorKind::AlreadyExists, "role exists"));
        }
        let arn = format!("arn:aws:iam::{}:role/{}", ACCOUNT, name);
        s.roles.insert(
            name.to_string(),
            FakeRole {
                arn: arn.clone(),
                trust: trust_document.to_string(),
                attached: vec![],
                inline: vec![],
            },
        );
        Ok(RoleInfo {
            name: name.to_string(),
            arn,
        })
    }

    async fn update_trust_policy(&self, name: &str, trust_document: &str) -> ApiResult<()> {
        const OP: &str = "iam:UpdateAssumeRolePolicy";
        let mut s = self.enter(OP)?;
        let role = s
            .roles
            .get_mut(name)
            .ok_or_else(|| ApiError::not_found(OP, "no such role"))?;
        role.trust = trust_document.to_string();
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> ApiResult<()> {
        const OP: &str = "iam:DeleteRole";
        let mut s = self.enter(OP)?;
        let role = s
            .roles
            .get(name)
            .ok_or_else(|| ApiError::not_found(OP, "no such role"))?;
        if !role.attached.is_empty() || !role.inline.is_empty() {
            return Err(ApiError::new(OP, ApiErrorKind::DeleteConflict, "role has policies"));
        }
        s.roles.remove(name);
        Ok(())
    }

    async fn get_policy(&self, arn: &str) -> ApiResult<Option<PolicyInfo>> {
        let s = self.enter("iam:GetPolicy")?;
        Ok(s.policies.get(arn).map(|p| PolicyInfo {
            arn: arn.to_string(),
            default_version_id: p.default_version().map(|v| v.id.clone()),
        }))
    }

    async fn create_policy(&self, name: &str, document: &str) -> ApiResult<PolicyInfo> {
        const OP: &str = "iam:CreatePolicy";
        let mut s = self.enter(OP)?;
        let arn = format!("arn:aws:iam::{}:policy/{}", ACCOUNT, name);
        if s.policies.contains_key(&arn) {
            return Err(ApiError::new(OP, ApiErrorKind::AlreadyExists, "policy exists"));
        }
        s.clock += 1;
        let created = timestamp(s.clock);
        s.policies.insert(
            arn.clone(),
            FakePolicy {
                name: name.to_string(),
                versions: vec![FakeVersion {
                    id: "v1".to_string(),
                    document: document.to_string(),
                    is_default: true,
                    created,
                }],
                next_version: 2,
            },
        );
        Ok(PolicyInfo {
            arn,
            default_version_id: Some("v1".to_string()),
        })
    }

    async fn delete_policy(&self, arn: &str) -> ApiResult<()> {
        const OP: &str = "iam:DeletePolicy";
        let mut s = self.enter(OP)?;
        let policy = s
            .policies
            .get(arn)
            .ok_or_else(|| ApiError::not_found(OP, "no such policy"))?;
        if policy.versions.iter().any(|v| !v.is_default) {
            return Err(ApiError::new(OP, ApiErrorKind::DeleteConflict, "policy has versions"));
        }
        if s.roles.values().any(|r| r.attached.iter().any(|a| a == arn)) {
            return Err(ApiError::new(OP, ApiErrorKind::DeleteConflict, "policy is attached"));
        }
        s.policies.remove(arn);
        Ok(())
    }

    async fn list_policy_versions(&self, arn: &str) -> ApiResult<Vec<PolicyVersion>> {
        const OP: &str = "iam:ListPolicyVersions";
        let s = self.enter(OP)?;
        let policy = s
            .policies
            .get(arn)
            .ok_or_else(|| ApiError::not_found(OP, "no such policy"))?;
        // Newest first
        Ok(policy
            .versions
            .iter()
            .rev()
            .map(|v| PolicyVersion {
                version_id: v.id.clone(),
                is_default: v.is_default,
                created: Some(v.created),
            })
            .collect())
    }

    async fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ApiResult<String> {
        const OP: &str = "iam:CreatePolicyVersion";
        let mut s = self.enter(OP)?;
        s.clock += 1;
        let created = timestamp(s.clock);
        let policy = s
            .policies
            .get_mut(arn)
            .ok_or_else(|| ApiError::not_found(OP, "no such policy"))?;
        if policy.versions.len() >= 5 {
            return Err(ApiError::new(OP, ApiErrorKind::LimitExceeded, "five versions"));
        }
        let id = format!("v{}", policy.next_version);
        policy.next_version += 1;
        if set_as_default {
            for v in &mut policy.versions {
                v.is_default = false;
            }
        }
        policy.versions.push(FakeVersion {
            id: id.clone(),
            document: document.to_string(),
            is_default: set_as_default,
            created,
        });
        Ok(id)
    }

    async fn delete_policy_version(&self, arn: &str, version_id: &str) -> ApiResult<()> {
        const OP: &str = "iam:DeletePolicyVersion";
        let mut s = self.enter(OP)?;
        let policy = s
            .policies
            .get_mut(arn)
            .ok_or_else(|| ApiError::not_found(OP, "no such policy"))?;
        let index = policy
            .versions
            .iter()
            .position(|v| v.id == version_id)
            .ok_or_else(|| ApiError::not_found(OP, "no such version"))?;
        if policy.versions[index].is_default {
            return Err(ApiError::new(OP, ApiErrorKind::DeleteConflict, "default version"));
        }
        policy.versions.remove(index);
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()> {
        const OP: &str = "iam:AttachRolePolicy";
        let mut s = self.enter(OP)?;
        if !s.policies.contains_key(policy_arn) {
            return Err(ApiError::not_found(OP, "no such policy"));
        }
        let role = s
            .roles
            .get_mut(role_name)
            .ok_or_else(|| ApiError::not_found(OP, "no such role"))?;
        if !role.attached.iter().any(|a| a == policy_arn) {
            role.attached.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()> {
        const OP: &str = "iam:DetachRolePolicy";
        let mut s = self.enter(OP)?;
        let role = s
            .roles
            .get_mut(role_name)
            .ok_or_else(|| ApiError::not_found(OP, "no such role"))?;
        let before = role.attached.len();
        role.attached.retain(|a| a != policy_arn);
        if role.attached.len() == before {
            return Err(ApiError::not_found(OP, "not attached"));
        }
        Ok(())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>> {
        const OP: &str = "iam:ListAttachedRolePolicies";
        let s = self.enter(OP)?;
        s.roles
            .get(role_name)
            .map(|r| r.attached.clone())
            .ok_or_else(|| ApiError::not_found(OP, "no such role"))
    }

    async fn list_inline_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>> {
        const OP: &str = "iam:ListRolePolicies";
        let s = self.enter(OP)?;
        s.roles
            .get(role_name)
            .map(|r| r.inline.clone())
            .ok_or_else(|| ApiError::not_found(OP, "no such role"))
    }

    async fn delete_inline_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> ApiResult<()> {
        const OP: &str = "iam:DeleteRolePolicy";
        let mut s = self.enter(OP)?;
        let role = s
            .roles
            .get_mut(role_name)
            .ok_or_else(|| ApiError::not_found(OP, "no such role"))?;
        role.inline.retain(|p| p != policy_name);
        Ok(())
    }

    async fn delete_service_linked_role(&self, _role_name: &str) -> ApiResult<String> {
        const OP: &str = "iam:DeleteServiceLinkedRole";
        let mut s = self.enter(OP)?;
        let dependents = s.legacy_lbs.len() + s.current_lbs.len();
        s.deletion_calls.push(dependents);
        if !s.service_linked_role {
            return Err(ApiError::not_found(OP, "no such role"));
        }
        Ok(format!("task/aws-service-role/elasticloadbalancing.amazonaws.com/{}", s.deletion_calls.len()))
    }

    async fn deletion_status(&self, _task_id: &str) -> ApiResult<DeletionStatus> {
        let mut s = self.enter("iam:GetServiceLinkedRoleDeletionStatus")?;
        let index = (s.status_checks as usize).min(s.deletion_script.len().saturating_sub(1));
        s.status_checks += 1;
        let status = s
            .deletion_script
            .get(index)
            .cloned()
            .unwrap_or(DeletionStatus::InProgress);
        if status == DeletionStatus::Succeeded {
            s.service_linked_role = false;
        }
        Ok(status)
    }
}

#[async_trait]
impl ClusterApi for FakeCloud {
    async fn describe_cluster(&self, name: &str) -> ApiResult<Option<ClusterInfo>> {
        let s = self.enter("eks:DescribeCluster")?;
        Ok(s.clusters.get(name).cloned())
    }
}

#[async_trait]
impl AccountApi for FakeCloud {
    async fn caller_account_id(&self) -> ApiResult<String> {
        self.enter("sts:GetCallerIdentity")?;
        Ok(ACCOUNT.to_string())
    }
}

#[async_trait]
impl LoadBalancerApi for FakeCloud {
    async fn list_legacy(&self) -> ApiResult<Vec<LoadBalancerRef>> {
        let s = self.enter("elasticloadbalancing:DescribeLoadBalancers")?;
        Ok(s.legacy_lbs.clone())
    }

    async fn list_current(&self) -> ApiResult<Vec<LoadBalancerRef>> {
        let s = self.enter("elasticloadbalancingv2:DescribeLoadBalancers")?;
        Ok(s.current_lbs.clone())
    }

    async fn find_target_group(&self, name: &str) -> ApiResult<Option<String>> {
        self.enter("elasticloadbalancingv2:DescribeTargetGroups")?;
        Ok(Some(format!(
            "arn:aws:elasticloadbalancing:{}:{}:targetgroup/{}/0123456789abcdef",
            REGION, ACCOUNT, name
        )))
    }
}

/// Helper stand-in: never installed
pub struct NoHelper;

#[async_trait]
impl irsa::oidc::ClusterOpsHelper for NoHelper {
    async fn is_available(&self) -> bool {
        false
    }

    async fn associate_oidc_provider(&self, _cluster: &str, _region: &str) -> irsa::Result<()> {
        panic!("helper is not installed")
    }
}

/// Chain source that is never reachable
pub struct Unreachable;

#[async_trait]
impl irsa::oidc::CertificateChainSource for Unreachable {
    async fn fetch_chain(&self, host: &str) -> irsa::Result<Vec<Vec<u8>>> {
        Err(irsa::Error::thumbprint(format!("{} unreachable", host)))
    }
}

/// Operator that answers every prompt the same way
pub struct Answer(pub bool);

#[async_trait]
impl Confirm for Answer {
    async fn confirm(&self, _question: &str) -> irsa::Result<bool> {
        Ok(self.0)
    }
}

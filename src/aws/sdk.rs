//! AWS SDK implementations of the cloud seams

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::types::DeletionTaskStatusType;
use chrono::DateTime;
use tracing::debug;

use super::{
    AccountApi, ClusterApi, ClusterInfo, DeletionStatus, IamApi, IdentityProviderRegistry,
    LoadBalancerApi, LoadBalancerGeneration, LoadBalancerRef, PolicyInfo, PolicyVersion, RoleInfo,
};
use crate::error::{ApiError, ApiErrorKind, ApiResult};

/// Classify an SDK failure by its service error code.
fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);
    let kind = ApiErrorKind::from_code(code.as_deref());
    debug!(operation, code = ?code, "AWS call failed");
    ApiError::new(operation, kind, DisplayErrorContext(&err).to_string())
}

/// Turn a not-found failure into `Ok(None)`.
fn lookup<T>(result: ApiResult<T>) -> ApiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// SDK clients for every API irsa talks to, sharing one loaded config
#[derive(Clone, Debug)]
pub struct AwsApis {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
    eks: aws_sdk_eks::Client,
    elb: aws_sdk_elasticloadbalancing::Client,
    elbv2: aws_sdk_elasticloadbalancingv2::Client,
}

impl AwsApis {
    /// Load credentials from the default chain and pin the region
    pub async fn load(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::from_config(&config)
    }

    /// Build clients from an existing SDK config
    pub fn from_config(config: &SdkConfig) -> Self {
        Self {
            iam: aws_sdk_iam::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            eks: aws_sdk_eks::Client::new(config),
            elb: aws_sdk_elasticloadbalancing::Client::new(config),
            elbv2: aws_sdk_elasticloadbalancingv2::Client::new(config),
        }
    }
}

#[async_trait]
impl IdentityProviderRegistry for AwsApis {
    async fn get_provider(&self, arn: &str) -> ApiResult<Option<String>> {
        lookup(
            self.iam
                .get_open_id_connect_provider()
                .open_id_connect_provider_arn(arn)
                .send()
                .await
                .map(|out| out.url().unwrap_or_default().to_string())
                .map_err(|e| classify("iam:GetOpenIDConnectProvider", e)),
        )
    }

    async fn create_provider(
        &self,
        issuer_url: &str,
        client_id: &str,
        thumbprint: &str,
    ) -> ApiResult<String> {
        let out = self
            .iam
            .create_open_id_connect_provider()
            .url(issuer_url)
            .client_id_list(client_id)
            .thumbprint_list(thumbprint)
            .send()
            .await
            .map_err(|e| classify("iam:CreateOpenIDConnectProvider", e))?;
        out.open_id_connect_provider_arn()
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::other("iam:CreateOpenIDConnectProvider", "response has no ARN")
            })
    }
}

#[async_trait]
impl IamApi for AwsApis {
    async fn get_role(&self, name: &str) -> ApiResult<Option<RoleInfo>> {
        let out = lookup(
            self.iam
                .get_role()
                .role_name(name)
                .send()
                .await
                .map_err(|e| classify("iam:GetRole", e)),
        )?;
        Ok(out.and_then(|out| {
            out.role().map(|role| RoleInfo {
                name: role.role_name().to_string(),
                arn: role.arn().to_string(),
            })
        }))
    }

    async fn create_role(&self, name: &str, trust_document: &str) -> ApiResult<RoleInfo> {
        let out = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_document)
            .description("Workload identity role managed by irsa")
            .send()
            .await
            .map_err(|e| classify("iam:CreateRole", e))?;
        let role = out
            .role()
            .ok_or_else(|| ApiError::other("iam:CreateRole", "response has no role"))?;
        Ok(RoleInfo {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
        })
    }

    async fn update_trust_policy(&self, name: &str, trust_document: &str) -> ApiResult<()> {
        self.iam
            .update_assume_role_policy()
            .role_name(name)
            .policy_document(trust_document)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam:UpdateAssumeRolePolicy", e))
    }

    async fn delete_role(&self, name: &str) -> ApiResult<()> {
        self.iam
            .delete_role()
            .role_name(name)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam:DeleteRole", e))
    }

    async fn get_policy(&self, arn: &str) -> ApiResult<Option<PolicyInfo>> {
        let out = lookup(
            self.iam
                .get_policy()
                .policy_arn(arn)
                .send()
                .await
                .map_err(|e| classify("iam:GetPolicy", e)),
        )?;
        Ok(out.and_then(|out| {
            out.policy().map(|policy| PolicyInfo {
                arn: policy.arn().unwrap_or(arn).to_string(),
                default_version_id: policy.default_version_id().map(str::to_string),
            })
        }))
    }

    async fn create_policy(&self, name: &str, document: &str) -> ApiResult<PolicyInfo> {
        let out = self
            .iam
            .create_policy()
            .policy_name(name)
            .policy_document(document)
            .description("Workload permissions managed by irsa")
            .send()
            .await
            .map_err(|e| classify("iam:CreatePolicy", e))?;
        let policy = out
            .policy()
            .ok_or_else(|| ApiError::other("iam:CreatePolicy", "response has no policy"))?;
        let arn = policy
            .arn()
            .ok_or_else(|| ApiError::other("iam:CreatePolicy", "response has no ARN"))?;
        Ok(PolicyInfo {
            arn: arn.to_string(),
            default_version_id: policy.default_version_id().map(str::to_string),
        })
    }

    async fn delete_policy(&self, arn: &str) -> ApiResult<()> {
        self.iam
            .delete_policy()
            .policy_arn(arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam:DeletePolicy", e))
    }

    async fn list_policy_versions(&self, arn: &str) -> ApiResult<Vec<PolicyVersion>> {
        let mut versions = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .iam
                .list_policy_versions()
                .policy_arn(arn)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify("iam:ListPolicyVersions", e))?;
            for version in out.versions() {
                let Some(id) = version.version_id() else {
                    continue;
                };
                versions.push(PolicyVersion {
                    version_id: id.to_string(),
                    is_default: version.is_default_version(),
                    created: version
                        .create_date()
                        .and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos())),
                });
            }
            match (out.is_truncated(), out.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(versions)
    }

    async fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ApiResult<String> {
        let out = self
            .iam
            .create_policy_version()
            .policy_arn(arn)
            .policy_document(document)
            .set_as_default(set_as_default)
            .send()
            .await
            .map_err(|e| classify("iam:CreatePolicyVersion", e))?;
        out.policy_version()
            .and_then(|v| v.version_id())
            .map(str::to_string)
            .ok_or_else(|| ApiError::other("iam:CreatePolicyVersion", "response has no version id"))
    }

    async fn delete_policy_version(&self, arn: &str, version_id: &str) -> ApiResult<()> {
        self.iam
            .delete_policy_version()
            .policy_arn(arn)
            .version_id(version_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam:DeletePolicyVersion", e))
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam:AttachRolePolicy", e))
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()> {
        self.iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam:DetachRolePolicy", e))
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .iam
                .list_attached_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify("iam:ListAttachedRolePolicies", e))?;
            arns.extend(
                out.attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn())
                    .map(str::to_string),
            );
            match (out.is_truncated(), out.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(arns)
    }

    async fn list_inline_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .iam
                .list_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify("iam:ListRolePolicies", e))?;
            names.extend(out.policy_names().iter().cloned());
            match (out.is_truncated(), out.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(names)
    }

    async fn delete_inline_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> ApiResult<()> {
        self.iam
            .delete_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify("iam:DeleteRolePolicy", e))
    }

    async fn delete_service_linked_role(&self, role_name: &str) -> ApiResult<String> {
        let out = self
            .iam
            .delete_service_linked_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| classify("iam:DeleteServiceLinkedRole", e))?;
        Ok(out.deletion_task_id().to_string())
    }

    async fn deletion_status(&self, task_id: &str) -> ApiResult<DeletionStatus> {
        let out = self
            .iam
            .get_service_linked_role_deletion_status()
            .deletion_task_id(task_id)
            .send()
            .await
            .map_err(|e| classify("iam:GetServiceLinkedRoleDeletionStatus", e))?;
        Ok(match out.status() {
            DeletionTaskStatusType::NotStarted => DeletionStatus::NotStarted,
            DeletionTaskStatusType::InProgress => DeletionStatus::InProgress,
            DeletionTaskStatusType::Succeeded => DeletionStatus::Succeeded,
            DeletionTaskStatusType::Failed => DeletionStatus::Failed {
                reason: out
                    .reason()
                    .and_then(|r| r.reason())
                    .map(str::to_string),
            },
            // Unknown future states keep the task in the polling loop
            _ => DeletionStatus::InProgress,
        })
    }
}

#[async_trait]
impl ClusterApi for AwsApis {
    async fn describe_cluster(&self, name: &str) -> ApiResult<Option<ClusterInfo>> {
        let out = lookup(
            self.eks
                .describe_cluster()
                .name(name)
                .send()
                .await
                .map_err(|e| classify("eks:DescribeCluster", e)),
        )?;
        Ok(out.and_then(|out| {
            out.cluster().map(|cluster| ClusterInfo {
                name: cluster.name().unwrap_or(name).to_string(),
                issuer: cluster
                    .identity()
                    .and_then(|i| i.oidc())
                    .and_then(|o| o.issuer())
                    .map(str::to_string),
                vpc_id: cluster
                    .resources_vpc_config()
                    .and_then(|v| v.vpc_id())
                    .map(str::to_string),
            })
        }))
    }
}

#[async_trait]
impl AccountApi for AwsApis {
    async fn caller_account_id(&self) -> ApiResult<String> {
        let out = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| classify("sts:GetCallerIdentity", e))?;
        out.account()
            .map(str::to_string)
            .ok_or_else(|| ApiError::other("sts:GetCallerIdentity", "response has no account"))
    }
}

#[async_trait]
impl LoadBalancerApi for AwsApis {
    async fn list_legacy(&self) -> ApiResult<Vec<LoadBalancerRef>> {
        let mut found = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .elb
                .describe_load_balancers()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify("elasticloadbalancing:DescribeLoadBalancers", e))?;
            found.extend(out.load_balancer_descriptions().iter().map(|lb| {
                LoadBalancerRef {
                    name: lb.load_balancer_name().unwrap_or("<unnamed>").to_string(),
                    generation: LoadBalancerGeneration::Legacy,
                    kind: "classic".to_string(),
                }
            }));
            match out.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(found)
    }

    async fn list_current(&self) -> ApiResult<Vec<LoadBalancerRef>> {
        let mut found = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let out = self
                .elbv2
                .describe_load_balancers()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify("elasticloadbalancing:DescribeLoadBalancersV2", e))?;
            found.extend(out.load_balancers().iter().map(|lb| LoadBalancerRef {
                name: lb.load_balancer_name().unwrap_or("<unnamed>").to_string(),
                generation: LoadBalancerGeneration::Current,
                kind: lb
                    .r#type()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            }));
            match out.next_marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(found)
    }

    async fn find_target_group(&self, name: &str) -> ApiResult<Option<String>> {
        let out = lookup(
            self.elbv2
                .describe_target_groups()
                .names(name)
                .send()
                .await
                .map_err(|e| classify("elasticloadbalancing:DescribeTargetGroups", e)),
        )?;
        Ok(out.and_then(|out| {
            out.target_groups()
                .iter()
                .find_map(|tg| tg.target_group_arn())
                .map(str::to_string)
        }))
    }
}

//! Dry-run decorator
//!
//! Wraps the IAM and provider-registry seams. Lookups reach the real API so
//! the printed plan reflects current state; mutating calls are printed as
//! `[dry-run] <operation> <args>` and answered with synthetic values.

use async_trait::async_trait;

use super::{DeletionStatus, IamApi, IdentityProviderRegistry, PolicyInfo, PolicyVersion, RoleInfo};
use crate::error::ApiResult;

/// Prints mutations instead of performing them
#[derive(Debug)]
pub struct DryRun<'a, T: ?Sized> {
    inner: &'a T,
    partition: String,
    account_id: String,
}

impl<'a, T: ?Sized> DryRun<'a, T> {
    /// Wrap `inner`; synthetic ARNs use `partition` and `account_id`
    pub fn new(inner: &'a T, partition: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            inner,
            partition: partition.into(),
            account_id: account_id.into(),
        }
    }

    fn iam_arn(&self, kind: &str, name: &str) -> String {
        format!(
            "arn:{}:iam::{}:{}/{}",
            self.partition, self.account_id, kind, name
        )
    }
}

fn announce(operation: &str, args: &[(&str, &str)]) {
    let rendered: Vec<String> = args.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    println!("[dry-run] {} {}", operation, rendered.join(" "));
}

#[async_trait]
impl<'a, T: IdentityProviderRegistry + ?Sized> IdentityProviderRegistry for DryRun<'a, T> {
    async fn get_provider(&self, arn: &str) -> ApiResult<Option<String>> {
        self.inner.get_provider(arn).await
    }

    async fn create_provider(
        &self,
        issuer_url: &str,
        client_id: &str,
        thumbprint: &str,
    ) -> ApiResult<String> {
        announce(
            "iam:CreateOpenIDConnectProvider",
            &[
                ("url", issuer_url),
                ("client-id", client_id),
                ("thumbprint", thumbprint),
            ],
        );
        let host_path = issuer_url.trim_start_matches("https://");
        Ok(self.iam_arn("oidc-provider", host_path))
    }
}

#[async_trait]
impl<'a, T: IamApi + ?Sized> IamApi for DryRun<'a, T> {
    async fn get_role(&self, name: &str) -> ApiResult<Option<RoleInfo>> {
        self.inner.get_role(name).await
    }

    async fn create_role(&self, name: &str, trust_document: &str) -> ApiResult<RoleInfo> {
        announce("iam:CreateRole", &[("role", name)]);
        println!("{}", trust_document);
        Ok(RoleInfo {
            name: name.to_string(),
            arn: self.iam_arn("role", name),
        })
    }

    async fn update_trust_policy(&self, name: &str, trust_document: &str) -> ApiResult<()> {
        announce("iam:UpdateAssumeRolePolicy", &[("role", name)]);
        println!("{}", trust_document);
        Ok(())
    }

    async fn delete_role(&self, name: &str) -> ApiResult<()> {
        announce("iam:DeleteRole", &[("role", name)]);
        Ok(())
    }

    async fn get_policy(&self, arn: &str) -> ApiResult<Option<PolicyInfo>> {
        self.inner.get_policy(arn).await
    }

    async fn create_policy(&self, name: &str, document: &str) -> ApiResult<PolicyInfo> {
        announce("iam:CreatePolicy", &[("policy", name)]);
        println!("{}", document);
        Ok(PolicyInfo {
            arn: self.iam_arn("policy", name),
            default_version_id: Some("v1".to_string()),
        })
    }

    async fn delete_policy(&self, arn: &str) -> ApiResult<()> {
        announce("iam:DeletePolicy", &[("policy-arn", arn)]);
        Ok(())
    }

    async fn list_policy_versions(&self, arn: &str) -> ApiResult<Vec<PolicyVersion>> {
        self.inner.list_policy_versions(arn).await
    }

    async fn create_policy_version(
        &self,
        arn: &str,
        document: &str,
        set_as_default: bool,
    ) -> ApiResult<String> {
        let default = set_as_default.to_string();
        announce(
            "iam:CreatePolicyVersion",
            &[("policy-arn", arn), ("set-as-default", &default)],
        );
        println!("{}", document);
        Ok("dry-run".to_string())
    }

    async fn delete_policy_version(&self, arn: &str, version_id: &str) -> ApiResult<()> {
        announce(
            "iam:DeletePolicyVersion",
            &[("policy-arn", arn), ("version", version_id)],
        );
        Ok(())
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()> {
        announce(
            "iam:AttachRolePolicy",
            &[("role", role_name), ("policy-arn", policy_arn)],
        );
        Ok(())
    }

    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> ApiResult<()> {
        announce(
            "iam:DetachRolePolicy",
            &[("role", role_name), ("policy-arn", policy_arn)],
        );
        Ok(())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>> {
        self.inner.list_attached_role_policies(role_name).await
    }

    async fn list_inline_role_policies(&self, role_name: &str) -> ApiResult<Vec<String>> {
        self.inner.list_inline_role_policies(role_name).await
    }

    async fn delete_inline_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
    ) -> ApiResult<()> {
        announce(
            "iam:DeleteRolePolicy",
            &[("role", role_name), ("policy", policy_name)],
        );
        Ok(())
    }

    /// No task is created, so the returned id is empty
    async fn delete_service_linked_role(&self, role_name: &str) -> ApiResult<String> {
        announce("iam:DeleteServiceLinkedRole", &[("role", role_name)]);
        Ok(String::new())
    }

    async fn deletion_status(&self, task_id: &str) -> ApiResult<DeletionStatus> {
        self.inner.deletion_status(task_id).await
    }
}

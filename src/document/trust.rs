//! Role trust policy
//!
//! One statement: the cluster's OIDC provider may call
//! `sts:AssumeRoleWithWebIdentity` when the token audience and subject match
//! exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::POLICY_LANGUAGE_VERSION;
use crate::config::ResolvedConfig;
use crate::Result;

/// Action the trust statement allows
pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "sts:AssumeRoleWithWebIdentity";

/// Trust policy document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPolicy {
    /// Policy language version
    pub version: String,
    /// Exactly one statement
    pub statement: Vec<TrustStatement>,
}

/// The single trust statement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustStatement {
    /// Always `Allow`
    pub effect: String,
    /// Federated principal
    pub principal: FederatedPrincipal,
    /// Always `sts:AssumeRoleWithWebIdentity`
    pub action: String,
    /// Condition operator -> (key -> value)
    pub condition: BTreeMap<String, BTreeMap<String, String>>,
}

/// `{"Federated": "<provider arn>"}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FederatedPrincipal {
    /// OIDC provider ARN
    pub federated: String,
}

impl TrustPolicy {
    /// Build the trust policy for an explicit provider, issuer and subject
    pub fn for_web_identity(
        provider_arn: &str,
        issuer_host_path: &str,
        audience: &str,
        subject: &str,
    ) -> Self {
        let mut equals = BTreeMap::new();
        equals.insert(format!("{}:aud", issuer_host_path), audience.to_string());
        equals.insert(format!("{}:sub", issuer_host_path), subject.to_string());

        let mut condition = BTreeMap::new();
        condition.insert("StringEquals".to_string(), equals);

        Self {
            version: POLICY_LANGUAGE_VERSION.to_string(),
            statement: vec![TrustStatement {
                effect: "Allow".to_string(),
                principal: FederatedPrincipal {
                    federated: provider_arn.to_string(),
                },
                action: ASSUME_ROLE_WITH_WEB_IDENTITY.to_string(),
                condition,
            }],
        }
    }

    /// Trust policy for the configured service account
    pub fn for_config(config: &ResolvedConfig) -> Self {
        Self::for_web_identity(
            &config.oidc_provider_arn(),
            config.issuer.host_path(),
            config.audience(),
            &config.subject(),
        )
    }

    /// Subject the statement admits, if present
    pub fn subject(&self) -> Option<&str> {
        self.string_equals_suffix(":sub")
    }

    /// Audience the statement admits, if present
    pub fn audience(&self) -> Option<&str> {
        self.string_equals_suffix(":aud")
    }

    fn string_equals_suffix(&self, suffix: &str) -> Option<&str> {
        self.statement
            .first()?
            .condition
            .get("StringEquals")?
            .iter()
            .find(|(k, _)| k.ends_with(suffix))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the JSON the IAM API expects
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

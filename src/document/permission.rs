//! Workload permission policy
//!
//! The document grants actions on one named data resource and its
//! sub-resources. It comes from a remote template when one is configured and
//! reachable, otherwise from the templates compiled into the binary.

use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::{Error, Result};

/// Embedded permission templates, oldest first
const EMBEDDED_TEMPLATES: &[(u32, &str)] = &[
    (1, include_str!("../../templates/permission-policy/v1.json")),
    (2, include_str!("../../templates/permission-policy/v2.json")),
];

/// Permission policy document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version
    pub version: String,
    /// Statements
    pub statement: Vec<PolicyStatement>,
}

/// One permission statement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Optional statement id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// `Allow` or `Deny`
    pub effect: String,
    /// Actions
    #[serde(deserialize_with = "one_or_many")]
    pub action: Vec<String>,
    /// Resource ARNs
    #[serde(deserialize_with = "one_or_many")]
    pub resource: Vec<String>,
}

/// IAM accepts a bare string wherever a list is expected.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl PolicyDocument {
    /// Parse a rendered document
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::template(format!("invalid permission policy JSON: {}", e)))
    }

    /// Every resource must be `base_arn` itself or one of its sub-resources.
    pub fn validate_scope(&self, base_arn: &str) -> Result<()> {
        if self.statement.is_empty() {
            return Err(Error::validation("permission policy has no statements"));
        }
        let sub_prefix = format!("{}/", base_arn);
        for (i, stmt) in self.statement.iter().enumerate() {
            let label = stmt.sid.clone().unwrap_or_else(|| format!("#{}", i));
            if stmt.action.is_empty() {
                return Err(Error::validation(format!(
                    "statement {} has no actions",
                    label
                )));
            }
            if stmt.resource.is_empty() {
                return Err(Error::validation(format!(
                    "statement {} has no resources",
                    label
                )));
            }
            for resource in &stmt.resource {
                let scoped = resource == base_arn
                    || (resource.starts_with(&sub_prefix) && resource.len() > sub_prefix.len());
                if !scoped {
                    return Err(Error::validation(format!(
                        "statement {} resource '{}' is outside {}",
                        label, resource, base_arn
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize to the JSON the IAM API expects
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// ARN of the data resource the policy is scoped to
pub fn resource_arn(config: &ResolvedConfig) -> String {
    format!(
        "arn:{}:dynamodb:{}:{}:table/{}",
        config.partition, config.region, config.account_id, config.resource_name
    )
}

/// Embedded template for a revision; the latest when `revision` is `None`.
pub fn embedded_template(revision: Option<u32>) -> Result<(u32, &'static str)> {
    match revision {
        None => EMBEDDED_TEMPLATES
            .last()
            .copied()
            .ok_or_else(|| Error::template("no embedded permission templates")),
        Some(wanted) => EMBEDDED_TEMPLATES
            .iter()
            .find(|(rev, _)| *rev == wanted)
            .copied()
            .ok_or_else(|| {
                let known: Vec<String> = EMBEDDED_TEMPLATES
                    .iter()
                    .map(|(rev, _)| format!("v{}", rev))
                    .collect();
                Error::validation(format!(
                    "unknown policy revision v{} (embedded: {})",
                    wanted,
                    known.join(", ")
                ))
            }),
    }
}

/// Where the permission template comes from
#[derive(Clone, Debug, Default)]
pub struct PolicySource {
    /// Remote template URL, tried first
    pub url: Option<String>,
    /// Embedded revision used when the remote template is unavailable
    pub revision: Option<u32>,
}

impl PolicySource {
    /// Load the template text: remote if possible, else embedded.
    pub async fn load(&self) -> Result<String> {
        if let Some(url) = &self.url {
            match fetch_template(url).await {
                Ok(body) => {
                    info!(url = %url, "Using remote permission template");
                    return Ok(body);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Remote permission template unavailable, using embedded copy");
                }
            }
        }
        let (revision, template) = embedded_template(self.revision)?;
        info!(revision = %format!("v{}", revision), "Using embedded permission template");
        Ok(template.to_string())
    }

    /// Load, render and validate the permission document for `config`.
    pub async fn document(&self, config: &ResolvedConfig) -> Result<PolicyDocument> {
        let template = self.load().await?;
        render_document(&template, config)
    }
}

/// Render a template for `config` and check its resource scope.
pub fn render_document(template: &str, config: &ResolvedConfig) -> Result<PolicyDocument> {
    let mut env = Environment::new();
    env.add_template("policy", template)
        .map_err(|e| Error::template(format!("invalid permission template: {}", e)))?;
    let rendered = env
        .get_template("policy")
        .and_then(|t| {
            t.render(context! {
                partition => &config.partition,
                region => &config.region,
                account_id => &config.account_id,
                resource_name => &config.resource_name,
            })
        })
        .map_err(|e| Error::template(format!("failed to render permission template: {}", e)))?;

    let document = PolicyDocument::parse(&rendered)?;
    document.validate_scope(&resource_arn(config))?;
    Ok(document)
}

async fn fetch_template(url: &str) -> std::result::Result<String, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

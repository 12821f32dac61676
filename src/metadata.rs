//! Cluster metadata for downstream templating

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aws::LoadBalancerApi;
use crate::config::ResolvedConfig;
use crate::Result;

/// Values downstream chart rendering needs about the cluster and the role
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    /// Target group the workload registers with, when one was named
    pub target_group_arn: Option<String>,
    /// Cluster name
    pub cluster_name: String,
    /// Region
    pub region: String,
    /// Workload role ARN
    pub role_arn: Option<String>,
    /// Cluster VPC
    pub vpc_id: Option<String>,
}

impl ClusterMetadata {
    /// Metadata for a provisioned workload
    pub fn for_config(config: &ResolvedConfig, role_arn: &str) -> Self {
        Self {
            target_group_arn: None,
            cluster_name: config.cluster_name.clone(),
            region: config.region.clone(),
            role_arn: Some(role_arn.to_string()),
            vpc_id: config.vpc_id.clone(),
        }
    }

    /// Resolve `target_group` by name and record its ARN
    pub async fn with_target_group<L: LoadBalancerApi + ?Sized>(
        mut self,
        lbs: &L,
        target_group: Option<&str>,
    ) -> Result<Self> {
        if let Some(name) = target_group {
            self.target_group_arn = lbs.find_target_group(name).await?;
            if self.target_group_arn.is_none() {
                warn!(target_group = %name, "Target group not found");
            }
        }
        Ok(self)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write YAML to `path`, or stdout when `path` is `None`
    pub async fn emit(&self, path: Option<&Path>) -> Result<()> {
        let yaml = self.to_yaml()?;
        match path {
            Some(path) => {
                tokio::fs::write(path, yaml).await?;
                info!(path = %path.display(), "Wrote cluster metadata");
            }
            None => print!("{}", yaml),
        }
        Ok(())
    }
}

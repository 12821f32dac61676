//! Metadata command - print cluster metadata for downstream templating

use std::path::PathBuf;

use clap::Args;

use super::ClusterArgs;
use crate::aws::{ClusterApi, IamApi};
use crate::metadata::ClusterMetadata;
use crate::{Error, Result};

/// Print cluster metadata as YAML
#[derive(Args, Debug)]
pub struct MetadataArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Workload role whose ARN to include
    #[arg(long)]
    pub role_name: Option<String>,

    /// Target group whose ARN to include
    #[arg(long)]
    pub target_group: Option<String>,

    /// Write to this path instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run(args: MetadataArgs) -> Result<i32> {
    args.cluster.validate()?;
    let apis = args.cluster.connect().await;

    let cluster = apis
        .describe_cluster(&args.cluster.cluster_name)
        .await?
        .ok_or_else(|| {
            Error::precondition(
                format!(
                    "cluster '{}' not found in region {}",
                    args.cluster.cluster_name, args.cluster.region
                ),
                format!("aws eks list-clusters --region {}", args.cluster.region),
            )
        })?;

    let role_arn = match &args.role_name {
        Some(name) => {
            let role = apis.get_role(name).await?.ok_or_else(|| {
                Error::precondition(
                    format!("role '{}' does not exist", name),
                    format!(
                        "irsa iam --cluster-name {} --region {} --role-name {} ...",
                        args.cluster.cluster_name, args.cluster.region, name
                    ),
                )
            })?;
            Some(role.arn)
        }
        None => None,
    };

    let metadata = ClusterMetadata {
        target_group_arn: None,
        cluster_name: cluster.name,
        region: args.cluster.region.clone(),
        role_arn,
        vpc_id: cluster.vpc_id,
    }
    .with_target_group(&apis, args.target_group.as_deref())
    .await?;

    metadata.emit(args.output.as_deref()).await?;
    Ok(0)
}

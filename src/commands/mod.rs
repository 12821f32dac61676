//! CLI commands

use clap::{Args, Parser, Subcommand};

use crate::aws::sdk::AwsApis;
use crate::config::{validate_cluster_name, validate_region};
use crate::prompt::{Confirm, Preapproved, StdinConfirm};
use crate::Result;

pub mod iam;
pub mod metadata;
pub mod service_linked_role;

/// irsa - workload identity federation for managed Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "irsa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision (or with --uninstall remove) the role and policy for one service account
    Iam(iam::IamArgs),
    /// Delete the load-balancing service-linked role once no load balancer depends on it
    DeleteServiceLinkedRole(service_linked_role::DeleteServiceLinkedRoleArgs),
    /// Print cluster metadata for downstream templating
    Metadata(metadata::MetadataArgs),
}

impl Cli {
    /// Run the selected command; returns the process exit code
    pub async fn run(self) -> Result<i32> {
        match self.command {
            Commands::Iam(args) => iam::run(args).await,
            Commands::DeleteServiceLinkedRole(args) => service_linked_role::run(args).await,
            Commands::Metadata(args) => metadata::run(args).await,
        }
    }
}

/// Cluster selection shared by every command
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Managed cluster name
    #[arg(long, env = "IRSA_CLUSTER_NAME")]
    pub cluster_name: String,

    /// Region the cluster runs in
    #[arg(long, env = "AWS_REGION")]
    pub region: String,
}

impl ClusterArgs {
    /// Check both identifiers before any remote call
    pub fn validate(&self) -> Result<()> {
        validate_cluster_name(&self.cluster_name)?;
        validate_region(&self.region)
    }

    /// Load SDK clients for the selected region
    pub async fn connect(&self) -> AwsApis {
        AwsApis::load(&self.region).await
    }
}

/// Prompt on stdin unless the operator pre-approved
pub(crate) fn confirmer(preapproved: bool) -> Box<dyn Confirm> {
    if preapproved {
        Box::new(Preapproved)
    } else {
        Box::new(StdinConfirm)
    }
}

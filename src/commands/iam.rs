//! Iam command - provision or remove workload identity for one service account
//!
//! Usage: irsa iam --cluster-name <name> --region <region> --namespace <ns> --service-account <sa>
//!
//! Provisioning:
//! 1. Resolve account, partition, issuer and VPC
//! 2. Register the cluster's OIDC provider if missing
//! 3. Create or update the role and its trust policy
//! 4. Create the managed policy or publish a new default version
//! 5. Attach the policy to the role
//! 6. Optionally write cluster metadata
//!
//! With `--uninstall` the role and policy are removed instead, best-effort.
//! Uninstall resolves only the account, so it works after the cluster is gone.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use super::{confirmer, ClusterArgs};
use crate::aws::dry_run::DryRun;
use crate::aws::{AccountApi, ClusterApi, IamApi, IdentityProviderRegistry, LoadBalancerApi};
use crate::config::{Parameters, ResolvedConfig};
use crate::document::PolicySource;
use crate::metadata::ClusterMetadata;
use crate::oidc::{
    CertificateChainSource, ClusterOpsHelper, Eksctl, OidcOptions, ThumbprintStrategy,
    TlsChainFetcher,
};
use crate::prompt::Confirm;
use crate::provision::{provision, ProvisionRequest};
use crate::teardown::teardown;
use crate::Result;

/// Provision the role and policy for one service account
#[derive(Args, Debug)]
pub struct IamArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Namespace of the workload's service account
    #[arg(long, env = "IRSA_NAMESPACE")]
    pub namespace: String,

    /// Service account the role will trust
    #[arg(long, env = "IRSA_SERVICE_ACCOUNT")]
    pub service_account: String,

    /// Role name (default: <cluster>-<service-account>)
    #[arg(long)]
    pub role_name: Option<String>,

    /// Managed policy name (default: <cluster>-<service-account>-policy)
    #[arg(long)]
    pub policy_name: Option<String>,

    /// Data resource the permission policy is scoped to (default: cluster name)
    #[arg(long)]
    pub resource_name: Option<String>,

    /// Remote permission template, tried before the embedded templates
    #[arg(long, env = "IRSA_POLICY_URL")]
    pub policy_url: Option<String>,

    /// Embedded permission template revision (default: latest)
    #[arg(long)]
    pub policy_revision: Option<u32>,

    /// Target group to record in the cluster metadata
    #[arg(long)]
    pub target_group: Option<String>,

    /// Write cluster metadata YAML to this path
    #[arg(long)]
    pub metadata_out: Option<PathBuf>,

    /// How the OIDC provider thumbprint is obtained (auto, helper, tls, static)
    #[arg(long, default_value = "auto", value_parser = parse_strategy)]
    pub thumbprint_strategy: ThumbprintStrategy,

    /// Print mutating calls instead of making them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short = 'y', long = "yes", visible_alias = "upgrade")]
    pub yes: bool,

    /// Remove the role and policy instead of provisioning them
    #[arg(long)]
    pub uninstall: bool,
}

fn parse_strategy(s: &str) -> std::result::Result<ThumbprintStrategy, String> {
    s.parse()
}

impl IamArgs {
    fn parameters(&self) -> Parameters {
        Parameters {
            cluster_name: self.cluster.cluster_name.clone(),
            region: self.cluster.region.clone(),
            namespace: self.namespace.clone(),
            service_account: self.service_account.clone(),
            role_name: self.role_name.clone(),
            policy_name: self.policy_name.clone(),
            resource_name: self.resource_name.clone(),
        }
    }

    fn request(&self) -> ProvisionRequest {
        ProvisionRequest {
            policy: PolicySource {
                url: self.policy_url.clone(),
                revision: self.policy_revision,
            },
            oidc: OidcOptions {
                strategy: self.thumbprint_strategy,
                dry_run: self.dry_run,
            },
        }
    }
}

pub async fn run(args: IamArgs) -> Result<i32> {
    args.parameters().validate()?;

    let apis = args.cluster.connect().await;
    let confirm = confirmer(args.yes);
    execute(
        &args,
        &apis,
        &Eksctl,
        &TlsChainFetcher::new(),
        confirm.as_ref(),
    )
    .await
}

/// Run the command against explicit collaborators; returns the exit code
pub async fn execute<A, H, C>(
    args: &IamArgs,
    apis: &A,
    helper: &H,
    chains: &C,
    confirm: &dyn Confirm,
) -> Result<i32>
where
    A: IdentityProviderRegistry + IamApi + ClusterApi + AccountApi + LoadBalancerApi,
    H: ClusterOpsHelper + ?Sized,
    C: CertificateChainSource + ?Sized,
{
    let params = args.parameters();
    if args.uninstall {
        return uninstall(args, &params, apis, confirm).await;
    }

    let config = params.resolve(apis, apis).await?;

    let dry;
    let (registry, iam): (&dyn IdentityProviderRegistry, &dyn IamApi) = if args.dry_run {
        dry = DryRun::new(apis, &config.partition, &config.account_id);
        (&dry, &dry)
    } else {
        (apis, apis)
    };

    if !args.dry_run && !confirm.confirm(&plan(&config)).await? {
        println!("Aborted");
        return Ok(0);
    }

    let provisioned = provision(registry, iam, helper, chains, &config, &args.request()).await?;

    println!("OIDC provider: {}", provisioned.provider_arn);
    println!("Role:          {}", provisioned.role_arn);
    println!("Policy:        {}", provisioned.policy_arn);
    println!(
        "Annotate the service account with eks.amazonaws.com/role-arn={}",
        provisioned.role_arn
    );

    if let Some(path) = &args.metadata_out {
        let metadata = ClusterMetadata::for_config(&config, &provisioned.role_arn)
            .with_target_group(apis, args.target_group.as_deref())
            .await?;
        metadata.emit(Some(path)).await?;
    }

    info!(cluster = %config.cluster_name, "Done");
    Ok(0)
}

/// Teardown needs only the account and names; the cluster may already be gone
async fn uninstall<A>(
    args: &IamArgs,
    params: &Parameters,
    apis: &A,
    confirm: &dyn Confirm,
) -> Result<i32>
where
    A: IamApi + AccountApi,
{
    let identity = params.resolve_identity(apis).await?;

    let dry;
    let iam: &dyn IamApi = if args.dry_run {
        dry = DryRun::new(apis, &identity.partition, &identity.account_id);
        &dry
    } else {
        apis
    };

    if !args.dry_run {
        let question = format!(
            "This will delete role '{}' and policy '{}'.",
            identity.role_name, identity.policy_name
        );
        if !confirm.confirm(&question).await? {
            println!("Aborted");
            return Ok(0);
        }
    }

    let report = teardown(iam, &identity.role_name, &identity.policy_arn()).await;
    print!("{}", report);
    if !report.is_clean() {
        println!("Some steps failed; re-run to retry them.");
    }
    Ok(0)
}

fn plan(config: &ResolvedConfig) -> String {
    format!(
        "This will configure role '{}' for {} with policy '{}' on resource '{}'.",
        config.role_name,
        config.subject(),
        config.policy_name,
        config.resource_name
    )
}

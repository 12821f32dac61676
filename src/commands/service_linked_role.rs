//! Delete-service-linked-role command
//!
//! Usage: irsa delete-service-linked-role --cluster-name <name> --region <region>
//!
//! Refuses to delete while any load balancer (classic or v2) exists in the
//! region. With `--check-only` it only reports dependency state.

use std::time::Duration;

use clap::Args;

use super::ClusterArgs;
use crate::poll::{PollConfig, DEFAULT_MAX_ATTEMPTS};
use crate::prompt::StdinConfirm;
use crate::service_linked::{delete_service_linked_role, SlrOptions};
use crate::{Error, Result, DEFAULT_SERVICE_LINKED_ROLE};

/// Delete the load-balancing service-linked role
#[derive(Args, Debug)]
pub struct DeleteServiceLinkedRoleArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Service-linked role to delete
    #[arg(long, default_value = DEFAULT_SERVICE_LINKED_ROLE)]
    pub role_name: String,

    /// Only report whether anything still depends on the role
    #[arg(long)]
    pub check_only: bool,

    /// Skip confirmation prompt
    #[arg(long, visible_alias = "yes")]
    pub force: bool,

    /// Check dependencies and print the deletion call without making it
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between deletion status checks
    #[arg(long, default_value_t = 10)]
    pub poll_interval_secs: u64,

    /// Status checks before reporting the deletion as pending
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
}

impl DeleteServiceLinkedRoleArgs {
    fn options(&self) -> Result<SlrOptions> {
        if self.role_name.trim().is_empty() {
            return Err(Error::validation("--role-name must not be empty"));
        }
        if self.max_attempts == 0 {
            return Err(Error::validation("--max-attempts must be at least 1"));
        }
        Ok(SlrOptions {
            role_name: self.role_name.clone(),
            check_only: self.check_only,
            force: self.force,
            dry_run: self.dry_run,
            poll: PollConfig::new(
                Duration::from_secs(self.poll_interval_secs),
                self.max_attempts,
            ),
        })
    }
}

pub async fn run(args: DeleteServiceLinkedRoleArgs) -> Result<i32> {
    args.cluster.validate()?;
    let options = args.options()?;

    let apis = args.cluster.connect().await;
    let outcome = delete_service_linked_role(&apis, &apis, &StdinConfirm, &options).await?;

    println!("{}", outcome);
    Ok(outcome.exit_code())
}

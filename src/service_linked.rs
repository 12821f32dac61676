//! Service-linked role deletion
//!
//! The load-balancing service owns its service-linked role and refuses to
//! delete it while any load balancer still exists. Deletion is therefore
//! gated on an empty combined listing of both load-balancer generations,
//! confirmed with the operator, submitted as an asynchronous task, and then
//! polled:
//!
//! ```text
//! check dependencies ─┬─ blocked (any load balancer) ── report, no deletion
//!                     └─ clear ── confirm ── submit ── poll ─┬─ succeeded
//!                                                            ├─ failed (reason)
//!                                                            └─ pending timeout
//! ```
//!
//! A pending timeout is an outcome, not an error: the task id is reported and
//! the deletion may still complete out-of-band.

use std::fmt;

use tracing::{debug, info};

use crate::aws::{DeletionStatus, IamApi, LoadBalancerApi, LoadBalancerRef};
use crate::error::{ErrorPolicy, Step};
use crate::poll::{poll_with_attempts, PollConfig, PollOutcome};
use crate::prompt::Confirm;
use crate::{Error, Result, DEFAULT_SERVICE_LINKED_ROLE};

/// Options for one deletion run
#[derive(Clone, Debug)]
pub struct SlrOptions {
    /// Service-linked role to delete
    pub role_name: String,
    /// Only report dependency state
    pub check_only: bool,
    /// Skip the confirmation prompt
    pub force: bool,
    /// Stop after the dependency check and print the planned call
    pub dry_run: bool,
    /// Status polling
    pub poll: PollConfig,
}

impl Default for SlrOptions {
    fn default() -> Self {
        Self {
            role_name: DEFAULT_SERVICE_LINKED_ROLE.to_string(),
            check_only: false,
            force: false,
            dry_run: false,
            poll: PollConfig::default(),
        }
    }
}

/// Where the state machine stopped
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlrOutcome {
    /// Load balancers still depend on the role; nothing was submitted
    Blocked {
        /// Every blocking resource, legacy first
        resources: Vec<LoadBalancerRef>,
        /// Whether this was a check-only run
        check_only: bool,
    },
    /// Check-only run found no dependents
    Clear,
    /// Operator declined the prompt
    Declined,
    /// Dry run; the deletion call was printed
    DryRun,
    /// The role did not exist
    AlreadyAbsent,
    /// The deletion task completed
    Succeeded {
        /// Deletion task id
        task_id: String,
    },
    /// The deletion task failed
    Failed {
        /// Deletion task id
        task_id: String,
        /// Provider-stated reason
        reason: Option<String>,
    },
    /// The attempt budget ran out before the task finished
    PendingTimeout {
        /// Deletion task id, for manual follow-up
        task_id: String,
        /// Number of status checks made
        attempts: u32,
    },
}

impl SlrOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Blocked { check_only, .. } => {
                if *check_only {
                    0
                } else {
                    1
                }
            }
            Self::Failed { .. } => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for SlrOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked { resources, .. } => {
                writeln!(
                    f,
                    "BLOCKED: {} load balancer(s) still depend on the service-linked role:",
                    resources.len()
                )?;
                for lb in resources {
                    writeln!(f, "  - {}", lb)?;
                }
                write!(f, "Delete them first, then re-run.")
            }
            Self::Clear => write!(f, "CLEAR: no load balancers depend on the service-linked role"),
            Self::Declined => write!(f, "Aborted"),
            Self::DryRun => write!(f, "Dry run complete, nothing was deleted"),
            Self::AlreadyAbsent => write!(f, "Service-linked role does not exist, nothing to delete"),
            Self::Succeeded { task_id } => {
                write!(f, "SUCCEEDED: service-linked role deleted (task {})", task_id)
            }
            Self::Failed { task_id, reason } => write!(
                f,
                "FAILED: deletion task {} failed: {}",
                task_id,
                reason.as_deref().unwrap_or("no reason given")
            ),
            Self::PendingTimeout { task_id, attempts } => write!(
                f,
                "PENDING: deletion task {} still running after {} checks; \
                 follow up with: aws iam get-service-linked-role-deletion-status --deletion-task-id {}",
                task_id, attempts, task_id
            ),
        }
    }
}

/// Every load balancer, both generations
pub async fn list_dependents<L: LoadBalancerApi + ?Sized>(lbs: &L) -> Result<Vec<LoadBalancerRef>> {
    let mut resources = lbs.list_legacy().await?;
    let current = lbs.list_current().await?;
    debug!(
        legacy = resources.len(),
        current = current.len(),
        "Counted load balancers"
    );
    resources.extend(current);
    Ok(resources)
}

/// Run the deletion state machine.
///
/// The deletion call is never made while any load balancer exists.
pub async fn delete_service_linked_role<I, L, P>(
    iam: &I,
    lbs: &L,
    prompt: &P,
    options: &SlrOptions,
) -> Result<SlrOutcome>
where
    I: IamApi + ?Sized,
    L: LoadBalancerApi + ?Sized,
    P: Confirm + ?Sized,
{
    let resources = list_dependents(lbs).await?;
    if !resources.is_empty() {
        info!(
            role = %options.role_name,
            dependents = resources.len(),
            "Service-linked role deletion blocked"
        );
        return Ok(SlrOutcome::Blocked {
            resources,
            check_only: options.check_only,
        });
    }

    if options.check_only {
        return Ok(SlrOutcome::Clear);
    }

    if options.dry_run {
        println!(
            "[dry-run] iam:DeleteServiceLinkedRole role={}",
            options.role_name
        );
        return Ok(SlrOutcome::DryRun);
    }

    if !options.force {
        let question = format!(
            "This will delete the service-linked role '{}'.",
            options.role_name
        );
        if !prompt.confirm(&question).await? {
            return Ok(SlrOutcome::Declined);
        }
    }

    let submitted = ErrorPolicy::AbortOnError.settle(
        "delete service-linked role",
        iam.delete_service_linked_role(&options.role_name).await,
    )?;
    let task_id = match submitted {
        Step::Done(task_id) => task_id,
        _ => return Ok(SlrOutcome::AlreadyAbsent),
    };
    info!(role = %options.role_name, task = %task_id, "Deletion submitted");

    let task = task_id.as_str();
    let outcome = poll_with_attempts(
        &options.poll,
        "service-linked role deletion",
        move || async move {
            let status = iam.deletion_status(task).await?;
            debug!(task = %task, status = %status, "Deletion status");
            Ok::<_, Error>(status.is_terminal().then_some(status))
        },
    )
    .await?;

    Ok(match outcome {
        PollOutcome::Ready {
            value: DeletionStatus::Failed { reason },
            ..
        } => SlrOutcome::Failed { task_id, reason },
        PollOutcome::Ready { .. } => SlrOutcome::Succeeded { task_id },
        PollOutcome::Exhausted { attempts } => SlrOutcome::PendingTimeout { task_id, attempts },
    })
}

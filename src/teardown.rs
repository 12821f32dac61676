//! Best-effort teardown of the role and its managed policy
//!
//! Deletion order:
//! 1. Detach every managed policy from the role
//! 2. Delete every inline policy on the role
//! 3. Delete the role
//! 4. Delete the managed policy's non-default versions
//! 5. Delete the managed policy
//!
//! Every step runs under [`ErrorPolicy::ContinueOnError`]: objects that are
//! already gone count as clean, anything else is logged and skipped. The
//! cluster's OIDC provider is shared by every workload and is left in place.

use std::fmt;

use tracing::info;

use crate::aws::IamApi;
use crate::error::{ApiResult, ErrorPolicy, Step};

/// How one teardown step ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// The object was deleted or detached
    Done,
    /// The object did not exist
    AlreadyClean,
    /// The call failed; the provider message is kept
    Skipped(String),
}

/// One line of a teardown report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepReport {
    /// What was attempted, e.g. `delete role orders-api`
    pub step: String,
    /// How it ended
    pub status: StepStatus,
}

/// Outcome of every step, in execution order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Steps in execution order
    pub steps: Vec<StepReport>,
}

impl TeardownReport {
    /// True when no step was skipped
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|s| !matches!(s.status, StepStatus::Skipped(_)))
    }

    /// Steps that failed and were skipped
    pub fn skipped(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Skipped(_)))
    }

    fn settle<T>(&mut self, step: String, result: ApiResult<T>) -> Option<T> {
        let (status, value) = match ErrorPolicy::ContinueOnError.settle(&step, result) {
            Ok(Step::Done(value)) => (StepStatus::Done, Some(value)),
            Ok(Step::AlreadyClean) => (StepStatus::AlreadyClean, None),
            Ok(Step::Skipped(e)) => (StepStatus::Skipped(e.to_string()), None),
            Err(e) => (StepStatus::Skipped(e.to_string()), None),
        };
        self.steps.push(StepReport { step, status });
        value
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.steps {
            match &s.status {
                StepStatus::Done => writeln!(f, "  done     {}", s.step)?,
                StepStatus::AlreadyClean => writeln!(f, "  absent   {}", s.step)?,
                StepStatus::Skipped(reason) => writeln!(f, "  FAILED   {}: {}", s.step, reason)?,
            }
        }
        Ok(())
    }
}

/// Remove the role `role_name` and the managed policy `policy_arn`.
///
/// Never fails; inspect the returned report for skipped steps.
pub async fn teardown<I: IamApi + ?Sized>(
    iam: &I,
    role_name: &str,
    policy_arn: &str,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    let attached = report.settle(
        format!("list policies attached to {}", role_name),
        iam.list_attached_role_policies(role_name).await,
    );
    for arn in attached.unwrap_or_default() {
        report.settle(
            format!("detach {} from {}", arn, role_name),
            iam.detach_role_policy(role_name, &arn).await,
        );
    }

    let inline = report.settle(
        format!("list inline policies of {}", role_name),
        iam.list_inline_role_policies(role_name).await,
    );
    for name in inline.unwrap_or_default() {
        report.settle(
            format!("delete inline policy {} from {}", name, role_name),
            iam.delete_inline_role_policy(role_name, &name).await,
        );
    }

    report.settle(
        format!("delete role {}", role_name),
        iam.delete_role(role_name).await,
    );

    let versions = report.settle(
        format!("list versions of {}", policy_arn),
        iam.list_policy_versions(policy_arn).await,
    );
    for version in versions
        .unwrap_or_default()
        .into_iter()
        .filter(|v| !v.is_default)
    {
        report.settle(
            format!("delete version {} of {}", version.version_id, policy_arn),
            iam.delete_policy_version(policy_arn, &version.version_id)
                .await,
        );
    }

    report.settle(
        format!("delete policy {}", policy_arn),
        iam.delete_policy(policy_arn).await,
    );

    info!(
        role = %role_name,
        policy = %policy_arn,
        clean = report.is_clean(),
        "Teardown finished"
    );
    report
}

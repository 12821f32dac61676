//! Role-policy binding

use tracing::{debug, info};

use crate::aws::{role_name_from_arn, IamApi};
use crate::{Error, Result};

/// Attach `policy_arn` to the role `role_arn`. Attaching twice is a no-op.
pub async fn ensure_attached<I: IamApi + ?Sized>(
    iam: &I,
    role_arn: &str,
    policy_arn: &str,
) -> Result<()> {
    let role_name = role_name_from_arn(role_arn)
        .ok_or_else(|| Error::validation(format!("'{}' is not a role ARN", role_arn)))?;

    match iam.attach_role_policy(role_name, policy_arn).await {
        Ok(()) => {
            info!(role = %role_name, policy = %policy_arn, "Policy attached");
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            debug!(role = %role_name, policy = %policy_arn, "Policy already attached");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

//! Role reconciliation

use tracing::info;

use crate::aws::IamApi;
use crate::Result;

/// Ensure `name` exists with exactly `trust_document` as its trust policy.
///
/// Existence is checked first. An existing role has its trust document
/// overwritten unconditionally; there is no diff or merge.
pub async fn ensure_role<I: IamApi + ?Sized>(
    iam: &I,
    name: &str,
    trust_document: &str,
) -> Result<String> {
    match iam.get_role(name).await? {
        Some(role) => {
            info!(role = %name, "Role exists, replacing trust policy");
            iam.update_trust_policy(name, trust_document).await?;
            Ok(role.arn)
        }
        None => {
            info!(role = %name, "Creating role");
            let role = iam.create_role(name, trust_document).await?;
            Ok(role.arn)
        }
    }
}

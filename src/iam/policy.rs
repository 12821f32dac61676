//! Managed policy version management
//!
//! IAM keeps at most [`MAX_POLICY_VERSIONS`] versions per managed policy,
//! exactly one of them default. Publishing a new document therefore evicts
//! the oldest non-default version first whenever the policy is at the
//! ceiling. The default version is never an eviction candidate.

use std::cmp::Ordering;

use tracing::info;

use crate::aws::{IamApi, PolicyVersion};
use crate::error::ErrorPolicy;
use crate::Result;

/// Provider ceiling on retained versions per policy
pub const MAX_POLICY_VERSIONS: usize = 5;

/// Non-default count at which a new version would exceed the ceiling
pub const EVICTION_THRESHOLD: usize = MAX_POLICY_VERSIONS - 1;

/// Ensure the managed policy `name` exists and its default version is `document`.
///
/// `arn` is the policy's deterministic ARN, used for the existence check.
pub async fn ensure_policy<I: IamApi + ?Sized>(
    iam: &I,
    name: &str,
    arn: &str,
    document: &str,
) -> Result<String> {
    let Some(policy) = iam.get_policy(arn).await? else {
        info!(policy = %name, "Creating managed policy");
        let created = iam.create_policy(name, document).await?;
        return Ok(created.arn);
    };

    let versions = iam.list_policy_versions(&policy.arn).await?;
    let mut non_default: Vec<PolicyVersion> =
        versions.into_iter().filter(|v| !v.is_default).collect();

    while non_default.len() >= EVICTION_THRESHOLD {
        let Some(index) = oldest_index(&non_default) else {
            break;
        };
        let victim = non_default.remove(index);
        info!(
            policy = %name,
            version = %victim.version_id,
            "Policy at version ceiling, evicting oldest non-default version"
        );
        ErrorPolicy::AbortOnError.settle(
            "delete policy version",
            iam.delete_policy_version(&policy.arn, &victim.version_id)
                .await,
        )?;
    }

    let version = iam
        .create_policy_version(&policy.arn, document, true)
        .await?;
    info!(policy = %name, version = %version, "Published new default policy version");
    Ok(policy.arn)
}

/// Index of the oldest version among `candidates`.
///
/// Creation time decides when every candidate has one; otherwise the version
/// the registry listed last is taken as the oldest.
pub fn oldest_index(candidates: &[PolicyVersion]) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.iter().all(|v| v.created.is_some()) {
        candidates
            .iter()
            .enumerate()
            .min_by(|(ia, a), (ib, b)| match a.created.cmp(&b.created) {
                // Ties resolve to the later listing position
                Ordering::Equal => ib.cmp(ia),
                other => other,
            })
            .map(|(i, _)| i)
    } else {
        Some(candidates.len() - 1)
    }
}

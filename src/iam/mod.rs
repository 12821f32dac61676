//! Idempotent IAM reconcilers
//!
//! - [`role`] - create-or-overwrite a role and its trust policy
//! - [`policy`] - create-or-publish a managed policy under the version ceiling
//! - [`attachment`] - bind the policy to the role

pub mod attachment;
pub mod policy;
pub mod role;

pub use attachment::ensure_attached;
pub use policy::{ensure_policy, MAX_POLICY_VERSIONS};
pub use role::ensure_role;

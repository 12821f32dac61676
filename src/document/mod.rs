//! IAM policy documents
//!
//! - [`trust`] - role trust policy admitting one service account
//! - [`permission`] - workload permission policy and its template sources

pub mod permission;
pub mod trust;

pub use permission::{PolicyDocument, PolicySource, PolicyStatement};
pub use trust::TrustPolicy;

/// IAM policy language version used by every document
pub const POLICY_LANGUAGE_VERSION: &str = "2012-10-17";

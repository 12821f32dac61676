//! irsa - workload identity federation for managed Kubernetes clusters
//!
//! Provisions and tears down the cloud identity objects that let one
//! Kubernetes service account assume one IAM role: the cluster's OIDC trust
//! anchor, the role and its trust policy, and a versioned managed permission
//! policy bound to the role. Separately, deletes the load-balancing
//! service-linked role once nothing depends on it.
//!
//! Every run is a one-shot reconciliation. Each step checks current state
//! before acting, so re-running converges.
//!
//! # Modules
//!
//! - [`config`] - Parameter validation and the resolved configuration
//! - [`oidc`] - OIDC provider registration and thumbprint strategies
//! - [`iam`] - Role, managed policy and attachment reconcilers
//! - [`document`] - Trust and permission policy documents
//! - [`provision`] - End-to-end provisioning flow
//! - [`teardown`] - Best-effort removal of the role and policy
//! - [`service_linked`] - Gated, polled service-linked role deletion
//! - [`metadata`] - Cluster metadata for downstream templating
//! - [`aws`] - Cloud API traits, SDK implementations and dry-run decorator
//! - [`poll`] - Attempt-bounded polling
//! - [`commands`] - CLI subcommands
//! - [`error`] - Error types

pub mod aws;
pub mod commands;
pub mod config;
pub mod document;
pub mod error;
pub mod iam;
pub mod metadata;
pub mod oidc;
pub mod poll;
pub mod prompt;
pub mod provision;
pub mod service_linked;
pub mod teardown;

pub use commands::Cli;
pub use error::Error;

/// Result type for irsa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Token audience (and OIDC client id) for web-identity federation
pub const FEDERATION_AUDIENCE: &str = "sts.amazonaws.com";

/// Service-linked role owned by Elastic Load Balancing
pub const DEFAULT_SERVICE_LINKED_ROLE: &str = "AWSServiceRoleForElasticLoadBalancing";

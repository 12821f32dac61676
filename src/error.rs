//! Error types for irsa operations
//!
//! Remote failures arrive as [`ApiError`], classified by the service error
//! code so callers can tell a missing object apart from a real failure. Each
//! call site decides what a failure means through an [`ErrorPolicy`]:
//! provisioning aborts, teardown logs and moves on.

use thiserror::Error;
use tracing::{info, warn};

/// Main error type for irsa operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required parameter is missing or malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// The environment is not ready; `hint` is the command that fixes it
    #[error("precondition failed: {message}")]
    Precondition {
        /// What is missing
        message: String,
        /// Corrective command to run next
        hint: String,
    },

    /// Unexpected failure from a remote API
    #[error("provider error: {0}")]
    Provider(#[from] ApiError),

    /// No strategy produced a usable OIDC thumbprint
    #[error("thumbprint error: {0}")]
    Thumbprint(String),

    /// Policy template could not be loaded or rendered
    #[error("template error: {0}")]
    Template(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local I/O error (prompt, metadata output)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a precondition error carrying a remediation command
    pub fn precondition(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Create a thumbprint error with the given message
    pub fn thumbprint(msg: impl Into<String>) -> Self {
        Self::Thumbprint(msg.into())
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Remediation command for this error, if one exists
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Precondition { hint, .. } => Some(hint),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Classification of a remote API failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The addressed object does not exist
    NotFound,
    /// The object (or attachment) already exists
    AlreadyExists,
    /// A service quota was hit (e.g. policy version ceiling)
    LimitExceeded,
    /// The object still has dependents
    DeleteConflict,
    /// Anything else
    Other,
}

impl ApiErrorKind {
    /// Map an AWS service error code to a kind
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(
                "NoSuchEntity"
                | "NoSuchEntityException"
                | "ResourceNotFoundException"
                | "LoadBalancerNotFound"
                | "TargetGroupNotFound",
            ) => Self::NotFound,
            Some("EntityAlreadyExists" | "EntityAlreadyExistsException") => Self::AlreadyExists,
            Some("LimitExceeded" | "LimitExceededException") => Self::LimitExceeded,
            Some("DeleteConflict" | "DeleteConflictException") => Self::DeleteConflict,
            _ => Self::Other,
        }
    }
}

/// A failed remote call
#[derive(Clone, Debug, Error)]
#[error("{operation} failed: {message}")]
pub struct ApiError {
    /// API operation name, e.g. `iam:CreateRole`
    pub operation: &'static str,
    /// Failure classification
    pub kind: ApiErrorKind,
    /// Provider message
    pub message: String,
}

impl ApiError {
    /// Create an API error
    pub fn new(operation: &'static str, kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(operation, ApiErrorKind::NotFound, message)
    }

    /// Create an unclassified error
    pub fn other(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(operation, ApiErrorKind::Other, message)
    }

    /// True when the addressed object is absent
    pub fn is_not_found(&self) -> bool {
        self.kind == ApiErrorKind::NotFound
    }

    /// True when the object or link already exists
    pub fn is_already_exists(&self) -> bool {
        self.kind == ApiErrorKind::AlreadyExists
    }
}

/// Result of a single remote call
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// What a call site does when a remote call fails
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Propagate the failure and stop
    AbortOnError,
    /// Log a warning and keep going
    ContinueOnError,
}

/// Settled outcome of a remote call under an [`ErrorPolicy`]
#[derive(Debug)]
pub enum Step<T> {
    /// The call succeeded
    Done(T),
    /// The object was already gone
    AlreadyClean,
    /// The call failed and the policy said to continue
    Skipped(ApiError),
}

impl<T> Step<T> {
    /// True unless the step was skipped after a failure
    pub fn is_clean(&self) -> bool {
        !matches!(self, Step::Skipped(_))
    }
}

impl ErrorPolicy {
    /// Settle a call result.
    ///
    /// Not-found is always [`Step::AlreadyClean`]. Other failures either
    /// abort with [`Error::Provider`] or become [`Step::Skipped`].
    pub fn settle<T>(self, step: &str, result: ApiResult<T>) -> Result<Step<T>, Error> {
        match result {
            Ok(value) => Ok(Step::Done(value)),
            Err(e) if e.is_not_found() => {
                info!(step = %step, "Already clean");
                Ok(Step::AlreadyClean)
            }
            Err(e) => match self {
                ErrorPolicy::AbortOnError => Err(Error::Provider(e)),
                ErrorPolicy::ContinueOnError => {
                    warn!(step = %step, error = %e, "Step failed, continuing");
                    Ok(Step::Skipped(e))
                }
            },
        }
    }
}

//! Error types for the approval engine

use approval_types::{InstanceId, ParseActionError, UserId};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Main error type for all approval operations
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    #[error("Approval instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("No pending step '{step_key}' on instance {instance_id}")]
    StepNotPending {
        instance_id: InstanceId,
        step_key: String,
    },

    #[error("User {user_id} may not decide step '{step_key}'")]
    PermissionDenied { user_id: UserId, step_key: String },

    #[error("Step '{0}' cannot be skipped")]
    SkipNotAllowed(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Instance {instance_id} is busy, lock not acquired within {waited_ms}ms")]
    Busy { instance_id: InstanceId, waited_ms: u64 },

    #[error("Instance {instance_id} is already {status}")]
    InstanceClosed {
        instance_id: InstanceId,
        status: approval_types::InstanceStatus,
    },

    #[error("Invalid workflow catalog: {0}")]
    InvalidCatalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable identifier for each error variant, reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnknownWorkflowType,
    InstanceNotFound,
    StepNotPending,
    PermissionDenied,
    SkipNotAllowed,
    UnsupportedAction,
    Busy,
    InstanceClosed,
    InvalidCatalog,
    Config,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ApprovalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownWorkflowType(_) => ErrorKind::UnknownWorkflowType,
            Self::InstanceNotFound(_) => ErrorKind::InstanceNotFound,
            Self::StepNotPending { .. } => ErrorKind::StepNotPending,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::SkipNotAllowed(_) => ErrorKind::SkipNotAllowed,
            Self::UnsupportedAction(_) => ErrorKind::UnsupportedAction,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::InstanceClosed { .. } => ErrorKind::InstanceClosed,
            Self::InvalidCatalog(_) => ErrorKind::InvalidCatalog,
            Self::Config(_) => ErrorKind::Config,
            Self::Storage(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Storage,
        }
    }

    /// Caller mistakes (bad input, wrong state, missing permission) as opposed
    /// to faults inside the engine or its backing services
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Busy | ErrorKind::Storage | ErrorKind::Config | ErrorKind::InvalidCatalog
        )
    }
}

impl From<ParseActionError> for ApprovalError {
    fn from(err: ParseActionError) -> Self {
        Self::UnsupportedAction(err.0)
    }
}

/// Which post-commit side effect failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SideEffect {
    Notify,
    Audit,
}

/// A side effect that failed after the transition was committed.
///
/// Returned next to the result instead of as an error: the transition stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffectWarning {
    pub effect: SideEffect,
    pub message: String,
}

impl SideEffectWarning {
    pub fn new(effect: SideEffect, error: &ApprovalError) -> Self {
        Self {
            effect,
            message: error.to_string(),
        }
    }
}

/// Result type for approval operations
pub type Result<T> = std::result::Result<T, ApprovalError>;

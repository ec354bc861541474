//! Error types for reconcile operations.

use std::time::Duration;
use thiserror::Error;

use crate::aws::AwsError;

/// Errors that abort a single reconcile attempt.
///
/// A missing remote role is not represented here: lookups return `Option`
/// and absence drives the create path.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The remote role exists but was not created by this operator.
    #[error("role '{role}' exists but does not carry the '{tag}' ownership tag; refusing to modify it")]
    OwnershipDenied { role: String, tag: String },

    /// Any remote IAM call failure other than "not found".
    #[error(transparent)]
    Remote(#[from] AwsError),

    /// A policy document could not be serialized.
    #[error("Failed to encode policy document: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Writing the finalizer or status back onto the record failed.
    #[error("Failed to persist {0}")]
    Persistence(String),

    /// The reconcile pass did not finish before its deadline.
    #[error("reconcile did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    /// Invalid operator configuration or desired-state record.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ReconcileError {
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether retrying without operator intervention can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::OwnershipDenied { .. } | Self::Config(_))
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

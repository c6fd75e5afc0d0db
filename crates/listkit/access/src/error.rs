//! Error types for access evaluation

use listkit_storage::StorageError;
use listkit_types::{ItemId, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-visible part of an access denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDeniedPublic {
    /// `query` or `mutation`
    pub operation_type: String,
    /// Transport-level target, e.g. `updatePost`
    pub target: String,
}

/// Log-only part of an access denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDeniedInternal {
    pub list_key: String,
    pub operation: Operation,
    pub authenticated: Option<String>,
    pub item_id: Option<ItemId>,
    pub field: Option<String>,
}

/// Raised when a list- or field-level check fails, or when an access-checked
/// lookup finds nothing.
///
/// The message and public payload never reveal whether the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("You do not have access to this resource")]
pub struct AccessDeniedError {
    pub public: AccessDeniedPublic,
    pub internal: AccessDeniedInternal,
}

impl AccessDeniedError {
    pub fn new(
        list_key: impl Into<String>,
        operation: Operation,
        target: impl Into<String>,
        authenticated: Option<String>,
    ) -> Self {
        Self {
            public: AccessDeniedPublic {
                operation_type: operation.operation_type().to_string(),
                target: target.into(),
            },
            internal: AccessDeniedInternal {
                list_key: list_key.into(),
                operation,
                authenticated,
                item_id: None,
                field: None,
            },
        }
    }

    pub fn with_item(mut self, item_id: ItemId) -> Self {
        self.internal.item_id = Some(item_id);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.internal.field = Some(field.into());
        self
    }
}

/// Access evaluation errors
#[derive(Debug, Error)]
pub enum AccessError {
    #[error(transparent)]
    Denied(#[from] AccessDeniedError),

    /// A rule produced a result its operation cannot use
    #[error("invalid {operation} access rule on {list_key}: {reason}")]
    InvalidRule {
        list_key: String,
        operation: Operation,
        reason: String,
    },

    /// A computed rule failed
    #[error("access rule evaluation failed: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for access operations
pub type AccessOutcome<T> = std::result::Result<T, AccessError>;

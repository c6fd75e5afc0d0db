//! Error types for the execution engine

use listkit_access::{AccessDeniedError, AccessError};
use listkit_storage::StorageError;
use listkit_types::{FieldMap, Operation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::ConfigError;

/// One problem reported by a validation hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    /// Field that reported the problem; `None` for list-level hooks
    pub field: Option<String>,
    #[serde(default)]
    pub public_data: Value,
    #[serde(default)]
    pub internal_data: Value,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            public_data: Value::Null,
            internal_data: Value::Null,
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::new(message)
        }
    }

    pub fn with_public_data(mut self, data: Value) -> Self {
        self.public_data = data;
        self
    }

    pub fn with_internal_data(mut self, data: Value) -> Self {
        self.internal_data = data;
        self
    }
}

/// Log-only detail of a failed validation phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailureInternal {
    pub list_key: String,
    pub operation: Operation,
    /// `validateInput` or `validateDelete`
    pub phase: &'static str,
    pub errors: Vec<ValidationError>,
    pub original_input: FieldMap,
}

/// Every problem collected during one validation phase, raised once.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("You attempted to perform an invalid mutation")]
pub struct ValidationFailureError {
    /// Caller-visible messages, in collection order
    pub messages: Vec<String>,
    pub internal: ValidationFailureInternal,
}

impl ValidationFailureError {
    pub fn new(internal: ValidationFailureInternal) -> Self {
        Self {
            messages: internal.errors.iter().map(|e| e.message.clone()).collect(),
            internal,
        }
    }

    /// Each message with the data its hook marked safe to return.
    pub fn public_errors(&self) -> Vec<Value> {
        self.internal
            .errors
            .iter()
            .map(|e| json!({ "message": e.message, "data": e.public_data }))
            .collect()
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    AccessDenied(#[from] AccessDeniedError),

    #[error(transparent)]
    ValidationFailure(#[from] ValidationFailureError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An access rule could not be evaluated or returned an unusable result
    #[error("access rule failed: {0}")]
    AccessRule(String),

    #[error("unknown list: {0}")]
    UnknownList(String),

    #[error("invalid input for {list_key}: {reason}")]
    InvalidInput { list_key: String, reason: String },

    #[error("invalid list definition: {0}")]
    Definition(String),

    /// The write producing a referenced item failed
    #[error("{list_key} item was never created: {reason}")]
    DeferredRejected { list_key: String, reason: String },

    #[error("limit exceeded: {0}")]
    LimitsExceeded(String),

    /// A hook failed for a reason other than validation
    #[error("hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<AccessError> for EngineError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Denied(denied) => EngineError::AccessDenied(denied),
            AccessError::Storage(storage) => EngineError::Storage(storage),
            other => EngineError::AccessRule(other.to_string()),
        }
    }
}

impl EngineError {
    pub fn invalid_input(list_key: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            list_key: list_key.into(),
            reason: reason.into(),
        }
    }

    /// Error kind name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::AccessDenied(_) => "AccessDeniedError",
            EngineError::ValidationFailure(_) => "ValidationFailureError",
            EngineError::LimitsExceeded(_) => "LimitsExceededError",
            EngineError::InvalidInput { .. } => "InvalidInputError",
            EngineError::Storage(_) => "StorageError",
            _ => "InternalError",
        }
    }

    /// Caller-visible form. Internal detail stays out of it.
    pub fn to_public(&self) -> PublicError {
        let data = match self {
            EngineError::AccessDenied(denied) => {
                serde_json::to_value(&denied.public).unwrap_or_default()
            }
            EngineError::ValidationFailure(failure) => json!({
                "messages": failure.messages,
                "errors": failure.public_errors(),
            }),
            _ => Value::Null,
        };
        let message = match self {
            EngineError::AccessDenied(_)
            | EngineError::ValidationFailure(_)
            | EngineError::LimitsExceeded(_)
            | EngineError::InvalidInput { .. } => self.to_string(),
            _ => "Internal error".to_string(),
        };
        PublicError {
            kind: self.kind().to_string(),
            message,
            data,
        }
    }
}

/// Serializable error returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicError {
    pub kind: String,
    pub message: String,
    pub data: Value,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_lists_every_message() {
        let failure = ValidationFailureError::new(ValidationFailureInternal {
            list_key: "User".into(),
            operation: Operation::Create,
            phase: "validateInput",
            errors: vec![
                ValidationError::for_field("email", "email is malformed")
                    .with_public_data(json!({ "pattern": "local@domain" }))
                    .with_internal_data(json!({ "regex": "^[^@]+@[^@]+$" })),
                ValidationError::new("name and email must differ"),
            ],
            original_input: FieldMap::new(),
        });

        let public = EngineError::from(failure).to_public();
        assert_eq!(public.kind, "ValidationFailureError");
        assert_eq!(
            public.data,
            json!({
                "messages": ["email is malformed", "name and email must differ"],
                "errors": [
                    { "message": "email is malformed", "data": { "pattern": "local@domain" } },
                    { "message": "name and email must differ", "data": null },
                ],
            })
        );
        assert!(!public.data.to_string().contains("regex"));
    }

    #[test]
    fn access_denial_hides_internal_detail() {
        let denied = AccessDeniedError::new("Post", Operation::Delete, "deletePost", Some("User:u1".into()))
            .with_item("p1".into());
        let public = EngineError::from(AccessError::Denied(denied)).to_public();

        assert_eq!(public.message, "You do not have access to this resource");
        assert_eq!(
            public.data,
            json!({ "operation_type": "mutation", "target": "deletePost" })
        );
    }

    #[test]
    fn internal_errors_are_opaque() {
        let err = EngineError::Storage(StorageError::Backend("connection reset".into()));
        let public = err.to_public();
        assert_eq!(public.kind, "StorageError");
        assert_eq!(public.message, "Internal error");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// CRUD operation performed against a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Writes abort as a whole on any denied field; reads return partial results.
    pub fn is_write(&self) -> bool {
        !matches!(self, Operation::Read)
    }

    /// Transport-level operation type used in public error payloads.
    pub fn operation_type(&self) -> &'static str {
        if self.is_write() {
            "mutation"
        } else {
            "query"
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use serde::{Deserialize, Serialize};

use crate::filter::{Filter, IdConstraint};

/// Outcome of evaluating one access rule for one request.
///
/// Computed per request and never cached across requests: it may depend on
/// the caller's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessResult {
    /// Unconditional access.
    Allow,
    /// No access.
    Deny,
    /// Access limited to items matching the clause.
    FilterClause(Filter),
}

impl AccessResult {
    pub fn from_bool(allowed: bool) -> Self {
        if allowed {
            AccessResult::Allow
        } else {
            AccessResult::Deny
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AccessResult::Deny)
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            AccessResult::FilterClause(filter) => Some(filter),
            _ => None,
        }
    }

    /// Merge the access result into a storage where-clause.
    ///
    /// Returns `None` for `Deny`: no query may be issued at all.
    pub fn merge_into(&self, where_: Filter) -> Option<Filter> {
        match self {
            AccessResult::Allow => Some(where_),
            AccessResult::Deny => None,
            AccessResult::FilterClause(filter) => Some(filter.clone().and(where_)),
        }
    }

    /// Id restrictions carried by the result; `Allow` is unconstrained.
    pub fn id_constraint(&self) -> IdConstraint {
        match self {
            AccessResult::FilterClause(filter) => filter.id_constraint(),
            _ => IdConstraint::unconstrained(),
        }
    }
}

impl From<bool> for AccessResult {
    fn from(allowed: bool) -> Self {
        AccessResult::from_bool(allowed)
    }
}

impl From<Filter> for AccessResult {
    fn from(filter: Filter) -> Self {
        AccessResult::FilterClause(filter)
    }
}

//! Access control collaborators
//!
//! One [`AccessControl`] is attached to each request context. The declared
//! implementation evaluates rules afresh on every call: results are never
//! cached across requests because they depend on the caller.

use async_trait::async_trait;
use listkit_types::AccessResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AccessOutcome;
use crate::rule::{FieldAccess, FieldAccessArgs, ListAccess, ListAccessArgs};

/// Per-request access collaborator.
#[async_trait]
pub trait AccessControl: Send + Sync + std::fmt::Debug {
    /// List-level access for the caller and operation in `args`.
    async fn list_access_for_user(
        &self,
        rules: &ListAccess,
        args: ListAccessArgs,
    ) -> AccessOutcome<AccessResult>;

    /// Field-level access for one (item, field, operation).
    async fn field_access_for_user(
        &self,
        rules: &FieldAccess,
        args: FieldAccessArgs,
    ) -> AccessOutcome<bool>;

    /// Elevated collaborators bypass every check without evaluating rules.
    fn skips_access_control(&self) -> bool {
        false
    }
}

/// Rules applied when a list or field declares nothing for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDefaults {
    pub list: bool,
    pub field: bool,
}

impl Default for AccessDefaults {
    fn default() -> Self {
        Self {
            list: true,
            field: true,
        }
    }
}

/// Evaluates declared rules.
#[derive(Debug, Clone, Default)]
pub struct DeclaredAccessControl {
    defaults: AccessDefaults,
}

impl DeclaredAccessControl {
    pub fn new(defaults: AccessDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> AccessDefaults {
        self.defaults
    }
}

#[async_trait]
impl AccessControl for DeclaredAccessControl {
    async fn list_access_for_user(
        &self,
        rules: &ListAccess,
        args: ListAccessArgs,
    ) -> AccessOutcome<AccessResult> {
        let list_key = args.list_key.clone();
        let operation = args.operation;
        let result = match rules.rule(operation) {
            Some(rule) => rule.evaluate(args).await?,
            None => AccessResult::from_bool(self.defaults.list),
        };
        debug!(list = %list_key, operation = %operation, result = ?result, "List access evaluated");
        Ok(result)
    }

    async fn field_access_for_user(
        &self,
        rules: &FieldAccess,
        args: FieldAccessArgs,
    ) -> AccessOutcome<bool> {
        match rules.rule(args.operation) {
            Some(rule) => rule.evaluate(args).await,
            None => Ok(self.defaults.field),
        }
    }
}

/// Elevated access: every list and field check passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SudoAccessControl;

#[async_trait]
impl AccessControl for SudoAccessControl {
    async fn list_access_for_user(
        &self,
        _rules: &ListAccess,
        _args: ListAccessArgs,
    ) -> AccessOutcome<AccessResult> {
        Ok(AccessResult::Allow)
    }

    async fn field_access_for_user(
        &self,
        _rules: &FieldAccess,
        _args: FieldAccessArgs,
    ) -> AccessOutcome<bool> {
        Ok(true)
    }

    fn skips_access_control(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::AccessRule;
    use listkit_types::Operation;

    #[tokio::test]
    async fn undeclared_operations_use_defaults() {
        let control = DeclaredAccessControl::new(AccessDefaults {
            list: false,
            field: true,
        });
        let rules = ListAccess::new().read(AccessRule::Static(true));

        let read = control
            .list_access_for_user(&rules, ListAccessArgs::new("Post", Operation::Read, None))
            .await
            .unwrap();
        let delete = control
            .list_access_for_user(&rules, ListAccessArgs::new("Post", Operation::Delete, None))
            .await
            .unwrap();

        assert_eq!(read, AccessResult::Allow);
        assert_eq!(delete, AccessResult::Deny);
    }

    #[tokio::test]
    async fn sudo_ignores_rules() {
        let rules = ListAccess::all(false);
        let result = SudoAccessControl
            .list_access_for_user(&rules, ListAccessArgs::new("Post", Operation::Delete, None))
            .await
            .unwrap();
        assert_eq!(result, AccessResult::Allow);
        assert!(SudoAccessControl.skips_access_control());
    }
}

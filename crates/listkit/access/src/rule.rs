//! Declared access rules.
//!
//! A list declares one [`AccessRule`] per operation, a field one
//! [`FieldAccessRule`] per operation. Missing rules fall back to the defaults
//! of the evaluating [`crate::AccessControl`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use listkit_types::{AccessResult, AuthedItem, FieldMap, Filter, Item, ItemId, Operation};

use crate::error::{AccessError, AccessOutcome};

/// Input of a computed list-level rule.
#[derive(Debug, Clone)]
pub struct ListAccessArgs {
    pub authentication: Option<AuthedItem>,
    pub list_key: String,
    pub operation: Operation,
    pub original_input: Option<FieldMap>,
    /// Set for singular update/delete/read-by-id.
    pub item_id: Option<ItemId>,
    /// Set for batch update/delete.
    pub item_ids: Vec<ItemId>,
}

impl ListAccessArgs {
    pub fn new(
        list_key: impl Into<String>,
        operation: Operation,
        authentication: Option<AuthedItem>,
    ) -> Self {
        Self {
            authentication,
            list_key: list_key.into(),
            operation,
            original_input: None,
            item_id: None,
            item_ids: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: FieldMap) -> Self {
        self.original_input = Some(input);
        self
    }

    pub fn with_item_id(mut self, id: ItemId) -> Self {
        self.item_id = Some(id);
        self
    }

    pub fn with_item_ids(mut self, ids: Vec<ItemId>) -> Self {
        self.item_ids = ids;
        self
    }
}

/// Input of a computed field-level rule.
#[derive(Debug, Clone)]
pub struct FieldAccessArgs {
    pub authentication: Option<AuthedItem>,
    pub list_key: String,
    pub field_path: String,
    pub operation: Operation,
    /// Existing item; `None` on create.
    pub item: Option<Item>,
    pub original_input: Option<FieldMap>,
}

type ComputedListRule =
    Arc<dyn Fn(ListAccessArgs) -> BoxFuture<'static, AccessOutcome<AccessResult>> + Send + Sync>;
type ComputedFieldRule =
    Arc<dyn Fn(FieldAccessArgs) -> BoxFuture<'static, AccessOutcome<bool>> + Send + Sync>;

/// List-level rule for one operation.
#[derive(Clone)]
pub enum AccessRule {
    Static(bool),
    /// Items must additionally match the clause. Not valid for `create`.
    Declarative(Filter),
    Computed(ComputedListRule),
}

impl AccessRule {
    /// Rule computed asynchronously from the caller.
    pub fn computed<F, Fut>(rule: F) -> Self
    where
        F: Fn(ListAccessArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AccessOutcome<AccessResult>> + Send + 'static,
    {
        AccessRule::Computed(Arc::new(move |args| rule(args).boxed()))
    }

    /// Rule computed synchronously from the caller.
    pub fn computed_sync<F>(rule: F) -> Self
    where
        F: Fn(&ListAccessArgs) -> AccessOutcome<AccessResult> + Send + Sync + 'static,
    {
        AccessRule::Computed(Arc::new(move |args| {
            let result = rule(&args);
            async move { result }.boxed()
        }))
    }

    /// Evaluate the rule for one request.
    pub async fn evaluate(&self, args: ListAccessArgs) -> AccessOutcome<AccessResult> {
        let operation = args.operation;
        let list_key = args.list_key.clone();
        let result = match self {
            AccessRule::Static(allowed) => AccessResult::from_bool(*allowed),
            AccessRule::Declarative(filter) => AccessResult::FilterClause(filter.clone()),
            AccessRule::Computed(rule) => rule(args).await?,
        };

        if operation == Operation::Create && matches!(result, AccessResult::FilterClause(_)) {
            return Err(AccessError::InvalidRule {
                list_key,
                operation,
                reason: "create access must resolve to a boolean".to_string(),
            });
        }
        Ok(result)
    }
}

impl fmt::Debug for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRule::Static(allowed) => f.debug_tuple("Static").field(allowed).finish(),
            AccessRule::Declarative(filter) => f.debug_tuple("Declarative").field(filter).finish(),
            AccessRule::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<bool> for AccessRule {
    fn from(allowed: bool) -> Self {
        AccessRule::Static(allowed)
    }
}

impl From<Filter> for AccessRule {
    fn from(filter: Filter) -> Self {
        AccessRule::Declarative(filter)
    }
}

/// Field-level rule for one operation. Always resolves to a boolean.
#[derive(Clone)]
pub enum FieldAccessRule {
    Static(bool),
    Computed(ComputedFieldRule),
}

impl FieldAccessRule {
    pub fn computed<F, Fut>(rule: F) -> Self
    where
        F: Fn(FieldAccessArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AccessOutcome<bool>> + Send + 'static,
    {
        FieldAccessRule::Computed(Arc::new(move |args| rule(args).boxed()))
    }

    pub fn computed_sync<F>(rule: F) -> Self
    where
        F: Fn(&FieldAccessArgs) -> bool + Send + Sync + 'static,
    {
        FieldAccessRule::Computed(Arc::new(move |args| {
            let allowed = rule(&args);
            async move { Ok(allowed) }.boxed()
        }))
    }

    pub async fn evaluate(&self, args: FieldAccessArgs) -> AccessOutcome<bool> {
        match self {
            FieldAccessRule::Static(allowed) => Ok(*allowed),
            FieldAccessRule::Computed(rule) => rule(args).await,
        }
    }
}

impl fmt::Debug for FieldAccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldAccessRule::Static(allowed) => f.debug_tuple("Static").field(allowed).finish(),
            FieldAccessRule::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<bool> for FieldAccessRule {
    fn from(allowed: bool) -> Self {
        FieldAccessRule::Static(allowed)
    }
}

/// Per-operation list rules. `None` defers to the evaluator's default.
#[derive(Debug, Clone, Default)]
pub struct ListAccess {
    pub create: Option<AccessRule>,
    pub read: Option<AccessRule>,
    pub update: Option<AccessRule>,
    pub delete: Option<AccessRule>,
}

impl ListAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same static rule for every operation.
    pub fn all(allowed: bool) -> Self {
        Self {
            create: Some(AccessRule::Static(allowed)),
            read: Some(AccessRule::Static(allowed)),
            update: Some(AccessRule::Static(allowed)),
            delete: Some(AccessRule::Static(allowed)),
        }
    }

    pub fn create(mut self, rule: impl Into<AccessRule>) -> Self {
        self.create = Some(rule.into());
        self
    }

    pub fn read(mut self, rule: impl Into<AccessRule>) -> Self {
        self.read = Some(rule.into());
        self
    }

    pub fn update(mut self, rule: impl Into<AccessRule>) -> Self {
        self.update = Some(rule.into());
        self
    }

    pub fn delete(mut self, rule: impl Into<AccessRule>) -> Self {
        self.delete = Some(rule.into());
        self
    }

    pub fn rule(&self, operation: Operation) -> Option<&AccessRule> {
        match operation {
            Operation::Create => self.create.as_ref(),
            Operation::Read => self.read.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }

    /// Reject declarations that can never evaluate correctly.
    pub fn validate(&self, list_key: &str) -> AccessOutcome<()> {
        if matches!(self.create, Some(AccessRule::Declarative(_))) {
            return Err(AccessError::InvalidRule {
                list_key: list_key.to_string(),
                operation: Operation::Create,
                reason: "declarative filters cannot restrict create".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-operation field rules. Fields have no delete rule.
#[derive(Debug, Clone, Default)]
pub struct FieldAccess {
    pub create: Option<FieldAccessRule>,
    pub read: Option<FieldAccessRule>,
    pub update: Option<FieldAccessRule>,
}

impl FieldAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(allowed: bool) -> Self {
        Self {
            create: Some(FieldAccessRule::Static(allowed)),
            read: Some(FieldAccessRule::Static(allowed)),
            update: Some(FieldAccessRule::Static(allowed)),
        }
    }

    pub fn create(mut self, rule: impl Into<FieldAccessRule>) -> Self {
        self.create = Some(rule.into());
        self
    }

    pub fn read(mut self, rule: impl Into<FieldAccessRule>) -> Self {
        self.read = Some(rule.into());
        self
    }

    pub fn update(mut self, rule: impl Into<FieldAccessRule>) -> Self {
        self.update = Some(rule.into());
        self
    }

    pub fn rule(&self, operation: Operation) -> Option<&FieldAccessRule> {
        match operation {
            Operation::Create => self.create.as_ref(),
            Operation::Read => self.read.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_and_declarative_rules() {
        let args = ListAccessArgs::new("Post", Operation::Read, None);
        assert_eq!(
            AccessRule::Static(false).evaluate(args.clone()).await.unwrap(),
            AccessResult::Deny
        );
        assert_eq!(
            AccessRule::Declarative(Filter::equals("published", true))
                .evaluate(args)
                .await
                .unwrap(),
            AccessResult::FilterClause(Filter::equals("published", true))
        );
    }

    #[tokio::test]
    async fn computed_rule_sees_the_caller() {
        let rule = AccessRule::computed(|args: ListAccessArgs| async move {
            Ok(AccessResult::from_bool(args.authentication.is_some()))
        });
        let anonymous = ListAccessArgs::new("Post", Operation::Update, None);
        assert!(rule.evaluate(anonymous).await.unwrap().is_denied());
    }

    #[tokio::test]
    async fn create_rule_must_be_boolean() {
        let rule = AccessRule::computed_sync(|_| Ok(AccessResult::FilterClause(Filter::All)));
        let args = ListAccessArgs::new("Post", Operation::Create, None);
        let err = rule.evaluate(args).await.unwrap_err();
        assert!(matches!(err, AccessError::InvalidRule { .. }));

        let access = ListAccess::new().create(Filter::All);
        assert!(access.validate("Post").is_err());
    }

    #[tokio::test]
    async fn field_rules_resolve_to_booleans() {
        let rule = FieldAccessRule::computed_sync(|args| args.item.is_none());
        let args = FieldAccessArgs {
            authentication: None,
            list_key: "User".into(),
            field_path: "email".into(),
            operation: Operation::Create,
            item: None,
            original_input: None,
        };
        assert!(rule.evaluate(args).await.unwrap());
        assert!(FieldAccess::all(true).rule(Operation::Delete).is_none());
    }
}

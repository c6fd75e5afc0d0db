//! List and field definitions.
//!
//! A [`ListDefinition`] is static configuration: its fields (in declaration
//! order), access rules and hooks. Field capabilities are explicit attributes
//! of [`FieldDefinition`] rather than inferred from the field type.

use std::fmt;
use std::sync::Arc;

use listkit_access::{FieldAccess, ListAccess};
use listkit_types::{Operation, Value};

use crate::context::RequestContext;
use crate::hooks::{FieldHooks, ListHooks};

/// Target of a relationship field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipSpec {
    pub target_list: String,
    pub many: bool,
    /// Field on the target list that mirrors this one
    pub inverse_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar { type_name: String },
    Relationship(RelationshipSpec),
}

type ComputedDefault = Arc<dyn Fn(&RequestContext) -> Value + Send + Sync>;

/// Value used for a field omitted from create input.
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Computed(ComputedDefault),
}

impl DefaultValue {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> Value + Send + Sync + 'static,
    {
        DefaultValue::Computed(Arc::new(f))
    }

    pub fn value(&self, context: &RequestContext) -> Value {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Computed(f) => f(context),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        DefaultValue::Static(value)
    }
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub path: String,
    pub kind: FieldKind,
    pub access: FieldAccess,
    pub is_required: bool,
    pub default_value: Option<DefaultValue>,
    /// Hooks contributed by the field type
    pub builtin_hooks: FieldHooks,
    /// Hooks declared by the list author
    pub hooks: FieldHooks,
}

impl FieldDefinition {
    pub fn scalar(path: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::with_kind(
            path,
            FieldKind::Scalar {
                type_name: type_name.into(),
            },
        )
    }

    pub fn text(path: impl Into<String>) -> Self {
        Self::scalar(path, "Text")
    }

    /// To-one relationship to `target_list`.
    pub fn relationship(path: impl Into<String>, target_list: impl Into<String>) -> Self {
        Self::with_kind(
            path,
            FieldKind::Relationship(RelationshipSpec {
                target_list: target_list.into(),
                many: false,
                inverse_field: None,
            }),
        )
    }

    /// To-many relationship to `target_list`.
    pub fn relationship_many(path: impl Into<String>, target_list: impl Into<String>) -> Self {
        Self::with_kind(
            path,
            FieldKind::Relationship(RelationshipSpec {
                target_list: target_list.into(),
                many: true,
                inverse_field: None,
            }),
        )
    }

    fn with_kind(path: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            path: path.into(),
            kind,
            access: FieldAccess::default(),
            is_required: false,
            default_value: None,
            builtin_hooks: FieldHooks::default(),
            hooks: FieldHooks::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Mirror this relationship on `field` of the target list. No effect on
    /// scalar fields.
    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        if let FieldKind::Relationship(spec) = &mut self.kind {
            spec.inverse_field = Some(field.into());
        }
        self
    }

    pub fn access(mut self, access: FieldAccess) -> Self {
        self.access = access;
        self
    }

    pub fn default_value(mut self, default: impl Into<DefaultValue>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    pub fn builtin_hooks(mut self, hooks: FieldHooks) -> Self {
        self.builtin_hooks = hooks;
        self
    }

    pub fn hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn relationship_spec(&self) -> Option<&RelationshipSpec> {
        match &self.kind {
            FieldKind::Relationship(spec) => Some(spec),
            FieldKind::Scalar { .. } => None,
        }
    }

    pub fn is_relationship(&self) -> bool {
        self.relationship_spec().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ListDefinition {
    pub key: String,
    /// Declaration order is hook order
    pub fields: Vec<FieldDefinition>,
    pub access: ListAccess,
    pub hooks: ListHooks,
    /// Per-list bound on query results, stricter than the engine-wide one
    pub max_results: Option<usize>,
}

impl ListDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Vec::new(),
            access: ListAccess::default(),
            hooks: ListHooks::default(),
            max_results: None,
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn access(mut self, access: ListAccess) -> Self {
        self.access = access;
        self
    }

    pub fn hooks(mut self, hooks: ListHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn get_field(&self, path: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.path == path)
    }

    pub fn relationship_fields(&self) -> impl Iterator<Item = (&FieldDefinition, &RelationshipSpec)> {
        self.fields
            .iter()
            .filter_map(|f| f.relationship_spec().map(|spec| (f, spec)))
    }

    /// Transport-level name of an operation, used in access denials.
    ///
    /// `createPost`, `updatePosts`, `allPosts`, `Post`, ...
    pub fn target(&self, operation: Operation, many: bool) -> String {
        let plural = if many { "s" } else { "" };
        match operation {
            Operation::Read if many => format!("all{}s", self.key),
            Operation::Read => self.key.clone(),
            other => format!("{}{}{}", other.as_str(), self.key, plural),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_set_capabilities() {
        let list = ListDefinition::new("Post")
            .field(FieldDefinition::text("title").required())
            .field(FieldDefinition::relationship("author", "User").inverse("posts"))
            .field(FieldDefinition::text("status").default_value(Value::from("draft")));

        let title = list.get_field("title").unwrap();
        assert!(title.is_required);
        assert!(!title.is_relationship());

        let (author, spec) = list.relationship_fields().next().unwrap();
        assert_eq!(author.path, "author");
        assert_eq!(spec.inverse_field.as_deref(), Some("posts"));
        assert!(!spec.many);

        assert!(list.get_field("status").unwrap().default_value.is_some());
        assert!(list.get_field("missing").is_none());
    }

    #[test]
    fn inverse_is_ignored_on_scalars() {
        let field = FieldDefinition::text("title").inverse("posts");
        assert!(field.relationship_spec().is_none());
    }

    #[test]
    fn targets_follow_operation_naming() {
        let list = ListDefinition::new("Post");
        assert_eq!(list.target(Operation::Create, false), "createPost");
        assert_eq!(list.target(Operation::Update, true), "updatePosts");
        assert_eq!(list.target(Operation::Delete, false), "deletePost");
        assert_eq!(list.target(Operation::Read, true), "allPosts");
        assert_eq!(list.target(Operation::Read, false), "Post");
    }
}

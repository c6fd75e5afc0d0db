//! Lifecycle hooks.
//!
//! Hooks are declared per list ([`ListHooks`]) and per field ([`FieldHooks`]).
//! A field carries two sets: the built-in hooks of its field type and the
//! hooks the list author declared. All hooks are async closures over an owned
//! [`HookArgs`].

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use listkit_types::{AuthedItem, FieldMap, Item, Operation, Value};

use crate::context::Actions;
use crate::error::{EngineResult, ValidationError};

/// Lifecycle phase a hook runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    ResolveInput,
    ValidateInput,
    ValidateDelete,
    BeforeChange,
    BeforeDelete,
    AfterChange,
    AfterDelete,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::ResolveInput => "resolveInput",
            HookPhase::ValidateInput => "validateInput",
            HookPhase::ValidateDelete => "validateDelete",
            HookPhase::BeforeChange => "beforeChange",
            HookPhase::BeforeDelete => "beforeDelete",
            HookPhase::AfterChange => "afterChange",
            HookPhase::AfterDelete => "afterDelete",
        }
    }

    /// Validation phases report through the collector instead of failing fast.
    pub fn is_validation(&self) -> bool {
        matches!(self, HookPhase::ValidateInput | HookPhase::ValidateDelete)
    }

    /// Delete phases involve every field of the list.
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            HookPhase::ValidateDelete | HookPhase::BeforeDelete | HookPhase::AfterDelete
        )
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error sink handed to validation hooks.
///
/// Clones share one buffer. A collector scoped to a field tags every error
/// added through it with that field's path.
#[derive(Clone, Default)]
pub struct ValidationCollector {
    field: Option<String>,
    errors: Arc<Mutex<Vec<ValidationError>>>,
}

impl ValidationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh collector for one field.
    pub fn for_field(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            errors: Arc::default(),
        }
    }

    pub fn add_error(&self, message: impl Into<String>) {
        let error = match &self.field {
            Some(field) => ValidationError::for_field(field.clone(), message),
            None => ValidationError::new(message),
        };
        self.add(error);
    }

    pub fn add(&self, mut error: ValidationError) {
        if error.field.is_none() {
            error.field = self.field.clone();
        }
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error);
        }
    }

    pub fn len(&self) -> usize {
        self.errors.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<ValidationError> {
        self.errors
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl fmt::Debug for ValidationCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationCollector")
            .field("field", &self.field)
            .field("errors", &self.len())
            .finish()
    }
}

/// Arguments every hook receives.
#[derive(Debug, Clone)]
pub struct HookArgs {
    pub list_key: String,
    /// Set for field-level hooks
    pub field_path: Option<String>,
    pub operation: Operation,
    pub phase: HookPhase,
    /// Input after defaults, relationship resolution and earlier hooks
    pub resolved_data: FieldMap,
    /// Stored item before the write; `None` on create
    pub existing_item: Option<Item>,
    /// Input exactly as the caller sent it
    pub original_input: FieldMap,
    /// Stored item after the write; set in after-phases of create/update
    pub updated_item: Option<Item>,
    pub errors: ValidationCollector,
    pub actions: Actions,
}

impl HookArgs {
    pub fn authentication(&self) -> Option<&AuthedItem> {
        self.actions.context().authentication()
    }

    /// Value of the hooked field in the resolved data.
    pub fn field_value(&self) -> Option<&Value> {
        self.field_path
            .as_deref()
            .and_then(|path| self.resolved_data.get(path))
    }

    pub(crate) fn for_field(&self, path: &str, errors: ValidationCollector) -> Self {
        Self {
            field_path: Some(path.to_string()),
            errors,
            ..self.clone()
        }
    }
}

type HookFn<T> = Arc<dyn Fn(HookArgs) -> BoxFuture<'static, EngineResult<T>> + Send + Sync>;

/// An async hook producing `T`.
pub struct Hook<T> {
    f: HookFn<T>,
}

impl<T: Send + 'static> Hook<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EngineResult<T>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |args| f(args).boxed()),
        }
    }

    /// A hook doing synchronous work only.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&HookArgs) -> EngineResult<T> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |args| {
                let result = f(&args);
                async move { result }.boxed()
            }),
        }
    }

    pub fn call(&self, args: HookArgs) -> BoxFuture<'static, EngineResult<T>> {
        (self.f)(args)
    }
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<T> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Hooks attached to one field.
///
/// A field-level `resolve_input` returns the new value of its field.
#[derive(Debug, Clone, Default)]
pub struct FieldHooks {
    pub resolve_input: Option<Hook<Value>>,
    pub validate_input: Option<Hook<()>>,
    pub validate_delete: Option<Hook<()>>,
    pub before_change: Option<Hook<()>>,
    pub before_delete: Option<Hook<()>>,
    pub after_change: Option<Hook<()>>,
    pub after_delete: Option<Hook<()>>,
}

impl FieldHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_input(mut self, hook: Hook<Value>) -> Self {
        self.resolve_input = Some(hook);
        self
    }

    pub fn validate_input(mut self, hook: Hook<()>) -> Self {
        self.validate_input = Some(hook);
        self
    }

    pub fn validate_delete(mut self, hook: Hook<()>) -> Self {
        self.validate_delete = Some(hook);
        self
    }

    pub fn before_change(mut self, hook: Hook<()>) -> Self {
        self.before_change = Some(hook);
        self
    }

    pub fn before_delete(mut self, hook: Hook<()>) -> Self {
        self.before_delete = Some(hook);
        self
    }

    pub fn after_change(mut self, hook: Hook<()>) -> Self {
        self.after_change = Some(hook);
        self
    }

    pub fn after_delete(mut self, hook: Hook<()>) -> Self {
        self.after_delete = Some(hook);
        self
    }

    /// Hook for any phase other than `ResolveInput`.
    pub fn hook(&self, phase: HookPhase) -> Option<&Hook<()>> {
        match phase {
            HookPhase::ResolveInput => None,
            HookPhase::ValidateInput => self.validate_input.as_ref(),
            HookPhase::ValidateDelete => self.validate_delete.as_ref(),
            HookPhase::BeforeChange => self.before_change.as_ref(),
            HookPhase::BeforeDelete => self.before_delete.as_ref(),
            HookPhase::AfterChange => self.after_change.as_ref(),
            HookPhase::AfterDelete => self.after_delete.as_ref(),
        }
    }
}

/// Hooks attached to a list.
///
/// A list-level `resolve_input` returns field values merged over the resolved
/// data.
#[derive(Debug, Clone, Default)]
pub struct ListHooks {
    pub resolve_input: Option<Hook<FieldMap>>,
    pub validate_input: Option<Hook<()>>,
    pub validate_delete: Option<Hook<()>>,
    pub before_change: Option<Hook<()>>,
    pub before_delete: Option<Hook<()>>,
    pub after_change: Option<Hook<()>>,
    pub after_delete: Option<Hook<()>>,
}

impl ListHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_input(mut self, hook: Hook<FieldMap>) -> Self {
        self.resolve_input = Some(hook);
        self
    }

    pub fn validate_input(mut self, hook: Hook<()>) -> Self {
        self.validate_input = Some(hook);
        self
    }

    pub fn validate_delete(mut self, hook: Hook<()>) -> Self {
        self.validate_delete = Some(hook);
        self
    }

    pub fn before_change(mut self, hook: Hook<()>) -> Self {
        self.before_change = Some(hook);
        self
    }

    pub fn before_delete(mut self, hook: Hook<()>) -> Self {
        self.before_delete = Some(hook);
        self
    }

    pub fn after_change(mut self, hook: Hook<()>) -> Self {
        self.after_change = Some(hook);
        self
    }

    pub fn after_delete(mut self, hook: Hook<()>) -> Self {
        self.after_delete = Some(hook);
        self
    }

    pub fn hook(&self, phase: HookPhase) -> Option<&Hook<()>> {
        match phase {
            HookPhase::ResolveInput => None,
            HookPhase::ValidateInput => self.validate_input.as_ref(),
            HookPhase::ValidateDelete => self.validate_delete.as_ref(),
            HookPhase::BeforeChange => self.before_change.as_ref(),
            HookPhase::BeforeDelete => self.before_delete.as_ref(),
            HookPhase::AfterChange => self.after_change.as_ref(),
            HookPhase::AfterDelete => self.after_delete.as_ref(),
        }
    }
}

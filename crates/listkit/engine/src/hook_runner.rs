//! Runs one lifecycle phase across a list's fields and the list itself.
//!
//! Each phase runs in three steps:
//!
//! 1. built-in hooks of every participating field, concurrently
//! 2. declared hooks of every participating field, concurrently
//! 3. the list-level hook
//!
//! A field participates when its path is present in the resolved data. On
//! create, required fields participate in `validateInput` even when absent.
//! Delete phases involve every field.
//!
//! Validation phases collect problems from every step and raise them once as
//! a single [`ValidationFailureError`]. Other phases return the first failing
//! hook's error once its step has settled.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use listkit_types::{FieldMap, Operation, Value};
use tracing::{debug, info};

use crate::engine::RegisteredList;
use crate::error::{
    EngineResult, ValidationError, ValidationFailureError, ValidationFailureInternal,
};
use crate::hooks::{FieldHooks, HookArgs, HookPhase, ValidationCollector};
use crate::list::FieldDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Builtin,
    Declared,
}

impl Layer {
    fn hooks(self, field: &FieldDefinition) -> &FieldHooks {
        match self {
            Layer::Builtin => &field.builtin_hooks,
            Layer::Declared => &field.hooks,
        }
    }
}

/// Message of the built-in required-field check.
pub fn required_message(path: &str) -> String {
    format!("Required field \"{path}\" is null or undefined.")
}

#[derive(Debug, Clone)]
pub struct HookRunner {
    list: Arc<RegisteredList>,
}

impl HookRunner {
    pub fn new(list: Arc<RegisteredList>) -> Self {
        Self { list }
    }

    fn participants(&self, phase: HookPhase, args: &HookArgs) -> Vec<&FieldDefinition> {
        self.list
            .definition
            .fields
            .iter()
            .filter(|field| {
                phase.is_delete()
                    || args.resolved_data.contains_key(&field.path)
                    || (phase == HookPhase::ValidateInput
                        && args.operation == Operation::Create
                        && field.is_required)
            })
            .collect()
    }

    /// Run `resolveInput` and return the final resolved data.
    ///
    /// Field hooks replace their own field's value; the list hook's output is
    /// merged over the result.
    pub async fn resolve_input(&self, args: HookArgs) -> EngineResult<FieldMap> {
        let args = HookArgs {
            phase: HookPhase::ResolveInput,
            ..args
        };
        let paths: Vec<String> = self
            .participants(HookPhase::ResolveInput, &args)
            .iter()
            .map(|f| f.path.clone())
            .collect();
        let mut data = args.resolved_data.clone();

        for layer in [Layer::Builtin, Layer::Declared] {
            let step = HookArgs {
                resolved_data: data.clone(),
                ..args.clone()
            };
            let (targets, calls): (Vec<String>, Vec<_>) = paths
                .iter()
                .filter_map(|path| {
                    let field = self.list.definition.get_field(path)?;
                    let hook = layer.hooks(field).resolve_input.as_ref()?;
                    let call = hook.call(step.for_field(path, ValidationCollector::for_field(path)));
                    Some((path.clone(), call))
                })
                .unzip();

            let results: Vec<EngineResult<Value>> = join_all(calls).await;
            for (path, result) in targets.into_iter().zip(results) {
                data.insert(path, result?);
            }
        }

        if let Some(hook) = &self.list.definition.hooks.resolve_input {
            let output = hook
                .call(HookArgs {
                    resolved_data: data.clone(),
                    ..args
                })
                .await?;
            data.extend(output);
        }
        Ok(data)
    }

    pub async fn validate_input(&self, args: HookArgs) -> EngineResult<()> {
        self.run(HookPhase::ValidateInput, args).await
    }

    pub async fn validate_delete(&self, args: HookArgs) -> EngineResult<()> {
        self.run(HookPhase::ValidateDelete, args).await
    }

    pub async fn before_change(&self, args: HookArgs) -> EngineResult<()> {
        self.run(HookPhase::BeforeChange, args).await
    }

    pub async fn before_delete(&self, args: HookArgs) -> EngineResult<()> {
        self.run(HookPhase::BeforeDelete, args).await
    }

    pub async fn after_change(&self, args: HookArgs) -> EngineResult<()> {
        self.run(HookPhase::AfterChange, args).await
    }

    pub async fn after_delete(&self, args: HookArgs) -> EngineResult<()> {
        self.run(HookPhase::AfterDelete, args).await
    }

    async fn run(&self, phase: HookPhase, args: HookArgs) -> EngineResult<()> {
        let args = HookArgs { phase, ..args };
        let participants = self.participants(phase, &args);
        debug!(
            list = %self.list.key(),
            phase = %phase,
            participants = participants.len(),
            "Running hooks"
        );

        let mut errors = Vec::new();
        for layer in [Layer::Builtin, Layer::Declared] {
            errors.extend(self.run_fields(layer, phase, &participants, &args).await?);
        }

        if let Some(hook) = self.list.definition.hooks.hook(phase) {
            let collector = ValidationCollector::new();
            hook.call(HookArgs {
                field_path: None,
                errors: collector.clone(),
                ..args.clone()
            })
            .await?;
            errors.extend(collector.take());
        }

        if errors.is_empty() {
            return Ok(());
        }
        info!(
            list = %self.list.key(),
            phase = %phase,
            errors = errors.len(),
            "Validation failed"
        );
        for error in &errors {
            debug!(field = ?error.field, message = %error.message, "Validation error");
        }
        Err(ValidationFailureError::new(ValidationFailureInternal {
            list_key: self.list.key().to_string(),
            operation: args.operation,
            phase: phase.as_str(),
            errors,
            original_input: args.original_input,
        })
        .into())
    }

    /// One field step. Errors come back in field declaration order.
    async fn run_fields(
        &self,
        layer: Layer,
        phase: HookPhase,
        participants: &[&FieldDefinition],
        args: &HookArgs,
    ) -> EngineResult<Vec<ValidationError>> {
        let mut collectors = Vec::new();
        let mut calls: Vec<BoxFuture<'static, EngineResult<()>>> = Vec::new();

        for field in participants {
            let check_required =
                layer == Layer::Builtin && phase == HookPhase::ValidateInput && field.is_required;
            let hook = layer.hooks(field).hook(phase);
            if hook.is_none() && !check_required {
                continue;
            }

            let collector = ValidationCollector::for_field(&field.path);
            if check_required && is_missing(args.resolved_data.get(&field.path)) {
                collector.add_error(required_message(&field.path));
            }
            calls.push(match hook {
                Some(hook) => hook.call(args.for_field(&field.path, collector.clone())),
                None => futures::future::ready(Ok(())).boxed(),
            });
            collectors.push(collector);
        }

        for result in join_all(calls).await {
            result?;
        }
        Ok(collectors.iter().flat_map(ValidationCollector::take).collect())
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::context::Actions;
    use crate::engine::Engine;
    use crate::error::EngineError;
    use crate::hooks::{Hook, ListHooks};
    use crate::list::ListDefinition;
    use listkit_storage::InMemoryListAdapter;
    use serde_json::json;
    use std::sync::Mutex;

    fn runner(definition: ListDefinition) -> (HookRunner, Actions) {
        let engine = Engine::builder(EngineConfig::default())
            .list(definition, Arc::new(InMemoryListAdapter::new("User")))
            .build()
            .unwrap();
        let actions = Actions::new(engine.clone(), engine.sudo_context());
        (HookRunner::new(engine.list("User").unwrap()), actions)
    }

    fn args(actions: Actions, operation: Operation, data: serde_json::Value) -> HookArgs {
        let data = data.as_object().cloned().unwrap_or_default();
        HookArgs {
            list_key: "User".into(),
            field_path: None,
            operation,
            phase: HookPhase::ValidateInput,
            resolved_data: data.clone(),
            existing_item: None,
            original_input: data,
            updated_item: None,
            errors: ValidationCollector::new(),
            actions,
        }
    }

    fn reject(message: &'static str) -> Hook<()> {
        Hook::sync(move |args| {
            args.errors.add_error(message);
            Ok(())
        })
    }

    #[tokio::test]
    async fn validation_errors_are_aggregated_in_step_order() {
        let definition = ListDefinition::new("User")
            .field(
                FieldDefinition::text("name")
                    .builtin_hooks(FieldHooks::new().validate_input(reject("name builtin")))
                    .hooks(FieldHooks::new().validate_input(reject("name declared"))),
            )
            .field(FieldDefinition::text("email").hooks(FieldHooks::new().validate_input(reject("email declared"))))
            .hooks(ListHooks::new().validate_input(reject("list")));
        let (runner, actions) = runner(definition);

        let err = runner
            .validate_input(args(actions, Operation::Create, json!({ "name": "a", "email": "b" })))
            .await
            .unwrap_err();
        let EngineError::ValidationFailure(failure) = err else {
            panic!("expected a validation failure");
        };
        assert_eq!(
            failure.messages,
            vec!["name builtin", "name declared", "email declared", "list"]
        );
        assert_eq!(failure.internal.errors[2].field.as_deref(), Some("email"));
        assert_eq!(failure.internal.errors[3].field, None);
    }

    #[tokio::test]
    async fn required_fields_participate_on_create_only() {
        let definition = ListDefinition::new("User")
            .field(FieldDefinition::text("name").required())
            .field(FieldDefinition::text("bio"));
        let (runner, actions) = runner(definition);

        let err = runner
            .validate_input(args(actions.clone(), Operation::Create, json!({ "bio": "x" })))
            .await
            .unwrap_err();
        let EngineError::ValidationFailure(failure) = err else {
            panic!("expected a validation failure");
        };
        assert_eq!(failure.messages, vec![required_message("name")]);

        runner
            .validate_input(args(actions.clone(), Operation::Update, json!({ "bio": "y" })))
            .await
            .unwrap();
        assert!(runner
            .validate_input(args(actions, Operation::Update, json!({ "name": null })))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn resolve_input_layers_and_merges() {
        let definition = ListDefinition::new("User")
            .field(
                FieldDefinition::text("name")
                    .builtin_hooks(FieldHooks::new().resolve_input(Hook::sync(|args| {
                        Ok(Value::from(
                            args.field_value().and_then(Value::as_str).unwrap_or("").trim().to_string(),
                        ))
                    })))
                    .hooks(FieldHooks::new().resolve_input(Hook::sync(|args| {
                        Ok(Value::from(
                            args.field_value().and_then(Value::as_str).unwrap_or("").to_uppercase(),
                        ))
                    }))),
            )
            .field(FieldDefinition::text("slug"))
            .hooks(ListHooks::new().resolve_input(Hook::sync(|args| {
                let mut out = FieldMap::new();
                out.insert("slug".into(), args.resolved_data["name"].clone());
                Ok(out)
            })));
        let (runner, actions) = runner(definition);

        let data = runner
            .resolve_input(args(actions, Operation::Create, json!({ "name": "  ada " })))
            .await
            .unwrap();
        assert_eq!(data["name"], json!("ADA"));
        assert_eq!(data["slug"], json!("ADA"));
    }

    #[tokio::test]
    async fn absent_fields_do_not_participate() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let calls = calls.clone();
            Hook::sync(move |_| {
                calls.lock().unwrap().push(name);
                Ok(())
            })
        };
        let definition = ListDefinition::new("User")
            .field(FieldDefinition::text("name").hooks(FieldHooks::new().before_change(record("name"))))
            .field(FieldDefinition::text("bio").hooks(FieldHooks::new().before_change(record("bio"))))
            .hooks(ListHooks::new().before_change(record("list")));
        let (runner, actions) = runner(definition);

        runner
            .before_change(args(actions, Operation::Update, json!({ "bio": "x" })))
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["bio", "list"]);
    }

    #[tokio::test]
    async fn delete_phases_involve_every_field() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let count = Hook::sync(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        let definition = ListDefinition::new("User")
            .field(FieldDefinition::text("name").hooks(FieldHooks::new().before_delete(count.clone())))
            .field(FieldDefinition::text("bio").hooks(FieldHooks::new().before_delete(count)));
        let (runner, actions) = runner(definition);

        runner
            .before_delete(args(actions, Operation::Delete, json!({})))
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}

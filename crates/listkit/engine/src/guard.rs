//! List- and field-level access checks shared by mutations and queries.

use futures::future::try_join_all;
use listkit_access::{AccessDeniedError, FieldAccessArgs, ListAccessArgs};
use listkit_types::{AccessResult, FieldMap, Item, Operation};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::engine::RegisteredList;
use crate::error::{EngineError, EngineResult};

/// Denial for `operation` on `list`, carrying the caller's identity.
pub(crate) fn denial(
    list: &RegisteredList,
    context: &RequestContext,
    operation: Operation,
    many: bool,
) -> AccessDeniedError {
    AccessDeniedError::new(
        list.key(),
        operation,
        list.definition.target(operation, many),
        context.identity(),
    )
}

/// Evaluate list-level access. `Deny` becomes an error; create access must be
/// a plain allow.
pub(crate) async fn list_access(
    list: &RegisteredList,
    context: &RequestContext,
    args: ListAccessArgs,
    many: bool,
) -> EngineResult<AccessResult> {
    let operation = args.operation;
    let result = context
        .access()
        .list_access_for_user(&list.definition.access, args)
        .await?;

    match result {
        AccessResult::Deny => {
            warn!(
                list = %list.key(),
                operation = %operation,
                caller = ?context.identity(),
                "List access denied"
            );
            Err(denial(list, context, operation, many).into())
        }
        AccessResult::FilterClause(_) if operation == Operation::Create => Err(
            EngineError::AccessRule(format!("{} create access must resolve to a boolean", list.key())),
        ),
        result => Ok(result),
    }
}

/// Reject input keys that are not declared fields of `list`.
pub(crate) fn check_known_fields(list: &RegisteredList, data: &FieldMap) -> EngineResult<()> {
    match data.keys().find(|path| list.definition.get_field(path).is_none()) {
        Some(path) => Err(EngineError::invalid_input(
            list.key(),
            format!("unknown field {path}"),
        )),
        None => Ok(()),
    }
}

/// Field-level write access for every (item, field) a write touches.
///
/// Any denied field aborts the whole write.
pub(crate) async fn field_write_access(
    list: &RegisteredList,
    context: &RequestContext,
    operation: Operation,
    writes: &[(Option<&Item>, &FieldMap)],
    many: bool,
) -> EngineResult<()> {
    for (_, data) in writes {
        check_known_fields(list, data)?;
    }
    if context.is_sudo() {
        return Ok(());
    }

    let checks = writes.iter().flat_map(|(item, data)| {
        data.keys().filter_map(move |path| {
            let field = list.definition.get_field(path)?;
            let args = FieldAccessArgs {
                authentication: context.authentication().cloned(),
                list_key: list.key().to_string(),
                field_path: path.clone(),
                operation,
                item: item.cloned(),
                original_input: Some((*data).clone()),
            };
            Some(async move {
                let allowed = context.access().field_access_for_user(&field.access, args).await?;
                Ok::<_, EngineError>((allowed, field.path.as_str(), item.map(|i| i.id.clone())))
            })
        })
    });

    let results = try_join_all(checks).await?;
    if let Some((_, path, item_id)) = results.into_iter().find(|(allowed, _, _)| !allowed) {
        warn!(list = %list.key(), field = %path, operation = %operation, "Field access denied");
        let mut denied = denial(list, context, operation, many).with_field(path);
        if let Some(id) = item_id {
            denied = denied.with_item(id);
        }
        return Err(denied.into());
    }
    Ok(())
}

/// Declared fields of `item` the caller may not read.
pub(crate) async fn field_read_denials(
    list: &RegisteredList,
    context: &RequestContext,
    item: &Item,
) -> EngineResult<Vec<String>> {
    if context.is_sudo() {
        return Ok(Vec::new());
    }

    let checks = list.definition.fields.iter().map(|field| {
        let args = FieldAccessArgs {
            authentication: context.authentication().cloned(),
            list_key: list.key().to_string(),
            field_path: field.path.clone(),
            operation: Operation::Read,
            item: Some(item.clone()),
            original_input: None,
        };
        async move {
            let allowed = context.access().field_access_for_user(&field.access, args).await?;
            Ok::<_, EngineError>((!allowed).then(|| field.path.clone()))
        }
    });

    let denied: Vec<String> = try_join_all(checks).await?.into_iter().flatten().collect();
    if !denied.is_empty() {
        debug!(list = %list.key(), item_id = %item.id, fields = ?denied, "Field reads denied");
    }
    Ok(denied)
}

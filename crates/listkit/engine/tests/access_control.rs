//! List- and field-level access through the public entry points.

mod common;

use common::{caller, id, map, Blog};
use listkit_access::{AccessRule, FieldAccess, ListAccess};
use listkit_engine::{EngineConfig, EngineError, FieldDefinition};
use listkit_storage::AdapterCall;
use listkit_types::{AccessResult, Filter, QueryArgs, Value};
use serde_json::json;

fn owner_filtered_posts() -> listkit_engine::ListDefinition {
    Blog::post_list().access(
        ListAccess::new()
            .update(AccessRule::computed_sync(|args| {
                Ok(match &args.authentication {
                    Some(user) => AccessResult::FilterClause(Filter::equals("owner", user.item.id.to_string())),
                    None => AccessResult::Deny,
                })
            }))
            .delete(AccessRule::computed_sync(|args| {
                Ok(match &args.authentication {
                    Some(user) => AccessResult::FilterClause(Filter::equals("owner", user.item.id.to_string())),
                    None => AccessResult::Deny,
                })
            })),
    )
}

#[tokio::test]
async fn static_deny_fails_before_any_storage_call() {
    let blog = Blog::new();
    let engine = blog.engine(
        Blog::user_list(),
        Blog::post_list().access(ListAccess::new().create(false)),
    );

    let err = engine
        .create_item("Post", map(json!({ "title": "Hello" })), &engine.context(None))
        .await
        .unwrap_err();

    let EngineError::AccessDenied(denied) = &err else {
        panic!("expected access denied, got {err:?}");
    };
    assert_eq!(denied.public.target, "createPost");
    assert_eq!(denied.public.operation_type, "mutation");
    assert!(blog.posts.calls().is_empty());
    assert!(blog.users.calls().is_empty());
}

#[tokio::test]
async fn missing_and_filtered_ids_fail_identically() {
    let blog = Blog::new();
    blog.seed_post("p1", json!({ "title": "mine", "owner": "u1" })).await;
    blog.seed_post("p2", json!({ "title": "theirs", "owner": "u2" })).await;
    let engine = blog.engine(Blog::user_list(), owner_filtered_posts());
    let ctx = caller(&engine, "u1");

    let hidden = engine
        .update_item("Post", &id("p2"), map(json!({ "title": "x" })), &ctx)
        .await
        .unwrap_err();
    let missing = engine
        .update_item("Post", &id("p404"), map(json!({ "title": "x" })), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(hidden, EngineError::AccessDenied(_)));
    assert_eq!(hidden.to_public(), missing.to_public());

    let hidden = engine.delete_item("Post", &id("p2"), &ctx).await.unwrap_err();
    let missing = engine.delete_item("Post", &id("p404"), &ctx).await.unwrap_err();
    assert!(matches!(hidden, EngineError::AccessDenied(_)));
    assert_eq!(hidden.to_public(), missing.to_public());

    assert!(blog.posts.write_calls().is_empty());
    assert_eq!(blog.posts.peek(&id("p2")).await.unwrap().get("title"), Some(json!("theirs")));
}

#[tokio::test]
async fn filtered_update_of_reachable_item_succeeds() {
    let blog = Blog::new();
    blog.seed_post("p1", json!({ "title": "mine", "owner": "u1" })).await;
    let engine = blog.engine(Blog::user_list(), owner_filtered_posts());

    let updated = engine
        .update_item("Post", &id("p1"), map(json!({ "title": "edited" })), &caller(&engine, "u1"))
        .await
        .unwrap();
    assert_eq!(updated.get("title"), Some(json!("edited")));
    assert_eq!(updated.get("owner"), Some(json!("u1")));
}

#[tokio::test]
async fn deleting_a_nonexistent_id_is_denied_under_full_access() {
    let blog = Blog::new();
    let engine = blog.default_engine();

    let err = engine
        .delete_item("Post", &id("nope"), &engine.context(None))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::AccessDenied(_)));
    assert_eq!(err.to_public().message, "You do not have access to this resource");
    assert_eq!(blog.posts.calls(), vec![AdapterCall::FindById(id("nope"))]);
}

#[tokio::test]
async fn denied_field_aborts_the_whole_write() {
    let blog = Blog::new();
    blog.seed_post("p1", json!({ "title": "draft", "published": false })).await;
    let posts = Blog::post_list();
    let mut fields = posts.fields.clone();
    for field in &mut fields {
        if field.path == "published" {
            field.access = FieldAccess::new().update(false);
        }
    }
    let engine = blog.engine(Blog::user_list(), listkit_engine::ListDefinition { fields, ..posts });

    let err = engine
        .update_item(
            "Post",
            &id("p1"),
            map(json!({ "title": "final", "published": true })),
            &engine.context(None),
        )
        .await
        .unwrap_err();

    let EngineError::AccessDenied(denied) = err else {
        panic!("expected access denied");
    };
    assert_eq!(denied.internal.field.as_deref(), Some("published"));
    assert!(blog.posts.write_calls().is_empty());
}

#[tokio::test]
async fn unreadable_fields_come_back_null_with_errors() {
    let blog = Blog::new();
    blog.seed_user("u1", json!({ "name": "Ada", "email": "ada@example.com" })).await;
    blog.seed_user("u2", json!({ "name": "Grace", "email": "grace@example.com" })).await;
    let users = listkit_engine::ListDefinition::new("User")
        .field(FieldDefinition::text("name"))
        .field(FieldDefinition::text("email").access(FieldAccess::new().read(false)))
        .field(FieldDefinition::relationship_many("posts", "Post").inverse("author"));
    let engine = blog.engine(users, Blog::post_list());

    let response = engine
        .list_query("User", QueryArgs::new(), &engine.context(None))
        .await
        .unwrap();

    assert_eq!(response.items.len(), 2);
    for item in &response.items {
        assert_eq!(item.fields["email"], Value::Null);
        assert!(item.fields["name"].is_string());
    }
    assert_eq!(response.errors.len(), 2);
    assert!(response.errors.iter().all(|e| e.field == "email"));
    assert_eq!(response.errors[0].error.kind, "AccessDeniedError");
}

#[tokio::test]
async fn declarative_read_access_is_merged_into_queries() {
    let blog = Blog::new();
    blog.seed_post("p1", json!({ "title": "public", "published": true })).await;
    blog.seed_post("p2", json!({ "title": "draft", "published": false })).await;
    let engine = blog.engine(
        Blog::user_list(),
        Blog::post_list().access(ListAccess::new().read(Filter::equals("published", true))),
    );
    let ctx = engine.context(None);

    let response = engine.list_query("Post", QueryArgs::new(), &ctx).await.unwrap();
    let titles: Vec<_> = response.items.iter().map(|i| i.fields["title"].clone()).collect();
    assert_eq!(titles, vec![json!("public")]);

    let meta = engine.list_query_meta("Post", QueryArgs::new(), &ctx).await.unwrap();
    assert_eq!(meta.count, 1);

    let err = engine.item_query("Post", &id("p2"), &ctx).await.unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied(_)));
    assert!(engine.item_query("Post", &id("p1"), &ctx).await.is_ok());
}

#[tokio::test]
async fn sudo_context_bypasses_every_rule() {
    let blog = Blog::new();
    let engine = blog.engine(Blog::user_list(), Blog::post_list().access(ListAccess::all(false)));

    let created = engine
        .create_item("Post", map(json!({ "title": "forced" })), &engine.sudo_context())
        .await
        .unwrap();
    assert_eq!(created.get("title"), Some(json!("forced")));

    assert!(engine
        .create_item("Post", map(json!({ "title": "nope" })), &engine.context(None))
        .await
        .is_err());
}

#[tokio::test]
async fn configured_default_denies_undeclared_operations() {
    let blog = Blog::new();
    let config = EngineConfig::from_toml_str("[access]\ndefault_list_access = false").unwrap();
    let engine = blog.engine_with(
        config,
        Blog::user_list(),
        Blog::post_list().access(ListAccess::new().read(true)),
    );
    let ctx = engine.context(None);

    assert!(engine.list_query("Post", QueryArgs::new(), &ctx).await.is_ok());
    let err = engine
        .create_item("Post", map(json!({ "title": "x" })), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied(_)));
}

#[tokio::test]
async fn unknown_input_fields_are_rejected() {
    let blog = Blog::new();
    let engine = blog.default_engine();

    let err = engine
        .create_item("Post", map(json!({ "headline": "x" })), &engine.context(None))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput { .. }));
    assert!(blog.posts.write_calls().is_empty());
}

//! Shared fixture: a small blog schema over recording adapters.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use listkit_engine::{
    Engine, EngineConfig, FieldDefinition, Hook, ListDefinition, RequestContext,
};
use listkit_storage::{ListAdapter, RecordingAdapter};
use listkit_types::{AuthedItem, FieldMap, Item, ItemId, Value};

pub fn map(value: Value) -> FieldMap {
    value.as_object().cloned().unwrap_or_default()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Adapters for `User`, `Post` and `Tag`.
pub struct Blog {
    pub users: Arc<RecordingAdapter>,
    pub posts: Arc<RecordingAdapter>,
    pub tags: Arc<RecordingAdapter>,
}

impl Blog {
    pub fn new() -> Self {
        init_tracing();
        Self {
            users: Arc::new(RecordingAdapter::new("User")),
            posts: Arc::new(RecordingAdapter::new("Post")),
            tags: Arc::new(RecordingAdapter::new("Tag")),
        }
    }

    /// `User.posts` ↔ `Post.author`, plus one-sided `Post.tags`.
    pub fn user_list() -> ListDefinition {
        ListDefinition::new("User")
            .field(FieldDefinition::text("name"))
            .field(FieldDefinition::text("email"))
            .field(FieldDefinition::relationship_many("posts", "Post").inverse("author"))
    }

    pub fn post_list() -> ListDefinition {
        ListDefinition::new("Post")
            .field(FieldDefinition::text("title"))
            .field(FieldDefinition::text("owner"))
            .field(FieldDefinition::scalar("published", "Checkbox"))
            .field(FieldDefinition::relationship("author", "User").inverse("posts"))
            .field(FieldDefinition::relationship_many("tags", "Tag"))
    }

    pub fn tag_list() -> ListDefinition {
        ListDefinition::new("Tag").field(FieldDefinition::text("name"))
    }

    pub fn engine(&self, users: ListDefinition, posts: ListDefinition) -> Engine {
        self.engine_with(EngineConfig::default(), users, posts)
    }

    pub fn engine_with(&self, config: EngineConfig, users: ListDefinition, posts: ListDefinition) -> Engine {
        Engine::builder(config)
            .list(users, self.users.clone() as Arc<dyn ListAdapter>)
            .list(posts, self.posts.clone() as Arc<dyn ListAdapter>)
            .list(Self::tag_list(), self.tags.clone() as Arc<dyn ListAdapter>)
            .build()
            .expect("blog schema is valid")
    }

    pub fn default_engine(&self) -> Engine {
        self.engine(Self::user_list(), Self::post_list())
    }

    pub async fn seed_user(&self, id: &str, fields: Value) -> Item {
        let mut data = map(fields);
        data.insert("id".into(), Value::from(id));
        self.users.seed(data).await.expect("seed user")
    }

    pub async fn seed_post(&self, id: &str, fields: Value) -> Item {
        let mut data = map(fields);
        data.insert("id".into(), Value::from(id));
        self.posts.seed(data).await.expect("seed post")
    }

    pub async fn seed_tag(&self, id: &str, name: &str) -> Item {
        let mut data = FieldMap::new();
        data.insert("id".into(), Value::from(id));
        data.insert("name".into(), Value::from(name));
        self.tags.seed(data).await.expect("seed tag")
    }

    pub fn clear_calls(&self) {
        self.users.clear_calls();
        self.posts.clear_calls();
        self.tags.clear_calls();
    }
}

pub fn caller(engine: &Engine, user_id: &str) -> RequestContext {
    engine.context(Some(AuthedItem::new(
        "User",
        Item::new(user_id, FieldMap::new()),
    )))
}

pub fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|i| i.id.to_string()).collect()
}

pub fn id(value: &str) -> ItemId {
    ItemId::from(value)
}

/// Hook recording `label` into a shared log.
pub fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &str) -> Hook<()> {
    let log = log.clone();
    let label = label.to_string();
    Hook::sync(move |_| {
        log.lock().unwrap().push(label.clone());
        Ok(())
    })
}

/// Validation hook that always reports `message`.
pub fn rejecting(message: &str) -> Hook<()> {
    let message = message.to_string();
    Hook::sync(move |args| {
        args.errors.add_error(message.clone());
        Ok(())
    })
}

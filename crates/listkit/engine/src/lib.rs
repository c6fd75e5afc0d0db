//! # Listkit Engine
//!
//! Executes create, read, update and delete requests against declared lists.
//!
//! ## Key Components
//!
//! - [`Engine`]: registry of [`ListDefinition`]s bound to their storage, and
//!   the request entry points
//! - [`MutationPipeline`]: the staged write path (access, relationships,
//!   hooks, persist, backlinks, after-change)
//! - [`HookRunner`]: built-in, declared and list-level hooks per phase, with
//!   validation errors aggregated into one failure
//! - [`RelationshipResolver`]: nested `create` / `connect` / `disconnect`
//!   input and two-sided relationship bookkeeping
//! - [`NestedMutationCoordinator`]: shares one [`MutationState`] across a
//!   request's nested writes; only the root drains it
//! - [`ListQuery`]: reads with list access merged into the where-clause and
//!   per-field read checks
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use listkit_engine::{Engine, EngineConfig, FieldDefinition, ListDefinition};
//! use listkit_storage::InMemoryListAdapter;
//! use serde_json::json;
//!
//! # async fn run() -> listkit_engine::EngineResult<()> {
//! let engine = Engine::builder(EngineConfig::default())
//!     .list(
//!         ListDefinition::new("User")
//!             .field(FieldDefinition::text("name").required())
//!             .field(FieldDefinition::relationship_many("posts", "Post").inverse("author")),
//!         Arc::new(InMemoryListAdapter::new("User")),
//!     )
//!     .list(
//!         ListDefinition::new("Post")
//!             .field(FieldDefinition::text("title"))
//!             .field(FieldDefinition::relationship("author", "User").inverse("posts")),
//!         Arc::new(InMemoryListAdapter::new("Post")),
//!     )
//!     .build()?;
//!
//! let context = engine.context(None);
//! let input = json!({ "title": "Hello", "author": { "create": { "name": "Ada" } } });
//! let post = engine
//!     .create_item("Post", input.as_object().cloned().unwrap_or_default(), &context)
//!     .await?;
//! # let _ = post;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod context;
pub mod coordinator;
pub mod deferred;
pub mod engine;
pub mod error;
mod guard;
pub mod hook_runner;
pub mod hooks;
pub mod list;
pub mod mutation_state;
pub mod pipeline;
pub mod query;
pub mod relationship;

pub use config::{AccessConfig, ConfigError, EngineConfig, MutationConfig, QueryLimitsConfig};
pub use context::{Actions, RequestContext};
pub use coordinator::NestedMutationCoordinator;
pub use deferred::{deferred_item, DeferredItemHandle, DeferredResolver};
pub use engine::{Engine, EngineBuilder, RegisteredList};
pub use error::{
    EngineError, EngineResult, PublicError, ValidationError, ValidationFailureError,
    ValidationFailureInternal,
};
pub use hook_runner::{required_message, HookRunner};
pub use hooks::{FieldHooks, Hook, HookArgs, HookPhase, ListHooks, ValidationCollector};
pub use list::{DefaultValue, FieldDefinition, FieldKind, ListDefinition, RelationshipSpec};
pub use mutation_state::{
    AfterChangeSlot, AfterChangeTask, BacklinkAction, BacklinkTask, FlushMode, MutationState,
};
pub use pipeline::MutationPipeline;
pub use query::{FieldAccessDenial, ItemResponse, ItemView, ListQuery, QueryResponse};
pub use relationship::{NestedOperations, PlannedBacklink, RelationshipResolver, ResolvedRelationships};

//! Listkit Types - shared vocabulary for the list execution engine.
//!
//! Every crate in the workspace speaks in these types:
//!
//! - [`Item`] / [`FieldMap`]: storage-defined records (an id plus named fields)
//! - [`Operation`]: the CRUD operation a request performs on a list
//! - [`Filter`]: declarative where-clauses, with combinators for merging and
//!   narrowing against known id sets
//! - [`AccessResult`]: the closed `Allow | Deny | FilterClause` result of an
//!   access rule
//! - [`QueryArgs`] / [`QueryMeta`]: storage query arguments and metadata

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod access;
pub mod auth;
pub mod filter;
pub mod id;
pub mod item;
pub mod operation;
pub mod query;

pub use access::AccessResult;
pub use auth::AuthedItem;
pub use filter::{Filter, IdConstraint};
pub use id::ItemId;
pub use item::{ids_to_value, value_as_id, value_as_ids, FieldMap, Item};
pub use operation::Operation;
pub use query::{OrderBy, QueryArgs, QueryMeta, SortDirection};

pub use serde_json::Value;

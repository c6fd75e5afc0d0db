//! # Listkit Access Control
//!
//! Evaluation of list-level and field-level access rules, and the
//! access-checked item lookups every update, delete and read goes through.
//!
//! ## Key Components
//!
//! - [`AccessRule`] / [`FieldAccessRule`]: declared rules (static boolean,
//!   declarative filter, or computed from the caller and item)
//! - [`AccessControl`]: per-request collaborator turning rules into an
//!   [`AccessResult`](listkit_types::AccessResult)
//! - [`DeclaredAccessControl`]: evaluates the declared rules with configurable
//!   defaults for lists and fields that declare none
//! - [`SudoAccessControl`]: elevated access, everything allowed
//! - [`get_access_controlled_item`] / [`get_access_controlled_items`]:
//!   id-narrowing lookups that never distinguish "missing" from "denied"
//!
//! ## Example
//!
//! ```rust,no_run
//! use listkit_access::{AccessRule, ListAccess};
//! use listkit_types::{AccessResult, Filter, Value};
//!
//! // Anyone may read, only the owner may update, nobody may delete.
//! let access = ListAccess::new()
//!     .read(AccessRule::Static(true))
//!     .update(AccessRule::computed_sync(|args| match &args.authentication {
//!         Some(user) => Ok(AccessResult::FilterClause(Filter::equals(
//!             "owner",
//!             Value::String(user.item.id.to_string()),
//!         ))),
//!         None => Ok(AccessResult::Deny),
//!     }))
//!     .delete(AccessRule::Static(false));
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod control;
pub mod error;
pub mod resolve;
pub mod rule;

pub use control::{AccessControl, AccessDefaults, DeclaredAccessControl, SudoAccessControl};
pub use error::{
    AccessDeniedError, AccessDeniedInternal, AccessDeniedPublic, AccessError, AccessOutcome,
};
pub use resolve::{get_access_controlled_item, get_access_controlled_items};
pub use rule::{
    AccessRule, FieldAccess, FieldAccessArgs, FieldAccessRule, ListAccess, ListAccessArgs,
};

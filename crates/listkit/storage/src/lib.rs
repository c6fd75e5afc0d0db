//! Listkit storage boundary.
//!
//! This crate defines the storage contract every list is backed by:
//! - [`ListAdapter`]: find/query/count/create/update/delete for one list
//! - [`memory::InMemoryListAdapter`]: deterministic reference implementation
//! - [`mocks::RecordingAdapter`]: call-recording, fault-injecting wrapper for tests
//!
//! Design stance:
//! - The engine owns access control, hooks and relationships; adapters only
//!   store and filter.
//! - `update`/`delete` return `None` when the record is already absent; that
//!   is not an adapter error.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
pub mod mocks;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryListAdapter;
pub use mocks::{AdapterCall, RecordingAdapter};
pub use traits::ListAdapter;

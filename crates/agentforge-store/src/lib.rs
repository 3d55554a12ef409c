// SPDX-License-Identifier: Apache-2.0
//! Persistence port (C1): a keyed, partitioned document store with
//! optimistic patch semantics, plus the in-memory backend used both by
//! tests and by deployments without an external store configured.

mod document;
mod error;
mod memory;
pub mod typed;

pub use document::{DocumentKind, StoredDoc, CURRENT_SCHEMA_VERSION};
pub use error::{PatchAbort, StoreError};
pub use memory::{InMemoryStore, ListFilter, Store};

// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// The entity kinds tracked by the persistence port.
///
/// `Plan`/`Step`/`Message` are partitioned by `session_id`, `TeamConfig` by
/// `team_id`, `Dataset` by `session_id` (session-scoped, not user-scoped —
/// a dataset's `owner_hint` is metadata only), `Session` by its own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Plan,
    Step,
    Message,
    TeamConfig,
    Dataset,
    Session,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Plan => "plan",
            DocumentKind::Step => "step",
            DocumentKind::Message => "message",
            DocumentKind::TeamConfig => "team_config",
            DocumentKind::Dataset => "dataset",
            DocumentKind::Session => "session",
        }
    }
}

/// The current schema version written by this crate. Stored alongside every
/// document; a read of a document carrying a different version is rejected
/// with `StoreError::Fatal`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// A raw document as tracked internally by a [`crate::Store`] backend: the
/// typed payload is not known to the store itself, only to callers via the
/// generic helpers in [`crate::typed`] — this keeps the port storage-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDoc {
    pub id: String,
    pub partition: String,
    pub schema_version: u32,
    /// Opaque optimistic-concurrency token. Bumped on every successful write;
    /// `patch` uses it to detect whether the document changed between its
    /// read and its write.
    pub version: u64,
    pub data: serde_json::Value,
}

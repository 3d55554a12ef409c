// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tracks only the handle to an uploaded blob; contents are opaque to the
/// core. Partitioned by `session_id` — dataset visibility is session-scoped,
/// not user-scoped; the `owner_hint` is informational only and never
/// restricts reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetHandle {
    pub dataset_id: Uuid,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    /// The `user_id` seen at upload time. Retained for audit, never used to
    /// restrict which agents/tools may reference the handle within the
    /// session.
    pub owner_hint: String,
    pub byte_size: u64,
    pub content_type: String,
    pub location: String,
}

impl DatasetHandle {
    pub fn new(
        filename: impl Into<String>,
        owner_hint: impl Into<String>,
        byte_size: u64,
        content_type: impl Into<String>,
        location: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            dataset_id: Uuid::new_v4(),
            filename: filename.into(),
            uploaded_at: now,
            owner_hint: owner_hint.into(),
            byte_size,
            content_type: content_type.into(),
            location: location.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_distinct_ids() {
        let now = Utc::now();
        let a = DatasetHandle::new("a.csv", "user-1", 10, "text/csv", "blob://a", now);
        let b = DatasetHandle::new("b.csv", "user-1", 10, "text/csv", "blob://b", now);
        assert_ne!(a.dataset_id, b.dataset_id);
    }
}

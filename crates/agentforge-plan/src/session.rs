// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The conversational scope to which plans, messages, and dataset handles
/// belong. Partitioned by its own id. Created implicitly on first request;
/// the gateway is the only writer.
///
/// `owner_user_id` is the `user_id` seen on the session's first authenticated
/// request. Every later command is checked against it — a session cannot
/// change owners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub owner_user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, owner_user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            owner_user_id: owner_user_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_records_owner() {
        let s = Session::new("sess-1", "user-1", Utc::now());
        assert_eq!(s.owner_user_id, "user-1");
        assert_eq!(s.created_at, s.updated_at);
    }
}

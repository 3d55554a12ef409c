// SPDX-License-Identifier: Apache-2.0
//! Digesting tool arguments/results for [`agentforge_plan::ToolCallRecord`]:
//! persist a digest, never the raw payload.

use sha2::{Digest, Sha256};

pub fn digest_str(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn digest_json(value: &serde_json::Value) -> String {
    digest_str(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_for_identical_input() {
        assert_eq!(digest_str("hello"), digest_str("hello"));
    }

    #[test]
    fn digest_differs_for_different_input() {
        assert_ne!(digest_str("hello"), digest_str("world"));
    }
}

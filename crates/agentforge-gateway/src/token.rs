// SPDX-License-Identifier: Apache-2.0
//! Bearer token generation, storage, and per-token `user_id` resolution.
//!
//! Raw tokens are shown to the operator exactly once, then only their
//! SHA-256 hash is persisted; every comparison runs in constant time via
//! [`subtle::ConstantTimeEq`]. Every request must resolve to a `user_id`, so
//! the on-disk file holds a small *registry* of `{user_id, token_hash}`
//! pairs rather than one shared hash.

use std::path::Path;

use anyhow::Context;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A raw bearer token — displayed to the operator **exactly once**.
#[derive(Debug)]
#[must_use = "display this token to the operator, then call into_stored()"]
pub struct RawToken(String);

impl RawToken {
    /// Generate a cryptographically random 256-bit token (43 base64url chars).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        RawToken(base64url_encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps an externally-supplied token value (e.g. one provisioned by an
    /// orchestration system ahead of time) rather than generating a new
    /// random one. Skips no validation beyond what [`StoredToken::verify`]
    /// already performs at use time.
    pub fn from_plain(value: impl Into<String>) -> Self {
        RawToken(value.into())
    }

    pub fn into_stored(self) -> StoredToken {
        StoredToken(sha256(self.0.as_bytes()))
    }
}

/// The stored form of a bearer token — only the SHA-256 digest is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken(#[serde(with = "hex_bytes")] [u8; 32]);

impl StoredToken {
    /// Verify a provided token string in constant time.
    pub fn verify(&self, provided: &str) -> bool {
        let provided_hash = sha256(provided.as_bytes());
        bool::from(provided_hash.ct_eq(&self.0))
    }
}

/// One registered caller: a `user_id` and the hash of the token that proves
/// it. `user_id` is attached to every command forwarded to the orchestrator
/// and checked against a session's recorded owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub user_id: String,
    pub token_hash: StoredToken,
}

/// On-disk YAML registry of authorized users and their token hashes.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TokenRegistry {
    pub users: Vec<RegisteredUser>,
}

impl TokenRegistry {
    /// Resolves a raw bearer token to the `user_id` that owns it, in
    /// constant time per entry (the registry is small — operators, not a
    /// public user base — so a linear scan is the simplest correct choice).
    pub fn resolve(&self, provided: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.token_hash.verify(provided))
            .map(|u| u.user_id.as_str())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading token registry {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing token registry {}", path.display()))
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating token registry directory {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self).context("serializing token registry")?;
        write_secret_file(path, yaml.as_bytes())
    }

    /// Loads the registry from `path`, or bootstraps a single
    /// `"local-operator"` user with a freshly generated token if the file
    /// doesn't exist yet. Returns the raw token when one was just minted, so
    /// the caller can print a "token shown once" banner.
    pub fn load_or_bootstrap(path: &Path) -> anyhow::Result<(Self, Option<RawToken>)> {
        if path.exists() {
            return Ok((Self::load(path)?, None));
        }
        let raw = RawToken::generate();
        let raw_str = raw.as_str().to_string();
        let registry = TokenRegistry {
            users: vec![RegisteredUser { user_id: "local-operator".to_string(), token_hash: RawToken(raw_str).into_stored() }],
        };
        registry.save(path)?;
        Ok((registry, Some(raw)))
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn write_secret_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("writing secret file {}", path.display()))?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data).with_context(|| format!("writing secret file {}", path.display()))?;
    }
    Ok(())
}

fn base64url_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes.try_into().map_err(|_| D::Error::custom("expected 32-byte hex"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_43_chars() {
        assert_eq!(RawToken::generate().as_str().len(), 43);
    }

    #[test]
    fn stored_token_verifies_correct_raw() {
        let raw = RawToken::generate();
        let raw_str = raw.as_str().to_string();
        let stored = raw.into_stored();
        assert!(stored.verify(&raw_str));
    }

    #[test]
    fn stored_token_rejects_wrong_value() {
        let raw = RawToken::generate();
        let stored = raw.into_stored();
        assert!(!stored.verify("wrong-token"));
    }

    #[test]
    fn registry_resolves_matching_user() {
        let raw = RawToken::generate();
        let raw_str = raw.as_str().to_string();
        let registry = TokenRegistry {
            users: vec![RegisteredUser { user_id: "alice".into(), token_hash: raw.into_stored() }],
        };
        assert_eq!(registry.resolve(&raw_str), Some("alice"));
        assert_eq!(registry.resolve("not-a-token"), None);
    }

    #[test]
    fn bootstrap_creates_local_operator_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.yaml");
        let (registry, raw) = TokenRegistry::load_or_bootstrap(&path).unwrap();
        let raw = raw.expect("first bootstrap mints a token");
        assert_eq!(registry.resolve(raw.as_str()), Some("local-operator"));

        let (reloaded, raw2) = TokenRegistry::load_or_bootstrap(&path).unwrap();
        assert!(raw2.is_none(), "second call must not mint a new token");
        assert_eq!(reloaded.resolve(raw.as_str()), Some("local-operator"));
    }
}

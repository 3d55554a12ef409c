// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Failure taxonomy for the persistence port.
///
/// Transient I/O is retried *inside* the store implementation and never
/// reaches a caller as [`StoreError::Transient`] once that retry succeeds;
/// the variant exists so a caller that bypasses the retry helper (direct
/// backend access in a test, say) can still observe it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient persistence I/O error: {0}")]
    Transient(String),

    #[error("conflict: patch did not converge after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("fatal persistence error: {0}")]
    Fatal(String),

    #[error("document not found: kind={kind:?} id={id} partition={partition}")]
    NotFound {
        kind: crate::DocumentKind,
        id: String,
        partition: String,
    },
}

/// Returned by a `patch_fn` to abort a patch without retrying — used when the
/// transformation itself determines the operation no longer applies (e.g. a
/// double-`Approve` finding the plan already out of `AwaitingApproval`).
#[derive(Debug, Clone)]
pub struct PatchAbort(pub String);

impl std::fmt::Display for PatchAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "patch aborted: {}", self.0)
    }
}

//! # Binding Stores
//!
//! A binding store owns the `identity -> address` association and its
//! lifecycle. The protocol layer never mutates binding state directly; it
//! goes through the three-call capability set defined here.
//!
//! Two backends:
//!
//! - [`FileStore`](file::FileStore) — one file per identity, the file's
//!   mtime is the freshness clock, revocation sentinels live in a separate
//!   namespace. Served to DNS clients by this crate's resolver.
//! - [`ZoneStore`](zone::ZoneStore) — an authoritative DNS zone is the
//!   system of record; updates are RFC 2136 change-batches and the zone is
//!   queried by ordinary DNS infrastructure, not by our resolver.
//!
//! Revocation enforcement is split on purpose: `revoke` is a store
//! operation, but *refusing updates for a revoked identity* is the caller's
//! job (check first, then update). That keeps the store's write path
//! unconditional and idempotent.

pub mod file;
pub mod zone;

pub use file::FileStore;
pub use zone::{ZoneConfig, ZoneStore};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::identity::Identity;

/// What a store currently knows about an identity.
///
/// A stale file-backed binding reports `Unregistered` here even though bytes
/// may still sit on disk; for resolution purposes expiry and absence are the
/// same thing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingStatus {
    /// No live binding for this identity.
    Unregistered,
    /// A fresh binding exists.
    Registered {
        /// The bound address, verbatim as it was observed at update time.
        address: String,
    },
    /// Terminal state. The identity can never be registered again.
    Revoked,
}

/// Backend failures. All of these surface to API clients as a generic
/// server error; none of them are retried internally.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("zone backend failure: {0}")]
    Zone(String),

    #[error("zone backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("address {0:?} is not usable as a record value")]
    BadAddress(String),
}

/// The capability set every binding backend implements.
///
/// Concurrency contract: implementations must tolerate concurrent callers.
/// No ordering is guaranteed across identities; for a single identity,
/// last-writer-wins is acceptable and no conflict detection is performed.
/// `check` must never block behind a slow `update`.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Report the current status of an identity, applying the backend's
    /// freshness rule (if it has one).
    async fn check(&self, identity: &Identity) -> Result<BindingStatus, StoreError>;

    /// Bind `address` to `identity`, creating or refreshing the record.
    ///
    /// Unconditional: does not consult revocation state. Callers must check
    /// first and refuse revoked identities themselves.
    async fn update(&self, identity: &Identity, address: &str) -> Result<(), StoreError>;

    /// Permanently retire an identity, clearing any current binding.
    /// Idempotent: revoking twice is a successful no-op.
    async fn revoke(&self, identity: &Identity) -> Result<(), StoreError>;
}

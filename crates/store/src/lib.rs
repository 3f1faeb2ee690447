//! Object store clients for git-theta.
//!
//! The manifest only holds content addresses; the bytes live out-of-band in
//! a content-addressed store. The reference backing is git-lfs driven over
//! subprocesses, so `get` may block on network I/O. An in-memory store
//! backs the tests.

mod errors;
mod lfs;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod pointer;

pub use errors::{StoreError, StoreResult};
pub use lfs::LfsObjectStore;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryObjectStore;
pub use pointer::LfsPointer;

use async_trait::async_trait;
use theta_params::Oid;

/// A content-addressed blob store.
///
/// `put` is idempotent: identical bytes always yield the same oid. `get`
/// takes the full pointer (oid plus size) because the LFS smudge protocol
/// needs both. Push failures are retriable and never silently dropped.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Insert a blob, returning its content address.
    async fn put(&self, bytes: &[u8]) -> StoreResult<Oid>;

    /// Retrieve a blob. Missing objects are [`StoreError::NotFound`].
    async fn get(&self, pointer: &LfsPointer) -> StoreResult<Vec<u8>>;

    /// Push a batch of objects to a remote.
    async fn push(&self, oids: &[Oid], remote: &str) -> StoreResult<()>;
}

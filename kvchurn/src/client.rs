//! The store capability consumed by the workload driver.

use std::fmt::Debug;

use crate::error::Result;

/// The result of a successful [`put`](KvClient::put).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PutResponse {
    /// The store revision after the write.
    pub revision: i64,
}

/// The result of a successful [`delete`](KvClient::delete).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeleteResponse {
    /// Number of records the delete removed.
    pub deleted: i64,
    /// The store revision after the delete.
    pub revision: i64,
}

/// A handle to a revisioned key-value store.
///
/// Implementations are constructed once at startup and shared for the lifetime of the run.
#[async_trait::async_trait]
pub trait KvClient: Debug + Send + Sync + 'static {
    /// Writes `value` under `key`.
    async fn put(&self, key: &str, value: &[u8]) -> Result<PutResponse>;

    /// Removes `key`, reporting how many records were deleted.
    async fn delete(&self, key: &str) -> Result<DeleteResponse>;
}

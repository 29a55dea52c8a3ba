use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::FieldlogResult;
use crate::models::{Operation, RemoteRow, SubmitReceipt};

/// The network-reachable, append-only operation store.
///
/// Accepts operations keyed by `(client_id, sequence)` and serves them back
/// in server arrival order. Resubmitting an already stored operation must be
/// accepted without creating a second row.
pub trait RemoteStore: Send + Sync + 'static {
    /// Durably append one operation.
    fn submit(
        &self,
        operation: &Operation,
    ) -> impl Future<Output = FieldlogResult<SubmitReceipt>> + Send;

    /// Rows with `updated_at` strictly after `watermark`, oldest first,
    /// at most `limit` of them.
    fn pull_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        limit: usize,
    ) -> impl Future<Output = FieldlogResult<Vec<RemoteRow>>> + Send;
}

impl<T: RemoteStore> RemoteStore for Arc<T> {
    fn submit(
        &self,
        operation: &Operation,
    ) -> impl Future<Output = FieldlogResult<SubmitReceipt>> + Send {
        (**self).submit(operation)
    }

    fn pull_since(
        &self,
        watermark: Option<DateTime<Utc>>,
        limit: usize,
    ) -> impl Future<Output = FieldlogResult<Vec<RemoteRow>>> + Send {
        (**self).pull_since(watermark, limit)
    }
}

//! Storage contract consumed by the resolver, the writer and the loader.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::config::StoreType;
use crate::schema::{Mapping, PostbackRecord};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use std::sync::Arc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A tabular payload streamed to the store, header line included.
pub type Payload = UnsyncBoxBody<Bytes, BoxError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to read payload: {0}")]
    Payload(#[source] BoxError),

    #[error("bulk load rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkLoadSupport {
    Streaming,
    Unsupported,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// All mapping rows stored for `source`. Implementations may stop after
    /// the second row since callers only distinguish one row from any other count.
    async fn find_mappings(&self, source: &str) -> Result<Vec<Mapping>, StoreError>;

    async fn insert_postback(&self, record: &PostbackRecord) -> Result<(), StoreError>;

    fn bulk_load_support(&self, table: &str) -> BulkLoadSupport;

    /// Streams `payload` into `table`. The first line of the payload is a
    /// header naming `columns` and is skipped by the store. Returns the number
    /// of rows loaded.
    async fn bulk_load(
        &self,
        table: &str,
        columns: &[String],
        payload: Payload,
    ) -> Result<u64, StoreError>;

    fn is_ready(&self) -> bool;
}

pub async fn get_store(store_type: StoreType) -> Result<Arc<dyn Store>, StoreError> {
    match store_type {
        StoreType::Postgres {
            url,
            max_connections,
            acquire_timeout_secs,
            create_schema,
        } => {
            let store =
                PostgresStore::connect(&url, max_connections, acquire_timeout_secs).await?;
            if create_schema {
                store.create_schema().await?;
            }
            Ok(Arc::new(store))
        }
        StoreType::Memory { bulk_load } => {
            tracing::warn!("using the in-memory store, data is lost on exit");
            Ok(Arc::new(MemoryStore::new(bulk_load)))
        }
    }
}

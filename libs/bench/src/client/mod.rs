//! Database client capability interface.
//!
//! The runner only talks to the database through [`DatabaseClient`]. Calls
//! return `anyhow::Result`; the runner wraps failures as
//! [`BenchError::Backend`](crate::BenchError::Backend).
//!
//! Implementations:
//! - [`milvus::MilvusClient`] - Milvus RESTful v2 API over HTTP
//! - [`memory::InMemoryClient`] - process-local stand-in for dry runs and tests

use anyhow::Result;
use async_trait::async_trait;

use crate::schema::{
    CollectionSpec, CollectionStats, InsertBatch, LoadState, SearchHits, SearchRequest,
};

pub mod memory;
pub mod milvus;

pub use memory::{InMemoryClient, Operation};
pub use milvus::MilvusClient;

/// Operations the benchmark needs from a vector database.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Short backend label for logs and the banner.
    fn backend_name(&self) -> &str;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Insert a batch, returning the number of rows the backend acknowledged.
    async fn insert(&self, spec: &CollectionSpec, batch: &InsertBatch) -> Result<u64>;

    /// Seal pending inserts so they count towards collection statistics.
    async fn flush(&self, names: &[&str]) -> Result<()>;

    async fn get_stats(&self, name: &str) -> Result<CollectionStats>;

    /// Build the index described by `spec.index` on `spec.field`.
    async fn create_index(&self, spec: &CollectionSpec) -> Result<()>;

    /// Ask the backend to bring the collection into its serving state.
    async fn load_collection(&self, name: &str) -> Result<()>;

    /// Current serving state. Backends with a synchronous load report
    /// [`LoadState::Loaded`] as soon as `load_collection` returns.
    async fn load_state(&self, name: &str) -> Result<LoadState>;

    /// Run one search call with `queries.len() == request.nq` vectors.
    async fn search(
        &self,
        spec: &CollectionSpec,
        request: &SearchRequest,
        queries: &[Vec<f32>],
    ) -> Result<SearchHits>;
}

//! Shared helpers for benchmark integration tests
//!
//! - NPY fixture writers with seeded data
//! - A client wrapper that delays and fails chosen searches, used to
//!   shuffle completion order under a concurrent sweep
//! - Small configurations that run in milliseconds against the in-memory client

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use vdbench::config::SweepConfig;
use vdbench::fixture::{random_unit_vectors, write_npy_f32, FixtureLayout};
use vdbench::metrics::SearchKey;
use vdbench::{
    BenchConfig, CollectionSpec, CollectionStats, DatabaseClient, InMemoryClient, InsertBatch,
    LoadState, SearchHits, SearchRequest,
};

pub const TEST_DIM: usize = 16;

/// Write `files` NPY files of `rows` unit vectors each, named per `layout`.
pub fn write_fixture_files(layout: &FixtureLayout, files: usize, rows: usize, dim: usize, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for i in 0..files {
        let data = random_unit_vectors(&mut rng, rows, dim);
        write_npy_f32(&layout.path(i), &data).unwrap();
    }
}

/// Configuration reading fixtures from `dir`, sized for quick runs.
pub fn test_config(dir: &Path) -> BenchConfig {
    BenchConfig::default()
        .with_dim(TEST_DIM)
        .with_fixture_dir(dir.to_path_buf())
        .with_rows_per_file(4000)
        .with_vector_count(10_000)
        .with_insert_bulk_size(2500)
        .with_sweep(SweepConfig::new(vec![1, 10], vec![10], vec![10]))
        .with_query_seed(42)
        .with_load_polling(Duration::from_millis(5), Duration::from_secs(1))
}

/// Wraps [`InMemoryClient`], sleeping before each search for a time that
/// shrinks as `nq` grows, and failing searches whose key is listed.
#[derive(Debug, Clone)]
pub struct ShufflingClient {
    pub inner: InMemoryClient,
    base_delay: Duration,
    fail_keys: Vec<String>,
}

impl ShufflingClient {
    pub fn new(inner: InMemoryClient, base_delay: Duration) -> Self {
        Self {
            inner,
            base_delay,
            fail_keys: Vec::new(),
        }
    }

    pub fn failing_on(mut self, key: &str) -> Self {
        self.fail_keys.push(key.to_string());
        self
    }
}

#[async_trait]
impl DatabaseClient for ShufflingClient {
    fn backend_name(&self) -> &str {
        "shuffling"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        self.inner.has_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.inner.drop_collection(name).await
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        self.inner.create_collection(spec).await
    }

    async fn insert(&self, spec: &CollectionSpec, batch: &InsertBatch) -> Result<u64> {
        self.inner.insert(spec, batch).await
    }

    async fn flush(&self, names: &[&str]) -> Result<()> {
        self.inner.flush(names).await
    }

    async fn get_stats(&self, name: &str) -> Result<CollectionStats> {
        self.inner.get_stats(name).await
    }

    async fn create_index(&self, spec: &CollectionSpec) -> Result<()> {
        self.inner.create_index(spec).await
    }

    async fn load_collection(&self, name: &str) -> Result<()> {
        self.inner.load_collection(name).await
    }

    async fn load_state(&self, name: &str) -> Result<LoadState> {
        self.inner.load_state(name).await
    }

    async fn search(
        &self,
        spec: &CollectionSpec,
        request: &SearchRequest,
        queries: &[Vec<f32>],
    ) -> Result<SearchHits> {
        let delay = self.base_delay / request.nq as u32;
        tokio::time::sleep(delay).await;
        let key = SearchKey::from(request).to_string();
        if self.fail_keys.contains(&key) {
            bail!("search rejected: {}", key);
        }
        self.inner.search(spec, request, queries).await
    }
}

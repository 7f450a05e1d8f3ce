//! Benchmark configuration.
//!
//! Every field has a default, so a TOML file only needs to name what it
//! overrides:
//!
//! ```toml
//! vector_count = 500000
//! insert_bulk_size = 5000
//! fixture_dir = "/sift1b"
//!
//! [sweep]
//! nq = [1, 10, 100]
//! topk = [10]
//! nprobe = [8, 16]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::fixture::FixtureLayout;
use crate::schema::{CollectionSpec, IndexParams, IndexType, MetricType, SearchRequest};

/// Rows held by each numbered fixture file.
pub const DEFAULT_ROWS_PER_FILE: usize = 100_000;

/// Cartesian sweep over search shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub nq: Vec<usize>,
    pub topk: Vec<usize>,
    pub nprobe: Vec<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            nq: vec![1, 10, 100, 1000],
            topk: vec![1, 10, 100, 1000],
            nprobe: vec![10],
        }
    }
}

impl SweepConfig {
    pub fn new(nq: Vec<usize>, topk: Vec<usize>, nprobe: Vec<usize>) -> Self {
        Self { nq, topk, nprobe }
    }

    /// Number of sweep points.
    pub fn len(&self) -> usize {
        self.nq.len() * self.topk.len() * self.nprobe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep points, nq outermost and nprobe innermost, each axis in the
    /// order it was configured.
    pub fn points(&self) -> Result<Vec<SearchRequest>> {
        let mut points = Vec::with_capacity(self.len());
        for &nq in &self.nq {
            for &topk in &self.topk {
                for &nprobe in &self.nprobe {
                    points.push(SearchRequest::new(nq, topk, nprobe)?);
                }
            }
        }
        Ok(points)
    }

    fn validate(&self) -> Result<()> {
        for (axis, values) in [("nq", &self.nq), ("topk", &self.topk), ("nprobe", &self.nprobe)] {
            if values.is_empty() {
                return Err(BenchError::config(format!("sweep axis '{}' is empty", axis)));
            }
            if values.contains(&0) {
                return Err(BenchError::config(format!(
                    "sweep axis '{}' contains 0; all values must be >= 1",
                    axis
                )));
            }
            let mut seen = values.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != values.len() {
                return Err(BenchError::config(format!(
                    "sweep axis '{}' lists a value twice",
                    axis
                )));
            }
        }
        Ok(())
    }
}

/// Full benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Collection under test.
    pub collection: String,
    /// Float vector field name.
    pub field: String,
    pub dim: usize,
    pub metric: MetricType,
    pub index_type: IndexType,
    pub nlist: u32,

    /// Directory holding `{prefix}{index:05}{suffix}` fixture files.
    pub fixture_dir: PathBuf,
    pub fixture_prefix: String,
    pub fixture_suffix: String,
    pub rows_per_file: usize,
    pub max_files: usize,

    /// Vectors to load; must be a multiple of `insert_bulk_size`.
    pub vector_count: usize,
    pub insert_bulk_size: usize,

    pub sweep: SweepConfig,
    /// Searches in flight at once during the sweep. 1 keeps it sequential.
    pub search_concurrency: usize,
    /// Seed for query synthesis; unseeded runs draw from OS entropy.
    pub query_seed: Option<u64>,

    pub load_poll_interval_ms: u64,
    pub load_timeout_ms: u64,

    /// Base URL of the database's HTTP endpoint.
    pub endpoint: String,
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            collection: "benchmark".to_string(),
            field: "feature".to_string(),
            dim: 128,
            metric: MetricType::L2,
            index_type: IndexType::IvfFlat,
            nlist: 1024,
            fixture_dir: PathBuf::from("/sift1b"),
            fixture_prefix: "binary_128d_".to_string(),
            fixture_suffix: ".npy".to_string(),
            rows_per_file: DEFAULT_ROWS_PER_FILE,
            max_files: 1000,
            vector_count: 5000,
            insert_bulk_size: 5000,
            sweep: SweepConfig::default(),
            search_concurrency: 1,
            query_seed: None,
            load_poll_interval_ms: 500,
            load_timeout_ms: 300_000,
            endpoint: "http://localhost:19530".to_string(),
            token: None,
            request_timeout_secs: 60,
        }
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config TOML: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Set the target vector count.
    pub fn with_vector_count(mut self, n: usize) -> Self {
        self.vector_count = n;
        self
    }

    /// Set the insert batch bound.
    pub fn with_insert_bulk_size(mut self, n: usize) -> Self {
        self.insert_bulk_size = n;
        self
    }

    /// Set vector dimension.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    /// Set the search sweep.
    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }

    /// Set number of concurrent searches during the sweep.
    pub fn with_search_concurrency(mut self, n: usize) -> Self {
        self.search_concurrency = n;
        self
    }

    /// Seed query generation.
    pub fn with_query_seed(mut self, seed: u64) -> Self {
        self.query_seed = Some(seed);
        self
    }

    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_fixture_dir(mut self, dir: PathBuf) -> Self {
        self.fixture_dir = dir;
        self
    }

    pub fn with_rows_per_file(mut self, rows: usize) -> Self {
        self.rows_per_file = rows;
        self
    }

    /// Set load readiness polling.
    pub fn with_load_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.load_poll_interval_ms = interval.as_millis() as u64;
        self.load_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn load_poll_interval(&self) -> Duration {
        Duration::from_millis(self.load_poll_interval_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject configurations that cannot produce a well-formed run.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(BenchError::config("dim must be > 0"));
        }
        if self.insert_bulk_size == 0 {
            return Err(BenchError::config("insert_bulk_size must be > 0"));
        }
        if self.vector_count == 0 {
            return Err(BenchError::config("vector_count must be > 0"));
        }
        if self.vector_count % self.insert_bulk_size != 0 {
            return Err(BenchError::config(format!(
                "vector_count ({}) must be a multiple of insert_bulk_size ({})",
                self.vector_count, self.insert_bulk_size
            )));
        }
        if self.rows_per_file == 0 {
            return Err(BenchError::config("rows_per_file must be > 0"));
        }
        if self.search_concurrency == 0 {
            return Err(BenchError::config("search_concurrency must be >= 1"));
        }
        if self.index_type.is_clustered() && self.nlist == 0 {
            return Err(BenchError::config("nlist must be > 0 for clustered indexes"));
        }
        self.sweep.validate()
    }

    /// Collection description derived from this configuration.
    pub fn collection_spec(&self) -> Result<CollectionSpec> {
        CollectionSpec::new(
            self.collection.clone(),
            self.field.clone(),
            self.dim,
            self.metric,
            IndexParams {
                index_type: self.index_type,
                nlist: self.nlist,
            },
        )
    }

    /// Location and naming of the fixture files.
    pub fn fixture_layout(&self) -> FixtureLayout {
        FixtureLayout {
            dir: self.fixture_dir.clone(),
            prefix: self.fixture_prefix.clone(),
            suffix: self.fixture_suffix.clone(),
            rows_per_file: self.rows_per_file,
            max_files: self.max_files,
        }
    }
}

//! Data model shared by the runner and the database clients.

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Distance metric understood by the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MetricType {
    /// Euclidean distance
    #[default]
    L2,
    /// Inner product
    IP,
    /// Cosine similarity
    #[serde(rename = "COSINE")]
    Cosine,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::IP => "IP",
            MetricType::Cosine => "COSINE",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Ok(MetricType::L2),
            "IP" => Ok(MetricType::IP),
            "COSINE" => Ok(MetricType::Cosine),
            other => Err(format!("unknown metric type: {}", other)),
        }
    }
}

/// Index families the harness knows how to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    Flat,
    #[default]
    IvfFlat,
    IvfSq8,
    IvfPq,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Flat => "FLAT",
            IndexType::IvfFlat => "IVF_FLAT",
            IndexType::IvfSq8 => "IVF_SQ8",
            IndexType::IvfPq => "IVF_PQ",
        }
    }

    /// Whether the index partitions vectors into `nlist` clusters and so
    /// honours `nprobe` at search time.
    pub fn is_clustered(&self) -> bool {
        !matches!(self, IndexType::Flat)
    }
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IndexType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FLAT" => Ok(IndexType::Flat),
            "IVF_FLAT" => Ok(IndexType::IvfFlat),
            "IVF_SQ8" => Ok(IndexType::IvfSq8),
            "IVF_PQ" => Ok(IndexType::IvfPq),
            other => Err(format!("unknown index type: {}", other)),
        }
    }
}

/// Index build parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    pub index_type: IndexType,
    /// Number of clusters for IVF-family indexes.
    pub nlist: u32,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            index_type: IndexType::IvfFlat,
            nlist: 1024,
        }
    }
}

/// Everything needed to (re)create the collection under test.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub name: String,
    /// Name of the float vector field.
    pub field: String,
    pub dim: usize,
    pub metric: MetricType,
    pub index: IndexParams,
}

impl CollectionSpec {
    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        dim: usize,
        metric: MetricType,
        index: IndexParams,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(BenchError::config("collection dimension must be > 0"));
        }
        let name = name.into();
        if name.is_empty() {
            return Err(BenchError::config("collection name must not be empty"));
        }
        Ok(Self {
            name,
            field: field.into(),
            dim,
            metric,
            index,
        })
    }
}

/// A batch of vectors bound for one insert call.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBatch {
    vectors: Vec<Vec<f32>>,
}

impl InsertBatch {
    /// Build a batch, checking every row against the collection dimension.
    pub fn new(vectors: Vec<Vec<f32>>, dim: usize) -> Result<Self> {
        if let Some((row, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(BenchError::config(format!(
                "insert batch row {} has dimension {}, collection expects {}",
                row,
                v.len(),
                dim
            )));
        }
        Ok(Self { vectors })
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// One point of the search sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Number of query vectors in the call.
    pub nq: usize,
    /// Results per query.
    pub topk: usize,
    /// Clusters probed per query.
    pub nprobe: usize,
}

impl SearchRequest {
    pub fn new(nq: usize, topk: usize, nprobe: usize) -> Result<Self> {
        if nq == 0 || topk == 0 || nprobe == 0 {
            return Err(BenchError::config(format!(
                "search parameters must be >= 1 (nq={}, topk={}, nprobe={})",
                nq, topk, nprobe
            )));
        }
        Ok(Self { nq, topk, nprobe })
    }
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: i64,
    pub distance: f32,
}

/// Hits grouped per query vector, in query order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub per_query: Vec<Vec<Hit>>,
}

impl SearchHits {
    pub fn num_queries(&self) -> usize {
        self.per_query.len()
    }

    pub fn total_hits(&self) -> usize {
        self.per_query.iter().map(Vec::len).sum()
    }
}

/// Collection statistics reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionStats {
    pub row_count: u64,
}

/// Serving state of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    /// Load in progress, with percent complete when the backend reports it.
    Loading(Option<u8>),
    Loaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_spec_rejects_zero_dim() {
        let err = CollectionSpec::new("c", "f", 0, MetricType::L2, IndexParams::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_insert_batch_checks_width() {
        assert!(InsertBatch::new(vec![vec![0.0; 4], vec![0.0; 4]], 4).is_ok());
        let err = InsertBatch::new(vec![vec![0.0; 4], vec![0.0; 3]], 4).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_search_request_bounds() {
        assert!(SearchRequest::new(1, 1, 1).is_ok());
        assert!(SearchRequest::new(0, 10, 10).is_err());
        assert!(SearchRequest::new(1, 0, 10).is_err());
        assert!(SearchRequest::new(1, 10, 0).is_err());
    }

    #[test]
    fn test_enum_names() {
        assert_eq!(IndexType::IvfFlat.to_string(), "IVF_FLAT");
        assert_eq!("ivf_sq8".parse::<IndexType>().unwrap(), IndexType::IvfSq8);
        assert_eq!("cosine".parse::<MetricType>().unwrap(), MetricType::Cosine);
        assert!("hamming".parse::<MetricType>().is_err());
        assert!(!IndexType::Flat.is_clustered());
    }

    #[test]
    fn test_enum_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            metric: MetricType,
            index_type: IndexType,
        }
        let w: Wrapper = toml::from_str("metric = \"IP\"\nindex_type = \"IVF_FLAT\"").unwrap();
        assert_eq!(w.metric, MetricType::IP);
        assert_eq!(w.index_type, IndexType::IvfFlat);
    }
}

// Benchmark harness for external vector database services

pub mod client;
pub mod config;
pub mod error;
pub mod fixture;
pub mod metrics;
pub mod runner;
pub mod schema;

pub use client::{DatabaseClient, InMemoryClient, MilvusClient};
pub use config::{BenchConfig, SweepConfig};
pub use error::{BenchError, ErrorKind, Result};
pub use fixture::{NpyLoader, VectorFixtureSource};
pub use metrics::{BenchmarkReport, PhaseMeasurement, ReportEntry, SearchKey};
pub use runner::{BenchmarkRunner, RunFailure, RunOutcome, RunState};
pub use schema::{
    CollectionSpec, CollectionStats, IndexParams, IndexType, InsertBatch, LoadState, MetricType,
    SearchHits, SearchRequest,
};

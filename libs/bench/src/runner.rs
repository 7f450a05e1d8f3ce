//! Benchmark run state machine.
//!
//! A run walks the phases strictly in order:
//!
//! ```text
//! Init -> CollectionReady -> DataLoaded -> Flushed -> Indexed -> Loaded -> Searching -> Done
//! ```
//!
//! and moves to `Failed` on the first fatal error. Measurements recorded
//! before the failure stay in the report; [`RunOutcome`] tells callers
//! whether the run completed and, if not, where and why it stopped.
//!
//! ## Search sweep
//!
//! The sweep visits every `(nq, topk, nprobe)` point. Query vectors are
//! synthesized before the point is issued and only the search call itself
//! is timed. With `search_concurrency > 1` a pool of tokio workers pulls
//! jobs from an MPMC queue; results are re-ordered by sweep index before
//! recording so report order never depends on completion order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::client::DatabaseClient;
use crate::config::BenchConfig;
use crate::error::{BenchError, ErrorKind, Result};
use crate::fixture::{VectorFixtureSource, QUERY_STREAM};
use crate::metrics::{
    BenchmarkReport, PhaseMeasurement, SearchKey, CREATE_INDEX_COST, FLUSH_COST, INSERT_SPEED,
};
use crate::schema::{CollectionSpec, InsertBatch, LoadState, SearchRequest};

/// Position of a run in the phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RunState {
    Init,
    CollectionReady,
    DataLoaded,
    Flushed,
    Indexed,
    Loaded,
    Searching,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::CollectionReady => "collection-ready",
            RunState::DataLoaded => "data-loaded",
            RunState::Flushed => "flushed",
            RunState::Indexed => "indexed",
            RunState::Loaded => "loaded",
            RunState::Searching => "searching",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    /// Last state reached before the failing phase.
    pub reached: RunState,
    pub kind: ErrorKind,
    /// Rendered error, including the backend cause chain.
    pub message: String,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {}: {}", self.kind, self.reached, self.message)
    }
}

/// Report plus the failure that cut the run short, if any.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: BenchmarkReport,
    pub failure: Option<RunFailure>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drives one benchmark run against an injected client.
pub struct BenchmarkRunner<C: DatabaseClient + 'static> {
    client: Arc<C>,
    config: BenchConfig,
    spec: CollectionSpec,
    points: Vec<SearchRequest>,
    state: RunState,
}

impl<C: DatabaseClient + 'static> BenchmarkRunner<C> {
    /// Validate `config` and bind it to `client`.
    pub fn new(client: C, config: BenchConfig) -> Result<Self> {
        Self::from_arc(Arc::new(client), config)
    }

    /// Like [`new`](Self::new) for a client shared with the caller.
    pub fn from_arc(client: Arc<C>, config: BenchConfig) -> Result<Self> {
        config.validate()?;
        let spec = config.collection_spec()?;
        let points = config.sweep.points()?;
        Ok(Self {
            client,
            config,
            spec,
            points,
            state: RunState::Init,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Sweep points in report order.
    pub fn points(&self) -> &[SearchRequest] {
        &self.points
    }

    /// Run every phase, inserting rows pulled from `fixtures`.
    ///
    /// Never returns an error: a failing phase ends the run and is reported
    /// through [`RunOutcome::failure`] next to the measurements taken so far.
    pub async fn run(&mut self, fixtures: &mut VectorFixtureSource) -> RunOutcome {
        let mut report = BenchmarkReport::new();
        info!(
            backend = self.client.backend_name(),
            collection = %self.spec.name,
            vectors = self.config.vector_count,
            sweep_points = self.points.len(),
            "Starting benchmark run"
        );

        match self.run_phases(fixtures, &mut report).await {
            Ok(()) => {
                self.state = RunState::Done;
                info!(entries = report.len(), "Benchmark run complete");
                RunOutcome {
                    report,
                    failure: None,
                }
            }
            Err(err) => {
                let reached = self.state;
                self.state = RunState::Failed;
                error!(state = %reached, kind = %err.kind(), "Benchmark run failed: {}", err);
                RunOutcome {
                    report,
                    failure: Some(RunFailure {
                        reached,
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                }
            }
        }
    }

    async fn run_phases(
        &mut self,
        fixtures: &mut VectorFixtureSource,
        report: &mut BenchmarkReport,
    ) -> Result<()> {
        self.setup_collection()
            .instrument(info_span!("phase", name = "setup"))
            .await?;
        self.state = RunState::CollectionReady;

        let insert = self
            .insert_vectors(fixtures)
            .instrument(info_span!("phase", name = "insert"))
            .await?;
        report.record(INSERT_SPEED, insert);
        self.state = RunState::DataLoaded;

        let flush = self
            .flush_and_verify()
            .instrument(info_span!("phase", name = "flush"))
            .await?;
        report.record(FLUSH_COST, flush);
        self.state = RunState::Flushed;

        let index = self
            .create_index()
            .instrument(info_span!("phase", name = "index"))
            .await?;
        report.record(CREATE_INDEX_COST, index);
        self.state = RunState::Indexed;

        self.load_collection()
            .instrument(info_span!("phase", name = "load"))
            .await?;
        self.state = RunState::Loaded;

        self.state = RunState::Searching;
        self.search_sweep(report)
            .instrument(info_span!("phase", name = "search"))
            .await
    }

    /// Drop any leftover collection and create it fresh.
    async fn setup_collection(&self) -> Result<()> {
        let name = &self.spec.name;
        info!("Creating collection");

        if self
            .client
            .has_collection(name)
            .await
            .map_err(BenchError::backend)?
        {
            debug!(collection = %name, "collection exists");
            self.client
                .drop_collection(name)
                .await
                .map_err(BenchError::backend)?;
            info!(collection = %name, "Dropped existing collection");
        }

        self.client
            .create_collection(&self.spec)
            .await
            .map_err(BenchError::backend)?;
        info!(collection = %name, dim = self.spec.dim, metric = %self.spec.metric, "Created collection");

        if !self
            .client
            .has_collection(name)
            .await
            .map_err(BenchError::backend)?
        {
            return Err(BenchError::SetupInvariantViolation {
                collection: name.clone(),
            });
        }
        Ok(())
    }

    /// Insert `vector_count` rows in `insert_bulk_size` batches.
    ///
    /// The timing covers fixture reads as well as the insert calls.
    async fn insert_vectors(&self, fixtures: &mut VectorFixtureSource) -> Result<PhaseMeasurement> {
        let target = self.config.vector_count;
        let bulk = self.config.insert_bulk_size;
        info!(target, bulk, "Inserting vectors");

        let start = Instant::now();
        let mut inserted = 0usize;
        while inserted < target {
            let count = bulk.min(target - inserted);
            let vectors = fixtures.next_batch(count, self.spec.dim)?;
            let batch = InsertBatch::new(vectors, self.spec.dim)?;
            let acked = self
                .client
                .insert(&self.spec, &batch)
                .await
                .map_err(BenchError::backend)?;
            if acked != batch.len() as u64 {
                warn!(sent = batch.len(), acked, "insert acknowledged a different row count");
            }
            inserted += batch.len();
            debug!(inserted, target, "insert batch done");
        }
        let elapsed = start.elapsed();

        let measurement = PhaseMeasurement::rate(target, elapsed);
        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            rate = measurement.value,
            "Insert complete"
        );
        Ok(measurement)
    }

    /// Flush, then check the backend sees exactly the inserted rows.
    ///
    /// The cost covers the flush and the stats call.
    async fn flush_and_verify(&self) -> Result<PhaseMeasurement> {
        let name = self.spec.name.as_str();
        info!("Flushing collection");

        let start = Instant::now();
        self.client
            .flush(&[name])
            .await
            .map_err(BenchError::backend)?;
        let stats = self
            .client
            .get_stats(name)
            .await
            .map_err(BenchError::backend)?;
        let elapsed = start.elapsed();
        debug!(row_count = stats.row_count, "collection stats");

        let expected = self.config.vector_count as u64;
        if stats.row_count != expected {
            return Err(BenchError::ConsistencyInvariantViolation {
                expected,
                actual: stats.row_count,
            });
        }
        info!(elapsed_secs = elapsed.as_secs_f64(), rows = stats.row_count, "Flush complete");
        Ok(PhaseMeasurement::cost(elapsed))
    }

    async fn create_index(&self) -> Result<PhaseMeasurement> {
        info!(
            index_type = %self.spec.index.index_type,
            nlist = self.spec.index.nlist,
            field = %self.spec.field,
            "Creating index"
        );
        let start = Instant::now();
        self.client
            .create_index(&self.spec)
            .await
            .map_err(BenchError::backend)?;
        let elapsed = start.elapsed();
        info!(elapsed_secs = elapsed.as_secs_f64(), "Index created");
        Ok(PhaseMeasurement::cost(elapsed))
    }

    /// Load the collection and poll until the backend reports it serving.
    async fn load_collection(&self) -> Result<()> {
        let name = self.spec.name.as_str();
        let interval = self.config.load_poll_interval();
        let timeout = self.config.load_timeout();
        info!("Loading collection");

        self.client
            .load_collection(name)
            .await
            .map_err(BenchError::backend)?;

        let start = tokio::time::Instant::now();
        loop {
            match self
                .client
                .load_state(name)
                .await
                .map_err(BenchError::backend)?
            {
                LoadState::Loaded => break,
                LoadState::Loading(progress) => debug!(?progress, "collection loading"),
                LoadState::NotLoaded => debug!("collection not loaded yet"),
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(BenchError::LoadTimeout {
                    collection: name.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(interval).await;
        }

        info!(waited_secs = start.elapsed().as_secs_f64(), "Collection loaded");
        Ok(())
    }

    /// One job per sweep point. Queries come from their own stream so a
    /// seeded random insert fixture never hands out the same rows.
    fn search_jobs(&self) -> Result<Vec<SearchJob>> {
        let mut queries = VectorFixtureSource::random_stream(self.config.query_seed, QUERY_STREAM);
        let mut jobs = Vec::with_capacity(self.points.len());
        for (index, request) in self.points.iter().enumerate() {
            let vectors = queries.next_batch(request.nq, self.spec.dim)?;
            jobs.push(SearchJob {
                index,
                request: *request,
                queries: vectors,
            });
        }
        Ok(jobs)
    }

    async fn search_sweep(&self, report: &mut BenchmarkReport) -> Result<()> {
        let workers = self.config.search_concurrency.min(self.points.len()).max(1);
        info!(points = self.points.len(), workers, "Running search sweep");

        let jobs = self.search_jobs()?;

        if workers == 1 {
            for job in jobs {
                let elapsed = timed_search(self.client.as_ref(), &self.spec, &job).await?;
                record_search(report, &job.request, elapsed);
            }
            return Ok(());
        }

        let mut results = self.run_search_pool(jobs, workers).await;
        results.sort_by_key(|(index, _)| *index);

        let mut seen = 0;
        for (index, result) in results {
            if index != seen {
                // A worker vanished without reporting this point.
                return Err(BenchError::backend(anyhow::anyhow!(
                    "search worker lost sweep point {}",
                    seen
                )));
            }
            let (request, elapsed) = result?;
            record_search(report, &request, elapsed);
            seen += 1;
        }
        if seen != self.points.len() {
            return Err(BenchError::backend(anyhow::anyhow!(
                "search worker lost sweep point {}",
                seen
            )));
        }
        Ok(())
    }

    /// Run `jobs` on `workers` tasks. Returns one result per job that was
    /// picked up; after the first failure no new jobs are started.
    async fn run_search_pool(
        &self,
        jobs: Vec<SearchJob>,
        workers: usize,
    ) -> Vec<(usize, Result<(SearchRequest, Duration)>)> {
        let (job_tx, job_rx) = flume::unbounded::<SearchJob>();
        for job in jobs {
            // Receiver is alive until the workers are spawned below.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let spec = Arc::new(self.spec.clone());

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let client = Arc::clone(&self.client);
            let spec = Arc::clone(&spec);
            let stop = Arc::clone(&stop);
            handles.push(tokio::spawn(
                async move {
                    // Check before dequeueing: every dequeued job must report
                    // back so earlier sweep points are never missing.
                    while !stop.load(Ordering::Relaxed) {
                        let Ok(job) = job_rx.recv_async().await else {
                            break;
                        };
                        let result = timed_search(client.as_ref(), &spec, &job)
                            .await
                            .map(|elapsed| (job.request, elapsed));
                        if result.is_err() {
                            stop.store(true, Ordering::Relaxed);
                        }
                        if result_tx.send((job.index, result)).is_err() {
                            break;
                        }
                    }
                }
                .instrument(info_span!("search_worker", worker_id)),
            ));
        }
        drop(result_tx);

        let mut results = Vec::new();
        while let Some(item) = result_rx.recv().await {
            results.push(item);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("search worker panicked: {}", e);
            }
        }
        results
    }
}

/// One sweep point with its pre-generated queries.
struct SearchJob {
    index: usize,
    request: SearchRequest,
    queries: Vec<Vec<f32>>,
}

async fn timed_search<C: DatabaseClient + ?Sized>(
    client: &C,
    spec: &CollectionSpec,
    job: &SearchJob,
) -> Result<Duration> {
    let start = Instant::now();
    let hits = client
        .search(spec, &job.request, &job.queries)
        .await
        .map_err(BenchError::backend)?;
    let elapsed = start.elapsed();

    if hits.num_queries() != job.request.nq {
        return Err(BenchError::backend(anyhow::anyhow!(
            "search {} returned {} hit lists for nq={}",
            SearchKey::from(&job.request),
            hits.num_queries(),
            job.request.nq
        )));
    }
    debug!(
        key = %SearchKey::from(&job.request),
        hits = hits.total_hits(),
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "search done"
    );
    Ok(elapsed)
}

fn record_search(report: &mut BenchmarkReport, request: &SearchRequest, elapsed: Duration) {
    report.record(
        SearchKey::from(request).to_string(),
        PhaseMeasurement::cost(elapsed),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{InMemoryClient, Operation};
    use crate::config::SweepConfig;
    use crate::metrics::expected_keys;
    use crate::schema::IndexParams;

    fn small_config() -> BenchConfig {
        BenchConfig::default()
            .with_dim(8)
            .with_vector_count(5000)
            .with_insert_bulk_size(5000)
            .with_sweep(SweepConfig::new(vec![1, 10], vec![10], vec![10]))
            .with_query_seed(7)
            .with_load_polling(Duration::from_millis(10), Duration::from_secs(1))
    }

    async fn run_with(client: InMemoryClient, config: BenchConfig) -> (RunOutcome, RunState) {
        let mut runner = BenchmarkRunner::new(client, config).unwrap();
        let mut fixtures = VectorFixtureSource::random(Some(1));
        let outcome = runner.run(&mut fixtures).await;
        (outcome, runner.state())
    }

    #[tokio::test]
    async fn test_end_to_end_report_keys() {
        let client = InMemoryClient::new();
        let (outcome, state) = run_with(client.clone(), small_config()).await;

        assert!(outcome.is_success(), "{:?}", outcome.failure);
        assert_eq!(state, RunState::Done);
        let keys: Vec<&str> = outcome.report.keys().collect();
        assert_eq!(
            keys,
            vec![
                "insert-speed",
                "flush-cost",
                "create-index-cost",
                "search-q1-k10-p10-cost",
                "search-q10-k10-p10-cost",
            ]
        );
        assert_eq!(client.row_count("benchmark"), Some(5000));
        assert!(client.is_indexed("benchmark"));
    }

    #[tokio::test]
    async fn test_row_count_matches_for_multiple_batches() {
        let client = InMemoryClient::new();
        let config = small_config()
            .with_vector_count(20_000)
            .with_insert_bulk_size(5000);
        let (outcome, _) = run_with(client.clone(), config).await;

        assert!(outcome.is_success());
        assert_eq!(client.row_count("benchmark"), Some(20_000));
        assert_eq!(client.call_count(Operation::Insert), 4);
    }

    #[tokio::test]
    async fn test_phase_call_order() {
        let client = InMemoryClient::new();
        run_with(client.clone(), small_config()).await;

        let calls = client.calls();
        let first = |op: Operation| calls.iter().position(|c| *c == op).unwrap();
        assert!(first(Operation::CreateCollection) < first(Operation::Insert));
        assert!(first(Operation::Insert) < first(Operation::Flush));
        assert!(first(Operation::Flush) < first(Operation::CreateIndex));
        assert!(first(Operation::CreateIndex) < first(Operation::LoadCollection));
        assert!(first(Operation::LoadCollection) < first(Operation::Search));
    }

    #[tokio::test]
    async fn test_existing_collection_is_dropped() {
        let config = small_config();
        let stale = config.collection_spec().unwrap();
        let client = InMemoryClient::new().with_existing_collection(stale, 123);
        let (outcome, _) = run_with(client.clone(), config).await;

        assert!(outcome.is_success());
        assert_eq!(client.call_count(Operation::DropCollection), 1);
        assert_eq!(client.row_count("benchmark"), Some(5000));
    }

    #[tokio::test]
    async fn test_setup_violation() {
        let client = InMemoryClient::new().with_ignored_create();
        let (outcome, state) = run_with(client.clone(), small_config()).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::SetupInvariantViolation);
        assert_eq!(failure.reached, RunState::Init);
        assert_eq!(state, RunState::Failed);
        assert!(outcome.report.is_empty());
        assert_eq!(client.call_count(Operation::Insert), 0);
    }

    #[tokio::test]
    async fn test_flush_mismatch_stops_before_index() {
        let client = InMemoryClient::new().with_lost_rows(1);
        let (outcome, _) = run_with(client.clone(), small_config()).await;

        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.kind, ErrorKind::ConsistencyInvariantViolation);
        assert_eq!(failure.reached, RunState::DataLoaded);
        assert!(failure.message.contains("expected 5000"));
        assert!(failure.message.contains("4999"));

        assert!(outcome.report.contains_key(INSERT_SPEED));
        assert!(!outcome.report.contains_key(FLUSH_COST));
        assert!(!outcome.report.contains_key(CREATE_INDEX_COST));
        assert_eq!(outcome.report.len(), 1);
        assert_eq!(client.call_count(Operation::CreateIndex), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_during_insert() {
        let client = InMemoryClient::new().with_failure(Operation::Insert, 1);
        let config = small_config().with_vector_count(15_000);
        let (outcome, _) = run_with(client, config).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::Backend);
        assert_eq!(failure.reached, RunState::CollectionReady);
        assert!(failure.message.contains("injected failure"));
        assert!(outcome.report.is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_keeps_earlier_points() {
        // Second search of the sweep fails.
        let client = InMemoryClient::new().with_failure(Operation::Search, 1);
        let (outcome, _) = run_with(client, small_config()).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::Backend);
        assert_eq!(failure.reached, RunState::Searching);
        assert!(outcome.report.contains_key("search-q1-k10-p10-cost"));
        assert!(!outcome.report.contains_key("search-q10-k10-p10-cost"));
        assert_eq!(outcome.report.len(), 4);
    }

    #[tokio::test]
    async fn test_hit_list_count_must_match_nq() {
        let client = InMemoryClient::new().with_search_hit_lists(1);
        let (outcome, _) = run_with(client, small_config()).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::Backend);
        assert!(failure.message.contains("nq=10"));
        assert!(outcome.report.contains_key("search-q1-k10-p10-cost"));
    }

    #[tokio::test]
    async fn test_sweep_produces_one_key_per_point() {
        let sweep = SweepConfig::new(vec![1, 10, 100], vec![1, 10], vec![4, 8]);
        let config = small_config().with_sweep(sweep.clone());
        let (outcome, _) = run_with(InMemoryClient::new(), config).await;

        assert!(outcome.is_success());
        let expected = expected_keys(&sweep.points().unwrap());
        assert_eq!(expected.len(), 3 + 12);
        let keys: Vec<String> = outcome.report.keys().map(String::from).collect();
        assert_eq!(keys, expected);
        assert!(outcome.report.missing(&expected).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sweep_keeps_sweep_order() {
        let sweep = SweepConfig::new(vec![1, 10, 100], vec![1, 10, 100], vec![10]);
        let config = small_config()
            .with_sweep(sweep.clone())
            .with_search_concurrency(4);
        let client = InMemoryClient::new();
        let (outcome, _) = run_with(client.clone(), config).await;

        assert!(outcome.is_success(), "{:?}", outcome.failure);
        let keys: Vec<String> = outcome.report.keys().map(String::from).collect();
        assert_eq!(keys, expected_keys(&sweep.points().unwrap()));
        assert_eq!(client.call_count(Operation::Search), 9);
    }

    #[tokio::test]
    async fn test_concurrent_sweep_failure_records_prefix() {
        let sweep = SweepConfig::new(vec![1, 2, 3, 4], vec![10], vec![10]);
        let config = small_config().with_sweep(sweep).with_search_concurrency(2);
        let client = InMemoryClient::new().with_failure(Operation::Search, 0);
        let (outcome, _) = run_with(client, config).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::Backend);
        // Search keys form a gap-free prefix of the sweep.
        let search_keys: Vec<&str> = outcome
            .report
            .keys()
            .filter(|k| k.starts_with("search-"))
            .collect();
        let all = [
            "search-q1-k10-p10-cost",
            "search-q2-k10-p10-cost",
            "search-q3-k10-p10-cost",
            "search-q4-k10-p10-cost",
        ];
        assert!(search_keys.len() < all.len());
        assert_eq!(search_keys, all[..search_keys.len()].to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_polls_until_loaded() {
        let client = InMemoryClient::new().with_loading_polls(3);
        let (outcome, _) = run_with(client.clone(), small_config()).await;

        assert!(outcome.is_success());
        assert_eq!(client.call_count(Operation::LoadState), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout() {
        let client = InMemoryClient::new().with_loading_polls(1000);
        let config = small_config()
            .with_load_polling(Duration::from_millis(100), Duration::from_secs(1));
        let (outcome, _) = run_with(client.clone(), config).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::LoadTimeout);
        assert_eq!(failure.reached, RunState::Indexed);
        assert!(outcome.report.contains_key(CREATE_INDEX_COST));
        assert_eq!(client.call_count(Operation::Search), 0);
    }

    #[tokio::test]
    async fn test_fixture_exhaustion_fails_insert() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config().with_fixture_dir(dir.path().to_path_buf());
        let mut runner = BenchmarkRunner::new(InMemoryClient::new(), config.clone()).unwrap();
        let mut fixtures = VectorFixtureSource::files(config.fixture_layout());
        let outcome = runner.run(&mut fixtures).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::FixtureExhausted);
        assert_eq!(failure.reached, RunState::CollectionReady);
    }

    #[test]
    fn test_queries_are_not_inserted_rows() {
        let config = small_config();
        let seed = config.query_seed;
        let runner = BenchmarkRunner::new(InMemoryClient::new(), config).unwrap();
        let inserted = VectorFixtureSource::random(seed).next_batch(11, 8).unwrap();

        let jobs = runner.search_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].queries.len(), 10);
        for job in &jobs {
            for query in &job.queries {
                assert!(!inserted.contains(query));
            }
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = small_config().with_vector_count(7000);
        let err = BenchmarkRunner::new(InMemoryClient::new(), config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_runner_exposes_points_in_sweep_order() {
        let runner = BenchmarkRunner::new(InMemoryClient::new(), small_config()).unwrap();
        assert_eq!(runner.state(), RunState::Init);
        assert_eq!(
            runner.points(),
            &[
                SearchRequest::new(1, 10, 10).unwrap(),
                SearchRequest::new(10, 10, 10).unwrap()
            ]
        );
        let spec = runner.config().collection_spec().unwrap();
        assert_eq!(spec.index, IndexParams::default());
    }
}

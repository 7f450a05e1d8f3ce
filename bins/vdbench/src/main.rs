//! Vector database benchmark CLI.
//!
//! Loads `vector_count` vectors into a fresh collection, flushes, builds an
//! index, loads the collection and times a search sweep. The JSON report is
//! printed to stdout and optionally written to a file.
//!
//! ```bash
//! # Milvus on localhost, default sweep, fixtures from /sift1b
//! vdbench 100000 -o report.json
//!
//! # Dry run without a database
//! vdbench 5000 --backend memory --random-fixtures --nq 1,10 --topk 10
//!
//! # Everything from a TOML file, concurrent sweep
//! vdbench 1000000 --config bench.toml --concurrency 4
//! ```
//!
//! A run that stops early still prints the partial report and exits 0; the
//! failure is logged with the phase it stopped in.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use vdbench::metrics::expected_keys;
use vdbench::{
    BenchConfig, BenchmarkRunner, DatabaseClient, InMemoryClient, MilvusClient, SweepConfig,
    VectorFixtureSource,
};
use vdbench_core::{build_info, telemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Milvus over its RESTful v2 API
    Milvus,
    /// In-process stand-in, for dry runs
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "vdbench")]
#[command(version, about = "Insert, index and search benchmark for vector databases")]
struct Cli {
    /// The number of vectors in the database
    vector_count: usize,

    /// Save report to the given file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long, value_enum, default_value_t = Backend::Milvus)]
    backend: Backend,

    /// Insert synthesized unit vectors instead of reading fixture files
    #[arg(long, default_value = "false")]
    random_fixtures: bool,

    /// Searches in flight during the sweep
    #[arg(long)]
    concurrency: Option<usize>,

    /// Query counts to sweep (comma-separated)
    #[arg(long, value_delimiter = ',')]
    nq: Option<Vec<usize>>,

    /// Result counts to sweep (comma-separated)
    #[arg(long, value_delimiter = ',')]
    topk: Option<Vec<usize>>,

    /// Probe counts to sweep (comma-separated)
    #[arg(long, value_delimiter = ',')]
    nprobe: Option<Vec<usize>>,

    /// Seed for query and random fixture synthesis
    #[arg(long)]
    seed: Option<u64>,
}

/// Layer command-line overrides on top of the config file (or defaults).
fn build_config(cli: &Cli) -> Result<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    config = config.with_vector_count(cli.vector_count);

    if let Some(endpoint) = &cli.endpoint {
        config = config.with_endpoint(endpoint.clone());
    }
    if let Some(concurrency) = cli.concurrency {
        config = config.with_search_concurrency(concurrency);
    }
    if let Some(seed) = cli.seed {
        config = config.with_query_seed(seed);
    }
    if cli.nq.is_some() || cli.topk.is_some() || cli.nprobe.is_some() {
        let sweep = SweepConfig::new(
            cli.nq.clone().unwrap_or_else(|| config.sweep.nq.clone()),
            cli.topk.clone().unwrap_or_else(|| config.sweep.topk.clone()),
            cli.nprobe.clone().unwrap_or_else(|| config.sweep.nprobe.clone()),
        );
        config = config.with_sweep(sweep);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run<C: DatabaseClient + 'static>(client: C, config: BenchConfig, cli: &Cli) -> Result<()> {
    println!("Backend: {}", client.backend_name());

    let mut fixtures = if cli.random_fixtures {
        VectorFixtureSource::random(config.query_seed)
    } else {
        VectorFixtureSource::files(config.fixture_layout())
    };

    let mut runner = BenchmarkRunner::new(client, config)?;
    let outcome = runner.run(&mut fixtures).await;

    println!("{}", outcome.report.render());
    if let Some(path) = &cli.output {
        println!("Output report to {}", path.display());
        outcome.report.persist(path)?;
    }

    match &outcome.failure {
        None => info!(entries = outcome.report.len(), "Benchmark finished"),
        Some(failure) => {
            let expected = expected_keys(runner.points());
            let missing = outcome.report.missing(&expected);
            warn!(
                state = %failure.reached,
                kind = %failure.kind,
                missing = missing.len(),
                "Benchmark stopped early: {}",
                failure.message
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_subscriber(cli.debug) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = build_config(&cli)?;
    println!("{}", build_info::banner("vdbench", env!("CARGO_PKG_VERSION")));

    match cli.backend {
        Backend::Milvus => {
            let client = MilvusClient::new(
                &config.endpoint,
                config.token.clone(),
                config.request_timeout(),
            )?;
            info!(endpoint = client.endpoint(), "Connecting to Milvus");
            run(client, config, &cli).await
        }
        Backend::Memory => run(InMemoryClient::new(), config, &cli).await,
    }
}

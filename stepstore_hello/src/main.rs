//! Step engine demonstration binary.
//!
//! Writes a 2D `Temperature` array, decomposed over a grid of `npx` by `npy` ranks, for a number of steps.
//! Every rank runs in this process, in parallel, unless `--rank` selects one.

use std::num::NonZeroU64;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use clap::Parser;
use rayon::prelude::*;
use stepstore::config::ConfigFile;
use stepstore::decomposition::{decompose, ArrayShape, ProcessGrid};
use stepstore::storage::transport_adapter::performance_metrics::PerformanceMetricsTransportAdapter;
use stepstore::storage::OpenMode;
use stepstore::transport::TransportConfig;
use stepstore::variable::{ElementType, Variable};
use stepstore::{EngineConfig, PutMode, StepEngine, StepMode};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the demonstration binary.
#[derive(Parser, Debug)]
#[command(name = "stepstore_hello")]
#[command(about = "Write a decomposed 2D array step by step with the stepstore engine")]
struct Args {
    /// Path to the JSON configuration file
    config_file: PathBuf,
    /// Number of processes in the X (slow) dimension
    npx: NonZeroU64,
    /// Number of processes in the Y (fast) dimension
    npy: NonZeroU64,
    /// Local array size in the X dimension per process
    ndx: NonZeroU64,
    /// Local array size in the Y dimension per process
    ndy: NonZeroU64,
    /// Number of output steps
    steps: u64,
    /// Time to wait between steps, in milliseconds
    sleeptime_ms: u64,
    /// Run only this rank
    #[arg(long)]
    rank: Option<u64>,
}

type Result<T> = std::result::Result<T, anyhow::Error>;

/// What one rank wrote.
#[derive(Debug)]
struct RankSummary {
    rank: u64,
    offset: Vec<u64>,
    steps: u64,
    objects: usize,
    bytes: usize,
}

/// The inputs shared by every rank.
struct Run<'a> {
    args: &'a Args,
    file: &'a ConfigFile,
    config: &'a EngineConfig,
    transport_config: &'a TransportConfig,
    grid: ProcessGrid,
    global_shape: ArrayShape,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 | 2 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The value of element (`x`, `y`) of the global array at `step`.
#[allow(clippy::cast_precision_loss)]
fn temperature(step: u64, x: u64, y: u64, gndy: u64) -> f64 {
    step as f64 + (x * gndy + y) as f64 / 1000.0
}

impl Run<'_> {
    fn run_rank(&self, rank: u64) -> Result<RankSummary> {
        let block = decompose(&self.global_shape, &self.grid, rank)?;
        let mut catalog = self.file.catalog()?;
        catalog.declare(Variable::from_decomposition(
            "Temperature",
            ElementType::Float64,
            &block,
        )?)?;
        let greetings: Vec<String> = catalog
            .iter()
            .filter(|variable| variable.element_type() == ElementType::String)
            .map(|variable| variable.name().to_string())
            .collect();
        for variable in catalog.iter().filter(|variable| {
            variable.name() != "Temperature" && variable.element_type() != ElementType::String
        }) {
            log::warn!(
                "rank {rank}: variable {} is declared but not written by this driver",
                variable.name()
            );
        }

        let transport = Arc::new(PerformanceMetricsTransportAdapter::new(
            self.transport_config
                .create_transport(self.config.storage_tier())?,
        ));
        let mut engine = StepEngine::open(
            "stepstore_hello",
            Arc::new(catalog),
            transport.clone(),
            self.config.clone(),
            rank,
            OpenMode::Write,
        )?;
        log::info!(
            "rank {rank}: writing block at {:?} of {:?}",
            block.offset(),
            block.global_shape()
        );

        let (offx, offy) = (block.offset()[0], block.offset()[1]);
        let (ndx, ndy) = (self.args.ndx.get(), self.args.ndy.get());
        let gndy = self.global_shape[1];
        for step in 0..self.args.steps {
            engine.begin_step(StepMode::Append, None)?;
            let values: Vec<f64> = (0..ndx)
                .flat_map(|i| (0..ndy).map(move |j| (offx + i, offy + j)))
                .map(|(x, y)| temperature(step, x, y, gndy))
                .collect();
            engine.put("Temperature", &values, PutMode::Deferred)?;
            for name in &greetings {
                let greeting = format!("Hello from rank {rank} at step {step}");
                engine.put(name, &[greeting], PutMode::Sync)?;
            }
            engine.end_step()?;
            if step + 1 < self.args.steps && self.args.sleeptime_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.args.sleeptime_ms));
            }
        }
        engine.close()?;

        Ok(RankSummary {
            rank,
            offset: block.offset().to_vec(),
            steps: self.args.steps,
            objects: transport.writes(),
            bytes: transport.bytes_written(),
        })
    }
}

/// Main entry point for the demonstration binary.
fn main() -> Result<()> {
    let args = Args::parse();

    let file = ConfigFile::from_path(&args.config_file)?;
    let config = file.engine_config()?;
    init_logging(config.verbose());
    let transport_config = file.transport_config(&config)?;

    let grid = ProcessGrid::new_2d(args.npx, args.npy);
    let global_shape = grid.global_shape(&[args.ndx.get(), args.ndy.get()])?;
    let num_ranks = grid
        .num_ranks()
        .ok_or_else(|| anyhow!("the process grid {grid} has too many ranks"))?;
    let ranks: Vec<u64> = match args.rank {
        Some(rank) if rank < num_ranks => vec![rank],
        Some(rank) => bail!("rank {rank} is not in the process grid {grid} of {num_ranks} ranks"),
        None => (0..num_ranks).collect(),
    };

    let run = Run {
        args: &args,
        file: &file,
        config: &config,
        transport_config: &transport_config,
        grid,
        global_shape,
    };
    let mut summaries = ranks
        .into_par_iter()
        .map(|rank| run.run_rank(rank))
        .collect::<Result<Vec<_>>>()?;
    summaries.sort_by_key(|summary| summary.rank);

    println!(
        "Temperature {:?} over a {} process grid, {} steps",
        run.global_shape, run.grid, args.steps
    );
    for summary in &summaries {
        println!(
            "rank {} at {:?}: {} steps, {} objects, {} bytes",
            summary.rank, summary.offset, summary.steps, summary.objects, summary.bytes
        );
    }
    println!(
        "total: {} objects, {} bytes",
        summaries.iter().map(|summary| summary.objects).sum::<usize>(),
        summaries.iter().map(|summary| summary.bytes).sum::<usize>()
    );

    Ok(())
}

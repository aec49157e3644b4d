// src/main.rs
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stratum_miner_rs::miner::{Job, Scheduler, Target, Work};
use stratum_miner_rs::network::{PoolClient, SessionEvent, SessionStateMachine};
use stratum_miner_rs::stats::reporter::format_hashrate;
use stratum_miner_rs::stats::{ShareResult, StatsReporter};
use stratum_miner_rs::utils::logging::init_bench_logging;
use stratum_miner_rs::{MinerError, cli, config, utils};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Main entry point for the Stratum miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts the mining operation with given configuration options
///
/// # Arguments
/// * `opts` - Command line options for mining operation
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads and validates configuration
/// 3. Sets up statistics reporting
/// 4. Starts the search thread
/// 5. Runs the pool session until it gives up or Ctrl-C
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(workers) = opts.workers {
        config.worker_threads = workers;
    }
    if let Some(url) = opts.url {
        config.pool.url = url;
        config.validate()?;
    }
    let endpoint = config.pool.endpoint()?;
    let threads = config.effective_threads();

    // Statistics reporting
    let reporter = StatsReporter::new(Duration::from_secs(config.report_interval_secs.max(1)));
    reporter.start_reporting();
    let share_results = reporter.share_sender();

    // Search thread -> session task
    let (share_sender, share_receiver) = mpsc::unbounded_channel();
    let scheduler = Arc::new(
        Scheduler::new(share_sender, config.batch_size).with_hash_reporting(reporter.hash_sender()),
    );
    let search = scheduler.start_mining(threads)?;

    let (event_sender, event_receiver) = mpsc::unbounded_channel();
    let machine = SessionStateMachine::new(
        config.pool.session_config(),
        config.ledger.clone(),
        scheduler.clone(),
    )
    .with_events(event_sender);
    let mut client = PoolClient::new(endpoint, machine, share_receiver, config.client_options());

    log::info!(
        "Mining on {} as {} with {} lanes",
        config.pool.url,
        config.pool.worker_identity(),
        threads
    );

    let rt = Runtime::new()?;
    let result = rt.block_on(async {
        tokio::spawn(forward_share_results(event_receiver, share_results));

        tokio::select! {
            result = client.run() => result,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, shutting down");
                Ok(())
            }
        }
    });

    scheduler.stop();
    if search.join().is_err() {
        log::error!("Search thread panicked");
    }

    let counters = client.session().counters();
    log::info!(
        "Shares: {} sent, {} accepted, {} rejected, {} stale, {} lost",
        counters.sent,
        counters.accepted,
        counters.rejected,
        counters.stale,
        counters.lost
    );
    log::logger().flush();

    result
}

/// Relays share outcomes from session events into the stats reporter
async fn forward_share_results(
    mut events: UnboundedReceiver<SessionEvent>,
    results: crossbeam_channel::Sender<ShareResult>,
) {
    while let Some(event) = events.recv().await {
        if let Some(result) = event.share_result() {
            if results.send(result).is_err() {
                break;
            }
        }
    }
}

/// Runs the SHA-256d benchmark
///
/// # Arguments
/// * `opts` - Benchmark configuration options
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Publishes a synthetic job with an unreachable target
/// 3. Runs the search thread for the requested duration
/// 4. Collects and reports performance statistics
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    init_bench_logging();

    let (share_sender, _share_receiver) = mpsc::unbounded_channel();
    let (hash_sender, hash_receiver) = crossbeam_channel::unbounded();
    let scheduler = Scheduler::new(share_sender, opts.batch_size).with_hash_reporting(hash_sender);
    scheduler.publish(benchmark_work()?);

    log::info!(
        "Starting SHA-256d benchmark on {} threads for {} seconds",
        opts.threads,
        opts.duration
    );

    let duration = Duration::from_secs(opts.duration);
    let start_time = Instant::now();
    let search = scheduler.start_mining(opts.threads)?;

    let mut total = 0u64;
    let mut since_log = 0u64;
    let mut last_log = Instant::now();
    while start_time.elapsed() < duration {
        match hash_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(count) => {
                total += count;
                since_log += count;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        // Log progress every second
        if last_log.elapsed() >= Duration::from_secs(1) {
            log::debug!(
                "{}",
                format_hashrate(since_log as f64 / last_log.elapsed().as_secs_f64())
            );
            since_log = 0;
            last_log = Instant::now();
        }
    }

    scheduler.stop();
    search
        .join()
        .map_err(|_| MinerError::TaskError("Search thread panicked".into()))?;
    total += hash_receiver.try_iter().sum::<u64>();

    // Report final results
    let elapsed = start_time.elapsed().as_secs_f64();
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", total);
    log::info!("Average hashrate: {}", format_hashrate(total as f64 / elapsed));
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Synthetic job for the benchmark; its target is never met in practice.
fn benchmark_work() -> Result<Work, MinerError> {
    let job = Job::from_hex(
        "benchmark",
        &"00".repeat(32),
        "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff08",
        "ffffffff0100f2052a01000000000000000000",
        &[],
        "20000000",
        "1d00ffff",
        "00000000",
        true,
    )?;

    Ok(Work::new(
        Arc::new(job),
        1,
        Target::from_integer_difficulty(u64::MAX),
        vec![0u8; 4],
        4,
    ))
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let config = config::generate_template();
    std::fs::write(&opts.output, config)?;
    println!("Configuration template written to {}", opts.output.display());
    Ok(())
}

// src/cli/commands.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stratum Miner CLI - Stratum V1 SHA-256d pool miner in Rust
#[derive(Parser, Debug)]
#[command(name = "stratum-miner-rs")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, run benchmarks, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Connect to the configured pool and mine
    Start(StartOptions),

    /// Measure SHA-256d hashrate
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Number of search lanes to use (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Pool URL, e.g. stratum+tcp://host:3333 (overrides config)
    #[arg(short, long)]
    pub url: Option<String>,
}

/// Options for running mining benchmarks
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 60)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Nonces per lane between progress reports
    #[arg(short, long, default_value_t = 50_000)]
    pub batch_size: u32,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}

// src/cli/mod.rs
//! Command-line interface

/// Clap definitions for the `start`, `benchmark` and `config` subcommands
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, StartOptions};

// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Each subcommand maps onto one operation of the scheduler state machine
//! (or onto batch submission). The queue is not a long-running service:
//! every invocation performs one bounded query -> decide -> persist cycle
//! and returns.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `simqueue`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "simqueue",
    version,
    about = "Split simulation scripts into batch job graphs and drive them on a compute grid.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Simqueue.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Simqueue.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SIMQUEUE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Act as this uid instead of the calling user.
    ///
    /// Permission checks still apply: only the configured privileged uid
    /// may manage batches it does not own.
    #[arg(long, value_name = "UID")]
    pub uid: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse a submission script, build the job graph and persist it.
    Submit {
        /// Path to the submission script.
        script: PathBuf,

        /// Write a Graphviz rendering of the job graph to this file.
        #[arg(long, value_name = "PATH")]
        graph: Option<PathBuf>,

        /// Immediately advance the new batch after submission.
        #[arg(long)]
        start: bool,
    },

    /// Advance the batch containing the given job (alias: start).
    #[command(alias = "start")]
    Process {
        /// Job id.
        id: i64,
    },

    /// Print the state of a single job.
    Status {
        /// Job id.
        id: i64,
    },

    /// Close a batch: archive temporary files and remove its rows (alias: close).
    #[command(alias = "close")]
    Abort {
        /// Batch id.
        batch: i64,
    },

    /// Run the recombination step of the given job now.
    Recombine {
        /// Job id of a recombination node.
        id: i64,
    },

    /// List the jobs of a batch, or all batch ids when no batch is given.
    List {
        /// Batch id.
        batch: Option<i64>,
    },

    /// List jobs whose prerequisites are satisfied and that may begin.
    Next {
        /// Restrict to one batch.
        batch: Option<i64>,
    },

    /// List batches that are fully terminal.
    Finished,

    /// List the caller's running jobs.
    Running,

    /// Record a completion report from the compute backend for a job.
    Complete {
        /// Job id.
        id: i64,

        /// Whether the backend reported a canonical (successful) result.
        #[arg(long, conflicts_with = "failed")]
        success: bool,

        /// The backend reported a failure.
        #[arg(long)]
        failed: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

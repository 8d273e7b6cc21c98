//! Command-line interface built on clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::state_machine::Stage;

/// Resumable alignment and QC of unaligned BAMs on a Slurm cluster.
///
/// Every invocation moves each item forward by at most one step and returns;
/// rerun it after remote jobs finish.
#[derive(Debug, Parser)]
#[command(name = "bamflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Advances one unaligned BAM by a single step.
    Advance {
        /// Path to the unaligned `.bam`.
        file: PathBuf,
    },

    /// Advances every unaligned BAM found under a directory.
    AdvanceAll {
        dir: PathBuf,
    },

    /// Prints the state of one BAM, or of every BAM under a directory.
    Status {
        path: PathBuf,
    },

    /// Removes a stage's markers and everything downstream of it.
    Reset {
        file: PathBuf,

        /// One of `alignment`, `checks`, `qc`.
        #[arg(long)]
        stage: Stage,
    },

    /// Prints activity log lines containing a term (case-insensitive).
    SearchLog {
        term: String,
    },

    /// Merges every `.qc` record under a folder into one table.
    Summarize {
        #[arg(long)]
        qc_folder: PathBuf,

        #[arg(long)]
        output: PathBuf,
    },

    /// Prints the effective configuration.
    Config {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Checks that the external tools are installed.
    CheckTools,
}

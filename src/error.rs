//! Error taxonomy of the workflow and the operator hint attached to each error.

use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::Stage;

/// Every failure the workflow reports.
///
/// Variants that concern one item carry its base name (`item`) so messages
/// can be read without the surrounding batch output.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("{var} is a required environment variable: {purpose}")]
    MissingEnv {
        var: &'static str,
        purpose: &'static str,
    },

    #[error("Required tool {tool} is unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Invalid input file {}: {reason}", .path.display())]
    InvalidItem { path: PathBuf, reason: String },

    #[error("Invalid workflow stage '{0}': expected one of 'alignment', 'checks', 'qc'")]
    InvalidStage(String),

    #[error("Failed to submit {stage} job for {item}: {message}")]
    Submission {
        item: String,
        stage: Stage,
        message: String,
    },

    #[error("Remote {stage} job for {item} failed (see {})", .log.display())]
    RemoteJobFailed {
        item: String,
        /// Unaligned input the item was built from.
        input: PathBuf,
        stage: Stage,
        log: PathBuf,
        /// The stage was already reset so the next run resubmits it.
        rolled_back: bool,
    },

    #[error("Verification of {} failed for {item}: {message}", .path.display())]
    Verification {
        item: String,
        input: PathBuf,
        /// The aligned output that failed the check.
        path: PathBuf,
        message: String,
    },

    #[error("Failed to parse QC output {}: {message}", .path.display())]
    QcParse { path: PathBuf, message: String },

    #[error("Can't merge QC files: {} has a different header", .path.display())]
    SummaryHeaderMismatch { path: PathBuf },

    #[error("No .qc files found under {}", .0.display())]
    NoQcRecords(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// What an operator has to do before an item can make progress again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Re-running the same command retries the failed step.
    Rerun,
    /// The stage's markers must be reset before the item can progress.
    Reset {
        stage: Stage,
        /// Input to pass to `bamflow reset`, when the error knows it.
        input: Option<PathBuf>,
    },
    /// Configuration, environment or tooling must be fixed first.
    FixEnvironment,
}

impl std::fmt::Display for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recovery::Rerun => write!(f, "rerun the command to retry"),
            Recovery::Reset {
                stage,
                input: Some(input),
            } => write!(
                f,
                "run `bamflow reset {} --stage {stage}` to retry",
                input.display()
            ),
            Recovery::Reset { stage, input: None } => {
                write!(f, "run `bamflow reset <FILE> --stage {stage}` on the affected input to retry")
            }
            Recovery::FixEnvironment => write!(f, "fix the environment and rerun"),
        }
    }
}

impl PipelineError {
    /// Classifies the error for the hint printed next to it.
    pub fn recovery(&self) -> Recovery {
        match self {
            PipelineError::Submission { .. } => Recovery::Rerun,
            // Rerunning only re-checks the same file; it has to be realigned.
            PipelineError::Verification { input, .. } => Recovery::Reset {
                stage: Stage::Alignment,
                input: Some(input.clone()),
            },
            PipelineError::RemoteJobFailed {
                rolled_back: true, ..
            } => Recovery::Rerun,
            PipelineError::RemoteJobFailed { stage, input, .. } => Recovery::Reset {
                stage: *stage,
                input: Some(input.clone()),
            },
            PipelineError::QcParse { .. } => Recovery::Reset {
                stage: Stage::Qc,
                input: None,
            },
            PipelineError::Config(_)
            | PipelineError::MissingEnv { .. }
            | PipelineError::ToolUnavailable { .. }
            | PipelineError::Toml(_) => Recovery::FixEnvironment,
            _ => Recovery::Rerun,
        }
    }
}

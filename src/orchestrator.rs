//! The workflow driver: classify an item, then act on it at most once.
//!
//! [`Workflow`] owns the configuration, the command runner and the activity
//! log. It is the only place that writes markers in response to a state.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::activity_log::ActivityLog;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::markers::{self, CLEANUP_MARKERS, MarkerKind};
use crate::process::CommandRunner;
use crate::qc::{self, QcLocation, QcTool};
use crate::scheduler::SubmissionReceipt;
use crate::stages::{DriverOutcome, StageDriver};
use crate::state_machine::{Item, ItemState, Stage};
use crate::tools::{self, ToolCheck};

/// The side effect one `advance` call performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Informational state, nothing on disk changed.
    None,
    Submitted {
        stage: Stage,
        receipt: SubmissionReceipt,
    },
    Verified,
    RecordWritten {
        record: PathBuf,
        metrics: usize,
    },
}

/// Result of advancing one item by (at most) one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceReport {
    /// Base name of the item.
    pub item: String,
    pub input: PathBuf,
    /// State the item was in before the action.
    pub state: ItemState,
    pub action: Action,
}

impl fmt::Display for AdvanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let item = &self.item;
        match (&self.action, self.state) {
            (Action::None, ItemState::WorkflowComplete) => {
                write!(f, "The workflow is complete for {item}. Nothing else to do.")
            }
            (Action::None, ItemState::QcRunning) => write!(
                f,
                "QC for {item} is currently running. Rerun when it is done."
            ),
            (Action::None, ItemState::AlignmentRunning) => write!(
                f,
                "Alignment for {item} is currently running. Rerun when it is done."
            ),
            (Action::None, state) => write!(f, "{item} is in state {state}."),
            (Action::Submitted { stage, receipt }, _) => match &receipt.job_id {
                Some(id) => write!(f, "Submitted {stage} job {id} for {item}."),
                None => write!(f, "Submitted {stage} job for {item}."),
            },
            (Action::Verified, _) => write!(f, "Checks passed for {item}."),
            (Action::RecordWritten { record, metrics }, _) => write!(
                f,
                "Stored {metrics} QC metrics for {item} in {} and cleaned up.",
                record.display()
            ),
        }
    }
}

/// An item of a batch that could not be advanced.
#[derive(Debug)]
pub struct BatchFailure {
    pub input: PathBuf,
    pub error: PipelineError,
}

/// Aggregate outcome of [`Workflow::advance_all`]; one entry per input.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub advanced: Vec<AdvanceReport>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.advanced.len() + self.failed.len()
    }
}

/// Drives items through the marker-based state machine.
///
/// Each `advance` classifies the item from its markers and performs at most
/// one forward action. It never waits on a remote job: rerunning the command
/// later is what moves an item along.
pub struct Workflow<R> {
    config: PipelineConfig,
    runner: R,
    log: ActivityLog,
}

impl<R: CommandRunner> Workflow<R> {
    pub fn new(config: PipelineConfig, runner: R) -> Self {
        let log = ActivityLog::new(&config.log_path);
        Self {
            config,
            runner,
            log,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    pub async fn check_tools(&self) -> Vec<ToolCheck> {
        let checks = tools::check_all(&self.runner, &self.config).await;
        for check in &checks {
            debug!(program = %check.program, version = ?check.version, passed = check.passed(), "tool check");
        }
        checks
    }

    /// Checks the external tools once, before any item is processed.
    pub async fn preflight(&self) -> Result<(), PipelineError> {
        tools::ensure_available(self.check_tools().await)
    }

    /// Current state of an item, without acting on it.
    pub fn state(&self, item: &Item) -> Result<ItemState, PipelineError> {
        Ok(ItemState::classify(&markers::snapshot(item)?))
    }

    /// Performs the single next action for `item`.
    pub async fn advance(&self, item: &Item) -> Result<AdvanceReport, PipelineError> {
        if !item.input().is_file() {
            return Err(PipelineError::InvalidItem {
                path: item.input().to_path_buf(),
                reason: "input file does not exist".into(),
            });
        }

        let snapshot = markers::snapshot(item)?;
        let state = ItemState::classify(&snapshot);
        debug!(item = %item, workdir = %item.workdir().display(), %state, ?snapshot, "classified item");

        let action = match state {
            ItemState::WorkflowComplete => Action::None,
            ItemState::QcResultReady => self.store_qc_result(item)?,
            ItemState::QcRunning | ItemState::AlignmentRunning => {
                if let Some(stage) = state.failed_stage(&snapshot) {
                    return Err(self.remote_failure(item, stage));
                }
                Action::None
            }
            ItemState::ChecksComplete => self.drive(item, StageDriver::Summarize).await?,
            ItemState::AlignmentComplete => self.drive(item, StageDriver::Verify).await?,
            ItemState::NotStarted => self.drive(item, StageDriver::Align).await?,
        };

        Ok(AdvanceReport {
            item: item.base_name().to_string(),
            input: item.input().to_path_buf(),
            state,
            action,
        })
    }

    /// Advances `inputs` (see [`discover_inputs`]) in order, calling `on_item`
    /// after each. One item's failure never stops the rest.
    pub async fn advance_all(
        &self,
        inputs: Vec<PathBuf>,
        mut on_item: impl FnMut(&Path, Result<&AdvanceReport, &PipelineError>),
    ) -> BatchReport {
        info!(items = inputs.len(), "advancing items");
        let mut report = BatchReport::default();
        for input in inputs {
            let result = match Item::from_path(&input) {
                Ok(item) => self.advance(&item).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(advanced) => {
                    on_item(&input, Ok(&advanced));
                    report.advanced.push(advanced);
                }
                Err(error) => {
                    warn!(input = %input.display(), %error, "item failed");
                    on_item(&input, Err(&error));
                    report.failed.push(BatchFailure { input, error });
                }
            }
        }
        report
    }

    /// Removes every intermediate marker and log of a finished item. Idempotent.
    pub fn cleanup(&self, item: &Item) -> Result<(), PipelineError> {
        self.note(&format!("Cleaning up temporary files for {}.", item.input().display()));
        markers::remove_all(item, &CLEANUP_MARKERS)?;
        Ok(())
    }

    /// Removes the markers of `stage` and of every stage downstream of it.
    pub fn reset(&self, item: &Item, stage: Stage) -> Result<(), PipelineError> {
        self.note(&format!(
            "Resetting workflow step '{stage}' for {}.",
            item.input().display()
        ));
        markers::remove_all(item, &MarkerKind::reset_set(stage))?;
        Ok(())
    }

    async fn drive(&self, item: &Item, driver: StageDriver) -> Result<Action, PipelineError> {
        let stage = driver.stage();
        let outcome = match driver.run(item, &self.config, &self.runner).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.note(&format!("Raising exception: {e}"));
                return Err(e);
            }
        };
        markers::create(item, driver.success_marker())?;

        let action = match outcome {
            DriverOutcome::Submitted(receipt) => {
                self.note(&format!(
                    "Submitted {stage} job {} for {}.",
                    receipt.job_id.as_deref().unwrap_or("(unknown id)"),
                    item.input().display()
                ));
                Action::Submitted { stage, receipt }
            }
            DriverOutcome::Verified => {
                self.note(&format!("Checks passed for {}.", item.input().display()));
                Action::Verified
            }
        };
        Ok(action)
    }

    fn store_qc_result(&self, item: &Item) -> Result<Action, PipelineError> {
        let record = MarkerKind::CompletionRecord.path(item);
        self.note(&format!(
            "Parsing QC outputs for {} and storing {}.",
            item.input().display(),
            record.display()
        ));
        let locations = [QcLocation {
            tool: QcTool::SamtoolsStats,
            output_path: MarkerKind::StatsOutput.path(item),
        }];
        let metrics = qc::parse_and_store(&locations, &record)?;
        self.cleanup(item)?;
        Ok(Action::RecordWritten {
            record,
            metrics: metrics.len(),
        })
    }

    fn remote_failure(&self, item: &Item, stage: Stage) -> PipelineError {
        let (log_kind, kept_kind) = match stage {
            Stage::Qc => (MarkerKind::QcLog, MarkerKind::FailedQcLog),
            Stage::Alignment | Stage::Checks => {
                (MarkerKind::AlignmentLog, MarkerKind::FailedAlignmentLog)
            }
        };
        let log = log_kind.path(item);
        self.note(&format!(
            "Remote {stage} job failed for {} (see {}).",
            item.input().display(),
            log.display()
        ));

        let mut rolled_back = false;
        if self.config.resubmit_failed_jobs {
            // The log is part of the reset set; keep its text until cleanup.
            let kept = kept_kind.path(item);
            let kept = std::fs::copy(&log, &kept).ok().map(|_| kept);
            match self.reset(item, stage) {
                Ok(()) => rolled_back = true,
                Err(e) => warn!(item = %item, %stage, error = %e, "could not reset failed stage"),
            }
            if let Some(kept) = kept {
                info!(log = %kept.display(), "kept failed job log");
            }
        }

        PipelineError::RemoteJobFailed {
            item: item.base_name().to_string(),
            input: item.input().to_path_buf(),
            stage,
            log,
            rolled_back,
        }
    }

    fn note(&self, message: &str) {
        info!("{message}");
        if let Err(e) = self.log.append(message) {
            warn!(log = %self.log.path().display(), error = %e, "could not append to activity log");
        }
    }
}

/// Every unaligned input under `dir`, recursively, in sorted order.
///
/// Symlinked directories are not descended into. Symlinked input files are
/// kept. Only an unreadable `dir` itself is an error; unreadable
/// subdirectories are skipped with a warning.
pub fn discover_inputs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(std::fs::read_dir(dir)?, &mut found);
    found.sort();
    Ok(found)
}

fn walk(entries: std::fs::ReadDir, out: &mut Vec<PathBuf>) {
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            warn!(path = %path.display(), "skipping entry of unknown type");
            continue;
        };

        if file_type.is_dir() {
            match std::fs::read_dir(&path) {
                Ok(children) => walk(children, out),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable directory"),
            }
        } else if (file_type.is_file() || (file_type.is_symlink() && path.is_file()))
            && Item::is_input_candidate(&path)
        {
            out.push(path);
        }
    }
}

//! Item states and the classifier that derives them from marker files.
//!
//! Nothing here touches the filesystem: [`crate::markers::snapshot`] reads the
//! facts, [`ItemState::classify`] turns them into a state.

use std::fmt;

use super::item::Stage;

/// Substrings that mark a scheduler log as belonging to a failed job.
const ERROR_SIGNATURES: [&str; 2] = ["ERROR", "error"];

/// What a scheduler job log tells us about its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStatus {
    /// The log file does not exist (job not started, or cleaned up).
    #[default]
    Missing,
    /// The log exists and is empty.
    Empty,
    /// The log has content but no error signature.
    Clean,
    /// The log contains an error signature.
    ErrorSignature,
}

impl LogStatus {
    pub fn from_contents(contents: &str) -> Self {
        if contents.is_empty() {
            LogStatus::Empty
        } else if ERROR_SIGNATURES.iter().any(|sig| contents.contains(sig)) {
            LogStatus::ErrorSignature
        } else {
            LogStatus::Clean
        }
    }

    pub fn has_error(self) -> bool {
        self == LogStatus::ErrorSignature
    }
}

/// Every on-disk fact the classifier looks at, read in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerSnapshot {
    /// `qc/<base>.qc` exists.
    pub completion_record: bool,
    /// The statistics output exists and is non-empty.
    pub stats_nonempty: bool,
    /// The QC job touched `<base>.qc_done` after `samtools stats` exited 0.
    pub qc_done: bool,
    /// Scheduler log of the QC job.
    pub qc_log: LogStatus,
    pub qc_running: bool,
    pub checks_complete: bool,
    /// `<base>.aligned_sorted.bam` exists.
    pub aligned_output: bool,
    /// Scheduler log of the alignment job.
    pub alignment_log: LogStatus,
    pub alignment_running: bool,
}

impl MarkerSnapshot {
    /// QC output is ready to parse.
    ///
    /// Only the `qc_done` marker written by the wrapped command counts. A
    /// non-empty stats file alone may still be mid-write.
    pub fn qc_finished(&self) -> bool {
        self.stats_nonempty && self.qc_done
    }
}

/// The derived state of one item, recomputed from markers on every call.
///
/// Variants are listed in precedence order: the first whose condition holds wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    WorkflowComplete,
    QcResultReady,
    QcRunning,
    ChecksComplete,
    AlignmentComplete,
    AlignmentRunning,
    NotStarted,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::WorkflowComplete => write!(f, "WORKFLOW_COMPLETE"),
            ItemState::QcResultReady => write!(f, "QC_RESULT_READY"),
            ItemState::QcRunning => write!(f, "QC_RUNNING"),
            ItemState::ChecksComplete => write!(f, "CHECKS_COMPLETE"),
            ItemState::AlignmentComplete => write!(f, "ALIGNMENT_COMPLETE"),
            ItemState::AlignmentRunning => write!(f, "ALIGNMENT_RUNNING"),
            ItemState::NotStarted => write!(f, "NOT_STARTED"),
        }
    }
}

impl ItemState {
    /// Classify an item from its marker snapshot.
    ///
    /// Pure: the same snapshot always yields the same state.
    pub fn classify(snapshot: &MarkerSnapshot) -> ItemState {
        if snapshot.completion_record {
            ItemState::WorkflowComplete
        } else if snapshot.qc_finished() {
            ItemState::QcResultReady
        } else if snapshot.qc_running {
            ItemState::QcRunning
        } else if snapshot.checks_complete {
            ItemState::ChecksComplete
        } else if snapshot.aligned_output && !snapshot.alignment_log.has_error() {
            ItemState::AlignmentComplete
        } else if snapshot.alignment_running {
            ItemState::AlignmentRunning
        } else {
            ItemState::NotStarted
        }
    }

    /// The stage whose remote job failed, if the snapshot shows one for this state.
    ///
    /// Only the "running" states are waiting on a remote job, so only they
    /// look at the scheduler logs.
    pub fn failed_stage(self, snapshot: &MarkerSnapshot) -> Option<Stage> {
        match self {
            ItemState::QcRunning if snapshot.qc_log.has_error() => Some(Stage::Qc),
            ItemState::AlignmentRunning if snapshot.alignment_log.has_error() => {
                Some(Stage::Alignment)
            }
            _ => None,
        }
    }

    /// States that only report progress and never touch the filesystem.
    pub fn is_informational(self) -> bool {
        matches!(
            self,
            ItemState::WorkflowComplete | ItemState::QcRunning | ItemState::AlignmentRunning
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MarkerSnapshot {
        MarkerSnapshot::default()
    }

    #[test]
    fn empty_snapshot_is_not_started() {
        assert_eq!(ItemState::classify(&snapshot()), ItemState::NotStarted);
    }

    #[test]
    fn walks_the_happy_path_in_order() {
        let mut snap = snapshot();

        snap.alignment_running = true;
        assert_eq!(ItemState::classify(&snap), ItemState::AlignmentRunning);

        snap.aligned_output = true;
        snap.alignment_log = LogStatus::Clean;
        assert_eq!(ItemState::classify(&snap), ItemState::AlignmentComplete);

        snap.checks_complete = true;
        assert_eq!(ItemState::classify(&snap), ItemState::ChecksComplete);

        snap.qc_running = true;
        assert_eq!(ItemState::classify(&snap), ItemState::QcRunning);

        snap.qc_log = LogStatus::Empty;
        snap.stats_nonempty = true;
        snap.qc_done = true;
        assert_eq!(ItemState::classify(&snap), ItemState::QcResultReady);

        snap.completion_record = true;
        assert_eq!(ItemState::classify(&snap), ItemState::WorkflowComplete);
    }

    #[test]
    fn completion_record_wins_over_everything() {
        let snap = MarkerSnapshot {
            completion_record: true,
            alignment_running: true,
            qc_running: true,
            ..snapshot()
        };
        assert_eq!(ItemState::classify(&snap), ItemState::WorkflowComplete);
    }

    #[test]
    fn errored_alignment_log_keeps_item_running() {
        let snap = MarkerSnapshot {
            alignment_running: true,
            aligned_output: true,
            alignment_log: LogStatus::ErrorSignature,
            ..snapshot()
        };
        let state = ItemState::classify(&snap);
        assert_eq!(state, ItemState::AlignmentRunning);
        assert_eq!(state.failed_stage(&snap), Some(Stage::Alignment));
    }

    #[test]
    fn qc_needs_stats_and_a_completion_signal() {
        let mut snap = MarkerSnapshot {
            checks_complete: true,
            qc_running: true,
            stats_nonempty: true,
            qc_log: LogStatus::Clean,
            ..snapshot()
        };
        // Log has content (job still talking), no done marker.
        assert_eq!(ItemState::classify(&snap), ItemState::QcRunning);

        snap.qc_done = true;
        assert_eq!(ItemState::classify(&snap), ItemState::QcResultReady);

        snap.stats_nonempty = false;
        assert_eq!(ItemState::classify(&snap), ItemState::QcRunning);
    }

    #[test]
    fn partial_stats_with_empty_log_is_still_running() {
        let mut snap = MarkerSnapshot {
            checks_complete: true,
            qc_running: true,
            stats_nonempty: true,
            qc_log: LogStatus::Empty,
            ..snapshot()
        };
        assert!(!snap.qc_finished());
        assert_eq!(ItemState::classify(&snap), ItemState::QcRunning);

        snap.qc_done = true;
        assert_eq!(ItemState::classify(&snap), ItemState::QcResultReady);
    }

    #[test]
    fn missing_qc_log_is_not_treated_as_finished() {
        let snap = MarkerSnapshot {
            qc_running: true,
            stats_nonempty: true,
            qc_log: LogStatus::Missing,
            ..snapshot()
        };
        assert_eq!(ItemState::classify(&snap), ItemState::QcRunning);
    }

    #[test]
    fn qc_log_error_is_reported_as_failed_qc() {
        let snap = MarkerSnapshot {
            checks_complete: true,
            qc_running: true,
            qc_log: LogStatus::ErrorSignature,
            ..snapshot()
        };
        let state = ItemState::classify(&snap);
        assert_eq!(state, ItemState::QcRunning);
        assert_eq!(state.failed_stage(&snap), Some(Stage::Qc));
    }

    #[test]
    fn classification_is_deterministic() {
        let snap = MarkerSnapshot {
            checks_complete: true,
            aligned_output: true,
            alignment_running: true,
            ..snapshot()
        };
        let first = ItemState::classify(&snap);
        for _ in 0..10 {
            assert_eq!(ItemState::classify(&snap), first);
        }
    }

    #[test]
    fn log_status_detects_error_signatures() {
        assert_eq!(LogStatus::from_contents(""), LogStatus::Empty);
        assert_eq!(LogStatus::from_contents("all good\n"), LogStatus::Clean);
        assert_eq!(
            LogStatus::from_contents(">|> 2024 ERROR pbmm2 failed"),
            LogStatus::ErrorSignature
        );
        assert_eq!(
            LogStatus::from_contents("slurmstepd: error: Exceeded job memory limit"),
            LogStatus::ErrorSignature
        );
    }

    #[test]
    fn state_display() {
        assert_eq!(ItemState::NotStarted.to_string(), "NOT_STARTED");
        assert_eq!(ItemState::QcResultReady.to_string(), "QC_RESULT_READY");
        assert_eq!(ItemState::WorkflowComplete.to_string(), "WORKFLOW_COMPLETE");
    }

    #[test]
    fn informational_states() {
        assert!(ItemState::AlignmentRunning.is_informational());
        assert!(!ItemState::NotStarted.is_informational());
        assert!(!ItemState::QcResultReady.is_informational());
    }
}

//! Marker store: the only persistent state of the workflow.
//!
//! Every fact about an item's progress is a file named
//! `{workdir}/{base}.{suffix}` next to the input BAM. The completion record is
//! the exception and lives at `{workdir}/qc/{base}.qc`. There is no locking;
//! callers must not advance the same item from two processes at once.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::state_machine::{Item, LogStatus, MarkerSnapshot, Stage};

/// A sentinel or artifact file belonging to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerKind {
    AlignmentRunning,
    AlignmentLog,
    AlignedOutput,
    AlignedIndex,
    ChecksComplete,
    QcRunning,
    QcLog,
    StatsOutput,
    QcDone,
    CompletionRecord,
    /// Copy of a failed alignment log kept across an automatic reset.
    FailedAlignmentLog,
    /// Copy of a failed QC log kept across an automatic reset.
    FailedQcLog,
}

/// Markers removed once the completion record exists.
pub const CLEANUP_MARKERS: [MarkerKind; 9] = [
    MarkerKind::AlignmentRunning,
    MarkerKind::AlignmentLog,
    MarkerKind::ChecksComplete,
    MarkerKind::QcRunning,
    MarkerKind::QcLog,
    MarkerKind::StatsOutput,
    MarkerKind::QcDone,
    MarkerKind::FailedAlignmentLog,
    MarkerKind::FailedQcLog,
];

impl MarkerKind {
    pub fn suffix(self) -> &'static str {
        match self {
            MarkerKind::AlignmentRunning => "alignment_running",
            MarkerKind::AlignmentLog => "align_slurm_out",
            MarkerKind::AlignedOutput => "aligned_sorted.bam",
            MarkerKind::AlignedIndex => "aligned_sorted.bam.bai",
            MarkerKind::ChecksComplete => "checks_complete",
            MarkerKind::QcRunning => "qc_running",
            MarkerKind::QcLog => "qc_slurm_out",
            MarkerKind::StatsOutput => "stats.txt",
            MarkerKind::QcDone => "qc_done",
            MarkerKind::CompletionRecord => "qc",
            MarkerKind::FailedAlignmentLog => "align_slurm_out.failed",
            MarkerKind::FailedQcLog => "qc_slurm_out.failed",
        }
    }

    pub fn path(self, item: &Item) -> PathBuf {
        match self {
            MarkerKind::CompletionRecord => item
                .qc_dir()
                .join(format!("{}.{}", item.base_name(), self.suffix())),
            _ => item.path_with_suffix(self.suffix()),
        }
    }

    /// Markers owned by `stage` alone, without its downstream stages.
    fn owned_by(stage: Stage) -> &'static [MarkerKind] {
        match stage {
            Stage::Qc => &[
                MarkerKind::QcRunning,
                MarkerKind::CompletionRecord,
                MarkerKind::StatsOutput,
                MarkerKind::QcLog,
                MarkerKind::QcDone,
            ],
            Stage::Checks => &[MarkerKind::ChecksComplete],
            Stage::Alignment => &[
                MarkerKind::AlignmentRunning,
                MarkerKind::AlignedOutput,
                MarkerKind::AlignedIndex,
                MarkerKind::AlignmentLog,
            ],
        }
    }

    /// Markers a reset of `stage` removes: its own plus every downstream stage's.
    pub fn reset_set(stage: Stage) -> Vec<MarkerKind> {
        stage
            .cascade()
            .flat_map(|s| Self::owned_by(s).iter().copied())
            .collect()
    }
}

pub fn exists(item: &Item, kind: MarkerKind) -> bool {
    kind.path(item).is_file()
}

/// Creates (or truncates) an empty marker file.
pub fn create(item: &Item, kind: MarkerKind) -> io::Result<()> {
    let path = kind.path(item);
    fs::File::create(&path)?;
    debug!(marker = %path.display(), "created marker");
    Ok(())
}

/// Removes a marker; a missing file is not an error.
pub fn remove(item: &Item, kind: MarkerKind) -> io::Result<()> {
    let path = kind.path(item);
    match fs::remove_file(&path) {
        Ok(()) => {
            debug!(marker = %path.display(), "removed marker");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn remove_all(item: &Item, kinds: &[MarkerKind]) -> io::Result<()> {
    kinds.iter().try_for_each(|kind| remove(item, *kind))
}

/// Reads every fact the state classifier needs.
pub fn snapshot(item: &Item) -> io::Result<MarkerSnapshot> {
    Ok(MarkerSnapshot {
        completion_record: exists(item, MarkerKind::CompletionRecord),
        stats_nonempty: file_len(&MarkerKind::StatsOutput.path(item))?.is_some_and(|len| len > 0),
        qc_done: exists(item, MarkerKind::QcDone),
        qc_log: log_status(&MarkerKind::QcLog.path(item))?,
        qc_running: exists(item, MarkerKind::QcRunning),
        checks_complete: exists(item, MarkerKind::ChecksComplete),
        aligned_output: exists(item, MarkerKind::AlignedOutput),
        alignment_log: log_status(&MarkerKind::AlignmentLog.path(item))?,
        alignment_running: exists(item, MarkerKind::AlignmentRunning),
    })
}

fn file_len(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn log_status(path: &Path) -> io::Result<LogStatus> {
    match fs::read(path) {
        Ok(bytes) => Ok(LogStatus::from_contents(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(LogStatus::Missing),
        Err(e) => Err(e),
    }
}

/// Writes `contents` to a temp file beside `path`, then renames it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    if let Err(e) = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

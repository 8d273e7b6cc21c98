//! Work items and pipeline stages.
//!
//! An [`Item`] is one unaligned BAM; every marker path is derived from it.
//! [`Stage`] orders the resettable phases so a reset can cascade downstream.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PipelineError;

/// Suffix of the unaligned input files the workflow picks up.
pub const INPUT_SUFFIX: &str = ".bam";

/// Suffix of the aligned output; files carrying it are never treated as inputs.
pub const ALIGNED_SUFFIX: &str = ".aligned_sorted.bam";

/// One unaligned BAM tracked through the pipeline.
///
/// All markers and derived artifacts of an item live next to the input file,
/// named after its base name (the file name with its last extension removed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Item {
    /// The unaligned BAM as given.
    input: PathBuf,
    /// Directory holding the input and all of its markers.
    workdir: PathBuf,
    /// File name without its last extension.
    base: String,
}

impl Item {
    /// Builds an item from the path of its unaligned input file.
    ///
    /// Paths containing whitespace are rejected. Aligned outputs are rejected so
    /// a derived artifact is never mistaken for a fresh input. The input file
    /// need not exist yet; [`Workflow::advance`](crate::orchestrator::Workflow::advance)
    /// checks that before acting.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let invalid = |reason: &str| PipelineError::InvalidItem {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid("file name is missing or not valid UTF-8"))?;

        if path.to_string_lossy().chars().any(char::is_whitespace) {
            return Err(invalid("path must not contain whitespace"));
        }
        if file_name.ends_with(ALIGNED_SUFFIX) {
            return Err(invalid("file is an aligned output, not an input"));
        }

        let base = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file_name.to_string(),
        };

        let workdir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            input: path.to_path_buf(),
            workdir,
            base,
        })
    }

    /// Returns true for files `discover_inputs` should treat as workflow inputs.
    pub fn is_input_candidate(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(INPUT_SUFFIX) && !name.ends_with(ALIGNED_SUFFIX))
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn base_name(&self) -> &str {
        &self.base
    }

    /// `{workdir}/{base}.{suffix}`
    pub fn path_with_suffix(&self, suffix: &str) -> PathBuf {
        self.workdir.join(format!("{}.{suffix}", self.base))
    }

    /// Directory holding per-item completion records.
    pub fn qc_dir(&self) -> PathBuf {
        self.workdir.join("qc")
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)
    }
}

/// A resettable phase of the pipeline, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Alignment,
    Checks,
    Qc,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Alignment, Stage::Checks, Stage::Qc];

    /// This stage followed by every stage that depends on it.
    pub fn cascade(self) -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter().filter(move |s| *s >= self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Alignment => write!(f, "alignment"),
            Stage::Checks => write!(f, "checks"),
            Stage::Qc => write!(f, "qc"),
        }
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alignment" => Ok(Stage::Alignment),
            "checks" => Ok(Stage::Checks),
            "qc" => Ok(Stage::Qc),
            other => Err(PipelineError::InvalidStage(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_last_extension() {
        let item = Item::from_path("/data/run1/sample1.bam").unwrap();
        assert_eq!(item.base_name(), "sample1");
        assert_eq!(item.workdir(), Path::new("/data/run1"));
        assert_eq!(
            item.path_with_suffix("alignment_running"),
            PathBuf::from("/data/run1/sample1.alignment_running")
        );
        assert_eq!(item.qc_dir(), PathBuf::from("/data/run1/qc"));
    }

    #[test]
    fn dotted_names_keep_inner_dots() {
        let item = Item::from_path("m64012.hifi_reads.bam").unwrap();
        assert_eq!(item.base_name(), "m64012.hifi_reads");
        assert_eq!(item.workdir(), Path::new("."));
    }

    #[test]
    fn rejects_aligned_outputs_and_whitespace() {
        assert!(matches!(
            Item::from_path("/data/sample1.aligned_sorted.bam"),
            Err(PipelineError::InvalidItem { .. })
        ));
        assert!(matches!(
            Item::from_path("/data/my sample.bam"),
            Err(PipelineError::InvalidItem { .. })
        ));
    }

    #[test]
    fn input_candidates_exclude_derived_artifacts() {
        assert!(Item::is_input_candidate(Path::new("a/sample1.bam")));
        assert!(!Item::is_input_candidate(Path::new("a/sample1.aligned_sorted.bam")));
        assert!(!Item::is_input_candidate(Path::new("a/sample1.aligned_sorted.bam.bai")));
        assert!(!Item::is_input_candidate(Path::new("a/sample1.stats.txt")));
    }

    #[test]
    fn stage_parsing_rejects_unknown_names() {
        assert_eq!("checks".parse::<Stage>().unwrap(), Stage::Checks);
        let err = "align".parse::<Stage>().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStage(ref s) if s == "align"));
    }

    #[test]
    fn cascade_includes_downstream_stages() {
        assert_eq!(
            Stage::Alignment.cascade().collect::<Vec<_>>(),
            vec![Stage::Alignment, Stage::Checks, Stage::Qc]
        );
        assert_eq!(Stage::Checks.cascade().collect::<Vec<_>>(), vec![Stage::Checks, Stage::Qc]);
        assert_eq!(Stage::Qc.cascade().collect::<Vec<_>>(), vec![Stage::Qc]);
    }
}

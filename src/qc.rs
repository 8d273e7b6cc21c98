//! QC output parsing and completion records.
//!
//! A completion record is a two-line TSV: sorted metric names, then their
//! values. Summaries merge many records into one table with a leading
//! `File name` column.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PipelineError;
use crate::markers::write_atomic;

pub type Metrics = BTreeMap<String, String>;

/// QC tools whose output can be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QcTool {
    SamtoolsStats,
}

impl QcTool {
    /// Prefix of every metric name produced by this tool.
    pub fn label(self) -> &'static str {
        match self {
            QcTool::SamtoolsStats => "samtools stats",
        }
    }

    pub fn parse(self, contents: &str) -> Metrics {
        match self {
            QcTool::SamtoolsStats => parse_samtools_stats(contents),
        }
    }
}

/// Where one tool left its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcLocation {
    pub tool: QcTool,
    pub output_path: PathBuf,
}

/// `SN` (summary numbers) lines of `samtools stats`, keyed `samtools stats: <field>`.
fn parse_samtools_stats(contents: &str) -> Metrics {
    contents
        .lines()
        .filter(|line| line.starts_with("SN\t"))
        .filter_map(|line| {
            let mut fields = line.split('\t').skip(1);
            let name = fields.next()?.replace(':', "");
            let value = fields.next()?.trim();
            Some((
                format!("{}: {}", QcTool::SamtoolsStats.label(), name.trim()),
                value.to_string(),
            ))
        })
        .collect()
}

/// Parses every location and merges the metrics; later tools win on key collisions.
pub fn parse_qc_outputs(locations: &[QcLocation]) -> Result<Metrics, PipelineError> {
    let mut combined = Metrics::new();
    for location in locations {
        let contents = fs::read_to_string(&location.output_path).map_err(|e| PipelineError::QcParse {
            path: location.output_path.clone(),
            message: e.to_string(),
        })?;
        let metrics = location.tool.parse(&contents);
        if metrics.is_empty() {
            return Err(PipelineError::QcParse {
                path: location.output_path.clone(),
                message: format!("no {} metrics found", location.tool.label()),
            });
        }
        combined.extend(metrics);
    }
    Ok(combined)
}

pub fn render_record(metrics: &Metrics) -> String {
    let header: Vec<&str> = metrics.keys().map(String::as_str).collect();
    let values: Vec<&str> = metrics.values().map(String::as_str).collect();
    format!("{}\n{}\n", header.join("\t"), values.join("\t"))
}

/// Parses `locations` and atomically writes the completion record to `record_path`.
pub fn parse_and_store(locations: &[QcLocation], record_path: &Path) -> Result<Metrics, PipelineError> {
    let metrics = parse_qc_outputs(locations)?;
    write_atomic(record_path, render_record(&metrics).as_bytes())?;
    debug!(record = %record_path.display(), metrics = metrics.len(), "completion record written");
    Ok(metrics)
}

/// Merges every `*.qc` record under `qc_folder` into one table at `summary_path`.
///
/// All records must share one header. Returns the number of merged records.
pub fn create_summary(qc_folder: &Path, summary_path: &Path) -> Result<usize, PipelineError> {
    let mut records = Vec::new();
    collect_records(qc_folder, &mut records)?;
    records.sort();
    // A previous summary written into the same folder is not a record.
    records.retain(|p| p != summary_path);

    if records.is_empty() {
        return Err(PipelineError::NoQcRecords(qc_folder.to_path_buf()));
    }

    let mut header: Option<String> = None;
    let mut rows = Vec::with_capacity(records.len());
    for path in &records {
        let contents = fs::read_to_string(path)?;
        let mut lines = contents.lines();
        let (keys, values) = match (lines.next(), lines.next()) {
            (Some(keys), Some(values)) => (keys, values),
            _ => {
                return Err(PipelineError::QcParse {
                    path: path.clone(),
                    message: "expected a header line and a value line".into(),
                });
            }
        };

        match &header {
            Some(existing) if existing != keys => {
                return Err(PipelineError::SummaryHeaderMismatch { path: path.clone() });
            }
            Some(_) => {}
            None => header = Some(keys.to_string()),
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        rows.push(format!("{file_name}\t{values}"));
    }

    let mut table = format!("File name\t{}\n", header.unwrap_or_default());
    for row in &rows {
        table.push_str(row);
        table.push('\n');
    }
    write_atomic(summary_path, table.as_bytes())?;
    Ok(rows.len())
}

fn collect_records(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PipelineError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_records(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "qc") {
            out.push(path);
        }
    }
    Ok(())
}

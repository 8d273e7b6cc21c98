//! Append-only activity log shared by every run.
//!
//! One line per event: a UTC timestamp, a tab, then the message. Operators
//! grep it with `bamflow search-log` to reconstruct what happened to an item
//! across many short-lived invocations.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d, %H:%M:%S UTC";

#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line.
    pub fn append(&self, message: &str) -> io::Result<()> {
        self.append_at(Utc::now(), message)
    }

    fn append_at(&self, at: DateTime<Utc>, message: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Single write so concurrent appenders never interleave within a line.
        let line = format!("{}\t{}\n", at.format(TIMESTAMP_FORMAT), message.replace('\n', " "));
        file.write_all(line.as_bytes())
    }

    /// Returns every line containing `term`, ignoring case.
    pub fn search(&self, term: &str) -> io::Result<Vec<String>> {
        let needle = term.to_lowercase();
        let file = std::fs::File::open(&self.path)?;
        let mut hits = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.to_lowercase().contains(&needle) {
                hits.push(line);
            }
        }
        Ok(hits)
    }
}

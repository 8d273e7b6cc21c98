//! Pipeline configuration loaded from the TOML file named by `BAMFLOW_CONFIG`.
//!
//! [`PipelineConfig`] is passed explicitly into the workflow; nothing reads it
//! from global state. Fields not present in the file fall back to the defaults
//! used on the cluster. Values that end up as tokens of a scheduler command
//! are rejected if they contain whitespace.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::PipelineError;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Reference FASTA/MMI handed to the aligner.
    pub reference_sequence_path: PathBuf,

    /// Append-only activity log.
    pub log_path: PathBuf,

    /// Reset a stage automatically when its remote job is found to have failed,
    /// so the next run resubmits it.
    #[serde(default)]
    pub resubmit_failed_jobs: bool,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default = "StageResources::alignment")]
    pub alignment: StageResources,

    #[serde(default = "StageResources::qc")]
    pub qc: StageResources,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Slurm account settings shared by every submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_partition")]
    pub partition: String,

    #[serde(default = "default_account")]
    pub account: String,

    /// Address Slurm sends job notifications to.
    #[serde(default)]
    pub mail_user: String,

    #[serde(default = "default_mail_type")]
    pub mail_type: String,

    /// Submission executable.
    #[serde(default = "default_sbatch")]
    pub sbatch: String,
}

/// Resources requested for one stage's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResources {
    /// Wall-clock limit in Slurm notation (`d-HH:MM:SS`).
    pub time: String,
    pub memory: String,
    pub threads: u32,
}

impl StageResources {
    fn alignment() -> Self {
        Self {
            time: "0-06:00:00".to_string(),
            memory: "48G".to_string(),
            threads: 32,
        }
    }

    // Stats is cheap; these should never need raising.
    fn qc() -> Self {
        Self {
            time: "00-04:00:00".to_string(),
            memory: "4G".to_string(),
            threads: 2,
        }
    }
}

/// External executables and the versions the workflow was validated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_aligner")]
    pub aligner: String,

    /// Version prefix the aligner must report, e.g. `1.13`. Empty accepts any.
    #[serde(default = "default_aligner_version")]
    pub aligner_version: String,

    #[serde(default = "default_aligner_preset")]
    pub aligner_preset: String,

    #[serde(default = "default_samtools")]
    pub samtools: String,
}

fn default_partition() -> String {
    "park".to_string()
}

fn default_account() -> String {
    "park_contrib".to_string()
}

fn default_mail_type() -> String {
    "ALL".to_string()
}

fn default_sbatch() -> String {
    "sbatch".to_string()
}

fn default_aligner() -> String {
    "pbmm2".to_string()
}

fn default_aligner_version() -> String {
    "1.13".to_string()
}

fn default_aligner_preset() -> String {
    "CCS".to_string()
}

fn default_samtools() -> String {
    "samtools".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            partition: default_partition(),
            account: default_account(),
            mail_user: String::new(),
            mail_type: default_mail_type(),
            sbatch: default_sbatch(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            aligner: default_aligner(),
            aligner_version: default_aligner_version(),
            aligner_preset: default_aligner_preset(),
            samtools: default_samtools(),
        }
    }
}

impl PipelineConfig {
    /// Loads the file named by `BAMFLOW_CONFIG`.
    pub fn from_env() -> Result<Self> {
        let path = env::require(env::CONFIG_ENV)?;
        Self::load(Path::new(&path))
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would break the generated scheduler commands.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let reference = self.reference_sequence_path.to_string_lossy();
        let shell_tokens: [(&str, &str); 13] = [
            ("reference_sequence_path", reference.as_ref()),
            ("scheduler.partition", self.scheduler.partition.as_str()),
            ("scheduler.account", self.scheduler.account.as_str()),
            ("scheduler.mail_user", self.scheduler.mail_user.as_str()),
            ("scheduler.mail_type", self.scheduler.mail_type.as_str()),
            ("scheduler.sbatch", self.scheduler.sbatch.as_str()),
            ("alignment.time", self.alignment.time.as_str()),
            ("alignment.memory", self.alignment.memory.as_str()),
            ("qc.time", self.qc.time.as_str()),
            ("qc.memory", self.qc.memory.as_str()),
            ("tools.aligner", self.tools.aligner.as_str()),
            ("tools.aligner_preset", self.tools.aligner_preset.as_str()),
            ("tools.samtools", self.tools.samtools.as_str()),
        ];

        for (field, value) in shell_tokens {
            if value.is_empty() {
                return Err(PipelineError::Config(format!("{field} must not be empty")));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(PipelineError::Config(format!(
                    "{field} must not contain whitespace: {value:?}"
                )));
            }
        }

        if self.log_path.as_os_str().is_empty() {
            return Err(PipelineError::Config("log_path must not be empty".into()));
        }
        if self.alignment.threads == 0 || self.qc.threads == 0 {
            return Err(PipelineError::Config("threads must be at least 1".into()));
        }
        Ok(())
    }

    /// Effective configuration as TOML, for `bamflow config`.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        reference_sequence_path = "/refs/hg38.fa"
        log_path = "/logs/bamflow.log"

        [scheduler]
        mail_user = "someone@example.org"
    "#;

    #[test]
    fn minimal_config_uses_cluster_defaults() {
        let config = PipelineConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.scheduler.partition, "park");
        assert_eq!(config.scheduler.account, "park_contrib");
        assert_eq!(config.scheduler.mail_type, "ALL");
        assert_eq!(config.alignment.threads, 32);
        assert_eq!(config.alignment.memory, "48G");
        assert_eq!(config.qc.time, "00-04:00:00");
        assert_eq!(config.qc.threads, 2);
        assert_eq!(config.tools.aligner, "pbmm2");
        assert_eq!(config.tools.aligner_version, "1.13");
        assert!(!config.resubmit_failed_jobs);
    }

    #[test]
    fn stage_tables_override_defaults() {
        let toml_str = format!(
            "{MINIMAL}\n[alignment]\ntime = \"1-00:00:00\"\nmemory = \"64G\"\nthreads = 48\n"
        );
        let config = PipelineConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config.alignment.time, "1-00:00:00");
        assert_eq!(config.alignment.threads, 48);
        assert_eq!(config.qc.memory, "4G");
    }

    #[test]
    fn rejects_whitespace_in_shell_tokens() {
        let toml_str = MINIMAL.replace("/refs/hg38.fa", "/refs/my genome.fa");
        let err = PipelineConfig::from_toml(&toml_str).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("reference_sequence_path")));
    }

    #[test]
    fn rejects_missing_mail_user() {
        let toml_str = r#"
            reference_sequence_path = "/refs/hg38.fa"
            log_path = "/logs/bamflow.log"
        "#;
        let err = PipelineConfig::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("mail_user")));
    }

    #[test]
    fn rejects_missing_required_fields() {
        assert!(matches!(
            PipelineConfig::from_toml("log_path = \"/x\""),
            Err(PipelineError::Toml(_))
        ));
    }

    #[test]
    fn load_reads_file_and_renders_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bamflow.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("reference_sequence_path = \"/refs/hg38.fa\""));
        assert_eq!(PipelineConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = PipelineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}

//! Slurm job submission through `sbatch --wrap`.
//!
//! Submission is fire-and-forget: [`Slurm::submit`] returns as soon as the
//! scheduler accepted the job. Nothing here waits for or polls a job.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::process::CommandRunner;

/// Everything `sbatch` needs to queue one wrapped shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// `-J`, e.g. `align_sample1`.
    pub job_name: String,
    pub partition: String,
    /// Slurm account charged for the job.
    pub account: String,
    /// Where Slurm writes the job's stdout/stderr.
    pub log_path: PathBuf,
    /// `-t`, in Slurm's `D-HH:MM:SS` form.
    pub walltime: String,
    /// `--mem`, e.g. `48G`.
    pub memory: String,
    /// `-c`, CPUs per task.
    pub cores: u32,
    pub notify_email: String,
    pub mail_type: String,
    /// Shell command run by `--wrap`; every path in it is already quoted.
    pub wrapped_command: String,
}

impl JobSpec {
    pub fn sbatch_args(&self) -> Vec<String> {
        vec![
            "-J".to_string(),
            self.job_name.clone(),
            "-p".to_string(),
            self.partition.clone(),
            "-A".to_string(),
            self.account.clone(),
            "-o".to_string(),
            self.log_path.display().to_string(),
            "-t".to_string(),
            self.walltime.clone(),
            format!("--mem={}", self.memory),
            "-c".to_string(),
            self.cores.to_string(),
            format!("--mail-type={}", self.mail_type),
            format!("--mail-user={}", self.notify_email),
            format!("--wrap={}", self.wrapped_command),
        ]
    }
}

/// What the scheduler said when it accepted a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Parsed from `Submitted batch job <id>`, when present.
    pub job_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with status {status}: {message}")]
    Rejected {
        program: String,
        status: String,
        message: String,
    },
}

pub struct Slurm<'a, R> {
    runner: &'a R,
    sbatch: &'a str,
}

impl<'a, R: CommandRunner> Slurm<'a, R> {
    pub fn new(runner: &'a R, sbatch: &'a str) -> Self {
        Self { runner, sbatch }
    }

    pub async fn submit(&self, spec: &JobSpec) -> Result<SubmissionReceipt, SubmitError> {
        let output = self
            .runner
            .run(self.sbatch, &spec.sbatch_args())
            .await
            .map_err(|source| SubmitError::Spawn {
                program: self.sbatch.to_string(),
                source,
            })?;

        if !output.success() {
            return Err(SubmitError::Rejected {
                program: self.sbatch.to_string(),
                status: output
                    .status_code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                message: output.diagnostic().to_string(),
            });
        }

        let message = output.stdout.trim().to_string();
        let receipt = SubmissionReceipt {
            job_id: parse_job_id(&message),
            message,
        };
        info!(job = %spec.job_name, job_id = ?receipt.job_id, "job submitted");
        Ok(receipt)
    }
}

fn parse_job_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

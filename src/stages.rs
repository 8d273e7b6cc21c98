//! One driver per pipeline stage.
//!
//! A driver builds its command from the item and configuration, runs or
//! submits it, and reports back through the same `Result` type. The marker
//! that records the driver's success is written by the caller, and only after
//! the driver returned `Ok`.

use shell_words::quote;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::markers::MarkerKind;
use crate::process::CommandRunner;
use crate::scheduler::{JobSpec, Slurm, SubmissionReceipt};
use crate::state_machine::{Item, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDriver {
    /// Submit `pbmm2 align` for the unaligned input.
    Align,
    /// Run `samtools quickcheck` on the aligned output, locally.
    Verify,
    /// Submit `samtools stats` on the aligned output.
    Summarize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    Submitted(SubmissionReceipt),
    Verified,
}

impl StageDriver {
    pub fn stage(self) -> Stage {
        match self {
            StageDriver::Align => Stage::Alignment,
            StageDriver::Verify => Stage::Checks,
            StageDriver::Summarize => Stage::Qc,
        }
    }

    /// Marker written once the driver succeeded.
    pub fn success_marker(self) -> MarkerKind {
        match self {
            StageDriver::Align => MarkerKind::AlignmentRunning,
            StageDriver::Verify => MarkerKind::ChecksComplete,
            StageDriver::Summarize => MarkerKind::QcRunning,
        }
    }

    pub async fn run(
        self,
        item: &Item,
        config: &PipelineConfig,
        runner: &impl CommandRunner,
    ) -> Result<DriverOutcome, PipelineError> {
        match self {
            StageDriver::Align => submit(item, self.stage(), &align_job(item, config), config, runner).await,
            StageDriver::Summarize => submit(item, self.stage(), &qc_job(item, config), config, runner).await,
            StageDriver::Verify => verify(item, config, runner).await,
        }
    }
}

/// Shell-quoted form of `path` for the `--wrap` command line.
fn shell_path(path: &std::path::Path) -> String {
    quote(&path.to_string_lossy()).into_owned()
}

/// `pbmm2 align` on the input, sorted, writing `<base>.aligned_sorted.bam`.
pub fn align_job(item: &Item, config: &PipelineConfig) -> JobSpec {
    let threads = config.alignment.threads;
    let wrapped_command = format!(
        "{aligner} align --num-threads {threads} --preset {preset} --strip --unmapped \
         --log-level INFO --sort --sort-memory 1G --sort-threads 4 {reference} {input} {output}",
        aligner = config.tools.aligner,
        preset = config.tools.aligner_preset,
        reference = shell_path(&config.reference_sequence_path),
        input = shell_path(item.input()),
        output = shell_path(&MarkerKind::AlignedOutput.path(item)),
    );

    JobSpec {
        job_name: format!("align_{}", item.base_name()),
        partition: config.scheduler.partition.clone(),
        account: config.scheduler.account.clone(),
        log_path: MarkerKind::AlignmentLog.path(item),
        walltime: config.alignment.time.clone(),
        memory: config.alignment.memory.clone(),
        cores: threads,
        notify_email: config.scheduler.mail_user.clone(),
        mail_type: config.scheduler.mail_type.clone(),
        wrapped_command,
    }
}

/// `samtools stats` on the aligned output. The job touches `<base>.qc_done`
/// only after stats exited successfully.
pub fn qc_job(item: &Item, config: &PipelineConfig) -> JobSpec {
    let threads = config.qc.threads;
    let wrapped_command = format!(
        "{samtools} stats -@ {threads} {aligned} > {stats} && touch {done}",
        samtools = config.tools.samtools,
        aligned = shell_path(&MarkerKind::AlignedOutput.path(item)),
        stats = shell_path(&MarkerKind::StatsOutput.path(item)),
        done = shell_path(&MarkerKind::QcDone.path(item)),
    );

    JobSpec {
        job_name: format!("qc_{}", item.base_name()),
        partition: config.scheduler.partition.clone(),
        account: config.scheduler.account.clone(),
        log_path: MarkerKind::QcLog.path(item),
        walltime: config.qc.time.clone(),
        memory: config.qc.memory.clone(),
        cores: threads,
        notify_email: config.scheduler.mail_user.clone(),
        mail_type: config.scheduler.mail_type.clone(),
        wrapped_command,
    }
}

async fn submit(
    item: &Item,
    stage: Stage,
    spec: &JobSpec,
    config: &PipelineConfig,
    runner: &impl CommandRunner,
) -> Result<DriverOutcome, PipelineError> {
    info!(
        item = %item,
        %stage,
        time = %spec.walltime,
        mem = %spec.memory,
        threads = spec.cores,
        "submitting job"
    );
    Slurm::new(runner, &config.scheduler.sbatch)
        .submit(spec)
        .await
        .map(DriverOutcome::Submitted)
        .map_err(|e| PipelineError::Submission {
            item: item.base_name().to_string(),
            stage,
            message: e.to_string(),
        })
}

/// Header and EOF check on the aligned BAM.
async fn verify(
    item: &Item,
    config: &PipelineConfig,
    runner: &impl CommandRunner,
) -> Result<DriverOutcome, PipelineError> {
    let aligned = MarkerKind::AlignedOutput.path(item);
    let failure = |message: String| PipelineError::Verification {
        item: item.base_name().to_string(),
        input: item.input().to_path_buf(),
        path: aligned.clone(),
        message,
    };

    let output = runner
        .run(
            &config.tools.samtools,
            &["quickcheck".to_string(), aligned.display().to_string()],
        )
        .await
        .map_err(|e| failure(format!("could not run {}: {e}", config.tools.samtools)))?;

    if output.success() {
        Ok(DriverOutcome::Verified)
    } else {
        let detail = match output.diagnostic() {
            "" => "samtools quickcheck rejected the file".to_string(),
            d => d.to_string(),
        };
        Err(failure(detail))
    }
}

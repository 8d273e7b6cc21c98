//! Capability check for the external tools, run once before any item is touched.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::process::CommandRunner;

/// A program the workflow needs, optionally pinned to a version prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
    pub program: String,
    /// `1.13` accepts `1.13` and `1.13.x`.
    pub version_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Available,
    Missing { reason: String },
    WrongVersion { required: String },
}

/// Outcome of probing one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCheck {
    pub program: String,
    /// Version parsed from `--version`, if any.
    pub version: Option<String>,
    pub status: ToolStatus,
}

impl ToolCheck {
    pub fn passed(&self) -> bool {
        self.status == ToolStatus::Available
    }

    fn into_error(self) -> Option<PipelineError> {
        let reason = match self.status {
            ToolStatus::Available => return None,
            ToolStatus::Missing { reason } => reason,
            ToolStatus::WrongVersion { required } => format!(
                "version {required} is required, found {}",
                self.version.as_deref().unwrap_or("unknown")
            ),
        };
        Some(PipelineError::ToolUnavailable {
            tool: self.program,
            reason,
        })
    }
}

pub fn requirements(config: &PipelineConfig) -> Vec<ToolRequirement> {
    let pinned = Some(config.tools.aligner_version.clone()).filter(|v| !v.is_empty());
    vec![
        ToolRequirement {
            program: config.tools.aligner.clone(),
            version_prefix: pinned,
        },
        ToolRequirement {
            program: config.tools.samtools.clone(),
            version_prefix: None,
        },
        ToolRequirement {
            program: config.scheduler.sbatch.clone(),
            version_prefix: None,
        },
    ]
}

/// Runs `<program> --version` and compares the reported version.
pub async fn check_tool(runner: &impl CommandRunner, req: &ToolRequirement) -> ToolCheck {
    let output = match runner.run(&req.program, &["--version".to_string()]).await {
        Ok(output) => output,
        Err(e) => {
            return ToolCheck {
                program: req.program.clone(),
                version: None,
                status: ToolStatus::Missing {
                    reason: e.to_string(),
                },
            };
        }
    };

    if !output.success() {
        return ToolCheck {
            program: req.program.clone(),
            version: None,
            status: ToolStatus::Missing {
                reason: format!("`{} --version` failed: {}", req.program, output.diagnostic()),
            },
        };
    }

    let version = parse_version(&output.stdout).or_else(|| parse_version(&output.stderr));
    let status = match (&req.version_prefix, &version) {
        (Some(required), Some(found)) if version_matches(found, required) => ToolStatus::Available,
        (Some(required), _) => ToolStatus::WrongVersion {
            required: required.clone(),
        },
        (None, _) => ToolStatus::Available,
    };

    ToolCheck {
        program: req.program.clone(),
        version,
        status,
    }
}

pub async fn check_all(runner: &impl CommandRunner, config: &PipelineConfig) -> Vec<ToolCheck> {
    let mut checks = Vec::new();
    for req in requirements(config) {
        checks.push(check_tool(runner, &req).await);
    }
    checks
}

/// Fails with the first tool that did not pass.
pub fn ensure_available(checks: Vec<ToolCheck>) -> Result<(), PipelineError> {
    match checks.into_iter().find_map(ToolCheck::into_error) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// First token on the first line that starts with a digit, e.g. `1.13.1` in `pbmm2 1.13.1`.
fn parse_version(text: &str) -> Option<String> {
    text.lines()
        .next()?
        .split_whitespace()
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
}

fn version_matches(found: &str, required: &str) -> bool {
    found == required || found.starts_with(&format!("{required}."))
}

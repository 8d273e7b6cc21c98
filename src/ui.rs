//! Terminal output: coloured status lines and the batch progress bar.

use std::path::Path;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::PipelineError;
use crate::orchestrator::{Action, AdvanceReport, BatchReport};
use crate::state_machine::ItemState;
use crate::tools::{ToolCheck, ToolStatus};

fn green() -> Style {
    Style::new().green().bold()
}

fn red() -> Style {
    Style::new().red().bold()
}

fn yellow() -> Style {
    Style::new().yellow()
}

/// Glyph for a report: informational states are dimmed, actions are green.
fn report_glyph(report: &AdvanceReport) -> String {
    match report.action {
        Action::None if report.state == ItemState::WorkflowComplete => {
            green().apply_to("✓").to_string()
        }
        Action::None => yellow().apply_to("…").to_string(),
        _ => green().apply_to("→").to_string(),
    }
}

pub fn report_line(report: &AdvanceReport) -> String {
    format!("  {} {report}", report_glyph(report))
}

/// The error and the operator's next step, on two lines.
pub fn error_lines(error: &PipelineError) -> String {
    format!(
        "  {} {error}\n    {} {}",
        red().apply_to("✗"),
        yellow().apply_to("hint:"),
        error.recovery()
    )
}

pub fn print_report(report: &AdvanceReport) {
    println!("{}", report_line(report));
}

/// Prints a fatal error, with a recovery hint when it came from the workflow.
pub fn print_fatal(error: &anyhow::Error) {
    eprintln!("{} {error:#}", red().apply_to("Error:"));
    if let Some(pipeline) = error.downcast_ref::<PipelineError>() {
        eprintln!("  {} {}", yellow().apply_to("hint:"), pipeline.recovery());
    }
}

pub fn print_state(input: &Path, state: ItemState) {
    let style = match state {
        ItemState::WorkflowComplete => green(),
        s if s.is_informational() => yellow(),
        _ => Style::new().cyan(),
    };
    println!("  {} {}", style.apply_to(format!("{:<18}", state.to_string())), input.display());
}

pub fn print_tool_checks(checks: &[ToolCheck]) {
    for check in checks {
        let version = check.version.as_deref().unwrap_or("-");
        match &check.status {
            ToolStatus::Available => {
                println!("  {} {} {version}", green().apply_to("✓"), check.program);
            }
            ToolStatus::Missing { reason } => {
                println!("  {} {}: {reason}", red().apply_to("✗"), check.program);
            }
            ToolStatus::WrongVersion { required } => println!(
                "  {} {} {version} (requires {required})",
                red().apply_to("✗"),
                check.program
            ),
        }
    }
}

/// Progress bar over the inputs of one `advance-all` run.
pub struct BatchProgress {
    pb: ProgressBar,
}

impl BatchProgress {
    pub fn start(total: u64) -> Self {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style.progress_chars("=> "));
        Self { pb }
    }

    /// Prints the outcome of one input above the bar and advances it.
    pub fn item(&self, input: &Path, result: Result<&AdvanceReport, &PipelineError>) {
        match result {
            Ok(report) => self.pb.println(report_line(report)),
            Err(error) => {
                self.pb
                    .println(format!("  {} {}", red().apply_to("✗"), input.display()));
                self.pb.println(error_lines(error));
            }
        }
        self.pb.set_message(input.display().to_string());
        self.pb.inc(1);
    }

    pub fn finish(&self, report: &BatchReport) {
        self.pb.finish_and_clear();
        let summary = format!(
            "{} advanced, {} failed, {} total",
            report.advanced.len(),
            report.failed.len(),
            report.total()
        );
        if report.is_success() {
            println!("{} {summary}", green().apply_to("Done:"));
        } else {
            println!("{} {summary}", red().apply_to("Done with failures:"));
            for failure in &report.failed {
                println!("  {} {}: {}", red().apply_to("✗"), failure.input.display(), failure.error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::state_machine::Stage;

    fn strip(s: &str) -> String {
        console::strip_ansi_codes(s).into_owned()
    }

    #[test]
    fn report_line_shows_message() {
        let report = AdvanceReport {
            item: "sample1".into(),
            input: PathBuf::from("/data/sample1.bam"),
            state: ItemState::WorkflowComplete,
            action: Action::None,
        };
        assert_eq!(
            strip(&report_line(&report)),
            "  ✓ The workflow is complete for sample1. Nothing else to do."
        );
    }

    #[test]
    fn error_lines_carry_recovery_hint() {
        let error = PipelineError::RemoteJobFailed {
            item: "sample1".into(),
            input: PathBuf::from("/data/sample1.bam"),
            stage: Stage::Qc,
            log: PathBuf::from("/data/sample1.qc_slurm_out"),
            rolled_back: false,
        };
        let text = strip(&error_lines(&error));
        assert!(text.contains("Remote qc job for sample1 failed"));
        assert!(text.ends_with("hint: run `bamflow reset /data/sample1.bam --stage qc` to retry"));
    }
}

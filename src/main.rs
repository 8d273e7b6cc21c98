mod activity_log;
mod cli;
mod config;
mod env;
mod error;
mod markers;
mod orchestrator;
mod process;
mod qc;
mod scheduler;
mod stages;
mod state_machine;
mod tools;
mod ui;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::PipelineConfig;
use orchestrator::{Workflow, discover_inputs};
use process::SystemRunner;
use state_machine::Item;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            ui::print_fatal(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "bamflow=debug" } else { "bamflow=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        // Merging finished records needs neither configuration nor tools.
        Command::Summarize { qc_folder, output } => {
            let merged = qc::create_summary(&qc_folder, &output)?;
            println!("Merged {merged} QC records into {}", output.display());
        }
        Command::Advance { file } => {
            let workflow = workflow(true).await?;
            let item = Item::from_path(&file)?;
            let report = workflow.advance(&item).await?;
            ui::print_report(&report);
        }
        Command::AdvanceAll { dir } => {
            let workflow = workflow(true).await?;
            let inputs = discover_inputs(&dir)
                .with_context(|| format!("failed to scan {}", dir.display()))?;
            let progress = ui::BatchProgress::start(inputs.len() as u64);
            let report = workflow
                .advance_all(inputs, |input, result| progress.item(input, result))
                .await;
            progress.finish(&report);
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Status { path } => print_status(&workflow(false).await?, &path)?,
        Command::Reset { file, stage } => {
            let workflow = workflow(false).await?;
            let item = Item::from_path(&file)?;
            workflow.reset(&item, stage)?;
            println!("Reset {stage} for {item}.");
        }
        Command::SearchLog { term } => {
            let workflow = workflow(false).await?;
            let log = workflow.activity_log();
            let lines = log
                .search(&term)
                .with_context(|| format!("failed to read activity log {}", log.path().display()))?;
            for line in lines {
                println!("{line}");
            }
        }
        Command::Config { json } => {
            let workflow = workflow(false).await?;
            let rendered = if json {
                serde_json::to_string_pretty(workflow.config())?
            } else {
                workflow.config().to_toml_string()?
            };
            println!("{rendered}");
        }
        Command::CheckTools => {
            let checks = workflow(false).await?.check_tools().await;
            ui::print_tool_checks(&checks);
            if !checks.iter().all(tools::ToolCheck::passed) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Validates the environment, loads the configuration and, for commands that
/// act on items, checks the external tools.
async fn workflow(preflight: bool) -> Result<Workflow<SystemRunner>> {
    env::check_all()?;
    let config = PipelineConfig::from_env()?;
    debug!("effective configuration:\n{}", config.to_toml_string()?);

    let workflow = Workflow::new(config, SystemRunner);
    if preflight {
        workflow.preflight().await?;
    }
    Ok(workflow)
}

fn print_status(workflow: &Workflow<SystemRunner>, path: &Path) -> Result<()> {
    let inputs = if path.is_dir() {
        discover_inputs(path).with_context(|| format!("failed to scan {}", path.display()))?
    } else {
        vec![path.to_path_buf()]
    };
    for input in inputs {
        let item = Item::from_path(&input)?;
        ui::print_state(&input, workflow.state(&item)?);
    }
    Ok(())
}

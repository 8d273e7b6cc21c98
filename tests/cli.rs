use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bamflow() -> Command {
    let mut cmd = Command::cargo_bin("bamflow").unwrap();
    cmd.env_remove("BAMFLOW_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// Writes a minimal config into `dir` and returns its path.
fn write_config(dir: &Path) -> String {
    let path = dir.join("bamflow.toml");
    let contents = format!(
        r#"
reference_sequence_path = "/refs/hg38.fa"
log_path = "{}"

[scheduler]
mail_user = "someone@example.org"
"#,
        dir.join("bamflow.log").display()
    );
    fs::write(&path, contents).unwrap();
    path.display().to_string()
}

#[test]
fn missing_config_variable_is_fatal() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("sample1.bam");
    fs::write(&input, b"u").unwrap();

    bamflow()
        .arg("advance")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("BAMFLOW_CONFIG is a required environment variable"));
    assert!(!dir.path().join("sample1.alignment_running").exists());
}

#[test]
fn unknown_stage_is_a_usage_error() {
    bamflow()
        .args(["reset", "sample1.bam", "--stage", "stats"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid workflow stage 'stats'"));
}

#[test]
fn config_prints_effective_values() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    bamflow()
        .env("BAMFLOW_CONFIG", &config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("partition = \"park\""))
        .stdout(predicate::str::contains("aligner_version = \"1.13\""));

    bamflow()
        .env("BAMFLOW_CONFIG", &config)
        .args(["config", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"reference_sequence_path\": \"/refs/hg38.fa\""));
}

#[test]
fn malformed_config_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bamflow.toml");
    fs::write(&path, "reference_sequence_path = \"/refs/hg38.fa\"\n").unwrap();

    bamflow()
        .env("BAMFLOW_CONFIG", &path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config file"));
}

#[test]
fn status_reports_without_acting() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("sample1.bam");
    fs::write(&input, b"u").unwrap();

    bamflow()
        .env("BAMFLOW_CONFIG", &config)
        .arg("status")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT_STARTED"))
        .stdout(predicate::str::contains("sample1.bam"));
    assert!(!dir.path().join("sample1.alignment_running").exists());
}

#[test]
fn reset_removes_downstream_markers() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("sample1.bam");
    fs::write(&input, b"u").unwrap();
    for suffix in ["alignment_running", "checks_complete", "qc_running"] {
        fs::write(dir.path().join(format!("sample1.{suffix}")), b"").unwrap();
    }

    bamflow()
        .env("BAMFLOW_CONFIG", &config)
        .arg("reset")
        .arg(&input)
        .args(["--stage", "checks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset checks for sample1."));

    assert!(dir.path().join("sample1.alignment_running").exists());
    assert!(!dir.path().join("sample1.checks_complete").exists());
    assert!(!dir.path().join("sample1.qc_running").exists());

    bamflow()
        .env("BAMFLOW_CONFIG", &config)
        .args(["search-log", "RESETTING"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resetting workflow step 'checks'"));
}

#[test]
fn summarize_merges_records() {
    let dir = TempDir::new().unwrap();
    let qc = dir.path().join("qc");
    fs::create_dir_all(&qc).unwrap();
    fs::write(qc.join("a.qc"), "m1\tm2\n1\t2\n").unwrap();
    fs::write(qc.join("b.qc"), "m1\tm2\n3\t4\n").unwrap();
    let output = dir.path().join("summary.tsv");

    bamflow()
        .arg("summarize")
        .arg("--qc-folder")
        .arg(&qc)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Merged 2 QC records"));

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "File name\tm1\tm2\na.qc\t1\t2\nb.qc\t3\t4\n"
    );
}

#[test]
fn summarize_rejects_mixed_headers() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.qc"), "m1\n1\n").unwrap();
    fs::write(dir.path().join("b.qc"), "m2\n2\n").unwrap();

    bamflow()
        .arg("summarize")
        .arg("--qc-folder")
        .arg(dir.path())
        .arg("--output")
        .arg(dir.path().join("summary.tsv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("different header"));
}

//! Environment variables that must be set before any item is processed.

use crate::error::PipelineError;

pub const CONFIG_ENV: &str = "BAMFLOW_CONFIG";

/// Every required variable with the purpose shown when it is missing.
pub const REQUIRED_ENV_VARIABLES: &[(&str, &str)] = &[(
    CONFIG_ENV,
    "Absolute path where the bamflow TOML configuration file is stored.",
)];

/// Checks every required variable against the process environment.
pub fn check_all() -> Result<(), PipelineError> {
    check_all_with(|var| std::env::var(var).ok())
}

/// Returns the value of a required variable.
pub fn require(var: &str) -> Result<String, PipelineError> {
    require_with(var, |v| std::env::var(v).ok())
}

pub fn check_all_with(lookup: impl Fn(&str) -> Option<String>) -> Result<(), PipelineError> {
    for (var, _) in REQUIRED_ENV_VARIABLES {
        require_with(var, &lookup)?;
    }
    Ok(())
}

fn require_with(
    var: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, PipelineError> {
    let (name, purpose) = REQUIRED_ENV_VARIABLES
        .iter()
        .find(|(name, _)| *name == var)
        .copied()
        .ok_or_else(|| PipelineError::Config(format!("{var} is not a required variable")))?;

    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(PipelineError::MissingEnv { var: name, purpose }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_reported_with_purpose() {
        let err = check_all_with(|_| None).unwrap_err();
        match err {
            PipelineError::MissingEnv { var, purpose } => {
                assert_eq!(var, CONFIG_ENV);
                assert!(purpose.contains("configuration file"));
            }
            other => panic!("expected MissingEnv, got {other:?}"),
        }
    }

    #[test]
    fn empty_value_counts_as_missing() {
        assert!(check_all_with(|_| Some("  ".into())).is_err());
    }

    #[test]
    fn present_variables_pass() {
        assert!(check_all_with(|_| Some("/etc/bamflow.toml".into())).is_ok());
        let value = require_with(CONFIG_ENV, |_| Some("/etc/bamflow.toml".into())).unwrap();
        assert_eq!(value, "/etc/bamflow.toml");
    }

    #[test]
    fn unknown_variable_is_rejected() {
        assert!(matches!(
            require_with("HOME", |_| Some("/root".into())),
            Err(PipelineError::Config(_))
        ));
    }
}

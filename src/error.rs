//! Unified error type hierarchy for the bn128 packager.
//!
//! Provides structured error handling with ConfigError and PipelineError.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::StepKind;

/// Exit code reported when the run is interrupted (128 + SIGINT).
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Pipeline execution errors.
///
/// Every variant halts the run. Nothing is retried or rolled back.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to remove output directory {path}: {source}")]
    OutputDirRemoval { path: PathBuf, source: io::Error },

    #[error("Failed to create output directory {path}: {source}")]
    OutputDirCreation { path: PathBuf, source: io::Error },

    #[error("Refusing to manage output directory: {0}")]
    UnsafeOutputDir(String),

    #[error("Failed to spawn {step} command '{command}': {source}")]
    StepSpawn {
        step: StepKind,
        command: String,
        source: io::Error,
    },

    #[error("{step} step failed with exit code {code}")]
    StepFailed { step: StepKind, code: i32 },

    #[error("{step} step terminated by signal {}", signal_label(.signal))]
    StepTerminated { step: StepKind, signal: Option<i32> },

    #[error("{step} step I/O error: {source}")]
    StepIo { step: StepKind, source: io::Error },

    #[error("Build did not produce expected artifact: {0}")]
    ArtifactMissing(PathBuf),

    #[error("Failed to move artifact {from} to {to}: {source}")]
    ArtifactMove {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Invalid phase transition: {0}")]
    InvalidTransition(String),

    #[error("Pipeline cancelled by user")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Process exit code for this error.
    ///
    /// A failing external step propagates its own exit code, the way a
    /// `&&`-chained shell script would: 128 + signo for a signal.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Cancelled => CANCELLED_EXIT_CODE,
            _ => match self.step_exit_code() {
                Some(code) if code != 0 => code,
                _ => 1,
            },
        }
    }

    /// Shell-style exit status of the external command behind this error.
    ///
    /// `None` when no command ran to an exit (spawn failure, cancellation,
    /// filesystem errors) or the killing signal is unknown.
    pub fn step_exit_code(&self) -> Option<i32> {
        match self {
            PipelineError::StepFailed { code, .. } => Some(*code),
            PipelineError::StepTerminated {
                signal: Some(signo),
                ..
            } => Some(128 + signo),
            _ => None,
        }
    }

    /// Get a short user-facing message for the terminal.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::OutputDirRemoval { path, .. }
            | PipelineError::OutputDirCreation { path, .. } => {
                format!("Output directory {} is not writable", path.display())
            }
            PipelineError::StepSpawn { command, .. } => {
                format!("Could not start '{}' (is the toolchain installed?)", command)
            }
            PipelineError::StepFailed { step, code } => {
                format!("{} failed (exit code {})", step.display_name(), code)
            }
            PipelineError::ArtifactMissing(path) => {
                format!("Expected artifact not found at {}", path.display())
            }
            other => other.to_string(),
        }
    }
}

fn signal_label(signal: &Option<i32>) -> String {
    match signal {
        Some(signo) => signo.to_string(),
        None => "(unknown)".to_string(),
    }
}

/// Top-level result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_propagates_exit_code() {
        let err = PipelineError::StepFailed {
            step: StepKind::Test,
            code: 2,
        };
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.to_string(), "test step failed with exit code 2");
    }

    #[test]
    fn test_other_errors_exit_one() {
        let err = PipelineError::ArtifactMissing(PathBuf::from("libbn128.so"));
        assert_eq!(err.exit_code(), 1);

        let err = PipelineError::StepTerminated {
            step: StepKind::Build,
            signal: None,
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.step_exit_code(), None);
    }

    #[test]
    fn test_signal_exit_code_matches_shell() {
        let err = PipelineError::StepTerminated {
            step: StepKind::Test,
            signal: Some(15),
        };
        assert_eq!(err.exit_code(), 143);
        assert_eq!(err.to_string(), "test step terminated by signal 15");
    }

    #[test]
    fn test_cancelled_exit_code() {
        assert_eq!(PipelineError::Cancelled.exit_code(), CANCELLED_EXIT_CODE);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::FileNotFound("/etc/bn128.toml".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration file not found: /etc/bn128.toml"
        );
    }

    #[test]
    fn test_user_message_mentions_step() {
        let err = PipelineError::StepFailed {
            step: StepKind::FetchDependencies,
            code: 1,
        };
        assert!(err.user_message().contains("Dependency fetch"));
    }
}

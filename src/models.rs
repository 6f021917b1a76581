//! Core data types for the bn128 packager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::orchestrator::state::PipelinePhase;

/// One of the four external toolchain steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    FetchDependencies,
    Clean,
    Test,
    Build,
}

impl StepKind {
    /// All external steps in execution order.
    pub const ALL: [StepKind; 4] = [
        StepKind::FetchDependencies,
        StepKind::Clean,
        StepKind::Test,
        StepKind::Build,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::FetchDependencies => "fetch",
            StepKind::Clean => "clean",
            StepKind::Test => "test",
            StepKind::Build => "build",
        }
    }

    /// Human-readable name used in status lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            StepKind::FetchDependencies => "Dependency fetch",
            StepKind::Clean => "Clean",
            StepKind::Test => "Test suite",
            StepKind::Build => "Shared library build",
        }
    }

    /// The pipeline phase that runs this step.
    pub fn phase(&self) -> PipelinePhase {
        match self {
            StepKind::FetchDependencies => PipelinePhase::FetchDependencies,
            StepKind::Clean => PipelinePhase::Clean,
            StepKind::Test => PipelinePhase::Test,
            StepKind::Build => PipelinePhase::Build,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external command: program, fixed arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Variables added on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-like rendering for logs, e.g. `GOOS=linux go build -o libbn128.so`.
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, quote_arg(v)))
            .collect();
        parts.push(quote_arg(&self.program));
        parts.extend(self.args.iter().map(|a| quote_arg(a)));
        parts.join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}

/// Outcome of one finished phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PipelinePhase,
    pub duration_ms: u64,
    /// Exit code for phases backed by an external command.
    pub exit_code: Option<i32>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed {
        phase: PipelinePhase,
        /// Exit code the packager itself reports.
        exit_code: i32,
        error: String,
    },
}

/// Summary of one pipeline run, successful or not.
///
/// `phases` lists every phase that started, the failing one last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub phases: Vec<PhaseRecord>,
    pub output_dir: PathBuf,
    /// Installed artifact; only set on success.
    pub artifact_path: Option<PathBuf>,
}

impl RunReport {
    pub fn total_duration_ms(&self) -> u64 {
        self.phases.iter().map(|p| p.duration_ms).sum()
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

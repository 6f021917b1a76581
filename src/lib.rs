//! bn128 packager
//!
//! Builds the `libbn128.so` native library, runs its tests, and installs the
//! shared object into the resource tree of the project that loads it.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Step kinds, command specs and run reports
//! - **config**: Pipeline configuration, TOML loading and validation
//! - **orchestrator**: Fail-fast sequential pipeline and phase tracking
//! - **log_collector**: Disk-persisted run logs behind the `log` facade

pub mod config;
pub mod error;
pub mod log_collector;
pub mod models;
pub mod orchestrator;

// Re-export the log crate for macro usage
pub use log;

pub use config::{ConfigOverrides, PipelineConfig, StepCommands};
pub use error::{ConfigError, PipelineError, Result};
pub use log_collector::{LogCollector, LogLine};
pub use models::{CommandSpec, PhaseRecord, RunOutcome, RunReport, StepKind};
pub use orchestrator::{OrchestrationState, Orchestrator, PipelinePhase};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

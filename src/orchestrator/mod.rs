//! Build Orchestration: 7-step packaging pipeline
//! (prepare output -> fetch -> clean -> test -> build -> relocate).
//!
//! Steps run strictly in order and the first failure halts the run. Nothing
//! is retried and completed steps are not rolled back: if the build fails the
//! output directory is left existing and empty.

pub mod executor;
pub mod phases;
pub mod state;

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};

pub use executor::{parse_milestone, run_step, OutputLine, OutputStream, StepOutcome};
pub use phases::{prepare_output_dir, relocate_artifact};
pub use state::{OrchestrationState, PipelinePhase};

use crate::config::{validate_config, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::log_collector::{session_file_name, LogCollector};
use crate::models::{PhaseRecord, RunOutcome, RunReport, StepKind};

/// Drives one packaging run with phase tracking and log routing.
#[derive(Clone)]
pub struct Orchestrator {
    config: PipelineConfig,

    /// Shared mutable state protected by RwLock for thread safety
    state: Arc<RwLock<OrchestrationState>>,

    /// Receives `true` when the run should be abandoned
    cancel_rx: watch::Receiver<bool>,

    /// Persists step output and milestones
    pub log_collector: Option<Arc<LogCollector>>,
}

impl Orchestrator {
    /// Create an orchestrator for `config`. No filesystem side effects.
    ///
    /// # Examples
    /// ```ignore
    /// let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    /// let orch = Orchestrator::new(PipelineConfig::default(), cancel_rx, None);
    /// let report = orch.run().await?;
    /// ```
    pub fn new(
        config: PipelineConfig,
        cancel_rx: watch::Receiver<bool>,
        log_collector: Option<Arc<LogCollector>>,
    ) -> Self {
        Orchestrator {
            config,
            state: Arc::new(RwLock::new(OrchestrationState::new())),
            cancel_rx,
            log_collector,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the current pipeline phase.
    pub async fn current_phase(&self) -> PipelinePhase {
        self.state.read().await.phase
    }

    /// Get the current progress percentage (0-100).
    pub async fn current_progress(&self) -> u32 {
        self.state.read().await.progress
    }

    /// Copy of the full state.
    pub async fn state_snapshot(&self) -> OrchestrationState {
        self.state.read().await.clone()
    }

    /// Transition to the next phase, logging a milestone.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the move is illegal from the current phase
    pub async fn transition_phase(&self, next_phase: PipelinePhase) -> Result<()> {
        self.state
            .write()
            .await
            .transition_to(next_phase)
            .map_err(PipelineError::InvalidTransition)?;
        self.status(format!("PHASE: {}", next_phase));
        Ok(())
    }

    /// Record an error and transition to the Failed phase.
    pub async fn record_error(&self, error: String) {
        self.state.write().await.record_error(error);
    }

    /// The ordered actions a run would perform, without performing them.
    pub fn plan(&self) -> Vec<String> {
        let output_dir = self.config.output_dir();
        let mut plan = vec![
            format!("rm -rf {}", output_dir.display()),
            format!("mkdir -p {}", output_dir.display()),
        ];
        plan.extend(
            StepKind::ALL
                .iter()
                .map(|step| self.config.commands.get(*step).display()),
        );
        plan.push(format!(
            "mv {} {}",
            self.config.artifact_source().display(),
            output_dir.display()
        ));
        plan
    }

    /// Run the whole pipeline.
    ///
    /// On success returns the report. When a log collector is attached the
    /// report is also written as JSON under `<log_dir>/reports/`, for failed
    /// runs as well.
    pub async fn run(&self) -> Result<RunReport> {
        {
            let mut state = self.state.write().await;
            if state.phase.is_terminal() || !state.completed.is_empty() {
                *state = OrchestrationState::new();
            }
        }

        if let Some(ref collector) = self.log_collector {
            match collector.start_new_session(&session_file_name()) {
                Ok(path) => log::debug!("Session log: {}", path.display()),
                Err(e) => log::warn!("Could not start session log: {}", e),
            }
        }

        let started_at = Utc::now();
        let mut records = Vec::with_capacity(PipelinePhase::SEQUENCE.len());

        match self.run_phases(&mut records).await {
            Ok(artifact_path) => {
                self.transition_phase(PipelinePhase::Completed).await?;
                self.status(format!(
                    "Packaged {} in {} ms",
                    artifact_path.display(),
                    records.iter().map(|r| r.duration_ms).sum::<u64>()
                ));
                let report = self.report(
                    started_at,
                    RunOutcome::Succeeded,
                    records,
                    Some(artifact_path),
                );
                self.write_report(&report);
                Ok(report)
            }
            Err(e) => {
                let phase = self.current_phase().await;
                self.record_error(e.to_string()).await;
                self.status(format!("FAILED during {}: {}", phase, e));
                let outcome = RunOutcome::Failed {
                    phase,
                    exit_code: e.exit_code(),
                    error: e.to_string(),
                };
                self.write_report(&self.report(started_at, outcome, records, None));
                Err(e)
            }
        }
    }

    /// Runs every phase, appending a record for each one that starts.
    async fn run_phases(&self, records: &mut Vec<PhaseRecord>) -> Result<PathBuf> {
        let output_dir = self.config.output_dir();

        // Steps 1-2
        let started = Instant::now();
        self.status(format!("Preparing output directory {}", output_dir.display()));
        // Never wipe a path that fails validation.
        let prepared = validate_config(&self.config)
            .map_err(PipelineError::from)
            .and_then(|()| prepare_output_dir(&output_dir));
        push_record(records, PipelinePhase::PrepareOutput, started, &prepared, None);
        prepared?;

        // Steps 3-6
        for step in StepKind::ALL {
            self.transition_phase(step.phase()).await?;
            let started = Instant::now();
            let outcome = self.run_external(step).await;
            let exit_code = outcome.as_ref().ok().map(|o| o.exit_code);
            push_record(records, step.phase(), started, &outcome, exit_code);
            outcome?;
        }

        // Step 7
        self.transition_phase(PipelinePhase::Relocate).await?;
        let started = Instant::now();
        let artifact = relocate_artifact(
            &self.config.working_dir,
            &self.config.artifact_name,
            &output_dir,
        );
        push_record(records, PipelinePhase::Relocate, started, &artifact, None);

        artifact
    }

    fn report(
        &self,
        started_at: chrono::DateTime<Utc>,
        outcome: RunOutcome,
        phases: Vec<PhaseRecord>,
        artifact_path: Option<PathBuf>,
    ) -> RunReport {
        RunReport {
            started_at,
            finished_at: Utc::now(),
            outcome,
            phases,
            output_dir: self.config.output_dir(),
            artifact_path,
        }
    }

    async fn run_external(&self, step: StepKind) -> Result<StepOutcome> {
        let spec = self.config.commands.get(step);
        self.status(format!("{}: {}", step.display_name(), spec.display()));

        let collector = self.log_collector.clone();
        let mut cancel_rx = self.cancel_rx.clone();
        let outcome = run_step(
            step,
            spec,
            &self.config.working_dir,
            move |line| match collector {
                Some(ref c) => {
                    c.log_str(line.formatted());
                    if let Some(milestone) = line.milestone {
                        c.log_parsed(milestone);
                    }
                }
                None => log::debug!("[{}] {}", line.step, line.formatted()),
            },
            &mut cancel_rx,
        )
        .await?;

        log::debug!(
            "{} finished in {:?} ({} lines)",
            step,
            outcome.duration,
            outcome.lines
        );
        Ok(outcome)
    }

    /// High-level status line, routed to the parsed log.
    fn status(&self, message: String) {
        match self.log_collector {
            Some(ref collector) => collector.log_parsed(message),
            None => log::info!(target: "parsed", "{}", message),
        }
    }

    fn write_report(&self, report: &RunReport) {
        let Some(ref collector) = self.log_collector else {
            return;
        };

        let name = collector
            .session_log_path()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().replace("_full", "")))
            .unwrap_or_else(|| report.started_at.format("%Y%m%d_%H%M%S").to_string());
        let dir = collector.log_dir().join("reports");
        let path = dir.join(format!("{}_report.json", name));

        let result = std::fs::create_dir_all(&dir)
            .map_err(|e| e.to_string())
            .and_then(|_| serde_json::to_string_pretty(report).map_err(|e| e.to_string()))
            .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));

        match result {
            Ok(()) => log::debug!("Run report written to {}", path.display()),
            // Best effort: never changes the outcome of the run.
            Err(e) => log::warn!("Could not write run report {}: {}", path.display(), e),
        }
    }
}

/// Record a finished phase. A failed external step keeps its shell-style
/// exit code.
fn push_record<T>(
    records: &mut Vec<PhaseRecord>,
    phase: PipelinePhase,
    started: Instant,
    result: &Result<T>,
    exit_code_on_success: Option<i32>,
) {
    let exit_code = match result {
        Ok(_) => exit_code_on_success,
        Err(e) => e.step_exit_code(),
    };
    records.push(PhaseRecord {
        phase,
        duration_ms: started.elapsed().as_millis() as u64,
        exit_code,
    });
}

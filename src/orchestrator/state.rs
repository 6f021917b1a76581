//! Pipeline State Management and Phase Tracking
//!
//! This module provides the state tracking structures used by the orchestrator
//! to drive the packaging pipeline across its phases.
//!
//! **Architecture**:
//! - `PipelinePhase`: Enum representing discrete pipeline phases
//! - `OrchestrationState`: Struct tracking current phase, progress, and history
//! - State transitions are validated; only the fixed forward order is legal

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Pipeline phase enumeration - discrete states in the run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// Steps 1-2: delete and recreate the output directory
    PrepareOutput,

    /// Step 3: resolve external build dependencies
    FetchDependencies,

    /// Step 4: remove previous build outputs
    Clean,

    /// Step 5: run the library's test suite
    Test,

    /// Step 6: compile the Linux shared object
    Build,

    /// Step 7: move the artifact into the output directory
    Relocate,

    /// All steps succeeded
    Completed,

    /// A step failed; the run halted
    Failed,
}

impl PipelinePhase {
    /// Phases that do work, in execution order.
    pub const SEQUENCE: [PipelinePhase; 6] = [
        PipelinePhase::PrepareOutput,
        PipelinePhase::FetchDependencies,
        PipelinePhase::Clean,
        PipelinePhase::Test,
        PipelinePhase::Build,
        PipelinePhase::Relocate,
    ];

    /// Get the human-readable name for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::PrepareOutput => "prepare-output",
            PipelinePhase::FetchDependencies => "fetch-dependencies",
            PipelinePhase::Clean => "clean",
            PipelinePhase::Test => "test",
            PipelinePhase::Build => "build",
            PipelinePhase::Relocate => "relocate",
            PipelinePhase::Completed => "completed",
            PipelinePhase::Failed => "failed",
        }
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> Vec<PipelinePhase> {
        match self {
            PipelinePhase::PrepareOutput => vec![PipelinePhase::FetchDependencies, PipelinePhase::Failed],
            PipelinePhase::FetchDependencies => vec![PipelinePhase::Clean, PipelinePhase::Failed],
            PipelinePhase::Clean => vec![PipelinePhase::Test, PipelinePhase::Failed],
            PipelinePhase::Test => vec![PipelinePhase::Build, PipelinePhase::Failed],
            PipelinePhase::Build => vec![PipelinePhase::Relocate, PipelinePhase::Failed],
            PipelinePhase::Relocate => vec![PipelinePhase::Completed, PipelinePhase::Failed],
            PipelinePhase::Completed => vec![],
            PipelinePhase::Failed => vec![PipelinePhase::PrepareOutput], // fresh run
        }
    }

    /// Check if a transition to the given phase is valid.
    pub fn can_transition_to(&self, next: PipelinePhase) -> bool {
        self.valid_next_phases().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelinePhase::Completed | PipelinePhase::Failed)
    }

    /// Progress percentage reached once this phase has finished.
    pub fn progress_after(&self) -> u32 {
        match self {
            PipelinePhase::PrepareOutput => 5,
            PipelinePhase::FetchDependencies => 20,
            PipelinePhase::Clean => 25,
            PipelinePhase::Test => 60,
            PipelinePhase::Build => 95,
            PipelinePhase::Relocate | PipelinePhase::Completed => 100,
            PipelinePhase::Failed => 0,
        }
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run state snapshot for tracking progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    /// Current pipeline phase
    pub phase: PipelinePhase,

    /// Overall progress percentage (0-100)
    pub progress: u32,

    /// Phases finished successfully, in order
    pub completed: Vec<PipelinePhase>,

    /// Run start timestamp
    pub start_time: SystemTime,

    /// Last phase update timestamp
    pub last_update_time: SystemTime,

    /// Error message if the run failed
    pub error: Option<String>,

    /// Phase that was active when the run failed
    pub failed_phase: Option<PipelinePhase>,
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestrationState {
    pub fn new() -> Self {
        let now = SystemTime::now();
        OrchestrationState {
            phase: PipelinePhase::PrepareOutput,
            progress: 0,
            completed: Vec::new(),
            start_time: now,
            last_update_time: now,
            error: None,
            failed_phase: None,
        }
    }

    /// Attempt to transition to the next phase.
    ///
    /// Leaving a working phase for anything but `Failed` marks it completed.
    pub fn transition_to(&mut self, next_phase: PipelinePhase) -> Result<(), String> {
        if !self.phase.can_transition_to(next_phase) {
            return Err(format!(
                "Invalid phase transition: {} -> {}",
                self.phase.as_str(),
                next_phase.as_str()
            ));
        }

        match next_phase {
            PipelinePhase::Failed => {}
            PipelinePhase::PrepareOutput => {
                // Restart after failure
                *self = OrchestrationState::new();
                return Ok(());
            }
            _ => {
                self.completed.push(self.phase);
                self.progress = self.phase.progress_after();
            }
        }

        self.phase = next_phase;
        self.last_update_time = SystemTime::now();
        Ok(())
    }

    /// Record an error and mark the run as failed.
    pub fn record_error(&mut self, error: String) {
        if self.phase != PipelinePhase::Failed {
            self.failed_phase = Some(self.phase);
        }
        self.error = Some(error);
        self.phase = PipelinePhase::Failed;
        self.last_update_time = SystemTime::now();
    }

    pub fn has_completed(&self, phase: PipelinePhase) -> bool {
        self.completed.contains(&phase)
    }
}

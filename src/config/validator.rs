//! Configuration validation.
//!
//! Rejects settings that would make the orchestrator delete or write outside
//! the intended resource directory, or run an empty command.

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::models::StepKind;
use std::path::{Component, Path};

/// Validate a resolved configuration.
pub fn validate_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.working_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "working_dir cannot be empty".to_string(),
        ));
    }

    if config.output_base.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "output_base cannot be empty".to_string(),
        ));
    }

    validate_output_subdir(&config.output_subdir)?;
    validate_artifact_name(&config.artifact_name)?;

    for step in StepKind::ALL {
        let command = config.commands.get(step);
        if command.program.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "{} command has an empty program",
                step
            )));
        }
        if let Some(key) = command.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(ConfigError::ValidationFailed(format!(
                "{} command has invalid environment variable name '{}'",
                step, key
            )));
        }
    }

    Ok(())
}

/// The subdirectory must stay strictly below the output base.
///
/// A value like `.` would make the output directory the base itself, and
/// step 1 would wipe the whole resource tree.
fn validate_output_subdir(subdir: &Path) -> Result<(), ConfigError> {
    if subdir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "output_subdir cannot be empty".to_string(),
        ));
    }

    let mut depth = 0_usize;
    for component in subdir.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ConfigError::ValidationFailed(format!(
                    "output_subdir must not contain '..': {}",
                    subdir.display()
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ConfigError::ValidationFailed(format!(
                    "output_subdir must be relative: {}",
                    subdir.display()
                )))
            }
        }
    }

    if depth == 0 {
        return Err(ConfigError::ValidationFailed(format!(
            "output_subdir must name a directory below output_base: {}",
            subdir.display()
        )));
    }

    Ok(())
}

/// The artifact name must be a bare file name.
fn validate_artifact_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(ConfigError::ValidationFailed(format!(
            "artifact_name is not a file name: '{}'",
            name
        )));
    }

    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(ConfigError::ValidationFailed(format!(
            "artifact_name must not contain path separators: '{}'",
            name
        )));
    }

    Ok(())
}

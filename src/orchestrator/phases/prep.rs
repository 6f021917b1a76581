//! Steps 1-2: Output directory preparation.
//!
//! The output directory is destroyed and recreated on every run so no stale
//! artifact from a previous run can survive. This runs before any external
//! tool, so an unwritable destination aborts the pipeline without touching
//! the build tree.

use crate::error::{PipelineError, Result};
use std::fs;
use std::io;
use std::path::{Component, Path};

/// Delete `output_dir` recursively if present, then create it with parents.
///
/// # Returns
/// * `Ok(true)` if a previous directory was removed
/// * `Ok(false)` if there was nothing to remove
/// * `Err(PipelineError::OutputDirRemoval | OutputDirCreation)` on I/O failure
pub fn prepare_output_dir(output_dir: &Path) -> Result<bool> {
    guard_output_dir(output_dir)?;

    let removed = match fs::symlink_metadata(output_dir) {
        Ok(meta) => {
            let result = if meta.is_dir() {
                fs::remove_dir_all(output_dir)
            } else {
                // A stray file or symlink where the directory should be
                fs::remove_file(output_dir)
            };
            match result {
                Ok(()) => true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(source) => {
                    return Err(PipelineError::OutputDirRemoval {
                        path: output_dir.to_path_buf(),
                        source,
                    })
                }
            }
        }
        // Nothing there, or a parent that is not a directory; create reports the latter.
        Err(_) => false,
    };

    if removed {
        log::info!("Removed previous output directory {}", output_dir.display());
    }

    fs::create_dir_all(output_dir).map_err(|source| PipelineError::OutputDirCreation {
        path: output_dir.to_path_buf(),
        source,
    })?;

    log::info!("Output directory ready: {}", output_dir.display());
    Ok(removed)
}

/// Refuse paths whose recursive deletion would be catastrophic.
fn guard_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.as_os_str().is_empty() {
        return Err(PipelineError::UnsafeOutputDir(
            "output directory path is empty".to_string(),
        ));
    }

    let has_normal_component = output_dir
        .components()
        .any(|c| matches!(c, Component::Normal(_)));
    if !has_normal_component {
        return Err(PipelineError::UnsafeOutputDir(format!(
            "{} does not name a directory below a base path",
            output_dir.display()
        )));
    }

    Ok(())
}

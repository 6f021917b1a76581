//! Step 7: Artifact relocation.
//!
//! Moves the shared object from the working directory into the output
//! directory. The source must not remain after a successful move.

use crate::error::{PipelineError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Move `working_dir/artifact_name` into `output_dir`.
///
/// Uses a rename; across filesystems it falls back to copy then remove,
/// which is what `mv` does.
///
/// # Returns
/// * `Ok(path)` of the artifact at its destination
/// * `Err(PipelineError::ArtifactMissing)` if the build left no such file
/// * `Err(PipelineError::ArtifactMove)` if the move itself fails
pub fn relocate_artifact(
    working_dir: &Path,
    artifact_name: &str,
    output_dir: &Path,
) -> Result<PathBuf> {
    let source = working_dir.join(artifact_name);
    let destination = output_dir.join(artifact_name);

    if !source.is_file() {
        return Err(PipelineError::ArtifactMissing(source));
    }

    let move_error = |source_err: io::Error| PipelineError::ArtifactMove {
        from: source.clone(),
        to: destination.clone(),
        source: source_err,
    };

    match fs::rename(&source, &destination) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            log::debug!(
                "rename crosses filesystems, copying {} instead",
                source.display()
            );
            copy_then_remove(&source, &destination).map_err(move_error)?;
        }
        Err(e) => return Err(move_error(e)),
    }

    log::info!(
        "Moved {} -> {}",
        source.display(),
        destination.display()
    );
    Ok(destination)
}

/// The `mv` fallback across filesystems. The source is only removed once the
/// copy is complete.
fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    fs::copy(source, destination)?;
    fs::remove_file(source)
}

//! Orchestrator phases that act on the filesystem directly.
//!
//! - **Prepare output** (`prep`) - delete and recreate the destination directory
//! - **Relocate** (`relocate`) - move the built artifact into the destination
//!
//! The four toolchain phases in between run through `executor::run_step`.

pub mod prep;
pub mod relocate;

pub use prep::prepare_output_dir;
pub use relocate::relocate_artifact;

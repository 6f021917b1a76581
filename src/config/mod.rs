//! Pipeline configuration.
//!
//! The defaults reproduce the original packaging script exactly: the Go
//! toolchain builds `libbn128.so` in the working directory and the file is
//! moved into the consuming project's resource tree under
//! `co/rsk/altbn128/linux`.
//!
//! # Module Structure
//!
//! - `loader`: reads and writes TOML configuration files
//! - `validator`: rejects configurations the orchestrator cannot run safely

pub mod loader;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{CommandSpec, StepKind};

pub use loader::{load_config_from_file, resolve_config, save_config_to_file, DEFAULT_CONFIG_FILE};
pub use validator::validate_config;

/// Name of the shared object the build step produces.
pub const DEFAULT_ARTIFACT_NAME: &str = "libbn128.so";

/// Resource path of the Linux artifact inside the output base.
pub const DEFAULT_OUTPUT_SUBDIR: &str = "co/rsk/altbn128/linux";

/// Resource root of the consuming project, relative to the working directory.
pub const DEFAULT_OUTPUT_BASE: &str = "../src/main/resources";

/// Commands for the four external steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepCommands {
    pub fetch: CommandSpec,
    pub clean: CommandSpec,
    pub test: CommandSpec,
    pub build: CommandSpec,
}

impl Default for StepCommands {
    fn default() -> Self {
        StepCommands {
            fetch: CommandSpec::new("go", ["get", "-d", "./..."]),
            clean: CommandSpec::new("go", ["clean"]),
            test: CommandSpec::new("go", ["test", "./..."]),
            build: CommandSpec::new(
                "go",
                ["build", "-buildmode=c-shared", "-o", DEFAULT_ARTIFACT_NAME],
            )
            .with_env("GOOS", "linux"),
        }
    }
}

impl StepCommands {
    pub fn get(&self, step: StepKind) -> &CommandSpec {
        match step {
            StepKind::FetchDependencies => &self.fetch,
            StepKind::Clean => &self.clean,
            StepKind::Test => &self.test,
            StepKind::Build => &self.build,
        }
    }

    pub fn get_mut(&mut self, step: StepKind) -> &mut CommandSpec {
        match step {
            StepKind::FetchDependencies => &mut self.fetch,
            StepKind::Clean => &mut self.clean,
            StepKind::Test => &mut self.test,
            StepKind::Build => &mut self.build,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory the external tools run in and the artifact is produced in.
    pub working_dir: PathBuf,

    /// Resource root; relative paths resolve against `working_dir`.
    pub output_base: PathBuf,

    /// Artifact directory below `output_base`.
    pub output_subdir: PathBuf,

    pub artifact_name: String,

    /// Where run logs and reports go; relative paths resolve against `working_dir`.
    pub log_dir: PathBuf,

    pub commands: StepCommands,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            working_dir: PathBuf::from("."),
            output_base: PathBuf::from(DEFAULT_OUTPUT_BASE),
            output_subdir: PathBuf::from(DEFAULT_OUTPUT_SUBDIR),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_string(),
            log_dir: PathBuf::from("logs"),
            commands: StepCommands::default(),
        }
    }
}

impl PipelineConfig {
    /// Destination directory, recreated on every run.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output_base).join(&self.output_subdir)
    }

    /// Where the build step is expected to leave the artifact.
    pub fn artifact_source(&self) -> PathBuf {
        self.working_dir.join(&self.artifact_name)
    }

    /// Final location of the artifact after a successful run.
    pub fn artifact_destination(&self) -> PathBuf {
        self.output_dir().join(&self.artifact_name)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}

/// Command-line overrides applied on top of a loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub working_dir: Option<PathBuf>,
    pub output_base: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(ref dir) = self.working_dir {
            config.working_dir = dir.clone();
        }
        if let Some(ref base) = self.output_base {
            config.output_base = base.clone();
        }
        if let Some(ref logs) = self.log_dir {
            config.log_dir = logs.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_match_script() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.output_dir(),
            PathBuf::from("./../src/main/resources/co/rsk/altbn128/linux")
        );
        assert_eq!(config.artifact_source(), PathBuf::from("./libbn128.so"));
        assert!(config
            .artifact_destination()
            .ends_with("co/rsk/altbn128/linux/libbn128.so"));
    }

    #[test]
    fn test_default_build_targets_linux_shared_object() {
        let commands = StepCommands::default();
        assert_eq!(commands.build.program, "go");
        assert!(commands.build.args.contains(&"-buildmode=c-shared".to_string()));
        assert!(commands.build.args.contains(&DEFAULT_ARTIFACT_NAME.to_string()));
        assert_eq!(commands.build.env.get("GOOS").map(String::as_str), Some("linux"));
    }

    #[test]
    fn test_absolute_output_base_not_joined() {
        let config = PipelineConfig {
            working_dir: PathBuf::from("/work"),
            output_base: PathBuf::from("/srv/resources"),
            ..Default::default()
        };
        assert_eq!(
            config.output_dir(),
            PathBuf::from("/srv/resources/co/rsk/altbn128/linux")
        );
    }

    #[test]
    fn test_overrides_apply_only_set_fields() {
        let mut config = PipelineConfig::default();
        let overrides = ConfigOverrides {
            output_base: Some(PathBuf::from("/tmp/res")),
            ..Default::default()
        };
        overrides.apply(&mut config);
        assert_eq!(config.output_base, PathBuf::from("/tmp/res"));
        assert_eq!(config.working_dir, PathBuf::from("."));
    }

    #[test]
    fn test_step_commands_lookup() {
        let mut commands = StepCommands::default();
        commands.get_mut(StepKind::Clean).program = "make".to_string();
        assert_eq!(commands.get(StepKind::Clean).program, "make");
        assert_eq!(commands.get(StepKind::Test).args, vec!["test", "./..."]);
    }
}

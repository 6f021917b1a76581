//! Config file loader and serialization.

use crate::config::{ConfigOverrides, PipelineConfig};
use crate::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file picked up from the current directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "bn128-packager.toml";

/// Load config from a TOML file.
pub fn load_config_from_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    validate_config_path(path)?;

    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(format!(
                "Configuration file not found at: {}",
                path.display()
            ))
        } else {
            ConfigError::IoError(e)
        }
    })?;

    let config: PipelineConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save config to a TOML file.
pub fn save_config_to_file(config: &PipelineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(path, render_config(config)?)?;
    Ok(())
}

/// Serialize config as pretty TOML.
pub fn render_config(config: &PipelineConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Validate config path (.toml extension required).
pub fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "Configuration path cannot be empty".to_string(),
        ));
    }

    match path.extension() {
        Some(ext) if ext == "toml" => Ok(()),
        Some(ext) => Err(ConfigError::ValidationFailed(format!(
            "Configuration file must have .toml extension, got .{}",
            ext.to_string_lossy()
        ))),
        None => Err(ConfigError::ValidationFailed(
            "Configuration file must have .toml extension".to_string(),
        )),
    }
}

/// Resolve the effective configuration.
///
/// Lookup order: explicit path, then `DEFAULT_CONFIG_FILE` in `search_dir`,
/// then built-in defaults. Overrides are applied last and the result is
/// validated.
pub fn resolve_config(
    explicit: Option<&Path>,
    search_dir: &Path,
    overrides: &ConfigOverrides,
) -> Result<(PipelineConfig, Option<PathBuf>), ConfigError> {
    let (mut config, source) = match explicit {
        Some(path) => (load_config_from_file(path)?, Some(path.to_path_buf())),
        None => {
            let candidate = search_dir.join(DEFAULT_CONFIG_FILE);
            if candidate.is_file() {
                (load_config_from_file(&candidate)?, Some(candidate))
            } else {
                (PipelineConfig::default(), None)
            }
        }
    };

    overrides.apply(&mut config);
    super::validate_config(&config)?;
    Ok((config, source))
}

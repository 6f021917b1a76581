use bn128_packager::config::loader::render_config;
use bn128_packager::config::{
    load_config_from_file, resolve_config, save_config_to_file, validate_config,
    ConfigOverrides, DEFAULT_CONFIG_FILE,
};
use bn128_packager::{ConfigError, PipelineConfig};
use proptest::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_rendered_defaults_mention_script_constants() {
    let toml = render_config(&PipelineConfig::default()).expect("render");

    assert!(toml.contains("artifact_name = \"libbn128.so\""));
    assert!(toml.contains("co/rsk/altbn128/linux"));
    assert!(toml.contains("-buildmode=c-shared"));
}

#[test]
fn test_explicit_config_wins_over_search_dir() {
    let dir = tempdir().expect("Failed to create temp dir");
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "artifact_name = \"a.so\"\n").unwrap();
    let explicit = dir.path().join("ci.toml");
    fs::write(&explicit, "artifact_name = \"b.so\"\n").unwrap();

    let (config, source) =
        resolve_config(Some(&explicit), dir.path(), &ConfigOverrides::default()).unwrap();

    assert_eq!(config.artifact_name, "b.so");
    assert_eq!(source, Some(explicit));
}

#[test]
fn test_overrides_applied_before_validation() {
    let dir = tempdir().expect("Failed to create temp dir");
    let overrides = ConfigOverrides {
        working_dir: Some(dir.path().join("native")),
        output_base: Some(PathBuf::from("/srv/app/resources")),
        log_dir: None,
    };

    let (config, _) = resolve_config(None, dir.path(), &overrides).unwrap();

    assert_eq!(
        config.output_dir(),
        PathBuf::from("/srv/app/resources/co/rsk/altbn128/linux")
    );
    assert_eq!(config.log_dir(), dir.path().join("native/logs"));
}

#[test]
fn test_invalid_file_is_rejected_on_resolve() {
    let dir = tempdir().expect("Failed to create temp dir");
    fs::write(
        dir.path().join(DEFAULT_CONFIG_FILE),
        "output_subdir = \"../../etc\"\n",
    )
    .unwrap();

    let result = resolve_config(None, dir.path(), &ConfigOverrides::default());
    assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
}

#[test]
fn test_custom_toolchain_round_trips() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cargo.toml");
    fs::write(
        &path,
        r#"
artifact_name = "libbn128.so"

[commands.fetch]
program = "cargo"
args = ["fetch"]

[commands.build]
program = "cargo"
args = ["build", "--release"]

[commands.build.env]
CARGO_TARGET_DIR = "."
"#,
    )
    .unwrap();

    let config = load_config_from_file(&path).unwrap();
    assert_eq!(config.commands.fetch.display(), "cargo fetch");
    assert_eq!(
        config.commands.build.display(),
        "CARGO_TARGET_DIR=. cargo build --release"
    );
    // Unspecified steps keep the Go defaults
    assert_eq!(config.commands.clean.display(), "go clean");

    let copy = dir.path().join("copy.toml");
    save_config_to_file(&config, &copy).unwrap();
    assert_eq!(load_config_from_file(&copy).unwrap(), config);
}

proptest! {
    #[test]
    fn prop_plain_artifact_names_accepted(name in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,30}") {
        prop_assume!(name != "." && name != "..");
        let mut config = PipelineConfig::default();
        config.artifact_name = name;
        prop_assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn prop_artifact_names_with_separators_rejected(
        head in "[a-z]{1,8}",
        tail in "[a-z]{1,8}",
    ) {
        let mut config = PipelineConfig::default();
        config.artifact_name = format!("{}/{}", head, tail);
        prop_assert!(validate_config(&config).is_err());
    }

    #[test]
    fn prop_subdirs_with_parent_segments_rejected(
        segments in proptest::collection::vec("[a-z]{1,6}", 0..4),
        position in 0usize..4,
    ) {
        let mut parts = segments.clone();
        let at = position.min(parts.len());
        parts.insert(at, "..".to_string());
        let mut config = PipelineConfig::default();
        config.output_subdir = PathBuf::from(parts.join("/"));
        prop_assert!(validate_config(&config).is_err());
    }

    #[test]
    fn prop_subdirs_of_only_current_dir_rejected(repeats in 1usize..5, trailing in any::<bool>()) {
        let mut subdir = vec!["."; repeats].join("/");
        if trailing {
            subdir.push('/');
        }
        let mut config = PipelineConfig::default();
        config.output_subdir = PathBuf::from(subdir);
        prop_assert!(validate_config(&config).is_err());
    }

    #[test]
    fn prop_output_dir_always_below_base(segments in proptest::collection::vec("[a-z]{1,6}", 1..5)) {
        let mut config = PipelineConfig::default();
        config.output_base = PathBuf::from("/srv/resources");
        config.output_subdir = PathBuf::from(segments.join("/"));
        prop_assert!(validate_config(&config).is_ok());
        prop_assert!(config.output_dir().starts_with("/srv/resources"));
        prop_assert_ne!(config.output_dir(), PathBuf::from("/srv/resources"));
    }
}

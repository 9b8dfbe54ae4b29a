//! Integration tests for the configuration layer
//!
//! Covers file formats, layering over defaults, explicit paths and the
//! environment overrides the CLI relies on.

use converge::config::{Config, OutputFormat};
use converge::error::Error;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

fn write_config(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

// ============================================================================
// File loading
// ============================================================================

#[test]
#[serial]
fn test_explicit_toml_file() {
    let dir = tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "site.toml",
        r#"
[defaults]
forks = 12
inventory = "hosts.ini"
retry_delay_secs = 3

[colors]
changed = "magenta"

[output]
format = "json"
"#,
    );

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.defaults.forks, 12);
    assert_eq!(config.inventory_path(), Some(std::path::Path::new("hosts.ini")));
    assert_eq!(config.retry_delay(), Duration::from_secs(3));
    assert_eq!(config.colors.changed, "magenta");
    assert_eq!(config.colors.failed, "red");
    assert_eq!(config.output.format, OutputFormat::Json);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_structural() {
    let err = Config::load(Some(std::path::Path::new("/no/such/converge.toml"))).unwrap_err();
    assert!(matches!(err, Error::FileNotFound(_)));
    assert!(err.is_structural());
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_invalid_toml() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "broken.toml", "[defaults\nforks = ");
    let err = Config::from_file(&path).unwrap_err();
    assert!(err.is_structural());
}

#[test]
fn test_wrong_field_type() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "typed.yml", "defaults:\n  forks: lots\n");
    let err = Config::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("invalid configuration"));
}

#[test]
fn test_scalar_top_level_rejected() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "scalar.json", "42");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_empty_yaml_is_defaults() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "empty.yaml", "");
    assert_eq!(Config::from_file(&path).unwrap(), Config::default());
}

// ============================================================================
// Environment overrides
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_file() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path(), "site.toml", "[defaults]\nforks = 2\n");

    std::env::set_var("CONVERGE_FORKS", "7");
    std::env::set_var("CONVERGE_INVENTORY", "/srv/inventory.yml");
    let config = Config::load(Some(&path));
    std::env::remove_var("CONVERGE_FORKS");
    std::env::remove_var("CONVERGE_INVENTORY");

    let config = config.unwrap();
    assert_eq!(config.defaults.forks, 7);
    assert_eq!(
        config.inventory_path(),
        Some(std::path::Path::new("/srv/inventory.yml"))
    );
}

#[test]
#[serial]
fn test_no_color_env() {
    std::env::set_var("NO_COLOR", "1");
    let config = Config::load(None);
    std::env::remove_var("NO_COLOR");
    assert!(!config.unwrap().colors.enabled);
}

#[test]
#[serial]
fn test_zero_forks_from_env_rejected() {
    std::env::set_var("CONVERGE_FORKS", "0");
    let result = Config::load(None);
    std::env::remove_var("CONVERGE_FORKS");
    assert!(result.unwrap_err().is_structural());
}

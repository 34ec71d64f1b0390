use std::fs;
use std::path::PathBuf;

use hornsync_config::format_diagnostics;
use hornsync_config::Config;
use hornsync_config::Diagnostic;
use hornsync_config::Error;
use hornsync_config::LoadError;
use hornsync_config::StoreBackend;
use hornsync_config::Warning;
use tempfile::TempDir;

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hornsync.toml");

    fs::write(
        &path,
        r#"
        [twin]
        thing_id = "car:horn-car-001"
        store = "file"
        path = "data/things"

        [serial]
        port = "/dev/ttyUSB0"
        "#,
    )
    .unwrap();

    let (config, diagnostics) = Config::from_file(&path).unwrap();
    assert!(diagnostics.is_empty());
    assert_eq!(
        config.twin.store,
        StoreBackend::File {
            dir: PathBuf::from("data/things")
        }
    );
    assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
}

#[test]
fn test_missing_file_is_load_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("missing.toml");

    let diagnostics = Config::from_file(&path).unwrap_err();
    assert!(matches!(
        diagnostics.0.as_slice(),
        [Diagnostic::Error(Error::Load(LoadError::Io { .. }))]
    ));

    let rendered = format_diagnostics(&diagnostics.0);
    assert!(rendered.contains("Failed to read config file"));
    assert!(rendered.contains("missing.toml"));
}

#[test]
fn test_ignored_settings_are_warnings() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hornsync.toml");

    fs::write(
        &path,
        r#"
        [twin]
        store = "memory"
        path = "data/things"
        url = "http://localhost:8565"
        "#,
    )
    .unwrap();

    let (config, diagnostics) = Config::from_file(&path).unwrap();
    assert_eq!(config.twin.store, StoreBackend::Memory);

    let ignored: Vec<_> = diagnostics
        .warnings()
        .filter_map(|w| match w {
            Warning::IgnoredSetting { field_path, .. } => Some(field_path.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ignored, vec!["twin.path", "twin.url"]);

    let rendered = format_diagnostics(&diagnostics.0);
    assert!(rendered.contains("Ignored setting 'twin.path'"));
    assert!(rendered.contains("only used by the file store"));
}

#[test]
fn test_store_requirements() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hornsync.toml");

    fs::write(
        &path,
        r#"
        [twin]
        store = "http"
        url = "localhost:8565"
        "#,
    )
    .unwrap();

    let diagnostics = Config::from_file(&path).unwrap_err();
    let rendered = format_diagnostics(&diagnostics.0);
    assert!(rendered.contains("Validation error in 'twin.url'"));
    assert!(rendered.contains("url must start with http:// or https://"));
    assert!(rendered.contains("hornsync.toml"));
}

#[test]
fn test_auto_connect_requires_port() {
    let diagnostics = Config::from_toml(
        r#"
        [sync]
        auto_connect = true
        "#,
    )
    .unwrap_err();

    let fields: Vec<_> = diagnostics.0.iter().filter_map(|d| d.field_path()).collect();
    assert_eq!(fields, vec!["sync.auto_connect"]);
}

#[test]
fn test_bad_thing_id() {
    let diagnostics = Config::from_toml(
        r#"
        [twin]
        thing_id = "horn-car-001"
        "#,
    )
    .unwrap_err();

    let rendered = format_diagnostics(&diagnostics.0);
    assert!(rendered.contains("'<namespace>:<name>'"));
}

#[test]
fn test_syntax_error_is_rendered_with_location() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");

    fs::write(&path, "[serial\nport = 1\n").unwrap();

    let diagnostics = Config::from_file(&path).unwrap_err();
    let rendered = format_diagnostics(&diagnostics.0);
    assert!(rendered.contains("Failed to parse config file"));
    assert!(rendered.contains("broken.toml"));
}

#[test]
fn test_example_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../hornsync.example.toml");
    let (config, diagnostics) = match Config::from_file(&path) {
        Ok(loaded) => loaded,
        Err(diagnostics) => panic!("{}", format_diagnostics(&diagnostics.0)),
    };

    assert!(diagnostics.is_empty());
    assert_eq!(config.api.port, 8565);
    assert!(config.probes.mqtt.is_some());
    assert!(config.probes.ditto.is_some());
}

// tests/config_loading.rs

use std::io::Write;

use deploydag::config::{default_config_path, load_and_validate, load_from_path, load_from_str};
use deploydag::coord::LockKind;
use deploydag::engine::{DependencyScheduler, DEFAULT_ADMISSION_CAPACITY};
use deploydag::errors::DeploydagError;
use deploydag::types::LogLevel;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn empty_file_yields_defaults() {
    let cfg = load_from_str("").unwrap();
    assert_eq!(cfg.scheduler.admission_capacity, DEFAULT_ADMISSION_CAPACITY);
    assert_eq!(cfg.logging.level, None);
    assert!(cfg.limits.is_empty());
}

#[test]
fn full_file_is_loaded_from_disk() {
    let file = write_config(
        r#"
[scheduler]
admission_capacity = 3

[logging]
level = "warning"

[limits]
container-start = 4
registry-api = 2
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.scheduler.admission_capacity, 3);
    assert_eq!(cfg.logging.level, Some(LogLevel::Warn));
    assert_eq!(cfg.limits.get("container-start"), Some(&4));
    assert_eq!(cfg.limits.get("registry-api"), Some(&2));

    let scheduler: DependencyScheduler<()> = DependencyScheduler::from_config(&cfg);
    assert_eq!(scheduler.capacity(), 3);
}

#[test]
fn limits_build_bounded_locks() {
    let cfg = load_from_str("[limits]\nregistry-api = 2\n").unwrap();

    let lock = cfg.bounded_lock("registry-api").unwrap();
    assert_eq!(lock.kind(), LockKind::Bounded(2));
    assert!(lock.try_acquire("docker.io"));
    assert!(lock.try_acquire("docker.io"));
    assert!(!lock.try_acquire("docker.io"));

    match cfg.bounded_lock("ssh") {
        Err(DeploydagError::ConfigError(msg)) => assert!(msg.contains("ssh")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_admission_capacity_is_rejected() {
    let err = load_from_str("[scheduler]\nadmission_capacity = 0\n").unwrap_err();
    match err {
        DeploydagError::ConfigError(msg) => assert!(msg.contains("admission_capacity")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_limit_is_rejected() {
    let err = load_from_str("[limits]\nregistry-api = 0\n").unwrap_err();
    match err {
        DeploydagError::ConfigError(msg) => assert!(msg.contains("registry-api")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn unknown_log_level_is_a_parse_error() {
    let err = load_from_str("[logging]\nlevel = \"loud\"\n").unwrap_err();
    assert!(matches!(err, DeploydagError::TomlError(_)));
}

#[test]
fn raw_load_skips_validation() {
    let file = write_config("[scheduler]\nadmission_capacity = 0\n");
    let raw = load_from_path(file.path()).unwrap();
    assert_eq!(raw.scheduler.admission_capacity, 0);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, DeploydagError::IoError(_)));
}

#[test]
fn default_path_is_in_working_directory() {
    assert_eq!(default_config_path().to_str(), Some("Deploydag.toml"));
}

// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;
use taskyard::config::validate::parse_duration;
use taskyard::config::{load_and_validate, load_from_str, ImageSource, PullImage};
use taskyard::errors::TaskyardError;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

fn expect_config_error(contents: &str) -> String {
    match load_from_str(contents) {
        Err(TaskyardError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_full_config_loads_from_disk() {
    let file = write_config(
        r#"
project_name = "shop"

[container.db]
image = "postgres:16"
health_check = { command = "pg_isready", interval = "2s", retries = 10, start_period = "500ms" }

[container.app]
build_directory = "./app"
dockerfile = "Dockerfile.dev"
build_args = { PROFILE = "debug" }
dependencies = ["db"]
environment = { DATABASE_URL = "postgres://db" }
ports = ["8080:80"]
caches = [{ name = "cargo", container = "/usr/local/cargo/registry" }]
setup_commands = ["./migrate.sh"]

[task.test]
description = "Run the test suite"
run = { container = "app", command = "cargo test", environment = { RUST_LOG = "debug" } }
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.project_name, "shop");
    assert_eq!(cfg.containers.len(), 2);

    let db = &cfg.containers["db"];
    assert_eq!(db.image_source, ImageSource::Pull(PullImage::new("postgres:16")));
    let hc = db.health_check.as_ref().unwrap();
    assert_eq!(hc.command.as_deref(), Some("pg_isready"));
    assert_eq!(hc.interval, Some(Duration::from_secs(2)));
    assert_eq!(hc.retries, Some(10));
    assert_eq!(hc.start_period, Some(Duration::from_millis(500)));

    let app = &cfg.containers["app"];
    match &app.image_source {
        ImageSource::Build(build) => {
            assert_eq!(build.build_directory, PathBuf::from("./app"));
            assert_eq!(build.dockerfile, "Dockerfile.dev");
            assert_eq!(build.build_args["PROFILE"], "debug");
        }
        other => panic!("Expected a build image source, got: {:?}", other),
    }
    assert!(app.dependencies.contains("db"));
    assert!(app.has_cache_mounts());
    assert_eq!(app.setup_commands, vec!["./migrate.sh".to_string()]);

    let task = &cfg.tasks["test"];
    assert_eq!(task.description.as_deref(), Some("Run the test suite"));
    assert_eq!(task.run.container, "app");
    assert_eq!(task.run.command.as_deref(), Some("cargo test"));
    assert_eq!(task.run.environment["RUST_LOG"], "debug");
}

#[test]
fn test_project_name_defaults_when_absent() {
    let cfg = load_from_str(
        r#"
[container.app]
image = "alpine"
"#,
    )
    .unwrap();

    assert_eq!(cfg.project_name, "taskyard");
    assert!(cfg.tasks.is_empty());
}

#[test]
fn test_build_directory_defaults_dockerfile() {
    let cfg = load_from_str(
        r#"
[container.app]
build_directory = "./app"
"#,
    )
    .unwrap();

    match &cfg.containers["app"].image_source {
        ImageSource::Build(build) => assert_eq!(build.dockerfile, "Dockerfile"),
        other => panic!("Expected a build image source, got: {:?}", other),
    }
}

#[test]
fn test_missing_containers_returns_config_error() {
    let msg = expect_config_error(
        r#"
project_name = "empty"
"#,
    );
    assert!(msg.contains("at least one"));
}

#[test]
fn test_image_and_build_directory_are_exclusive() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "alpine"
build_directory = "./app"
"#,
    );
    assert!(msg.contains("must not set both"));
    assert!(msg.contains("app"));
}

#[test]
fn test_container_without_image_source_returns_config_error() {
    let msg = expect_config_error(
        r#"
[container.app]
command = "echo hi"
"#,
    );
    assert!(msg.contains("must set one of"));
}

#[test]
fn test_invalid_health_check_duration_returns_config_error() {
    let msg = expect_config_error(
        r#"
[container.db]
image = "postgres"
health_check = { command = "pg_isready", interval = "soon" }
"#,
    );
    assert!(msg.contains("db"));
    assert!(msg.contains("health_check.interval"));
}

#[test]
fn test_task_with_empty_run_container_returns_config_error() {
    let msg = expect_config_error(
        r#"
[container.app]
image = "alpine"

[task.broken]
run = { container = "  " }
"#,
    );
    assert!(msg.contains("broken"));
}

#[test]
fn test_invalid_project_name_returns_config_error() {
    let msg = expect_config_error(
        r#"
project_name = "My Project"

[container.app]
image = "alpine"
"#,
    );
    assert!(msg.contains("My Project"));
}

#[test]
fn test_malformed_toml_returns_toml_error() {
    let result = load_from_str("[container.app\nimage = ");
    assert!(matches!(result, Err(TaskyardError::TomlError(_))));
}

#[test]
fn test_missing_file_returns_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(TaskyardError::IoError(_))));
}

#[test]
fn test_parse_duration_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));

    assert!(parse_duration("").is_err());
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
    assert!(parse_duration("s").is_err());
}

#[test]
fn test_parse_duration_rejects_values_that_overflow() {
    let max = u64::MAX;
    assert_eq!(parse_duration(&format!("{}s", max)), Ok(Duration::from_secs(max)));

    let err = parse_duration(&format!("{}m", max)).unwrap_err();
    assert!(err.contains("too large"));
    assert!(parse_duration(&format!("{}h", max / 60)).is_err());
}

#[test]
fn test_overflowing_health_check_duration_returns_config_error() {
    let msg = expect_config_error(
        r#"
[container.db]
image = "postgres"
health_check = { command = "pg_isready", start_period = "18446744073709551615h" }
"#,
    );
    assert!(msg.contains("health_check.start_period"));
    assert!(msg.contains("too large"));
}

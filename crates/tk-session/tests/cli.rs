//! CLI integration tests
//!
//! Runs the tk-client binary against recorded engine events.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn tk_client() -> Command {
    Command::cargo_bin("tk-client")
        .expect("Failed to locate tk-client binary - ensure it's built before running tests")
}

/// Write a config, an events file and return the args pointing at them
fn fixture(dir: &Path, events: &str) -> Vec<String> {
    let config = dir.join("client.toml");
    fs::write(
        &config,
        format!("log_dir = {:?}\n", dir.join("logs").to_string_lossy()),
    )
    .unwrap();

    let events_path = dir.join("events.jsonl");
    fs::write(&events_path, events).unwrap();

    vec![
        "--config".to_string(),
        config.to_string_lossy().into_owned(),
        "--state".to_string(),
        dir.join("state.toml").to_string_lossy().into_owned(),
        "--events".to_string(),
        events_path.to_string_lossy().into_owned(),
    ]
}

#[test]
fn test_cli_help() {
    tk_client()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tk-client"))
        .stdout(predicate::str::contains("--events"));
}

#[test]
fn test_cli_version() {
    tk_client()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tk-client"));
}

#[test]
fn test_cli_requires_events() {
    tk_client()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--events"));
}

#[test]
fn test_cli_without_token_fails() {
    let dir = tempfile::tempdir().unwrap();
    let args = fixture(dir.path(), "");

    tk_client()
        .args(&args)
        .env_remove("TK_TOKEN")
        .env("RUST_LOG", "info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to start session"));
}

#[test]
fn test_cli_replays_session() {
    let dir = tempfile::tempdir().unwrap();
    let events = r#"# recorded session
{"type":"resources_updated","resources":"[{\"id\":\"r1\",\"name\":\"Wiki\",\"type\":\"dns\",\"address\":\"wiki.corp.example\"}]"}
{"type":"tun_interface_updated","ipv4":"100.64.0.7","ipv6":"fd00::7","dns":"[\"100.100.111.1\"]","search_domain":null,"ipv4_routes":"[{\"address\":\"0.0.0.0\",\"prefix\":0}]","ipv6_routes":"[]"}
"#;
    let args = fixture(dir.path(), events);

    tk_client()
        .args(&args)
        .args(["--token", "secret"])
        .env("RUST_LOG", "info")
        .assert()
        .success()
        .stdout(predicate::str::contains("bypass=false"))
        .stdout(predicate::str::contains("Session finished (StreamEnded)"));

    let state = fs::read_to_string(dir.path().join("state.toml")).unwrap();
    assert!(state.contains("device_id"));
}

#[test]
fn test_cli_disconnected_clears_token() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.toml");
    fs::write(&state_path, "token = \"stored\"\nactor_name = \"Jane\"\n").unwrap();
    let events = r#"{"type":"disconnected","error":"token expired","authentication":true}"#;
    let args = fixture(dir.path(), events);

    tk_client()
        .args(&args)
        .env_remove("TK_TOKEN")
        .env("RUST_LOG", "info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session finished (Disconnected)"));

    let state = fs::read_to_string(&state_path).unwrap();
    assert!(!state.contains("stored"));
    assert!(!state.contains("Jane"));
}

//! Integration tests for the watchboard CLI.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

/// Get the path to the watchboard binary.
fn watchboard_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_watchboard"));
    for var in ["WATCHBOARD_CONFIG", "WATCHBOARD_DATA_DIR", "WATCHBOARD_API", "WATCHBOARD_LIST"] {
        cmd.env_remove(var);
    }
    cmd
}

/// Run against an isolated data directory with an empty config and an
/// unreachable API, so nothing touches the user's files or the network.
fn run_offline(dir: &Path, args: &[&str]) -> Output {
    let config = dir.join("config.toml");
    if !config.exists() {
        fs::write(&config, "").expect("Failed to write config");
    }
    watchboard_bin()
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(dir.join("data"))
        .args(["--api", "http://127.0.0.1:9"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn export_json(dir: &Path) -> serde_json::Value {
    let path = dir.join("backup.json");
    let output = run_offline(dir, &["export", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_help_flag() {
    let output = watchboard_bin()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("watchboard"));
    assert!(stdout.contains("--list"));
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("WATCHBOARD_LIST"));
    assert!(stdout.contains("seed"));
}

#[test]
fn test_version_flag() {
    let output = watchboard_bin()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("watchboard"));
    assert!(stdout.contains("0.") || stdout.contains("1."));
}

#[test]
fn test_sample_config() {
    let output = watchboard_bin()
        .arg("sample-config")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[general]"));
    assert!(stdout.contains("[lists]"));
    assert!(stdout.contains("port = 8765"));
}

#[test]
fn test_invalid_list_name() {
    let output = watchboard_bin()
        .args(["-b", "-l", "nope"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown list"));
}

#[test]
fn test_export_shape_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let doc = export_json(dir.path());

    assert_eq!(doc["cub"], serde_json::json!(["AAPL", "MSFT", "NVDA"]));
    assert!(doc["ft"].is_array());
    assert!(doc["oo"].is_array());
    assert_eq!(doc["starred"], serde_json::json!([]));
}

#[test]
fn test_remove_persists() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_offline(dir.path(), &["remove", "watchlistA", "msft"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Removed MSFT"));

    let doc = export_json(dir.path());
    assert_eq!(doc["cub"], serde_json::json!(["AAPL", "NVDA"]));
}

#[test]
fn test_star_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_offline(dir.path(), &["star", "tsla"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Starred TSLA"));

    let doc = export_json(dir.path());
    assert_eq!(doc["starred"], serde_json::json!(["TSLA"]));

    let output = run_offline(dir.path(), &["star", "TSLA"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Unstarred TSLA"));
}

#[test]
fn test_add_to_rebound_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_offline(dir.path(), &["add", "rebound", "TSLA"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Skipped"));
}

#[test]
fn test_seed_fills_only_empty_lists() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.json");
    fs::write(&seed, r#"{"cub": ["coin"], "oo": ["spy", "qqq"], "starred": ["AMD"]}"#).unwrap();

    let output = run_offline(dir.path(), &["seed", seed.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("watchlistA"));
    assert!(stdout.contains("starred"));

    let doc = export_json(dir.path());
    assert_eq!(doc["cub"], serde_json::json!(["COIN"]));
    assert_eq!(doc["oo"], serde_json::json!(["SPY", "QQQ"]));
    assert_eq!(doc["starred"], serde_json::json!(["AMD"]));

    fs::write(&seed, r#"{"cub": ["GME"]}"#).unwrap();
    let output = run_offline(dir.path(), &["seed", seed.to_str().unwrap()]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing seeded"));
    assert_eq!(export_json(dir.path())["cub"], serde_json::json!(["COIN"]));
}

#[test]
fn test_batch_mode_reports_unreachable_api() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_offline(dir.path(), &["-b", "-l", "watchlistB", "--timeout", "5"]);

    assert!(!output.status.success());
}

// This test requires network access
#[test]
#[ignore]
fn test_batch_mode_with_network() {
    let dir = tempfile::tempdir().unwrap();
    let output = watchboard_bin()
        .arg("--data-dir")
        .arg(dir.path())
        .args(["-b", "-l", "watchlistA", "--export", "csv"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Symbol,Perf1D"));
    assert!(stdout.contains("AAPL"));
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tpa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tpa");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[query]
endpoint = "http://127.0.0.1:9/graphql"

[auth]
token_env = "TPA_TEST_TOKEN_UNSET"

[automation]
output_dir = "{}/output"
default_version = "2025"

[automation.activities.2025]
signature = "sig-2025"
activity_alias = "nick.TypeParametersActivity2025+test"
"#,
        root.display()
    );
    let config_path = config_dir.join("tpa.toml");
    fs::write(&config_path, config_content).unwrap();

    fs::write(
        root.join("sheet.toml"),
        r##"
[[parameters]]
name = "Fire Rating"
visualize = true

[[assignments]]
family = "Basic Wall"
type_name = "Generic - 200mm"
parameter = "Fire Rating"
parameter_value = "60"
color = "#FF6600"

[[assignments]]
family = "Basic Wall"
type_name = "Exterior - Brick"
parameter = "Fire Rating"
parameter_value = "90"

[[assignments]]
family = "Single Flush"
type_name = "0915 x 2134mm"
parameter = "Cost"
parameter_group = "PG_IDENTITY_DATA"
parameter_value = "450"

[[assignments]]
type_name = "No Parameter"
"##,
    )
    .unwrap();

    fs::write(
        root.join("empty.toml"),
        r#"
[[assignments]]
family = "Basic Wall"
type_name = "Generic - 200mm"
"#,
    )
    .unwrap();

    (tmp, config_path)
}

fn run_tpa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tpa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("TPA_TEST_TOKEN_UNSET")
        .env_remove("TypeParametersActivity2025")
        .env_remove("ACTIVITY_FULL_ALIAS_TypeParameters2025")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tpa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_payload_groups_sheet_rows() {
    let (tmp, config_path) = setup_test_env();
    let sheet = tmp.path().join("sheet.toml");

    let (stdout, stderr, success) = run_tpa(&config_path, &["payload", "--sheet", sheet.to_str().unwrap()]);
    assert!(success, "payload failed: stdout={}, stderr={}", stdout, stderr);

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["ParameterName"], "Fire Rating");
    assert_eq!(entries[0]["ParameterGroup"], "PG_DATA");
    assert_eq!(entries[0]["Targets"].as_array().unwrap().len(), 2);
    assert_eq!(entries[1]["ParameterName"], "Cost");
    assert_eq!(entries[1]["ParameterGroup"], "PG_IDENTITY_DATA");
    assert!(stderr.contains("2 parameter(s), 3 target(s)"));
}

#[test]
fn test_payload_rejects_sheet_without_parameters() {
    let (tmp, config_path) = setup_test_env();
    let sheet = tmp.path().join("empty.toml");

    let (_, stderr, success) = run_tpa(&config_path, &["payload", "--sheet", sheet.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("at least one assignment with a parameter is required"));
}

#[test]
fn test_payload_missing_sheet() {
    let (tmp, config_path) = setup_test_env();
    let sheet = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_tpa(&config_path, &["payload", "--sheet", sheet.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Failed to read assignment sheet"));
}

#[test]
fn test_versions_lists_configured_activities() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tpa(&config_path, &["versions"]);
    assert!(success, "versions failed: stderr={}", stderr);

    let line_2025 = stdout.lines().find(|l| l.starts_with("2025")).unwrap();
    assert!(line_2025.contains("OK"));
    assert!(line_2025.contains('*'));
    let line_2023 = stdout.lines().find(|l| l.starts_with("2023")).unwrap();
    assert!(line_2023.contains("MISSING"));
}

#[test]
fn test_versions_without_config_file() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.toml");

    let (stdout, _, success) = run_tpa(&missing, &["versions"]);
    assert!(success);
    assert!(stdout.contains("2024"));
}

#[test]
fn test_families_requires_token() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_tpa(&config_path, &["families", "--model-key", "abc"]);
    assert!(!success);
    assert!(stderr.contains("TPA_TEST_TOKEN_UNSET"));
}

#[test]
fn test_families_requires_model() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_tpa(&config_path, &["families"]);
    assert!(!success);
}

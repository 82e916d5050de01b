use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn rainglass(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rainglass"));
    command
        .env("RAINGLASS_CONFIG_DIR", config_dir)
        .env_remove("RAINGLASS_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn config_defaults_when_no_file_exists() {
    let root = TempDir::new().unwrap();
    let output = rainglass(root.path())
        .args(["config", "--json"])
        .output()
        .expect("failed to run rainglass config");
    assert!(output.status.success(), "{:?}", output);

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["version"], 1);
    assert_eq!(value["storm"]["heavy_threshold"], 30.0);
    assert_eq!(value["interaction"]["wipe_radius"], 48.0);
}

#[test]
fn config_reads_discovered_file_and_flag_overrides() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("rainglass.toml"),
        r#"
version = 1

[storm]
heavy_threshold = 10
intense_threshold = 20

[[cards]]
x = 10
y = 20
width = 200
height = 120
text = "Storage engines and caching"
"#,
    )
    .unwrap();

    let output = rainglass(root.path())
        .args(["config", "--json", "--background", "sky.png"])
        .output()
        .expect("failed to run rainglass config");
    assert!(output.status.success(), "{:?}", output);

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["storm"]["heavy_threshold"], 10.0);
    assert_eq!(value["rain"]["background"], "sky.png");
    assert_eq!(value["cards"][0]["text"], "Storage engines and caching");
}

#[test]
fn config_prints_toml_by_default() {
    let root = TempDir::new().unwrap();
    let output = rainglass(root.path())
        .arg("config")
        .output()
        .expect("failed to run rainglass config");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 1"));
    assert!(stdout.contains("[storm]"));
}

#[test]
fn invalid_config_fails_with_message() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("broken.toml");
    fs::write(&path, "version = 1\n[storm]\nheavy_threshold = 90\n").unwrap();

    let output = rainglass(root.path())
        .args(["config", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run rainglass config");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("heavy_threshold"), "{stderr}");
}

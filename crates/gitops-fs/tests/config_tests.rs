use gitops_fs::{ConfigStore, NormalizedPath};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::fs;
use tempfile::TempDir;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Settings {
    name: String,
    timeout_secs: u64,
}

fn sample() -> Settings {
    Settings {
        name: "fabric".into(),
        timeout_secs: 30,
    }
}

#[test]
fn test_load_toml() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("gitops.toml");
    fs::write(&file_path, "name = \"fabric\"\ntimeout_secs = 30\n").unwrap();

    let loaded: Settings = ConfigStore::new().load(&NormalizedPath::new(&file_path)).unwrap();
    assert_eq!(loaded, sample());
}

#[test]
fn test_load_yaml() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("gitops.yml");
    fs::write(&file_path, "name: fabric\ntimeout_secs: 30\n").unwrap();

    let loaded: Settings = ConfigStore::new().load(&NormalizedPath::new(&file_path)).unwrap();
    assert_eq!(loaded, sample());
}

#[test]
fn test_save_then_load_json() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("records.json"));
    let store = ConfigStore::new();

    store.save(&path, &sample()).unwrap();
    let loaded: Settings = store.load(&path).unwrap();

    assert_eq!(loaded, sample());
}

#[test]
fn test_unsupported_extension() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("gitops.ini"));

    let err = ConfigStore::new().save(&path, &sample()).unwrap_err();
    assert!(err.to_string().contains("Unsupported config format"));
}

#[test]
fn test_parse_error_names_format_and_path() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("broken.toml");
    fs::write(&file_path, "name = ").unwrap();

    let result: gitops_fs::Result<Settings> = ConfigStore::new().load(&NormalizedPath::new(&file_path));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("TOML"));
    assert!(message.contains("broken.toml"));
}

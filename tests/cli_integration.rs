//! CLI integration tests for cstore
//!
//! These tests drive the binary against a temporary storage root and check
//! both the printed output and the files left on disk.

use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Get a command instance for the cstore binary, pointed at `dir`
fn cstore(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("cstore"));
    cmd.arg("--root").arg(dir.path()).env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// =============================================================================
// Put / Get Tests
// =============================================================================

#[test]
fn test_put_then_get() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["put", "tasks", "t1", r#"{"title": "Write docs", "status": "todo"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved 't1' in 'tasks'"));

    let output = cstore(&dir)
        .args(["get", "tasks", "t1", "--format", "json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let item = stdout_json(&output);
    assert_eq!(item["id"], "t1");
    assert_eq!(item["title"], "Write docs");

    // Tasks are stored one file per item
    assert!(dir.path().join("tasks/t1.json").is_file());
}

#[test]
fn test_put_reads_stdin() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["put", "templates", "bug"])
        .write_stdin(r#"{"name": "Bug report"}"#)
        .assert()
        .success();

    let content = fs::read_to_string(dir.path().join("templates.json")).unwrap();
    let items: Vec<Value> = serde_json::from_str(&content).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "bug");
    assert_eq!(items[0]["name"], "Bug report");
}

#[test]
fn test_put_rejects_invalid_json() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["put", "tasks", "t1", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_put_rejects_mismatched_id() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["put", "tasks", "t1", r#"{"id": "t2"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("t2"));

    assert!(!dir.path().join("tasks/t1.json").exists());
}

#[test]
fn test_put_rejects_path_like_names() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["put", "../outside", "x", "{}"])
        .assert()
        .failure();

    cstore(&dir)
        .args(["put", "tasks", "../escape", "{}"])
        .assert()
        .failure();

    assert!(!dir.path().join("../outside.json").exists());
    assert!(!dir.path().join("escape.json").exists());
}

#[test]
fn test_get_missing_item_fails() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["get", "tasks", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// =============================================================================
// List / Count / Exists Tests
// =============================================================================

#[test]
fn test_list_sorted_and_filtered() {
    let dir = TempDir::new().unwrap();
    cstore(&dir)
        .args(["put", "tasks", "b", r#"{"status": "done"}"#])
        .assert()
        .success();
    cstore(&dir)
        .args(["put", "tasks", "a", r#"{"status": "todo"}"#])
        .assert()
        .success();

    let output = cstore(&dir)
        .args(["list", "tasks", "--format", "json"])
        .output()
        .unwrap();
    let items = stdout_json(&output);
    let ids: Vec<_> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);

    cstore(&dir)
        .args(["list", "tasks", "--where", "status=done"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("b\t"))
        .stdout(predicate::str::contains("todo").not());
}

#[test]
fn test_list_empty_collection() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["list", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No items in 'notes'"));
}

#[test]
fn test_list_rejects_bad_filter() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["list", "tasks", "--where", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_count_and_exists() {
    let dir = TempDir::new().unwrap();
    cstore(&dir)
        .args(["put", "templates", "x", "{}"])
        .assert()
        .success();

    cstore(&dir)
        .args(["count", "templates"])
        .assert()
        .success()
        .stdout("1\n");

    cstore(&dir)
        .args(["exists", "templates", "x"])
        .assert()
        .success()
        .stdout("true\n");

    cstore(&dir)
        .args(["exists", "templates", "y"])
        .assert()
        .success()
        .stdout("false\n");
}

// =============================================================================
// Delete / Clear / Import Tests
// =============================================================================

#[test]
fn test_delete_removes_item_file() {
    let dir = TempDir::new().unwrap();
    cstore(&dir)
        .args(["put", "tasks", "t1", "{}"])
        .assert()
        .success();

    cstore(&dir)
        .args(["delete", "tasks", "t1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 't1'"));

    assert!(!dir.path().join("tasks/t1.json").exists());

    cstore(&dir)
        .args(["delete", "tasks", "t1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_clear_empties_collection() {
    let dir = TempDir::new().unwrap();
    for id in ["a", "b"] {
        cstore(&dir)
            .args(["put", "templates", id, "{}"])
            .assert()
            .success();
    }

    cstore(&dir)
        .args(["clear", "templates"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 items removed"));

    let content = fs::read_to_string(dir.path().join("templates.json")).unwrap();
    assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), serde_json::json!([]));
}

#[test]
fn test_import_replaces_collection() {
    let dir = TempDir::new().unwrap();
    cstore(&dir)
        .args(["put", "tasks", "old", "{}"])
        .assert()
        .success();

    let file = dir.path().join("import.json");
    fs::write(&file, r#"[{"id": "n1"}, {"id": "n2", "title": "Second"}]"#).unwrap();

    cstore(&dir)
        .args(["import", "tasks"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 items"));

    assert!(!dir.path().join("tasks/old.json").exists());
    assert!(dir.path().join("tasks/n1.json").is_file());
    assert!(dir.path().join("tasks/n2.json").is_file());
}

#[test]
fn test_import_requires_ids() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("import.json");
    fs::write(&file, r#"[{"title": "no id"}]"#).unwrap();

    cstore(&dir).args(["import", "notes"]).arg(&file).assert().failure();
    assert!(!dir.path().join("notes.json").exists());
}

// =============================================================================
// Collections / Backup / Restore Tests
// =============================================================================

#[test]
fn test_collections_lists_both_layouts() {
    let dir = TempDir::new().unwrap();
    cstore(&dir)
        .args(["put", "tasks", "t1", "{}"])
        .assert()
        .success();
    cstore(&dir)
        .args(["put", "templates", "x", "{}"])
        .assert()
        .success();

    let output = cstore(&dir)
        .args(["collections", "--format", "json"])
        .output()
        .unwrap();
    assert_eq!(stdout_json(&output), serde_json::json!(["tasks", "templates"]));

    cstore(&dir)
        .arg("collections")
        .assert()
        .success()
        .stdout(predicate::str::contains("tasks\tItemPerFile"))
        .stdout(predicate::str::contains("templates\tSingleArrayFile"));
}

#[test]
fn test_backup_and_restore() {
    let dir = TempDir::new().unwrap();
    cstore(&dir)
        .args(["put", "tasks", "t1", r#"{"title": "Keep me"}"#])
        .assert()
        .success();
    cstore(&dir)
        .args(["put", "templates", "x", "{}"])
        .assert()
        .success();

    let output = cstore(&dir)
        .args(["backup", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let backup = stdout_json(&output)["backup"].as_str().unwrap().to_string();
    assert!(backup.contains("backup-"));

    cstore(&dir)
        .args(["delete", "tasks", "t1"])
        .assert()
        .success();

    cstore(&dir)
        .arg("restore")
        .arg(&backup)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 2 collections"));

    cstore(&dir)
        .args(["get", "tasks", "t1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Keep me"));
}

#[test]
fn test_restore_missing_file_fails() {
    let dir = TempDir::new().unwrap();

    cstore(&dir)
        .args(["restore", "no-such-backup.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to restore"));
}

// =============================================================================
// Configuration and Environment Tests
// =============================================================================

#[test]
fn test_root_from_environment() {
    let dir = TempDir::new().unwrap();

    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("cstore"))
        .env("CRITICAL_STORE_ROOT", dir.path())
        .args(["put", "templates", "x", "{}"])
        .assert()
        .success();

    assert!(dir.path().join("templates.json").is_file());
}

#[test]
fn test_store_toml_changes_layout() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("store.toml"),
        "item_per_file = [\"tasks\", \"notes\"]\n",
    )
    .unwrap();

    cstore(&dir)
        .args(["put", "notes", "n1", "{}"])
        .assert()
        .success();

    assert!(dir.path().join("notes/n1.json").is_file());
    assert!(!dir.path().join("notes.json").exists());
}

#[test]
fn test_invalid_store_toml_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("store.toml"), "item_per_file = 3\n").unwrap();

    cstore(&dir)
        .args(["count", "tasks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open store"));
}

#[test]
fn test_corrupt_item_logs_warning() {
    let dir = TempDir::new().unwrap();
    let tasks = dir.path().join("tasks");
    fs::create_dir_all(&tasks).unwrap();
    fs::write(tasks.join("t1.json"), r#"{"id": "t1"}"#).unwrap();
    fs::write(tasks.join("t2.json"), "not json").unwrap();

    cstore(&dir)
        .args(["count", "tasks"])
        .assert()
        .success()
        .stdout("1\n")
        .stderr(predicate::str::contains("WARN"));
}

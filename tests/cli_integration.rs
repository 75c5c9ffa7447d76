//! CLI integration tests for tasktree
//!
//! These tests drive the binary end to end: workspace initialization,
//! project selection, task lifecycle, dependencies, queries and two-phase
//! deletion.

use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the tasktree binary, isolated from the
/// user's global config
fn tasktree_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("tasktree"));
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join(".xdg"))
        .env("TASKTREE_ACTOR", "tester")
        .env_remove("RUST_LOG");
    cmd
}

/// Runs a command with `--format json` and parses stdout
fn json(dir: &Path, args: &[&str]) -> serde_json::Value {
    let output = tasktree_cmd(dir)
        .args(args)
        .args(["--format", "json"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    serde_json::from_str(&stdout).unwrap()
}

/// Creates a workspace with one selected project
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    tasktree_cmd(dir.path()).arg("init").assert().success();
    tasktree_cmd(dir.path())
        .args(["project", "create", "Demo", "--select"])
        .assert()
        .success();
    dir
}

fn add_task(dir: &Path, args: &[&str]) -> String {
    let mut full = vec!["task", "add"];
    full.extend_from_slice(args);
    json(dir, &full)["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Initialization
// =============================================================================

#[test]
fn test_init_creates_structure() {
    let dir = TempDir::new().unwrap();

    tasktree_cmd(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized tasktree workspace"));

    assert!(dir.path().join(".tasktree").is_dir());
    assert!(dir.path().join(".tasktree/config.toml").is_file());
    assert!(dir.path().join(".tasktree/.gitignore").is_file());
    assert!(dir.path().join(".tasktree/tasktree.db").is_file());
}

#[test]
fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();

    tasktree_cmd(dir.path()).arg("init").assert().success();
    tasktree_cmd(dir.path()).arg("init").assert().success();
}

#[test]
fn test_not_in_workspace_error() {
    let dir = TempDir::new().unwrap();

    tasktree_cmd(dir.path())
        .args(["project", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not in a tasktree workspace"));
}

#[test]
fn test_subdirectory_finds_workspace() {
    let dir = setup_workspace();
    let nested = dir.path().join("src/deep");
    std::fs::create_dir_all(&nested).unwrap();

    tasktree_cmd(&nested)
        .args(["project", "current"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo"));
}

// =============================================================================
// Projects and selection
// =============================================================================

#[test]
fn test_task_commands_require_selection() {
    let dir = TempDir::new().unwrap();
    tasktree_cmd(dir.path()).arg("init").assert().success();
    tasktree_cmd(dir.path())
        .args(["project", "create", "Unselected"])
        .assert()
        .success();

    tasktree_cmd(dir.path())
        .args(["task", "add", "Orphan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No project selected"));
}

#[test]
fn test_selection_persists_and_switches() {
    let dir = setup_workspace();
    let other = json(dir.path(), &["project", "create", "Other"]);
    let other_id = other["id"].as_str().unwrap();

    let first = add_task(dir.path(), &["In demo"]);

    tasktree_cmd(dir.path())
        .args(["project", "select", other_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected project"));

    let tasks = json(dir.path(), &["task", "list"]);
    assert_eq!(tasks.as_array().unwrap().len(), 0);

    // Tasks of the previously selected project are out of scope
    tasktree_cmd(dir.path())
        .args(["task", "show", &first])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Task not found"));
}

#[test]
fn test_project_list_marks_selected() {
    let dir = setup_workspace();

    tasktree_cmd(dir.path())
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* p-"))
        .stdout(predicate::str::contains("Demo"));

    tasktree_cmd(dir.path())
        .args(["project", "clear"])
        .assert()
        .success();

    let current = json(dir.path(), &["project", "current"]);
    assert!(current.is_null());
}

#[test]
fn test_project_update_records_actor() {
    let dir = setup_workspace();
    let current = json(dir.path(), &["project", "current"]);
    let id = current["id"].as_str().unwrap();

    let updated = tasktree_cmd(dir.path())
        .args(["project", "update", id, "--title", "Renamed", "--format", "json"])
        .env("TASKTREE_ACTOR", "alice")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&updated.get_output().stdout);
    let project: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(project["title"], "Renamed");
    assert_eq!(project["created_by"], "tester");
    assert_eq!(project["updated_by"], "alice");
}

#[test]
fn test_project_delete_two_phases() {
    let dir = setup_workspace();
    let id = json(dir.path(), &["project", "current"])["id"]
        .as_str()
        .unwrap()
        .to_string();
    add_task(dir.path(), &["Doomed"]);

    let marked = json(dir.path(), &["project", "delete", &id]);
    assert_eq!(marked["phase"], "marked");
    assert_eq!(marked["descendants"].as_array().unwrap().len(), 1);

    let shown = json(dir.path(), &["project", "show", &id]);
    assert_eq!(shown["state"], "pending-deletion");

    let removed = json(dir.path(), &["project", "delete", &id]);
    assert_eq!(removed["phase"], "removed");

    let projects = json(dir.path(), &["project", "list"]);
    assert!(projects.as_array().unwrap().is_empty());
}

// =============================================================================
// Tasks
// =============================================================================

#[test]
fn test_task_add_and_show() {
    let dir = setup_workspace();

    tasktree_cmd(dir.path())
        .args(["task", "add", "My First Task"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created task: t-"));

    let tasks = json(dir.path(), &["task", "list"]);
    let task = &tasks.as_array().unwrap()[0];
    assert_eq!(task["title"], "My First Task");
    assert_eq!(task["state"], "pending");
    assert_eq!(task["complexity"], 5);
    assert_eq!(task["priority"], "medium");
    assert_eq!(task["depth"], 0);
    assert_eq!(task["created_by"], "tester");
}

#[test]
fn test_subtasks_and_tree() {
    let dir = setup_workspace();
    let root = add_task(dir.path(), &["Backend"]);
    let child = add_task(dir.path(), &["API", "--parent", &root]);
    add_task(dir.path(), &["Handlers", "--parent", &child]);

    let shown = json(dir.path(), &["task", "show", &child]);
    assert_eq!(shown["depth"], 1);
    assert_eq!(shown["parent_id"], root.as_str());

    let children = json(dir.path(), &["task", "children", &root]);
    assert_eq!(children.as_array().unwrap().len(), 1);

    let tree = json(dir.path(), &["task", "tree"]);
    assert_eq!(tree[0]["title"], "Backend");
    assert_eq!(tree[0]["children"][0]["title"], "API");
    assert_eq!(tree[0]["children"][0]["children"][0]["title"], "Handlers");

    tasktree_cmd(dir.path())
        .args(["task", "tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("    t-").and(predicate::str::contains("Handlers")));
}

#[test]
fn test_invalid_complexity_rejected() {
    let dir = setup_workspace();

    tasktree_cmd(dir.path())
        .args(["task", "add", "Too hard", "--complexity", "11"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("complexity must be between 1 and 10"));
}

#[test]
fn test_invalid_task_id_error() {
    let dir = setup_workspace();

    tasktree_cmd(dir.path())
        .args(["task", "show", "not-an-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid task ID format"));
}

#[test]
fn test_depth_limit_from_config() {
    let dir = setup_workspace();
    std::fs::write(
        dir.path().join(".tasktree/config.toml"),
        "[limits]\nmax_depth = 1\n",
    )
    .unwrap();

    let root = add_task(dir.path(), &["Root"]);
    let child = add_task(dir.path(), &["Child", "--parent", &root]);

    tasktree_cmd(dir.path())
        .args(["task", "add", "Grandchild", "--parent", &child])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Depth 2 exceeds the maximum of 1"));
}

#[test]
fn test_task_update_fields() {
    let dir = setup_workspace();
    let id = add_task(dir.path(), &["Draft"]);

    let updated = json(
        dir.path(),
        &["task", "update", &id, "--title", "Final", "--priority", "high", "--complexity", "3"],
    );
    assert_eq!(updated["title"], "Final");
    assert_eq!(updated["priority"], "high");
    assert_eq!(updated["complexity"], 3);

    tasktree_cmd(dir.path())
        .args(["task", "update", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to update"));
}

// =============================================================================
// State transitions
// =============================================================================

#[test]
fn test_task_start_and_done() {
    let dir = setup_workspace();
    let id = add_task(dir.path(), &["Work"]);

    tasktree_cmd(dir.path())
        .args(["task", "start", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending -> in-progress"));

    let done = json(dir.path(), &["task", "done", &id]);
    assert_eq!(done["from"], "in-progress");
    assert_eq!(done["task"]["state"], "completed");
}

#[test]
fn test_direct_completion_rejected() {
    let dir = setup_workspace();
    let id = add_task(dir.path(), &["Skip ahead"]);

    tasktree_cmd(dir.path())
        .args(["task", "done", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("start the task first"));
}

#[test]
fn test_complex_task_needs_breakdown() {
    let dir = setup_workspace();
    let id = add_task(dir.path(), &["Big feature", "--complexity", "9"]);

    let breakdown = json(dir.path(), &["breakdown"]);
    assert_eq!(breakdown[0]["id"], id.as_str());

    tasktree_cmd(dir.path())
        .args(["task", "start", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("needs-breakdown"));

    add_task(dir.path(), &["Smaller piece", "--parent", &id]);

    tasktree_cmd(dir.path())
        .args(["task", "start", &id])
        .assert()
        .success();
    assert!(json(dir.path(), &["breakdown"]).as_array().unwrap().is_empty());
}

#[test]
fn test_cannot_enter_pending_deletion_directly() {
    let dir = setup_workspace();
    let id = add_task(dir.path(), &["Sneaky"]);

    tasktree_cmd(dir.path())
        .args(["task", "state", &id, "pending-deletion"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("use delete to remove it"));
}

// =============================================================================
// Dependencies and queries
// =============================================================================

#[test]
fn test_dependencies_gate_readiness() {
    let dir = setup_workspace();
    let design = add_task(dir.path(), &["Design"]);
    let build = add_task(dir.path(), &["Build"]);

    let added = json(dir.path(), &["dep", "add", &build, &design]);
    assert_eq!(added["added"], true);

    let ready = json(dir.path(), &["ready"]);
    let ids: Vec<_> = ready.as_array().unwrap().iter().map(|t| t["id"].clone()).collect();
    assert_eq!(ids, vec![serde_json::json!(design)]);

    let blocked = json(dir.path(), &["blocked"]);
    assert_eq!(blocked[0]["id"], build.as_str());

    tasktree_cmd(dir.path()).args(["task", "start", &design]).assert().success();
    tasktree_cmd(dir.path()).args(["task", "done", &design]).assert().success();

    let ready = json(dir.path(), &["ready"]);
    assert_eq!(ready[0]["id"], build.as_str());

    let listed = json(dir.path(), &["dep", "list", &build]);
    assert_eq!(listed["dependencies"][0]["id"], design.as_str());
}

#[test]
fn test_cycle_rejected() {
    let dir = setup_workspace();
    let a = add_task(dir.path(), &["A"]);
    let b = add_task(dir.path(), &["B"]);
    let c = add_task(dir.path(), &["C"]);

    tasktree_cmd(dir.path()).args(["dep", "add", &b, &a]).assert().success();
    tasktree_cmd(dir.path()).args(["dep", "add", &c, &b]).assert().success();

    tasktree_cmd(dir.path())
        .args(["dep", "add", &a, &c])
        .assert()
        .failure()
        .stderr(predicate::str::contains("would create a cycle"));

    let order = json(dir.path(), &["order"]);
    let titles: Vec<_> = order
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, ["A", "B", "C"]);
}

#[test]
fn test_dep_remove_is_idempotent() {
    let dir = setup_workspace();
    let a = add_task(dir.path(), &["A"]);
    let b = add_task(dir.path(), &["B"]);
    tasktree_cmd(dir.path()).args(["dep", "add", &b, &a]).assert().success();

    assert_eq!(json(dir.path(), &["dep", "remove", &b, &a])["removed"], true);
    assert_eq!(json(dir.path(), &["dep", "remove", &b, &a])["removed"], false);
}

#[test]
fn test_next_prefers_high_priority() {
    let dir = setup_workspace();
    add_task(dir.path(), &["Routine"]);
    let urgent = add_task(dir.path(), &["Urgent", "--priority", "high"]);

    let next = json(dir.path(), &["next"]);
    assert_eq!(next["id"], urgent.as_str());
}

#[test]
fn test_progress_report() {
    let dir = setup_workspace();
    let a = add_task(dir.path(), &["A"]);
    add_task(dir.path(), &["B"]);
    tasktree_cmd(dir.path()).args(["task", "start", &a]).assert().success();
    tasktree_cmd(dir.path()).args(["task", "done", &a]).assert().success();

    let report = json(dir.path(), &["progress"]);
    assert_eq!(report["total"], 2);
    assert_eq!(report["completion_percent"], 50.0);

    tasktree_cmd(dir.path())
        .args(["progress"])
        .assert()
        .success()
        .stdout(predicate::str::contains("50.0% complete"));
}

// =============================================================================
// Deletion
// =============================================================================

#[test]
fn test_task_delete_two_phases() {
    let dir = setup_workspace();
    let id = add_task(dir.path(), &["Temporary"]);

    tasktree_cmd(dir.path())
        .args(["task", "delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run delete again to confirm"));

    let shown = json(dir.path(), &["task", "show", &id]);
    assert_eq!(shown["state"], "pending-deletion");

    tasktree_cmd(dir.path())
        .args(["task", "start", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pending deletion"));

    tasktree_cmd(dir.path())
        .args(["task", "delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted"));

    assert!(json(dir.path(), &["task", "list"]).as_array().unwrap().is_empty());
}

#[test]
fn test_delete_with_children_needs_cascade() {
    let dir = setup_workspace();
    let root = add_task(dir.path(), &["Root"]);
    add_task(dir.path(), &["Child", "--parent", &root]);

    tasktree_cmd(dir.path())
        .args(["task", "delete", &root])
        .assert()
        .failure()
        .stderr(predicate::str::contains("use a cascading delete"));

    let preview = json(dir.path(), &["task", "delete", &root, "--cascade", "--dry-run"]);
    assert_eq!(preview["dry_run"], true);
    assert_eq!(json(dir.path(), &["task", "show", &root])["state"], "pending");

    json(dir.path(), &["task", "delete", &root, "--cascade"]);
    let removed = json(dir.path(), &["task", "delete", &root, "--cascade"]);
    assert_eq!(removed["removed"].as_array().unwrap().len(), 2);
    assert!(json(dir.path(), &["task", "list"]).as_array().unwrap().is_empty());
}

#[test]
fn test_verbose_logs_to_stderr() {
    let dir = setup_workspace();

    tasktree_cmd(dir.path())
        .args(["--verbose", "project", "current"])
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG"));
}

//! Integration tests for the flowmind CLI
//!
//! Each test runs the binary against a temporary projects root and checks
//! the printed output, the exit code and the files left on disk.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a flowmind Command rooted in `dir`
fn flowmind(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("flowmind");
    cmd.current_dir(dir.path())
        .env_remove("FLOWMIND_PROJECTS_DIR")
        .env_remove("FLOWMIND_MAX_HALT_ATTEMPTS")
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("TELEGRAM_CHAT_ID")
        .env("FLOWMIND_LOG", "warn");
    cmd
}

fn workspace(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("flowmind.toml"), config).unwrap();
    dir
}

fn simple_workspace(stations: &str) -> TempDir {
    workspace(&format!("[pipeline]\nvariant = \"simple\"\n\n{}", stations))
}

fn state_path(dir: &TempDir, id: &str) -> PathBuf {
    dir.path().join("projects").join(id).join("PROJECT_STATE.json")
}

fn read_state(dir: &TempDir, id: &str) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(state_path(dir, id)).unwrap()).unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        cargo_bin_cmd!("flowmind").arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        cargo_bin_cmd!("flowmind").arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_sealed_state() {
        let dir = workspace("");
        flowmind(&dir)
            .args(["init", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created FM_1"));

        let state = read_state(&dir, "FM_1");
        assert_eq!(state["project_id"], "FM_1");
        assert_eq!(state["phase"], "CREATED");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(state_path(&dir, "FM_1"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o444);
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = workspace("");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        flowmind(&dir)
            .args(["init", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_invalid_project_id_is_usage_error() {
        let dir = workspace("");
        flowmind(&dir).args(["init", "../escape"]).assert().code(2);
    }

    #[test]
    fn test_status_of_missing_project() {
        let dir = workspace("");
        flowmind(&dir).args(["status", "FM_9"]).assert().code(5);
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let dir = workspace("");
        fs::create_dir_all(dir.path().join("projects/FM_1")).unwrap();
        fs::write(state_path(&dir, "FM_1"), "{ not json").unwrap();
        flowmind(&dir)
            .args(["status", "FM_1"])
            .assert()
            .code(5)
            .stderr(predicate::str::contains("corrupt"));
    }

    #[test]
    fn test_identity_mismatch() {
        let dir = workspace("");
        flowmind(&dir).args(["init", "FM_B"]).assert().success();
        fs::create_dir_all(dir.path().join("projects/FM_A")).unwrap();
        fs::copy(state_path(&dir, "FM_B"), state_path(&dir, "FM_A")).unwrap();

        flowmind(&dir).args(["status", "FM_A"]).assert().code(4);
        flowmind(&dir).args(["advance", "FM_A"]).assert().code(4);
        assert_eq!(read_state(&dir, "FM_A")["project_id"], "FM_B");
    }

    #[test]
    fn test_bad_config_fails() {
        let dir = workspace("[pipeline]\nvariant = \"nonsense\"\n");
        flowmind(&dir).args(["status", "FM_1"]).assert().code(1);
    }
}

// =============================================================================
// Transition Tests
// =============================================================================

mod transitions {
    use super::*;

    #[test]
    fn test_advance_records_history() {
        let dir = simple_workspace("");
        flowmind(&dir)
            .args(["advance", "FM_1", "script"])
            .assert()
            .success()
            .stdout(predicate::str::contains("TOPIC -> SCRIPT"));

        assert_eq!(read_state(&dir, "FM_1")["phase"], "SCRIPT");
        flowmind(&dir)
            .args(["history", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("SCRIPT").and(predicate::str::contains("OK")));
    }

    #[test]
    fn test_advance_from_minimal_state_document() {
        let dir = simple_workspace("");
        fs::create_dir_all(dir.path().join("projects/FM_1")).unwrap();
        fs::write(
            state_path(&dir, "FM_1"),
            r#"{"project_id":"FM_1","phase":"TOPIC","phase_history":[{"phase":"TOPIC","recovered":true}]}"#,
        )
        .unwrap();

        flowmind(&dir)
            .args(["advance", "FM_1", "SCRIPT"])
            .assert()
            .success()
            .stdout(predicate::str::contains("TOPIC -> SCRIPT"));
        let state = read_state(&dir, "FM_1");
        assert_eq!(state["phase"], "SCRIPT");
        assert!(state["created_at"].is_string());
    }

    #[test]
    fn test_already_reached_phase_is_noop() {
        let dir = simple_workspace("");
        flowmind(&dir).args(["advance", "FM_1", "SCENE"]).assert().success();
        flowmind(&dir)
            .args(["advance", "FM_1", "SCRIPT"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already at SCENE"));
    }

    #[test]
    fn test_unknown_phase_name() {
        let dir = simple_workspace("");
        flowmind(&dir).args(["advance", "FM_1", "PUBLISH"]).assert().code(2);
    }

    #[test]
    fn test_phase_outside_variant() {
        let dir = simple_workspace("");
        flowmind(&dir)
            .args(["advance", "FM_1", "FINAL_QA"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("simple"));
    }

    #[test]
    fn test_upload_requires_qa() {
        let dir = simple_workspace("");
        flowmind(&dir)
            .args(["advance", "FM_1", "UPLOAD"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("qa_passed"));
        assert_eq!(read_state(&dir, "FM_1")["phase"], "TOPIC");
    }

    #[test]
    fn test_rollback_after_assembly_is_forbidden() {
        let dir = workspace("");
        flowmind(&dir)
            .args(["advance", "FM_1", "ASSEMBLY_FROM_AUDIO"])
            .assert()
            .success();
        assert_eq!(read_state(&dir, "FM_1")["mode_locked"], true);

        flowmind(&dir)
            .args(["advance", "FM_1", "SCRIPT"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Rollback forbidden"));
        assert_eq!(read_state(&dir, "FM_1")["phase"], "ASSEMBLY_FROM_AUDIO");
    }

    #[test]
    fn test_external_tool_failure() {
        let dir = simple_workspace("[stations.SCRIPT]\ncommand = \"echo model offline >&2; exit 3\"\n");
        flowmind(&dir)
            .args(["advance", "FM_1"])
            .assert()
            .code(6)
            .stderr(predicate::str::contains("model offline"));
        assert_eq!(read_state(&dir, "FM_1")["phase"], "TOPIC");
        flowmind(&dir)
            .args(["history", "FM_1"])
            .assert()
            .stdout(predicate::str::contains("FAILED"));
    }

    #[test]
    fn test_mode_is_recorded() {
        let dir = workspace("");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        flowmind(&dir).args(["mode", "FM_1", "long"]).assert().success();
        assert_eq!(read_state(&dir, "FM_1")["mode"], "LONG");
        flowmind(&dir).args(["mode", "FM_1", "medium"]).assert().code(2);
    }
}

// =============================================================================
// Halt and Recovery Tests
// =============================================================================

mod halts {
    use super::*;

    fn failing_qa() -> TempDir {
        simple_workspace(
            "[stations.QA]\ncommand = \"echo 'audio too quiet' > HALT_REASON.txt; exit 1\"\n",
        )
    }

    #[test]
    fn test_gate_failures_escalate_to_hard_stop() {
        let dir = failing_qa();
        flowmind(&dir).args(["advance", "FM_1", "THUMBNAIL"]).assert().success();

        for attempt in 1..=2 {
            flowmind(&dir)
                .args(["advance", "FM_1"])
                .assert()
                .code(10)
                .stderr(predicate::str::contains("audio too quiet"));
            let state = read_state(&dir, "FM_1");
            assert_eq!(state["halt_count"], attempt);
            assert_eq!(state["halted"], true);
            assert_eq!(state["phase"], "THUMBNAIL");
        }

        flowmind(&dir).args(["advance", "FM_1"]).assert().code(11);
        assert_eq!(read_state(&dir, "FM_1")["hard_stop"], true);

        // Locked out until unlock.
        flowmind(&dir).args(["advance", "FM_1"]).assert().code(11);
        flowmind(&dir).args(["resume", "FM_1"]).assert().code(11);

        flowmind(&dir)
            .args(["unlock", "FM_1", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("unlocked"));
        let state = read_state(&dir, "FM_1");
        assert_eq!(state["halt_count"], 0);
        assert!(state.get("hard_stop").is_none());
        assert!(state.get("halted").is_none());
    }

    #[test]
    fn test_resume_after_halt() {
        let dir = failing_qa();
        flowmind(&dir).args(["advance", "FM_1", "THUMBNAIL"]).assert().success();
        flowmind(&dir).args(["advance", "FM_1"]).assert().code(10);

        flowmind(&dir)
            .args(["advance", "FM_1", "SCRIPT"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("halted"));

        flowmind(&dir)
            .args(["resume", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("resumed"));
        let state = read_state(&dir, "FM_1");
        assert_eq!(state["phase"], "THUMBNAIL");
        assert!(state.get("halted").is_none());

        flowmind(&dir)
            .args(["history", "FM_1"])
            .assert()
            .stdout(predicate::str::contains("HALT").and(predicate::str::contains("RESUME")));
    }

    #[test]
    fn test_unlock_without_hard_stop_is_noop() {
        let dir = workspace("");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        flowmind(&dir)
            .args(["unlock", "FM_1", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to unlock"));
    }

    #[test]
    fn test_max_attempts_from_env() {
        let dir = failing_qa();
        flowmind(&dir).args(["advance", "FM_1", "THUMBNAIL"]).assert().success();
        flowmind(&dir)
            .env("FLOWMIND_MAX_HALT_ATTEMPTS", "1")
            .args(["advance", "FM_1"])
            .assert()
            .code(11);
    }
}

// =============================================================================
// Approval Tests
// =============================================================================

mod approvals {
    use super::*;

    #[test]
    fn test_manual_approval() {
        let dir = workspace("");
        flowmind(&dir)
            .args(["advance", "FM_1", "AWAITING_APPROVAL"])
            .assert()
            .success();
        flowmind(&dir)
            .args(["advance", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("needs a verdict for APPROVED"));

        flowmind(&dir)
            .args(["approve", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("APPROVED"));
        let state = read_state(&dir, "FM_1");
        assert_eq!(state["phase"], "APPROVED");
        assert_eq!(state["approval_status"], "APPROVED");
        flowmind(&dir)
            .args(["status", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Approval:   APPROVED"));
    }

    #[test]
    fn test_manual_rejection_halts() {
        let dir = workspace("");
        flowmind(&dir)
            .args(["advance", "FM_1", "AWAITING_APPROVAL"])
            .assert()
            .success();
        flowmind(&dir).args(["reject", "FM_1"]).assert().code(10);
        let state = read_state(&dir, "FM_1");
        assert_eq!(state["approval_status"], "REJECTED");
        assert_eq!(state["phase"], "AWAITING_APPROVAL");
    }

    #[test]
    fn test_approve_when_not_waiting() {
        let dir = workspace("");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        flowmind(&dir).args(["approve", "FM_1"]).assert().code(2);
    }
}

// =============================================================================
// Orchestrator and Archive Tests
// =============================================================================

mod orchestration {
    use super::*;

    #[test]
    fn test_run_loop_to_done() {
        let dir = simple_workspace("[stations.QA]\ncommand = \"exit 0\"\n");
        flowmind(&dir)
            .args(["run", "FM_1", "--loop", "--interval", "0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("complete at DONE"));
        assert_eq!(read_state(&dir, "FM_1")["phase"], "DONE");
        assert!(!dir.path().join("projects/FM_1/.orch.lock").exists());
    }

    #[test]
    fn test_run_once() {
        let dir = simple_workspace("");
        flowmind(&dir)
            .args(["run", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("TOPIC -> SCRIPT"));
    }

    #[test]
    fn test_run_refuses_held_lock() {
        let dir = simple_workspace("");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        let lock = format!(
            "{{\"pid\": {}, \"project_id\": \"FM_1\", \"started_at\": \"2026-01-01T00:00:00Z\"}}",
            std::process::id()
        );
        fs::write(dir.path().join("projects/FM_1/.orch.lock"), lock).unwrap();

        flowmind(&dir).args(["run", "FM_1"]).assert().code(7);
    }

    #[test]
    fn test_manual_commands_respect_held_lock() {
        let dir = simple_workspace("");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        let lock = format!(
            "{{\"pid\": {}, \"project_id\": \"FM_1\", \"started_at\": \"2026-01-01T00:00:00Z\"}}",
            std::process::id()
        );
        fs::write(dir.path().join("projects/FM_1/.orch.lock"), lock).unwrap();
        let before = fs::read_to_string(state_path(&dir, "FM_1")).unwrap();

        for args in [
            vec!["advance", "FM_1"],
            vec!["advance", "FM_1", "SCRIPT"],
            vec!["resume", "FM_1"],
            vec!["--yes", "unlock", "FM_1"],
            vec!["approve", "FM_1"],
            vec!["reject", "FM_1"],
            vec!["mode", "FM_1", "long"],
        ] {
            flowmind(&dir).args(&args).assert().code(7);
        }

        assert_eq!(fs::read_to_string(state_path(&dir, "FM_1")).unwrap(), before);
        assert!(dir.path().join("projects/FM_1/.orch.lock").exists());
    }

    #[test]
    fn test_run_recover() {
        let dir = simple_workspace("[stations.QA]\ncommand = \"exit 1\"\n");
        flowmind(&dir).args(["advance", "FM_1", "THUMBNAIL"]).assert().success();
        flowmind(&dir)
            .args(["run", "FM_1", "--loop", "--interval", "0"])
            .assert()
            .code(10);
        flowmind(&dir)
            .args(["run", "FM_1", "--recover"])
            .assert()
            .success()
            .stdout(predicate::str::contains("resumed"));
    }

    #[test]
    fn test_archive_terminal_project() {
        let dir = simple_workspace("");
        flowmind(&dir).args(["advance", "FM_1", "DONE"]).assert().success();
        flowmind(&dir)
            .args(["archive", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Archived FM_1"));
        assert!(dir.path().join("projects/_archive/FM_1/PROJECT_STATE.json").exists());
        assert!(!dir.path().join("projects/FM_1").exists());
    }

    #[test]
    fn test_archive_requires_terminal_phase() {
        let dir = simple_workspace("");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        flowmind(&dir)
            .args(["archive", "FM_1"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("--force"));
    }

    #[test]
    fn test_validate_project() {
        let dir = workspace("[telegram]\nenabled = true\n");
        flowmind(&dir).args(["init", "FM_1"]).assert().success();
        flowmind(&dir)
            .args(["validate", "FM_1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("state is valid"));
    }
}

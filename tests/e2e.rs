#![cfg(unix)]

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::{TempDir, tempdir};

const NONE_PENDING: &str = "Installed On ... | Description | No migrations pending";
const PENDING: &str = "20240101000000/installed init\n20240202000000/pending add users";

// Stand-in for sqlx-cli. Logs its argv and reads its behaviour from env vars.
const FAKE_SQLX: &str = r#"#!/bin/sh
printf '%s\n' "$*" >> "$FAKE_SQLX_LOG"
case "$*" in
  "-V")
    [ -n "$FAKE_SQLX_BROKEN" ] && exit 1
    printf 'sqlx-cli 0.8.2\n'
    ;;
  "migrate info")
    printf '%s\n' "$FAKE_SQLX_INFO"
    [ -n "$FAKE_SQLX_INFO_STDERR" ] && printf '%s\n' "$FAKE_SQLX_INFO_STDERR" >&2
    exit "${FAKE_SQLX_INFO_CODE:-0}"
    ;;
  "database setup")
    [ -f app.db ] || printf 'fresh' > app.db
    exit "${FAKE_SQLX_SETUP_CODE:-0}"
    ;;
  "database reset -y")
    code="${FAKE_SQLX_RESET_CODE:-0}"
    [ "$code" = "0" ] && printf 'rebuilt' > app.db
    exit "$code"
    ;;
esac
"#;

/// Written once, before any test spawns a process, so no child can inherit
/// a write handle to it.
fn fake_tool() -> &'static Path {
    static TOOL: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = TOOL.get_or_init(|| {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("sqlx");
        fs::write(&path, FAKE_SQLX).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    });
    path
}

struct Scenario {
    dir: TempDir,
    tool: &'static Path,
}

impl Scenario {
    fn new() -> Self {
        let tool = fake_tool();
        Self {
            dir: tempdir().unwrap(),
            tool,
        }
    }

    fn with_db(bytes: &[u8]) -> Self {
        let scenario = Self::new();
        fs::write(scenario.db(), bytes).unwrap();
        scenario
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("app.db")
    }

    fn backups_dir(&self) -> PathBuf {
        self.dir.path().join("db_backups")
    }

    fn guard(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("migration-guard");
        cmd.current_dir(self.dir.path())
            .env_remove("MIGRATION_GUARD_DEBUG")
            .env("FAKE_SQLX_LOG", self.log_path())
            .arg("--tool")
            .arg(self.tool);
        cmd
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("sqlx.log")
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn backup_files(&self) -> Vec<PathBuf> {
        if !self.backups_dir().exists() {
            return Vec::new();
        }
        fs::read_dir(self.backups_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("db"))
            .collect()
    }
}

#[test]
fn test_empty_directory_creates_database() {
    let s = Scenario::new();

    s.guard()
        .assert()
        .success()
        .stdout(predicate::str::contains("No database found"));

    assert_eq!(s.calls(), vec!["-V", "database setup"]);
    assert_eq!(fs::read(s.db()).unwrap(), b"fresh");
    assert!(!s.backups_dir().exists());
}

#[test]
fn test_nothing_pending_is_a_no_op() {
    let s = Scenario::with_db(b"current");

    for _ in 0..2 {
        s.guard()
            .env("FAKE_SQLX_INFO", NONE_PENDING)
            .assert()
            .success()
            .stdout(predicate::str::contains("No migrations pending"));
    }

    assert_eq!(
        s.calls(),
        vec!["-V", "migrate info", "-V", "migrate info"]
    );
    assert!(s.backup_files().is_empty());
    assert_eq!(fs::read(s.db()).unwrap(), b"current");
}

#[test]
fn test_pending_backs_up_before_reset() {
    let s = Scenario::with_db(b"SQLite format 3\0old rows");

    s.guard()
        .arg("run")
        .env("FAKE_SQLX_INFO", PENDING)
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup written to"));

    assert_eq!(s.calls(), vec!["-V", "migrate info", "database reset -y"]);
    let backups = s.backup_files();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(&backups[0]).unwrap(), b"SQLite format 3\0old rows");
    let name = backups[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(!name.contains(':'), "unsafe backup name {name}");
    assert!(backups[0].with_extension("sha256").exists());
    assert_eq!(fs::read(s.db()).unwrap(), b"rebuilt");
    assert!(!s.dir.path().join("app.db.migration-guard.lock").exists());
}

#[test]
fn test_final_step_setup_from_config_file() {
    let s = Scenario::with_db(b"db");
    fs::write(
        s.dir.path().join("migration-guard.json"),
        r#"{"final_step": "setup", "backup_dir": "../snapshots"}"#,
    )
    .unwrap();
    let workdir = s.dir.path().join("bot");
    fs::create_dir(&workdir).unwrap();
    fs::rename(s.db(), workdir.join("app.db")).unwrap();

    s.guard()
        .args(["--workdir", "bot", "--config", "migration-guard.json"])
        .env("FAKE_SQLX_INFO", PENDING)
        .assert()
        .success();

    assert_eq!(s.calls(), vec!["-V", "migrate info", "database setup"]);
    let snapshots: Vec<_> = fs::read_dir(s.dir.path().join("snapshots"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("db"))
        .collect();
    assert_eq!(snapshots.len(), 1);
}

#[test]
fn test_missing_tool_exits_127_with_hint() {
    let s = Scenario::with_db(b"db");

    cargo_bin_cmd!("migration-guard")
        .current_dir(s.dir.path())
        .args(["--tool", "/nonexistent/sqlx"])
        .assert()
        .code(127)
        .stderr(predicate::str::contains("was not found"))
        .stderr(predicate::str::contains("cargo install sqlx-cli"));

    assert!(s.backup_files().is_empty());
}

#[test]
fn test_broken_tool_is_reported_missing() {
    let s = Scenario::with_db(b"db");

    s.guard()
        .env("FAKE_SQLX_BROKEN", "1")
        .assert()
        .code(127);

    assert_eq!(s.calls(), vec!["-V"]);
}

#[test]
fn test_failed_status_halts_and_redacts_credentials() {
    let s = Scenario::with_db(b"db");

    s.guard()
        .env("FAKE_SQLX_INFO", PENDING)
        .env("FAKE_SQLX_INFO_CODE", "4")
        .env(
            "FAKE_SQLX_INFO_STDERR",
            "error: could not connect to postgres://app:hunter2@db:5432/app",
        )
        .assert()
        .code(4)
        .stderr(predicate::str::contains("postgres://app:[REDACTED]@db"))
        .stderr(predicate::str::contains("hunter2").not());

    assert_eq!(s.calls(), vec!["-V", "migrate info"]);
    assert!(s.backup_files().is_empty());
}

#[test]
fn test_failed_reset_keeps_backup_and_exit_code() {
    let s = Scenario::with_db(b"precious");

    s.guard()
        .env("FAKE_SQLX_INFO", PENDING)
        .env("FAKE_SQLX_RESET_CODE", "3")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("database reset -y"));

    let backups = s.backup_files();
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(&backups[0]).unwrap(), b"precious");
}

#[test]
fn test_check_reports_without_mutating() {
    let s = Scenario::with_db(b"db");

    s.guard()
        .args(["check", "--exit-code"])
        .env("FAKE_SQLX_INFO", PENDING)
        .assert()
        .code(10)
        .stdout(predicate::str::contains("1 pending migration(s)"));

    s.guard()
        .arg("check")
        .env("FAKE_SQLX_INFO", NONE_PENDING)
        .assert()
        .success()
        .stdout(predicate::str::contains("No migrations pending"));

    assert!(!s.backups_dir().exists());
    assert!(!s.calls().iter().any(|c| c.starts_with("database")));
}

#[test]
fn test_held_lock_blocks_run() {
    let s = Scenario::with_db(b"db");
    fs::write(s.dir.path().join("app.db.migration-guard.lock"), "12345").unwrap();

    s.guard()
        .env("FAKE_SQLX_INFO", PENDING)
        .assert()
        .code(75)
        .stderr(predicate::str::contains("holds the lock"));
    assert!(s.backup_files().is_empty());

    s.guard()
        .arg("--no-lock")
        .env("FAKE_SQLX_INFO", PENDING)
        .assert()
        .success();
    assert_eq!(s.backup_files().len(), 1);
}

#[test]
fn test_backups_list_and_verify() {
    let s = Scenario::with_db(b"db");
    s.guard()
        .env("FAKE_SQLX_INFO", PENDING)
        .assert()
        .success();
    let backup = s.backup_files().pop().unwrap();
    let name = backup.file_name().unwrap().to_string_lossy().into_owned();

    s.guard()
        .args(["backups", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(name.as_str()))
        .stdout(predicate::str::contains("ok"));

    s.guard()
        .args(["backups", "verify"])
        .arg(&backup)
        .assert()
        .success()
        .stdout(predicate::str::contains("checksum ok"));

    fs::write(&backup, b"tampered").unwrap();
    s.guard()
        .args(["backups", "verify"])
        .arg(&backup)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not match"));
}

#[test]
fn test_invalid_retention_is_a_config_error() {
    let s = Scenario::with_db(b"db");

    s.guard()
        .args(["--keep-backups", "0"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("keep_backups"));

    assert!(s.calls().is_empty());
}

#[test]
fn test_missing_workdir_is_a_config_error() {
    let s = Scenario::with_db(b"db");

    s.guard()
        .args(["--workdir", "does-not-exist"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("does-not-exist"))
        .stderr(predicate::str::contains("sqlx-cli").not());

    assert!(s.calls().is_empty());
}

#[test]
fn test_unreadable_config_file_is_a_config_error() {
    let s = Scenario::with_db(b"db");

    s.guard()
        .args(["--config", "missing.json"])
        .assert()
        .code(78)
        .stderr(predicate::str::contains("missing.json"));

    assert!(s.calls().is_empty());
}

// Drives the compiled binary for the paths that do not need a terminal.

use assert_cmd::Command;
use chidori::history::{HistoryDb, SessionSummary};
use chrono::Local;
use tempfile::tempdir;

#[test]
fn help_lists_monitor_flags() {
    let output = Command::cargo_bin("chidori")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for flag in ["--upstream", "--offline", "--alarm", "--export-dir", "--patient-sex"] {
        assert!(help.contains(flag), "missing {flag} in help");
    }
}

#[test]
fn history_with_empty_log_prints_notice() {
    let home = tempdir().unwrap();
    let output = Command::cargo_bin("chidori")
        .unwrap()
        .env("HOME", home.path())
        .arg("--history")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no sessions recorded yet"));
    assert!(home
        .path()
        .join(".local/state/chidori/history.db")
        .exists());
}

#[test]
fn refuses_to_run_without_a_tty() {
    let home = tempdir().unwrap();
    let output = Command::cargo_bin("chidori")
        .unwrap()
        .env("HOME", home.path())
        .arg("--offline")
        .write_stdin("")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("stdin must be a tty"));
}

#[test]
fn rejects_unknown_alarm_mode() {
    Command::cargo_bin("chidori")
        .unwrap()
        .args(["--alarm", "sometimes"])
        .assert()
        .failure();
}

#[test]
fn clear_history_empties_the_log() {
    let home = tempdir().unwrap();
    let db_path = home.path().join(".local/state/chidori/history.db");
    {
        let db = HistoryDb::open(&db_path).unwrap();
        let summary = SessionSummary {
            started_at: Local::now(),
            duration_secs: 90.0,
            initial_value: Some(520.0),
            final_value: Some(498.0),
            min: Some(498.0),
            max: Some(520.0),
            mean: Some(509.0),
            readings: 8,
            events: 1,
            alarm_fired: false,
        };
        db.record(&summary).unwrap();
        db.record(&summary).unwrap();
    }

    let output = Command::cargo_bin("chidori")
        .unwrap()
        .env("HOME", home.path())
        .arg("--clear-history")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("removed 2 recorded sessions"));
    assert_eq!(HistoryDb::open(&db_path).unwrap().count().unwrap(), 0);
}

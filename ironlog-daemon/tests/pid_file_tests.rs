//! PID file creation, deletion, and duplicate detection tests.
//!
//! Tests the PID file lifecycle through `write_pid_file` / `remove_pid_file`:
//! create -> exists -> delete, and duplicate daemon detection.

use std::fs;

use tempfile::TempDir;

use ironlog_daemon::orchestrator::{remove_pid_file, write_pid_file};

#[test]
fn test_pid_file_contains_current_pid() {
    // Given: A temp directory for the PID file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("ironlog.pid");

    // When: Writing the PID file
    write_pid_file(&pid_path).expect("should write PID file");

    // Then: File holds this process's PID followed by a newline
    let content = fs::read_to_string(&pid_path).expect("should read PID file");
    assert_eq!(content, format!("{}\n", std::process::id()));
}

#[test]
fn test_pid_file_removed() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("ironlog.pid");
    write_pid_file(&pid_path).expect("should write PID file");

    remove_pid_file(&pid_path);

    assert!(!pid_path.exists(), "PID file should be deleted");
}

#[test]
fn test_duplicate_pid_file_reports_existing_pid() {
    // Given: A PID file left behind by another instance
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("ironlog.pid");
    fs::write(&pid_path, "31337\n").expect("should write stale PID file");

    // When: Another daemon tries to start
    let err = write_pid_file(&pid_path).expect_err("duplicate PID file should be rejected");

    // Then: The error names the existing PID and the file is untouched
    let msg = err.to_string();
    assert!(msg.contains("31337"), "got: {msg}");
    assert!(msg.contains("already exists"), "got: {msg}");
    assert_eq!(fs::read_to_string(&pid_path).unwrap(), "31337\n");
}

#[test]
fn test_pid_file_nested_directory_created() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("run").join("ironlog").join("ironlog.pid");

    write_pid_file(&pid_path).expect("should create parent directories");

    assert!(pid_path.exists());
}

#[cfg(unix)]
#[test]
fn test_pid_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let pid_path = temp_dir.path().join("ironlog.pid");
    write_pid_file(&pid_path).expect("should write PID file");

    let mode = fs::metadata(&pid_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

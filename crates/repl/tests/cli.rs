//! Black-box tests for the `wisp` binary: file mode, `-c` mode, and the
//! exit-code contract from spec.md §6 (0 ok, 65 compile error, 70 runtime
//! error, 64 bad usage, 74 unreadable file).

use std::process::Command;

fn wisp() -> Command {
    Command::new(env!("CARGO_BIN_EXE_wisp"))
}

#[test]
fn file_mode_runs_a_script_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.wisp");
    std::fs::write(&path, "print 1 + 2 * 3;").unwrap();

    let output = wisp().arg(&path).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "7");
}

#[test]
fn file_mode_reports_compile_error_with_exit_65() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.wisp");
    std::fs::write(&path, "class A < A {}").unwrap();

    let output = wisp().arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(65));
}

#[test]
fn file_mode_reports_runtime_error_with_exit_70() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("boom.wisp");
    std::fs::write(&path, "var f = 1; f();").unwrap();

    let output = wisp().arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(70));
}

#[test]
fn missing_file_exits_74() {
    let output = wisp().arg("/nonexistent/path/to/a/script.wisp").output().unwrap();
    assert_eq!(output.status.code(), Some(74));
}

#[test]
fn inline_command_mode_runs_source_and_exits_zero() {
    let output = wisp().arg("-c").arg("print \"hi\";").output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hi");
}

#[test]
fn inline_command_mode_propagates_runtime_error_exit_code() {
    let output = wisp().arg("-c").arg("var f = 1; f();").output().unwrap();
    assert_eq!(output.status.code(), Some(70));
}

#[test]
fn passing_both_a_file_and_a_command_is_invalid_usage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.wisp");
    std::fs::write(&path, "print 1;").unwrap();

    let output = wisp().arg(&path).arg("-c").arg("print 2;").output().unwrap();
    assert_eq!(output.status.code(), Some(64));
}

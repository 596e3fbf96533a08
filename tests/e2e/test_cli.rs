//! End-to-end tests for the CLI binary.

#[allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("evmguard").unwrap()
}

// call(gas, 0, eq(0xa9059cbb, shr(0xe0, calldataload(0))), 0, 0, 0, 0); sstore(0, 1)
const GUARDED_CALL: &str = "600060006000600060003560e01c63a9059cbb1460005af1600160005500";

#[test]
fn test_cli_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reentrancy"))
        .stdout(predicate::str::contains("--max-visited-block"));
}

#[test]
fn test_cli_version() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("evmguard"));
}

#[test]
fn test_cli_clean_contract() {
    cmd()
        .arg("60005460010160005500")
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::contains("no reentrancy found"))
        .stdout(predicate::str::contains("1 endpoints"));
}

#[test]
fn test_cli_reports_lock() {
    cmd()
        .arg(GUARDED_CALL)
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::contains("lock:nontuple [0x17, 0x18)"))
        .stdout(predicate::str::contains("selectors: 0xa9059cbb"));
}

#[test]
fn test_cli_asm_output() {
    cmd()
        .arg("6001600201")
        .arg("-o")
        .arg("asm")
        .assert()
        .success()
        .stdout(predicate::str::contains("PUSH1"))
        .stdout(predicate::str::contains("ADD"));
}

#[test]
fn test_cli_json_output() {
    let output = cmd().arg(GUARDED_CALL).arg("-o").arg("json").output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["findings"][0]["operator"], "lock:nontuple");
    assert_eq!(json["selectors"][0], "0xa9059cbb");
    assert!(json["coverage"].is_object());
}

#[test]
fn test_cli_unknown_format_fails() {
    cmd()
        .arg("00")
        .arg("-o")
        .arg("yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown output format"));
}

#[test]
fn test_cli_0x_prefix() {
    cmd()
        .arg("0x00")
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::contains("no reentrancy found"));
}

#[test]
fn test_cli_file_input() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("bytecode.hex");
    std::fs::write(&file_path, format!("{GUARDED_CALL}\n")).unwrap();

    cmd()
        .arg("-f")
        .arg(file_path.to_str().unwrap())
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::contains("lock:nontuple"));
}

#[test]
fn test_cli_missing_file_fails() {
    cmd()
        .arg("-f")
        .arg("/nonexistent/bytecode.hex")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open"));
}

#[test]
fn test_cli_stdin_input() {
    cmd()
        .write_stdin("60005460010160005500")
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::contains("no reentrancy found"));
}

#[test]
fn test_cli_no_input_fails() {
    // Piped but empty stdin.
    cmd().write_stdin("").assert().failure().stderr(predicate::str::contains("empty bytecode"));
}

#[test]
fn test_cli_bad_hex_fails() {
    cmd()
        .arg("zz")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load bytecode"));
}

#[test]
fn test_cli_stack_fault_fails() {
    cmd()
        .arg("0100")
        .assert()
        .failure()
        .stderr(predicate::str::contains("symbolic execution failed"));
}

#[test]
fn test_cli_loop_bound_flags() {
    cmd()
        .arg("00")
        .arg("--no-color")
        .arg("--max-visited-block")
        .arg("5")
        .arg("--max-visited-block-bound")
        .arg("5")
        .assert()
        .success()
        .stdout(predicate::str::contains("loop bound 5"));
}

#[test]
fn test_cli_invalid_flag_values_fail() {
    cmd()
        .arg("00")
        .arg("--max-visited-block")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("maxVisitedBlock must be positive"));
}

#[test]
fn test_cli_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evmguard.json");
    std::fs::write(&path, r#"{"maxVisitedBlock": 12, "maxVisitedBlockBound": 40}"#).unwrap();

    cmd()
        .arg("00")
        .arg("--no-color")
        .arg("--config")
        .arg(path.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("loop bound 12"));
}

#[test]
fn test_cli_flags_override_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evmguard.json");
    std::fs::write(&path, r#"{"maxVisitedBlock": 12}"#).unwrap();

    cmd()
        .arg("00")
        .arg("--no-color")
        .arg("--config")
        .arg(path.to_str().unwrap())
        .arg("--max-visited-block")
        .arg("20")
        .assert()
        .success()
        .stdout(predicate::str::contains("loop bound 20"));
}

#[test]
fn test_cli_invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evmguard.json");
    std::fs::write(&path, "{ not json").unwrap();

    cmd()
        .arg("00")
        .arg("--config")
        .arg(path.to_str().unwrap())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn test_cli_push0_shanghai() {
    cmd().arg("5f00").arg("--no-color").assert().success();
}

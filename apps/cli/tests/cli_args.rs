//! 命令行参数面的冒烟测试（不触网，只验证解析与早期失败路径）

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_both_subcommands() {
    Command::cargo_bin("ugo-cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("monitor").and(predicate::str::contains("mock")));
}

#[test]
fn test_monitor_help_shows_deployment_defaults() {
    Command::cargo_bin("ugo-cli")
        .unwrap()
        .args(["monitor", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("8886"));
}

#[test]
fn test_mock_rejects_unparsable_ids() {
    Command::cargo_bin("ugo-cli")
        .unwrap()
        .args(["mock", "--ids", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid id"));
}

#[test]
fn test_mock_rejects_empty_id_set() {
    Command::cargo_bin("ugo-cli")
        .unwrap()
        .args(["mock", "--ids", ","])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no servo ids"));
}

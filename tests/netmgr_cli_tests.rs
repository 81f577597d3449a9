//! Integration tests for the netmgr binary
//!
//! Everything runs in dry-run mode against a temporary config directory,
//! so no host rules are touched and no privileges are needed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// netmgr with logging defaults and state kept under `dir`
fn netmgr(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("netmgr").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.path().join("netmgr.toml"))
        .arg("--config-dir")
        .arg(dir.path());
    cmd
}

fn state(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("forwarding.json")).unwrap()
}

const SEEDED: &str = r#"{
  "web": {
    "name": "web",
    "src_port": "80",
    "dest_ip": "192.168.1.100",
    "dest_port": "8080",
    "protocol": "tcp",
    "created": "2024-03-01T10:15:30Z",
    "active": true
  }
}"#;

#[test]
fn test_help_command() {
    Command::cargo_bin("netmgr")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("port forwarding"));
}

#[test]
fn test_forward_help_lists_subcommands() {
    Command::cargo_bin("netmgr")
        .unwrap()
        .args(["forward", "help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("remove"));
}

#[test]
fn test_show_bootstraps_empty_store() {
    let dir = TempDir::new().unwrap();

    netmgr(&dir)
        .args(["forward", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No port forwards configured"));

    assert_eq!(state(&dir), "{}");
    assert!(dir.path().join("routing.json").exists());
}

#[test]
fn test_show_lists_recorded_forwards() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("forwarding.json"), SEEDED).unwrap();

    netmgr(&dir)
        .args(["fwd", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NAME"))
        .stdout(predicate::str::contains("80->192.168.1.100:8080"))
        .stdout(predicate::str::contains("ACTIVE"))
        .stdout(predicate::str::contains("2024-03-01 10:15:30"));
}

#[test]
fn test_dry_run_add_logs_commands_and_persists_nothing() {
    let dir = TempDir::new().unwrap();

    netmgr(&dir)
        .args(["--dry-run", "--platform", "linux"])
        .args(["forward", "add", "web", "80", "192.168.1.100", "8080"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[DRY-RUN] Would execute: iptables -t nat -A PREROUTING -p tcp --dport 80",
        ))
        .stdout(predicate::str::contains("NETMGR:web"));

    assert_eq!(state(&dir), "{}");
}

#[test]
fn test_runs_are_appended_to_log_file() {
    let dir = TempDir::new().unwrap();

    for name in ["web", "ssh"] {
        netmgr(&dir)
            .args(["-n", "--platform", "linux", "forward", "add", name, "80", "10.0.0.1", "80"])
            .assert()
            .success();
    }

    let log = fs::read_to_string(dir.path().join("logs").join("netmgr.log")).unwrap();
    assert!(log.contains("[DRY-RUN] Would execute: iptables"));
    assert!(log.contains("NETMGR:web"));
    assert!(log.contains("NETMGR:ssh"));
    assert!(!log.contains("\u{1b}["));
}

#[test]
fn test_dry_run_add_on_macos_uses_pf_anchor() {
    let dir = TempDir::new().unwrap();

    netmgr(&dir)
        .args(["-n", "--platform", "macos"])
        .args(["forward", "add", "dns", "53", "10.0.0.1", "53", "udp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pfctl -a com.netmgr/dns -f"));

    assert_eq!(state(&dir), "{}");
}

#[test]
fn test_dry_run_remove_keeps_record() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("forwarding.json"), SEEDED).unwrap();

    netmgr(&dir)
        .args(["-n", "--platform", "windows", "forward", "del", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "netsh interface portproxy delete v4tov4 listenport=80",
        ));

    assert_eq!(state(&dir), SEEDED);
}

#[test]
fn test_duplicate_add_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("forwarding.json"), SEEDED).unwrap();

    netmgr(&dir)
        .args(["-n", "--platform", "linux"])
        .args(["forward", "add", "web", "443", "192.168.1.101", "8443"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(state(&dir), SEEDED);
}

#[test]
fn test_ipv6_destination_rejected_on_linux() {
    let dir = TempDir::new().unwrap();

    netmgr(&dir)
        .args(["-n", "--platform", "linux", "forward", "add", "v6", "80", "fe80::1", "80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IPv4"));

    netmgr(&dir)
        .args(["-n", "--platform", "macos", "forward", "add", "v6", "80", "fe80::1", "80"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> fe80::1 port 80"));
}

#[test]
fn test_remove_unknown_forward_fails() {
    let dir = TempDir::new().unwrap();

    netmgr(&dir)
        .args(["-n", "forward", "remove", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_invalid_protocol_is_rejected() {
    let dir = TempDir::new().unwrap();

    netmgr(&dir)
        .args(["-n", "forward", "add", "web", "80", "192.168.1.100", "8080", "icmp"])
        .assert()
        .failure();

    assert!(!dir.path().join("forwarding.json").exists());
}

#[test]
fn test_unknown_subcommand_changes_nothing() {
    let dir = TempDir::new().unwrap();

    netmgr(&dir)
        .args(["forward", "frobnicate"])
        .assert()
        .failure();

    assert!(!dir.path().join("forwarding.json").exists());
}

#[test]
fn test_corrupt_state_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("forwarding.json"), "{ not json").unwrap();

    netmgr(&dir)
        .args(["forward", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("forwarding.json"));
}

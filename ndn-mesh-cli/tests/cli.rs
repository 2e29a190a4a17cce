use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn ndnmesh() -> Command {
    Command::cargo_bin("ndnmesh").unwrap()
}

#[test]
fn probe_name_layout() {
    ndnmesh()
        .args(["probe-name", "192.168.49.1", "192.168.49.20"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "/localhop/wifidirect/192.168.49.1/192.168.49.20/probe",
        ))
        .stdout(predicate::str::contains("Listener: /localhop/wifidirect/192.168.49.1"));
}

#[test]
fn decode_parameters_from_hex() {
    ndnmesh()
        .args(["decode", "parameters", "--hex", "68046902012c"])
        .assert()
        .success()
        .stdout(predicate::str::contains("FaceId: 300"));
}

#[test]
fn decode_parameters_as_json() {
    ndnmesh()
        .args(["decode", "parameters", "--hex", "68 04 69 02 01 2c", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"face_id\": 300"));
}

#[test]
fn decode_rejects_bad_hex() {
    ndnmesh()
        .args(["decode", "parameters", "--hex", "6804zz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid hex payload"));
}

#[test]
fn decode_rejects_truncated_tlv() {
    ndnmesh()
        .args(["decode", "parameters", "--hex", "680469"])
        .assert()
        .failure();
}

#[test]
fn config_reads_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "probe_period_ms = 250").unwrap();

    ndnmesh()
        .args(["config", "--file"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"probe_period_ms\": 250"))
        .stdout(predicate::str::contains("\"max_probe_timeouts\": 60"));
}

#[test]
fn config_rejects_zero_threshold() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "max_probe_timeouts = 0").unwrap();

    ndnmesh()
        .args(["config", "--file"])
        .arg(file.path())
        .assert()
        .failure();
}

#[test]
fn command_create_face_name() {
    ndnmesh()
        .args(["command", "create-face", "udp://1.2.3.4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/localhost/nfd/faces/create/"))
        .stdout(predicate::str::contains("Uri: udp://1.2.3.4"));
}

#[test]
fn command_destroy_face_parameters() {
    ndnmesh()
        .args(["command", "destroy-face", "300"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Parameters: 68046902012c"));
}

#[test]
fn simulate_needs_two_nodes() {
    ndnmesh()
        .args(["simulate", "--nodes", "1", "--seconds", "1"])
        .assert()
        .failure();
}

#[test]
fn simulate_short_run() {
    ndnmesh()
        .args(["simulate", "--nodes", "2", "--seconds", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("192.168.49.1 /mesh/node0 (group owner)"))
        .stdout(predicate::str::contains("192.168.49.11 /mesh/node1"));
}

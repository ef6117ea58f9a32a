//! CLI tests for the protorun binary.
//!
//! Stages small suites in temp directories, runs the binary, and verifies
//! exit codes, the printed summary, and the artifacts left under the
//! destination tree.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use protorun::exit_codes;

fn write_script(dir: &Path, body: &str) {
    fs::create_dir_all(dir).expect("protocol dir");
    let script = dir.join("protocol.sh");
    fs::write(&script, body).expect("write script");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

fn base_tree(temp: &Path) -> PathBuf {
    let base = temp.join("base");
    fs::create_dir_all(base.join("inputs")).expect("inputs");
    fs::create_dir_all(base.join("protocols")).expect("protocols");
    base
}

fn run_protorun(base: &Path, destination: &Path, extra_args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_protorun"))
        .arg(destination)
        .arg("--base")
        .arg(base)
        .args(extra_args)
        .output()
        .expect("run protorun")
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn classifies_the_four_fixture_outcomes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(
        &base.join("protocols/ok"),
        "#!/bin/sh\necho 0 > \"$AA_SUCCESS_CODE\"\n",
    );
    write_script(
        &base.join("protocols/mismatched"),
        "#!/bin/sh\necho 1 > \"$AA_SUCCESS_CODE\"\n",
    );
    write_script(&base.join("protocols/erroring"), "#!/bin/sh\nset -e\nfalse\n");
    write_script(&base.join("protocols/silent"), "#!/bin/sh\nexit 0\n");

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &[]);

    assert_eq!(output.status.code(), Some(exit_codes::PROTOCOL));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("ok [SUCCESS]"));
    assert!(stdout.contains("mismatched [MISMATCH]"));
    assert!(stdout.contains("erroring [ERROR]"));
    assert!(stdout.contains("silent [UNREPORTED]"));
    assert!(stdout.contains("success=1 mismatch=1 execution_error=1 reporting_error=1"));

    assert!(destination.join("report.json").exists());
    assert!(destination.join("protocols/ok/LOGS/stdout.log").exists());
    assert!(destination.join("protocols/ok/LOGS/EXIT_CODE").exists());
}

#[test]
fn mismatches_alone_use_the_mismatch_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(
        &base.join("protocols/ok"),
        "#!/bin/sh\necho 0 > \"$AA_SUCCESS_CODE\"\n",
    );
    write_script(
        &base.join("protocols/mismatched"),
        "#!/bin/sh\necho 3 > \"$AA_SUCCESS_CODE\"\n",
    );

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::MISMATCH));
}

#[test]
fn finds_protocols_at_any_depth() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(
        &base.join("protocols/lipids/bilayers/dppc"),
        "#!/bin/sh\necho 0 > \"$AA_SUCCESS_CODE\"\n",
    );

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout_of(&output).contains("lipids/bilayers/dppc [SUCCESS]"));
}

#[test]
fn zero_selection_exits_ok_and_says_so() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(
        &base.join("protocols/unit"),
        "#!/bin/sh\necho 1 > \"$AA_SUCCESS_CODE\"\n",
    );

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &["--only", "does-not-exist"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("no protocols selected"));
    assert!(stdout.contains("total=0"));
}

#[test]
fn filter_selects_a_subset() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(
        &base.join("protocols/dppc-small"),
        "#!/bin/sh\necho 0 > \"$AA_SUCCESS_CODE\"\n",
    );
    write_script(&base.join("protocols/ubq"), "#!/bin/sh\nexit 9\n");

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &["--filter", "^dppc-"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("dppc-small [SUCCESS]"));
    assert!(!stdout.contains("ubq"));
}

#[test]
fn protocol_overlay_replaces_base_version() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(
        &base.join("protocols/unit"),
        "#!/bin/sh\necho 1 > \"$AA_SUCCESS_CODE\"\n",
    );
    let overlay = temp.path().join("fixes");
    write_script(
        &overlay.join("unit"),
        "#!/bin/sh\necho 0 > \"$AA_SUCCESS_CODE\"\n",
    );

    let destination = temp.path().join("dest");
    let output = run_protorun(
        &base,
        &destination,
        &["-p", overlay.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
}

#[test]
fn injected_environment_reaches_the_script() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    fs::write(temp.path().join("base/inputs/seed.txt"), "seed").expect("seed input");
    write_script(
        &base.join("protocols/envcheck"),
        concat!(
            "#!/bin/sh\n",
            "set -e\n",
            "test -f \"$AA_INPUTS/seed.txt\"\n",
            "test -d \"$AA_LOG_DIR\"\n",
            "echo \"$AA_INPUTS\" > \"$AA_LOG_DIR/inputs_path\"\n",
            "echo 0 > \"$AA_SUCCESS_CODE\"\n",
        ),
    );

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let recorded =
        fs::read_to_string(destination.join("protocols/envcheck/LOGS/inputs_path")).expect("path");
    let canonical_dest = destination.canonicalize().expect("canonical dest");
    assert_eq!(
        recorded.trim(),
        canonical_dest.join("inputs").display().to_string()
    );
}

#[test]
fn config_file_tools_are_passed_through() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(
        &base.join("protocols/toolcheck"),
        concat!(
            "#!/bin/sh\n",
            "set -e\n",
            "test \"$AA_SIM\" = \"/opt/sim/bin/sim\"\n",
            "echo 0 > \"$AA_SUCCESS_CODE\"\n",
        ),
    );
    let config_path = temp.path().join("run.toml");
    fs::write(&config_path, "[tools]\nAA_SIM = \"/opt/sim/bin/sim\"\n").expect("config");

    let destination = temp.path().join("dest");
    let output = run_protorun(
        &base,
        &destination,
        &["--config", config_path.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
}

#[test]
fn global_timeout_cancels_and_still_prints_the_summary() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    write_script(&base.join("protocols/a-slow"), "#!/bin/sh\nsleep 30\n");
    write_script(&base.join("protocols/b-slow"), "#!/bin/sh\nsleep 30\n");

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &["--timeout-secs", "1"]);

    assert_eq!(output.status.code(), Some(exit_codes::PROTOCOL));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("a-slow [ERROR]"));
    assert!(stdout.contains("b-slow [NOT RUN]"));
    assert!(stdout.contains("1 of 2 selected protocols ran, 1 did not run"));
}

#[test]
fn non_empty_destination_is_a_setup_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = base_tree(temp.path());
    let destination = temp.path().join("dest");
    fs::create_dir_all(&destination).expect("dest");
    fs::write(destination.join("leftover.txt"), "x").expect("leftover");

    let output = run_protorun(&base, &destination, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::SETUP));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already exists"));
}

#[test]
fn missing_required_path_is_a_setup_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let base = temp.path().join("base");
    fs::create_dir_all(base.join("inputs")).expect("inputs");
    // No protocols/ directory in the base tree.

    let destination = temp.path().join("dest");
    let output = run_protorun(&base, &destination, &[]);
    assert_eq!(output.status.code(), Some(exit_codes::SETUP));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sanity check failed"));
}

// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 MoleQueue Developers

//! CLI argument specs for the `molequeue` binary.

use assert_cmd::Command;

#[test]
fn version_flag_prints_and_exits_zero() {
    let mut cmd = Command::cargo_bin("molequeue").expect("binary");
    let assert = cmd.arg("-v").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(output.starts_with("molequeue "));
}

#[test]
fn long_version_flag_works_too() {
    let mut cmd = Command::cargo_bin("molequeue").expect("binary");
    cmd.arg("--version").assert().success();
}

#[test]
fn help_exits_zero_and_lists_flags() {
    let mut cmd = Command::cargo_bin("molequeue").expect("binary");
    let assert = cmd.arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(output.contains("--workdir"));
    assert!(output.contains("--socketname"));
    assert!(output.contains("--rpc-kill"));
}

#[test]
fn unknown_flag_exits_two() {
    let mut cmd = Command::cargo_bin("molequeue").expect("binary");
    cmd.arg("--frobnicate").assert().failure().code(2);
}

//! Drives the built binary against small shell scripts.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::tempdir;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn bench(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_elide-bench"))
        .args(args)
        .env_remove("TRIALS")
        .env_remove("NGSPICE_BIN")
        .env_remove("PERF_EVENTS")
        .env("RUST_LOG", "elide_bench=warn")
        .output()
        .unwrap()
}

#[test]
fn test_compare_writes_reports() {
    let dir = tempdir().unwrap();
    let full = script(dir.path(), "full.sh", "exit 0");
    let elided = script(dir.path(), "elided.sh", "exit 0");
    let csv = dir.path().join("raw.csv");
    let md = dir.path().join("report.md");
    let json = dir.path().join("report.json");

    let out = bench(&[
        "compare",
        "--variant",
        &format!("bsim4={}", full.display()),
        "--variant",
        &format!("bsim4_elided={}", elided.display()),
        "--trials",
        "2",
        "--seed",
        "11",
        "--csv",
        csv.to_str().unwrap(),
        "--markdown",
        md.to_str().unwrap(),
        "--out",
        json.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("Running 2 trials per script (4 total) in random order..."));
    assert!(stdout.contains("Summary:\n- bsim4        n=2 mean="));

    assert_eq!(fs::read_to_string(&csv).unwrap().lines().count(), 5);
    assert!(fs::read_to_string(&md).unwrap().contains("| bsim4_elided | - | 2 |"));
    let report: serde_json::Value = serde_json::from_slice(&fs::read(&json).unwrap()).unwrap();
    assert_eq!(report["run"]["seed"], 11);
    assert_eq!(report["run"]["mode"], "compare");
}

#[test]
fn test_zero_trials_exits_one() {
    let dir = tempdir().unwrap();
    let full = script(dir.path(), "full.sh", "touch ran");
    let out = Command::new(env!("CARGO_BIN_EXE_elide-bench"))
        .args(["compare", "--variant"])
        .arg(format!("bsim4={}", full.display()))
        .env("TRIALS", "0")
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(!dir.path().join("ran").exists());
}

#[test]
fn test_failing_trial_replays_output_and_exits_one() {
    let dir = tempdir().unwrap();
    let bad = script(dir.path(), "bad.sh", "echo 'no such model'; echo 'fatal' >&2; exit 7");
    let md = dir.path().join("report.md");
    let out = bench(&[
        "compare",
        "--variant",
        &format!("broken={}", bad.display()),
        "--trials",
        "3",
        "--markdown",
        md.to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no such model"));
    assert!(stderr.contains("fatal"));
    assert!(!md.exists());
}

#[test]
fn test_unknown_flag_exits_one() {
    let out = bench(&["compare", "--no-such-flag"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_fatal_error_reported_with_logging_off() {
    let dir = tempdir().unwrap();
    let full = script(dir.path(), "full.sh", "exit 0");
    let out = Command::new(env!("CARGO_BIN_EXE_elide-bench"))
        .args(["compare", "--variant"])
        .arg(format!("a={}", full.display()))
        .env("TRIALS", "0")
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("elide-bench: "), "{stderr}");
    assert!(stderr.contains("TRIALS must be >= 1"), "{stderr}");
}

fn write_suite(dir: &Path, variant: &Path) -> PathBuf {
    let suite = dir.join("suite.toml");
    fs::write(
        &suite,
        format!(
            "trials = 3\nworkdir = \"{}\"\n\n[env]\nGREETING = \"hello\"\n\n\
             [[variant]]\nname = \"sim1\"\ncommand = \"{}\"\n",
            dir.display(),
            variant.display()
        ),
    )
    .unwrap();
    suite
}

#[test]
fn test_suite_trials_env_and_simulator_reach_trials() {
    let dir = tempdir().unwrap();
    let sim1 = script(dir.path(), "sim1.sh", "echo \"$GREETING $NGSPICE_BIN\" >> seen.txt");
    let suite = write_suite(dir.path(), &sim1);

    let out = Command::new(env!("CARGO_BIN_EXE_elide-bench"))
        .args(["compare", "--suite", suite.to_str().unwrap(), "--seed", "3"])
        .env_remove("TRIALS")
        .env_remove("PERF_EVENTS")
        .env("NGSPICE_BIN", "/opt/ngspice/bin/ngspice")
        .env("RUST_LOG", "elide_bench=warn")
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("Running 3 trials per script (3 total)"), "{stdout}");

    // Relative to the suite's workdir, not the test's.
    let seen = fs::read_to_string(dir.path().join("seen.txt")).unwrap();
    let lines: Vec<&str> = seen.lines().collect();
    assert_eq!(lines, vec!["hello /opt/ngspice/bin/ngspice"; 3]);
}

#[test]
fn test_trials_flag_overrides_suite() {
    let dir = tempdir().unwrap();
    let sim1 = script(dir.path(), "sim1.sh", "echo ran >> seen.txt");
    let suite = write_suite(dir.path(), &sim1);

    let out = bench(&["compare", "--suite", suite.to_str().unwrap(), "--trials", "1"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("Running 1 trials per script (1 total)"), "{stdout}");
    assert_eq!(fs::read_to_string(dir.path().join("seen.txt")).unwrap(), "ran\n");
}

#[test]
fn test_bins_sweep_runs_each_bin_through_the_link() {
    let dir = tempdir().unwrap();
    let bin_dir = dir.path().join("bins");
    fs::create_dir(&bin_dir).unwrap();
    fs::write(bin_dir.join("bsim4_bin_001.osdi"), "A\n").unwrap();
    fs::write(bin_dir.join("bsim4_bin_002.osdi"), "B\n").unwrap();
    let link = dir.path().join("BSIM4/bsim4.elided.osdi");
    let seen = dir.path().join("elided_seen.txt");

    let base = script(dir.path(), "base.sh", "exit 0");
    let elided = script(
        dir.path(),
        "elided.sh",
        &format!("cat {} >> {}", link.display(), seen.display()),
    );
    let unelided_csv = dir.path().join("unelided.csv");
    let elided_csv = dir.path().join("elided.csv");

    let out = bench(&[
        "bins",
        "--variant",
        &format!("base={}", base.display()),
        "--elided",
        &format!("el={}", elided.display()),
        "--bin-dir",
        bin_dir.to_str().unwrap(),
        "--link",
        link.to_str().unwrap(),
        "--expected",
        "2",
        "--baseline-trials",
        "2",
        "--unelided-csv",
        unelided_csv.to_str().unwrap(),
        "--elided-csv",
        elided_csv.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    assert_eq!(fs::read_to_string(&seen).unwrap(), "A\nB\n");
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("[baseline 02/2] done\n"), "{stdout}");
    assert!(stdout.contains("[elided 002/2] bin=002 done\n"), "{stdout}");

    assert!(fs::read_to_string(&elided_csv)
        .unwrap()
        .starts_with("bin,el_s\n001,"));
    assert_eq!(fs::read_to_string(&unelided_csv).unwrap().lines().count(), 3);
}

#[test]
fn test_bins_expected_count_mismatch_exits_one() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("bsim4_bin_001.osdi"), "A\n").unwrap();
    let base = script(dir.path(), "base.sh", "exit 0");
    let out = bench(&[
        "bins",
        "--variant",
        &format!("base={}", base.display()),
        "--bin-dir",
        dir.path().to_str().unwrap(),
        "--link",
        dir.path().join("link.osdi").to_str().unwrap(),
        "--expected",
        "108",
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("expected 108 bin files"));
}

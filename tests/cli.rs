use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn vg() -> Command {
    let mut cmd = Command::cargo_bin("vg").expect("binary exists");
    cmd.env_remove("VG_LIBRARIES_PATH").env_remove("RUST_LOG");
    cmd
}

#[test]
fn vg_run_hello_demo() {
    vg().arg("run")
        .arg("demos/hello.vg")
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello from VG!"))
        .stdout(predicate::str::contains("fib(10) = 55"))
        .stdout(predicate::str::contains("total: 55"))
        .stdout(predicate::str::contains("done"));
}

#[test]
fn vg_run_shapes_demo() {
    vg().arg("run")
        .arg("demos/shapes.vg")
        .assert()
        .success()
        .stdout(predicate::str::contains("rect with area 12"))
        .stdout(predicate::str::contains("shapes built through Shape(): 1"))
        .stdout(predicate::str::contains("Point{x=2, y=0} 10"));
}

#[test]
fn vg_run_with_library_directory() {
    vg().arg("--libraries")
        .arg("demos/libs")
        .arg("run")
        .arg("demos/greet.vg")
        .assert()
        .success()
        .stdout("hello!\nababab\n!\n");
}

#[test]
fn vg_libraries_from_environment() {
    let dir = tempdir().expect("create temp dir");
    fs::write(
        dir.path().join("units.vglib"),
        "library Units { namespace Length { const METER = 100; } }",
    )
    .expect("write library");
    vg().env("VG_LIBRARIES_PATH", dir.path())
        .arg("eval")
        .arg("Units.Length.METER * 2")
        .assert()
        .success()
        .stdout("200\n");
}

#[test]
fn vg_eval_prints_value() {
    vg().arg("eval").arg("1 + 2").assert().success().stdout("3\n");
}

#[test]
fn vg_eval_null_prints_nothing() {
    vg().arg("eval").arg("var x = 1;").assert().success().stdout("");
}

#[test]
fn vg_reports_errors_with_location() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("bad.vg");
    fs::write(&script, "var a = 1;\nprint(missing);\n").expect("write script");

    vg().arg("run")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("VG Error: NameError at line 2"))
        .stderr(predicate::str::contains("bad.vg"))
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn vg_names_the_imported_file_that_failed() {
    let dir = tempdir().expect("create temp dir");
    fs::write(dir.path().join("helper.vg"), "var ok = 1;\nvar bad = 1 / 0;\n")
        .expect("write helper");
    let script = dir.path().join("main.vg");
    fs::write(&script, "import \"helper.vg\";\n").expect("write script");

    vg().arg("run")
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("ArithmeticError at line 2"))
        .stderr(predicate::str::contains("helper.vg'"))
        .stderr(predicate::str::contains("main.vg'").not());
}

#[test]
fn vg_reports_syntax_errors() {
    vg().arg("eval")
        .arg("var = ;")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SyntaxError"));
}

#[test]
fn vg_missing_script_fails() {
    vg().arg("run")
        .arg("demos/does-not-exist.vg")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.vg"));
}

#[test]
fn vg_max_steps_interrupts_runaway_loops() {
    vg().arg("--max-steps")
        .arg("1000")
        .arg("eval")
        .arg("while (true) { }")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Interrupted"));
}

#[test]
fn vg_repl_reads_stdin_until_eof() {
    vg().arg("repl")
        .write_stdin("var x = 20;\nx + 22\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

//! Command-line surface tests

use assert_cmd::Command;
use predicates::prelude::*;

fn zeal() -> Command {
    Command::cargo_bin("zeal").expect("binary built")
}

fn write_program(dir: &tempfile::TempDir, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, source).unwrap();
    path
}

#[test]
fn test_runs_a_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "main.ze", "println(2 + 2)");

    zeal()
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("4"));
}

#[test]
fn test_exit_code_from_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "main.ze", "exit(3)");

    zeal().arg(&path).assert().code(3);
}

#[test]
fn test_compile_error_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "main.ze", "let a");

    zeal()
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("compile error"));
}

#[test]
fn test_lex_stage_prints_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "main.ze", "mut a = 2");

    zeal()
        .arg("-l")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Mut"));
}

#[test]
fn test_dump_stage_prints_disassembly() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "main.ze", "mut a = 2\nprintln(a)");

    zeal()
        .arg("-d")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("GDEF"))
        .stdout(predicate::str::contains("HLT"));
}

#[test]
fn test_stage_flags_are_mutually_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "main.ze", "mut a = 2");

    zeal().arg("-l").arg("-p").arg(&path).assert().failure();
}

#[test]
fn test_search_paths_flag() {
    let dir = tempfile::tempdir().unwrap();
    let libs = tempfile::tempdir().unwrap();
    write_program(&libs, "dep.ze", "export x\nlet x = 9");
    let path = write_program(&dir, "main.ze", "import dep\nprintln(dep.x)");

    zeal()
        .arg(&path)
        .arg("--search-paths")
        .arg(libs.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("9"));
}

#[test]
fn test_search_paths_rejects_trailing_separator() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(&dir, "main.ze", "println(1)");
    let separator = if cfg!(windows) { ";" } else { ":" };

    zeal()
        .arg(&path)
        .arg("--search-paths")
        .arg(format!("somewhere{}", separator))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("search paths"));
}

#[test]
fn test_runtime_error_prints_stack_trace() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(
        &dir,
        "main.ze",
        "proc f() {\n  ret 1 / 0\n}\nprintln(f())",
    );

    zeal()
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("division by zero"))
        .stderr(predicate::str::contains("f"));
}

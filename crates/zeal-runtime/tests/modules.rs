//! Module resolution and initialization behavior

use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use zeal_runtime::{buffer_writer, Zeal, ZealError};

fn write(dir: &tempfile::TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, source).unwrap();
    path
}

fn run_in(dir: &tempfile::TempDir, entry: &str) -> String {
    let (writer, buffer) = buffer_writer();
    let zeal = Zeal::new().with_output(writer);
    zeal.run_file(&dir.path().join(entry)).unwrap();
    buffer.contents()
}

#[test]
fn test_module_entry_runs_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "counter.ze", "println(\"init\")\nexport value\nlet value = 10");
    write(&dir, "a.ze", "import counter\nexport via_a\nlet via_a = counter.value");
    write(
        &dir,
        "main.ze",
        "import a\nimport counter\nprintln(a.via_a)\nprintln(counter.value)",
    );

    // The counter module's side effect appears once despite two importers
    assert_eq!(run_in(&dir, "main.ze"), "init\n10\n10\n");
}

#[test]
fn test_import_alias_sees_the_same_module() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "shared.ze", "export value\nlet value = 5");
    write(
        &dir,
        "main.ze",
        "import shared\nimport shared as other\nprintln(shared.value == other.value)",
    );

    assert_eq!(run_in(&dir, "main.ze"), "true\n");
}

#[test]
fn test_dotted_import_resolves_nested_path() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "lib/util.ze", "export double\nproc double(x) { ret x * 2 }");
    write(&dir, "main.ze", "import lib.util as util\nprintln(util.double(21))");

    assert_eq!(run_in(&dir, "main.ze"), "42\n");
}

#[test]
fn test_additional_search_paths_are_probed_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let libs = tempfile::tempdir().unwrap();
    write(&libs, "helper.ze", "export tag\nlet tag = \"from-libs\"");
    write(&dir, "main.ze", "import helper\nprintln(helper.tag)");

    let (writer, buffer) = buffer_writer();
    let zeal = Zeal::new()
        .with_search_paths(vec![libs.path().to_path_buf()])
        .with_output(writer);
    zeal.run_file(&dir.path().join("main.ze")).unwrap();
    assert_eq!(buffer.contents(), "from-libs\n");
}

#[test]
fn test_sibling_imports_resolve_through_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "pkg/a.ze", "import b\nexport total\nlet total = b.base + 1");
    write(&dir, "pkg/b.ze", "export base\nlet base = 1");
    write(&dir, "main.ze", "import pkg.a as a\nprintln(a.total)");

    assert_eq!(run_in(&dir, "main.ze"), "2\n");
}

#[test]
fn test_missing_module_is_a_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "main.ze", "import missing_module");

    let zeal = Zeal::new();
    let err = zeal.run_file(&dir.path().join("main.ze")).unwrap_err();
    match err {
        ZealError::Compile(err) => assert!(err.to_string().contains("not found")),
        other => panic!("expected compile error, got {}", other),
    }
}

#[test]
fn test_private_global_is_not_visible_through_access() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "secret.ze", "let hidden = 1\nexport open\nlet open = 2");
    write(
        &dir,
        "main.ze",
        "import secret\ntry {\n  println(secret.hidden)\n} catch e {\n  println(e.msg)\n}",
    );

    let out = run_in(&dir, "main.ze");
    assert!(out.contains("private"), "got: {}", out);
}

#[test]
fn test_native_module_import_by_name() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "main.ze", "import os\nprintln(os.name == os.name)");

    assert_eq!(run_in(&dir, "main.ze"), "true\n");
}

#[test]
fn test_module_value_cannot_be_reassigned() {
    let dir = tempfile::tempdir().unwrap();
    write(&dir, "dep.ze", "let x = 1");
    write(&dir, "main.ze", "import dep\ndep = 2");

    let zeal = Zeal::new();
    let err = zeal.run_file(&dir.path().join("main.ze")).unwrap_err();
    match err {
        ZealError::Compile(err) => {
            assert!(err.to_string().contains("cannot be re-assigned"))
        }
        other => panic!("expected compile error, got {}", other),
    }
}

//! End-to-end scenarios driven through the public pipeline
//!
//! Each test compiles and runs a complete program with captured output and
//! asserts the exact stdout.

use pretty_assertions::assert_eq;
use std::path::Path;
use zeal_runtime::{buffer_writer, Zeal, ZealError};

/// Run a program, returning (exit code, stdout)
fn run(source: &str) -> (u8, String) {
    let (writer, buffer) = buffer_writer();
    let zeal = Zeal::new().with_output(writer);
    let code = zeal
        .run_source(Path::new("main.ze"), source)
        .unwrap_or_else(|err| panic!("program failed: {}\nsource:\n{}", err, source));
    (code, buffer.contents())
}

/// Run a program expected to fail at runtime, returning the error text
fn run_err(source: &str) -> String {
    let zeal = Zeal::new();
    match zeal.run_source(Path::new("main.ze"), source) {
        Err(ZealError::Runtime(err)) => err.to_string(),
        Err(other) => panic!("expected runtime error, got: {}", other),
        Ok(code) => panic!("expected runtime error, got exit code {}", code),
    }
}

#[test]
fn test_arithmetic_and_globals() {
    let (code, out) = run("mut a = 2\na = a + 3 * 4\nprintln(a)");
    assert_eq!(code, 0);
    assert_eq!(out, "14\n");
}

#[test]
fn test_closure_captures_one_local() {
    let (_, out) = run(
        "proc make_adder(x) {\n  ret anon(y) { ret x + y }\n}\nlet add3 = make_adder(3)\nprintln(add3(4))\nprintln(add3(10))",
    );
    assert_eq!(out, "7\n13\n");
}

#[test]
fn test_try_catch_with_record_throw() {
    let (_, out) = run(
        "try {\n  throw { msg: \"boom\" }\n} catch {\n  println(\"caught\")\n}",
    );
    assert_eq!(out, "caught\n");
}

#[test]
fn test_for_loop_and_list() {
    let (_, out) = run("let xs = list()\nfor i upto 3 {\n  xs ++ i\n}\nprintln(xs)");
    assert_eq!(out, "(0, 1, 2)\n");
}

#[test]
fn test_import_and_visibility() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("a.ze"),
        "let hidden = 1\nexport shared\nlet shared = 42",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("main.ze"),
        "import a\nprintln(a.shared)\ntry { println(a.hidden) } catch { println(\"private\") }",
    )
    .unwrap();

    let (writer, buffer) = buffer_writer();
    let zeal = Zeal::new().with_output(writer);
    let code = zeal.run_file(&dir.path().join("main.ze")).unwrap();
    assert_eq!(code, 0);
    assert_eq!(buffer.contents(), "42\nprivate\n");
}

#[test]
fn test_string_interning_identity() {
    let (_, out) = run("let x = \"hello\"\nlet y = \"hel\" ++ \"lo\"\nprintln(x == y)");
    assert_eq!(out, "true\n");
}

#[test]
fn test_while_loop_with_stop_and_continue() {
    let (_, out) = run(
        "mut i = 0\nmut total = 0\nwhile true {\n  i = i + 1\n  if i > 10 { stop }\n  if i % 2 == 0 { continue }\n  total = total + i\n}\nprintln(total)",
    );
    // 1 + 3 + 5 + 7 + 9
    assert_eq!(out, "25\n");
}

#[test]
fn test_for_downto() {
    // `downto` stops once the induction variable passes below the bound
    let (_, out) = run("let xs = list()\nfor i = 3 downto 1 {\n  xs ++ i\n}\nprintln(xs)");
    assert_eq!(out, "(3, 2, 1)\n");
}

#[test]
fn test_compound_assignment() {
    let (_, out) = run("mut a = 10\na += 5\na -= 3\na *= 2\na /= 4\nprintln(a)");
    assert_eq!(out, "6\n");
}

#[test]
fn test_template_string() {
    let (_, out) = run("let name = \"zeal\"\nlet n = 3\nprintln(`lang {name} v{n}!`)");
    assert_eq!(out, "lang zeal v3!\n");
}

#[test]
fn test_is_type_tests() {
    let (_, out) = run(
        "println(1 is int)\nprintln(1.5 is float)\nprintln(\"s\" is str)\nprintln(empty is empty)\nprintln(list() is list)\nprintln(1 is str)",
    );
    assert_eq!(out, "true\ntrue\ntrue\ntrue\ntrue\nfalse\n");
}

#[test]
fn test_record_access_and_update() {
    let (_, out) = run(
        "let r = { count: 1, label: \"x\" }\nr.count = r.count + 1\nprintln(r.count)\nprintln(r.label)",
    );
    assert_eq!(out, "2\nx\n");
}

#[test]
fn test_record_unknown_attribute_fails() {
    let err = run_err("let r = { a: 1 }\nr.b = 2");
    assert!(err.contains("does not have attribute"), "got: {}", err);
}

#[test]
fn test_array_literal_and_indexing() {
    let (_, out) = run("let xs = [10, 20, 30]\nxs[1] = 21\nprintln(xs[0] + xs[1])\nprintln(xs)");
    assert_eq!(out, "31\n[10, 21, 30]\n");
}

#[test]
fn test_array_new_is_filled_with_empty() {
    let (_, out) = run("let xs = array(2)\nprintln(xs)");
    assert_eq!(out, "[empty, empty]\n");
}

#[test]
fn test_dict_literal_and_lookup() {
    let (_, out) = run(
        "let d = dict(\"k\": 10)\nd[\"other\"] = 20\nprintln(d[\"k\"] + d[\"other\"])\nprintln(d[\"missing\"])",
    );
    assert_eq!(out, "30\nempty\n");
}

#[test]
fn test_string_methods() {
    let (_, out) = run(
        "let s = \"Hello\"\nprintln(s.len())\nprintln(s.upper())\nprintln(s.sub_str(1, 3))",
    );
    assert_eq!(out, "5\nHELLO\nell\n");
}

#[test]
fn test_list_methods() {
    let (_, out) = run(
        "let xs = list(1, 2, 3)\nxs.insert(4)\nprintln(xs.len())\nprintln(xs.remove_at(0))\nprintln(xs.join(\"-\"))",
    );
    assert_eq!(out, "4\n1\n2-3-4\n");
}

#[test]
fn test_short_circuit_keeps_left_operand() {
    let (_, out) = run(
        "proc boom() {\n  throw { msg: \"called\" }\n}\nprintln(true or boom())\nprintln(false and boom())",
    );
    assert_eq!(out, "true\nfalse\n");
}

#[test]
fn test_string_replication() {
    let (_, out) = run("println(\"ab\" * 3)\nmut n = 2\nprintln(n * \"x\")");
    assert_eq!(out, "ababab\nxx\n");
}

#[test]
fn test_math_native_module() {
    let (_, out) = run("import math\nprintln(math.sqrt(9.0))\nprintln(math.abs(0 - 4))");
    assert_eq!(out, "3.000000\n4\n");
}

#[test]
fn test_exit_code_propagates() {
    let zeal = Zeal::new();
    let code = zeal
        .run_source(Path::new("main.ze"), "exit(7)\nprintln(\"unreachable\")")
        .unwrap();
    assert_eq!(code, 7);
}

#[test]
fn test_division_by_zero_is_runtime_error() {
    let err = run_err("println(1 / 0)");
    assert!(err.contains("division by zero"), "got: {}", err);
}

#[test]
fn test_unhandled_throw_reports_message() {
    let err = run_err("proc f() {\n  throw { msg: \"kaboom\" }\n}\nf()");
    assert!(err.contains("kaboom"), "got: {}", err);
}

#[test]
fn test_catch_binding_receives_thrown_value() {
    let (_, out) = run(
        "proc f() {\n  try {\n    throw { msg: \"oops\" }\n  } catch e {\n    println(e.msg)\n  }\n}\nf()",
    );
    assert_eq!(out, "oops\n");
}

#[test]
fn test_runtime_error_inside_try_is_caught_with_msg_record() {
    let (_, out) = run(
        "proc f() {\n  try {\n    println(1 / 0)\n  } catch e {\n    println(e.msg)\n  }\n}\nf()",
    );
    assert_eq!(out, "division by zero is undefined\n");
}

#[test]
fn test_recursion() {
    let (_, out) = run(
        "proc fib(n) {\n  if n < 2 { ret n }\n  ret fib(n - 1) + fib(n - 2)\n}\nprintln(fib(12))",
    );
    assert_eq!(out, "144\n");
}

#[test]
fn test_cyclic_list_stringifies_with_elision() {
    let (_, out) = run("let xs = list(1)\nxs.insert(xs)\nprintln(xs)");
    assert_eq!(out, "(1, ...)\n");
}

#[test]
fn test_to_json_of_record() {
    let (_, out) = run("println(to_json({ a: 1 }))");
    assert_eq!(out, "{\"a\":1}\n");
}

#[test]
fn test_to_json_of_cycle_fails() {
    let err = run_err("let xs = list(1)\nxs.insert(xs)\nprintln(to_json(xs))");
    assert!(err.contains("cyclic"), "got: {}", err);
}

#[test]
fn test_float_formatting() {
    let (_, out) = run("println(1.5)\nprintln(2.0 + 0.25)");
    assert_eq!(out, "1.500000\n2.250000\n");
}

#[test]
fn test_nested_string_quoting_in_containers() {
    let (_, out) = run("println([\"a\", 1])\nprintln(list(\"b\"))");
    assert_eq!(out, "['a', 1]\n('b')\n");
}

#[test]
fn test_anonymous_function_without_capture() {
    let (_, out) = run("let double = anon(x) { ret x * 2 }\nprintln(double(21))");
    assert_eq!(out, "42\n");
}

#[test]
fn test_closure_capture_writes_through_while_linked() {
    // The capture aliases the live local until the defining frame returns
    let (_, out) = run(
        "proc counter() {\n  mut n = 0\n  let bump = anon() { n = n + 1 }\n  bump()\n  bump()\n  ret n\n}\nprintln(counter())",
    );
    assert_eq!(out, "2\n");
}

#[test]
fn test_bitwise_operators() {
    let (_, out) = run("println(6 & 3)\nprintln(6 | 3)\nprintln(6 ^ 3)\nprintln(1 << 4)\nprintln(~0)");
    assert_eq!(out, "2\n7\n5\n16\n-1\n");
}

#[test]
fn test_gc_native_runs_without_disturbing_live_objects() {
    let (_, out) = run(
        "let xs = list(1, 2, 3)\nmut i = 0\nwhile i < 100 {\n  to_str(i)\n  i = i + 1\n}\ngc()\nprintln(xs)",
    );
    assert_eq!(out, "(1, 2, 3)\n");
}

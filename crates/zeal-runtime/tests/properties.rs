//! Property tests over the compiler and the VM
//!
//! Programs are generated, compiled, and executed through the public API;
//! the invariants checked here mirror the machine's structural guarantees:
//! stack emptiness after the entry frame returns, in-bounds jump targets,
//! GC accounting, intern identity, and template round-trips.

use proptest::prelude::*;
use std::path::Path;
use std::rc::Rc;
use zeal_runtime::heap::ObjBody;
use zeal_runtime::natives::default_native_fns;
use zeal_runtime::{
    buffer_writer, compile_module, CompilerCtx, Heap, Module, Opcode, SharedBuffer, Value, Vm,
};

fn compile(source: &str) -> Rc<Module> {
    let ctx = CompilerCtx::new(default_native_fns(), ".".into(), Vec::new());
    compile_module(&ctx, "main", Path::new("main.ze"), source)
        .unwrap_or_else(|err| panic!("compilation failed: {}\nsource:\n{}", err, source))
}

/// Execute and return the VM for post-run introspection
fn run_vm(source: &str) -> (Vm, u8, SharedBuffer) {
    let module = compile(source);
    let mut vm = Vm::new(Rc::new(default_native_fns()));
    let (writer, buffer) = buffer_writer();
    vm.set_output_writer(writer);
    let code = vm
        .execute(module)
        .unwrap_or_else(|err| panic!("execution failed: {}\nsource:\n{}", err, source));
    (vm, code, buffer)
}

// ===== Generated arithmetic expressions =====

#[derive(Debug, Clone)]
enum Arith {
    Lit(i8),
    Add(Box<Arith>, Box<Arith>),
    Sub(Box<Arith>, Box<Arith>),
    Mul(Box<Arith>, Box<Arith>),
}

impl Arith {
    fn render(&self) -> String {
        match self {
            Arith::Lit(v) => {
                if *v < 0 {
                    format!("(0 - {})", -(*v as i64))
                } else {
                    v.to_string()
                }
            }
            Arith::Add(a, b) => format!("({} + {})", a.render(), b.render()),
            Arith::Sub(a, b) => format!("({} - {})", a.render(), b.render()),
            Arith::Mul(a, b) => format!("({} * {})", a.render(), b.render()),
        }
    }

    fn eval(&self) -> i64 {
        match self {
            Arith::Lit(v) => *v as i64,
            Arith::Add(a, b) => a.eval().wrapping_add(b.eval()),
            Arith::Sub(a, b) => a.eval().wrapping_sub(b.eval()),
            Arith::Mul(a, b) => a.eval().wrapping_mul(b.eval()),
        }
    }
}

fn arith_strategy() -> impl Strategy<Value = Arith> {
    let leaf = any::<i8>().prop_map(Arith::Lit);
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Arith::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Arith::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Arith::Mul(Box::new(a), Box::new(b))),
        ]
    })
}

/// Walk a chunk stream, asserting every decoded jump lands on a valid
/// offset within the same function
fn assert_jumps_in_bounds(chunks: &[u8]) {
    let mut cursor = 0usize;
    while cursor < chunks.len() {
        let opcode = Opcode::from_byte(chunks[cursor]).expect("valid opcode stream");
        cursor += 1;

        let operand = match opcode {
            Opcode::CInt
            | Opcode::LSet
            | Opcode::LGet
            | Opcode::OSet
            | Opcode::OGet
            | Opcode::Call
            | Opcode::Is
            | Opcode::Throw => 1,
            Opcode::Int
            | Opcode::Float
            | Opcode::String
            | Opcode::Record
            | Opcode::IArray
            | Opcode::IRecord
            | Opcode::GDef
            | Opcode::GSet
            | Opcode::GGet
            | Opcode::NGet
            | Opcode::RSet
            | Opcode::Access
            | Opcode::TryOpen => 2,
            Opcode::GASet => 3,
            Opcode::SGet => 4,
            Opcode::Jmp | Opcode::Jif | Opcode::Jit | Opcode::Or | Opcode::And => {
                let delta = i16::from_be_bytes([chunks[cursor], chunks[cursor + 1]]);
                let origin = cursor + 2;
                let target = origin as i64 + delta as i64;
                assert!(
                    target >= 0 && (target as usize) <= chunks.len(),
                    "jump at {} lands out of bounds ({})",
                    cursor - 1,
                    target
                );
                2
            }
            _ => 0,
        };
        cursor += operand;
    }
    assert_eq!(cursor, chunks.len(), "instruction stream is misaligned");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_arithmetic_matches_reference_eval(expr in arith_strategy()) {
        let source = format!("println({})", expr.render());
        let (vm, code, buffer) = run_vm(&source);

        prop_assert_eq!(code, 0);
        prop_assert_eq!(buffer.contents(), format!("{}\n", expr.eval()));
        // The value stack is empty after the entry frame returns
        prop_assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn prop_jump_targets_stay_in_bounds(expr in arith_strategy(), n in 0u8..6) {
        let source = format!(
            "mut i = 0\nwhile i < {} {{\n  if i % 2 == 0 {{\n    println({})\n  }} else {{\n    println(i)\n  }}\n  i = i + 1\n}}",
            n,
            expr.render()
        );
        let module = compile(&source);
        assert_jumps_in_bounds(&module.entry().chunks);
    }

    #[test]
    fn prop_interned_literals_compare_equal(text in "[a-z]{1,8}", split in 0usize..8) {
        let split = split.min(text.len());
        let (head, tail) = text.split_at(split);
        let source = format!(
            "let x = \"{}\"\nlet y = \"{}\" ++ \"{}\"\nprintln(x == y)",
            text, head, tail
        );
        let (_, _, buffer) = run_vm(&source);
        prop_assert_eq!(buffer.contents(), "true\n");
    }

    #[test]
    fn prop_template_round_trip(parts in prop::collection::vec(
        prop_oneof![
            any::<i8>().prop_map(|v| v.to_string()),
            "[a-z ]{0,6}".prop_map(|s| s),
        ],
        1..5,
    )) {
        // A template of literal parts stringifies to their concatenation
        let mut template = String::from("`");
        let mut expected = String::new();
        for part in &parts {
            match part.parse::<i64>() {
                Ok(value) => {
                    template.push_str(&format!("{{{}}}", if value < 0 {
                        format!("(0 - {})", -value)
                    } else {
                        value.to_string()
                    }));
                    expected.push_str(&value.to_string());
                }
                Err(_) => {
                    template.push_str(part);
                    expected.push_str(part);
                }
            }
        }
        template.push('`');

        let source = format!("println({})", template);
        let (_, _, buffer) = run_vm(&source);
        prop_assert_eq!(buffer.contents(), format!("{}\n", expected));
    }

    #[test]
    fn prop_exception_unwind_preserves_stack_balance(depth in 1u8..5) {
        // Repeated throw/catch cycles leave no residue on the value stack
        let mut body = String::new();
        for i in 0..depth {
            body.push_str(&format!(
                "try {{\n  let pad{} = {}\n  throw {{ msg: \"e{}\" }}\n}} catch {{\n  println({})\n}}\n",
                i, i, i, i
            ));
        }
        let (vm, _, _) = run_vm(&body);
        prop_assert_eq!(vm.stack_len(), 0);
        prop_assert_eq!(vm.exception_depth(), 0);
    }

    #[test]
    fn prop_gc_accounting_is_exact(strings in prop::collection::vec("[a-z]{0,12}", 0..24), keep_every in 1usize..4) {
        let mut heap = Heap::new();
        let mut objects = Vec::new();

        for text in &strings {
            objects.push(heap.create_str(text, true));
        }
        // Nest some of them in containers
        let lists: Vec<_> = objects
            .chunks(3)
            .map(|chunk| {
                let values: Vec<Value> = chunk.iter().map(|obj| Value::Obj(*obj)).collect();
                heap.alloc(ObjBody::List(values))
            })
            .collect();

        let roots: Vec<Value> = lists
            .iter()
            .enumerate()
            .filter(|(index, _)| index % keep_every == 0)
            .map(|(_, obj)| Value::Obj(*obj))
            .collect();

        heap.collect(&roots, &[]);

        // Accounting matches the per-object sizes exactly
        prop_assert_eq!(heap.bytes_alive(), heap.accounted_bytes());
        // No object is gray and every survivor is back on the white list
        prop_assert_eq!(heap.gray_len(), 0);
        prop_assert_eq!(heap.white_len(), heap.object_count());
        // Rooted lists and their elements survived
        for root in &roots {
            if let Value::Obj(obj) = root {
                prop_assert!(heap.contains(*obj));
            }
        }
    }
}

#[test]
fn test_capture_offsets_match_enclosing_locals() {
    // Closure layout: each capture references the enclosing frame's local
    // offset at the capturing site
    let module = compile(
        "proc outer(a, b) {\n  let c = a + b\n  ret anon() { ret c + b }\n}",
    );
    let meta = match module.symbol(0) {
        Some(zeal_runtime::module::SubmoduleSym::Closure(meta)) => meta,
        other => panic!("expected closure symbol, got {:?}", other),
    };
    // Captures c (offset 2) and b (offset 1), in capture order
    assert_eq!(meta.captures, vec![2, 1]);
}

#[test]
fn test_entry_bytecode_is_aligned() {
    let module = compile("mut a = 1\nif a > 0 {\n  println(a)\n}");
    assert_jumps_in_bounds(&module.entry().chunks);
}

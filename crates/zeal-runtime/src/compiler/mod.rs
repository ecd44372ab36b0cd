//! AST to bytecode compiler
//!
//! Walks the AST depth-first, emitting stack-effect-balanced bytecode into
//! per-function units. Expressions push exactly one value; statements are
//! balanced. Locals resolve to dense frame offsets, globals to names in the
//! owning module, captures to out-value offsets one function-hop outward.
//!
//! Jumps use a two-pass label protocol: emission records placeholders and
//! named targets, and popping a unit patches every jump (relative i16) and
//! mark (absolute u16).

mod expr;
mod imports;
mod scope;
mod stmt;
mod unit;

pub use imports::CompilerCtx;

use crate::ast::Program;
use crate::bytecode::{Opcode, Proc};
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::module::Module;
use crate::parser::Parser;
use crate::span::Span;
use scope::ScopeManager;
use std::path::Path;
use std::rc::Rc;
use unit::Unit;

/// Compiler state for one module
pub struct Compiler<'ctx> {
    ctx: &'ctx CompilerCtx,
    module: Rc<Module>,
    path: String,
    units: Vec<Unit>,
    scopes: ScopeManager,
    next_id: i32,
}

/// Compile one module's source into a [`Module`]
///
/// Imports recurse through [`CompilerCtx`], which caches compiled modules
/// by path and owns the search-path list and native-module registry.
pub fn compile_module(
    ctx: &CompilerCtx,
    name: &str,
    path: &Path,
    source: &str,
) -> Result<Rc<Module>, CompileError> {
    let path_str = path.display().to_string();

    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|e| e.with_path(&path_str))?;
    let program = Parser::new(tokens)
        .parse()
        .map_err(|e| e.with_path(&path_str))?;

    let module = Module::new(name, path);
    let mut compiler = Compiler {
        ctx,
        module: module.clone(),
        path: path_str,
        units: vec![Unit::new("main", 0)],
        scopes: ScopeManager::new(),
        next_id: 0,
    };

    compiler.declare_defaults()?;
    compiler.compile_program(&program)?;

    let entry = compiler.pop_unit()?;
    module.set_entry(Rc::new(entry));

    Ok(module)
}

impl<'ctx> Compiler<'ctx> {
    /// Register the default native functions as compile-time symbols so
    /// identifier resolution and arity checking can see them
    fn declare_defaults(&mut self) -> Result<(), CompileError> {
        for native in self.ctx.native_fns.values() {
            self.scopes
                .define_native_fn(native.name, native.arity)
                .map_err(|msg| CompileError::Internal { msg })?;
        }
        Ok(())
    }

    fn compile_program(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.stmts {
            self.compile_stmt(stmt)?;
        }

        // Implicit module-entry return, then the halt terminator
        self.write_chunk(Opcode::Empty);
        self.write_chunk(Opcode::Ret);
        self.write_chunk(Opcode::Hlt);

        Ok(())
    }

    // ===== Unit stack =====

    fn push_unit(&mut self, name: &str, arity: u8) {
        self.units.push(Unit::new(name, arity));
    }

    fn pop_unit(&mut self) -> Result<Proc, CompileError> {
        let unit = self.units.pop().expect("unit stack underflow");
        unit.resolve(&self.module)
    }

    fn unit(&mut self) -> &mut Unit {
        self.units.last_mut().expect("unit stack empty")
    }

    // ===== Emission =====

    fn write_chunk(&mut self, opcode: Opcode) -> usize {
        self.unit().write_chunk(opcode as u8)
    }

    fn write_byte(&mut self, byte: u8) -> usize {
        self.unit().write_chunk(byte)
    }

    fn write_i16(&mut self, value: i16) -> usize {
        self.unit().write_u16(value as u16)
    }

    fn write_location(&mut self, span: Span) {
        self.unit().write_location(span);
    }

    /// Append an integer constant to the pool and emit its 16-bit index
    fn write_iconst(&mut self, value: i64) -> Result<(), CompileError> {
        let unit = self.unit();
        let index = match unit.iconsts.iter().position(|&v| v == value) {
            Some(index) => index,
            None => {
                unit.iconsts.push(value);
                unit.iconsts.len() - 1
            }
        };
        if index > u16::MAX as usize {
            return Err(CompileError::Internal {
                msg: "integer constant pool overflow".to_string(),
            });
        }
        unit.write_u16(index as u16);
        Ok(())
    }

    /// Append a float constant to the pool and emit its 16-bit index
    fn write_fconst(&mut self, value: f64) -> Result<(), CompileError> {
        let unit = self.unit();
        let index = match unit.fconsts.iter().position(|&v| v.to_bits() == value.to_bits()) {
            Some(index) => index,
            None => {
                unit.fconsts.push(value);
                unit.fconsts.len() - 1
            }
        };
        if index > u16::MAX as usize {
            return Err(CompileError::Internal {
                msg: "float constant pool overflow".to_string(),
            });
        }
        unit.write_u16(index as u16);
        Ok(())
    }

    /// Intern a static string in the module table and emit its 16-bit index
    fn write_str(&mut self, text: &str) -> Result<(), CompileError> {
        let index = self.module.add_static_str(text);
        if index > u16::MAX as usize {
            return Err(CompileError::Internal {
                msg: "static string table overflow".to_string(),
            });
        }
        self.unit().write_u16(index as u16);
        Ok(())
    }

    // ===== Labels and jumps =====

    fn generate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn label(&mut self, name: String) -> Result<(), CompileError> {
        self.unit().label(name)
    }

    fn jmp(&mut self, name: String) {
        self.unit().jmp_like(Opcode::Jmp, name);
    }

    fn jif(&mut self, name: String) {
        self.unit().jmp_like(Opcode::Jif, name);
    }

    fn jit(&mut self, name: String) {
        self.unit().jmp_like(Opcode::Jit, name);
    }

    fn or_jump(&mut self, name: String) {
        self.unit().jmp_like(Opcode::Or, name);
    }

    fn and_jump(&mut self, name: String) {
        self.unit().jmp_like(Opcode::And, name);
    }

    fn mark(&mut self, name: String) {
        self.unit().mark(name);
    }

    /// Emit one `POP` per local declared directly in the innermost scope
    fn pop_scope_locals(&mut self) {
        for _ in 0..self.scopes.current_locals_count() {
            self.write_chunk(Opcode::Pop);
        }
    }

    // ===== Errors =====

    fn error(&self, span: Span, msg: impl Into<String>) -> CompileError {
        CompileError::User {
            msg: msg.into(),
            line: span.line,
            path: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natives;
    use std::path::PathBuf;

    fn compile(source: &str) -> Result<Rc<Module>, CompileError> {
        let ctx = CompilerCtx::new(natives::default_native_fns(), PathBuf::from("."), Vec::new());
        compile_module(&ctx, "main", Path::new("main.ze"), source)
    }

    #[test]
    fn test_compile_trivial_program() {
        let module = compile("mut a = 2\na = a + 3 * 4").unwrap();
        let entry = module.entry();
        assert_eq!(entry.name, "main");
        // Entry terminates with EMPTY RET HLT
        let n = entry.chunks.len();
        assert_eq!(entry.chunks[n - 1], Opcode::Hlt as u8);
        assert_eq!(entry.chunks[n - 2], Opcode::Ret as u8);
        assert_eq!(entry.chunks[n - 3], Opcode::Empty as u8);
    }

    #[test]
    fn test_global_define_emits_gdef_with_name() {
        let module = compile("mut a = 2").unwrap();
        let entry = module.entry();
        assert!(entry.chunks.contains(&(Opcode::GDef as u8)));
        assert_eq!(module.static_str(0).unwrap().as_ref(), "a");
    }

    #[test]
    fn test_immutable_global_requires_initializer() {
        let err = compile("let a").unwrap_err();
        assert!(err
            .to_string()
            .contains("immutable global variables must be initialized"));
    }

    #[test]
    fn test_reassigning_immutable_global_fails() {
        let err = compile("let a = 1\na = 2").unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    #[test]
    fn test_capture_two_hops_is_rejected() {
        let err = compile(
            "proc outer() {\n  let x = 1\n  ret anon() {\n    ret anon() { ret x }\n  }\n}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one jump"));
    }

    #[test]
    fn test_single_hop_capture_compiles_to_closure_symbol() {
        let module = compile(
            "proc make_adder(x) {\n  ret anon(y) { ret x + y }\n}",
        )
        .unwrap();
        // The anon registered a closure symbol
        assert!(matches!(
            module.symbol(0),
            Some(crate::module::SubmoduleSym::Closure(_))
        ));
    }

    #[test]
    fn test_return_must_be_last_statement() {
        let err = compile("proc f() {\n  ret 1\n  let a = 2\n}").unwrap_err();
        assert!(err.to_string().contains("after the scope returned"));
    }

    #[test]
    fn test_return_at_global_scope_fails() {
        let err = compile("ret 1").unwrap_err();
        assert!(err.to_string().contains("global scope"));
    }

    #[test]
    fn test_stop_outside_loop_fails() {
        let err = compile("stop").unwrap_err();
        assert!(err.to_string().contains("while and for loops"));
    }

    #[test]
    fn test_try_inside_catch_fails() {
        let err = compile(
            "proc f() {\n  try { } catch {\n    try { } catch { }\n  }\n}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("catch"));
    }

    #[test]
    fn test_proc_only_at_global_scope() {
        let err = compile("proc f() {\n  proc g() { }\n}").unwrap_err();
        assert!(err.to_string().contains("global scope"));
    }

    #[test]
    fn test_arity_mismatch_on_known_proc() {
        let err = compile("proc f(a) { }\nf(1, 2)").unwrap_err();
        assert!(err.to_string().contains("argument"));
    }

    #[test]
    fn test_shadowing_proc_name_fails() {
        let err = compile("proc f() { }\nmut f = 1").unwrap_err();
        assert!(err.to_string().contains("shadow"));
    }
}

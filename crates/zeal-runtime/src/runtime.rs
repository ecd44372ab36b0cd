//! Runtime facade
//!
//! [`Zeal`] wires the full pipeline — lex, parse, compile, execute —
//! with configured search paths and output writers. The CLI and the
//! integration tests both drive this surface.

use crate::ast::Program;
use crate::bytecode::disassemble;
use crate::compiler::{compile_module, CompilerCtx};
use crate::error::{CompileError, RuntimeError};
use crate::lexer::Lexer;
use crate::module::{Module, SubmoduleSym};
use crate::natives::default_native_fns;
use crate::parser::Parser;
use crate::token::Token;
use crate::vm::{stderr_writer, stdout_writer, OutputWriter, Vm};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/// A pipeline failure: before code generation or during execution
#[derive(Debug, Error)]
pub enum ZealError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// The Zeal pipeline entry point
pub struct Zeal {
    search_paths: Vec<PathBuf>,
    out: OutputWriter,
    err: OutputWriter,
}

impl Default for Zeal {
    fn default() -> Self {
        Self::new()
    }
}

impl Zeal {
    /// A runtime writing to stdout/stderr with no extra search paths
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            out: stdout_writer(),
            err: stderr_writer(),
        }
    }

    /// Add module search paths, probed after the main source directory
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Redirect `print`-family output
    pub fn with_output(mut self, out: OutputWriter) -> Self {
        self.out = out;
        self
    }

    /// Redirect `eprint`-family output
    pub fn with_error_output(mut self, err: OutputWriter) -> Self {
        self.err = err;
        self
    }

    /// Lex a source file (the `-l` stage)
    pub fn lex_file(&self, path: &Path) -> Result<Vec<Token>, ZealError> {
        let source = read_source(path)?;
        let tokens = Lexer::new(&source)
            .tokenize()
            .map_err(|e| e.with_path(&path.display().to_string()))?;
        Ok(tokens)
    }

    /// Lex and parse a source file (the `-p` stage)
    pub fn parse_file(&self, path: &Path) -> Result<Program, ZealError> {
        let source = read_source(path)?;
        let path_str = path.display().to_string();
        let tokens = Lexer::new(&source)
            .tokenize()
            .map_err(|e| e.with_path(&path_str))?;
        let program = Parser::new(tokens)
            .parse()
            .map_err(|e| e.with_path(&path_str))?;
        Ok(program)
    }

    /// Compile a source file and every module it imports (the `-c` stage)
    pub fn compile_file(&self, path: &Path) -> Result<Rc<Module>, ZealError> {
        let source = read_source(path)?;
        self.compile_source(path, &source)
    }

    /// Compile and render the entry module's bytecode (the `-d` stage)
    pub fn disassemble_file(&self, path: &Path) -> Result<String, ZealError> {
        let module = self.compile_file(path)?;
        let mut out = disassemble(&module.entry());

        let mut index = 0;
        while let Some(symbol) = module.symbol(index) {
            match symbol {
                SubmoduleSym::Proc(proc) => {
                    out.push('\n');
                    out.push_str(&disassemble(&proc));
                }
                SubmoduleSym::Closure(meta) => {
                    out.push('\n');
                    out.push_str(&disassemble(&meta.proc));
                }
                _ => {}
            }
            index += 1;
        }

        Ok(out)
    }

    /// Compile and execute a source file; returns the process exit code
    pub fn run_file(&self, path: &Path) -> Result<u8, ZealError> {
        let source = read_source(path)?;
        self.run_source(path, &source)
    }

    /// Compile and execute source text under the given path label
    pub fn run_source(&self, path: &Path, source: &str) -> Result<u8, ZealError> {
        let natives = default_native_fns();
        let module = {
            let ctx = CompilerCtx::new(
                natives.clone(),
                main_search_path(path),
                self.search_paths.clone(),
            );
            compile_module(&ctx, &module_name(path), path, source)?
        };

        let mut vm = Vm::new(Rc::new(natives));
        vm.set_output_writer(self.out.clone());
        vm.set_error_writer(self.err.clone());
        let code = vm.execute(module)?;
        Ok(code)
    }

    fn compile_source(&self, path: &Path, source: &str) -> Result<Rc<Module>, ZealError> {
        let ctx = CompilerCtx::new(
            default_native_fns(),
            main_search_path(path),
            self.search_paths.clone(),
        );
        let module = compile_module(&ctx, &module_name(path), path, source)?;
        Ok(module)
    }
}

fn read_source(path: &Path) -> Result<String, CompileError> {
    fs::read_to_string(path).map_err(|e| CompileError::User {
        msg: format!("failed to read source file: {}", e),
        line: 0,
        path: path.display().to_string(),
    })
}

fn main_search_path(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::buffer_writer;

    #[test]
    fn test_module_name_from_path() {
        assert_eq!(module_name(Path::new("dir/app.ze")), "app");
        assert_eq!(
            main_search_path(Path::new("dir/app.ze")),
            PathBuf::from("dir")
        );
        assert_eq!(main_search_path(Path::new("app.ze")), PathBuf::from("."));
    }

    #[test]
    fn test_run_source_returns_exit_code_zero() {
        let (writer, buffer) = buffer_writer();
        let zeal = Zeal::new().with_output(writer);
        let code = zeal
            .run_source(Path::new("main.ze"), "println(1 + 1)")
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(buffer.contents(), "2\n");
    }
}

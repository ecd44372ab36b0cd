//! Import resolution and the shared compilation context
//!
//! Imports resolve along a search-path list: the directory of the initial
//! source first, then every additional path in order. Each imported file
//! compiles exactly once; the parent directory of a resolved file joins the
//! search list so sibling imports resolve naturally. Single-name imports
//! check the built-in native module registry before touching the
//! filesystem.

use super::{compile_module, Compiler};
use crate::error::CompileError;
use crate::module::{Module, Predefined, SubmoduleSym};
use crate::natives::{NativeFn, NativeModule, NativeRegistry};
use crate::span::Span;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// State shared across the (possibly recursive) compilation of a program
/// and all of its imports
pub struct CompilerCtx {
    /// Default native functions, for symbol declaration and arity checks
    pub(crate) native_fns: Rc<HashMap<&'static str, Rc<NativeFn>>>,
    /// Lazily initialized native-module registry, interpreter-bound
    natives: RefCell<NativeRegistry>,
    /// Directory of the initial source file
    main_search_path: PathBuf,
    /// Additional search paths, in probe order
    search_paths: RefCell<Vec<PathBuf>>,
    /// Modules compiled so far, by resolved path
    compiled: RefCell<HashMap<PathBuf, Rc<Module>>>,
    /// Modules currently compiling, for import-cycle detection
    in_progress: RefCell<HashSet<PathBuf>>,
}

impl CompilerCtx {
    /// Create a context with the given native bindings and search paths
    pub fn new(
        native_fns: HashMap<&'static str, Rc<NativeFn>>,
        main_search_path: PathBuf,
        search_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            native_fns: Rc::new(native_fns),
            natives: RefCell::new(NativeRegistry::new()),
            main_search_path,
            search_paths: RefCell::new(search_paths),
            compiled: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
        }
    }

    /// Built-in native module by name, initialized on first use
    fn native_module(&self, name: &str) -> Option<Rc<NativeModule>> {
        self.natives.borrow_mut().get_or_init(name)
    }

    /// Probe the search paths for a relative module filename
    fn resolve_import(&self, relative: &Path) -> Result<PathBuf, String> {
        let mut candidates = vec![self.main_search_path.clone()];
        candidates.extend(self.search_paths.borrow().iter().cloned());

        for base in candidates {
            let candidate = base.join(relative);
            if candidate.is_dir() {
                return Err(format!(
                    "'{}' is a directory, not a module",
                    candidate.display()
                ));
            }
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(format!("module '{}' not found", relative.display()))
    }

    /// Remember the parent directory of a resolved module
    fn add_search_path(&self, resolved: &Path) {
        let Some(parent) = resolved.parent() else {
            return;
        };
        let mut paths = self.search_paths.borrow_mut();
        if parent != self.main_search_path && !paths.iter().any(|p| p == parent) {
            paths.push(parent.to_path_buf());
        }
    }

    /// Compile a module file once; later imports reuse the same module
    fn compile_cached(&self, name: &str, path: &Path) -> Result<Rc<Module>, CompileError> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(module) = self.compiled.borrow().get(&key) {
            return Ok(module.clone());
        }
        if self.in_progress.borrow().contains(&key) {
            return Err(CompileError::User {
                msg: format!("circular import of module '{}'", name),
                line: 0,
                path: path.display().to_string(),
            });
        }

        let source = fs::read_to_string(path).map_err(|e| CompileError::User {
            msg: format!("failed to read module file: {}", e),
            line: 0,
            path: path.display().to_string(),
        })?;

        self.in_progress.borrow_mut().insert(key.clone());
        let result = compile_module(self, name, path, &source);
        self.in_progress.borrow_mut().remove(&key);

        let module = result?;
        self.compiled
            .borrow_mut()
            .insert(key, module.clone());
        Ok(module)
    }
}

impl<'ctx> Compiler<'ctx> {
    /// `import a.b.c [as d]`
    pub(super) fn compile_import(
        &mut self,
        names: &[String],
        alias: Option<&str>,
        span: Span,
    ) -> Result<(), CompileError> {
        if !self.scopes.is_global_scope() {
            return Err(self.error(span, "import statements only allowed in global scope"));
        }

        let search_name = names.last().expect("parser requires at least one name");
        let decl_name = alias.unwrap_or(search_name);

        // Built-in native modules shadow single-name file imports
        if names.len() == 1 {
            if let Some(native_module) = self.ctx.native_module(search_name) {
                self.scopes
                    .define_module(decl_name)
                    .map_err(|msg| self.error(span, msg))?;
                self.module
                    .add_predefined(decl_name, Predefined::NativeModule(native_module));
                return Ok(());
            }
        }

        let mut relative = PathBuf::new();
        for name in names {
            relative.push(name);
        }
        relative.set_extension("ze");

        let resolved = self
            .ctx
            .resolve_import(&relative)
            .map_err(|msg| self.error(span, msg))?;
        self.ctx.add_search_path(&resolved);

        let imported = self.ctx.compile_cached(search_name, &resolved)?;

        self.scopes
            .define_module(decl_name)
            .map_err(|msg| self.error(span, msg))?;
        self.module
            .add_symbol(SubmoduleSym::Module(imported.clone()));
        self.module
            .add_predefined(decl_name, Predefined::Module(imported));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natives;

    fn ctx_for(dir: &Path) -> CompilerCtx {
        CompilerCtx::new(
            natives::default_native_fns(),
            dir.to_path_buf(),
            Vec::new(),
        )
    }

    #[test]
    fn test_import_resolves_in_main_search_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.ze"), "export shared\nlet shared = 1").unwrap();
        fs::write(dir.path().join("main.ze"), "import util\n").unwrap();

        let ctx = ctx_for(dir.path());
        let source = fs::read_to_string(dir.path().join("main.ze")).unwrap();
        let module =
            compile_module(&ctx, "main", &dir.path().join("main.ze"), &source).unwrap();

        assert!(matches!(module.symbol(0), Some(SubmoduleSym::Module(_))));
    }

    #[test]
    fn test_import_missing_module_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_for(dir.path());
        let err = compile_module(
            &ctx,
            "main",
            &dir.path().join("main.ze"),
            "import nothing_here",
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_import_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pkg.ze")).unwrap();
        let ctx = ctx_for(dir.path());
        let err =
            compile_module(&ctx, "main", &dir.path().join("main.ze"), "import pkg").unwrap_err();
        assert!(err.to_string().contains("directory"));
    }

    #[test]
    fn test_dotted_import_joins_path_segments() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/nested")).unwrap();
        fs::write(dir.path().join("lib/nested/mod.ze"), "let x = 1").unwrap();
        let ctx = ctx_for(dir.path());
        let module = compile_module(
            &ctx,
            "main",
            &dir.path().join("main.ze"),
            "import lib.nested.mod",
        )
        .unwrap();
        assert!(matches!(module.symbol(0), Some(SubmoduleSym::Module(_))));
    }

    #[test]
    fn test_circular_import_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ze"), "import b").unwrap();
        fs::write(dir.path().join("b.ze"), "import a").unwrap();
        let ctx = ctx_for(dir.path());
        let err =
            compile_module(&ctx, "main", &dir.path().join("main.ze"), "import a").unwrap_err();
        assert!(err.to_string().contains("circular import"));
    }

    #[test]
    fn test_same_module_compiles_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shared.ze"), "let x = 1").unwrap();
        fs::write(dir.path().join("a.ze"), "import shared").unwrap();
        let ctx = ctx_for(dir.path());
        let module = compile_module(
            &ctx,
            "main",
            &dir.path().join("main.ze"),
            "import a\nimport shared",
        )
        .unwrap();

        // Both the importer and `a` see one shared module instance
        let direct = match module.symbol(1) {
            Some(SubmoduleSym::Module(m)) => m,
            other => panic!("expected module symbol, got {:?}", other),
        };
        let via_a = match module.symbol(0) {
            Some(SubmoduleSym::Module(a)) => match a.symbol(0) {
                Some(SubmoduleSym::Module(m)) => m,
                other => panic!("expected nested module, got {:?}", other),
            },
            other => panic!("expected module symbol, got {:?}", other),
        };
        assert!(Rc::ptr_eq(&direct, &via_a));
    }

    #[test]
    fn test_native_module_import_registers_predefined() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_for(dir.path());
        let module =
            compile_module(&ctx, "main", &dir.path().join("main.ze"), "import math").unwrap();
        let bindings = module.predefined_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].0, "math");
        assert!(matches!(bindings[0].1, Predefined::NativeModule(_)));
    }
}

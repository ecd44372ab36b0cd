//! Scope manager: lexical scopes and symbol resolution
//!
//! Scopes form a stack with the single global scope at the bottom.
//! Function scopes open a fresh local window (dense u8 offsets) and bump
//! the function-nesting depth used by the one-hop capture rule. Every
//! non-global scope tracks a `returned` flag for dead-code detection.

use std::collections::HashMap;

/// Scope kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Global,
    Function,
    Block,
    If,
    Elif,
    Else,
    While,
    For,
    Try,
    Catch,
}

/// A resolved symbol
#[derive(Debug, Clone)]
pub(crate) enum Symbol {
    Local {
        offset: u8,
        mutable: bool,
        initialized: bool,
        /// Function-nesting depth at the definition site
        fn_depth: u32,
    },
    Global {
        mutable: bool,
    },
    Proc {
        arity: u8,
    },
    NativeFn {
        arity: u8,
    },
    Module,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    fn_depth: u32,
    returned: bool,
    symbols: HashMap<String, Symbol>,
    /// Locals declared directly in this scope
    locals_count: u8,
}

/// The scope stack
#[derive(Debug)]
pub(crate) struct ScopeManager {
    scopes: Vec<Scope>,
    /// One next-local counter per open function window (plus none at global)
    local_counters: Vec<u16>,
}

impl ScopeManager {
    /// Create a manager holding only the global scope.
    /// The base local counter is the entry function's window, so blocks at
    /// top level can declare frame locals.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                fn_depth: 0,
                returned: false,
                symbols: HashMap::new(),
                locals_count: 0,
            }],
            local_counters: vec![0],
        }
    }

    /// Push a scope of the given kind
    pub fn push(&mut self, kind: ScopeKind) {
        let mut fn_depth = self.fn_depth();
        if kind == ScopeKind::Function {
            fn_depth += 1;
            self.local_counters.push(0);
        }
        self.scopes.push(Scope {
            kind,
            fn_depth,
            returned: false,
            symbols: HashMap::new(),
            locals_count: 0,
        });
    }

    /// Pop the innermost scope
    pub fn pop(&mut self) {
        let scope = self.scopes.pop().expect("scope stack underflow");
        if scope.kind == ScopeKind::Function {
            self.local_counters.pop();
        }
        // Locals of the popped scope release their window slots
        if scope.locals_count > 0 {
            if let Some(counter) = self.local_counters.last_mut() {
                *counter -= scope.locals_count as u16;
            }
        }
    }

    /// Whether the innermost scope is the global scope
    pub fn is_global_scope(&self) -> bool {
        self.scopes.last().map(|s| s.kind) == Some(ScopeKind::Global)
    }

    /// Current function-nesting depth (0 at global)
    pub fn fn_depth(&self) -> u32 {
        self.scopes.last().map(|s| s.fn_depth).unwrap_or(0)
    }

    /// `returned` flag of the innermost scope
    pub fn current_returned(&self) -> bool {
        self.scopes.last().map(|s| s.returned).unwrap_or(false)
    }

    /// Mark the innermost scope as returned
    pub fn set_returned(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.returned = true;
        }
    }

    /// Propagate a returned innermost scope into its parent, stopping at
    /// the function boundary
    pub fn propagate_return(&mut self) {
        let len = self.scopes.len();
        if len < 2 {
            return;
        }
        if !self.scopes[len - 1].returned {
            return;
        }
        let parent = &mut self.scopes[len - 2];
        if parent.kind != ScopeKind::Global {
            parent.returned = true;
        }
    }

    /// Locals declared directly in the innermost scope
    pub fn current_locals_count(&self) -> u8 {
        self.scopes.last().map(|s| s.locals_count).unwrap_or(0)
    }

    /// Locals declared in scopes from the innermost out to (and including)
    /// the nearest loop scope; used by `stop`/`continue` cleanup.
    /// Returns `None` when no loop encloses the current point within the
    /// current function.
    pub fn locals_down_to_loop(&self) -> Option<u8> {
        let mut count = 0u8;
        for scope in self.scopes.iter().rev() {
            match scope.kind {
                ScopeKind::While | ScopeKind::For => {
                    return Some(count + scope.locals_count);
                }
                ScopeKind::Function | ScopeKind::Global => return None,
                _ => count += scope.locals_count,
            }
        }
        None
    }

    /// Whether a loop scope encloses the current point within the current
    /// function
    pub fn in_loop(&self) -> bool {
        self.locals_down_to_loop().is_some()
    }

    /// Whether a scope of `kind` encloses the current point within the
    /// current function
    pub fn in_scope_kind(&self, kind: ScopeKind) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.kind == kind {
                return true;
            }
            if matches!(scope.kind, ScopeKind::Function | ScopeKind::Global) {
                break;
            }
        }
        false
    }

    /// Define a local in the innermost scope, allocating the next dense
    /// offset within the current function window
    pub fn define_local(
        &mut self,
        name: &str,
        mutable: bool,
        initialized: bool,
    ) -> Result<u8, String> {
        let fn_depth = self.fn_depth();
        let counter = self
            .local_counters
            .last_mut()
            .ok_or_else(|| "locals require an enclosing function scope".to_string())?;
        if *counter > u8::MAX as u16 {
            return Err("too many locals in function".to_string());
        }
        let offset = *counter as u8;

        let scope = self.scopes.last_mut().expect("scope stack empty");
        if scope.symbols.contains_key(name) {
            return Err(format!("symbol '{}' already defined in this scope", name));
        }
        scope.symbols.insert(
            name.to_string(),
            Symbol::Local {
                offset,
                mutable,
                initialized,
                fn_depth,
            },
        );
        scope.locals_count += 1;
        *counter += 1;

        Ok(offset)
    }

    /// Define a global in the global scope
    pub fn define_global(&mut self, name: &str, mutable: bool) -> Result<(), String> {
        self.define_in_global(name, Symbol::Global { mutable })
    }

    /// Define a procedure name in the global scope
    pub fn define_proc(&mut self, name: &str, arity: u8) -> Result<(), String> {
        self.define_in_global(name, Symbol::Proc { arity })
    }

    /// Define a native function name in the global scope
    pub fn define_native_fn(&mut self, name: &str, arity: u8) -> Result<(), String> {
        self.define_in_global(name, Symbol::NativeFn { arity })
    }

    /// Define a module name in the global scope
    pub fn define_module(&mut self, name: &str) -> Result<(), String> {
        self.define_in_global(name, Symbol::Module)
    }

    fn define_in_global(&mut self, name: &str, symbol: Symbol) -> Result<(), String> {
        let scope = self
            .scopes
            .first_mut()
            .expect("global scope always present");
        if scope.symbols.contains_key(name) {
            return Err(format!("symbol '{}' already defined", name));
        }
        scope.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    /// Resolve a name, walking scopes inward to outward
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(symbol) = scope.symbols.get(name) {
                return Some(symbol.clone());
            }
        }
        None
    }

    /// Mark an immutable local as initialized after its first assignment
    pub fn mark_local_initialized(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(Symbol::Local { initialized, .. }) = scope.symbols.get_mut(name) {
                *initialized = true;
                return;
            }
        }
    }

    /// Whether `name` is a procedure name (shadowing procedures is illegal)
    pub fn exists_proc(&self, name: &str) -> bool {
        matches!(self.lookup(name), Some(Symbol::Proc { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_outward() {
        let mut scopes = ScopeManager::new();
        scopes.define_global("g", true).unwrap();
        scopes.push(ScopeKind::Function);
        scopes.define_local("a", true, true).unwrap();
        scopes.push(ScopeKind::Block);
        scopes.define_local("b", true, true).unwrap();

        assert!(matches!(scopes.lookup("g"), Some(Symbol::Global { .. })));
        assert!(matches!(
            scopes.lookup("a"),
            Some(Symbol::Local { offset: 0, .. })
        ));
        assert!(matches!(
            scopes.lookup("b"),
            Some(Symbol::Local { offset: 1, .. })
        ));
        assert!(scopes.lookup("missing").is_none());
    }

    #[test]
    fn test_local_offsets_are_dense_per_function() {
        let mut scopes = ScopeManager::new();
        scopes.push(ScopeKind::Function);
        assert_eq!(scopes.define_local("p0", true, true).unwrap(), 0);
        assert_eq!(scopes.define_local("p1", true, true).unwrap(), 1);

        scopes.push(ScopeKind::Function);
        // A nested function opens a fresh window
        assert_eq!(scopes.define_local("q0", true, true).unwrap(), 0);
        scopes.pop();

        assert_eq!(scopes.define_local("p2", true, true).unwrap(), 2);
    }

    #[test]
    fn test_block_locals_release_slots() {
        let mut scopes = ScopeManager::new();
        scopes.push(ScopeKind::Function);
        scopes.define_local("a", true, true).unwrap();
        scopes.push(ScopeKind::Block);
        assert_eq!(scopes.define_local("b", true, true).unwrap(), 1);
        scopes.pop();
        // The block's slot is reusable after the block closes
        assert_eq!(scopes.define_local("c", true, true).unwrap(), 1);
    }

    #[test]
    fn test_redefinition_in_same_scope_fails() {
        let mut scopes = ScopeManager::new();
        scopes.push(ScopeKind::Function);
        scopes.define_local("x", true, true).unwrap();
        assert!(scopes.define_local("x", true, true).is_err());
    }

    #[test]
    fn test_shadowing_in_inner_scope_is_allowed() {
        let mut scopes = ScopeManager::new();
        scopes.push(ScopeKind::Function);
        scopes.define_local("x", true, true).unwrap();
        scopes.push(ScopeKind::Block);
        assert!(scopes.define_local("x", true, true).is_ok());
    }

    #[test]
    fn test_fn_depth_tracks_nesting() {
        let mut scopes = ScopeManager::new();
        assert_eq!(scopes.fn_depth(), 0);
        scopes.push(ScopeKind::Function);
        assert_eq!(scopes.fn_depth(), 1);
        scopes.push(ScopeKind::Block);
        assert_eq!(scopes.fn_depth(), 1);
        scopes.push(ScopeKind::Function);
        assert_eq!(scopes.fn_depth(), 2);
    }

    #[test]
    fn test_loop_lookup_stops_at_function_boundary() {
        let mut scopes = ScopeManager::new();
        scopes.push(ScopeKind::Function);
        scopes.push(ScopeKind::While);
        assert!(scopes.in_loop());
        scopes.push(ScopeKind::Function);
        assert!(!scopes.in_loop());
    }

    #[test]
    fn test_locals_down_to_loop_counts_intermediate_scopes() {
        let mut scopes = ScopeManager::new();
        scopes.push(ScopeKind::Function);
        scopes.push(ScopeKind::While);
        scopes.define_local("a", true, true).unwrap();
        scopes.push(ScopeKind::If);
        scopes.define_local("b", true, true).unwrap();
        assert_eq!(scopes.locals_down_to_loop(), Some(2));
    }

    #[test]
    fn test_proc_name_detection() {
        let mut scopes = ScopeManager::new();
        scopes.define_proc("main_loop", 0).unwrap();
        assert!(scopes.exists_proc("main_loop"));
        assert!(!scopes.exists_proc("other"));
    }
}

//! Compiled modules
//!
//! A module owns its function descriptors, its static string table, its
//! submodule symbol table (for `SGET`), and its globals. Globals are
//! populated when the module's entry function first runs; compile-time
//! registrations (procedures, imports, native modules) are kept aside as
//! predefined bindings and materialized into heap values at that point.

use crate::bytecode::{MetaClosure, Proc};
use crate::natives::NativeModule;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

/// Visibility of a module global
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
}

/// A module global: value plus visibility
#[derive(Debug, Clone, Copy)]
pub struct GlobalValue {
    pub visibility: Visibility,
    pub value: Value,
}

/// Symbols addressable through `SGET`
#[derive(Debug, Clone)]
pub enum SubmoduleSym {
    Proc(Rc<Proc>),
    Closure(Rc<MetaClosure>),
    Module(Rc<Module>),
    NativeModule(Rc<NativeModule>),
}

/// A compile-time global registration, materialized into a heap value when
/// the module first enters execution.
#[derive(Debug, Clone)]
pub enum Predefined {
    Proc(Rc<Proc>),
    Module(Rc<Module>),
    NativeModule(Rc<NativeModule>),
}

/// A compiled module
#[derive(Debug)]
pub struct Module {
    /// Module name (the import name, or the source file stem for the entry)
    pub name: String,
    /// Source file path
    pub path: PathBuf,
    entry: RefCell<Option<Rc<Proc>>>,
    symbols: RefCell<Vec<SubmoduleSym>>,
    static_strs: RefCell<Vec<Rc<str>>>,
    globals: RefCell<HashMap<String, GlobalValue>>,
    predefined: RefCell<Vec<(String, Predefined)>>,
    /// Names exported before their definition; applied at definition time
    pending_public: RefCell<HashSet<String>>,
    resolved: Cell<bool>,
    prepared: Cell<bool>,
}

impl Module {
    /// Create an empty module shell; the compiler fills it in
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Rc<Module> {
        Rc::new(Module {
            name: name.into(),
            path: path.into(),
            entry: RefCell::new(None),
            symbols: RefCell::new(Vec::new()),
            static_strs: RefCell::new(Vec::new()),
            globals: RefCell::new(HashMap::new()),
            predefined: RefCell::new(Vec::new()),
            pending_public: RefCell::new(HashSet::new()),
            resolved: Cell::new(false),
            prepared: Cell::new(false),
        })
    }

    /// The module's entry function
    pub fn entry(&self) -> Rc<Proc> {
        self.entry
            .borrow()
            .clone()
            .expect("module entry set at end of compilation")
    }

    /// Install the entry function (compiler only)
    pub fn set_entry(&self, entry: Rc<Proc>) {
        *self.entry.borrow_mut() = Some(entry);
    }

    /// Whether the entry function has completed
    pub fn resolved(&self) -> bool {
        self.resolved.get()
    }

    /// Mark the entry function as completed
    pub fn set_resolved(&self) {
        self.resolved.set(true);
    }

    /// Whether predefined bindings were materialized already
    pub fn prepared(&self) -> bool {
        self.prepared.get()
    }

    /// Mark predefined bindings as materialized
    pub fn set_prepared(&self) {
        self.prepared.set(true);
    }

    /// Append a submodule symbol, returning its `SGET` index
    pub fn add_symbol(&self, symbol: SubmoduleSym) -> usize {
        let mut symbols = self.symbols.borrow_mut();
        symbols.push(symbol);
        symbols.len() - 1
    }

    /// Look up a submodule symbol by index
    pub fn symbol(&self, index: usize) -> Option<SubmoduleSym> {
        self.symbols.borrow().get(index).cloned()
    }

    /// Intern a static string into the module table, returning its index
    pub fn add_static_str(&self, text: &str) -> usize {
        let mut strs = self.static_strs.borrow_mut();
        if let Some(idx) = strs.iter().position(|s| s.as_ref() == text) {
            return idx;
        }
        strs.push(Rc::from(text));
        strs.len() - 1
    }

    /// Fetch a static string by index
    pub fn static_str(&self, index: usize) -> Option<Rc<str>> {
        self.static_strs.borrow().get(index).cloned()
    }

    /// Register a compile-time global binding
    pub fn add_predefined(&self, name: &str, predefined: Predefined) {
        self.predefined
            .borrow_mut()
            .push((name.to_string(), predefined));
    }

    /// Drain a snapshot of the predefined bindings for materialization
    pub fn predefined_bindings(&self) -> Vec<(String, Predefined)> {
        self.predefined.borrow().clone()
    }

    /// Read a global
    pub fn global(&self, name: &str) -> Option<GlobalValue> {
        self.globals.borrow().get(name).copied()
    }

    /// Define a global; fails when the name already exists
    pub fn define_global(&self, name: &str, global: GlobalValue) -> Result<(), ()> {
        let mut globals = self.globals.borrow_mut();
        if globals.contains_key(name) {
            return Err(());
        }
        globals.insert(name.to_string(), global);
        Ok(())
    }

    /// Overwrite the value of an existing global; fails when absent
    pub fn set_global(&self, name: &str, value: Value) -> Result<(), ()> {
        let mut globals = self.globals.borrow_mut();
        match globals.get_mut(name) {
            Some(global) => {
                global.value = value;
                Ok(())
            }
            None => Err(()),
        }
    }

    /// Change the visibility of an existing global; fails when absent
    pub fn set_visibility(&self, name: &str, visibility: Visibility) -> Result<(), ()> {
        let mut globals = self.globals.borrow_mut();
        match globals.get_mut(name) {
            Some(global) => {
                global.visibility = visibility;
                Ok(())
            }
            None => Err(()),
        }
    }

    /// Record a visibility change for a global that does not exist yet
    pub fn add_pending_public(&self, name: &str) {
        self.pending_public.borrow_mut().insert(name.to_string());
    }

    /// Consume a pending visibility change for `name`, if one was recorded
    pub fn take_pending_public(&self, name: &str) -> bool {
        self.pending_public.borrow_mut().remove(name)
    }

    /// Snapshot of all global values (GC root scan)
    pub fn global_values(&self) -> Vec<Value> {
        self.globals.borrow().values().map(|g| g.value).collect()
    }

    /// Snapshot of public `(name, value)` pairs, sorted by name
    pub fn public_globals(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .globals
            .borrow()
            .iter()
            .filter(|(_, g)| g.visibility == Visibility::Public)
            .map(|(name, g)| (name.clone(), g.value))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_str_dedup() {
        let module = Module::new("main", "main.ze");
        let a = module.add_static_str("x");
        let b = module.add_static_str("y");
        let c = module.add_static_str("x");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(module.static_str(b).unwrap().as_ref(), "y");
    }

    #[test]
    fn test_global_define_rejects_duplicates() {
        let module = Module::new("main", "main.ze");
        let global = GlobalValue {
            visibility: Visibility::Private,
            value: Value::Int(1),
        };
        assert!(module.define_global("a", global).is_ok());
        assert!(module.define_global("a", global).is_err());
    }

    #[test]
    fn test_set_global_requires_existing() {
        let module = Module::new("main", "main.ze");
        assert!(module.set_global("missing", Value::Empty).is_err());
        module
            .define_global(
                "a",
                GlobalValue {
                    visibility: Visibility::Private,
                    value: Value::Int(1),
                },
            )
            .unwrap();
        assert!(module.set_global("a", Value::Int(2)).is_ok());
        assert_eq!(module.global("a").unwrap().value, Value::Int(2));
    }

    #[test]
    fn test_public_globals_are_sorted_and_filtered() {
        let module = Module::new("main", "main.ze");
        module
            .define_global(
                "b",
                GlobalValue {
                    visibility: Visibility::Public,
                    value: Value::Int(2),
                },
            )
            .unwrap();
        module
            .define_global(
                "hidden",
                GlobalValue {
                    visibility: Visibility::Private,
                    value: Value::Int(0),
                },
            )
            .unwrap();
        module
            .define_global(
                "a",
                GlobalValue {
                    visibility: Visibility::Public,
                    value: Value::Int(1),
                },
            )
            .unwrap();
        let names: Vec<String> = module.public_globals().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}

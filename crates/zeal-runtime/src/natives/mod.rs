//! Native functions and native modules
//!
//! Default native functions are bound under bare names at VM start
//! (`print`, `to_str`, `exit`, ...). Native modules (`os`, `math`,
//! `random`, `time`, `io`, `nbarray`) are initialized lazily through an
//! interpreter-bound registry the first time they are imported. Method
//! access on built-in kinds (`"abc".len`) surfaces entries of the method
//! tables in [`methods`] as native functions bound to their target.

pub mod io;
pub mod math;
pub mod methods;
pub mod nbarray;
pub mod os;
pub mod random;
pub mod time;

use crate::error::RuntimeError;
use crate::value::Value;
use crate::vm::Vm;
use std::collections::HashMap;
use std::rc::Rc;

/// Raw native callable: `(args, bound target, vm) -> value`
pub type RawNativeFn = fn(&[Value], Value, &mut Vm) -> Result<Value, RuntimeError>;

/// A native function binding
pub struct NativeFn {
    pub name: &'static str,
    pub arity: u8,
    pub raw: RawNativeFn,
}

impl std::fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl NativeFn {
    pub fn new(name: &'static str, arity: u8, raw: RawNativeFn) -> Rc<NativeFn> {
        Rc::new(NativeFn { name, arity, raw })
    }
}

/// A symbol exported by a native module
#[derive(Debug, Clone)]
pub enum NativeSym {
    Fn(Rc<NativeFn>),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

/// A built-in module: a name and its symbol table
#[derive(Debug)]
pub struct NativeModule {
    pub name: &'static str,
    symbols: Vec<(&'static str, NativeSym)>,
}

impl NativeModule {
    pub fn new(name: &'static str, symbols: Vec<(&'static str, NativeSym)>) -> Rc<Self> {
        Rc::new(Self { name, symbols })
    }

    /// Look up an exported symbol
    pub fn symbol(&self, name: &str) -> Option<&NativeSym> {
        self.symbols
            .iter()
            .find(|(sym_name, _)| *sym_name == name)
            .map(|(_, sym)| sym)
    }

    /// All exported symbols, in declaration order
    pub fn symbols(&self) -> &[(&'static str, NativeSym)] {
        &self.symbols
    }
}

/// Lazily initialized registry of built-in native modules, owned by one
/// interpreter instance
#[derive(Debug, Default)]
pub struct NativeRegistry {
    modules: HashMap<&'static str, Rc<NativeModule>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a built-in module by name, initializing it on first use.
    /// Unknown names fall through to file resolution.
    pub fn get_or_init(&mut self, name: &str) -> Option<Rc<NativeModule>> {
        let key: &'static str = match name {
            "os" => "os",
            "math" => "math",
            "random" => "random",
            "time" => "time",
            "io" => "io",
            "nbarray" => "nbarray",
            _ => return None,
        };

        if let Some(module) = self.modules.get(key) {
            return Some(module.clone());
        }

        let module = match key {
            "os" => os::build(),
            "math" => math::build(),
            "random" => random::build(),
            "time" => time::build(),
            "io" => io::build(),
            "nbarray" => nbarray::build(),
            _ => unreachable!(),
        };
        self.modules.insert(key, module.clone());
        Some(module)
    }
}

/// The default native functions bound under bare names
pub fn default_native_fns() -> HashMap<&'static str, Rc<NativeFn>> {
    let mut natives: HashMap<&'static str, Rc<NativeFn>> = HashMap::new();
    let mut add = |name: &'static str, arity: u8, raw: RawNativeFn| {
        natives.insert(name, NativeFn::new(name, arity, raw));
    };

    add("exit", 1, native_exit);
    add("assert", 1, native_assert);
    add("assertm", 2, native_assertm);
    add("is_str_int", 1, native_is_str_int);
    add("is_str_float", 1, native_is_str_float);
    add("to_str", 1, native_to_str);
    add("to_json", 1, native_to_json);
    add("to_int", 1, native_to_int);
    add("to_float", 1, native_to_float);
    add("print", 1, native_print);
    add("println", 1, native_println);
    add("eprint", 1, native_eprint);
    add("eprintln", 1, native_eprintln);
    add("print_stack", 0, native_print_stack);
    add("readln", 0, native_readln);
    add("gc", 0, native_gc);
    add("halt", 0, native_halt);

    natives
}

// ===== Argument helpers =====

pub(crate) fn arg_int(
    vm: &Vm,
    args: &[Value],
    index: usize,
    what: &str,
) -> Result<i64, RuntimeError> {
    match args.get(index) {
        Some(Value::Int(value)) => Ok(*value),
        _ => Err(vm.rt_error(format!("expect 'int' as {}", what))),
    }
}

pub(crate) fn arg_str(
    vm: &Vm,
    args: &[Value],
    index: usize,
    what: &str,
) -> Result<Rc<str>, RuntimeError> {
    args.get(index)
        .and_then(|v| v.as_obj())
        .and_then(|obj| vm.heap.str_text(obj))
        .ok_or_else(|| vm.rt_error(format!("expect 'str' as {}", what)))
}

// ===== Default native functions =====

fn native_exit(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let code = arg_int(vm, args, 0, "exit code")?;
    vm.request_halt(code as u8);
    Ok(Value::Empty)
}

fn native_assert(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    match args[0] {
        Value::Bool(true) => Ok(Value::Empty),
        Value::Bool(false) => Err(vm.rt_error("assertion failed".to_string())),
        _ => Err(vm.rt_error("expect 'bool' as assertion value".to_string())),
    }
}

fn native_assertm(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let msg = arg_str(vm, args, 1, "assertion message")?;
    match args[0] {
        Value::Bool(true) => Ok(Value::Empty),
        Value::Bool(false) => Err(vm.rt_error(format!("assertion failed: {}", msg))),
        _ => Err(vm.rt_error("expect 'bool' as assertion value".to_string())),
    }
}

fn native_is_str_int(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = arg_str(vm, args, 0, "value")?;
    Ok(Value::Bool(text.parse::<i64>().is_ok()))
}

fn native_is_str_float(
    args: &[Value],
    _target: Value,
    vm: &mut Vm,
) -> Result<Value, RuntimeError> {
    let text = arg_str(vm, args, 0, "value")?;
    Ok(Value::Bool(text.parse::<f64>().is_ok()))
}

fn native_to_str(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = vm.stringify_value(args[0]);
    vm.alloc_str(&text)
}

fn native_to_json(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = vm.jsonify_value(args[0])?;
    vm.alloc_str(&text)
}

fn native_to_int(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    match args[0] {
        Value::Int(value) => Ok(Value::Int(value)),
        Value::Float(value) => Ok(Value::Int(value as i64)),
        Value::Obj(obj) => {
            let text = vm
                .heap
                .str_text(obj)
                .ok_or_else(|| vm.rt_error("cannot convert value to 'int'".to_string()))?;
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| vm.rt_error(format!("'{}' is not a valid 'int'", text)))
        }
        _ => Err(vm.rt_error("cannot convert value to 'int'".to_string())),
    }
}

fn native_to_float(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    match args[0] {
        Value::Int(value) => Ok(Value::Float(value as f64)),
        Value::Float(value) => Ok(Value::Float(value)),
        Value::Obj(obj) => {
            let text = vm
                .heap
                .str_text(obj)
                .ok_or_else(|| vm.rt_error("cannot convert value to 'float'".to_string()))?;
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| vm.rt_error(format!("'{}' is not a valid 'float'", text)))
        }
        _ => Err(vm.rt_error("cannot convert value to 'float'".to_string())),
    }
}

fn native_print(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = vm.stringify_value(args[0]);
    vm.write_out(&text);
    Ok(Value::Empty)
}

fn native_println(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let mut text = vm.stringify_value(args[0]);
    text.push('\n');
    vm.write_out(&text);
    Ok(Value::Empty)
}

fn native_eprint(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = vm.stringify_value(args[0]);
    vm.write_err(&text);
    Ok(Value::Empty)
}

fn native_eprintln(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let mut text = vm.stringify_value(args[0]);
    text.push('\n');
    vm.write_err(&text);
    Ok(Value::Empty)
}

fn native_print_stack(
    _args: &[Value],
    _target: Value,
    vm: &mut Vm,
) -> Result<Value, RuntimeError> {
    let dump = vm.stack_dump();
    vm.write_err(&dump);
    Ok(Value::Empty)
}

fn native_readln(_args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| vm.rt_error(format!("failed to read line: {}", e)))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    vm.alloc_str(&line)
}

fn native_gc(_args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let freed = vm.run_gc();
    Ok(Value::Int(freed as i64))
}

fn native_halt(_args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    vm.request_halt(0);
    Ok(Value::Empty)
}

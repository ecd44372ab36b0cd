//! The `os` native module

use super::{arg_int, arg_str, NativeFn, NativeModule, NativeSym};
use crate::error::RuntimeError;
use crate::value::Value;
use crate::vm::Vm;
use std::rc::Rc;

pub fn build() -> Rc<NativeModule> {
    NativeModule::new(
        "os",
        vec![
            ("name", NativeSym::Str(std::env::consts::OS)),
            ("arch", NativeSym::Str(std::env::consts::ARCH)),
            ("family", NativeSym::Str(std::env::consts::FAMILY)),
            ("sep", NativeSym::Str(std::path::MAIN_SEPARATOR_STR)),
            ("env", NativeSym::Fn(NativeFn::new("env", 1, os_env))),
            ("exit", NativeSym::Fn(NativeFn::new("exit", 1, os_exit))),
        ],
    )
}

fn os_env(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let name = arg_str(vm, args, 0, "environment variable name")?;
    match std::env::var(name.as_ref()) {
        Ok(value) => vm.alloc_str(&value),
        Err(_) => Ok(Value::Empty),
    }
}

fn os_exit(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let code = arg_int(vm, args, 0, "exit code")?;
    vm.request_halt(code as u8);
    Ok(Value::Empty)
}

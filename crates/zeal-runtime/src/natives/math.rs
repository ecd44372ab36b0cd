//! The `math` native module

use super::{NativeFn, NativeModule, NativeSym};
use crate::error::RuntimeError;
use crate::value::Value;
use crate::vm::Vm;
use std::rc::Rc;

pub fn build() -> Rc<NativeModule> {
    NativeModule::new(
        "math",
        vec![
            ("pi", NativeSym::Float(std::f64::consts::PI)),
            ("e", NativeSym::Float(std::f64::consts::E)),
            ("abs", NativeSym::Fn(NativeFn::new("abs", 1, math_abs))),
            ("floor", NativeSym::Fn(NativeFn::new("floor", 1, math_floor))),
            ("ceil", NativeSym::Fn(NativeFn::new("ceil", 1, math_ceil))),
            ("sqrt", NativeSym::Fn(NativeFn::new("sqrt", 1, math_sqrt))),
            ("pow", NativeSym::Fn(NativeFn::new("pow", 2, math_pow))),
            ("sin", NativeSym::Fn(NativeFn::new("sin", 1, math_sin))),
            ("cos", NativeSym::Fn(NativeFn::new("cos", 1, math_cos))),
            ("tan", NativeSym::Fn(NativeFn::new("tan", 1, math_tan))),
            ("log", NativeSym::Fn(NativeFn::new("log", 1, math_log))),
        ],
    )
}

fn number(vm: &Vm, value: Value, what: &str) -> Result<f64, RuntimeError> {
    match value {
        Value::Int(v) => Ok(v as f64),
        Value::Float(v) => Ok(v),
        _ => Err(vm.rt_error(format!("expect 'int' or 'float' as {}", what))),
    }
}

fn math_abs(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    match args[0] {
        Value::Int(v) => Ok(Value::Int(v.abs())),
        Value::Float(v) => Ok(Value::Float(v.abs())),
        _ => Err(vm.rt_error("expect 'int' or 'float' as value".to_string())),
    }
}

fn math_floor(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number(vm, args[0], "value")?.floor()))
}

fn math_ceil(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number(vm, args[0], "value")?.ceil()))
}

fn math_sqrt(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let value = number(vm, args[0], "value")?;
    if value < 0.0 {
        return Err(vm.rt_error("square root of a negative number".to_string()));
    }
    Ok(Value::Float(value.sqrt()))
}

fn math_pow(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let base = number(vm, args[0], "base")?;
    let exponent = number(vm, args[1], "exponent")?;
    Ok(Value::Float(base.powf(exponent)))
}

fn math_sin(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number(vm, args[0], "value")?.sin()))
}

fn math_cos(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number(vm, args[0], "value")?.cos()))
}

fn math_tan(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    Ok(Value::Float(number(vm, args[0], "value")?.tan()))
}

fn math_log(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let value = number(vm, args[0], "value")?;
    if value <= 0.0 {
        return Err(vm.rt_error("logarithm of a non-positive number".to_string()));
    }
    Ok(Value::Float(value.ln()))
}

//! The `nbarray` native module: fixed byte arrays
//!
//! Reads and writes go through `INDEX`/`ASET` like any other indexable;
//! this module only provides construction and whole-array operations.

use super::{arg_int, NativeFn, NativeModule, NativeSym};
use crate::error::RuntimeError;
use crate::heap::{NativeBody, NativeData, ObjBody};
use crate::value::Value;
use crate::vm::Vm;
use std::rc::Rc;

pub fn build() -> Rc<NativeModule> {
    NativeModule::new(
        "nbarray",
        vec![
            ("create", NativeSym::Fn(NativeFn::new("create", 1, nbarray_create))),
            ("clone", NativeSym::Fn(NativeFn::new("clone", 1, nbarray_clone))),
            ("len", NativeSym::Fn(NativeFn::new("len", 1, nbarray_len))),
            ("to_str", NativeSym::Fn(NativeFn::new("to_str", 1, nbarray_to_str))),
        ],
    )
}

fn bytes_of(vm: &Vm, value: Value) -> Result<Vec<u8>, RuntimeError> {
    value
        .as_obj()
        .and_then(|obj| match vm.heap.get(obj) {
            ObjBody::Native(NativeBody {
                data: NativeData::Bytes(bytes),
                ..
            }) => Some(bytes.clone()),
            _ => None,
        })
        .ok_or_else(|| vm.rt_error("expect byte array as argument".to_string()))
}

fn alloc_bytes(vm: &mut Vm, bytes: Vec<u8>) -> Result<Value, RuntimeError> {
    let obj = vm.alloc(ObjBody::Native(NativeBody {
        name: "nbarray",
        data: NativeData::Bytes(bytes),
    }))?;
    Ok(Value::Obj(obj))
}

fn nbarray_create(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let len = arg_int(vm, args, 0, "length")?;
    if len < 0 {
        return Err(vm.rt_error("expect a non-negative length".to_string()));
    }
    alloc_bytes(vm, vec![0u8; len as usize])
}

fn nbarray_clone(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let bytes = bytes_of(vm, args[0])?;
    alloc_bytes(vm, bytes)
}

fn nbarray_len(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let bytes = bytes_of(vm, args[0])?;
    Ok(Value::Int(bytes.len() as i64))
}

fn nbarray_to_str(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let bytes = bytes_of(vm, args[0])?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    vm.alloc_str(&text)
}

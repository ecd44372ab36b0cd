//! The `random` native module
//!
//! Generators are native objects owned by the heap; the destroy hook runs
//! at sweep like any other native resource.

use super::{arg_int, NativeFn, NativeModule, NativeSym};
use crate::error::RuntimeError;
use crate::heap::{NativeBody, NativeData, ObjBody};
use crate::value::Value;
use crate::vm::Vm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;

pub fn build() -> Rc<NativeModule> {
    NativeModule::new(
        "random",
        vec![
            ("create", NativeSym::Fn(NativeFn::new("create", 0, random_create))),
            (
                "create_seed",
                NativeSym::Fn(NativeFn::new("create_seed", 1, random_create_seed)),
            ),
            ("next", NativeSym::Fn(NativeFn::new("next", 1, random_next))),
            (
                "next_between",
                NativeSym::Fn(NativeFn::new("next_between", 3, random_next_between)),
            ),
            (
                "next_float",
                NativeSym::Fn(NativeFn::new("next_float", 1, random_next_float)),
            ),
        ],
    )
}

fn alloc_generator(vm: &mut Vm, rng: StdRng) -> Result<Value, RuntimeError> {
    let obj = vm.alloc(ObjBody::Native(NativeBody {
        name: "generator",
        data: NativeData::Rng(rng),
    }))?;
    Ok(Value::Obj(obj))
}

fn generator<'vm>(vm: &'vm mut Vm, value: Value) -> Result<&'vm mut StdRng, RuntimeError> {
    let err = vm.rt_error("expect random generator as argument".to_string());
    let Some(obj) = value.as_obj() else {
        return Err(err);
    };
    match vm.heap.get_mut(obj) {
        ObjBody::Native(NativeBody {
            data: NativeData::Rng(rng),
            ..
        }) => Ok(rng),
        _ => Err(err),
    }
}

fn random_create(_args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    alloc_generator(vm, StdRng::from_os_rng())
}

fn random_create_seed(
    args: &[Value],
    _target: Value,
    vm: &mut Vm,
) -> Result<Value, RuntimeError> {
    let seed = arg_int(vm, args, 0, "seed")?;
    alloc_generator(vm, StdRng::seed_from_u64(seed as u64))
}

fn random_next(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let rng = generator(vm, args[0])?;
    Ok(Value::Int(rng.random::<i64>()))
}

fn random_next_between(
    args: &[Value],
    _target: Value,
    vm: &mut Vm,
) -> Result<Value, RuntimeError> {
    let low = arg_int(vm, args, 1, "lower bound")?;
    let high = arg_int(vm, args, 2, "upper bound")?;
    if low > high {
        return Err(vm.rt_error("lower bound greater than upper bound".to_string()));
    }
    let rng = generator(vm, args[0])?;
    Ok(Value::Int(rng.random_range(low..=high)))
}

fn random_next_float(args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let rng = generator(vm, args[0])?;
    Ok(Value::Float(rng.random::<f64>()))
}

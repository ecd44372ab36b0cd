//! The `time` native module

use super::{NativeFn, NativeModule, NativeSym};
use crate::error::RuntimeError;
use crate::value::Value;
use crate::vm::Vm;
use chrono::Utc;
use std::rc::Rc;

pub fn build() -> Rc<NativeModule> {
    NativeModule::new(
        "time",
        vec![
            ("millis", NativeSym::Fn(NativeFn::new("millis", 0, time_millis))),
            ("secs", NativeSym::Fn(NativeFn::new("secs", 0, time_secs))),
            ("now_str", NativeSym::Fn(NativeFn::new("now_str", 0, time_now_str))),
        ],
    )
}

fn time_millis(_args: &[Value], _target: Value, _vm: &mut Vm) -> Result<Value, RuntimeError> {
    Ok(Value::Int(Utc::now().timestamp_millis()))
}

fn time_secs(_args: &[Value], _target: Value, _vm: &mut Vm) -> Result<Value, RuntimeError> {
    Ok(Value::Int(Utc::now().timestamp()))
}

fn time_now_str(_args: &[Value], _target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    vm.alloc_str(&Utc::now().to_rfc3339())
}

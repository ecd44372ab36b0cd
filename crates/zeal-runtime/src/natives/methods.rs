//! Method tables for the built-in kinds
//!
//! `ACCESS` on a str/array/list/dict value resolves here; each hit wraps
//! the raw callable in a fresh native function bound to the accessed
//! target.

use super::{arg_int, arg_str, NativeFn};
use crate::error::RuntimeError;
use crate::heap::ObjBody;
use crate::value::{DictKey, ObjRef, Value};
use crate::vm::Vm;
use std::rc::Rc;

/// Methods on strings
pub fn str_method(name: &str) -> Option<Rc<NativeFn>> {
    let native = match name {
        "len" => NativeFn::new("len", 0, str_len),
        "char_at" => NativeFn::new("char_at", 1, str_char_at),
        "sub_str" => NativeFn::new("sub_str", 2, str_sub_str),
        "upper" => NativeFn::new("upper", 0, str_upper),
        "lower" => NativeFn::new("lower", 0, str_lower),
        "split" => NativeFn::new("split", 1, str_split),
        "is_int" => NativeFn::new("is_int", 0, str_is_int),
        "is_float" => NativeFn::new("is_float", 0, str_is_float),
        _ => return None,
    };
    Some(native)
}

/// Methods on arrays
pub fn array_method(name: &str) -> Option<Rc<NativeFn>> {
    let native = match name {
        "len" => NativeFn::new("len", 0, array_len),
        "first" => NativeFn::new("first", 0, array_first),
        "last" => NativeFn::new("last", 0, array_last),
        "join" => NativeFn::new("join", 1, array_join),
        _ => return None,
    };
    Some(native)
}

/// Methods on lists
pub fn list_method(name: &str) -> Option<Rc<NativeFn>> {
    let native = match name {
        "len" => NativeFn::new("len", 0, list_len),
        "insert" => NativeFn::new("insert", 1, list_insert),
        "insert_at" => NativeFn::new("insert_at", 2, list_insert_at),
        "remove_at" => NativeFn::new("remove_at", 1, list_remove_at),
        "clear" => NativeFn::new("clear", 0, list_clear),
        "join" => NativeFn::new("join", 1, list_join),
        _ => return None,
    };
    Some(native)
}

/// Methods on dicts
pub fn dict_method(name: &str) -> Option<Rc<NativeFn>> {
    let native = match name {
        "len" => NativeFn::new("len", 0, dict_len),
        "contains" => NativeFn::new("contains", 1, dict_contains),
        "remove" => NativeFn::new("remove", 1, dict_remove),
        "keys" => NativeFn::new("keys", 0, dict_keys),
        _ => return None,
    };
    Some(native)
}

// ===== Target helpers =====

fn target_str(vm: &Vm, target: Value) -> Result<Rc<str>, RuntimeError> {
    target
        .as_obj()
        .and_then(|obj| vm.heap.str_text(obj))
        .ok_or_else(|| vm.rt_error("expect 'str' as method target".to_string()))
}

fn target_obj(vm: &Vm, target: Value, what: &str) -> Result<ObjRef, RuntimeError> {
    target
        .as_obj()
        .ok_or_else(|| vm.rt_error(format!("expect '{}' as method target", what)))
}

fn values_of(vm: &Vm, target: Value, what: &str) -> Result<Vec<Value>, RuntimeError> {
    let obj = target_obj(vm, target, what)?;
    match vm.heap.get(obj) {
        ObjBody::Array(values) | ObjBody::List(values) => Ok(values.clone()),
        _ => Err(vm.rt_error(format!("expect '{}' as method target", what))),
    }
}

fn join_values(vm: &mut Vm, values: &[Value], separator: &str) -> Result<Value, RuntimeError> {
    let mut out = String::new();
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            out.push_str(separator);
        }
        out.push_str(&vm.stringify_value(*value));
    }
    vm.alloc_str(&out)
}

// ===== str =====

fn str_len(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = target_str(vm, target)?;
    Ok(Value::Int(text.chars().count() as i64))
}

fn str_char_at(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let index = arg_int(vm, args, 0, "index")?;
    let text = target_str(vm, target)?;
    let c = text
        .chars()
        .nth(index.max(0) as usize)
        .filter(|_| index >= 0)
        .ok_or_else(|| vm.rt_error("index out of bounds".to_string()))?;
    vm.alloc_str(&c.to_string())
}

fn str_sub_str(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let from = arg_int(vm, args, 0, "start index")?;
    let to = arg_int(vm, args, 1, "end index")?;
    let text = target_str(vm, target)?;
    let chars: Vec<char> = text.chars().collect();

    if from < 0 || to < from || to as usize >= chars.len() {
        return Err(vm.rt_error("illegal sub string bounds".to_string()));
    }

    let sub: String = chars[from as usize..=to as usize].iter().collect();
    vm.alloc_str(&sub)
}

fn str_upper(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = target_str(vm, target)?;
    vm.alloc_str(&text.to_uppercase())
}

fn str_lower(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = target_str(vm, target)?;
    vm.alloc_str(&text.to_lowercase())
}

fn str_split(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let separator = arg_str(vm, args, 0, "separator")?;
    let text = target_str(vm, target)?;

    // Protect each part: only the Rust-side vector references them until
    // the list exists
    let mut parts = Vec::new();
    for part in text.split(separator.as_ref()) {
        let value = vm.alloc_str(part)?;
        vm.protect(value);
        parts.push(value);
    }

    let count = parts.len();
    let list = vm.alloc(ObjBody::List(parts));
    vm.unprotect(count);
    Ok(Value::Obj(list?))
}

fn str_is_int(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = target_str(vm, target)?;
    Ok(Value::Bool(text.parse::<i64>().is_ok()))
}

fn str_is_float(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let text = target_str(vm, target)?;
    Ok(Value::Bool(text.parse::<f64>().is_ok()))
}

// ===== array =====

fn array_len(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let values = values_of(vm, target, "array")?;
    Ok(Value::Int(values.len() as i64))
}

fn array_first(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let values = values_of(vm, target, "array")?;
    Ok(values.first().copied().unwrap_or(Value::Empty))
}

fn array_last(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let values = values_of(vm, target, "array")?;
    Ok(values.last().copied().unwrap_or(Value::Empty))
}

fn array_join(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let separator = arg_str(vm, args, 0, "separator")?;
    let values = values_of(vm, target, "array")?;
    join_values(vm, &values, &separator)
}

// ===== list =====

fn list_target(vm: &Vm, target: Value) -> Result<ObjRef, RuntimeError> {
    let obj = target_obj(vm, target, "list")?;
    match vm.heap.get(obj) {
        ObjBody::List(_) => Ok(obj),
        _ => Err(vm.rt_error("expect 'list' as method target".to_string())),
    }
}

fn list_len(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let values = values_of(vm, target, "list")?;
    Ok(Value::Int(values.len() as i64))
}

fn list_insert(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let obj = list_target(vm, target)?;
    if let ObjBody::List(items) = vm.heap.get_mut(obj) {
        items.push(args[0]);
    }
    vm.heap.remeasure(obj);
    Ok(Value::Empty)
}

fn list_insert_at(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let index = arg_int(vm, args, 0, "index")?;
    let obj = list_target(vm, target)?;

    let len = match vm.heap.get(obj) {
        ObjBody::List(items) => items.len(),
        _ => unreachable!(),
    };
    if index < 0 || index as usize > len {
        return Err(vm.rt_error("index out of bounds".to_string()));
    }

    if let ObjBody::List(items) = vm.heap.get_mut(obj) {
        items.insert(index as usize, args[1]);
    }
    vm.heap.remeasure(obj);
    Ok(Value::Empty)
}

fn list_remove_at(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let index = arg_int(vm, args, 0, "index")?;
    let obj = list_target(vm, target)?;

    let len = match vm.heap.get(obj) {
        ObjBody::List(items) => items.len(),
        _ => unreachable!(),
    };
    if index < 0 || index as usize >= len {
        return Err(vm.rt_error("index out of bounds".to_string()));
    }

    let removed = match vm.heap.get_mut(obj) {
        ObjBody::List(items) => items.remove(index as usize),
        _ => unreachable!(),
    };
    vm.heap.remeasure(obj);
    Ok(removed)
}

fn list_clear(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let obj = list_target(vm, target)?;
    if let ObjBody::List(items) = vm.heap.get_mut(obj) {
        items.clear();
    }
    vm.heap.remeasure(obj);
    Ok(Value::Empty)
}

fn list_join(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let separator = arg_str(vm, args, 0, "separator")?;
    let values = values_of(vm, target, "list")?;
    join_values(vm, &values, &separator)
}

// ===== dict =====

fn dict_target(vm: &Vm, target: Value) -> Result<ObjRef, RuntimeError> {
    let obj = target_obj(vm, target, "dict")?;
    match vm.heap.get(obj) {
        ObjBody::Dict(_) => Ok(obj),
        _ => Err(vm.rt_error("expect 'dict' as method target".to_string())),
    }
}

fn dict_len(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let obj = dict_target(vm, target)?;
    let len = match vm.heap.get(obj) {
        ObjBody::Dict(entries) => entries.len(),
        _ => unreachable!(),
    };
    Ok(Value::Int(len as i64))
}

fn dict_contains(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let obj = dict_target(vm, target)?;
    let contains = match vm.heap.get(obj) {
        ObjBody::Dict(entries) => entries.contains_key(&DictKey(args[0])),
        _ => unreachable!(),
    };
    Ok(Value::Bool(contains))
}

fn dict_remove(args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let obj = dict_target(vm, target)?;
    let removed = match vm.heap.get_mut(obj) {
        ObjBody::Dict(entries) => entries.remove(&DictKey(args[0])),
        _ => unreachable!(),
    };
    vm.heap.remeasure(obj);
    Ok(removed.unwrap_or(Value::Empty))
}

fn dict_keys(_args: &[Value], target: Value, vm: &mut Vm) -> Result<Value, RuntimeError> {
    let obj = dict_target(vm, target)?;
    let keys: Vec<Value> = match vm.heap.get(obj) {
        ObjBody::Dict(entries) => entries.keys().map(|k| k.0).collect(),
        _ => unreachable!(),
    };
    let list = vm.alloc(ObjBody::List(keys))?;
    Ok(Value::Obj(list))
}

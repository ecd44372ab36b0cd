//! Value rendering
//!
//! The standard stringifier is cycle-aware: a visited chain rides the spine
//! of the recursion and back-edges render as `...`. The JSON renderer
//! mirrors the traversal but fails explicitly on cycles and on kinds with
//! no JSON counterpart.

use super::Vm;
use crate::error::RuntimeError;
use crate::heap::{Heap, ObjBody};
use crate::natives::NativeSym;
use crate::value::{ObjRef, Value};

impl Vm {
    /// Render a value with the standard stringifier
    pub fn stringify_value(&self, value: Value) -> String {
        let mut out = String::new();
        let mut visited = Vec::new();
        value_to_str(&self.heap, value, &mut visited, &mut out);
        out
    }

    /// Render a value as JSON; cycles and non-data kinds are errors
    pub fn jsonify_value(&self, value: Value) -> Result<String, RuntimeError> {
        let mut visited = Vec::new();
        let json = value_to_json(&self.heap, value, &mut visited)
            .map_err(|msg| self.rt_error(msg))?;
        serde_json::to_string(&json).map_err(|e| self.rt_error(format!("json error: {}", e)))
    }
}

fn value_to_str(heap: &Heap, value: Value, visited: &mut Vec<ObjRef>, out: &mut String) {
    match value {
        Value::Empty => out.push_str("empty"),
        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format!("{:.6}", f)),
        Value::Obj(obj) => {
            if visited.contains(&obj) {
                out.push_str("...");
                return;
            }
            visited.push(obj);
            obj_to_str(heap, obj, visited, out);
            visited.pop();
        }
    }
}

/// Strings nested inside containers render single-quoted
fn quoted_to_str(heap: &Heap, value: Value, visited: &mut Vec<ObjRef>, out: &mut String) {
    let is_str = value
        .as_obj()
        .map(|obj| matches!(heap.get(obj), ObjBody::Str(_)))
        .unwrap_or(false);
    if is_str {
        out.push('\'');
        value_to_str(heap, value, visited, out);
        out.push('\'');
    } else {
        value_to_str(heap, value, visited, out);
    }
}

fn obj_to_str(heap: &Heap, obj: ObjRef, visited: &mut Vec<ObjRef>, out: &mut String) {
    match heap.get(obj) {
        ObjBody::Str(body) => out.push_str(&body.text),
        ObjBody::Array(values) => {
            out.push('[');
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                quoted_to_str(heap, *value, visited, out);
            }
            out.push(']');
        }
        ObjBody::List(values) => {
            out.push('(');
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                quoted_to_str(heap, *value, visited, out);
            }
            out.push(')');
        }
        ObjBody::Dict(entries) => {
            out.push('{');
            for (index, (key, value)) in entries.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                quoted_to_str(heap, key.0, visited, out);
                out.push_str(": ");
                quoted_to_str(heap, *value, visited, out);
            }
            out.push('}');
        }
        ObjBody::Record(record) => {
            out.push('{');
            let mut names: Vec<&String> = record.attrs.keys().collect();
            names.sort();
            for (index, name) in names.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push_str(": ");
                quoted_to_str(heap, record.attrs[*name], visited, out);
            }
            out.push('}');
        }
        ObjBody::Native(native) => {
            out.push_str(&format!("<native '{}'>", native.name));
        }
        ObjBody::NativeFn(body) => {
            out.push_str(&format!(
                "<native function '{}' {}>",
                body.native.name, body.native.arity
            ));
        }
        ObjBody::Proc(proc) => {
            out.push_str(&format!("<function '{}' {}>", proc.name, proc.arity));
        }
        ObjBody::Closure(closure) => {
            out.push_str(&format!("<closure '{}'>", closure.meta.proc.name));
        }
        ObjBody::NativeModule(module) => {
            out.push('{');
            for (index, (name, sym)) in module.symbols().iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push_str(": ");
                match sym {
                    NativeSym::Fn(native) => out.push_str(&format!(
                        "<native function '{}' {}>",
                        native.name, native.arity
                    )),
                    NativeSym::Int(value) => out.push_str(&value.to_string()),
                    NativeSym::Float(value) => out.push_str(&format!("{:.6}", value)),
                    NativeSym::Str(value) => out.push_str(&format!("'{}'", value)),
                }
            }
            out.push('}');
        }
        ObjBody::Module(module) => {
            out.push('{');
            for (index, (name, value)) in module.public_globals().iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push_str(": ");
                value_to_str(heap, *value, visited, out);
            }
            out.push('}');
        }
    }
}

fn value_to_json(
    heap: &Heap,
    value: Value,
    visited: &mut Vec<ObjRef>,
) -> Result<serde_json::Value, String> {
    let json = match value {
        Value::Empty => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(b),
        Value::Int(i) => serde_json::Value::Number(i.into()),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .ok_or("non-finite float cannot be rendered as JSON")?,
        Value::Obj(obj) => {
            if visited.contains(&obj) {
                return Err("cyclic value cannot be rendered as JSON".to_string());
            }
            visited.push(obj);
            let json = obj_to_json(heap, obj, visited)?;
            visited.pop();
            json
        }
    };
    Ok(json)
}

fn obj_to_json(
    heap: &Heap,
    obj: ObjRef,
    visited: &mut Vec<ObjRef>,
) -> Result<serde_json::Value, String> {
    let json = match heap.get(obj) {
        ObjBody::Str(body) => serde_json::Value::String(body.text.to_string()),
        ObjBody::Array(values) | ObjBody::List(values) => {
            let mut items = Vec::with_capacity(values.len());
            for value in values.clone() {
                items.push(value_to_json(heap, value, visited)?);
            }
            serde_json::Value::Array(items)
        }
        ObjBody::Dict(entries) => {
            let mut object = serde_json::Map::new();
            for (key, value) in entries.clone() {
                let key_text = match key.0.as_obj().map(|k| heap.get(k)) {
                    Some(ObjBody::Str(body)) => body.text.to_string(),
                    _ => {
                        let mut out = String::new();
                        value_to_str(heap, key.0, &mut Vec::new(), &mut out);
                        out
                    }
                };
                object.insert(key_text, value_to_json(heap, value, visited)?);
            }
            serde_json::Value::Object(object)
        }
        ObjBody::Record(record) => {
            let mut object = serde_json::Map::new();
            let mut names: Vec<String> = record.attrs.keys().cloned().collect();
            names.sort();
            for name in names {
                let value = record.attrs[&name];
                object.insert(name, value_to_json(heap, value, visited)?);
            }
            serde_json::Value::Object(object)
        }
        other => {
            return Err(format!(
                "value of kind '{}' cannot be rendered as JSON",
                other.kind_name()
            ));
        }
    };
    Ok(json)
}

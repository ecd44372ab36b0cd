//! Runtime value representation
//!
//! A value is either a primitive or a handle into the garbage-collected
//! object heap. Primitives compare by contents; strings compare by interned
//! identity (equal contents always share one heap object); every other
//! object compares by heap identity.

use ordered_float::OrderedFloat;
use std::hash::{Hash, Hasher};

/// Handle to an object in the heap slab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub u32);

/// Runtime value type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// The absent value
    Empty,
    /// Boolean value
    Bool(bool),
    /// 64-bit integer value
    Int(i64),
    /// 64-bit float value
    Float(f64),
    /// Handle to a heap object
    Obj(ObjRef),
}

impl Value {
    /// Whether this value holds a heap object
    pub fn is_obj(&self) -> bool {
        matches!(self, Value::Obj(_))
    }

    /// The object handle, if any
    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(obj) => Some(*obj),
            _ => None,
        }
    }

    /// The integer contents, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The boolean contents, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the value's primitive type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Obj(_) => "object",
        }
    }
}

/// Dict key wrapper
///
/// Keys hash by primitive contents; object keys hash by identity, which is
/// content hashing for strings since all strings are interned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictKey(pub Value);

impl Eq for DictKey {}

impl Hash for DictKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.0 {
            Value::Empty => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => {
                3u8.hash(state);
                OrderedFloat(f).hash(state);
            }
            Value::Obj(obj) => {
                4u8.hash(state);
                obj.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_primitive_equality() {
        assert_eq!(Value::Int(42), Value::Int(42));
        assert_ne!(Value::Int(42), Value::Float(42.0));
        assert_eq!(Value::Empty, Value::Empty);
    }

    #[test]
    fn test_object_identity() {
        assert_eq!(Value::Obj(ObjRef(3)), Value::Obj(ObjRef(3)));
        assert_ne!(Value::Obj(ObjRef(3)), Value::Obj(ObjRef(4)));
    }

    #[test]
    fn test_dict_key_hashing() {
        let mut map = HashMap::new();
        map.insert(DictKey(Value::Int(1)), Value::Bool(true));
        map.insert(DictKey(Value::Float(2.5)), Value::Bool(false));
        assert_eq!(map.get(&DictKey(Value::Int(1))), Some(&Value::Bool(true)));
        assert_eq!(
            map.get(&DictKey(Value::Float(2.5))),
            Some(&Value::Bool(false))
        );
        assert_eq!(map.get(&DictKey(Value::Int(2))), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Empty.type_name(), "empty");
        assert_eq!(Value::Float(1.0).type_name(), "float");
    }
}

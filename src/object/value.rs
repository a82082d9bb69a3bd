//! The `Value` type: primitives inline, everything else by object handle.

use std::fmt;

use super::class::{ClassId, BOOL_CLASS, INTERNAL_NULL_CLASS, NONE_CLASS, NUM_CLASS};

/// A handle to an object.
///
/// `Const` objects are created by the compiler, live for the whole program
/// and are never collected. `Heap` objects are created at run time; the
/// generation detects use of a slot that was swept and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjRef {
    Const(u32),
    Heap { index: u32, generation: u32 },
}

impl ObjRef {
    pub fn is_const(self) -> bool {
        matches!(self, ObjRef::Const(_))
    }
}

/// A runtime value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Lookup sentinel: "no value here". Never stored in user-visible state.
    InternalNull,
    None,
    Bool(bool),
    Number(f64),
    Object(ObjRef),
}

impl Value {
    pub fn is_internal_null(&self) -> bool {
        matches!(self, Value::InternalNull)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(r) => Some(*r),
            _ => None,
        }
    }

    /// Class of an inline value; `None` for objects, whose class lives in the heap.
    pub fn primitive_class(&self) -> Option<ClassId> {
        match self {
            Value::InternalNull => Some(INTERNAL_NULL_CLASS),
            Value::None => Some(NONE_CLASS),
            Value::Bool(_) => Some(BOOL_CLASS),
            Value::Number(_) => Some(NUM_CLASS),
            Value::Object(_) => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Object(r)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::InternalNull => write!(f, "NULL"),
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Object(ObjRef::Const(i)) => write!(f, "<const {}>", i),
            Value::Object(ObjRef::Heap { index, .. }) => write!(f, "<object {}>", index),
        }
    }
}

/// Numbers within 1e-9 of an integer print without decimals; others with ten.
pub fn format_number(n: f64) -> String {
    if (n - n.round()).abs() < 1e-9 && n.abs() < 1e15 {
        format!("{}", n.round() as i64)
    } else {
        format!("{:.10}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.0000000000001), "2");
        assert_eq!(format_number(0.5), "0.5000000000");
    }

    #[test]
    fn test_primitive_classes() {
        assert_eq!(Value::Number(1.0).primitive_class(), Some(NUM_CLASS));
        assert_eq!(Value::None.primitive_class(), Some(NONE_CLASS));
        assert_eq!(Value::Object(ObjRef::Const(0)).primitive_class(), None);
    }
}

//! Callable records: compiled bodies and native functions.

use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::vm::Vm;

use super::value::Value;

/// Index of a compiled body in the program's chunk list.
pub type ChunkId = usize;

/// Signature of a host function: `(vm, self, args) -> result`.
///
/// `self` is `Value::InternalNull` for functions. Returning
/// `Value::InternalNull` means "no result".
pub type NativeFn = fn(&mut Vm, Value, &[Value]) -> Result<Value, RuntimeError>;

/// Number of inputs a callable accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u8),
    Variadic,
}

impl Arity {
    pub fn accepts(self, argc: usize) -> bool {
        match self {
            Arity::Fixed(n) => n as usize == argc,
            Arity::Variadic => true,
        }
    }

    /// Arity from the `in` count of a native record, where `-1` means variadic.
    pub fn from_count(count: i32) -> Self {
        u8::try_from(count).map_or(Arity::Variadic, Arity::Fixed)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Variadic => write!(f, "-1"),
        }
    }
}

/// Methods receive `self` in local slot 0; functions do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Function,
    Method,
}

#[derive(Clone, Copy)]
pub enum CallableBody {
    Native(NativeFn),
    Chunk(ChunkId),
}

impl fmt::Debug for CallableBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallableBody::Native(_) => write!(f, "Native"),
            CallableBody::Chunk(id) => write!(f, "Chunk({})", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Callable {
    pub name: Rc<str>,
    pub arity: Arity,
    /// Whether the callable produces a value (out-arity 1).
    pub returns: bool,
    pub kind: CallableKind,
    pub body: CallableBody,
}

impl Callable {
    pub fn native(
        name: impl Into<Rc<str>>,
        arity: Arity,
        returns: bool,
        kind: CallableKind,
        func: NativeFn,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            returns,
            kind,
            body: CallableBody::Native(func),
        }
    }

    pub fn compiled(
        name: impl Into<Rc<str>>,
        arity: u8,
        returns: bool,
        kind: CallableKind,
        chunk: ChunkId,
    ) -> Self {
        Self {
            name: name.into(),
            arity: Arity::Fixed(arity),
            returns,
            kind,
            body: CallableBody::Chunk(chunk),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, CallableBody::Native(_))
    }

    pub fn is_method(&self) -> bool {
        self.kind == CallableKind::Method
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_accepts() {
        assert!(Arity::Fixed(2).accepts(2));
        assert!(!Arity::Fixed(2).accepts(3));
        assert!(Arity::Variadic.accepts(0));
        assert!(Arity::Variadic.accepts(200));
    }

    #[test]
    fn test_arity_from_count() {
        assert_eq!(Arity::from_count(-1), Arity::Variadic);
        assert_eq!(Arity::from_count(3), Arity::Fixed(3));
    }
}

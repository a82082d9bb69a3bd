//! Object model: values, heap objects, classes and callables.

pub mod callable;
pub mod class;
pub mod heap;
pub mod value;

use std::rc::Rc;

use crate::runtime::dict::ValueDict;

pub use callable::{Arity, Callable, CallableBody, CallableKind, ChunkId, NativeFn};
pub use class::{AttrMap, Class, ClassId, ClassTable};
pub use heap::{GcStats, Heap};
pub use value::{ObjRef, Value};

use class::{CALLABLE_CLASS, DICT_CLASS, LIST_CLASS, SET_CLASS, STR_CLASS};

/// A heap object: its class plus a payload.
#[derive(Debug, Clone)]
pub struct Object {
    pub class: ClassId,
    pub data: ObjectData,
}

#[derive(Debug, Clone)]
pub enum ObjectData {
    Str(Rc<str>),
    Callable(Rc<Callable>),
    List(Vec<Value>),
    Dict(ValueDict),
    /// A dict whose values are all `none`.
    Set(ValueDict),
    /// Attributes assigned on a user-class instance.
    Instance(AttrMap),
}

impl Object {
    pub fn new(class: ClassId, data: ObjectData) -> Self {
        Self { class, data }
    }

    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::new(STR_CLASS, ObjectData::Str(s.into()))
    }

    pub fn callable(callable: Callable) -> Self {
        Self::new(CALLABLE_CLASS, ObjectData::Callable(Rc::new(callable)))
    }

    /// The empty payload a freshly instantiated object of `class` starts with.
    pub fn instance_of(class: ClassId) -> Self {
        let data = match class {
            LIST_CLASS => ObjectData::List(Vec::new()),
            DICT_CLASS => ObjectData::Dict(ValueDict::new()),
            SET_CLASS => ObjectData::Set(ValueDict::new()),
            _ => ObjectData::Instance(AttrMap::default()),
        };
        Self::new(class, data)
    }

    pub fn as_str(&self) -> Option<&Rc<str>> {
        match &self.data {
            ObjectData::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Rc<Callable>> {
        match &self.data {
            ObjectData::Callable(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_payloads() {
        assert!(matches!(Object::instance_of(LIST_CLASS).data, ObjectData::List(_)));
        assert!(matches!(Object::instance_of(SET_CLASS).data, ObjectData::Set(_)));
        assert!(matches!(Object::instance_of(42).data, ObjectData::Instance(_)));
    }
}

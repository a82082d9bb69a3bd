//! The output of compilation: everything the VM needs to run a program.

use std::rc::Rc;

use crate::lexer::SourceMap;
use crate::object::{Callable, ClassTable, Heap, ObjectData, Value};

use super::chunk::Chunk;

#[derive(Debug)]
pub struct Program {
    /// Every compiled body, indexed by `ChunkId`.
    pub chunks: Vec<Chunk>,
    pub classes: ClassTable,
    /// Holds the compile-time objects (strings, callables) in its const arena.
    pub heap: Heap,
    /// Compacted global slot array with its initial values.
    pub globals: Vec<Value>,
    /// Name of each compacted global slot.
    pub global_names: Vec<Rc<str>>,
    /// Prelinked function table, indexed by `ExecFunction::function`.
    pub functions: Vec<Value>,
    pub main: Value,
    /// Whether `main` takes the `inArgs` list.
    pub main_takes_args: bool,
    pub sources: SourceMap,
}

impl Program {
    /// The callable record behind a callable value.
    pub fn callable(&self, value: Value) -> Option<&Rc<Callable>> {
        let r = value.as_object()?;
        match &self.heap.get(r)?.data {
            ObjectData::Callable(c) => Some(c),
            _ => None,
        }
    }

    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }
}

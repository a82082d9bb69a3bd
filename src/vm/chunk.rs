//! Compiled bodies: instructions, source locations and a constant pool.

use std::rc::Rc;

use crate::object::Value;
use crate::span::Span;

use super::encoding::{self, EncodingError};
use super::opcode::Op;

/// One compiled function, method or initializer body.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Name of the callable, for tracebacks and disassembly.
    pub name: Rc<str>,
    /// The bytecode instructions.
    pub code: Vec<Op>,
    /// Source location of each instruction, parallel to `code`.
    pub spans: Vec<Span>,
    /// Constant pool, deduplicated by value.
    pub constants: Vec<Value>,
    /// Size of the local slot window a frame of this chunk needs.
    pub locals_count: u16,
    /// Name of each local slot, filled in when the body is finalized.
    pub local_names: Vec<Rc<str>>,
}

impl Chunk {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Emit an instruction and record its source location.
    pub fn emit(&mut self, op: Op, span: Span) -> usize {
        let offset = self.code.len();
        self.code.push(op);
        self.spans.push(span);
        offset
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn last(&self) -> Option<&Op> {
        self.code.last()
    }

    /// Remove and return the last instruction.
    pub fn pop(&mut self) -> Option<(Op, Span)> {
        let op = self.code.pop()?;
        let span = self.spans.pop().unwrap_or_default();
        Some((op, span))
    }

    /// Remove the instruction at `index`, shifting the rest down.
    pub fn remove(&mut self, index: usize) -> Op {
        self.spans.remove(index);
        self.code.remove(index)
    }

    /// Index of `value` in the pool, adding it if absent. The flag reports
    /// whether the entry was newly added.
    pub fn add_constant(&mut self, value: Value) -> (usize, bool) {
        if let Some(idx) = self.constants.iter().position(|c| same_constant(*c, value)) {
            return (idx, false);
        }
        self.constants.push(value);
        (self.constants.len() - 1, true)
    }

    /// Point the jump at `index` to the current end of the code.
    pub fn patch_jump(&mut self, index: usize) {
        let target = self.code.len() as i32;
        if let Some(t) = self.code.get_mut(index).and_then(Op::jump_target_mut) {
            *t = target;
        }
    }

    /// Cut everything from `from` onwards out of the chunk.
    pub fn crop(&mut self, from: usize) -> (Vec<Op>, Vec<Span>) {
        (self.code.split_off(from), self.spans.split_off(from))
    }

    /// Append instructions cut by [`crop`](Self::crop) at `origin`,
    /// relocating absolute jump targets that pointed into the cut region.
    pub fn splice(&mut self, origin: usize, code: Vec<Op>, spans: Vec<Span>) {
        let shift = self.code.len() as i32 - origin as i32;
        for mut op in code {
            if let Some(t) = op.jump_target_mut() {
                if *t >= origin as i32 {
                    *t += shift;
                }
            }
            self.code.push(op);
        }
        self.spans.extend(spans);
    }

    /// Pack every instruction into a 64-bit word.
    pub fn encode(&self) -> Result<Vec<u64>, EncodingError> {
        self.code.iter().map(encoding::encode).collect()
    }
}

/// Constant-pool identity: numbers by bit pattern, everything else by value.
fn same_constant(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constants_are_deduplicated() {
        let mut chunk = Chunk::new("f");
        assert_eq!(chunk.add_constant(Value::Number(1.0)), (0, true));
        assert_eq!(chunk.add_constant(Value::Bool(true)), (1, true));
        assert_eq!(chunk.add_constant(Value::Number(1.0)), (0, false));
        assert_eq!(chunk.constants.len(), 2);
    }

    #[test]
    fn test_patch_jump_targets_end() {
        let mut chunk = Chunk::new("f");
        let jump = chunk.emit(Op::JumpIfFalse(-1), Span::default());
        chunk.emit(Op::Negate, Span::default());
        chunk.patch_jump(jump);
        assert_eq!(chunk.code[0], Op::JumpIfFalse(2));
    }

    #[test]
    fn test_crop_and_splice_relocates_jumps() {
        let mut chunk = Chunk::new("f");
        chunk.emit(Op::Negate, Span::default());
        chunk.emit(Op::Jump(2), Span::default());
        chunk.emit(Op::Not, Span::default());
        let (code, spans) = chunk.crop(1);
        assert_eq!(chunk.len(), 1);
        chunk.emit(Op::Is, Span::default());
        chunk.emit(Op::Is, Span::default());
        chunk.splice(1, code, spans);
        assert_eq!(chunk.code[3], Op::Jump(4));
        assert_eq!(chunk.spans.len(), chunk.code.len());
    }
}

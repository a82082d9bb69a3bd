//! Packed 64-bit instruction words.
//!
//! The VM executes [`Op`] values directly. This module maps them to and from
//! one 64-bit word each (opcode in the low byte, operands packed into the
//! remaining seven bytes at fixed offsets) for `cj --packed`, and decodes
//! such words back.
//!
//! Binary operators store two 4-bit capture tags in byte 1 followed by the
//! left then right capture fields; combinations that need more than the
//! remaining six bytes cannot be packed.

use thiserror::Error;

use super::opcode::{AssignMod, Capture, Op, Operands, VarRef};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Operands of {0} do not fit in one instruction word")]
    DoesNotFit(&'static str),

    #[error("Jump offset {0} is out of range")]
    JumpOutOfRange(i32),

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("Invalid operand byte {byte} for {op}")]
    InvalidOperand { op: &'static str, byte: u8 },
}

const OP_CONSTANT: u8 = 0;
const OP_GET_GLOBAL: u8 = 1;
const OP_GET_LOCAL: u8 = 2;
const OP_GET_COMBINED: u8 = 3;
const OP_GET_SELF: u8 = 4;
const OP_SET_GLOBAL: u8 = 5;
const OP_SET_LOCAL: u8 = 6;
const OP_SET_COMBINED: u8 = 7;
const OP_GET_INDEX: u8 = 8;
const OP_SET_INDEX: u8 = 9;
const OP_GET_ATTR: u8 = 10;
const OP_GET_ATTR_CALL: u8 = 11;
const OP_SET_ATTR: u8 = 12;
const OP_ADD: u8 = 13;
const OP_SUB: u8 = 14;
const OP_MUL: u8 = 15;
const OP_DIV: u8 = 16;
const OP_MOD: u8 = 17;
const OP_POW: u8 = 18;
const OP_LESS: u8 = 19;
const OP_MORE: u8 = 20;
const OP_LESS_EQUAL: u8 = 21;
const OP_MORE_EQUAL: u8 = 22;
const OP_EQUAL: u8 = 23;
const OP_NEGATE: u8 = 24;
const OP_NOT: u8 = 25;
const OP_AND: u8 = 26;
const OP_OR: u8 = 27;
const OP_IS: u8 = 28;
const OP_EXEC_FUNCTION: u8 = 29;
const OP_EXEC_METHOD: u8 = 30;
const OP_INIT: u8 = 31;
const OP_GET_PARENT_INIT: u8 = 32;
const OP_RETURN: u8 = 33;
const OP_RETURN_NONE: u8 = 34;
const OP_JUMP: u8 = 35;
const OP_JUMP_IF_FALSE: u8 = 36;

const CAPTURE_NONE: u8 = 0;
const CAPTURE_PAYLOAD: u8 = 1;
const CAPTURE_LOCAL: u8 = 2;
const CAPTURE_GLOBAL: u8 = 3;
const CAPTURE_COMBINED: u8 = 4;

/// Byte-level writer over one instruction word.
struct Word {
    bits: u64,
    cursor: u32,
    name: &'static str,
}

impl Word {
    fn new(opcode: u8, name: &'static str) -> Self {
        Self {
            bits: opcode as u64,
            cursor: 1,
            name,
        }
    }

    fn put(&mut self, value: u64, bytes: u32) -> Result<(), EncodingError> {
        if self.cursor + bytes > 8 {
            return Err(EncodingError::DoesNotFit(self.name));
        }
        self.bits |= value << (self.cursor * 8);
        self.cursor += bytes;
        Ok(())
    }

    fn u8(mut self, v: u8) -> Result<Self, EncodingError> {
        self.put(v as u64, 1)?;
        Ok(self)
    }

    fn u16(mut self, v: u16) -> Result<Self, EncodingError> {
        self.put(v as u64, 2)?;
        Ok(self)
    }

    fn capture(&mut self, capture: Capture) -> Result<(), EncodingError> {
        match capture {
            Capture::None => Ok(()),
            Capture::Payload(p) => self.put(p as u32 as u64, 4),
            Capture::Variable(VarRef::Local(s)) | Capture::Variable(VarRef::Global(s)) => {
                self.put(s as u64, 2)
            }
            Capture::Variable(VarRef::Combined { local, global }) => {
                self.put(local as u64, 2)?;
                self.put(global as u64, 2)
            }
        }
    }
}

/// Byte-level reader over one instruction word.
struct Reader {
    bits: u64,
    cursor: u32,
    name: &'static str,
}

impl Reader {
    fn take(&mut self, bytes: u32) -> Result<u64, EncodingError> {
        if self.cursor + bytes > 8 {
            return Err(EncodingError::DoesNotFit(self.name));
        }
        let mask = if bytes == 8 { u64::MAX } else { (1u64 << (bytes * 8)) - 1 };
        let value = (self.bits >> (self.cursor * 8)) & mask;
        self.cursor += bytes;
        Ok(value)
    }

    fn u8(&mut self) -> Result<u8, EncodingError> {
        Ok(self.take(1)? as u8)
    }

    fn u16(&mut self) -> Result<u16, EncodingError> {
        Ok(self.take(2)? as u16)
    }

    fn flag(&mut self) -> Result<bool, EncodingError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(EncodingError::InvalidOperand { op: self.name, byte }),
        }
    }

    fn modifier(&mut self) -> Result<AssignMod, EncodingError> {
        let byte = self.u8()?;
        modifier_from_byte(byte).ok_or(EncodingError::InvalidOperand { op: self.name, byte })
    }

    fn capture(&mut self, tag: u8) -> Result<Capture, EncodingError> {
        Ok(match tag {
            CAPTURE_NONE => Capture::None,
            CAPTURE_PAYLOAD => Capture::Payload(self.take(4)? as u32 as i32),
            CAPTURE_LOCAL => Capture::Variable(VarRef::Local(self.u16()?)),
            CAPTURE_GLOBAL => Capture::Variable(VarRef::Global(self.u16()?)),
            CAPTURE_COMBINED => {
                let local = self.u16()?;
                let global = self.u16()?;
                Capture::Variable(VarRef::Combined { local, global })
            }
            byte => return Err(EncodingError::InvalidOperand { op: self.name, byte }),
        })
    }
}

fn modifier_byte(m: AssignMod) -> u8 {
    match m {
        AssignMod::None => 0,
        AssignMod::Add => 1,
        AssignMod::Sub => 2,
        AssignMod::Mul => 3,
        AssignMod::Div => 4,
        AssignMod::Mod => 5,
        AssignMod::Pow => 6,
    }
}

fn modifier_from_byte(byte: u8) -> Option<AssignMod> {
    Some(match byte {
        0 => AssignMod::None,
        1 => AssignMod::Add,
        2 => AssignMod::Sub,
        3 => AssignMod::Mul,
        4 => AssignMod::Div,
        5 => AssignMod::Mod,
        6 => AssignMod::Pow,
        _ => return None,
    })
}

fn capture_tag(capture: Capture) -> u8 {
    match capture {
        Capture::None => CAPTURE_NONE,
        Capture::Payload(_) => CAPTURE_PAYLOAD,
        Capture::Variable(VarRef::Local(_)) => CAPTURE_LOCAL,
        Capture::Variable(VarRef::Global(_)) => CAPTURE_GLOBAL,
        Capture::Variable(VarRef::Combined { .. }) => CAPTURE_COMBINED,
    }
}

fn opcode_byte(op: &Op) -> u8 {
    match op {
        Op::Constant(_) => OP_CONSTANT,
        Op::GetGlobal(_) => OP_GET_GLOBAL,
        Op::GetLocal(_) => OP_GET_LOCAL,
        Op::GetCombined { .. } => OP_GET_COMBINED,
        Op::GetSelf => OP_GET_SELF,
        Op::SetGlobal { .. } => OP_SET_GLOBAL,
        Op::SetLocal { .. } => OP_SET_LOCAL,
        Op::SetCombined { .. } => OP_SET_COMBINED,
        Op::GetIndex => OP_GET_INDEX,
        Op::SetIndex(_) => OP_SET_INDEX,
        Op::GetAttr(_) => OP_GET_ATTR,
        Op::GetAttrCall(_) => OP_GET_ATTR_CALL,
        Op::SetAttr { .. } => OP_SET_ATTR,
        Op::Add(_) => OP_ADD,
        Op::Sub(_) => OP_SUB,
        Op::Mul(_) => OP_MUL,
        Op::Div(_) => OP_DIV,
        Op::Mod(_) => OP_MOD,
        Op::Pow(_) => OP_POW,
        Op::Less(_) => OP_LESS,
        Op::More(_) => OP_MORE,
        Op::LessEqual(_) => OP_LESS_EQUAL,
        Op::MoreEqual(_) => OP_MORE_EQUAL,
        Op::Equal(_) => OP_EQUAL,
        Op::Negate => OP_NEGATE,
        Op::Not => OP_NOT,
        Op::And => OP_AND,
        Op::Or => OP_OR,
        Op::Is => OP_IS,
        Op::ExecFunction { .. } => OP_EXEC_FUNCTION,
        Op::ExecMethod { .. } => OP_EXEC_METHOD,
        Op::Init(_) => OP_INIT,
        Op::GetParentInit(_) => OP_GET_PARENT_INIT,
        Op::Return => OP_RETURN,
        Op::ReturnNone => OP_RETURN_NONE,
        Op::Jump(_) => OP_JUMP,
        Op::JumpIfFalse(_) => OP_JUMP_IF_FALSE,
    }
}

fn jump_offset(offset: i32) -> Result<u16, EncodingError> {
    i16::try_from(offset)
        .map(|o| o as u16)
        .map_err(|_| EncodingError::JumpOutOfRange(offset))
}

/// Pack an instruction with relative jump offsets into one word.
pub fn encode(op: &Op) -> Result<u64, EncodingError> {
    let word = Word::new(opcode_byte(op), op.name());
    let word = match *op {
        Op::Constant(i) | Op::GetGlobal(i) | Op::GetLocal(i) => word.u16(i)?,
        Op::GetAttr(i) | Op::GetAttrCall(i) => word.u16(i)?,
        Op::Init(c) | Op::GetParentInit(c) => word.u16(c)?,
        Op::GetCombined { local, global } => word.u16(local)?.u16(global)?,
        Op::SetGlobal { slot, modifier } | Op::SetLocal { slot, modifier } => {
            word.u16(slot)?.u8(modifier_byte(modifier))?
        }
        Op::SetCombined {
            local,
            global,
            modifier,
        } => word.u16(local)?.u16(global)?.u8(modifier_byte(modifier))?,
        Op::SetIndex(modifier) => word.u8(modifier_byte(modifier))?,
        Op::SetAttr { name, modifier } => word.u16(name)?.u8(modifier_byte(modifier))?,
        Op::ExecFunction {
            argc,
            function,
            enforce,
        } => word.u8(argc)?.u16(function)?.u8(enforce as u8)?,
        Op::ExecMethod {
            argc,
            bound,
            enforce,
        } => word.u8(argc)?.u8(bound as u8)?.u8(enforce as u8)?,
        Op::Jump(offset) | Op::JumpIfFalse(offset) => word.u16(jump_offset(offset)?)?,
        _ => match op.as_binary() {
            Some((_, Operands { left, right })) => {
                let mut word = word.u8(capture_tag(left) | (capture_tag(right) << 4))?;
                word.capture(left)?;
                word.capture(right)?;
                word
            }
            None => word,
        },
    };
    Ok(word.bits)
}

/// Unpack one instruction word.
pub fn decode(bits: u64) -> Result<Op, EncodingError> {
    let opcode = (bits & 0xFF) as u8;
    let mut r = Reader {
        bits,
        cursor: 1,
        name: "instruction",
    };
    let op = match opcode {
        OP_CONSTANT => Op::Constant(r.u16()?),
        OP_GET_GLOBAL => Op::GetGlobal(r.u16()?),
        OP_GET_LOCAL => Op::GetLocal(r.u16()?),
        OP_GET_COMBINED => Op::GetCombined {
            local: r.u16()?,
            global: r.u16()?,
        },
        OP_GET_SELF => Op::GetSelf,
        OP_SET_GLOBAL => Op::SetGlobal {
            slot: r.u16()?,
            modifier: r.modifier()?,
        },
        OP_SET_LOCAL => Op::SetLocal {
            slot: r.u16()?,
            modifier: r.modifier()?,
        },
        OP_SET_COMBINED => Op::SetCombined {
            local: r.u16()?,
            global: r.u16()?,
            modifier: r.modifier()?,
        },
        OP_GET_INDEX => Op::GetIndex,
        OP_SET_INDEX => Op::SetIndex(r.modifier()?),
        OP_GET_ATTR => Op::GetAttr(r.u16()?),
        OP_GET_ATTR_CALL => Op::GetAttrCall(r.u16()?),
        OP_SET_ATTR => Op::SetAttr {
            name: r.u16()?,
            modifier: r.modifier()?,
        },
        OP_ADD..=OP_EQUAL => {
            let tags = r.u8()?;
            let left = r.capture(tags & 0x0F)?;
            let right = r.capture(tags >> 4)?;
            let operands = Operands::new(left, right);
            match opcode {
                OP_ADD => Op::Add(operands),
                OP_SUB => Op::Sub(operands),
                OP_MUL => Op::Mul(operands),
                OP_DIV => Op::Div(operands),
                OP_MOD => Op::Mod(operands),
                OP_POW => Op::Pow(operands),
                OP_LESS => Op::Less(operands),
                OP_MORE => Op::More(operands),
                OP_LESS_EQUAL => Op::LessEqual(operands),
                OP_MORE_EQUAL => Op::MoreEqual(operands),
                _ => Op::Equal(operands),
            }
        }
        OP_NEGATE => Op::Negate,
        OP_NOT => Op::Not,
        OP_AND => Op::And,
        OP_OR => Op::Or,
        OP_IS => Op::Is,
        OP_EXEC_FUNCTION => Op::ExecFunction {
            argc: r.u8()?,
            function: r.u16()?,
            enforce: r.flag()?,
        },
        OP_EXEC_METHOD => Op::ExecMethod {
            argc: r.u8()?,
            bound: r.flag()?,
            enforce: r.flag()?,
        },
        OP_INIT => Op::Init(r.u16()?),
        OP_GET_PARENT_INIT => Op::GetParentInit(r.u16()?),
        OP_RETURN => Op::Return,
        OP_RETURN_NONE => Op::ReturnNone,
        OP_JUMP => Op::Jump(r.u16()? as i16 as i32),
        OP_JUMP_IF_FALSE => Op::JumpIfFalse(r.u16()? as i16 as i32),
        other => return Err(EncodingError::UnknownOpcode(other)),
    };
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_opcode_in_low_byte() {
        let word = encode(&Op::GetGlobal(0x1234)).unwrap();
        assert_eq!(word & 0xFF, OP_GET_GLOBAL as u64);
        assert_eq!((word >> 8) & 0xFFFF, 0x1234);
    }

    #[test]
    fn test_negative_jump_survives_packing() {
        let word = encode(&Op::Jump(-12)).unwrap();
        assert_eq!(decode(word).unwrap(), Op::Jump(-12));
    }

    #[test]
    fn test_jump_out_of_i16_range_is_rejected() {
        assert_eq!(
            encode(&Op::JumpIfFalse(40_000)),
            Err(EncodingError::JumpOutOfRange(40_000))
        );
    }

    #[test]
    fn test_payload_and_variable_capture_fit() {
        let op = Op::Mul(Operands::new(
            Capture::Variable(VarRef::Local(7)),
            Capture::Payload(-3),
        ));
        assert_eq!(decode(encode(&op).unwrap()).unwrap(), op);
    }

    #[test]
    fn test_two_combined_captures_do_not_fit() {
        let combined = Capture::Variable(VarRef::Combined { local: 1, global: 2 });
        let op = Op::Add(Operands::new(combined, combined));
        assert_eq!(encode(&op), Err(EncodingError::DoesNotFit("ADD")));
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(decode(0xFE), Err(EncodingError::UnknownOpcode(0xFE)));
    }
}

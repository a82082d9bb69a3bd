//! Bytecode instructions for the CJ VM.

use crate::object::ClassId;

/// Compound-assignment modifier carried by the `Set*` instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignMod {
    #[default]
    None,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl AssignMod {
    /// The binary operator applied by this modifier, if any.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignMod::None => None,
            AssignMod::Add => Some(BinaryOp::Add),
            AssignMod::Sub => Some(BinaryOp::Sub),
            AssignMod::Mul => Some(BinaryOp::Mul),
            AssignMod::Div => Some(BinaryOp::Div),
            AssignMod::Mod => Some(BinaryOp::Mod),
            AssignMod::Pow => Some(BinaryOp::Pow),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignMod::None => "=",
            AssignMod::Add => "+=",
            AssignMod::Sub => "-=",
            AssignMod::Mul => "*=",
            AssignMod::Div => "/=",
            AssignMod::Mod => "%=",
            AssignMod::Pow => "^=",
        }
    }
}

/// A variable operand captured into a binary instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef {
    Local(u16),
    Global(u16),
    Combined { local: u16, global: u16 },
}

/// How a binary instruction obtains one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capture {
    /// Popped from the stack.
    #[default]
    None,
    /// An integer literal embedded in the instruction.
    Payload(i32),
    /// Read from a variable slot when the instruction executes.
    Variable(VarRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Operands {
    pub left: Capture,
    pub right: Capture,
}

impl Operands {
    pub fn new(left: Capture, right: Capture) -> Self {
        Self { left, right }
    }

    pub fn stack() -> Self {
        Self::default()
    }
}

/// Arithmetic and comparison operators that accept captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Less,
    More,
    LessEqual,
    MoreEqual,
    Equal,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Less => "<",
            BinaryOp::More => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::MoreEqual => ">=",
            BinaryOp::Equal => "==",
        }
    }

    /// Apply the operator to two numbers.
    pub fn apply_numbers(self, a: f64, b: f64) -> crate::object::Value {
        use crate::object::Value;
        match self {
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Sub => Value::Number(a - b),
            BinaryOp::Mul => Value::Number(a * b),
            BinaryOp::Div => Value::Number(a / b),
            BinaryOp::Mod => Value::Number(a % b),
            BinaryOp::Pow => Value::Number(a.powf(b)),
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::More => Value::Bool(a > b),
            BinaryOp::LessEqual => Value::Bool(a <= b),
            BinaryOp::MoreEqual => Value::Bool(a >= b),
            BinaryOp::Equal => Value::Bool(a == b),
        }
    }

    /// Magic method looked up on the left operand, and the mirrored method
    /// tried on the right operand when the left has none. `a < b` mirrors to
    /// `b._more(a)`.
    pub fn magic_methods(self) -> (&'static str, Option<&'static str>) {
        match self {
            BinaryOp::Add => ("_add", Some("_add")),
            BinaryOp::Sub => ("_sub", None),
            BinaryOp::Mul => ("_mul", Some("_mul")),
            BinaryOp::Div => ("_div", None),
            BinaryOp::Mod => ("_mod", None),
            BinaryOp::Pow => ("_pow", None),
            BinaryOp::Equal => ("_eq", Some("_eq")),
            BinaryOp::Less => ("_less", Some("_more")),
            BinaryOp::More => ("_more", Some("_less")),
            BinaryOp::LessEqual => ("_leq", Some("_meq")),
            BinaryOp::MoreEqual => ("_meq", Some("_leq")),
        }
    }
}

/// A single bytecode instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // --- Constants ---
    /// Push a constant from the chunk's constant pool.
    Constant(u16),

    // --- Variables ---
    GetGlobal(u16),
    GetLocal(u16),
    /// Read the local slot if it holds a value, else the global slot.
    GetCombined { local: u16, global: u16 },
    /// Push `self` (local slot 0 of a method frame).
    GetSelf,
    SetGlobal { slot: u16, modifier: AssignMod },
    SetLocal { slot: u16, modifier: AssignMod },
    SetCombined { local: u16, global: u16, modifier: AssignMod },

    // --- Attributes & indexing ---
    /// Pop index and target, push `target.get(index)`.
    GetIndex,
    /// Pop value, index and target, call `target.set(index, value)`.
    SetIndex(AssignMod),
    /// Pop an object, push the attribute named by a string constant.
    GetAttr(u16),
    /// Like `GetAttr`, but keeps the object on the stack as the receiver of a
    /// following bound `ExecMethod`.
    GetAttrCall(u16),
    /// Pop value and object, assign the attribute named by a string constant.
    SetAttr { name: u16, modifier: AssignMod },

    // --- Binary operators ---
    Add(Operands),
    Sub(Operands),
    Mul(Operands),
    Div(Operands),
    Mod(Operands),
    Pow(Operands),
    Less(Operands),
    More(Operands),
    LessEqual(Operands),
    MoreEqual(Operands),
    Equal(Operands),

    // --- Unary & boolean ---
    Negate,
    Not,
    And,
    Or,
    /// Identity comparison.
    Is,

    // --- Calls ---
    /// Call a prelinked function by index into the program's function table.
    ExecFunction { argc: u8, function: u16, enforce: bool },
    /// Call the callable below the arguments. `bound` callables have their
    /// receiver between the callable and the arguments.
    ExecMethod { argc: u8, bound: bool, enforce: bool },
    /// Allocate an instance of a class and push `[object, init, object]`.
    Init(ClassId),
    /// Push the parent initializer of the given class and the current `self`.
    GetParentInit(ClassId),
    /// Return from the current body; value-returning bodies return the top of stack.
    Return,
    /// Push `none` and return (end of a value-returning body).
    ReturnNone,

    // --- Control flow ---
    /// Absolute target while a body is compiled, relative offset afterwards.
    Jump(i32),
    /// Pop a bool and jump when it is false.
    JumpIfFalse(i32),
}

impl Op {
    /// The operator and operands of a binary instruction.
    pub fn as_binary(&self) -> Option<(BinaryOp, Operands)> {
        let pair = match *self {
            Op::Add(o) => (BinaryOp::Add, o),
            Op::Sub(o) => (BinaryOp::Sub, o),
            Op::Mul(o) => (BinaryOp::Mul, o),
            Op::Div(o) => (BinaryOp::Div, o),
            Op::Mod(o) => (BinaryOp::Mod, o),
            Op::Pow(o) => (BinaryOp::Pow, o),
            Op::Less(o) => (BinaryOp::Less, o),
            Op::More(o) => (BinaryOp::More, o),
            Op::LessEqual(o) => (BinaryOp::LessEqual, o),
            Op::MoreEqual(o) => (BinaryOp::MoreEqual, o),
            Op::Equal(o) => (BinaryOp::Equal, o),
            _ => return None,
        };
        Some(pair)
    }

    pub fn binary(op: BinaryOp, operands: Operands) -> Op {
        match op {
            BinaryOp::Add => Op::Add(operands),
            BinaryOp::Sub => Op::Sub(operands),
            BinaryOp::Mul => Op::Mul(operands),
            BinaryOp::Div => Op::Div(operands),
            BinaryOp::Mod => Op::Mod(operands),
            BinaryOp::Pow => Op::Pow(operands),
            BinaryOp::Less => Op::Less(operands),
            BinaryOp::More => Op::More(operands),
            BinaryOp::LessEqual => Op::LessEqual(operands),
            BinaryOp::MoreEqual => Op::MoreEqual(operands),
            BinaryOp::Equal => Op::Equal(operands),
        }
    }

    /// Mutable access to the operands of a binary instruction.
    pub fn operands_mut(&mut self) -> Option<&mut Operands> {
        match self {
            Op::Add(o)
            | Op::Sub(o)
            | Op::Mul(o)
            | Op::Div(o)
            | Op::Mod(o)
            | Op::Pow(o)
            | Op::Less(o)
            | Op::More(o)
            | Op::LessEqual(o)
            | Op::MoreEqual(o)
            | Op::Equal(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Op::ExecFunction { .. } | Op::ExecMethod { .. })
    }

    pub fn is_jump(&self) -> bool {
        matches!(self, Op::Jump(_) | Op::JumpIfFalse(_))
    }

    /// Mutable access to the target of a jump.
    pub fn jump_target_mut(&mut self) -> Option<&mut i32> {
        match self {
            Op::Jump(t) | Op::JumpIfFalse(t) => Some(t),
            _ => None,
        }
    }

    /// Whether executing this instruction can never run user code.
    ///
    /// `GetAttr` is listed because attribute lookup reads the instance and
    /// class tables without dispatching to CJ methods. Left operands are only
    /// captured when the right operand is made of pure instructions, so
    /// `get_attr` must stay free of user calls.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Op::Constant(_)
                | Op::GetGlobal(_)
                | Op::GetLocal(_)
                | Op::GetCombined { .. }
                | Op::GetSelf
                | Op::GetAttr(_)
                | Op::Not
                | Op::And
                | Op::Or
                | Op::Is
        )
    }

    /// Instruction name as printed by the disassembler.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Constant(_) => "CONSTANT",
            Op::GetGlobal(_) => "GET_GLOBAL",
            Op::GetLocal(_) => "GET_LOCAL",
            Op::GetCombined { .. } => "GET_COMBINED",
            Op::GetSelf => "GET_SELF",
            Op::SetGlobal { .. } => "SET_GLOBAL",
            Op::SetLocal { .. } => "SET_LOCAL",
            Op::SetCombined { .. } => "SET_COMBINED",
            Op::GetIndex => "GET_INDEX",
            Op::SetIndex(_) => "SET_INDEX",
            Op::GetAttr(_) => "GET_ATTR",
            Op::GetAttrCall(_) => "GET_ATTR_CALL",
            Op::SetAttr { .. } => "SET_ATTR",
            Op::Add(_) => "ADD",
            Op::Sub(_) => "SUB",
            Op::Mul(_) => "MUL",
            Op::Div(_) => "DIV",
            Op::Mod(_) => "MOD",
            Op::Pow(_) => "POW",
            Op::Less(_) => "LESS",
            Op::More(_) => "MORE",
            Op::LessEqual(_) => "LESS_EQUAL",
            Op::MoreEqual(_) => "MORE_EQUAL",
            Op::Equal(_) => "EQUAL",
            Op::Negate => "NEGATE",
            Op::Not => "NOT",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Is => "IS",
            Op::ExecFunction { .. } => "EXEC_FUNCTION",
            Op::ExecMethod { .. } => "EXEC_METHOD",
            Op::Init(_) => "INIT",
            Op::GetParentInit(_) => "GET_PARENT_INIT",
            Op::Return => "RETURN",
            Op::ReturnNone => "RETURN_NONE",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Value;

    #[test]
    fn test_binary_roundtrip_through_op() {
        let operands = Operands::new(Capture::Payload(3), Capture::None);
        let op = Op::binary(BinaryOp::Pow, operands);
        assert_eq!(op.as_binary(), Some((BinaryOp::Pow, operands)));
        assert_eq!(Op::Negate.as_binary(), None);
    }

    #[test]
    fn test_apply_numbers() {
        assert_eq!(BinaryOp::Mod.apply_numbers(7.0, 3.0), Value::Number(1.0));
        assert_eq!(BinaryOp::Pow.apply_numbers(2.0, 10.0), Value::Number(1024.0));
        assert_eq!(BinaryOp::MoreEqual.apply_numbers(2.0, 2.0), Value::Bool(true));
    }

    #[test]
    fn test_mirrored_comparisons() {
        assert_eq!(BinaryOp::Less.magic_methods(), ("_less", Some("_more")));
        assert_eq!(BinaryOp::Sub.magic_methods(), ("_sub", None));
    }

    #[test]
    fn test_purity() {
        assert!(Op::GetCombined { local: 0, global: 1 }.is_pure());
        assert!(!Op::Add(Operands::stack()).is_pure());
        assert!(!Op::ExecMethod { argc: 0, bound: true, enforce: true }.is_pure());
    }
}

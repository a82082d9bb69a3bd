//! Expression compilation by precedence climbing.
//!
//! Binary operators decide their captures when they are emitted, by looking
//! at the operand code just produced: a lone integer constant becomes a
//! payload and a lone variable read becomes a variable capture. Two payloads
//! fold into one constant.

use crate::error::CompileError;
use crate::lexer::TokenKind;
use crate::object::class::{DICT_CLASS, LIST_CLASS, SET_CLASS};
use crate::object::Value;
use crate::span::Span;

use super::compiler::{BodyKind, CompileResult, Compiler};
use super::opcode::{BinaryOp, Capture, Op, Operands, VarRef};

/// Operator precedence levels (higher = tighter binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Or = 1,         // || or
    And = 2,        // && and
    Equality = 3,   // == !=
    Comparison = 4, // < > <= >= is
    Term = 5,       // + -
    Factor = 6,     // * / %
    Exponent = 7,   // ^
    Unary = 8,      // ! -
    Call = 9,       // . () []
    Primary = 10,
}

impl Precedence {
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Exponent,
            Precedence::Exponent => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

pub fn get_precedence(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Or => Precedence::Or,
        TokenKind::And => Precedence::And,
        TokenKind::EqualEqual | TokenKind::BangEqual => Precedence::Equality,
        TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Is => Precedence::Comparison,
        TokenKind::Plus | TokenKind::Minus => Precedence::Term,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Factor,
        TokenKind::Caret => Precedence::Exponent,
        TokenKind::LeftParen | TokenKind::Dot | TokenKind::LeftBracket => Precedence::Call,
        _ => Precedence::None,
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::Caret => BinaryOp::Pow,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::Greater => BinaryOp::More,
        TokenKind::LessEqual => BinaryOp::LessEqual,
        TokenKind::GreaterEqual => BinaryOp::MoreEqual,
        TokenKind::EqualEqual | TokenKind::BangEqual => BinaryOp::Equal,
        _ => return None,
    })
}

impl Compiler {
    /// Compile an expression; its value is left on the stack.
    pub(crate) fn expression(&mut self) -> CompileResult<()> {
        self.parse_precedence(Precedence::Or)
    }

    pub(crate) fn parse_precedence(&mut self, min_precedence: Precedence) -> CompileResult<()> {
        let start = self.body.chunk.len();
        self.parse_prefix()?;

        loop {
            let precedence = get_precedence(&self.peek().kind);
            if precedence == Precedence::None || precedence < min_precedence {
                break;
            }
            self.parse_infix(start, precedence)?;
        }
        Ok(())
    }

    fn parse_prefix(&mut self) -> CompileResult<()> {
        let token = self.advance();
        let span = token.span;

        match token.kind {
            TokenKind::Number(n) => {
                self.emit_constant(Value::Number(n), span)?;
            }
            TokenKind::Str(s) => {
                let value = self.intern(&s);
                self.emit_constant(value, span)?;
            }
            TokenKind::True => {
                self.emit_constant(Value::Bool(true), span)?;
            }
            TokenKind::False => {
                self.emit_constant(Value::Bool(false), span)?;
            }
            TokenKind::None => {
                self.emit_constant(Value::None, span)?;
            }
            TokenKind::LeftParen => {
                self.expression()?;
                self.expect(&TokenKind::RightParen, "Expected ')' after expression")?;
            }
            TokenKind::LeftBracket => {
                self.emit_at(Op::Init(LIST_CLASS), span);
                let argc = self.comma_sequence(&TokenKind::RightBracket, "Expected ']' after list")?;
                self.emit_at(Op::ExecMethod { argc, bound: true, enforce: false }, span);
            }
            TokenKind::DictStart => {
                self.emit_at(Op::Init(DICT_CLASS), span);
                let argc = self.dict_entries()?;
                self.emit_at(Op::ExecMethod { argc, bound: true, enforce: false }, span);
            }
            TokenKind::SetStart => {
                self.emit_at(Op::Init(SET_CLASS), span);
                let argc = self.comma_sequence(&TokenKind::RightBrace, "Expected '}' after set")?;
                self.emit_at(Op::ExecMethod { argc, bound: true, enforce: false }, span);
            }
            TokenKind::Minus => {
                self.parse_precedence(Precedence::Unary)?;
                self.emit_at(Op::Negate, span);
            }
            TokenKind::Bang => {
                self.parse_precedence(Precedence::Unary)?;
                self.emit_at(Op::Not, span);
            }
            TokenKind::SelfValue => {
                if self.body.kind == BodyKind::Function {
                    return Err(CompileError::new("Self can only be used in method", span));
                }
                self.emit_at(Op::GetSelf, span);
            }
            TokenKind::New => self.new_instance()?,
            TokenKind::ParentInit => self.parent_init(span)?,
            TokenKind::Global => {
                let (name, name_span) =
                    self.expect_identifier("Expected identifier after 'global'")?;
                let slot = self.global_slot(&name, name_span)?;
                self.emit_at(Op::GetGlobal(slot), name_span);
            }
            TokenKind::Identifier(name) => {
                if self.check(&TokenKind::LeftParen) {
                    self.function_call(&name, span)?;
                } else {
                    self.variable(&name, span)?;
                }
            }
            _ => return Err(CompileError::new("Expected expression", span)),
        }
        Ok(())
    }

    fn parse_infix(&mut self, start: usize, precedence: Precedence) -> CompileResult<()> {
        let token = self.advance();
        let span = token.span;

        match &token.kind {
            TokenKind::LeftParen => {
                let bound = matches!(self.body.chunk.last(), Some(Op::GetAttrCall(_)));
                let argc = self.comma_sequence(&TokenKind::RightParen, "Expected ')' after arguments")?;
                self.emit_call(Op::ExecMethod { argc, bound, enforce: true }, span);
            }
            TokenKind::LeftBracket => {
                self.expression()?;
                self.expect(&TokenKind::RightBracket, "Expected ']' after index")?;
                self.emit_at(Op::GetIndex, span);
            }
            TokenKind::Dot => {
                let (name, name_span) = self.expect_identifier("Expected attribute name after '.'")?;
                let index = self.string_constant(&name, name_span)?;
                if self.check(&TokenKind::LeftParen) {
                    self.emit_at(Op::GetAttrCall(index), name_span);
                } else {
                    self.emit_at(Op::GetAttr(index), name_span);
                }
            }
            TokenKind::And | TokenKind::Or | TokenKind::Is => {
                self.parse_precedence(precedence.next())?;
                let op = match token.kind {
                    TokenKind::And => Op::And,
                    TokenKind::Or => Op::Or,
                    _ => Op::Is,
                };
                self.emit_at(op, span);
            }
            kind => {
                let Some(op) = binary_op(kind) else {
                    return Err(CompileError::new("Expected operator", span));
                };
                let op_start = self.body.chunk.len();
                self.parse_precedence(precedence.next())?;
                self.emit_binary(op, start, op_start, span)?;
                if token.kind == TokenKind::BangEqual {
                    self.emit_at(Op::Not, span);
                }
            }
        }
        Ok(())
    }

    /// Emit a binary operator whose left operand is `code[start..op_start]`
    /// and right operand `code[op_start..]`.
    fn emit_binary(
        &mut self,
        op: BinaryOp,
        start: usize,
        op_start: usize,
        span: Span,
    ) -> CompileResult<()> {
        let code = &self.body.chunk.code;
        let right_code = &code[op_start..];
        let left_code = &code[start..op_start];

        let right = match right_code {
            [single] => self.capture_of(single),
            _ => None,
        };
        // The left operand is read after the right one runs, so it may only
        // be captured when the right operand cannot run user code.
        let left = match left_code {
            [single] if right_code.iter().all(Op::is_pure) => self.capture_of(single),
            _ => None,
        };

        if let (Some(Capture::Payload(a)), Some(Capture::Payload(b))) = (left, right) {
            self.discard_op(op_start);
            self.discard_op(start);
            let folded = op.apply_numbers(a as f64, b as f64);
            self.emit_constant(folded, span)?;
            return Ok(());
        }

        if right.is_some() {
            self.discard_op(op_start);
        }
        if left.is_some() {
            self.discard_op(start);
        }
        let operands = Operands::new(left.unwrap_or_default(), right.unwrap_or_default());
        self.emit_at(Op::binary(op, operands), span);
        Ok(())
    }

    /// The capture that can stand in for a single instruction, if any.
    fn capture_of(&self, op: &Op) -> Option<Capture> {
        match *op {
            Op::Constant(index) => {
                let n = self.body.chunk.constants.get(index as usize)?.as_number()?;
                let integral = n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative());
                if integral && n >= i32::MIN as f64 && n <= i32::MAX as f64 {
                    Some(Capture::Payload(n as i32))
                } else {
                    None
                }
            }
            Op::GetCombined { local, global } => {
                let name = self.body.locals.name(local)?;
                if self.global_decls.contains(name) {
                    None
                } else {
                    Some(Capture::Variable(VarRef::Combined { local, global }))
                }
            }
            _ => None,
        }
    }

    /// Comma-separated expressions up to and including `end`; returns the count.
    pub(crate) fn comma_sequence(&mut self, end: &TokenKind, end_message: &str) -> CompileResult<u8> {
        let mut count = 0usize;
        if !self.check(end) {
            loop {
                self.expression()?;
                count += 1;
                if count > self.limits.max_arguments {
                    return Err(self.error_at_previous("Too many arguments"));
                }
                if self.match_token(&TokenKind::Comma) {
                    if self.check(end) {
                        return Err(self.error_at_current("Expected expression after ','"));
                    }
                    continue;
                }
                if !self.check(end) && !self.is_at_end() {
                    return Err(self.error_at_current("Expected ',' between arguments"));
                }
                break;
            }
        }
        self.expect(end, end_message)?;
        Ok(count as u8)
    }

    /// `key: value` pairs of a dict literal through the closing `}`.
    fn dict_entries(&mut self) -> CompileResult<u8> {
        let mut count = 0usize;
        if !self.check(&TokenKind::RightBrace) {
            loop {
                self.expression()?;
                self.expect(&TokenKind::Colon, "Expected ':' after key")?;
                self.expression()?;
                count += 2;
                if count > self.limits.max_arguments {
                    return Err(self.error_at_previous("Too many entries in dict literal"));
                }
                if self.match_token(&TokenKind::Comma) {
                    if self.check(&TokenKind::RightBrace) {
                        return Err(self.error_at_current("Expected expression after ','"));
                    }
                    continue;
                }
                if !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
                    return Err(self.error_at_current("Expected ',' between entries"));
                }
                break;
            }
        }
        self.expect(&TokenKind::RightBrace, "Expected '}' after dict")?;
        Ok(count as u8)
    }

    fn variable(&mut self, name: &str, span: Span) -> CompileResult<()> {
        if self.body.forced_globals.contains(name) {
            let slot = self.global_slot(name, span)?;
            self.emit_at(Op::GetGlobal(slot), span);
        } else {
            let local = self.local_slot(name, span)?;
            let global = self.global_slot(name, span)?;
            self.emit_at(Op::GetCombined { local, global }, span);
        }
        Ok(())
    }

    /// A direct call `name(args)`, resolved against the function table at link time.
    fn function_call(&mut self, name: &str, span: Span) -> CompileResult<()> {
        let function = self
            .function_refs
            .slot(name)
            .ok_or_else(|| CompileError::new("RefTable overflow", span))?;
        self.global_slot(name, span)?;
        self.advance();
        let argc = self.comma_sequence(&TokenKind::RightParen, "Expected ')' after arguments")?;
        self.emit_call(
            Op::ExecFunction {
                argc,
                function,
                enforce: true,
            },
            span,
        );
        Ok(())
    }

    /// `new Class(args)`: allocate, then run `init` bound to the new object.
    fn new_instance(&mut self) -> CompileResult<()> {
        let (name, span) = self.expect_identifier("Expected class name after 'new'")?;
        let class = self.class_slot(&name, span)?;
        self.emit_at(Op::Init(class), span);
        self.expect(&TokenKind::LeftParen, "Expected '(' after class name")?;
        let argc = self.comma_sequence(&TokenKind::RightParen, "Expected ')' after arguments")?;
        self.emit_at(Op::ExecMethod { argc, bound: true, enforce: false }, span);
        Ok(())
    }

    fn parent_init(&mut self, span: Span) -> CompileResult<()> {
        let class = match (self.body.kind, self.body.class) {
            (BodyKind::Init, Some(class)) => class,
            _ => {
                return Err(CompileError::new(
                    "Parent init can only be called in init method",
                    span,
                ))
            }
        };
        self.parent_init_uses.push((class, span));
        self.emit_at(Op::GetParentInit(class), span);
        self.expect(&TokenKind::LeftParen, "Expected '(' after pInit")?;
        let argc = self.comma_sequence(&TokenKind::RightParen, "Expected ')' after arguments")?;
        self.emit_call(Op::ExecMethod { argc, bound: true, enforce: true }, span);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerLimits;
    use crate::lexer::{tokenize, MemoryLoader};
    use crate::vm::program::Program;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> Program {
        let stream = tokenize("test", source, &MemoryLoader::new()).unwrap();
        Compiler::new(stream, &[], CompilerLimits::default())
            .compile()
            .unwrap()
    }

    fn main_code(program: &Program) -> Vec<Op> {
        program.chunks.last().unwrap().code.clone()
    }

    fn main_constants(program: &Program) -> Vec<Value> {
        program.chunks.last().unwrap().constants.clone()
    }

    #[test]
    fn test_literal_arithmetic_folds_to_one_constant() {
        let program = compile("function main() { return 1 + 2 * 3; }");
        assert_eq!(main_code(&program), vec![Op::Constant(0), Op::Return, Op::ReturnNone]);
        assert_eq!(main_constants(&program), vec![Value::Number(7.0)]);
    }

    #[test]
    fn test_folded_comparison_is_evaluated() {
        let program = compile("function main() { return 2 < 1; }");
        assert_eq!(main_constants(&program), vec![Value::Bool(false)]);
    }

    #[test]
    fn test_fractional_literals_are_not_captured() {
        let program = compile("function main() { return 1.5 + 2; }");
        assert_eq!(
            main_code(&program)[1],
            Op::Add(Operands::new(Capture::None, Capture::Payload(2)))
        );
    }

    #[test]
    fn test_left_operand_stays_on_stack_when_right_calls() {
        let program = compile(
            "function f() { return 1; } function main() { x = 2; return x + f(); }",
        );
        let code = main_code(&program);
        assert!(code.contains(&Op::Add(Operands::stack())));
    }

    #[test]
    fn test_bang_equal_is_equal_then_not() {
        let program = compile("function main() { x = 1; return x != 2; }");
        let code = main_code(&program);
        let at = code.iter().position(|op| matches!(op, Op::Equal(_))).unwrap();
        assert_eq!(code[at + 1], Op::Not);
    }

    #[test]
    fn test_method_call_is_bound() {
        let program = compile("function main() { x = [1]; x.add(2); }");
        let code = main_code(&program);
        assert!(code.contains(&Op::ExecMethod { argc: 1, bound: true, enforce: false }));
    }

    #[test]
    fn test_self_outside_method_is_an_error() {
        let stream = tokenize("test", "function main() { x = self; }", &MemoryLoader::new()).unwrap();
        let err = Compiler::new(stream, &[], CompilerLimits::default())
            .compile()
            .unwrap_err();
        assert_eq!(err.message(), "Self can only be used in method");
    }
}

//! Statement compilation: blocks, control flow, returns and assignments.

use crate::error::CompileError;
use crate::lexer::TokenKind;

use super::compiler::{CompileResult, Compiler, LoopContext};
use super::compiler_exprs::Precedence;
use super::opcode::{AssignMod, Op};

fn assign_mod(kind: &TokenKind) -> Option<AssignMod> {
    Some(match kind {
        TokenKind::Equal => AssignMod::None,
        TokenKind::PlusEqual => AssignMod::Add,
        TokenKind::MinusEqual => AssignMod::Sub,
        TokenKind::StarEqual => AssignMod::Mul,
        TokenKind::SlashEqual => AssignMod::Div,
        TokenKind::PercentEqual => AssignMod::Mod,
        TokenKind::CaretEqual => AssignMod::Pow,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopJump {
    Break,
    Continue,
}

impl Compiler {
    pub(crate) fn block(&mut self) -> CompileResult<()> {
        self.expect(&TokenKind::LeftBrace, "Expected '{'")?;
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            self.statement()?;
        }
        self.expect(&TokenKind::RightBrace, "Expected '}'")?;
        Ok(())
    }

    pub(crate) fn statement(&mut self) -> CompileResult<()> {
        if self.match_token(&TokenKind::If) {
            self.if_statement()
        } else if self.match_token(&TokenKind::While) {
            self.while_statement()
        } else if self.match_token(&TokenKind::For) {
            self.for_statement()
        } else if self.match_token(&TokenKind::Break) {
            self.loop_jump(LoopJump::Break)
        } else if self.match_token(&TokenKind::Continue) {
            self.loop_jump(LoopJump::Continue)
        } else if self.match_token(&TokenKind::Return) {
            self.return_statement()
        } else if self.is_global_declaration() {
            self.global_declaration()
        } else {
            self.standard_statement()?;
            self.expect(&TokenKind::Semicolon, "Expected ';'")?;
            Ok(())
        }
    }

    fn if_statement(&mut self) -> CompileResult<()> {
        self.expect(&TokenKind::LeftParen, "Expected '(' after 'if'")?;
        self.expression()?;
        self.expect(&TokenKind::RightParen, "Expected ')' after condition")?;
        let skip = self.emit(Op::JumpIfFalse(0));
        self.block()?;

        if self.check(&TokenKind::Elif) || self.check(&TokenKind::Else) {
            let end = self.emit(Op::Jump(0));
            self.body.chunk.patch_jump(skip);
            if self.match_token(&TokenKind::Elif) {
                self.if_statement()?;
            } else {
                self.advance();
                self.block()?;
            }
            self.body.chunk.patch_jump(end);
        } else {
            self.body.chunk.patch_jump(skip);
        }
        Ok(())
    }

    fn while_statement(&mut self) -> CompileResult<()> {
        let condition = self.body.chunk.len();
        self.expect(&TokenKind::LeftParen, "Expected '(' after 'while'")?;
        self.expression()?;
        self.expect(&TokenKind::RightParen, "Expected ')' after condition")?;
        let exit = self.emit(Op::JumpIfFalse(0));

        self.body.loops.push(LoopContext::default());
        self.block()?;
        let context = self.body.loops.pop().unwrap_or_default();

        self.patch_jumps_to(&context.continues, condition);
        self.emit(Op::Jump(condition as i32));
        self.body.chunk.patch_jump(exit);
        for jump in context.breaks {
            self.body.chunk.patch_jump(jump);
        }
        Ok(())
    }

    /// `for (pre; cond; post) { body }`. The post statement is compiled in
    /// place, cut out, and spliced back after the body so that `continue`
    /// lands on it.
    fn for_statement(&mut self) -> CompileResult<()> {
        self.expect(&TokenKind::LeftParen, "Expected '(' after 'for'")?;
        self.standard_statement()?;
        self.expect(&TokenKind::Semicolon, "Expected ';' after loop initializer")?;

        let condition = self.body.chunk.len();
        self.expression()?;
        self.expect(&TokenKind::Semicolon, "Expected ';' after loop condition")?;
        let exit = self.emit(Op::JumpIfFalse(0));

        let post_start = self.body.chunk.len();
        self.standard_statement()?;
        let (post_code, post_spans) = self.body.chunk.crop(post_start);
        self.body.last_call = None;
        self.expect(&TokenKind::RightParen, "Expected ')' after for clauses")?;

        self.body.loops.push(LoopContext::default());
        self.block()?;
        let context = self.body.loops.pop().unwrap_or_default();

        let post = self.body.chunk.len();
        self.patch_jumps_to(&context.continues, post);
        self.body.chunk.splice(post_start, post_code, post_spans);
        self.emit(Op::Jump(condition as i32));
        self.body.chunk.patch_jump(exit);
        for jump in context.breaks {
            self.body.chunk.patch_jump(jump);
        }
        Ok(())
    }

    fn patch_jumps_to(&mut self, jumps: &[usize], target: usize) {
        for &jump in jumps {
            if let Some(t) = self.body.chunk.code.get_mut(jump).and_then(Op::jump_target_mut) {
                *t = target as i32;
            }
        }
    }

    fn loop_jump(&mut self, kind: LoopJump) -> CompileResult<()> {
        let span = self.previous_span();
        let label = match kind {
            LoopJump::Break => "Break",
            LoopJump::Continue => "Continue",
        };
        if self.body.loops.is_empty() {
            return Err(CompileError::new(
                format!("{} statement outside of loop", label),
                span,
            ));
        }
        let jump = self.emit(Op::Jump(0));
        let limit = self.limits.max_loop_jumps;
        let pending = match self.body.loops.last_mut() {
            Some(context) if kind == LoopJump::Break => &mut context.breaks,
            Some(context) => &mut context.continues,
            None => return Ok(()),
        };
        if pending.len() >= limit {
            return Err(CompileError::new(
                format!("{} statement overflow within loop", label),
                span,
            ));
        }
        pending.push(jump);
        self.expect(&TokenKind::Semicolon, "Expected ';'")?;
        Ok(())
    }

    fn return_statement(&mut self) -> CompileResult<()> {
        let span = self.previous_span();
        if self.body.returns {
            if self.check(&TokenKind::Semicolon) {
                return Err(self.error_at_current(
                    "Expected expression after return statement for non-void callable",
                ));
            }
            self.expression()?;
        } else if !self.check(&TokenKind::Semicolon) {
            return Err(
                self.error_at_current("Expected ';' after return statement for void callable")
            );
        }
        self.expect(&TokenKind::Semicolon, "Expected ';'")?;
        self.emit_at(Op::Return, span);
        Ok(())
    }

    fn is_global_declaration(&self) -> bool {
        self.check(&TokenKind::Global)
            && matches!(self.peek_nth(1).kind, TokenKind::Identifier(_))
            && self.peek_nth(2).kind == TokenKind::Semicolon
    }

    /// `global x;` makes `x` refer to the global slot for the rest of the body.
    fn global_declaration(&mut self) -> CompileResult<()> {
        self.advance();
        let (name, span) = self.expect_identifier("Expected identifier after 'global'")?;
        self.global_slot(&name, span)?;
        self.body.forced_globals.insert(name);
        self.expect(&TokenKind::Semicolon, "Expected ';'")?;
        Ok(())
    }

    /// An assignment, or an expression whose last operation is a call.
    pub(crate) fn standard_statement(&mut self) -> CompileResult<()> {
        if self.is_assignment_statement() {
            return self.assignment();
        }

        let span = self.current_span();
        let start = self.body.chunk.len();
        self.expression()?;
        let end = self.body.chunk.len();
        match self.body.last_call {
            Some(call) if call >= start && call + 1 == end => {
                if let Some(
                    Op::ExecFunction { enforce, .. } | Op::ExecMethod { enforce, .. },
                ) = self.body.chunk.code.get_mut(call)
                {
                    *enforce = false;
                }
                Ok(())
            }
            _ => Err(CompileError::new(
                "Expected an assignment, call or return statement",
                span,
            )),
        }
    }

    /// Whether an assignment operator appears at nesting depth 0 before the
    /// end of the current statement.
    fn is_assignment_statement(&self) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens[self.current..] {
            match token.kind {
                TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::LeftBrace
                | TokenKind::DictStart
                | TokenKind::SetStart => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon | TokenKind::Eof => return false,
                ref kind if depth == 0 && kind.is_assignment() => return true,
                _ => {}
            }
        }
        false
    }

    fn assignment(&mut self) -> CompileResult<()> {
        let span = self.current_span();
        let start = self.body.chunk.len();
        self.parse_precedence(Precedence::Or)?;

        let code = &self.body.chunk.code;
        let valid_begin = matches!(
            code.get(start),
            Some(Op::GetGlobal(_) | Op::GetCombined { .. } | Op::GetSelf)
        );
        let valid_end = code.len() > start
            && matches!(
                code.last(),
                Some(Op::GetGlobal(_) | Op::GetCombined { .. } | Op::GetIndex | Op::GetAttr(_))
            );
        if !valid_begin || !valid_end {
            return Err(CompileError::new("Invalid left hand side of assignment", span));
        }

        let token = self.advance();
        let Some(modifier) = assign_mod(&token.kind) else {
            return Err(CompileError::new("Expected assignment operator", token.span));
        };
        let Some((target, target_span)) = self.body.chunk.pop() else {
            return Err(CompileError::new("Invalid left hand side of assignment", span));
        };

        self.expression()?;

        let op = match target {
            Op::GetGlobal(slot) => Op::SetGlobal { slot, modifier },
            Op::GetCombined { local, global } => {
                self.mark_local_set(local);
                Op::SetCombined {
                    local,
                    global,
                    modifier,
                }
            }
            Op::GetIndex => Op::SetIndex(modifier),
            Op::GetAttr(name) => Op::SetAttr { name, modifier },
            _ => return Err(CompileError::new("Invalid left hand side of assignment", span)),
        };
        self.emit_at(op, target_span);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CompilerLimits;
    use crate::error::CompileError;
    use crate::lexer::{tokenize, MemoryLoader};
    use crate::vm::compiler::Compiler;
    use crate::vm::opcode::{AssignMod, Op};
    use crate::vm::program::Program;
    use pretty_assertions::assert_eq;

    fn try_compile(source: &str) -> Result<Program, CompileError> {
        let stream = tokenize("test", source, &MemoryLoader::new())?;
        Compiler::new(stream, &[], CompilerLimits::default()).compile()
    }

    fn error_message(source: &str) -> String {
        try_compile(source).unwrap_err().message()
    }

    #[test]
    fn test_statement_must_end_in_call_or_assignment() {
        assert_eq!(
            error_message("function main() { 1 + 2; }"),
            "Expected an assignment, call or return statement"
        );
    }

    #[test]
    fn test_invalid_assignment_targets() {
        assert_eq!(
            error_message("function main() { 1 = 2; }"),
            "Invalid left hand side of assignment"
        );
        assert_eq!(
            error_message("function f() { return 1; } function main() { f() = 2; }"),
            "Invalid left hand side of assignment"
        );
    }

    #[test]
    fn test_compound_assignment_is_a_modifier() {
        let program = try_compile("function main() { x = 1; x += 2; }").unwrap();
        let code = &program.chunks[0].code;
        assert!(code.contains(&Op::SetLocal { slot: 0, modifier: AssignMod::Add }));
    }

    #[test]
    fn test_for_post_call_does_not_excuse_body_statement() {
        assert_eq!(
            error_message(
                "void function g() {} function main() { y = 1; for (i = 0; i < 3; g()) { y; } }"
            ),
            "Expected an assignment, call or return statement"
        );
        assert!(try_compile(
            "void function g() {} function main() { for (i = 0; i < 3; g()) { g(); } }"
        )
        .is_ok());
    }

    #[test]
    fn test_pending_jump_overflow() {
        let breaks = "break; ".repeat(65);
        let source = format!("function main() {{ while (true) {{ {} }} }}", breaks);
        assert_eq!(error_message(&source), "Break statement overflow within loop");

        let within_limit = format!(
            "function main() {{ while (true) {{ {} }} }}",
            "break; ".repeat(64)
        );
        assert!(try_compile(&within_limit).is_ok());
    }

    #[test]
    fn test_nested_loops_keep_their_own_jumps() {
        let program = try_compile(
            "void function main() {
                 while (true) {
                     for (i = 0; i < 3; i += 1) { break; }
                     break;
                 }
             }",
        )
        .unwrap();
        let code = &program.chunks[0].code;
        let forward: Vec<usize> = code
            .iter()
            .enumerate()
            .filter_map(|(at, op)| match op {
                Op::Jump(offset) if *offset > 0 => Some((at as i32 + offset) as usize),
                _ => None,
            })
            .collect();
        assert_eq!(forward.len(), 2);
        assert!(forward[0] < forward[1]);
    }

    #[test]
    fn test_break_outside_loop() {
        assert_eq!(
            error_message("function main() { break; }"),
            "Break statement outside of loop"
        );
    }

    #[test]
    fn test_return_rules() {
        assert_eq!(
            error_message("void function main() { return 1; }"),
            "Expected ';' after return statement for void callable"
        );
        assert_eq!(
            error_message("function main() { return; }"),
            "Expected expression after return statement for non-void callable"
        );
    }

    #[test]
    fn test_jumps_are_relative_after_finalizing() {
        let program =
            try_compile("void function main() { i = 0; while (i < 3) { i += 1; } }").unwrap();
        let code = &program.chunks[0].code;
        let back = code
            .iter()
            .enumerate()
            .find_map(|(at, op)| match op {
                Op::Jump(offset) => Some((at, *offset)),
                _ => None,
            })
            .unwrap();
        assert!(back.1 < 0);
        assert!(matches!(code[(back.0 as i32 + back.1) as usize], Op::Less(_)));
    }

    #[test]
    fn test_for_loop_continue_lands_on_post_statement() {
        let program = try_compile(
            "void function main() { for (i = 0; i < 5; i += 1) { continue; } }",
        )
        .unwrap();
        let code = &program.chunks[0].code;
        let (at, offset) = code
            .iter()
            .enumerate()
            .find_map(|(at, op)| match op {
                Op::Jump(offset) if *offset > 0 => Some((at, *offset)),
                _ => None,
            })
            .unwrap();
        let target = (at as i32 + offset) as usize;
        assert!(matches!(code[target], Op::Constant(_)));
        assert!(matches!(
            code[target + 1],
            Op::SetLocal { modifier: AssignMod::Add, .. }
        ));
    }
}

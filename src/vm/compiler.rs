//! Single-pass token-to-bytecode compiler.
//!
//! There is no AST: declarations and statements are parsed by recursive
//! descent and expressions by precedence climbing, and every rule emits
//! directly into the chunk of the body being compiled. When a body ends, the
//! linker finalizes its locals and jumps; when the program ends, it resolves
//! classes and prelinked calls and compacts the global slots.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::config::CompilerLimits;
use crate::error::CompileError;
use crate::lexer::{SourceMap, Token, TokenKind, TokenStream};
use crate::natives::{self, NativeFunction};
use crate::object::class::{BUILTIN_CLASS_NAMES, FIRST_USER_CLASS};
use crate::object::{
    Callable, CallableKind, Class, ClassId, ClassTable, Heap, ObjRef, Object, Value,
};
use crate::reftable::RefTable;
use crate::span::Span;

use super::chunk::Chunk;
use super::opcode::Op;
use super::program::Program;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// What kind of body is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    #[default]
    Function,
    Method,
    Init,
}

/// Pending jumps of the innermost loops.
#[derive(Debug, Clone, Default)]
pub struct LoopContext {
    pub breaks: Vec<usize>,
    pub continues: Vec<usize>,
}

/// State of the body currently being compiled.
#[derive(Debug, Default)]
pub struct Body {
    pub chunk: Chunk,
    pub locals: RefTable,
    /// Local slots that are assigned somewhere in the body.
    pub set_locals: HashSet<u16>,
    /// Names declared with a `global x;` statement so far.
    pub forced_globals: HashSet<String>,
    pub kind: BodyKind,
    pub returns: bool,
    pub class: Option<ClassId>,
    pub loops: Vec<LoopContext>,
    /// Index of the most recently emitted call.
    pub last_call: Option<usize>,
}

/// The compiler: turns a token stream into a [`Program`].
pub struct Compiler {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
    pub(crate) global_decls: HashSet<String>,
    pub(crate) sources: SourceMap,
    pub(crate) limits: CompilerLimits,

    /// Const arena for strings and callables created while compiling.
    pub(crate) heap: Heap,
    pub(crate) strings: HashMap<Rc<str>, ObjRef>,

    pub(crate) classes: ClassTable,
    pub(crate) class_refs: RefTable,
    /// First reference to each class id, for undefined-class errors.
    pub(crate) class_uses: HashMap<ClassId, Span>,
    pub(crate) defined_classes: HashSet<ClassId>,
    /// `(child, parent, span)` links resolved once every class is known.
    pub(crate) parents: Vec<(ClassId, ClassId, Span)>,
    pub(crate) parent_init_uses: Vec<(ClassId, Span)>,

    pub(crate) globals: RefTable,
    pub(crate) global_values: Vec<Value>,
    pub(crate) function_refs: RefTable,

    pub(crate) chunks: Vec<Chunk>,
    pub(crate) body: Body,
    pub(crate) main: Option<(Value, bool)>,
}

impl Compiler {
    /// A compiler over `stream` with the builtin classes installed and
    /// `natives` bound to global slots.
    pub fn new(stream: TokenStream, natives: &[NativeFunction], limits: CompilerLimits) -> Self {
        let mut heap = Heap::default();
        let mut classes = ClassTable::with_builtins();
        natives::install_builtin_classes(&mut classes, &mut heap);

        let mut class_refs = RefTable::new();
        for name in BUILTIN_CLASS_NAMES {
            class_refs.slot(name);
        }

        let mut tokens = stream.tokens;
        if tokens.is_empty() {
            tokens.push(Token::eof(Span::default()));
        }

        let mut compiler = Self {
            tokens,
            current: 0,
            global_decls: stream.global_decls,
            sources: stream.sources,
            limits,
            heap,
            strings: HashMap::new(),
            classes,
            class_refs,
            class_uses: HashMap::new(),
            defined_classes: HashSet::new(),
            parents: Vec::new(),
            parent_init_uses: Vec::new(),
            globals: RefTable::new(),
            global_values: Vec::new(),
            function_refs: RefTable::new(),
            chunks: Vec::new(),
            body: Body::default(),
            main: None,
        };

        for native in natives {
            let value = compiler.alloc_callable(native.to_callable());
            if let Some(slot) = compiler.globals.slot(native.name) {
                compiler.set_global_value(slot, value);
            }
        }
        compiler
    }

    /// Compile the whole token stream.
    pub fn compile(mut self) -> CompileResult<Program> {
        while !self.is_at_end() {
            self.declaration()?;
        }
        self.link()
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current.saturating_sub(1)].clone()
    }

    pub(crate) fn peek(&self) -> &Token {
        let index = self.current.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let index = (self.current + n).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    pub(crate) fn previous_span(&self) -> Span {
        self.current
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind, message: &str) -> CompileResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    pub(crate) fn expect_identifier(&mut self, message: &str) -> CompileResult<(String, Span)> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let token = self.advance();
                Ok((name, token.span))
            }
            _ => Err(self.error_at_current(message)),
        }
    }

    pub(crate) fn error_at_current(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.current_span())
    }

    pub(crate) fn error_at_previous(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.previous_span())
    }

    // ===== Emission =====

    /// Emit at the location of the token just consumed.
    pub(crate) fn emit(&mut self, op: Op) -> usize {
        let span = self.previous_span();
        self.body.chunk.emit(op, span)
    }

    pub(crate) fn emit_at(&mut self, op: Op, span: Span) -> usize {
        self.body.chunk.emit(op, span)
    }

    pub(crate) fn emit_call(&mut self, op: Op, span: Span) -> usize {
        let index = self.body.chunk.emit(op, span);
        self.body.last_call = Some(index);
        index
    }

    pub(crate) fn make_constant(&mut self, value: Value, span: Span) -> CompileResult<u16> {
        let (index, _) = self.body.chunk.add_constant(value);
        u16::try_from(index).map_err(|_| CompileError::new("Too many constants in one body", span))
    }

    pub(crate) fn emit_constant(&mut self, value: Value, span: Span) -> CompileResult<usize> {
        let index = self.make_constant(value, span)?;
        Ok(self.emit_at(Op::Constant(index), span))
    }

    /// Remove the instruction at `index`. Pool entries it leaves unused are
    /// dropped when the body is finalized.
    pub(crate) fn discard_op(&mut self, index: usize) {
        self.body.chunk.remove(index);
    }

    // ===== Objects and slots =====

    /// The const string object for `text`, shared by every body.
    pub(crate) fn intern(&mut self, text: &str) -> Value {
        if let Some(r) = self.strings.get(text) {
            return Value::Object(*r);
        }
        let text: Rc<str> = Rc::from(text);
        let r = self.heap.alloc_const(Object::string(text.clone()));
        self.strings.insert(text, r);
        Value::Object(r)
    }

    pub(crate) fn string_constant(&mut self, text: &str, span: Span) -> CompileResult<u16> {
        let value = self.intern(text);
        self.make_constant(value, span)
    }

    pub(crate) fn alloc_callable(&mut self, callable: Callable) -> Value {
        Value::Object(self.heap.alloc_const(Object::callable(callable)))
    }

    pub(crate) fn local_slot(&mut self, name: &str, span: Span) -> CompileResult<u16> {
        self.body
            .locals
            .slot(name)
            .filter(|s| (*s as usize) < self.limits.max_ref_slots)
            .ok_or_else(|| CompileError::new("RefTable overflow", span))
    }

    pub(crate) fn global_slot(&mut self, name: &str, span: Span) -> CompileResult<u16> {
        let slot = self
            .globals
            .slot(name)
            .filter(|s| (*s as usize) < self.limits.max_ref_slots)
            .ok_or_else(|| CompileError::new("RefTable overflow", span))?;
        if self.global_values.len() <= slot as usize {
            self.global_values.resize(slot as usize + 1, Value::InternalNull);
        }
        Ok(slot)
    }

    pub(crate) fn set_global_value(&mut self, slot: u16, value: Value) {
        if self.global_values.len() <= slot as usize {
            self.global_values.resize(slot as usize + 1, Value::InternalNull);
        }
        self.global_values[slot as usize] = value;
    }

    /// The id of class `name`, reserving one for classes not declared yet.
    pub(crate) fn class_slot(&mut self, name: &str, span: Span) -> CompileResult<ClassId> {
        let id = self
            .class_refs
            .slot(name)
            .ok_or_else(|| CompileError::new("RefTable overflow", span))?;
        self.class_uses.entry(id).or_insert(span);
        Ok(id)
    }

    pub(crate) fn mark_local_set(&mut self, slot: u16) {
        self.body.set_locals.insert(slot);
    }

    // ===== Bodies =====

    pub(crate) fn begin_body(
        &mut self,
        name: &str,
        kind: BodyKind,
        returns: bool,
        class: Option<ClassId>,
    ) {
        self.body = Body {
            chunk: Chunk::new(name),
            kind,
            returns,
            class,
            ..Body::default()
        };
    }

    /// Parameter list after `(`, through `)`. Parameters become the first
    /// local slots after `self`.
    pub(crate) fn parameters(&mut self) -> CompileResult<Vec<String>> {
        let mut params: Vec<String> = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let (name, span) = self.expect_identifier("Expected parameter name")?;
                if params.contains(&name) {
                    return Err(CompileError::new(format!("Duplicate parameter '{}'", name), span));
                }
                if params.len() >= self.limits.max_arguments {
                    return Err(CompileError::new("Too many parameters", span));
                }
                let slot = self.local_slot(&name, span)?;
                self.mark_local_set(slot);
                params.push(name);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    // ===== Declarations =====

    fn declaration(&mut self) -> CompileResult<()> {
        if self.match_token(&TokenKind::Class) {
            self.class_declaration()
        } else if self.match_token(&TokenKind::Function) {
            self.function_declaration(true)
        } else if self.match_token(&TokenKind::Void) {
            self.expect(&TokenKind::Function, "Expected 'function' after 'void'")?;
            self.function_declaration(false)
        } else {
            Err(self.error_at_current("Unexpected token"))
        }
    }

    fn function_declaration(&mut self, returns: bool) -> CompileResult<()> {
        let (name, span) = self.expect_identifier("Expected function name")?;
        self.begin_body(&name, BodyKind::Function, returns, None);
        self.expect(&TokenKind::LeftParen, "Expected '(' after function name")?;
        let params = self.parameters()?;

        let is_main = name == "main";
        if is_main && (params.len() > 1 || params.iter().any(|p| p != "inArgs")) {
            return Err(CompileError::new(
                "main function can only have one argument: \"inArgs\" or no arguments",
                span,
            ));
        }

        self.block()?;
        let chunk = self.finish_body()?;
        let callable = Callable::compiled(
            name.as_str(),
            params.len() as u8,
            returns,
            CallableKind::Function,
            chunk,
        );
        let value = self.alloc_callable(callable);

        let slot = self.global_slot(&name, span)?;
        if !self.global_values[slot as usize].is_internal_null() {
            return Err(CompileError::new(
                format!("Duplicate definition of function '{}'", name),
                span,
            ));
        }
        self.set_global_value(slot, value);
        if is_main {
            self.main = Some((value, !params.is_empty()));
        }
        Ok(())
    }

    fn class_declaration(&mut self) -> CompileResult<()> {
        let (name, span) = self.expect_identifier("Expected class name")?;
        let id = self.class_slot(&name, span)?;
        if id < FIRST_USER_CLASS {
            return Err(CompileError::new(
                format!("Cannot redefine builtin class '{}'", name),
                span,
            ));
        }
        if !self.defined_classes.insert(id) {
            return Err(CompileError::new(format!("Duplicate class '{}'", name), span));
        }

        let mut class = Class::new(id, name.as_str());
        if self.match_token(&TokenKind::LeftParen) {
            let (parent, parent_span) = self.expect_identifier("Expected parent class name")?;
            let parent_id = self.class_slot(&parent, parent_span)?;
            self.parents.push((id, parent_id, parent_span));
            self.expect(&TokenKind::RightParen, "Expected ')' after parent class")?;
        }
        self.expect(&TokenKind::LeftBrace, "Expected '{' after class name")?;

        let void_init =
            self.check(&TokenKind::Void) && self.peek_nth(1).kind == TokenKind::Init;
        if !void_init {
            let message = if self.check(&TokenKind::Init) {
                "Init method must be void"
            } else {
                "Expected init method"
            };
            return Err(self.error_at_current(message));
        }
        self.advance();
        self.advance();
        class.init = Some(self.method(&class, "init", BodyKind::Init, false)?);

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let returns = !self.match_token(&TokenKind::Void);
            if self.check(&TokenKind::Init) {
                return Err(self.error_at_current("Duplicate init method"));
            }
            let (method_name, method_span) = self.expect_identifier("Expected method name")?;
            let value = self.method(&class, &method_name, BodyKind::Method, returns)?;
            if class.attrs.insert(Rc::from(method_name.as_str()), value).is_some() {
                return Err(CompileError::new(
                    format!("Duplicate method '{}' in class '{}'", method_name, name),
                    method_span,
                ));
            }
        }
        self.expect(&TokenKind::RightBrace, "Expected '}' after class body")?;
        self.classes.insert(class);
        Ok(())
    }

    /// Compile one method body; `self` occupies local slot 0.
    fn method(
        &mut self,
        class: &Class,
        name: &str,
        kind: BodyKind,
        returns: bool,
    ) -> CompileResult<Value> {
        let span = self.previous_span();
        self.begin_body(&format!("{}.{}", class.name, name), kind, returns, Some(class.id));
        let self_slot = self.local_slot("self", span)?;
        self.mark_local_set(self_slot);

        self.expect(&TokenKind::LeftParen, "Expected '(' after method name")?;
        let params = self.parameters()?;
        self.block()?;
        let chunk = self.finish_body()?;
        let callable = Callable::compiled(
            name,
            params.len() as u8,
            returns,
            CallableKind::Method,
            chunk,
        );
        Ok(self.alloc_callable(callable))
    }
}

/// Compile a token stream into a program.
pub fn compile(
    stream: TokenStream,
    natives: &[NativeFunction],
    limits: CompilerLimits,
) -> CompileResult<Program> {
    Compiler::new(stream, natives, limits).compile()
}

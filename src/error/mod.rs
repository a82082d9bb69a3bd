//! Error types for every phase: tokenizing, compiling and running.

pub mod report;

use crate::span::Span;
use thiserror::Error;

/// Tokenizer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unhandled current character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("String not closed at {0}")]
    UnterminatedString(Span),

    #[error("Invalid escape character '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),

    #[error("Invalid expression '{0}' at {1}")]
    InvalidOperator(char, Span),

    #[error("Invalid global statement at {0}")]
    InvalidGlobal(Span),

    #[error("Expected identifier after include at {0}")]
    InvalidInclude(Span),

    #[error("Could not load file '{name}' at {span}: {source}")]
    IncludeFailed {
        name: String,
        span: Span,
        #[source]
        source: std::io::Error,
    },
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn invalid_escape(c: char, span: Span) -> Self {
        Self::InvalidEscape(c, span)
    }

    pub fn invalid_number(s: String, span: Span) -> Self {
        Self::InvalidNumber(s, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
            Self::InvalidOperator(_, span) => *span,
            Self::InvalidGlobal(span) => *span,
            Self::InvalidInclude(span) => *span,
            Self::IncludeFailed { span, .. } => *span,
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{message} at {span}")]
    General { message: String, span: Span },

    #[error(transparent)]
    Lexer(#[from] LexerError),
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    /// The message without the location suffix.
    pub fn message(&self) -> String {
        match self {
            Self::General { message, .. } => message.clone(),
            Self::Lexer(err) => err.to_string(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::General { span, .. } => *span,
            Self::Lexer(err) => err.span(),
        }
    }
}

/// Runtime errors.
///
/// Runtime errors carry no location of their own: the VM attaches a
/// [`Traceback`] built from its call frames when the error escapes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("{0}")]
    UndefinedReference(String),

    #[error("Attribute not found: '{0}'")]
    AttributeNotFound(String),

    #[error("No operator function found for '{0}'")]
    NoOperator(String),

    #[error("Incorrect number of arguments: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },

    #[error("Object is not callable")]
    NotCallable,

    #[error("Callable has no output")]
    NoOutput,

    #[error("No return object for non-void callable")]
    NoReturnValue,

    #[error("List index out of range: {index} (length {length})")]
    IndexOutOfRange { index: f64, length: usize },

    #[error("Key not found in dictionary")]
    KeyNotFound,

    #[error("Element not found in list")]
    ElementNotFound,

    #[error("Stack overflow: {0}")]
    StackOverflow(String),

    #[error("Hash error: {0}")]
    Hash(String),

    #[error("Input error: {0}")]
    Io(String),

    #[error("{0}")]
    General(String),
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        Self::UndefinedReference(message.into())
    }

    pub fn attribute_not_found(name: impl Into<String>) -> Self {
        Self::AttributeNotFound(name.into())
    }

    pub fn no_operator(name: impl Into<String>) -> Self {
        Self::NoOperator(name.into())
    }

    pub fn wrong_arity(expected: usize, got: usize) -> Self {
        Self::WrongArity { expected, got }
    }

    pub fn stack_overflow(message: impl Into<String>) -> Self {
        Self::StackOverflow(message.into())
    }
}

/// One active call at the moment a runtime error escaped.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    /// Name of the executing callable.
    pub callable: String,
    /// Location of the instruction that was executing.
    pub span: Span,
}

/// Active calls, innermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traceback {
    pub frames: Vec<TraceFrame>,
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum CjError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Compile error: {0}")]
    Compile(CompileError),

    #[error("Runtime error: {error}")]
    Runtime {
        error: RuntimeError,
        traceback: Traceback,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CompileError> for CjError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Lexer(err) => Self::Lexer(err),
            other => Self::Compile(other),
        }
    }
}

impl CjError {
    /// Process exit status for this error (sysexits conventions).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Lexer(_) | Self::Compile(_) => 65,
            Self::Runtime { .. } => 70,
            Self::Io(_) => 74,
        }
    }

    /// The runtime error, if this is one.
    pub fn as_runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_error_flattens_out_of_compile_error() {
        let err: CjError = CompileError::from(LexerError::unterminated_string(Span::default())).into();
        assert!(matches!(err, CjError::Lexer(LexerError::UnterminatedString(_))));
        assert_eq!(err.exit_code(), 65);
    }

    #[test]
    fn test_runtime_messages() {
        assert_eq!(
            RuntimeError::wrong_arity(2, 3).to_string(),
            "Incorrect number of arguments: expected 2, got 3"
        );
        assert_eq!(
            RuntimeError::no_operator("_add").to_string(),
            "No operator function found for '_add'"
        );
    }

    #[test]
    fn test_compile_error_message_has_no_location() {
        let err = CompileError::new("Undefined class", Span::new(0, 3, 2, 5));
        assert_eq!(err.message(), "Undefined class");
        assert_eq!(err.to_string(), "Undefined class at line 2, column 5");
    }
}

//! Error reports for the terminal: a category line, the offending source
//! lines with a caret under the error column, and for runtime errors one
//! such block per active call frame.

use colored::Colorize;

use crate::highlight::SyntaxHighlighter;
use crate::lexer::SourceMap;
use crate::span::Span;

use super::{CjError, RuntimeError};

/// Source lines shown above the offending one.
const CONTEXT_LINES: usize = 2;

/// Width of the line-number gutter, including the separator.
const GUTTER: usize = 7;

/// Render `error`, taking source text from `sources`.
pub fn render(error: &CjError, sources: &SourceMap) -> String {
    let mut out = String::new();
    match error {
        CjError::Lexer(err) => {
            header(&mut out, "parsingError", &err.to_string());
            location(&mut out, err.span(), sources);
        }
        CjError::Compile(err) => {
            header(&mut out, "compilationError", &err.message());
            location(&mut out, err.span(), sources);
        }
        CjError::Runtime { error, traceback } => {
            header(&mut out, category(error), &error.to_string());
            out.push_str("Runtime traceback:\n");
            let depth = traceback.frames.len();
            for (i, frame) in traceback.frames.iter().enumerate() {
                out.push_str(&format!(
                    "\n{} {}\n",
                    format!("Call Frame [{}]:", depth - 1 - i).bold(),
                    frame.callable
                ));
                location(&mut out, frame.span, sources);
            }
        }
        CjError::Io(err) => header(&mut out, "ioError", &err.to_string()),
    }
    out
}

/// Report category for a runtime error.
pub fn category(error: &RuntimeError) -> &'static str {
    match error {
        RuntimeError::UndefinedReference(_) => "varError",
        RuntimeError::Hash(_) => "objHashError",
        RuntimeError::NotCallable | RuntimeError::NoOutput | RuntimeError::NoReturnValue => {
            "callableError"
        }
        RuntimeError::IndexOutOfRange { .. } | RuntimeError::ElementNotFound => "listError",
        RuntimeError::KeyNotFound => "dictError",
        _ => "runtimeError",
    }
}

fn header(out: &mut String, category: &str, message: &str) {
    out.push_str(&format!("{}: {}\n", category.red().bold(), message.bold()));
}

fn location(out: &mut String, span: Span, sources: &SourceMap) {
    let Some(file) = sources.get(span.source) else {
        return;
    };
    let Some(text) = file.line(span.line) else {
        return;
    };

    let first = span.line.saturating_sub(CONTEXT_LINES).max(1);
    for n in first..span.line {
        if let Some(context) = file.line(n) {
            out.push_str(&format!("{} {}\n", gutter(n), context.dimmed()));
        }
    }
    out.push_str(&format!(
        "{} {}\n",
        gutter(span.line),
        SyntaxHighlighter::new().highlight(text)
    ));

    let indent = " ".repeat(GUTTER + span.column.saturating_sub(1));
    out.push_str(&format!("{}{}\n", indent, "^".red().bold()));
    out.push_str(&format!(
        "{}In \"{}\": [line: {}, index: {}]\n",
        indent, file.name, span.line, span.column
    ));
}

fn gutter(line: usize) -> String {
    format!("{:>4} |", line).blue().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileError, TraceFrame, Traceback};

    fn sources() -> SourceMap {
        let mut sources = SourceMap::new();
        sources.add("main.cj", "one\ntwo\nthree\nfour x\n");
        sources.add("lib.cj", "lib line\n");
        sources
    }

    #[test]
    fn test_compile_error_shows_context_and_caret() {
        colored::control::set_override(false);
        let err = CjError::Compile(CompileError::new("Bad thing", Span::new(0, 1, 4, 6)));
        let text = render(&err, &sources());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "compilationError: Bad thing");
        assert_eq!(lines[1], "   2 | two");
        assert_eq!(lines[2], "   3 | three");
        assert_eq!(lines[3], "   4 | four x");
        assert_eq!(lines[4].find('^'), Some(GUTTER + 5));
        assert!(lines[5].ends_with("In \"main.cj\": [line: 4, index: 6]"));
    }

    #[test]
    fn test_first_line_has_no_context() {
        colored::control::set_override(false);
        let err = CjError::Compile(CompileError::new("Oops", Span::new(0, 1, 1, 1)));
        let text = render(&err, &sources());
        assert_eq!(text.lines().nth(1), Some("   1 | one"));
        assert_eq!(text.lines().nth(2).map(str::trim), Some("^"));
    }

    #[test]
    fn test_runtime_error_lists_frames_innermost_first() {
        colored::control::set_override(false);
        let err = CjError::Runtime {
            error: RuntimeError::KeyNotFound,
            traceback: Traceback {
                frames: vec![
                    TraceFrame {
                        callable: "lookup".into(),
                        span: Span::new(0, 1, 1, 1).in_source(1),
                    },
                    TraceFrame {
                        callable: "main".into(),
                        span: Span::new(0, 1, 2, 1),
                    },
                ],
            },
        };
        let text = render(&err, &sources());
        assert!(text.starts_with("dictError: Key not found in dictionary\nRuntime traceback:\n"));
        let inner = text.find("Call Frame [1]: lookup").unwrap();
        let outer = text.find("Call Frame [0]: main").unwrap();
        assert!(inner < outer);
        assert!(text.contains("In \"lib.cj\": [line: 1, index: 1]"));
        assert!(text.contains("In \"main.cj\": [line: 2, index: 1]"));
    }

    #[test]
    fn test_unknown_source_skips_location() {
        colored::control::set_override(false);
        let err = CjError::Compile(CompileError::new("Oops", Span::new(0, 1, 1, 1).in_source(9)));
        assert_eq!(render(&err, &sources()), "compilationError: Oops\n");
    }

    #[test]
    fn test_categories() {
        assert_eq!(category(&RuntimeError::undefined("x")), "varError");
        assert_eq!(category(&RuntimeError::ElementNotFound), "listError");
        assert_eq!(category(&RuntimeError::type_error("x")), "runtimeError");
    }
}

//! Lexer module for CJ.
//!
//! [`tokenize`] scans the main source and every file it includes into one
//! flat token stream. Pending sources are kept on a stack: a file is scanned to
//! completion first, then the most recently discovered include is expanded.

pub mod scanner;
pub mod source;
pub mod token;

use std::collections::HashSet;

use log::debug;

use crate::error::LexerError;

pub use scanner::Scanner;
pub use source::{FileLoader, MemoryLoader, SourceFile, SourceLoader, SourceMap};
pub use token::{Token, TokenKind};

/// The output of tokenizing a program.
#[derive(Debug, Clone)]
pub struct TokenStream {
    /// All tokens in compile order, ending with a single `Eof`.
    pub tokens: Vec<Token>,
    /// Every identifier that appears right after the `global` keyword.
    pub global_decls: HashSet<String>,
    pub sources: SourceMap,
}

/// Tokenize `text` (named `name` in diagnostics) and everything it includes.
pub fn tokenize(
    name: &str,
    text: &str,
    loader: &dyn SourceLoader,
) -> Result<TokenStream, LexerError> {
    tokenize_into(name, text, loader, &mut SourceMap::new())
}

/// Like [`tokenize`], recording each file in `sources` as it is read so that
/// a failed run still has the text needed to render its error.
pub fn tokenize_into(
    name: &str,
    text: &str,
    loader: &dyn SourceLoader,
    sources: &mut SourceMap,
) -> Result<TokenStream, LexerError> {
    let mut tokens = Vec::new();
    let mut global_decls = HashSet::new();
    let mut seen = HashSet::from([name.to_string()]);
    let mut pending = vec![sources.add(name, text)];
    let mut eof = None;

    while let Some(index) = pending.pop() {
        let Some(file) = sources.get(index) else {
            break;
        };
        let file_text = file.text.clone();
        let scanned = Scanner::new(&file_text, index).scan_tokens()?;
        debug!("scanned {} tokens from '{}'", scanned.len(), file.name);

        let mut iter = scanned.into_iter().peekable();
        while let Some(token) = iter.next() {
            match token.kind {
                TokenKind::Eof => eof = Some(token),
                TokenKind::Global => {
                    match iter.peek().map(|t| &t.kind) {
                        Some(TokenKind::Identifier(ident)) => {
                            global_decls.insert(ident.clone());
                        }
                        _ => return Err(LexerError::InvalidGlobal(token.span)),
                    }
                    tokens.push(token);
                }
                TokenKind::Include => {
                    let target = match iter.next().map(|t| t.kind) {
                        Some(TokenKind::Identifier(n)) | Some(TokenKind::Str(n)) => n,
                        _ => return Err(LexerError::InvalidInclude(token.span)),
                    };
                    if iter.peek().map(|t| &t.kind) == Some(&TokenKind::Semicolon) {
                        iter.next();
                    }
                    let failed = |source| LexerError::IncludeFailed {
                        name: target.clone(),
                        span: token.span,
                        source,
                    };
                    let resolved = loader.resolve(&target).map_err(failed)?;
                    if seen.insert(resolved.clone()) {
                        let included = loader.read(&resolved).map_err(failed)?;
                        debug!("including '{}'", resolved);
                        pending.push(sources.add(resolved, included));
                    }
                }
                _ => tokens.push(token),
            }
        }
    }

    tokens.push(eof.unwrap_or_else(|| Token::eof(Default::default())));
    Ok(TokenStream {
        tokens,
        global_decls,
        sources: sources.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn identifiers(stream: &TokenStream) -> Vec<String> {
        stream
            .tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Identifier(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_eof_at_end() {
        let loader = MemoryLoader::new().with_file("b", "b1");
        let stream = tokenize("main", "include b a1", &loader).unwrap();
        let eofs = stream
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Eof)
            .count();
        assert_eq!(eofs, 1);
        assert_eq!(stream.tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
    }

    #[test]
    fn test_includes_expand_last_in_first_out() {
        let loader = MemoryLoader::new()
            .with_file("first", "from_first")
            .with_file("second", "from_second");
        let stream = tokenize("main", "include first include second main_code", &loader).unwrap();
        assert_eq!(
            identifiers(&stream),
            vec!["main_code", "from_second", "from_first"]
        );
    }

    #[test]
    fn test_include_once() {
        let loader = MemoryLoader::new()
            .with_file("util.cj", "util_code include main")
            .with_file("main", "unused");
        let stream = tokenize("main", "include util include \"util.cj\" x", &loader).unwrap();
        assert_eq!(identifiers(&stream), vec!["x", "util_code"]);
        assert_eq!(stream.sources.len(), 2);
    }

    #[test]
    fn test_included_tokens_know_their_file() {
        let loader = MemoryLoader::new().with_file("lib", "\n\nlib_token");
        let stream = tokenize("main", "include lib main_token", &loader).unwrap();
        let lib_token = stream
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::Identifier("lib_token".into()))
            .unwrap();
        assert_eq!(lib_token.span.source, 1);
        assert_eq!(lib_token.span.line, 3);
        assert_eq!(stream.sources.get(1).unwrap().name, "lib");
    }

    #[test]
    fn test_global_declarations_collected() {
        let stream = tokenize(
            "main",
            "function f() { global counter; counter += 1; }",
            &MemoryLoader::new(),
        )
        .unwrap();
        assert!(stream.global_decls.contains("counter"));
        assert!(!stream.global_decls.contains("f"));
    }

    #[test]
    fn test_sources_survive_a_failed_include() {
        let loader = MemoryLoader::new().with_file("lib", "x = \"open");
        let mut sources = SourceMap::new();
        let result = tokenize_into("main", "include lib", &loader, &mut sources);
        assert!(matches!(result, Err(LexerError::UnterminatedString(_))));
        assert_eq!(sources.len(), 2);
        assert_eq!(sources.get(1).map(|f| f.name.as_str()), Some("lib"));
    }

    #[test]
    fn test_invalid_global_and_include() {
        let loader = MemoryLoader::new();
        assert!(matches!(
            tokenize("main", "global 3;", &loader),
            Err(LexerError::InvalidGlobal(_))
        ));
        assert!(matches!(
            tokenize("main", "include (", &loader),
            Err(LexerError::InvalidInclude(_))
        ));
        assert!(matches!(
            tokenize("main", "include nowhere", &loader),
            Err(LexerError::IncludeFailed { .. })
        ));
    }
}

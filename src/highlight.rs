//! Terminal syntax highlighting for CJ source, driven by the scanner.

use colored::Colorize;

use crate::lexer::token::{Token, TokenKind};
use crate::lexer::Scanner;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxHighlighter;

impl SyntaxHighlighter {
    pub fn new() -> Self {
        Self
    }

    /// Colorize `source`. Text that fails to scan is returned unchanged.
    pub fn highlight(&self, source: &str) -> String {
        match Scanner::new(source, 0).scan_tokens() {
            Ok(tokens) => self.render_highlighted(source, &tokens),
            Err(_) => source.to_string(),
        }
    }

    fn render_highlighted(&self, source: &str, tokens: &[Token]) -> String {
        let mut result = String::new();
        let mut last_end = 0;

        for token in tokens {
            if token.kind == TokenKind::Eof {
                break;
            }
            let Some(text) = source.get(token.span.start..token.span.end) else {
                continue;
            };
            result.push_str(&source[last_end..token.span.start]);
            result.push_str(&self.colorize_token(token, text));
            last_end = token.span.end;
        }

        result.push_str(&source[last_end..]);
        result
    }

    fn colorize_token(&self, token: &Token, text: &str) -> String {
        use TokenKind::*;

        match &token.kind {
            Number(_) => text.bright_blue().to_string(),
            Str(_) => text.bright_green().to_string(),
            True | False => text.bright_magenta().to_string(),
            None => text.cyan().to_string(),

            If | Elif | Else | While | For | Break | Continue | Return | Void | Is | Class
            | Function | SelfValue | New | ParentInit | Init | Global | Include => {
                text.bright_yellow().bold().to_string()
            }

            Plus | PlusEqual | Minus | MinusEqual | Star | StarEqual | Slash | SlashEqual
            | Percent | PercentEqual | Caret | CaretEqual | Equal | EqualEqual | BangEqual
            | Less | LessEqual | Greater | GreaterEqual | Bang | And | Or => text.red().to_string(),

            LeftParen | RightParen | LeftBrace | RightBrace | LeftBracket | RightBracket
            | Comma | Dot | Colon | Semicolon | DictStart | SetStart => {
                text.white().bold().to_string()
            }

            Identifier(_) => text.white().to_string(),
            Eof => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_output_preserves_source() {
        colored::control::set_override(false);
        let source = "function main() {\n  x = d{1: \"a\"}; # note\n}\n";
        assert_eq!(SyntaxHighlighter::new().highlight(source), source);
    }

    #[test]
    fn test_unscannable_source_is_unchanged() {
        let source = "x = \"open";
        assert_eq!(SyntaxHighlighter::new().highlight(source), source);
    }
}

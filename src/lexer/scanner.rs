//! Lexer/Scanner for CJ source code.

use crate::error::LexerError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The lexer transforms one source file into a stream of tokens.
pub struct Scanner<'a> {
    source: &'a str,
    source_index: u16,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
    /// Whether the previous token can end an operand; decides if `-1` is a literal.
    after_operand: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str, source_index: u16) -> Self {
        Self {
            source,
            source_index,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
            after_operand: false,
        }
    }

    /// Scan all tokens from the source, ending with `Eof`.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            self.after_operand = token.kind.ends_operand();
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments();
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Ok(self.make_token(TokenKind::Eof));
        };

        match c {
            '(' => Ok(self.make_token(TokenKind::LeftParen)),
            ')' => Ok(self.make_token(TokenKind::RightParen)),
            '{' => Ok(self.make_token(TokenKind::LeftBrace)),
            '}' => Ok(self.make_token(TokenKind::RightBrace)),
            '[' => Ok(self.make_token(TokenKind::LeftBracket)),
            ']' => Ok(self.make_token(TokenKind::RightBracket)),
            ',' => Ok(self.make_token(TokenKind::Comma)),
            '.' => Ok(self.make_token(TokenKind::Dot)),
            ':' => Ok(self.make_token(TokenKind::Colon)),
            ';' => Ok(self.make_token(TokenKind::Semicolon)),

            '+' => Ok(self.compound(TokenKind::PlusEqual, TokenKind::Plus)),
            '*' => Ok(self.compound(TokenKind::StarEqual, TokenKind::Star)),
            '/' => Ok(self.compound(TokenKind::SlashEqual, TokenKind::Slash)),
            '%' => Ok(self.compound(TokenKind::PercentEqual, TokenKind::Percent)),
            '^' => Ok(self.compound(TokenKind::CaretEqual, TokenKind::Caret)),
            '-' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::MinusEqual))
                } else if !self.after_operand && self.peek().is_some_and(|n| n.is_ascii_digit())
                {
                    self.scan_number()
                } else {
                    Ok(self.make_token(TokenKind::Minus))
                }
            }
            '=' => Ok(self.compound(TokenKind::EqualEqual, TokenKind::Equal)),
            '!' => Ok(self.compound(TokenKind::BangEqual, TokenKind::Bang)),
            '<' => Ok(self.compound(TokenKind::LessEqual, TokenKind::Less)),
            '>' => Ok(self.compound(TokenKind::GreaterEqual, TokenKind::Greater)),
            '&' => {
                if self.match_char('&') {
                    Ok(self.make_token(TokenKind::And))
                } else {
                    Err(LexerError::InvalidOperator(c, self.current_span()))
                }
            }
            '|' => {
                if self.match_char('|') {
                    Ok(self.make_token(TokenKind::Or))
                } else {
                    Err(LexerError::InvalidOperator(c, self.current_span()))
                }
            }

            '"' => self.scan_string(),

            c if c.is_ascii_digit() => self.scan_number(),

            // Container literal prefixes win over identifiers
            'd' if self.peek() == Some('{') => {
                self.advance();
                Ok(self.make_token(TokenKind::DictStart))
            }
            's' if self.peek() == Some('{') => {
                self.advance();
                Ok(self.make_token(TokenKind::SetStart))
            }

            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.scan_identifier()),

            _ => Err(LexerError::unexpected_char(c, self.current_span())),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                }
                Some('#') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self) -> Result<Token, LexerError> {
        let mut value = String::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(LexerError::unterminated_string(self.current_span()));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('"') => value.push('"'),
                        Some(c) => {
                            return Err(LexerError::invalid_escape(c, self.current_span()));
                        }
                        None => {
                            return Err(LexerError::unterminated_string(self.current_span()));
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(self.make_token(TokenKind::Str(value)))
    }

    /// Scan a number whose first character (digit or sign) is already consumed.
    fn scan_number(&mut self) -> Result<Token, LexerError> {
        let mut seen_dot = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
                if seen_dot {
                    self.advance();
                    while self.peek().is_some_and(|n| n.is_ascii_digit() || n == '.') {
                        self.advance();
                    }
                    let text = self.source[self.start_pos..self.current_pos].to_string();
                    return Err(LexerError::invalid_number(text, self.current_span()));
                }
                seen_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[self.start_pos..self.current_pos];
        let n: f64 = text
            .parse()
            .map_err(|_| LexerError::invalid_number(text.to_string(), self.current_span()))?;
        Ok(self.make_token(TokenKind::Number(n)))
    }

    fn scan_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let value = &self.source[self.start_pos..self.current_pos];
        let plain = value.chars().all(|c| c.is_ascii_alphabetic());
        let kind = if plain { TokenKind::keyword(value) } else { None }
            .unwrap_or_else(|| TokenKind::Identifier(value.to_string()));
        self.make_token(kind)
    }

    fn compound(&mut self, with_equal: TokenKind, alone: TokenKind) -> Token {
        if self.match_char('=') {
            self.make_token(with_equal)
        } else {
            self.make_token(alone)
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current_pos..].chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
        .in_source(self.source_index)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }
}

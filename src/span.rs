//! Source locations for tokens, instructions and diagnostics.

use std::fmt;

/// A region of source text.
///
/// `line` and `column` are 1-based and point at the first character of the
/// region. `source` indexes the [`SourceMap`](crate::lexer::SourceMap) so that
/// tokens coming from included files report the file they were read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    pub source: u16,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
            source: 0,
        }
    }

    /// The same region, attributed to another source file.
    pub fn in_source(mut self, source: u16) -> Self {
        self.source = source;
        self
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let span = Span::new(4, 9, 3, 7);
        assert_eq!(span.to_string(), "line 3, column 7");
    }

    #[test]
    fn test_in_source_keeps_position() {
        let span = Span::new(0, 1, 1, 1).in_source(3);
        assert_eq!(span.source, 3);
        assert_eq!(span.line, 1);
    }
}

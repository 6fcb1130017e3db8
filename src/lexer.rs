use std::{iter::Peekable, str::CharIndices};

use crate::token::{keyword, Span, Token, TokenKind};

/// Recoverable lexical error. The scan continues after recording one;
/// the caller decides whether a nonzero count aborts later stages.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub stage: &'static str,
    pub snippet: String,
}

impl LexError {
    fn new(message: impl Into<String>, line: usize, column: usize, snippet: String) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            stage: "lexer",
            snippet,
        }
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lexical error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token>,
    at_line_start: bool,
    line_has_content: bool,
    eof_reached: bool,
    line: usize,
    column: usize,
    errors: Vec<LexError>,
}

const INDENT_WIDTH: usize = 4;

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            at_line_start: true,
            line_has_content: false,
            eof_reached: false,
            line: 1,
            column: 0,
            errors: Vec::new(),
        }
    }

    /// Recoverable errors recorded so far, in source order.
    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<LexError> {
        self.errors
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            if let Some(token) = self.pending_tokens.pop() {
                return token;
            }

            if self.eof_reached {
                return Token::new(TokenKind::Eof, self.here());
            }

            if self.at_line_start {
                self.at_line_start = false;
                if let Some(token) = self.handle_indentation() {
                    return token;
                }
            }

            self.skip_inline_whitespace();

            let (start_idx, ch) = match self.chars.peek() {
                Some(&(idx, c)) => (idx, c),
                None => {
                    if self.line_has_content {
                        // Unterminated final line still closes with a newline.
                        self.line_has_content = false;
                        self.at_line_start = true;
                        return Token::new(TokenKind::Newline, self.here());
                    }
                    while self.indent_stack.len() > 1 {
                        self.indent_stack.pop();
                        let span = self.here();
                        self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                    }
                    if let Some(token) = self.pending_tokens.pop() {
                        return token;
                    }
                    self.eof_reached = true;
                    return Token::new(TokenKind::Eof, self.here());
                }
            };

            if ch == '#' {
                self.skip_comment();
                continue;
            }

            let start_line = self.line;
            let start_column = self.column;

            let single = |kind: TokenKind| {
                Token::new(
                    kind,
                    Span {
                        start: start_idx,
                        end: start_idx + 1,
                        line: start_line,
                        column: start_column,
                    },
                )
            };

            let token = match ch {
                '\n' => {
                    self.advance_char();
                    self.at_line_start = true;
                    self.line_has_content = false;
                    return single(TokenKind::Newline);
                }
                '+' => {
                    self.advance_char();
                    self.with_equal(TokenKind::Plus, TokenKind::PlusEqual, start_idx, start_line, start_column)
                }
                '-' => {
                    self.advance_char();
                    self.with_equal(TokenKind::Minus, TokenKind::MinusEqual, start_idx, start_line, start_column)
                }
                '*' => {
                    self.advance_char();
                    if matches!(self.chars.peek(), Some(&(_, '*'))) {
                        self.advance_char();
                        self.with_equal(
                            TokenKind::DoubleStar,
                            TokenKind::DoubleStarEqual,
                            start_idx,
                            start_line,
                            start_column,
                        )
                    } else {
                        self.with_equal(TokenKind::Star, TokenKind::StarEqual, start_idx, start_line, start_column)
                    }
                }
                '/' => {
                    self.advance_char();
                    if matches!(self.chars.peek(), Some(&(_, '/'))) {
                        self.advance_char();
                        self.with_equal(
                            TokenKind::DoubleSlash,
                            TokenKind::DoubleSlashEqual,
                            start_idx,
                            start_line,
                            start_column,
                        )
                    } else {
                        self.with_equal(TokenKind::Slash, TokenKind::SlashEqual, start_idx, start_line, start_column)
                    }
                }
                '%' => {
                    self.advance_char();
                    self.with_equal(TokenKind::Percent, TokenKind::PercentEqual, start_idx, start_line, start_column)
                }
                '=' => {
                    self.advance_char();
                    self.with_equal(TokenKind::Equal, TokenKind::EqualEqual, start_idx, start_line, start_column)
                }
                '<' => {
                    self.advance_char();
                    self.with_equal(TokenKind::Less, TokenKind::LessEqual, start_idx, start_line, start_column)
                }
                '>' => {
                    self.advance_char();
                    self.with_equal(TokenKind::Greater, TokenKind::GreaterEqual, start_idx, start_line, start_column)
                }
                '!' => {
                    self.advance_char();
                    if matches!(self.chars.peek(), Some(&(_, '='))) {
                        self.advance_char();
                        Token::new(
                            TokenKind::NotEqual,
                            Span {
                                start: start_idx,
                                end: start_idx + 2,
                                line: start_line,
                                column: start_column,
                            },
                        )
                    } else {
                        self.record_error("Illegal character '!'", start_line, start_column);
                        continue;
                    }
                }
                '(' => {
                    self.advance_char();
                    single(TokenKind::LParen)
                }
                ')' => {
                    self.advance_char();
                    single(TokenKind::RParen)
                }
                '[' => {
                    self.advance_char();
                    single(TokenKind::LBracket)
                }
                ']' => {
                    self.advance_char();
                    single(TokenKind::RBracket)
                }
                '{' => {
                    self.advance_char();
                    single(TokenKind::LBrace)
                }
                '}' => {
                    self.advance_char();
                    single(TokenKind::RBrace)
                }
                ',' => {
                    self.advance_char();
                    single(TokenKind::Comma)
                }
                ':' => {
                    self.advance_char();
                    single(TokenKind::Colon)
                }
                ';' => {
                    self.advance_char();
                    single(TokenKind::Semicolon)
                }
                '"' | '\'' => match self.read_string(start_idx, start_line, start_column) {
                    Some(token) => token,
                    None => continue,
                },
                '.' => {
                    if self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                        match self.read_number(start_idx, start_line, start_column) {
                            Some(token) => token,
                            None => continue,
                        }
                    } else {
                        self.advance_char();
                        single(TokenKind::Dot)
                    }
                }
                c if c.is_alphabetic() || c == '_' => {
                    self.read_identifier(start_idx, start_line, start_column)
                }
                c if c.is_ascii_digit() => {
                    match self.read_number(start_idx, start_line, start_column) {
                        Some(token) => token,
                        None => continue,
                    }
                }
                c => {
                    self.record_error(format!("Illegal character '{c}'"), start_line, start_column);
                    self.advance_char();
                    continue;
                }
            };

            self.line_has_content = true;
            return token;
        }
    }

    /// Measures the leading whitespace of the new line and turns the level
    /// change into Indent/Dedent tokens. Blank and comment-only lines are
    /// swallowed whole so they never open or close a block.
    fn handle_indentation(&mut self) -> Option<Token> {
        let level = loop {
            let mut width = 0usize;
            loop {
                match self.chars.peek() {
                    Some(&(_, ' ')) => {
                        self.advance_char();
                        width += 1;
                    }
                    Some(&(_, '\t')) => {
                        self.advance_char();
                        width = (width / INDENT_WIDTH + 1) * INDENT_WIDTH;
                    }
                    _ => break,
                }
            }
            match self.chars.peek() {
                Some(&(_, '\n')) => {
                    self.advance_char();
                    continue;
                }
                Some(&(_, '#')) => {
                    self.skip_comment();
                    continue;
                }
                Some(_) => break width,
                None => break 0,
            }
        };

        let current = *self.indent_stack.last().unwrap();
        let span = self.here();

        if level % INDENT_WIDTH != 0 {
            self.record_error(
                format!("Indentation of {level} spaces is not a multiple of {INDENT_WIDTH}"),
                span.line,
                span.column,
            );
            return None;
        }

        if level > current {
            if level != current + INDENT_WIDTH {
                self.record_error(
                    format!(
                        "Indent from {current} to {level} spaces must step by exactly {INDENT_WIDTH}"
                    ),
                    span.line,
                    span.column,
                );
                return None;
            }
            self.indent_stack.push(level);
            return Some(Token::new(TokenKind::Indent, span));
        }

        if level < current {
            while let Some(&top) = self.indent_stack.last() {
                if top > level {
                    self.indent_stack.pop();
                    self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                } else {
                    break;
                }
            }
            if *self.indent_stack.last().unwrap() != level {
                self.record_error(
                    format!("Dedent to {level} spaces does not match any open block"),
                    span.line,
                    span.column,
                );
            }
            return self.pending_tokens.pop();
        }

        None
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token {
        self.advance_char();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let ident = &self.input[start..end_idx];
        let kind = keyword(ident).unwrap_or_else(|| TokenKind::Identifier(ident.to_string()));
        Token::new(
            kind,
            Span {
                start,
                end: end_idx,
                line,
                column,
            },
        )
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> Option<Token> {
        let mut is_float = false;
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else if c == '.' && !is_float {
                is_float = true;
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let text = &self.input[start..end_idx];
        let span = Span {
            start,
            end: end_idx,
            line,
            column,
        };

        if is_float {
            match text.parse::<f64>() {
                Ok(value) => Some(Token::new(TokenKind::Float(value), span)),
                Err(_) => {
                    self.record_error(format!("Invalid float literal '{text}'"), line, column);
                    None
                }
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => Some(Token::new(TokenKind::Integer(value), span)),
                Err(_) => {
                    self.record_error(format!("Invalid integer literal '{text}'"), line, column);
                    None
                }
            }
        }
    }

    /// Reads a single-, double- or triple-quoted string, converting the
    /// restricted escape set. Returns None when the literal is unusable.
    fn read_string(&mut self, start: usize, line: usize, column: usize) -> Option<Token> {
        let quote = self.advance_char().map(|(_, c)| c).unwrap();
        let triple = self.peek_pair(quote);
        if triple {
            self.advance_char();
            self.advance_char();
        }

        let mut content = String::new();
        loop {
            let (idx, c) = match self.chars.peek() {
                Some(&(idx, c)) => (idx, c),
                None => {
                    self.record_error("Unterminated string literal", line, column);
                    return None;
                }
            };

            if c == quote {
                if !triple {
                    self.advance_char();
                    return Some(Token::new(
                        TokenKind::Str(content),
                        Span {
                            start,
                            end: idx + 1,
                            line,
                            column,
                        },
                    ));
                }
                if self.peek_pair(quote) {
                    self.advance_char();
                    self.advance_char();
                    self.advance_char();
                    return Some(Token::new(
                        TokenKind::Str(content),
                        Span {
                            start,
                            end: idx + 3,
                            line,
                            column,
                        },
                    ));
                }
                self.advance_char();
                content.push(c);
                continue;
            }

            if c == '\n' && !triple {
                self.record_error("Unterminated string literal", line, column);
                return None;
            }

            if c == '\\' {
                self.advance_char();
                let escaped = match self.chars.peek() {
                    Some(&(_, e)) => e,
                    None => {
                        self.record_error("Unterminated string literal", line, column);
                        return None;
                    }
                };
                let err_line = self.line;
                let err_column = self.column;
                self.advance_char();
                match escaped {
                    'n' => content.push('\n'),
                    't' => content.push('\t'),
                    '\\' => content.push('\\'),
                    '"' => content.push('"'),
                    '\'' => content.push('\''),
                    other => {
                        self.record_error(
                            format!("Invalid escape sequence '\\{other}'"),
                            err_line,
                            err_column,
                        );
                    }
                }
                continue;
            }

            self.advance_char();
            content.push(c);
        }
    }

    fn with_equal(
        &mut self,
        bare: TokenKind,
        with_eq: TokenKind,
        start: usize,
        line: usize,
        column: usize,
    ) -> Token {
        let kind = if matches!(self.chars.peek(), Some(&(_, '='))) {
            self.advance_char();
            with_eq
        } else {
            bare
        };
        let end = self.current_index();
        Token::new(
            kind,
            Span {
                start,
                end,
                line,
                column,
            },
        )
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == ' ' || c == '\t' {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    fn record_error(&mut self, message: impl Into<String>, line: usize, column: usize) {
        let snippet = self.source_line();
        self.errors.push(LexError::new(message, line, column, snippet));
    }

    fn source_line(&mut self) -> String {
        let idx = self.current_index();
        let start = self.input[..idx.min(self.input.len())]
            .rfind('\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        let end = self.input[start..]
            .find('\n')
            .map(|p| start + p)
            .unwrap_or(self.input.len());
        self.input[start..end].to_string()
    }

    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek_second(&self) -> Option<char> {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.next().map(|(_, c)| c)
    }

    fn peek_pair(&self, quote: char) -> bool {
        let mut lookahead = self.chars.clone();
        matches!(
            (lookahead.next(), lookahead.next()),
            (Some((_, a)), Some((_, b))) if a == quote && b == quote
        )
    }

    fn here(&mut self) -> Span {
        let index = self.current_index();
        Span {
            start: index,
            end: index,
            line: self.line,
            column: self.column,
        }
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }
}

/// Scans the whole input, returning every token up to and including Eof
/// together with the recoverable errors recorded along the way.
pub fn tokenize(input: &str) -> (Vec<Token>, Vec<LexError>) {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    (tokens, lexer.into_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "unexpected lexical errors: {errors:?}");
        tokens.into_iter().map(|token| token.kind).collect()
    }

    fn errors(input: &str) -> Vec<LexError> {
        tokenize(input).1
    }

    #[test]
    fn simple_function_program() {
        let input = indoc! {"
            def fn():
                n = 4 + 4
                print(n)
            fn()
        "};
        let expected = vec![
            TokenKind::Def,
            TokenKind::Identifier("fn".to_string()),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("n".to_string()),
            TokenKind::Equal,
            TokenKind::Integer(4),
            TokenKind::Plus,
            TokenKind::Integer(4),
            TokenKind::Newline,
            TokenKind::Identifier("print".to_string()),
            TokenKind::LParen,
            TokenKind::Identifier("n".to_string()),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier("fn".to_string()),
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(input), expected);
    }

    #[test]
    fn nested_blocks_balance_indents_and_dedents() {
        let input = indoc! {"
            if a:
                if b:
                    x = 1
                y = 2
            z = 3
        "};
        let produced = kinds(input);
        let indents = produced
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Indent))
            .count();
        let dedents = produced
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Dedent))
            .count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
        // The inner block closes before the outer one.
        let first_dedent = produced
            .iter()
            .position(|kind| matches!(kind, TokenKind::Dedent))
            .unwrap();
        assert!(matches!(
            produced[first_dedent + 1],
            TokenKind::Identifier(ref name) if name == "y"
        ));
    }

    #[test]
    fn dedents_drain_at_end_of_input() {
        let input = "if a:\n    if b:\n        x = 1\n";
        let produced = kinds(input);
        let dedents = produced
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Dedent))
            .count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn rejects_indent_not_multiple_of_four() {
        let errs = errors("if a:\n  x = 1\n");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("not a multiple of 4"));
        assert_eq!(errs[0].stage, "lexer");
    }

    #[test]
    fn rejects_overwide_indent_step() {
        let errs = errors("if a:\n        x = 1\n");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("step by exactly 4"));
    }

    #[test]
    fn rejects_dedent_to_unknown_level() {
        // 8 is never pushed, so dedenting from 4 straight past it is fine,
        // but dedenting to a level that was never opened is not.
        let input = indoc! {"
            if a:
                if b:
                    x = 1
               y = 2
        "};
        let errs = errors(input);
        assert!(errs
            .iter()
            .any(|e| e.message.contains("not a multiple of 4")
                || e.message.contains("does not match any open block")));
    }

    #[test]
    fn blank_and_comment_lines_do_not_touch_block_structure() {
        let input = indoc! {"
            if a:
                x = 1

                # a comment
                y = 2
        "};
        let produced = kinds(input);
        let indents = produced
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Indent))
            .count();
        let dedents = produced
            .iter()
            .filter(|kind| matches!(kind, TokenKind::Dedent))
            .count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn tabs_expand_to_four_columns() {
        let produced = kinds("if a:\n\tx = 1\n");
        assert!(produced.iter().any(|kind| matches!(kind, TokenKind::Indent)));
    }

    #[test]
    fn accepts_known_escapes() {
        let produced = kinds(r#"s = "a\nb\tc\\d\"e\'f""#);
        assert!(produced
            .iter()
            .any(|kind| matches!(kind, TokenKind::Str(s) if s == "a\nb\tc\\d\"e'f")));
    }

    #[test]
    fn rejects_unknown_escape() {
        let errs = errors(r#"s = "a\qb""#);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("Invalid escape sequence '\\q'"));
    }

    #[test]
    fn triple_quoted_string_spans_lines() {
        let produced = kinds("s = \"\"\"line one\nline two\"\"\"\n");
        assert!(produced
            .iter()
            .any(|kind| matches!(kind, TokenKind::Str(s) if s == "line one\nline two")));
    }

    #[test]
    fn compound_assignment_operators() {
        let produced = kinds("x += 1\nx //= 2\nx **= 3\n");
        assert!(produced.contains(&TokenKind::PlusEqual));
        assert!(produced.contains(&TokenKind::DoubleSlashEqual));
        assert!(produced.contains(&TokenKind::DoubleStarEqual));
    }

    #[test]
    fn float_literals() {
        let produced = kinds("a = 1.5\nb = .5\nc = 12.\n");
        assert!(produced.contains(&TokenKind::Float(1.5)));
        assert!(produced.contains(&TokenKind::Float(0.5)));
        assert!(produced.contains(&TokenKind::Float(12.0)));
    }

    #[test]
    fn records_illegal_character_and_continues() {
        let (tokens, errs) = tokenize("x = 1 @ 2\n");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("Illegal character '@'"));
        assert!(!errs[0].snippet.is_empty());
        // Both integers still make it through.
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Integer(1)));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Integer(2)));
    }

    #[test]
    fn records_integer_overflow() {
        let errs = errors("n = 99999999999999999999999999\n");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("Invalid integer literal"));
    }

    #[test]
    fn unterminated_line_still_emits_newline() {
        let produced = kinds("x = 1");
        assert_eq!(
            produced,
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Equal,
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }
}

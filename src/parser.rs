use thiserror::Error;

use crate::ast::{BinaryOp, ClassDef, Expression, ForTarget, FunctionDef, Program, Statement, UnaryOp};
use crate::token::{Token, TokenKind};

/// Syntax error carrying the offending token's description and location.
/// A parse failure yields no tree; there is no resynchronization.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Syntax error: expected {expected}, found {found} at line {line}, position {position}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub line: usize,
    pub position: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.current().kind {
            TokenKind::Def => self.parse_function_def().map(Statement::FunctionDef),
            TokenKind::Class => self.parse_class_def(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            _ => self.parse_simple_statement(),
        }
    }

    /// A one-line statement: assignment, return, pass, break, continue or a
    /// bare expression, terminated by a newline. Inline suites after a colon
    /// are restricted to these.
    fn parse_simple_statement(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().span.line;
        let statement = match &self.current().kind {
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Newline) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                Statement::Return { value, line }
            }
            TokenKind::Pass => {
                self.advance();
                Statement::Pass
            }
            TokenKind::Break => {
                self.advance();
                Statement::Break { line }
            }
            TokenKind::Continue => {
                self.advance();
                Statement::Continue { line }
            }
            TokenKind::Identifier(_) if self.peek_is(&TokenKind::Equal) => {
                let target = self.expect_identifier()?;
                self.advance(); // =
                let value = self.parse_expression()?;
                Statement::Assign { target, value, line }
            }
            TokenKind::Identifier(_) if self.peek_augassign().is_some() => {
                let target = self.expect_identifier()?;
                let op = self.current_augassign().expect("guarded by peek");
                self.advance(); // the compound operator
                let value = self.parse_expression()?;
                Statement::AugAssign { target, op, value, line }
            }
            _ => {
                let expr = self.parse_expression()?;
                if self.check(&TokenKind::Equal) {
                    let Expression::Attribute { object, name } = expr else {
                        return Err(self.error_here("newline"));
                    };
                    self.advance(); // =
                    let value = self.parse_expression()?;
                    self.end_of_statement()?;
                    return Ok(Statement::AttrAssign {
                        object,
                        attr: name,
                        value,
                        line,
                    });
                }
                Statement::Expr(expr)
            }
        };
        self.end_of_statement()?;
        Ok(statement)
    }

    fn parse_function_def(&mut self) -> Result<FunctionDef, ParseError> {
        let line = self.current().span.line;
        self.expect(TokenKind::Def)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(FunctionDef { name, params, body, line })
    }

    fn parse_class_def(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().span.line;
        self.expect(TokenKind::Class)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::Newline)?;
        self.expect(TokenKind::Indent)?;

        let mut constructor = None;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            if self.check(&TokenKind::Pass) {
                self.advance();
                self.end_of_statement()?;
                continue;
            }
            let method = self.parse_function_def()?;
            if method.name == "__init__" {
                constructor = Some(method);
            } else {
                methods.push(method);
            }
        }
        self.expect(TokenKind::Dedent)?;
        Ok(Statement::ClassDef(ClassDef {
            name,
            constructor,
            methods,
            line,
        }))
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().span.line;
        self.expect(TokenKind::If)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon)?;
        let then_body = self.parse_suite()?;

        let mut elif_parts = Vec::new();
        while self.check(&TokenKind::Elif) {
            self.advance();
            let elif_condition = self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            let elif_body = self.parse_suite()?;
            elif_parts.push((elif_condition, elif_body));
        }

        let else_body = if self.check(&TokenKind::Else) {
            self.advance();
            self.expect(TokenKind::Colon)?;
            Some(self.parse_suite()?)
        } else {
            None
        };

        Ok(Statement::If {
            condition,
            then_body,
            elif_parts,
            else_body,
            line,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().span.line;
        self.expect(TokenKind::While)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(Statement::While { condition, body, line })
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        let line = self.current().span.line;
        self.expect(TokenKind::For)?;
        let var = self.expect_identifier()?;
        self.expect(TokenKind::In)?;
        let iterable = self.parse_expression()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;

        let target = match iterable {
            Expression::Call { ref name, ref args, .. } if name == "range" => match args.len() {
                1 => ForTarget::Range {
                    start: None,
                    end: args[0].clone(),
                },
                2 => ForTarget::Range {
                    start: Some(args[0].clone()),
                    end: args[1].clone(),
                },
                n => {
                    return Err(ParseError {
                        expected: "range() with one or two arguments".to_string(),
                        found: format!("range() with {n} arguments"),
                        line,
                        position: self.current().span.start,
                    })
                }
            },
            other => ForTarget::Iterable(other),
        };

        Ok(Statement::For { var, target, body, line })
    }

    /// A block body: either a single inline simple statement, or
    /// `NEWLINE INDENT statements DEDENT`. The block boundaries are the
    /// scanner's structural tokens, never re-derived from columns here.
    fn parse_suite(&mut self) -> Result<Vec<Statement>, ParseError> {
        if !self.check(&TokenKind::Newline) {
            return Ok(vec![self.parse_simple_statement()?]);
        }
        self.advance(); // newline
        self.expect(TokenKind::Indent)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::Dedent)?;
        Ok(statements)
    }

    // Expression grammar, lowest to highest precedence:
    // or < and < not < comparison (nonassoc) < additive < multiplicative
    // < unary minus < power (right) < postfix < atom.

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_not()?;
        while self.check(&TokenKind::And) {
            self.advance();
            let right = self.parse_not()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_arith()?;
        let op = match self.comparison_op() {
            Some(op) => op,
            None => return Ok(left),
        };
        self.advance();
        let right = self.parse_arith()?;

        // Comparisons are non-associative: `a < b < c` is a grammar error.
        if self.comparison_op().is_some() {
            return Err(self.error_here("a single comparison"));
        }

        Ok(Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn comparison_op(&self) -> Option<BinaryOp> {
        match self.current().kind {
            TokenKind::EqualEqual => Some(BinaryOp::Eq),
            TokenKind::NotEqual => Some(BinaryOp::NotEq),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::LessEqual => Some(BinaryOp::LessEq),
            TokenKind::GreaterEqual => Some(BinaryOp::GreaterEq),
            _ => None,
        }
    }

    fn parse_arith(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = Expression::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.check(&TokenKind::Plus) {
            self.advance();
            return self.parse_unary();
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expression, ParseError> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::DoubleStar) {
            self.advance();
            // Right-associative: the exponent may itself be signed or a power.
            let exponent = self.parse_unary()?;
            return Ok(Expression::Binary {
                left: Box::new(base),
                op: BinaryOp::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.current().kind {
                TokenKind::LParen => {
                    let line = self.current().span.line;
                    let args = self.parse_call_args()?;
                    expr = match expr {
                        Expression::Identifier(name) if name == "str" && args.len() == 1 => {
                            Expression::StrConvert(Box::new(args.into_iter().next().unwrap()))
                        }
                        Expression::Identifier(name) => Expression::Call { name, args, line },
                        Expression::Attribute { object, name } => Expression::MethodCall {
                            object,
                            method: name,
                            args,
                            line,
                        },
                        _ => return Err(self.error_here("a callable name")),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    expr = Expression::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `base[i]`, `base[i:j]`, `base[:j]`, `base[i:]` — the bracket itself is
    /// already consumed.
    fn parse_subscript(&mut self, base: Expression) -> Result<Expression, ParseError> {
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        if self.check(&TokenKind::Colon) {
            self.advance();
            let upper = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.expect(TokenKind::RBracket)?;
            return Ok(Expression::Slice {
                base: Box::new(base),
                lower,
                upper,
            });
        }

        let index = lower.ok_or_else(|| self.error_here("an index expression"))?;
        self.expect(TokenKind::RBracket)?;
        Ok(Expression::Index {
            base: Box::new(base),
            index,
        })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_atom(&mut self) -> Result<Expression, ParseError> {
        let expr = match self.current().kind.clone() {
            TokenKind::Integer(value) => {
                self.advance();
                Expression::Integer(value)
            }
            TokenKind::Float(value) => {
                self.advance();
                Expression::Float(value)
            }
            TokenKind::Str(value) => {
                self.advance();
                Expression::Str(value)
            }
            TokenKind::True => {
                self.advance();
                Expression::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                Expression::Bool(false)
            }
            TokenKind::None => {
                self.advance();
                Expression::None
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Expression::Identifier(name)
            }
            TokenKind::LParen => {
                self.advance();
                let first = self.parse_expression()?;
                if self.check(&TokenKind::Comma) {
                    let mut items = vec![first];
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        if self.check(&TokenKind::RParen) {
                            break;
                        }
                        items.push(self.parse_expression()?);
                    }
                    self.expect(TokenKind::RParen)?;
                    Expression::Tuple(items)
                } else {
                    self.expect(TokenKind::RParen)?;
                    first
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_items_until(&TokenKind::RBracket)?;
                self.expect(TokenKind::RBracket)?;
                Expression::List(items)
            }
            TokenKind::LBrace => {
                self.advance();
                self.parse_brace_literal()?
            }
            _ => return Err(self.error_here("an expression")),
        };
        Ok(expr)
    }

    /// `{}` is an empty dict; `{k: v, ...}` a dict; `{a, b}` a set.
    fn parse_brace_literal(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::RBrace) {
            self.advance();
            return Ok(Expression::Dict(Vec::new()));
        }

        let first = self.parse_expression()?;
        if self.check(&TokenKind::Colon) {
            self.advance();
            let first_value = self.parse_expression()?;
            let mut entries = vec![(first, first_value)];
            while self.check(&TokenKind::Comma) {
                self.advance();
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_expression()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expression()?;
                entries.push((key, value));
            }
            self.expect(TokenKind::RBrace)?;
            return Ok(Expression::Dict(entries));
        }

        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expression::Set(items))
    }

    fn parse_items_until(&mut self, terminator: &TokenKind) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();
        if self.check(terminator) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
            if self.check(terminator) {
                break;
            }
        }
        Ok(items)
    }

    // Token-stream plumbing.

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek_augassign(&self) -> Option<BinaryOp> {
        Self::augassign_op(&self.peek().kind)
    }

    fn current_augassign(&self) -> Option<BinaryOp> {
        Self::augassign_op(&self.current().kind)
    }

    fn augassign_op(kind: &TokenKind) -> Option<BinaryOp> {
        match kind {
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Sub),
            TokenKind::StarEqual => Some(BinaryOp::Mul),
            TokenKind::SlashEqual => Some(BinaryOp::Div),
            TokenKind::PercentEqual => Some(BinaryOp::Mod),
            TokenKind::DoubleSlashEqual => Some(BinaryOp::FloorDiv),
            TokenKind::DoubleStarEqual => Some(BinaryOp::Pow),
            _ => None,
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.check(&TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        match self.current().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Semicolon => {
                self.advance();
                if self.check(&TokenKind::Newline) {
                    self.advance();
                }
                Ok(())
            }
            TokenKind::Eof | TokenKind::Dedent => Ok(()),
            _ => Err(self.error_here("newline")),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(&kind.describe()))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Identifier(name) = &self.current().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error_here("identifier"))
        }
    }

    fn error_here(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError {
            expected: expected.to_string(),
            found: token.kind.describe(),
            line: token.span.line,
            position: token.span.start,
        }
    }
}

/// Parses a full token stream into one root program node.
pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program, ParseError> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;

    fn parse(input: &str) -> Program {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "lexical errors: {errors:?}");
        parse_tokens(tokens).expect("parse failed")
    }

    fn parse_err(input: &str) -> ParseError {
        let (tokens, _) = tokenize(input);
        parse_tokens(tokens).expect_err("expected a syntax error")
    }

    #[test]
    fn parses_function_with_body() {
        let input = indoc! {"
            def fn():
                n = 4 + 4
                print(n)
            fn()
        "};
        let program = parse(input);

        let expected = Program {
            statements: vec![
                Statement::FunctionDef(FunctionDef {
                    name: "fn".to_string(),
                    params: vec![],
                    body: vec![
                        Statement::Assign {
                            target: "n".to_string(),
                            value: Expression::Binary {
                                left: Box::new(Expression::Integer(4)),
                                op: BinaryOp::Add,
                                right: Box::new(Expression::Integer(4)),
                            },
                            line: 2,
                        },
                        Statement::Expr(Expression::Call {
                            name: "print".to_string(),
                            args: vec![Expression::Identifier("n".to_string())],
                            line: 3,
                        }),
                    ],
                    line: 1,
                }),
                Statement::Expr(Expression::Call {
                    name: "fn".to_string(),
                    args: vec![],
                    line: 4,
                }),
            ],
        };

        assert_eq!(program, expected);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse("x = 1 + 2 * 3\n");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assignment");
        };
        assert_eq!(
            *value,
            Expression::Binary {
                left: Box::new(Expression::Integer(1)),
                op: BinaryOp::Add,
                right: Box::new(Expression::Binary {
                    left: Box::new(Expression::Integer(2)),
                    op: BinaryOp::Mul,
                    right: Box::new(Expression::Integer(3)),
                }),
            }
        );
    }

    #[test]
    fn power_is_right_associative() {
        let program = parse("x = 2 ** 3 ** 2\n");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assignment");
        };
        assert_eq!(
            *value,
            Expression::Binary {
                left: Box::new(Expression::Integer(2)),
                op: BinaryOp::Pow,
                right: Box::new(Expression::Binary {
                    left: Box::new(Expression::Integer(3)),
                    op: BinaryOp::Pow,
                    right: Box::new(Expression::Integer(2)),
                }),
            }
        );
    }

    #[test]
    fn comparison_chaining_is_rejected() {
        let err = parse_err("x = 1 < 2 < 3\n");
        assert!(err.expected.contains("single comparison"));
    }

    #[test]
    fn logical_precedence_below_comparison() {
        let program = parse("x = a < b and c > d\n");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assignment");
        };
        let Expression::Binary { op, .. } = value else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::And);
    }

    #[test]
    fn if_elif_else_blocks() {
        let input = indoc! {"
            if x < 0:
                y = 1
            elif x == 0:
                y = 2
            else:
                y = 3
        "};
        let program = parse(input);
        let Statement::If {
            elif_parts,
            else_body,
            ..
        } = &program.statements[0]
        else {
            panic!("expected if statement");
        };
        assert_eq!(elif_parts.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn inline_suite_after_colon() {
        let program = parse("if x: y = 1\n");
        let Statement::If { then_body, .. } = &program.statements[0] else {
            panic!("expected if statement");
        };
        assert_eq!(then_body.len(), 1);
    }

    #[test]
    fn for_range_forms() {
        let program = parse("for i in range(5):\n    print(i)\nfor j in range(2, 8):\n    pass\n");
        let Statement::For { target, .. } = &program.statements[0] else {
            panic!("expected for statement");
        };
        assert_eq!(
            *target,
            ForTarget::Range {
                start: None,
                end: Expression::Integer(5),
            }
        );
        let Statement::For { target, .. } = &program.statements[1] else {
            panic!("expected for statement");
        };
        assert!(matches!(target, ForTarget::Range { start: Some(_), .. }));
    }

    #[test]
    fn for_over_iterable() {
        let program = parse("for item in values:\n    print(item)\n");
        let Statement::For { target, .. } = &program.statements[0] else {
            panic!("expected for statement");
        };
        assert_eq!(
            *target,
            ForTarget::Iterable(Expression::Identifier("values".to_string()))
        );
    }

    #[test]
    fn collection_literals() {
        let program = parse("a = [1, 2, [3]]\nb = (1, 2)\nc = {1, 2}\nd = {\"k\": 1}\n");
        let values: Vec<_> = program
            .statements
            .iter()
            .map(|statement| match statement {
                Statement::Assign { value, .. } => value.clone(),
                _ => panic!("expected assignment"),
            })
            .collect();
        assert!(matches!(values[0], Expression::List(ref items) if items.len() == 3));
        assert!(matches!(values[1], Expression::Tuple(ref items) if items.len() == 2));
        assert!(matches!(values[2], Expression::Set(ref items) if items.len() == 2));
        assert!(matches!(values[3], Expression::Dict(ref entries) if entries.len() == 1));
    }

    #[test]
    fn index_and_slice() {
        let program = parse("a = xs[0]\nb = xs[1:3]\nc = xs[:2]\nd = xs[-1]\n");
        let Statement::Assign { value, .. } = &program.statements[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(
            value,
            Expression::Slice {
                lower: Some(_),
                upper: Some(_),
                ..
            }
        ));
        let Statement::Assign { value, .. } = &program.statements[2] else {
            panic!("expected assignment");
        };
        assert!(matches!(value, Expression::Slice { lower: None, .. }));
    }

    #[test]
    fn augmented_assignment() {
        let program = parse("x += 2\ny //= 3\n");
        assert!(matches!(
            program.statements[0],
            Statement::AugAssign {
                op: BinaryOp::Add,
                ..
            }
        ));
        assert!(matches!(
            program.statements[1],
            Statement::AugAssign {
                op: BinaryOp::FloorDiv,
                ..
            }
        ));
    }

    #[test]
    fn method_call_and_attribute_assignment() {
        let input = indoc! {"
            xs.append(4)
            self.total = 0
        "};
        let program = parse(input);
        assert!(matches!(
            program.statements[0],
            Statement::Expr(Expression::MethodCall { ref method, .. }) if method == "append"
        ));
        assert!(matches!(
            program.statements[1],
            Statement::AttrAssign { ref attr, .. } if attr == "total"
        ));
    }

    #[test]
    fn class_with_constructor_and_method() {
        let input = indoc! {"
            class Point:
                def __init__(self, x, y):
                    self.x = x
                    self.y = y
                def total(self):
                    return self.x + self.y
        "};
        let program = parse(input);
        let Statement::ClassDef(class) = &program.statements[0] else {
            panic!("expected class definition");
        };
        assert_eq!(class.name, "Point");
        assert!(class.constructor.is_some());
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].name, "total");
    }

    #[test]
    fn str_conversion_atom() {
        let program = parse("s = \"n = \" + str(42)\n");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assignment");
        };
        let Expression::Binary { right, .. } = value else {
            panic!("expected concatenation");
        };
        assert!(matches!(**right, Expression::StrConvert(_)));
    }

    #[test]
    fn unexpected_token_reports_location() {
        let err = parse_err("def 42():\n    pass\n");
        assert_eq!(err.line, 1);
        assert!(err.found.contains("integer"));
        assert!(err.expected.contains("identifier"));
    }
}

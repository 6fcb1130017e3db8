//! Optional error-checking pass. Collects diagnostics without blocking
//! code generation; the generator re-checks what it needs with its own,
//! stricter rules.

use std::collections::HashMap;

use crate::ast::{ClassDef, Expression, ForTarget, FunctionDef, Program, Statement};
use crate::symbols::{Category, SymbolTable, Type};

/// Built-ins the surface language may call without defining them.
const BUILTINS: [&str; 4] = ["print", "range", "len", "str"];

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub message: String,
    pub line: usize,
}

impl std::fmt::Display for SemanticError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

struct FunctionInfo {
    arity: usize,
    line: usize,
}

pub struct SemanticAnalyzer {
    symbols: SymbolTable,
    functions: HashMap<String, FunctionInfo>,
    classes: HashMap<String, usize>,
    errors: Vec<SemanticError>,
    in_function: bool,
    loop_depth: usize,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            functions: HashMap::new(),
            classes: HashMap::new(),
            errors: Vec::new(),
            in_function: false,
            loop_depth: 0,
        }
    }

    /// Runs the pass and returns every diagnostic found, in source order.
    pub fn analyze(mut self, program: &Program) -> Vec<SemanticError> {
        // Signatures first, so calls ahead of a definition still resolve.
        for statement in &program.statements {
            match statement {
                Statement::FunctionDef(def) => self.register_function(def),
                Statement::ClassDef(class) => self.register_class(class),
                _ => {}
            }
        }
        for statement in &program.statements {
            self.check_statement(statement);
        }
        self.errors
    }

    fn register_function(&mut self, def: &FunctionDef) {
        if self.functions.contains_key(&def.name) {
            self.error(
                format!("Function '{}' is already defined", def.name),
                def.line,
            );
            return;
        }
        self.functions.insert(
            def.name.clone(),
            FunctionInfo {
                arity: def.params.len(),
                line: def.line,
            },
        );
    }

    fn register_class(&mut self, class: &ClassDef) {
        // Instantiation arity excludes the implicit self parameter.
        let arity = class
            .constructor
            .as_ref()
            .map(|ctor| ctor.params.len().saturating_sub(1))
            .unwrap_or(0);
        self.classes.insert(class.name.clone(), arity);
    }

    fn check_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Assign { target, value, line } => {
                self.check_expression(value, *line);
                self.symbols
                    .insert(target, Type::Any, Some(*line), None, Category::Variable);
            }
            Statement::AugAssign { target, value, line, .. } => {
                if self.symbols.lookup(target).is_none() {
                    self.error(format!("Variable '{target}' is not defined"), *line);
                }
                self.check_expression(value, *line);
            }
            Statement::AttrAssign { object, value, line, .. } => {
                self.check_expression(object, *line);
                self.check_expression(value, *line);
            }
            Statement::FunctionDef(def) => self.check_function(def, false),
            Statement::ClassDef(class) => {
                if let Some(ctor) = &class.constructor {
                    self.check_function(ctor, true);
                }
                for method in &class.methods {
                    self.check_function(method, true);
                }
            }
            Statement::If {
                condition,
                then_body,
                elif_parts,
                else_body,
                line,
            } => {
                self.check_expression(condition, *line);
                self.check_block(then_body);
                for (elif_condition, elif_body) in elif_parts {
                    self.check_expression(elif_condition, *line);
                    self.check_block(elif_body);
                }
                if let Some(else_body) = else_body {
                    self.check_block(else_body);
                }
            }
            Statement::While { condition, body, line } => {
                self.check_expression(condition, *line);
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
            }
            Statement::For { var, target, body, line } => {
                match target {
                    ForTarget::Range { start, end } => {
                        if let Some(start) = start {
                            self.check_expression(start, *line);
                        }
                        self.check_expression(end, *line);
                    }
                    ForTarget::Iterable(iterable) => self.check_expression(iterable, *line),
                }
                self.loop_depth += 1;
                self.symbols.enter_scope(None);
                self.symbols
                    .insert(var, Type::Any, Some(*line), None, Category::LoopVariable);
                for inner in body {
                    self.check_statement(inner);
                }
                self.symbols.exit_scope();
                self.loop_depth -= 1;
            }
            Statement::Return { value, line } => {
                if !self.in_function {
                    self.error("'return' outside of a function", *line);
                }
                if let Some(value) = value {
                    self.check_expression(value, *line);
                }
            }
            Statement::Break { line } => {
                if self.loop_depth == 0 {
                    self.error("'break' outside of a loop", *line);
                }
            }
            Statement::Continue { line } => {
                if self.loop_depth == 0 {
                    self.error("'continue' outside of a loop", *line);
                }
            }
            Statement::Pass => {}
            Statement::Expr(expr) => self.check_expression(expr, expr_line(expr)),
        }
    }

    fn check_function(&mut self, def: &FunctionDef, is_method: bool) {
        let was_in_function = self.in_function;
        let outer_loops = self.loop_depth;
        self.in_function = true;
        self.loop_depth = 0;
        self.symbols.enter_scope(Some(&def.name));
        for param in &def.params {
            self.symbols
                .insert(param, Type::Any, Some(def.line), None, Category::Parameter);
        }
        if is_method && !def.params.iter().any(|param| param == "self") {
            self.error(
                format!("Method '{}' is missing the self parameter", def.name),
                def.line,
            );
        }
        for statement in &def.body {
            self.check_statement(statement);
        }
        self.symbols.exit_scope();
        self.in_function = was_in_function;
        self.loop_depth = outer_loops;
    }

    fn check_block(&mut self, body: &[Statement]) {
        self.symbols.enter_scope(None);
        for statement in body {
            self.check_statement(statement);
        }
        self.symbols.exit_scope();
    }

    fn check_expression(&mut self, expr: &Expression, line: usize) {
        match expr {
            Expression::Identifier(name) => {
                if self.symbols.lookup(name).is_none() {
                    self.error(format!("Variable '{name}' is not defined"), line);
                }
            }
            Expression::Binary { left, right, .. } => {
                self.check_expression(left, line);
                self.check_expression(right, line);
            }
            Expression::Unary { operand, .. } => self.check_expression(operand, line),
            Expression::Call { name, args, line } => {
                for arg in args {
                    self.check_expression(arg, *line);
                }
                if BUILTINS.contains(&name.as_str()) {
                    return;
                }
                if let Some(info) = self.functions.get(name) {
                    if info.arity != args.len() {
                        let expected = info.arity;
                        let given = args.len();
                        self.error(
                            format!(
                                "Function '{name}' expects {expected} arguments, got {given} \
                                 (defined at line {})",
                                info.line
                            ),
                            *line,
                        );
                    }
                } else if let Some(&arity) = self.classes.get(name) {
                    if arity != args.len() {
                        self.error(
                            format!(
                                "Class '{name}' expects {arity} constructor arguments, got {}",
                                args.len()
                            ),
                            *line,
                        );
                    }
                } else {
                    self.error(format!("Function '{name}' is not defined"), *line);
                }
            }
            Expression::MethodCall { object, args, line, .. } => {
                self.check_expression(object, *line);
                for arg in args {
                    self.check_expression(arg, *line);
                }
            }
            Expression::StrConvert(inner) => self.check_expression(inner, line),
            Expression::Attribute { object, .. } => self.check_expression(object, line),
            Expression::List(items) | Expression::Tuple(items) | Expression::Set(items) => {
                for item in items {
                    self.check_expression(item, line);
                }
            }
            Expression::Dict(entries) => {
                for (key, value) in entries {
                    self.check_expression(key, line);
                    self.check_expression(value, line);
                }
            }
            Expression::Index { base, index } => {
                self.check_expression(base, line);
                self.check_expression(index, line);
            }
            Expression::Slice { base, lower, upper } => {
                self.check_expression(base, line);
                if let Some(lower) = lower {
                    self.check_expression(lower, line);
                }
                if let Some(upper) = upper {
                    self.check_expression(upper, line);
                }
            }
            Expression::Integer(_)
            | Expression::Float(_)
            | Expression::Bool(_)
            | Expression::Str(_)
            | Expression::None => {}
        }
    }

    fn error(&mut self, message: impl Into<String>, line: usize) {
        self.errors.push(SemanticError {
            message: message.into(),
            line,
        });
    }
}

fn expr_line(expr: &Expression) -> usize {
    match expr {
        Expression::Call { line, .. } | Expression::MethodCall { line, .. } => *line,
        _ => 0,
    }
}

/// Convenience entry point: analyze a program and return its diagnostics.
pub fn analyze(program: &Program) -> Vec<SemanticError> {
    SemanticAnalyzer::new().analyze(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;
    use indoc::indoc;

    fn diagnostics(input: &str) -> Vec<SemanticError> {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "lexical errors: {errors:?}");
        let program = parse_tokens(tokens).expect("parse failed");
        analyze(&program)
    }

    #[test]
    fn clean_program_has_no_diagnostics() {
        let input = indoc! {"
            def double(n):
                return n * 2
            x = 10
            y = double(x)
            print(y)
        "};
        assert!(diagnostics(input).is_empty());
    }

    #[test]
    fn undefined_variable() {
        let errs = diagnostics("print(no_such_var)\n");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("'no_such_var' is not defined"));
    }

    #[test]
    fn undefined_function() {
        let errs = diagnostics("missing()\n");
        assert!(errs[0].message.contains("'missing' is not defined"));
    }

    #[test]
    fn arity_mismatch() {
        let input = indoc! {"
            def add(a, b):
                return a + b
            add(1)
        "};
        let errs = diagnostics(input);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("expects 2 arguments, got 1"));
        assert_eq!(errs[0].line, 3);
    }

    #[test]
    fn forward_reference_call_is_fine() {
        let input = indoc! {"
            def outer(n):
                return inner(n)
            def inner(n):
                return n
        "};
        assert!(diagnostics(input).is_empty());
    }

    #[test]
    fn return_outside_function() {
        let errs = diagnostics("return 1\n");
        assert!(errs[0].message.contains("'return' outside of a function"));
    }

    #[test]
    fn break_and_continue_outside_loop() {
        let errs = diagnostics("break\ncontinue\n");
        assert_eq!(errs.len(), 2);
        assert!(errs[0].message.contains("'break' outside of a loop"));
        assert!(errs[1].message.contains("'continue' outside of a loop"));
    }

    #[test]
    fn loop_context_does_not_leak_into_functions() {
        let input = indoc! {"
            def f():
                break
        "};
        let errs = diagnostics(input);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("'break' outside of a loop"));
    }

    #[test]
    fn duplicate_function_definition() {
        let input = indoc! {"
            def f():
                pass
            def f():
                pass
        "};
        let errs = diagnostics(input);
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("'f' is already defined"));
    }

    #[test]
    fn loop_variable_is_defined_inside_body() {
        let input = indoc! {"
            for i in range(5):
                print(i)
        "};
        assert!(diagnostics(input).is_empty());
    }
}

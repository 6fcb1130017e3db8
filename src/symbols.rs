//! Scope-aware symbol table shared by the semantic pass and the code
//! generator. Types are inferred, never declared: a name's type is a
//! property of its most recent write.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expression, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    List,
    Dict,
    Set,
    Tuple,
    None,
    /// Element of a list or string, produced by indexed access.
    Element,
    /// Value of a dict, produced by keyed access.
    Value,
    Any,
    Unknown,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::Bool => "bool",
            Type::Str => "str",
            Type::List => "list",
            Type::Dict => "dict",
            Type::Set => "set",
            Type::Tuple => "tuple",
            Type::None => "None",
            Type::Element => "element",
            Type::Value => "value",
            Type::Any => "any",
            Type::Unknown => "unknown",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Variable,
    Parameter,
    LoopVariable,
    Function,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub scope_id: usize,
    pub line: Option<usize>,
    /// Literal value at declaration, when the right-hand side was one.
    pub value: Option<Expression>,
    pub category: Category,
    /// Version counter for the redeclare-on-retype scheme; 0 is the
    /// original declaration.
    pub version: u32,
}

#[derive(Debug)]
struct Scope {
    name: String,
    id: usize,
    symbols: HashMap<String, Symbol>,
}

/// Stack of lexical scopes, root ("global") first. Lookup walks from the
/// innermost scope outwards, so inner declarations shadow outer ones.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    scope_counter: usize,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                name: "global".to_string(),
                id: 0,
                symbols: HashMap::new(),
            }],
            scope_counter: 0,
        }
    }

    /// Pushes a new scope; unnamed scopes get a generated name. Every call
    /// must be paired with `exit_scope`, including on error paths.
    pub fn enter_scope(&mut self, name: Option<&str>) -> String {
        self.scope_counter += 1;
        let scope_name = match name {
            Some(name) => name.to_string(),
            None => format!("scope_{}", self.scope_counter),
        };
        self.scopes.push(Scope {
            name: scope_name.clone(),
            id: self.scope_counter,
            symbols: HashMap::new(),
        });
        scope_name
    }

    /// Pops the current scope; the root scope is never popped.
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn current_scope_name(&self) -> &str {
        &self.scopes.last().unwrap().name
    }

    /// Defines or overwrites a symbol in the current scope only.
    pub fn insert(
        &mut self,
        name: &str,
        ty: Type,
        line: Option<usize>,
        value: Option<Expression>,
        category: Category,
    ) -> &Symbol {
        let scope = self.scopes.last_mut().unwrap();
        let symbol = Symbol {
            name: name.to_string(),
            ty,
            scope_id: scope.id,
            line,
            value,
            category,
            version: 0,
        };
        scope.symbols.insert(name.to_string(), symbol);
        &scope.symbols[name]
    }

    /// Nearest match from the innermost scope outwards, or `None`. A missed
    /// lookup is not an error by itself; callers decide the severity.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.symbols.get_mut(name))
    }

    pub fn lookup_current_scope(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().unwrap().symbols.get(name)
    }

    /// Retypes an existing symbol in place; models dynamic retyping on
    /// reassignment. Returns false when the name is not bound anywhere.
    pub fn update_type(&mut self, name: &str, new_type: Type) -> bool {
        match self.lookup_mut(name) {
            Some(symbol) => {
                symbol.ty = new_type;
                true
            }
            None => false,
        }
    }

    /// Infers the static type of an expression. Pure: inference never
    /// mutates the node or the table, so re-running it is idempotent.
    pub fn infer_expression(&self, expr: &Expression) -> Type {
        match expr {
            // Bool is matched before any numeric interpretation: a boolean
            // literal must never be classified as an integer.
            Expression::Bool(_) => Type::Bool,
            Expression::Integer(_) => Type::Int,
            Expression::Float(_) => Type::Float,
            Expression::Str(_) => Type::Str,
            Expression::None => Type::None,
            Expression::List(_) => Type::List,
            Expression::Tuple(_) => Type::Tuple,
            Expression::Set(_) => Type::Set,
            Expression::Dict(_) => Type::Dict,
            Expression::Identifier(name) => self
                .lookup(name)
                .map(|symbol| symbol.ty)
                .unwrap_or(Type::Unknown),
            Expression::Binary { left, op, right } => self.infer_binary(left, *op, right),
            Expression::Unary { op, operand } => match op {
                UnaryOp::Not => Type::Bool,
                UnaryOp::Neg => self.infer_expression(operand),
            },
            Expression::Call { name, .. } => self
                .lookup(name)
                .map(|symbol| symbol.ty)
                .unwrap_or(Type::Any),
            Expression::MethodCall { .. } => Type::Any,
            Expression::StrConvert(_) => Type::Str,
            Expression::Attribute { .. } => Type::Any,
            Expression::Index { base, .. } => match self.infer_expression(base) {
                Type::List | Type::Str | Type::Tuple => Type::Element,
                Type::Dict => Type::Value,
                _ => Type::Any,
            },
            // A slice of a sequence has the sequence's own type.
            Expression::Slice { base, .. } => self.infer_expression(base),
        }
    }

    fn infer_binary(&self, left: &Expression, op: BinaryOp, right: &Expression) -> Type {
        if op.is_relational() || op.is_logical() {
            return Type::Bool;
        }

        let left = self.infer_expression(left);
        let right = self.infer_expression(right);

        // Integer division always yields an integer, whatever the operands.
        if op == BinaryOp::FloorDiv {
            return Type::Int;
        }
        if op == BinaryOp::Add && left == Type::Str && right == Type::Str {
            return Type::Str;
        }
        if left == Type::Float || right == Type::Float {
            return Type::Float;
        }
        if left == Type::Int && right == Type::Int {
            return Type::Int;
        }
        // Mixed or unknown numeric operands default to int.
        Type::Int
    }

    /// Unifies two operand types, or `None` when they are incompatible.
    /// Incompatibility is signalled, never silently coerced.
    pub fn check_type_compatibility(
        &self,
        first: Type,
        second: Type,
        operator: Option<BinaryOp>,
    ) -> Option<Type> {
        if first.is_numeric() && second.is_numeric() {
            return Some(if first == Type::Float || second == Type::Float {
                Type::Float
            } else {
                Type::Int
            });
        }
        if operator == Some(BinaryOp::Add) && first == Type::Str && second == Type::Str {
            return Some(Type::Str);
        }
        if first == second {
            return Some(first);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    #[test]
    fn arithmetic_promotion() {
        let table = SymbolTable::new();
        let int_add = binary(Expression::Integer(1), BinaryOp::Add, Expression::Integer(2));
        let mixed = binary(Expression::Integer(1), BinaryOp::Add, Expression::Float(2.0));
        let floats = binary(Expression::Float(1.0), BinaryOp::Add, Expression::Float(2.0));
        assert_eq!(table.infer_expression(&int_add), Type::Int);
        assert_eq!(table.infer_expression(&mixed), Type::Float);
        assert_eq!(table.infer_expression(&floats), Type::Float);
    }

    #[test]
    fn floor_division_is_always_int() {
        let table = SymbolTable::new();
        let expr = binary(
            Expression::Float(7.0),
            BinaryOp::FloorDiv,
            Expression::Float(2.0),
        );
        assert_eq!(table.infer_expression(&expr), Type::Int);
    }

    #[test]
    fn relational_logical_and_not_are_bool() {
        let table = SymbolTable::new();
        let rel = binary(Expression::Integer(1), BinaryOp::Less, Expression::Integer(2));
        let logic = binary(Expression::Bool(true), BinaryOp::And, Expression::Bool(false));
        let not = Expression::Unary {
            op: UnaryOp::Not,
            operand: Box::new(Expression::Bool(true)),
        };
        assert_eq!(table.infer_expression(&rel), Type::Bool);
        assert_eq!(table.infer_expression(&logic), Type::Bool);
        assert_eq!(table.infer_expression(&not), Type::Bool);
    }

    #[test]
    fn bool_literal_is_not_an_integer() {
        let table = SymbolTable::new();
        assert_eq!(table.infer_expression(&Expression::Bool(true)), Type::Bool);
        assert_eq!(table.infer_expression(&Expression::Integer(1)), Type::Int);
    }

    #[test]
    fn string_concatenation_is_str() {
        let table = SymbolTable::new();
        let expr = binary(
            Expression::Str("a".to_string()),
            BinaryOp::Add,
            Expression::Str("b".to_string()),
        );
        assert_eq!(table.infer_expression(&expr), Type::Str);
    }

    #[test]
    fn inference_is_idempotent() {
        let mut table = SymbolTable::new();
        table.insert("x", Type::Float, None, None, Category::Variable);
        let expr = binary(
            Expression::Identifier("x".to_string()),
            BinaryOp::Mul,
            Expression::Integer(3),
        );
        let first = table.infer_expression(&expr);
        let second = table.infer_expression(&expr);
        assert_eq!(first, second);
        assert_eq!(first, Type::Float);
    }

    #[test]
    fn call_uses_registered_return_type() {
        let mut table = SymbolTable::new();
        table.insert("area", Type::Float, None, None, Category::Function);
        let known = Expression::Call {
            name: "area".to_string(),
            args: vec![],
            line: 1,
        };
        let unknown = Expression::Call {
            name: "len".to_string(),
            args: vec![],
            line: 1,
        };
        assert_eq!(table.infer_expression(&known), Type::Float);
        assert_eq!(table.infer_expression(&unknown), Type::Any);
    }

    #[test]
    fn indexed_access_kinds() {
        let mut table = SymbolTable::new();
        table.insert("xs", Type::List, None, None, Category::Variable);
        table.insert("d", Type::Dict, None, None, Category::Variable);
        let list_index = Expression::Index {
            base: Box::new(Expression::Identifier("xs".to_string())),
            index: Box::new(Expression::Integer(0)),
        };
        let dict_index = Expression::Index {
            base: Box::new(Expression::Identifier("d".to_string())),
            index: Box::new(Expression::Str("k".to_string())),
        };
        assert_eq!(table.infer_expression(&list_index), Type::Element);
        assert_eq!(table.infer_expression(&dict_index), Type::Value);
    }

    #[test]
    fn shadowing_and_scope_exit() {
        let mut table = SymbolTable::new();
        table.insert("x", Type::Int, Some(1), None, Category::Variable);
        table.enter_scope(Some("inner"));
        table.insert("x", Type::Str, Some(2), None, Category::Variable);
        assert_eq!(table.lookup("x").unwrap().ty, Type::Str);
        table.exit_scope();
        assert_eq!(table.lookup("x").unwrap().ty, Type::Int);
    }

    #[test]
    fn root_scope_is_never_popped() {
        let mut table = SymbolTable::new();
        table.exit_scope();
        table.exit_scope();
        assert_eq!(table.depth(), 1);
        assert_eq!(table.current_scope_name(), "global");
    }

    #[test]
    fn update_type_retypes_in_place() {
        let mut table = SymbolTable::new();
        table.insert("x", Type::Int, None, None, Category::Variable);
        assert!(table.update_type("x", Type::Float));
        assert_eq!(table.lookup("x").unwrap().ty, Type::Float);
        assert!(!table.update_type("missing", Type::Int));
    }

    #[test]
    fn compatibility_rules() {
        let table = SymbolTable::new();
        assert_eq!(
            table.check_type_compatibility(Type::Int, Type::Float, Some(BinaryOp::Add)),
            Some(Type::Float)
        );
        assert_eq!(
            table.check_type_compatibility(Type::Str, Type::Str, Some(BinaryOp::Add)),
            Some(Type::Str)
        );
        assert_eq!(
            table.check_type_compatibility(Type::List, Type::List, None),
            Some(Type::List)
        );
        assert_eq!(
            table.check_type_compatibility(Type::Str, Type::Int, Some(BinaryOp::Add)),
            None
        );
    }
}

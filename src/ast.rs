//! Intermediate tree produced by the parser. Each construct is a closed
//! variant with named fields, so the code generator dispatches with an
//! exhaustive match instead of a tag lookup.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::FloorDiv
                | BinaryOp::Mod
                | BinaryOp::Pow
        )
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Less
                | BinaryOp::Greater
                | BinaryOp::LessEq
                | BinaryOp::GreaterEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Python spelling, used in diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEq => "<=",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
    Identifier(String),
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Call {
        name: String,
        args: Vec<Expression>,
        line: usize,
    },
    MethodCall {
        object: Box<Expression>,
        method: String,
        args: Vec<Expression>,
        line: usize,
    },
    /// `str(expr)` numeric-to-string conversion.
    StrConvert(Box<Expression>),
    /// `obj.attr` read, used for instance fields.
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Set(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    /// Half-open slice `base[lower:upper]`; either bound may be omitted.
    Slice {
        base: Box<Expression>,
        lower: Option<Box<Expression>>,
        upper: Option<Box<Expression>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// `__init__`, when present; its first parameter is `self`.
    pub constructor: Option<FunctionDef>,
    pub methods: Vec<FunctionDef>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForTarget {
    /// `for x in range(end)` / `range(start, end)`, lowered to a counted loop.
    Range {
        start: Option<Expression>,
        end: Expression,
    },
    /// `for x in seq`, lowered to an in-order element iteration.
    Iterable(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        target: String,
        value: Expression,
        line: usize,
    },
    AugAssign {
        target: String,
        op: BinaryOp,
        value: Expression,
        line: usize,
    },
    /// `obj.attr = value`, used inside constructors and methods.
    AttrAssign {
        object: Box<Expression>,
        attr: String,
        value: Expression,
        line: usize,
    },
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        elif_parts: Vec<(Expression, Vec<Statement>)>,
        else_body: Option<Vec<Statement>>,
        line: usize,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        line: usize,
    },
    For {
        var: String,
        target: ForTarget,
        body: Vec<Statement>,
        line: usize,
    },
    Return {
        value: Option<Expression>,
        line: usize,
    },
    Break {
        line: usize,
    },
    Continue {
        line: usize,
    },
    Pass,
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

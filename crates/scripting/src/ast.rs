//! Script Abstract Syntax Tree

use crate::bytecode::Value;
use crate::lexer::Token;

/// Script expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number literal
    Number(f64),

    /// String literal
    String(String),

    /// Boolean literal
    Bool(bool),

    /// Null literal
    Null,

    /// Resolved bracket expression (`<item:stone>`)
    Bracket { path: String, value: Value },

    /// Variable reference
    Variable { name: String, line: usize },

    /// Assignment to a local or global
    Assign {
        name: String,
        value: Box<Expr>,
        line: usize,
    },

    /// Binary operation
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
        line: usize,
    },

    /// Short-circuiting `&&` / `||`
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
        line: usize,
    },

    /// Unary operation
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        line: usize,
    },

    /// Function call by name
    Call {
        name: String,
        args: Vec<Expr>,
        line: usize,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,

    // Comparison
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl BinaryOp {
    pub fn from_token(token: &Token) -> Option<Self> {
        Some(match token {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Mod,
            Token::Tilde => BinaryOp::Concat,
            Token::Equal => BinaryOp::Equal,
            Token::NotEqual => BinaryOp::NotEqual,
            Token::Less => BinaryOp::Less,
            Token::Greater => BinaryOp::Greater,
            Token::LessEqual => BinaryOp::LessEqual,
            Token::GreaterEqual => BinaryOp::GreaterEqual,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

/// Script statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Expression statement
    Expr(Expr),

    /// `var` (mutable) or `val` (immutable) local
    Var {
        name: String,
        mutable: bool,
        initializer: Option<Expr>,
        line: usize,
    },

    /// If statement
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// While loop
    While { condition: Expr, body: Box<Stmt> },

    /// Return statement
    Return { value: Option<Expr>, line: usize },

    /// Block statement
    Block(Vec<Stmt>),

    /// Empty statement
    Empty,
}

/// Top-level `global name = value;`
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDecl {
    pub name: String,
    pub initializer: Expr,
    pub line: usize,
}

/// Top-level `function name(params) { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

/// One parsed script unit
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFile {
    /// External unit name
    pub name: String,
    /// Internal artifact name
    pub artifact_name: String,
    pub globals: Vec<GlobalDecl>,
    pub functions: Vec<FunctionDecl>,
    pub statements: Vec<Stmt>,
}

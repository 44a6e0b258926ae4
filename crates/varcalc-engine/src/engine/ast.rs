use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed formula expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// The value of this expression if it is pure data-literal syntax
    /// (numbers, strings, booleans, `null`, arrays and objects of literals).
    pub fn as_literal(&self) -> Option<Value> {
        match self {
            Expr::Literal(v) => Some(v.clone()),
            Expr::Unary(UnaryOp::Neg, inner) => match inner.as_ref() {
                Expr::Literal(Value::Number(n)) => Some(Value::Number(-n)),
                _ => None,
            },
            Expr::Array(items) => items
                .iter()
                .map(Expr::as_literal)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Expr::Object(entries) => entries
                .iter()
                .map(|(key, expr)| expr.as_literal().map(|v| (key.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Value::Object),
            _ => None,
        }
    }
}

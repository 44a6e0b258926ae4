//! Tree-walking interpreter for parsed expressions.

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{FormulaError, Result};
use crate::registry::CallContext;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Identifier bindings visible to an expression (function parameters).
pub type Scope = HashMap<String, Value>;

/// Evaluate `expr` with `scope` bound, resolving calls through `ctx`.
///
/// `IF` is a special form here: only the selected branch is evaluated, so
/// recursive function bodies terminate.
pub fn evaluate(expr: &Expr, scope: &Scope, ctx: &CallContext<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| FormulaError::UndefinedIdentifier(name.clone())),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope, ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Expr::Object(entries) => entries
            .iter()
            .map(|(key, item)| Ok((key.clone(), evaluate(item, scope, ctx)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Object),
        Expr::Unary(op, inner) => {
            let v = evaluate(inner, scope, ctx)?;
            Ok(match op {
                UnaryOp::Neg => Value::Number(-v.to_number()),
                UnaryOp::Plus => Value::Number(v.to_number()),
                UnaryOp::Not => Value::Bool(!v.is_truthy()),
            })
        }
        Expr::And(lhs, rhs) => {
            let l = evaluate(lhs, scope, ctx)?;
            if l.is_truthy() {
                evaluate(rhs, scope, ctx)
            } else {
                Ok(l)
            }
        }
        Expr::Or(lhs, rhs) => {
            let l = evaluate(lhs, scope, ctx)?;
            if l.is_truthy() {
                Ok(l)
            } else {
                evaluate(rhs, scope, ctx)
            }
        }
        Expr::Conditional(cond, then_e, else_e) => {
            if evaluate(cond, scope, ctx)?.is_truthy() {
                evaluate(then_e, scope, ctx)
            } else {
                evaluate(else_e, scope, ctx)
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = evaluate(lhs, scope, ctx)?;
            let r = evaluate(rhs, scope, ctx)?;
            Ok(binary(*op, &l, &r))
        }
        Expr::Call { name, args } if name.eq_ignore_ascii_case("IF") => {
            let cond = match args.first() {
                Some(c) => evaluate(c, scope, ctx)?,
                None => Value::Null,
            };
            let branch = if cond.is_truthy() { 1 } else { 2 };
            match args.get(branch) {
                Some(e) => evaluate(e, scope, ctx),
                None => Ok(Value::Null),
            }
        }
        Expr::Call { name, args } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, scope, ctx))
                .collect::<Result<Vec<_>>>()?;
            ctx.call(name, &values)
        }
    }
}

/// Apply a binary operator with dynamic-language coercions.
pub fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if is_textual(l) || is_textual(r) {
                Value::String(format!("{}{}", l.to_text(), r.to_text()))
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinaryOp::StrictEq => Value::Bool(l == r),
        BinaryOp::StrictNe => Value::Bool(l != r),
        BinaryOp::Lt => Value::Bool(l.compare(r) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            l.compare(r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(l.compare(r) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            l.compare(r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
    }
}

fn is_textual(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_))
}

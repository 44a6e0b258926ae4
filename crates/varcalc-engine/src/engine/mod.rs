//! Formula evaluation API.
//!
//! - [`FormulaEvaluator`] - Evaluate formula strings with caching
//! - [`EvaluationContext`], [`ContextUpdate`] - Static variables, clock and seed
//! - [`parse_expression`], [`Expr`] - The expression language
//! - [`evaluate`] - Tree-walking interpreter used for final reduction and custom bodies
//! - [`extract_references`], [`substitute_variables`] - Text-level formula rewriting

mod ast;
mod context;
mod eval;
mod interp;
mod lexer;
mod parser;
mod scan;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use context::{ContextUpdate, EvaluationContext, RandomSource};
pub use eval::{EvaluationResult, FormulaEvaluator, ResultType, VariableSource};
pub use interp::{Scope, binary, evaluate};
pub use parser::parse_expression;
pub use scan::{
    CallSite, RESERVED_WORDS, extract_references, find_innermost_call, mask_string_literals,
    split_arguments, substitute_variables,
};

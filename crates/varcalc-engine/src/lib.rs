//! varcalc-engine - formula parsing, evaluation and the function library.

pub mod builtins;
pub mod custom;
pub mod engine;
pub mod error;
pub mod registry;
pub mod value;

pub use custom::{CustomFunctionDefinition, CustomFunctionManager};
pub use engine::{
    ContextUpdate, EvaluationContext, EvaluationResult, FormulaEvaluator, ResultType,
    VariableSource, extract_references,
};
pub use error::{FormulaError, Result};
pub use registry::{
    CallContext, FormulaFunction, FunctionCategory, FunctionParameter, FunctionRegistry, ParamType,
};
pub use value::Value;

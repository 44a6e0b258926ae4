//! varcalc - formula-driven variables with dependency tracking.
//!
//! - [`varcalc_engine`]: values, the expression language, [`FormulaEvaluator`],
//!   the function registry and built-ins, [`CustomFunctionManager`]
//! - [`varcalc_core`]: [`Variable`] definitions and the [`VariableEngine`]

pub use varcalc_core::{
    Snapshot, ValidationRules, Variable, VariableEngine, VariableError, VariableScope,
    VariableType,
};
pub use varcalc_engine::{
    CallContext, ContextUpdate, CustomFunctionDefinition, CustomFunctionManager,
    EvaluationContext, EvaluationResult, FormulaError, FormulaEvaluator, FormulaFunction,
    FunctionCategory, FunctionParameter, FunctionRegistry, ParamType, ResultType, Value,
};

pub use varcalc_core;
pub use varcalc_engine;

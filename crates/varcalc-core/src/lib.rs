//! varcalc-core - variable definitions and the dependency-tracking variable engine.

pub mod engine;
pub mod error;
pub mod validation;
pub mod variable;

pub use engine::{Snapshot, VariableEngine};
pub use error::{Result, VariableError};
pub use validation::ValidationRules;
pub use variable::{Variable, VariableScope, VariableType};

pub use varcalc_engine::Value;

//! Variable definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use varcalc_engine::Value;

use crate::validation::ValidationRules;

/// Declared type of a variable, checked on [`set_variable`](crate::VariableEngine::set_variable).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Number,
    String,
    Boolean,
    /// Timestamp in milliseconds or a date string.
    Date,
    Time,
    Array,
    Object,
    /// Milliseconds between stimulus onset and response.
    ReactionTime,
    /// Timestamp in milliseconds.
    StimulusOnset,
}

impl VariableType {
    /// Whether `value` may be stored in a variable of this type. `null` is
    /// always accepted.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (VariableType::Number, Value::Number(_))
            | (VariableType::ReactionTime, Value::Number(_))
            | (VariableType::StimulusOnset, Value::Number(_)) => true,
            (VariableType::String, Value::String(_)) => true,
            (VariableType::Boolean, Value::Bool(_)) => true,
            (VariableType::Date | VariableType::Time, Value::Number(_) | Value::String(_)) => true,
            (VariableType::Array, Value::Array(_)) => true,
            (VariableType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Number => "number",
            VariableType::String => "string",
            VariableType::Boolean => "boolean",
            VariableType::Date => "date",
            VariableType::Time => "time",
            VariableType::Array => "array",
            VariableType::Object => "object",
            VariableType::ReactionTime => "reaction_time",
            VariableType::StimulusOnset => "stimulus_onset",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifetime of a variable's value, recorded for the host application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    #[default]
    Global,
    Local,
    Temporary,
}

/// A named value. With a `formula` the value is derived and read-only;
/// without one it is a source set by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: String,
    /// The identifier formulas use to reference this variable.
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(default)]
    pub scope: VariableScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Variable {
    pub fn new(id: impl Into<String>, name: impl Into<String>, var_type: VariableType) -> Self {
        Variable {
            id: id.into(),
            name: name.into(),
            var_type,
            scope: VariableScope::default(),
            default_value: None,
            formula: None,
            validation: None,
            description: None,
        }
    }

    /// A source variable whose id and name are both `name`.
    pub fn source(name: &str, var_type: VariableType, default_value: impl Into<Value>) -> Self {
        Variable::new(name, name, var_type).with_default(default_value)
    }

    /// A formula variable whose id and name are both `name`.
    pub fn derived(name: &str, var_type: VariableType, formula: &str) -> Self {
        Variable::new(name, name, var_type).with_formula(formula)
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_validation(mut self, rules: ValidationRules) -> Self {
        self.validation = Some(rules);
        self
    }

    pub fn with_scope(mut self, scope: VariableScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True when the value is computed from a formula.
    pub fn is_derived(&self) -> bool {
        self.formula.is_some()
    }
}

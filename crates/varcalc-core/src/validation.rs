//! Value validation rules applied when a source variable is set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use varcalc_engine::Value;
use varcalc_engine::value::format_number;

/// Optional constraints on a variable's value. `null` passes every rule
/// except `required`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationRules {
    /// Rejects `null` and the empty string.
    pub required: bool,
    /// Inclusive lower bound for numbers.
    pub min: Option<f64>,
    /// Inclusive upper bound for numbers.
    pub max: Option<f64>,
    /// Bounds on string length (characters) or array length.
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Regular expression a string value must match.
    pub pattern: Option<String>,
    pub allowed_values: Option<Vec<Value>>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    /// Check `value`, returning a message describing the first violated rule.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let empty = matches!(value, Value::Null) || value.as_str() == Some("");
        if self.required && empty {
            return Err("a value is required".to_string());
        }
        if value.is_null() {
            return Ok(());
        }

        if let Value::Number(n) = value {
            if let Some(min) = self.min.filter(|min| n < min) {
                return Err(format!("must be at least {}", format_number(min)));
            }
            if let Some(max) = self.max.filter(|max| n > max) {
                return Err(format!("must be at most {}", format_number(max)));
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(length) = length {
            if let Some(min) = self.min_length.filter(|min| length < *min) {
                return Err(format!("length must be at least {}", min));
            }
            if let Some(max) = self.max_length.filter(|max| length > *max) {
                return Err(format!("length must be at most {}", max));
            }
        }

        if let (Some(pattern), Value::String(s)) = (&self.pattern, value) {
            let re = Regex::new(pattern)
                .map_err(|e| format!("invalid pattern {}: {}", pattern, e))?;
            if !re.is_match(s) {
                return Err(format!("must match pattern {}", pattern));
            }
        }

        if let Some(allowed) = &self.allowed_values {
            if !allowed.contains(value) {
                let listed: Vec<String> = allowed.iter().map(Value::to_literal).collect();
                return Err(format!("must be one of {}", listed.join(", ")));
            }
        }

        Ok(())
    }
}

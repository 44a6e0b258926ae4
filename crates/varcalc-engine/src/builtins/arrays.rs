//! Array utilities.

use super::{arg, number_arg, number_arg_or};
use crate::error::{FormulaError, Result};
use crate::registry::{FormulaFunction, FunctionCategory, FunctionRegistry, ParamType};
use crate::value::Value;
use std::cmp::Ordering;

/// Largest array `SEQUENCE` will build.
const MAX_SEQUENCE_LEN: usize = 100_000;

fn array_arg<'a>(args: &'a [Value], index: usize, function: &str) -> Result<&'a [Value]> {
    arg(args, index)
        .as_array()
        .ok_or_else(|| FormulaError::runtime(format!("{} expects an array", function)))
}

/// Numbers before strings before everything else; numbers ascending,
/// strings lexicographic.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            _ => 2,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Clamp a possibly negative index into `0..=len`, counting negatives from the end.
fn resolve_index(index: f64, len: usize) -> usize {
    if index.is_nan() {
        return 0;
    }
    let index = index.trunc();
    if index < 0.0 {
        (len as f64 + index).max(0.0) as usize
    } else {
        index.min(len as f64) as usize
    }
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new("SORT", FunctionCategory::Array, "Sorted copy of an array", |args, _| {
            let mut items = array_arg(args, 0, "SORT")?.to_vec();
            items.sort_by(sort_order);
            if arg(args, 1).as_str().is_some_and(|d| d.eq_ignore_ascii_case("desc")) {
                items.reverse();
            }
            Ok(Value::Array(items))
        })
        .param("values", ParamType::Array)
        .optional_param("direction", ParamType::String, Some(Value::from("asc")))
        .returns(ParamType::Array),
    );

    registry.register(
        FormulaFunction::new(
            "REVERSE",
            FunctionCategory::Array,
            "Reversed copy of an array",
            |args, _| {
                let mut items = array_arg(args, 0, "REVERSE")?.to_vec();
                items.reverse();
                Ok(Value::Array(items))
            },
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Array),
    );

    registry.register(
        FormulaFunction::new(
            "UNIQUE",
            FunctionCategory::Array,
            "Distinct values in first-seen order",
            |args, _| {
                let mut out: Vec<Value> = Vec::new();
                for item in array_arg(args, 0, "UNIQUE")? {
                    if !out.contains(item) {
                        out.push(item.clone());
                    }
                }
                Ok(Value::Array(out))
            },
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Array),
    );

    // SLICE(values, start, end?): zero-based, end exclusive, negatives count from the end.
    registry.register(
        FormulaFunction::new("SLICE", FunctionCategory::Array, "Portion of an array", |args, _| {
            let items = array_arg(args, 0, "SLICE")?;
            let start = resolve_index(number_arg_or(args, 1, 0.0), items.len());
            let end = resolve_index(number_arg_or(args, 2, items.len() as f64), items.len());
            if start >= end {
                return Ok(Value::Array(Vec::new()));
            }
            Ok(Value::Array(items[start..end].to_vec()))
        })
        .param("values", ParamType::Array)
        .param("start", ParamType::Number)
        .optional_param("end", ParamType::Number, None)
        .returns(ParamType::Array),
    );

    // INDEX(values, n) is one-based; out of range yields null.
    registry.register(
        FormulaFunction::new(
            "INDEX",
            FunctionCategory::Array,
            "Element at a one-based position",
            |args, _| {
                let items = array_arg(args, 0, "INDEX")?;
                let n = number_arg(args, 1);
                if n.is_nan() || n < 1.0 {
                    return Ok(Value::Null);
                }
                Ok(items.get(n as usize - 1).cloned().unwrap_or_default())
            },
        )
        .param("values", ParamType::Array)
        .param("position", ParamType::Number)
        .returns(ParamType::Any),
    );

    registry.register(
        FormulaFunction::new(
            "CONTAINS",
            FunctionCategory::Array,
            "Whether an array or text contains a value",
            |args, _| {
                let needle = arg(args, 1);
                let found = match arg(args, 0) {
                    Value::Array(items) => items.iter().any(|item| item.loose_eq(needle)),
                    Value::String(s) => s.contains(needle.to_text().as_str()),
                    _ => false,
                };
                Ok(Value::Bool(found))
            },
        )
        .param("haystack", ParamType::Any)
        .param("needle", ParamType::Any)
        .returns(ParamType::Boolean),
    );

    registry.register(
        FormulaFunction::new(
            "JOIN",
            FunctionCategory::Text,
            "Join array elements with a separator",
            |args, _| {
                let items = array_arg(args, 0, "JOIN")?;
                let separator = match arg(args, 1) {
                    Value::Null => ",".to_string(),
                    other => other.to_text(),
                };
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::Null => String::new(),
                        other => other.to_text(),
                    })
                    .collect();
                Ok(Value::String(parts.join(&separator)))
            },
        )
        .param("values", ParamType::Array)
        .optional_param("separator", ParamType::String, Some(Value::from(",")))
        .returns(ParamType::String),
    );

    registry.register(
        FormulaFunction::new(
            "SPLIT",
            FunctionCategory::Text,
            "Split text on a separator",
            |args, _| {
                let text = arg(args, 0).to_text();
                let separator = match arg(args, 1) {
                    Value::Null => ",".to_string(),
                    other => other.to_text(),
                };
                let parts = if separator.is_empty() {
                    text.chars().map(|c| Value::String(c.to_string())).collect()
                } else {
                    text.split(separator.as_str())
                        .map(|part| Value::String(part.to_string()))
                        .collect()
                };
                Ok(Value::Array(parts))
            },
        )
        .param("text", ParamType::String)
        .optional_param("separator", ParamType::String, Some(Value::from(",")))
        .returns(ParamType::Array),
    );

    // SEQUENCE(count, start=1, step=1)
    registry.register(
        FormulaFunction::new("SEQUENCE", FunctionCategory::Array, "Arithmetic sequence", |args, _| {
            let count = number_arg(args, 0);
            if count.is_nan() || count < 0.0 {
                return Err(FormulaError::runtime("count must be a non-negative number"));
            }
            let count = count.trunc() as usize;
            if count > MAX_SEQUENCE_LEN {
                return Err(FormulaError::runtime(format!(
                    "count exceeds {}",
                    MAX_SEQUENCE_LEN
                )));
            }
            let start = number_arg_or(args, 1, 1.0);
            let step = number_arg_or(args, 2, 1.0);
            Ok(Value::Array(
                (0..count)
                    .map(|i| Value::Number(start + step * i as f64))
                    .collect(),
            ))
        })
        .param("count", ParamType::Number)
        .optional_param("start", ParamType::Number, Some(Value::from(1)))
        .optional_param("step", ParamType::Number, Some(Value::from(1)))
        .returns(ParamType::Array),
    );

    registry.register(
        FormulaFunction::new("FIRST", FunctionCategory::Array, "First element", |args, _| {
            Ok(array_arg(args, 0, "FIRST")?.first().cloned().unwrap_or_default())
        })
        .param("values", ParamType::Array)
        .returns(ParamType::Any),
    );

    registry.register(
        FormulaFunction::new("LAST", FunctionCategory::Array, "Last element", |args, _| {
            Ok(array_arg(args, 0, "LAST")?.last().cloned().unwrap_or_default())
        })
        .param("values", ParamType::Array)
        .returns(ParamType::Any),
    );

    registry.register(
        FormulaFunction::new(
            "FLATTEN",
            FunctionCategory::Array,
            "Flatten nested arrays",
            |args, _| {
                fn walk(items: &[Value], out: &mut Vec<Value>) {
                    for item in items {
                        match item {
                            Value::Array(inner) => walk(inner, out),
                            other => out.push(other.clone()),
                        }
                    }
                }
                let mut out = Vec::new();
                walk(args, &mut out);
                Ok(Value::Array(out))
            },
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Array),
    );
}

#[cfg(test)]
mod tests {
    use crate::engine::FormulaEvaluator;
    use crate::value::Value;

    fn eval(formula: &str) -> Value {
        let evaluator = FormulaEvaluator::new();
        let result = evaluator.evaluate(formula);
        assert!(result.is_ok(), "{formula}: {:?}", result.error);
        result.value
    }

    #[test]
    fn test_sort_mixed_and_descending() {
        assert_eq!(
            eval(r#"SORT([3, "b", 1, "a", true])"#),
            Value::from(vec![
                Value::from(1),
                Value::from(3),
                Value::from("a"),
                Value::from("b"),
                Value::Bool(true)
            ])
        );
        assert_eq!(eval(r#"SORT([1, 3, 2], "desc")"#), Value::from(vec![3, 2, 1]));
    }

    #[test]
    fn test_sort_rejects_non_array() {
        let evaluator = FormulaEvaluator::new();
        let error = evaluator.evaluate("SORT(5)").error.unwrap();
        assert!(error.contains("SORT expects an array"));
    }

    #[test]
    fn test_unique_and_reverse() {
        assert_eq!(eval("UNIQUE([1, 2, 1, 3, 2])"), Value::from(vec![1, 2, 3]));
        assert_eq!(eval("REVERSE([1, 2, 3])"), Value::from(vec![3, 2, 1]));
    }

    #[test]
    fn test_slice_and_index() {
        assert_eq!(eval("SLICE([1, 2, 3, 4], 1, 3)"), Value::from(vec![2, 3]));
        assert_eq!(eval("SLICE([1, 2, 3, 4], -2)"), Value::from(vec![3, 4]));
        assert_eq!(eval("INDEX([10, 20, 30], 2)"), Value::from(20));
        assert_eq!(eval("INDEX([10, 20, 30], 4)"), Value::Null);
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(eval(r#"JOIN(["a", 1, null], "-")"#), Value::from("a-1-"));
        assert_eq!(
            eval(r#"SPLIT("x,y,,z")"#),
            Value::from(vec!["x", "y", "", "z"])
        );
    }

    #[test]
    fn test_contains() {
        assert_eq!(eval(r#"CONTAINS([1, 2, 3], "2")"#), Value::Bool(true));
        assert_eq!(eval(r#"CONTAINS("hello", "ell")"#), Value::Bool(true));
        assert_eq!(eval("CONTAINS([1], 5)"), Value::Bool(false));
    }

    #[test]
    fn test_sequence_first_last_flatten() {
        assert_eq!(eval("SEQUENCE(3)"), Value::from(vec![1, 2, 3]));
        assert_eq!(eval("SEQUENCE(3, 0, 5)"), Value::from(vec![0, 5, 10]));
        assert_eq!(eval("FIRST(SEQUENCE(4, 2))"), Value::from(2));
        assert_eq!(eval("LAST([])"), Value::Null);
        assert_eq!(eval("FLATTEN([1, [2, [3]]], 4)"), Value::from(vec![1, 2, 3, 4]));
    }
}

//! Built-in formula functions and their metadata.
//!
//! Conventions:
//! - Formula-facing built-in names are ALL CAPS (e.g. `SUM`, `ROUND`).
//! - Aggregates accept either one array argument or a variadic list.
//! - Implementations report bad input with [`FormulaError::Runtime`]; the
//!   caller attaches the function name.

mod arrays;
mod stats;

use crate::error::FormulaError;
use crate::registry::{FormulaFunction, FunctionCategory, FunctionRegistry, ParamType};
use crate::value::Value;

static NULL: Value = Value::Null;

/// Register every built-in into `registry`.
pub fn register_builtins(registry: &mut FunctionRegistry) {
    register_math(registry);
    register_aggregates(registry);
    register_logical(registry);
    register_text(registry);
    register_date(registry);
    register_random(registry);
    stats::register(registry);
    arrays::register(registry);
}

pub(crate) fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&NULL)
}

pub(crate) fn number_arg(args: &[Value], index: usize) -> f64 {
    arg(args, index).to_number()
}

/// Number argument that falls back to `default` when absent or `null`.
pub(crate) fn number_arg_or(args: &[Value], index: usize, default: f64) -> f64 {
    match args.get(index) {
        None | Some(Value::Null) => default,
        Some(v) => v.to_number(),
    }
}

/// The argument list, or the elements of a single array argument. Nested
/// arrays in a variadic list are flattened one level.
pub(crate) fn collect_values(args: &[Value]) -> Vec<Value> {
    if let [Value::Array(items)] = args {
        return items.clone();
    }
    let mut out = Vec::with_capacity(args.len());
    for a in args {
        match a {
            Value::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Numeric entries of [`collect_values`]; everything else is skipped.
pub(crate) fn numeric_values(args: &[Value]) -> Vec<f64> {
    collect_values(args)
        .iter()
        .filter_map(Value::as_number)
        .collect()
}

fn round_to(value: f64, decimals: f64) -> f64 {
    let factor = 10f64.powf(decimals.trunc());
    (value * factor + 0.5).floor() / factor
}

fn register_math(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new("ABS", FunctionCategory::Math, "Absolute value", |args, _| {
            Ok(Value::Number(number_arg(args, 0).abs()))
        })
        .param("value", ParamType::Number)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("SQRT", FunctionCategory::Math, "Square root", |args, _| {
            Ok(Value::Number(number_arg(args, 0).sqrt()))
        })
        .param("value", ParamType::Number)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new(
            "POW",
            FunctionCategory::Math,
            "Base raised to an exponent",
            |args, _| Ok(Value::Number(number_arg(args, 0).powf(number_arg(args, 1)))),
        )
        .param("base", ParamType::Number)
        .param("exponent", ParamType::Number)
        .returns(ParamType::Number),
    );

    // ROUND(value, decimals=0): halves round toward +infinity.
    registry.register(
        FormulaFunction::new(
            "ROUND",
            FunctionCategory::Math,
            "Round to a number of decimal places",
            |args, _| {
                Ok(Value::Number(round_to(
                    number_arg(args, 0),
                    number_arg_or(args, 1, 0.0),
                )))
            },
        )
        .param("value", ParamType::Number)
        .optional_param("decimals", ParamType::Number, Some(Value::from(0)))
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new(
            "FLOOR",
            FunctionCategory::Math,
            "Round down to an integer",
            |args, _| Ok(Value::Number(number_arg(args, 0).floor())),
        )
        .param("value", ParamType::Number)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("CEIL", FunctionCategory::Math, "Round up to an integer", |args, _| {
            Ok(Value::Number(number_arg(args, 0).ceil()))
        })
        .param("value", ParamType::Number)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("MOD", FunctionCategory::Math, "Remainder of a division", |args, _| {
            Ok(Value::Number(number_arg(args, 0) % number_arg(args, 1)))
        })
        .param("dividend", ParamType::Number)
        .param("divisor", ParamType::Number)
        .returns(ParamType::Number),
    );
}

fn register_aggregates(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new("SUM", FunctionCategory::Array, "Sum of numeric values", |args, _| {
            Ok(Value::Number(numeric_values(args).iter().sum()))
        })
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    // COUNT: entries that are neither null nor the empty string.
    registry.register(
        FormulaFunction::new(
            "COUNT",
            FunctionCategory::Array,
            "Count of non-empty values",
            |args, _| {
                let count = collect_values(args)
                    .iter()
                    .filter(|v| !matches!(v, Value::Null) && v.as_str() != Some(""))
                    .count();
                Ok(Value::Number(count as f64))
            },
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("MIN", FunctionCategory::Array, "Smallest numeric value", |args, _| {
            let values = numeric_values(args);
            if values.is_empty() {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(values.into_iter().fold(f64::INFINITY, f64::min)))
        })
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("MAX", FunctionCategory::Array, "Largest numeric value", |args, _| {
            let values = numeric_values(args);
            if values.is_empty() {
                return Ok(Value::Number(f64::NAN));
            }
            Ok(Value::Number(values.into_iter().fold(f64::NEG_INFINITY, f64::max)))
        })
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );
}

fn register_logical(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new(
            "IF",
            FunctionCategory::Logical,
            "Choose a value by condition",
            |args, _| {
                let branch = if arg(args, 0).is_truthy() { 1 } else { 2 };
                Ok(arg(args, branch).clone())
            },
        )
        .param("condition", ParamType::Boolean)
        .param("trueValue", ParamType::Any)
        .optional_param("falseValue", ParamType::Any, None),
    );

    registry.register(
        FormulaFunction::new(
            "AND",
            FunctionCategory::Logical,
            "True if every argument is truthy",
            |args, _| Ok(Value::Bool(args.iter().all(Value::is_truthy))),
        )
        .param("values", ParamType::Any)
        .returns(ParamType::Boolean),
    );

    registry.register(
        FormulaFunction::new(
            "OR",
            FunctionCategory::Logical,
            "True if any argument is truthy",
            |args, _| Ok(Value::Bool(args.iter().any(Value::is_truthy))),
        )
        .param("values", ParamType::Any)
        .returns(ParamType::Boolean),
    );

    registry.register(
        FormulaFunction::new("NOT", FunctionCategory::Logical, "Logical negation", |args, _| {
            Ok(Value::Bool(!arg(args, 0).is_truthy()))
        })
        .param("value", ParamType::Any)
        .returns(ParamType::Boolean),
    );
}

fn register_text(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new("CONCAT", FunctionCategory::Text, "Join arguments as text", |args, _| {
            Ok(Value::String(args.iter().map(Value::to_text).collect()))
        })
        .param("values", ParamType::Any)
        .returns(ParamType::String),
    );

    registry.register(
        FormulaFunction::new(
            "LENGTH",
            FunctionCategory::Text,
            "Length of text or an array",
            |args, _| {
                let len = match arg(args, 0) {
                    Value::Null => 0,
                    Value::Array(items) => items.len(),
                    Value::String(s) => s.chars().count(),
                    other => other.to_text().chars().count(),
                };
                Ok(Value::Number(len as f64))
            },
        )
        .param("value", ParamType::Any)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("UPPER", FunctionCategory::Text, "Uppercase text", |args, _| {
            Ok(Value::String(arg(args, 0).to_text().to_uppercase()))
        })
        .param("text", ParamType::String)
        .returns(ParamType::String),
    );

    registry.register(
        FormulaFunction::new("LOWER", FunctionCategory::Text, "Lowercase text", |args, _| {
            Ok(Value::String(arg(args, 0).to_text().to_lowercase()))
        })
        .param("text", ParamType::String)
        .returns(ParamType::String),
    );
}

fn register_date(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new(
            "NOW",
            FunctionCategory::Date,
            "Current time in milliseconds since the Unix epoch",
            |_, ctx| Ok(Value::Number(ctx.now())),
        )
        .returns(ParamType::Date),
    );

    registry.register(
        FormulaFunction::new(
            "TIME_SINCE",
            FunctionCategory::Date,
            "Milliseconds elapsed since a timestamp",
            |args, ctx| {
                let since = number_arg(args, 0);
                if since.is_nan() {
                    return Err(FormulaError::runtime("timestamp must be a number"));
                }
                Ok(Value::Number(ctx.now() - since))
            },
        )
        .param("timestamp", ParamType::Date)
        .returns(ParamType::Number),
    );
}

fn register_random(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new("RANDOM", FunctionCategory::Math, "Random number in [0, 1)", |_, ctx| {
            Ok(Value::Number(ctx.random()))
        })
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new(
            "RANDINT",
            FunctionCategory::Math,
            "Random integer between min and max inclusive",
            |args, ctx| {
                let min = number_arg(args, 0).ceil();
                let max = number_arg(args, 1).floor();
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(FormulaError::runtime("requires numeric min <= max"));
                }
                let draw = ctx.call("RANDOM", &[])?.to_number();
                Ok(Value::Number((draw * (max - min + 1.0)).floor() + min))
            },
        )
        .param("min", ParamType::Number)
        .param("max", ParamType::Number)
        .returns(ParamType::Number),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RandomSource;
    use crate::error::Result;
    use crate::registry::CallContext;

    fn call(name: &str, args: &[Value]) -> Result<Value> {
        let registry = FunctionRegistry::with_builtins();
        let random = RandomSource::new(Some(99));
        let ctx = CallContext::new(&registry, Some(10_000.0), &random);
        ctx.call(name, args)
    }

    fn nums(values: &[f64]) -> Value {
        Value::Array(values.iter().copied().map(Value::Number).collect())
    }

    #[test]
    fn test_round_half_up_at_granularity() {
        assert_eq!(call("ROUND", &[Value::from(2.5)]).unwrap(), Value::from(3));
        assert_eq!(call("ROUND", &[Value::from(-2.5)]).unwrap(), Value::from(-2));
        assert_eq!(
            call("ROUND", &[Value::from(3.14159), Value::from(2)]).unwrap(),
            Value::from(3.14)
        );
    }

    #[test]
    fn test_sum_accepts_array_or_variadic_and_skips_non_numeric() {
        assert_eq!(call("SUM", &[nums(&[1.0, 2.0, 3.0])]).unwrap(), Value::from(6));
        assert_eq!(
            call(
                "SUM",
                &[Value::from(1), Value::from("x"), Value::from("2"), Value::Null]
            )
            .unwrap(),
            Value::from(3)
        );
    }

    #[test]
    fn test_count_skips_null_and_empty_string() {
        let values = Value::from(vec![
            Value::from(0),
            Value::Null,
            Value::from(""),
            Value::from("a"),
        ]);
        assert_eq!(call("COUNT", &[values]).unwrap(), Value::from(2));
    }

    #[test]
    fn test_min_max_empty_is_nan() {
        assert!(call("MIN", &[]).unwrap().to_number().is_nan());
        assert!(call("MAX", &[nums(&[])]).unwrap().to_number().is_nan());
        assert_eq!(
            call("MAX", &[Value::from(3), Value::from("abc"), Value::from(7)]).unwrap(),
            Value::from(7)
        );
    }

    #[test]
    fn test_logical_functions() {
        assert_eq!(
            call("IF", &[Value::from(""), Value::from(1), Value::from(2)]).unwrap(),
            Value::from(2)
        );
        assert_eq!(call("IF", &[Value::from(0), Value::from(1)]).unwrap(), Value::Null);
        assert_eq!(call("AND", &[Value::from(1), Value::from("x")]).unwrap(), Value::Bool(true));
        assert_eq!(call("OR", &[]).unwrap(), Value::Bool(false));
        assert_eq!(call("NOT", &[Value::Null]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(
            call("CONCAT", &[Value::from("n="), Value::from(5), Value::Bool(true)]).unwrap(),
            Value::from("n=5true")
        );
        assert_eq!(call("LENGTH", &[Value::from("héllo")]).unwrap(), Value::from(5));
        assert_eq!(call("LENGTH", &[nums(&[1.0, 2.0])]).unwrap(), Value::from(2));
        assert_eq!(call("UPPER", &[Value::from("abc")]).unwrap(), Value::from("ABC"));
    }

    #[test]
    fn test_time_since_uses_injected_clock() {
        assert_eq!(call("TIME_SINCE", &[Value::from(4_000)]).unwrap(), Value::from(6_000));
        assert!(call("TIME_SINCE", &[Value::from("soon")]).is_err());
    }

    #[test]
    fn test_randint_within_bounds() {
        for _ in 0..20 {
            let n = call("RANDINT", &[Value::from(1), Value::from(6)]).unwrap().to_number();
            assert!((1.0..=6.0).contains(&n));
            assert_eq!(n.fract(), 0.0);
        }
        assert!(call("RANDINT", &[Value::from(5), Value::from(1)]).is_err());
    }
}

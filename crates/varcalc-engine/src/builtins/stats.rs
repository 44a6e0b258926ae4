//! Statistical functions over numeric collections.

use super::{arg, number_arg, numeric_values};
use crate::error::FormulaError;
use crate::registry::{FormulaFunction, FunctionCategory, FunctionRegistry, ParamType};
use crate::value::Value;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        FormulaFunction::new(
            "AVERAGE",
            FunctionCategory::Statistical,
            "Arithmetic mean",
            |args, _| Ok(Value::Number(mean(&numeric_values(args)))),
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("AVG", FunctionCategory::Statistical, "Alias of AVERAGE", |args, ctx| {
            ctx.call("AVERAGE", args)
        })
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new("MEDIAN", FunctionCategory::Statistical, "Middle value", |args, _| {
            let mut values = numeric_values(args);
            if values.is_empty() {
                return Ok(Value::Number(f64::NAN));
            }
            values.sort_by(f64::total_cmp);
            let mid = values.len() / 2;
            let median = if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            };
            Ok(Value::Number(median))
        })
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    // Ties go to the value seen first.
    registry.register(
        FormulaFunction::new(
            "MODE",
            FunctionCategory::Statistical,
            "Most frequent value",
            |args, _| {
                let values = numeric_values(args);
                let mut best: Option<(f64, usize)> = None;
                for (i, v) in values.iter().enumerate() {
                    if values[..i].contains(v) {
                        continue;
                    }
                    let count = values.iter().filter(|x| *x == v).count();
                    if best.is_none_or(|(_, c)| count > c) {
                        best = Some((*v, count));
                    }
                }
                Ok(best.map_or(Value::Null, |(v, _)| Value::Number(v)))
            },
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new(
            "VARIANCE",
            FunctionCategory::Statistical,
            "Sample variance",
            |args, _| Ok(Value::Number(sample_variance(&numeric_values(args)))),
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new(
            "STDEV",
            FunctionCategory::Statistical,
            "Sample standard deviation",
            |args, _| Ok(Value::Number(sample_variance(&numeric_values(args)).sqrt())),
        )
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );

    // PERCENTILE(values, p) with p in [0, 1], linearly interpolated.
    registry.register(
        FormulaFunction::new(
            "PERCENTILE",
            FunctionCategory::Statistical,
            "Value at a percentile between 0 and 1",
            |args, _| {
                let mut values = numeric_values(&args[..args.len().min(1)]);
                let p = number_arg(args, 1);
                if !(0.0..=1.0).contains(&p) {
                    return Err(FormulaError::runtime("percentile must be between 0 and 1"));
                }
                if values.is_empty() {
                    return Ok(Value::Number(f64::NAN));
                }
                values.sort_by(f64::total_cmp);
                let rank = p * (values.len() - 1) as f64;
                let lower = rank.floor() as usize;
                let upper = rank.ceil() as usize;
                let weight = rank - lower as f64;
                Ok(Value::Number(
                    values[lower] + (values[upper] - values[lower]) * weight,
                ))
            },
        )
        .param("values", ParamType::Array)
        .param("percentile", ParamType::Number)
        .returns(ParamType::Number),
    );

    registry.register(
        FormulaFunction::new(
            "ZSCORE",
            FunctionCategory::Statistical,
            "Standard score of a value within a sample",
            |args, _| {
                let x = number_arg(args, 0);
                let values = numeric_values(std::slice::from_ref(arg(args, 1)));
                let sd = sample_variance(&values).sqrt();
                if sd == 0.0 || sd.is_nan() {
                    return Ok(Value::Number(f64::NAN));
                }
                Ok(Value::Number((x - mean(&values)) / sd))
            },
        )
        .param("value", ParamType::Number)
        .param("values", ParamType::Array)
        .returns(ParamType::Number),
    );
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

//! Property checks for evaluation and invalidation.

use proptest::prelude::*;
use varcalc::{EvaluationContext, FormulaEvaluator, Value, Variable, VariableEngine, VariableType};

fn chain(len: usize) -> VariableEngine {
    let mut engine = VariableEngine::new();
    engine
        .register_variable(Variable::source("v0", VariableType::Number, 0))
        .unwrap();
    for i in 1..len {
        let formula = format!("v{} + 1", i - 1);
        engine
            .register_variable(Variable::derived(&format!("v{i}"), VariableType::Number, &formula))
            .unwrap();
    }
    engine
}

proptest! {
    #[test]
    fn derived_chain_tracks_every_write(writes in prop::collection::vec(-1_000i32..1_000, 1..8)) {
        let mut engine = chain(6);
        for base in writes {
            engine.set_variable("v0", base).unwrap();
            prop_assert_eq!(engine.get_variable("v5").unwrap(), Value::from(base + 5));
        }
    }

    #[test]
    fn substituted_integers_evaluate_like_native_arithmetic(
        a in -10_000i64..10_000,
        b in -10_000i64..10_000
    ) {
        let evaluator = FormulaEvaluator::with_context(
            EvaluationContext::new().with_variable("a", a).with_variable("b", b),
        );
        prop_assert_eq!(evaluator.evaluate("a - b * 2").value, Value::from(a - b * 2));
        prop_assert_eq!(
            evaluator.evaluate("ABS(a) + ABS(b)").value,
            Value::from(a.abs() + b.abs())
        );
    }

    #[test]
    fn strings_survive_substitution(text in "[a-zA-Z0-9 ,()\"'\\\\]{0,24}") {
        let evaluator = FormulaEvaluator::with_context(
            EvaluationContext::new().with_variable("s", text.as_str()),
        );
        prop_assert_eq!(evaluator.evaluate("CONCAT(s)").value, Value::from(text.clone()));
        prop_assert_eq!(evaluator.evaluate("s").value, Value::from(text));
    }
}

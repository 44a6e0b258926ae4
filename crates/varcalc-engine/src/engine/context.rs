//! Evaluation context: static variables, injected clock and random seed.

use crate::value::Value;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

const LCG_MULTIPLIER: u64 = 9301;
const LCG_INCREMENT: u64 = 49297;
const LCG_MODULUS: u64 = 233280;

/// Inputs that affect evaluation but live outside the formula text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    /// Variables visible to [`FormulaEvaluator::evaluate`](super::FormulaEvaluator::evaluate).
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Milliseconds since the Unix epoch returned by `NOW()`; wall clock when unset.
    #[serde(default)]
    pub current_time: Option<f64>,
    /// Seed for the deterministic `RANDOM()` sequence; non-deterministic when unset.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_current_time(mut self, millis: f64) -> Self {
        self.current_time = Some(millis);
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }
}

/// Partial update applied by `update_context`; `None` fields are left alone.
#[derive(Clone, Debug, Default)]
pub struct ContextUpdate {
    /// Merged into the existing variable map.
    pub variables: Option<HashMap<String, Value>>,
    pub current_time: Option<Option<f64>>,
    pub random_seed: Option<Option<u64>>,
}

/// Random draws for `RANDOM()`: a linear-congruential sequence when seeded.
#[derive(Debug, Default)]
pub struct RandomSource {
    seed: Mutex<Option<u64>>,
}

impl RandomSource {
    pub fn new(seed: Option<u64>) -> Self {
        RandomSource {
            seed: Mutex::new(seed),
        }
    }

    /// Current seed state, advanced by every seeded draw.
    pub fn seed(&self) -> Option<u64> {
        *self.seed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reseed(&self, seed: Option<u64>) {
        *self.seed.lock().unwrap_or_else(PoisonError::into_inner) = seed;
    }

    /// Next value in `[0, 1)`.
    pub fn next(&self) -> f64 {
        let mut seed = self.seed.lock().unwrap_or_else(PoisonError::into_inner);
        match seed.as_mut() {
            Some(s) => {
                *s = ((*s % LCG_MODULUS) * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
                *s as f64 / LCG_MODULUS as f64
            }
            None => rand::thread_rng().r#gen::<f64>(),
        }
    }
}

use crate::coefficients::{CoefficientStore, CoefficientValue};
use crate::encoder::EncodedCovariates;
use crate::types::VariableKey;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Condition '{0}' has no coefficients.")]
pub struct UnknownCondition(pub String);

#[derive(Debug, Clone, PartialEq)]
pub struct LinearPredictor {
    pub value: f64,
    /// Encoded levels for which the condition's model lists no coefficient at all.
    /// They contribute nothing, but unlike reference levels their absence is unexpected.
    pub missing_terms: Vec<VariableKey>,
}

/// The proportional-hazards linear predictor of one condition:
///
/// `LP = Σ_family β(level) + β(AGE) · age`
///
/// Reference levels and absent terms contribute zero. A condition without an `AGE`
/// row has no age term at all.
pub fn compute_lp(
    store: &CoefficientStore,
    condition: &str,
    encoded: &EncodedCovariates,
    age: u32,
) -> Result<LinearPredictor, UnknownCondition> {
    let model = store
        .condition(condition)
        .ok_or_else(|| UnknownCondition(condition.to_string()))?;

    let mut value = 0.0;
    let mut missing_terms = Vec::new();
    for (family, key) in encoded.iter() {
        match model.coefficient(key) {
            Some(CoefficientValue::Numeric(beta)) => value += beta,
            Some(CoefficientValue::Reference) => {}
            None => {
                log::debug!(
                    "{}: no coefficient for {} level {}; treating as zero",
                    model.name(),
                    family,
                    key
                );
                missing_terms.push(key);
            }
        }
    }

    match model.coefficient(VariableKey::Age) {
        Some(CoefficientValue::Numeric(beta)) => value += beta * f64::from(age),
        Some(CoefficientValue::Reference) | None => {}
    }

    Ok(LinearPredictor {
        value,
        missing_terms,
    })
}

//! # Coefficient Store
//!
//! Loads the fitted proportional-hazards coefficients and answers, per condition,
//! "what is the coefficient of this model term?".
//!
//! - A reference level is stored as `CoefficientValue::Reference`, never as a numeric
//!   zero, so a genuinely zero-valued offset stays distinguishable from the level the
//!   family is coded against.
//! - A term that is absent from a condition's model is reported as `None`. Callers
//!   decide whether that is an error.
//! - Anything malformed in the source is a `CoefficientError`; the store is never
//!   half-built.

use crate::catalog::ConditionCatalog;
use crate::io::{delimiter_for, find_column, open_table, table_reader};
use crate::types::{CovariateFamily, VariableKey, normalize_condition};
use ahash::AHashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// The literal used by coefficient tables to mark a reference level.
pub const REFERENCE_MARKER: &str = "REF";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoefficientValue {
    Reference,
    Numeric(f64),
}

#[derive(Error, Debug)]
pub enum CoefficientError {
    #[error("Failed to read coefficient table '{origin}': {error}")]
    Io {
        origin: String,
        error: std::io::Error,
    },
    #[error("Malformed coefficient table '{origin}': {error}")]
    Csv { origin: String, error: csv::Error },
    #[error("Coefficient table '{origin}' has no '{column}' column.")]
    MissingColumn { origin: String, column: &'static str },
    #[error(
        "Coefficient table '{origin}', line {line}: value '{value}' for {condition}/{variable} is neither a number nor 'REF'."
    )]
    InvalidCoefficient {
        origin: String,
        line: u64,
        condition: String,
        variable: String,
        value: String,
    },
    #[error(
        "Coefficient table '{origin}', line {line}: {condition}/{variable} has a non-finite value."
    )]
    NonFiniteCoefficient {
        origin: String,
        line: u64,
        condition: String,
        variable: String,
    },
    #[error(
        "Coefficient table '{origin}', line {line}: variable '{variable}' of {condition} is not a recognised model term."
    )]
    UnknownVariable {
        origin: String,
        line: u64,
        condition: String,
        variable: String,
    },
    #[error("Coefficient table '{origin}': {condition}/{variable} is given two different values.")]
    ConflictingDuplicate {
        origin: String,
        condition: String,
        variable: String,
    },
    #[error("Coefficient table '{origin}', line {line}: variable '{variable}' has no condition name.")]
    MissingCondition {
        origin: String,
        line: u64,
        variable: String,
    },
    #[error("Coefficient table '{origin}' contains no coefficients.")]
    Empty { origin: String },
}

/// All terms of one condition's model.
#[derive(Debug, Clone)]
pub struct ConditionModel {
    name: String,
    terms: AHashMap<VariableKey, CoefficientValue>,
}

impl ConditionModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coefficient(&self, key: VariableKey) -> Option<CoefficientValue> {
        self.terms.get(&key).copied()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    fn reference_levels(&self, family: CovariateFamily) -> (usize, usize) {
        let mut levels = 0usize;
        let mut references = 0usize;
        for (key, value) in &self.terms {
            if key.family() == Some(family) {
                levels += 1;
                if *value == CoefficientValue::Reference {
                    references += 1;
                }
            }
        }
        (levels, references)
    }
}

#[derive(Debug, Clone)]
pub struct CoefficientStore {
    models: Vec<ConditionModel>,
    index: AHashMap<String, usize>,
    // normalized alias -> normalized display name
    aliases: AHashMap<String, String>,
}

impl CoefficientStore {
    pub fn from_path(path: &Path, catalog: &ConditionCatalog) -> Result<Self, CoefficientError> {
        let origin = path.display().to_string();
        let reader = open_table(path).map_err(|error| CoefficientError::Io {
            origin: origin.clone(),
            error,
        })?;
        Self::from_reader(reader, delimiter_for(path), &origin, catalog)
    }

    /// Parses a delimited coefficient table with a condition column (`Disease` or
    /// `Condition`), a `Variable` column and a `Coef` column.
    pub fn from_reader<R: Read>(
        reader: R,
        delimiter: u8,
        origin: &str,
        catalog: &ConditionCatalog,
    ) -> Result<Self, CoefficientError> {
        let csv_error = |error| CoefficientError::Csv {
            origin: origin.to_string(),
            error,
        };
        let mut reader = table_reader(reader, delimiter);
        let headers = reader.headers().map_err(csv_error)?.clone();
        let column = |names: &[&str], column: &'static str| {
            find_column(&headers, names).ok_or_else(|| CoefficientError::MissingColumn {
                origin: origin.to_string(),
                column,
            })
        };
        let condition_col = column(
            &["disease", "condition", "disease name", "daisease namw"],
            "Disease",
        )?;
        let variable_col = column(&["variable"], "Variable")?;
        let coef_col = column(&["coef", "coefficient"], "Coef")?;

        let mut store = CoefficientStore {
            models: Vec::new(),
            index: AHashMap::new(),
            aliases: catalog.lookup_keys(),
        };
        let mut rows = 0usize;

        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let raw_condition = record.get(condition_col).unwrap_or("");
            let raw_variable = record.get(variable_col).unwrap_or("");
            let raw_value = record.get(coef_col).unwrap_or("");
            if raw_condition.is_empty() && raw_variable.is_empty() && raw_value.is_empty() {
                continue;
            }
            if raw_condition.is_empty() {
                return Err(CoefficientError::MissingCondition {
                    origin: origin.to_string(),
                    line,
                    variable: raw_variable.to_string(),
                });
            }

            let condition = catalog.canonical_name(raw_condition);
            let key =
                VariableKey::parse(raw_variable).ok_or_else(|| CoefficientError::UnknownVariable {
                    origin: origin.to_string(),
                    line,
                    condition: condition.clone(),
                    variable: raw_variable.to_string(),
                })?;
            let value = parse_value(raw_value).ok_or_else(|| {
                CoefficientError::InvalidCoefficient {
                    origin: origin.to_string(),
                    line,
                    condition: condition.clone(),
                    variable: raw_variable.to_string(),
                    value: raw_value.to_string(),
                }
            })?;
            if let CoefficientValue::Numeric(x) = value {
                if !x.is_finite() {
                    return Err(CoefficientError::NonFiniteCoefficient {
                        origin: origin.to_string(),
                        line,
                        condition,
                        variable: raw_variable.to_string(),
                    });
                }
            }

            let model = store.model_entry(&condition);
            match model.terms.get(&key) {
                Some(existing) if *existing != value => {
                    return Err(CoefficientError::ConflictingDuplicate {
                        origin: origin.to_string(),
                        condition,
                        variable: key.to_string(),
                    });
                }
                Some(_) => {
                    log::debug!("Duplicate coefficient row for {condition}/{key} ignored.");
                }
                None => {
                    model.terms.insert(key, value);
                }
            }
            rows += 1;
        }

        if rows == 0 {
            return Err(CoefficientError::Empty {
                origin: origin.to_string(),
            });
        }

        store.check_reference_coding();
        log::info!(
            "Loaded {} coefficients for {} conditions from {}",
            rows,
            store.models.len(),
            origin
        );
        Ok(store)
    }

    fn model_entry(&mut self, condition: &str) -> &mut ConditionModel {
        let key = normalize_condition(condition);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.models.push(ConditionModel {
                    name: condition.to_string(),
                    terms: AHashMap::new(),
                });
                self.index.insert(key, self.models.len() - 1);
                self.models.len() - 1
            }
        };
        &mut self.models[idx]
    }

    // Published tables do not always mark exactly one reference level per family,
    // so irregular families are reported rather than rejected.
    fn check_reference_coding(&self) {
        for model in &self.models {
            for family in CovariateFamily::ALL {
                let (levels, references) = model.reference_levels(family);
                if levels > 0 && references != 1 {
                    log::warn!(
                        "{}: {} family has {} reference levels among {} listed levels",
                        model.name,
                        family,
                        references,
                        levels
                    );
                }
            }
        }
    }

    fn lookup_key(&self, name: &str) -> String {
        let key = normalize_condition(name);
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    /// Accepts display names and any alias the loading catalog knows.
    pub fn condition(&self, name: &str) -> Option<&ConditionModel> {
        self.index
            .get(&self.lookup_key(name))
            .map(|&idx| &self.models[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&self.lookup_key(name))
    }

    /// `Some(Reference)`, `Some(Numeric(_))`, or `None` when either the condition or
    /// the term is absent.
    pub fn coefficient_for(&self, condition: &str, key: VariableKey) -> Option<CoefficientValue> {
        self.condition(condition)?.coefficient(key)
    }

    /// Condition display names in the order they first appear in the source.
    pub fn conditions(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn parse_value(raw: &str) -> Option<CoefficientValue> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(REFERENCE_MARKER) {
        return Some(CoefficientValue::Reference);
    }
    trimmed.parse::<f64>().ok().map(CoefficientValue::Numeric)
}

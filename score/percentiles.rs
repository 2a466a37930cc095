//! # Percentile Table
//!
//! The empirical distribution of linear predictors in the reference population,
//! stratified by condition, gender and age band. Each row is a monotone quantile
//! function sampled at `PERCENTILE_KEYS`; ranking a score means inverting that
//! function.

use crate::catalog::ConditionCatalog;
use crate::io::{delimiter_for, find_column, open_table, table_reader};
use crate::types::{Gender, PERCENTILE_KEYS, normalize_condition};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PercentileTableError {
    #[error("Failed to read percentile table '{origin}': {error}")]
    Io {
        origin: String,
        error: std::io::Error,
    },
    #[error("Malformed percentile table '{origin}': {error}")]
    Csv { origin: String, error: csv::Error },
    #[error("Percentile table '{origin}' has no '{column}' column.")]
    MissingColumn { origin: String, column: String },
    #[error("Percentile table '{origin}', line {line}: '{value}' is not a valid sex code (1 = male, 2 = female).")]
    InvalidGender {
        origin: String,
        line: u64,
        value: String,
    },
    #[error("Percentile table '{origin}', line {line}: column '{column}' holds '{value}', which is not a finite number.")]
    InvalidThreshold {
        origin: String,
        line: u64,
        column: String,
        value: String,
    },
    #[error(
        "Percentile table '{origin}', line {line}: thresholds decrease at the {percentile}th percentile; rows must be non-decreasing."
    )]
    NonMonotonic {
        origin: String,
        line: u64,
        percentile: u8,
    },
    #[error("Percentile table '{origin}': more than one distinct row for {condition} / {gender} / {band}.")]
    DuplicateRow {
        origin: String,
        condition: String,
        gender: Gender,
        band: String,
    },
    #[error("Percentile table '{origin}', line {line}: row has thresholds but no condition name.")]
    MissingCondition { origin: String, line: u64 },
    #[error("Percentile table '{origin}' contains no rows.")]
    Empty { origin: String },
}

/// How a score is turned into a percentile once its bracketing breakpoints are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMethod {
    /// Linear interpolation between the bracketing breakpoints.
    #[default]
    Interpolated,
    /// The percentile of the first breakpoint at or above the score.
    Stepwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub percentile: u8,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentileRank {
    /// Position in the cohort, always within [1, 100].
    pub percentile: u8,
    /// The percentile key of the first breakpoint at or above the score (100 above the top).
    pub bracket: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentileRow {
    breakpoints: [Breakpoint; PERCENTILE_KEYS.len()],
}

impl PercentileRow {
    /// Builds a row from thresholds listed in `PERCENTILE_KEYS` order. On failure the
    /// percentile key at which the thresholds first decrease (or stop being finite)
    /// is returned.
    pub fn new(thresholds: [f64; PERCENTILE_KEYS.len()]) -> Result<Self, u8> {
        for (i, &threshold) in thresholds.iter().enumerate() {
            if !threshold.is_finite() {
                return Err(PERCENTILE_KEYS[i]);
            }
            if i > 0 && threshold < thresholds[i - 1] {
                return Err(PERCENTILE_KEYS[i]);
            }
        }
        let breakpoints = std::array::from_fn(|i| Breakpoint {
            percentile: PERCENTILE_KEYS[i],
            threshold: thresholds[i],
        });
        Ok(Self { breakpoints })
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn rank(&self, score: f64, method: RankingMethod) -> PercentileRank {
        let Some(idx) = self.breakpoints.iter().position(|bp| bp.threshold >= score) else {
            return PercentileRank {
                percentile: 100,
                bracket: 100,
            };
        };
        let next = self.breakpoints[idx];
        let exact = PercentileRank {
            percentile: next.percentile,
            bracket: next.percentile,
        };
        if idx == 0 || method == RankingMethod::Stepwise {
            return exact;
        }

        let prev = self.breakpoints[idx - 1];
        if next.threshold == prev.threshold {
            return exact;
        }
        let ratio = (score - prev.threshold) / (next.threshold - prev.threshold);
        let interpolated = f64::from(prev.percentile)
            + ratio * f64::from(next.percentile - prev.percentile);
        // Ties round to even, matching the rounding the reference reports were built with.
        let percentile = interpolated.round_ties_even().clamp(1.0, 100.0) as u8;
        PercentileRank {
            percentile,
            bracket: next.percentile,
        }
    }
}

type RowKey = (String, Gender, String);

#[derive(Debug, Clone)]
pub struct PercentileTable {
    rows: AHashMap<RowKey, PercentileRow>,
    conditions: AHashMap<String, String>,
    bands: BTreeSet<String>,
    // normalized alias -> normalized display name
    aliases: AHashMap<String, String>,
}

fn normalize_band(label: &str) -> String {
    label.chars().filter(|c| !c.is_whitespace()).collect()
}

fn threshold_column_names(percentile: u8) -> [String; 3] {
    [
        format!("{percentile}%"),
        format!("p{percentile}"),
        format!("{percentile}"),
    ]
}

impl PercentileTable {
    pub fn from_path(
        path: &Path,
        catalog: &ConditionCatalog,
    ) -> Result<Self, PercentileTableError> {
        let origin = path.display().to_string();
        let reader = open_table(path).map_err(|error| PercentileTableError::Io {
            origin: origin.clone(),
            error,
        })?;
        Self::from_reader(reader, delimiter_for(path), &origin, catalog)
    }

    /// Parses a delimited table with `Disease`, `SEX`, `AGE` and one column per
    /// percentile key (`1%`, `3%`, ..., `100%`). Unrelated columns are ignored.
    pub fn from_reader<R: Read>(
        reader: R,
        delimiter: u8,
        origin: &str,
        catalog: &ConditionCatalog,
    ) -> Result<Self, PercentileTableError> {
        let csv_error = |error| PercentileTableError::Csv {
            origin: origin.to_string(),
            error,
        };
        let missing = |column: &str| PercentileTableError::MissingColumn {
            origin: origin.to_string(),
            column: column.to_string(),
        };

        let mut reader = table_reader(reader, delimiter);
        let headers = reader.headers().map_err(csv_error)?.clone();
        let condition_col = find_column(&headers, &["disease", "condition"])
            .ok_or_else(|| missing("Disease"))?;
        let gender_col =
            find_column(&headers, &["sex", "gender"]).ok_or_else(|| missing("SEX"))?;
        let band_col =
            find_column(&headers, &["age", "age_group", "age band"]).ok_or_else(|| missing("AGE"))?;
        let mut threshold_cols = [0usize; PERCENTILE_KEYS.len()];
        for (slot, &percentile) in threshold_cols.iter_mut().zip(PERCENTILE_KEYS.iter()) {
            let names = threshold_column_names(percentile);
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            *slot = find_column(&headers, &names).ok_or_else(|| missing(names[0]))?;
        }

        let mut table = PercentileTable {
            rows: AHashMap::new(),
            conditions: AHashMap::new(),
            bands: BTreeSet::new(),
            aliases: catalog.lookup_keys(),
        };

        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let raw_condition = record.get(condition_col).unwrap_or("");
            if record.iter().all(str::is_empty) {
                continue;
            }
            if raw_condition.is_empty() {
                return Err(PercentileTableError::MissingCondition {
                    origin: origin.to_string(),
                    line,
                });
            }
            let condition = catalog.canonical_name(raw_condition);

            let raw_gender = record.get(gender_col).unwrap_or("");
            let gender = parse_gender(raw_gender).ok_or_else(|| {
                PercentileTableError::InvalidGender {
                    origin: origin.to_string(),
                    line,
                    value: raw_gender.to_string(),
                }
            })?;
            let band = normalize_band(record.get(band_col).unwrap_or(""));

            let mut thresholds = [0.0f64; PERCENTILE_KEYS.len()];
            for (i, &col) in threshold_cols.iter().enumerate() {
                let raw = record.get(col).unwrap_or("");
                thresholds[i] = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| PercentileTableError::InvalidThreshold {
                        origin: origin.to_string(),
                        line,
                        column: headers.get(col).unwrap_or("").to_string(),
                        value: raw.to_string(),
                    })?;
            }
            let row = PercentileRow::new(thresholds).map_err(|percentile| {
                PercentileTableError::NonMonotonic {
                    origin: origin.to_string(),
                    line,
                    percentile,
                }
            })?;

            let key = (normalize_condition(&condition), gender, band.clone());
            match table.rows.get(&key) {
                Some(existing) if *existing != row => {
                    return Err(PercentileTableError::DuplicateRow {
                        origin: origin.to_string(),
                        condition,
                        gender,
                        band,
                    });
                }
                Some(_) => log::debug!("Duplicate percentile row for {condition}/{gender}/{band} ignored."),
                None => {
                    table
                        .conditions
                        .entry(key.0.clone())
                        .or_insert_with(|| condition.clone());
                    table.bands.insert(band);
                    table.rows.insert(key, row);
                }
            }
        }

        if table.rows.is_empty() {
            return Err(PercentileTableError::Empty {
                origin: origin.to_string(),
            });
        }
        log::info!(
            "Loaded {} percentile rows for {} conditions from {}",
            table.rows.len(),
            table.conditions.len(),
            origin
        );
        Ok(table)
    }

    fn lookup_key(&self, condition: &str) -> String {
        let key = normalize_condition(condition);
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    /// Accepts display names and any alias the loading catalog knows.
    pub fn row(&self, condition: &str, gender: Gender, age_band: &str) -> Option<&PercentileRow> {
        self.rows.get(&(
            self.lookup_key(condition),
            gender,
            normalize_band(age_band),
        ))
    }

    /// `None` when the table has no row for this cohort.
    pub fn rank(
        &self,
        condition: &str,
        gender: Gender,
        age_band: &str,
        score: f64,
        method: RankingMethod,
    ) -> Option<PercentileRank> {
        self.row(condition, gender, age_band)
            .map(|row| row.rank(score, method))
    }

    pub fn has_condition(&self, condition: &str) -> bool {
        self.conditions.contains_key(&self.lookup_key(condition))
    }

    pub fn age_bands(&self) -> &BTreeSet<String> {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn parse_gender(raw: &str) -> Option<Gender> {
    let trimmed = raw.trim();
    // Codes are sometimes exported as floats ("1.0").
    if let Ok(code) = trimmed.parse::<f64>() {
        if code.fract() == 0.0 && (0.0..=255.0).contains(&code) {
            return Gender::from_code(code as u8);
        }
        return None;
    }
    trimmed.parse().ok()
}

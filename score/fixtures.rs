//! Small reference tables shared by the unit tests.

use crate::types::PERCENTILE_KEYS;
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};

pub const COEFFICIENTS: &str = "Disease,Variable,Coef
Hypertension,AGE,0.02
Hypertension,HR60-69,REF
Hypertension,HR70-79,0.03
Hypertension,BMI_normal,REF
Hypertension,BMI_overweight,REF
Hypertension,MALE,REF
Hypertension,Never_smoke,REF
Hypertension,Never_drink,REF
DEATH,AGE,0.04
DEATH,FEMALE,-0.3
Anxiety,FEMALE,0.4
Migraine,FEMALE,0.3
";

pub const HYPERTENSION: [f64; 17] = [
    -1.0, -0.8, -0.6, -0.4, -0.2, 0.0, 0.2, 0.4, 0.6, 0.8, 1.1, 1.2, 1.4, 1.6, 1.8, 2.0, 3.0,
];

pub const DEATH: [f64; 17] = [
    0.0, 0.2, 0.4, 0.6, 0.8, 1.0, 1.2, 1.4, 1.5, 1.6, 1.7, 1.75, 1.78, 1.9, 2.0, 2.5, 3.0,
];

/// Male 45-49 rows for Hypertension and Death, a female-only Anxiety row, and no
/// Migraine rows at all.
pub fn percentile_table() -> String {
    let header = std::iter::once("Disease\tSEX\tAGE".to_string())
        .chain(PERCENTILE_KEYS.iter().map(|p| format!("{p}%")))
        .join("\t");
    let row = |condition: &str, sex: u8, band: &str, thresholds: &[f64; 17]| {
        format!("{condition}\t{sex}\t{band}\t{}", thresholds.iter().join("\t"))
    };
    [
        header,
        row("Hypertension", 1, "45-49", &HYPERTENSION),
        row("DEATH", 1, "45-49", &DEATH),
        row("Anxiety", 2, "45-49", &HYPERTENSION),
    ]
    .join("\n")
}

/// Writes both tables into `dir` and returns (coefficients, percentiles).
pub fn write_tables(dir: &Path) -> (PathBuf, PathBuf) {
    let coefficients = dir.join("coef_test.csv");
    let percentiles = dir.join("HR_quantile_test.tsv");
    fs::write(&coefficients, COEFFICIENTS).unwrap();
    fs::write(&percentiles, percentile_table()).unwrap();
    (coefficients, percentiles)
}

// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Only types used by more than one module belong here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The percentile keys every row of the empirical distribution table must carry,
/// in ascending order.
pub const PERCENTILE_KEYS: [u8; 17] = [
    1, 3, 5, 10, 15, 20, 30, 40, 50, 60, 70, 80, 85, 90, 95, 98, 100,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("'{value}' is not a recognised {kind}")]
pub struct LabelError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Decodes the integer sex code used by the percentile source (1 = male, 2 = female).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Gender::Male),
            2 => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Gender::Male => 1,
            Gender::Female => 2,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        })
    }
}

impl FromStr for Gender {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "1" => Ok(Gender::Male),
            "female" | "f" | "2" => Ok(Gender::Female),
            _ => Err(LabelError {
                kind: "gender",
                value: s.to_string(),
            }),
        }
    }
}

/// Smoking or drinking history. Both lifestyle families share the same three levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExposureHistory {
    Never,
    Former,
    Current,
}

impl fmt::Display for ExposureHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExposureHistory::Never => "Never",
            ExposureHistory::Former => "Former",
            ExposureHistory::Current => "Current",
        })
    }
}

impl FromStr for ExposureHistory {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        exposure_level(&s.trim().to_ascii_uppercase()).ok_or_else(|| LabelError {
            kind: "exposure history",
            value: s.to_string(),
        })
    }
}

fn exposure_level(upper: &str) -> Option<ExposureHistory> {
    match upper {
        "NEVER" | "NERVER" | "NON" | "NO" => Some(ExposureHistory::Never),
        "FORMER" | "EVER" | "EX" | "PAST" => Some(ExposureHistory::Former),
        "CURRENT" | "NOW" | "YES" => Some(ExposureHistory::Current),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HeartRateBand {
    Below60,
    From60To69,
    From70To79,
    From80To89,
    AtLeast90,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BmiBand {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

/// The mutually exclusive categorical families of the model. Age is continuous and
/// therefore not a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CovariateFamily {
    HeartRate,
    Bmi,
    Gender,
    Smoking,
    Drinking,
}

impl CovariateFamily {
    pub const ALL: [CovariateFamily; 5] = [
        CovariateFamily::HeartRate,
        CovariateFamily::Bmi,
        CovariateFamily::Gender,
        CovariateFamily::Smoking,
        CovariateFamily::Drinking,
    ];
}

impl fmt::Display for CovariateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CovariateFamily::HeartRate => "heart rate",
            CovariateFamily::Bmi => "BMI",
            CovariateFamily::Gender => "gender",
            CovariateFamily::Smoking => "smoking",
            CovariateFamily::Drinking => "drinking",
        })
    }
}

/// A single model term. The coefficient table is keyed by these after parsing, so the
/// encoder and the table can never disagree on spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariableKey {
    Age,
    HeartRate(HeartRateBand),
    Bmi(BmiBand),
    Gender(Gender),
    Smoking(ExposureHistory),
    Drinking(ExposureHistory),
}

impl VariableKey {
    pub fn family(self) -> Option<CovariateFamily> {
        match self {
            VariableKey::Age => None,
            VariableKey::HeartRate(_) => Some(CovariateFamily::HeartRate),
            VariableKey::Bmi(_) => Some(CovariateFamily::Bmi),
            VariableKey::Gender(_) => Some(CovariateFamily::Gender),
            VariableKey::Smoking(_) => Some(CovariateFamily::Smoking),
            VariableKey::Drinking(_) => Some(CovariateFamily::Drinking),
        }
    }

    /// Parses a variable label from a coefficient table.
    ///
    /// Matching ignores case, whitespace and underscores, and accepts the historical
    /// spellings found in exported model tables (`HR_cat<60`, `FERMALE`, `Nerver_smoke`,
    /// `Ever_drink`, `bmi_obese`).
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();

        if normalized == "AGE" {
            return Some(VariableKey::Age);
        }
        match normalized.as_str() {
            "MALE" => return Some(VariableKey::Gender(Gender::Male)),
            "FEMALE" | "FERMALE" => return Some(VariableKey::Gender(Gender::Female)),
            _ => {}
        }

        if let Some(rest) = normalized
            .strip_prefix("HRCAT")
            .or_else(|| normalized.strip_prefix("HR"))
        {
            let band = match rest {
                "<60" => HeartRateBand::Below60,
                "60-69" => HeartRateBand::From60To69,
                "70-79" => HeartRateBand::From70To79,
                "80-89" => HeartRateBand::From80To89,
                ">=90" => HeartRateBand::AtLeast90,
                _ => return None,
            };
            return Some(VariableKey::HeartRate(band));
        }

        if let Some(rest) = normalized.strip_prefix("BMI") {
            let band = match rest {
                "UNDERWEIGHT" => BmiBand::Underweight,
                "NORMAL" => BmiBand::Normal,
                "OVERWEIGHT" => BmiBand::Overweight,
                "OBESE" => BmiBand::Obese,
                _ => return None,
            };
            return Some(VariableKey::Bmi(band));
        }

        for suffix in ["SMOKER", "SMOKING", "SMOKE"] {
            if let Some(level) = normalized.strip_suffix(suffix) {
                return exposure_level(level).map(VariableKey::Smoking);
            }
        }
        for suffix in ["DRINKER", "DRINKING", "DRINK"] {
            if let Some(level) = normalized.strip_suffix(suffix) {
                return exposure_level(level).map(VariableKey::Drinking);
            }
        }
        None
    }
}

impl fmt::Display for VariableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKey::Age => f.write_str("AGE"),
            VariableKey::HeartRate(band) => f.write_str(match band {
                HeartRateBand::Below60 => "HR<60",
                HeartRateBand::From60To69 => "HR60-69",
                HeartRateBand::From70To79 => "HR70-79",
                HeartRateBand::From80To89 => "HR80-89",
                HeartRateBand::AtLeast90 => "HR>=90",
            }),
            VariableKey::Bmi(band) => f.write_str(match band {
                BmiBand::Underweight => "BMI_underweight",
                BmiBand::Normal => "BMI_normal",
                BmiBand::Overweight => "BMI_overweight",
                BmiBand::Obese => "BMI_obese",
            }),
            VariableKey::Gender(Gender::Male) => f.write_str("MALE"),
            VariableKey::Gender(Gender::Female) => f.write_str("FEMALE"),
            VariableKey::Smoking(level) => f.write_str(match level {
                ExposureHistory::Never => "Never_smoke",
                ExposureHistory::Former => "Former_smoke",
                ExposureHistory::Current => "Current_smoke",
            }),
            VariableKey::Drinking(level) => f.write_str(match level {
                ExposureHistory::Never => "Never_drink",
                ExposureHistory::Former => "Former_drink",
                ExposureHistory::Current => "Current_drink",
            }),
        }
    }
}

/// Folds a condition name into the form used for lookups: trimmed, lower-cased, with
/// runs of whitespace and underscores collapsed to a single space.
pub fn normalize_condition(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

//! # Patient Profile
//!
//! The validated, immutable input to an assessment. A `PatientProfile` can only be
//! obtained through `PatientProfile::new`, so every downstream stage may assume the
//! fields are within the configured bounds.

use crate::types::{ExposureHistory, Gender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Age {age} is outside the supported range [{min}, {max}].")]
    AgeOutOfRange { age: u32, min: u32, max: u32 },
    #[error("Resting heart rate {bpm} bpm is outside the supported range [{min}, {max}].")]
    HeartRateOutOfRange { bpm: u32, min: u32, max: u32 },
    #[error("BMI {bmi} is outside the supported range [{min}, {max}].")]
    BmiOutOfRange { bmi: f64, min: f64, max: f64 },
    #[error("Body measurements must be finite and positive (height {height}, weight {weight}).")]
    InvalidBodyMeasurement { height: f64, weight: f64 },
}

/// Inclusive bounds a profile must satisfy before any computation begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileBounds {
    pub min_age: u32,
    pub max_age: u32,
    pub min_heart_rate: u32,
    pub max_heart_rate: u32,
    pub min_bmi: f64,
    pub max_bmi: f64,
}

impl Default for ProfileBounds {
    fn default() -> Self {
        Self {
            min_age: 18,
            max_age: 100,
            min_heart_rate: 30,
            max_heart_rate: 220,
            min_bmi: 10.0,
            max_bmi: 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientProfile {
    age: u32,
    gender: Gender,
    resting_heart_rate: u32,
    bmi: f64,
    smoking: ExposureHistory,
    drinking: ExposureHistory,
}

impl PatientProfile {
    pub fn new(
        age: u32,
        gender: Gender,
        resting_heart_rate: u32,
        bmi: f64,
        smoking: ExposureHistory,
        drinking: ExposureHistory,
        bounds: &ProfileBounds,
    ) -> Result<Self, ProfileError> {
        if !(bounds.min_age..=bounds.max_age).contains(&age) {
            return Err(ProfileError::AgeOutOfRange {
                age,
                min: bounds.min_age,
                max: bounds.max_age,
            });
        }
        if !(bounds.min_heart_rate..=bounds.max_heart_rate).contains(&resting_heart_rate) {
            return Err(ProfileError::HeartRateOutOfRange {
                bpm: resting_heart_rate,
                min: bounds.min_heart_rate,
                max: bounds.max_heart_rate,
            });
        }
        // NaN fails the range check as well.
        if !(bmi > 0.0 && (bounds.min_bmi..=bounds.max_bmi).contains(&bmi)) {
            return Err(ProfileError::BmiOutOfRange {
                bmi,
                min: bounds.min_bmi,
                max: bounds.max_bmi,
            });
        }
        Ok(Self {
            age,
            gender,
            resting_heart_rate,
            bmi,
            smoking,
            drinking,
        })
    }

    #[inline]
    pub fn age(&self) -> u32 {
        self.age
    }

    #[inline]
    pub fn gender(&self) -> Gender {
        self.gender
    }

    #[inline]
    pub fn resting_heart_rate(&self) -> u32 {
        self.resting_heart_rate
    }

    #[inline]
    pub fn bmi(&self) -> f64 {
        self.bmi
    }

    #[inline]
    pub fn smoking(&self) -> ExposureHistory {
        self.smoking
    }

    #[inline]
    pub fn drinking(&self) -> ExposureHistory {
        self.drinking
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeightUnit {
    Centimetres,
    Metres,
    Inches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightUnit {
    Kilograms,
    Pounds,
}

const METRES_PER_INCH: f64 = 0.0254;
const KILOGRAMS_PER_POUND: f64 = 0.453592;

/// Body-mass index from height and weight, rounded to one decimal place.
pub fn body_mass_index(
    height: f64,
    height_unit: HeightUnit,
    weight: f64,
    weight_unit: WeightUnit,
) -> Result<f64, ProfileError> {
    if !(height.is_finite() && weight.is_finite() && height > 0.0 && weight > 0.0) {
        return Err(ProfileError::InvalidBodyMeasurement { height, weight });
    }
    let height_m = match height_unit {
        HeightUnit::Centimetres => height / 100.0,
        HeightUnit::Metres => height,
        HeightUnit::Inches => height * METRES_PER_INCH,
    };
    let weight_kg = match weight_unit {
        WeightUnit::Kilograms => weight,
        WeightUnit::Pounds => weight * KILOGRAMS_PER_POUND,
    };
    let bmi = weight_kg / (height_m * height_m);
    Ok((bmi * 10.0).round() / 10.0)
}

/// Age strata of the reference population. The cut points are the lower bounds of
/// every band after the first, so `[40, 45]` yields `<40`, `40-44`, `>=45`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgeBands {
    cuts: Vec<u32>,
}

impl Default for AgeBands {
    fn default() -> Self {
        Self {
            cuts: vec![40, 45, 50, 55, 60],
        }
    }
}

impl AgeBands {
    /// Returns `None` unless the cut points are non-empty and strictly increasing.
    pub fn new(cuts: Vec<u32>) -> Option<Self> {
        if cuts.is_empty() || cuts.windows(2).any(|w| w[0] >= w[1]) {
            return None;
        }
        Some(Self { cuts })
    }

    pub fn cuts(&self) -> &[u32] {
        &self.cuts
    }

    pub fn label_for(&self, age: u32) -> String {
        let Some(&first) = self.cuts.first() else {
            return "all".to_string();
        };
        if age < first {
            return format!("<{first}");
        }
        for window in self.cuts.windows(2) {
            if age >= window[0] && age < window[1] {
                return format!("{}-{}", window[0], window[1] - 1);
            }
        }
        // The loop covers everything below the last cut.
        let last = self.cuts[self.cuts.len() - 1];
        format!(">={last}")
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.cuts.len() + 1);
        if let Some(&first) = self.cuts.first() {
            labels.push(format!("<{first}"));
            for window in self.cuts.windows(2) {
                labels.push(format!("{}-{}", window[0], window[1] - 1));
            }
            labels.push(format!(">={}", self.cuts[self.cuts.len() - 1]));
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_with(age: u32, bpm: u32, bmi: f64) -> Result<PatientProfile, ProfileError> {
        PatientProfile::new(
            age,
            Gender::Male,
            bpm,
            bmi,
            ExposureHistory::Never,
            ExposureHistory::Never,
            &ProfileBounds::default(),
        )
    }

    #[test]
    fn valid_profile_round_trips_its_fields() {
        let profile = profile_with(45, 72, 24.0).unwrap();
        assert_eq!(profile.age(), 45);
        assert_eq!(profile.resting_heart_rate(), 72);
        assert_eq!(profile.bmi(), 24.0);
        assert_eq!(profile.gender(), Gender::Male);
    }

    #[test]
    fn out_of_range_fields_are_rejected_before_scoring() {
        assert!(matches!(
            profile_with(12, 72, 24.0),
            Err(ProfileError::AgeOutOfRange { age: 12, .. })
        ));
        assert!(matches!(
            profile_with(45, 400, 24.0),
            Err(ProfileError::HeartRateOutOfRange { bpm: 400, .. })
        ));
        assert!(matches!(
            profile_with(45, 72, -3.0),
            Err(ProfileError::BmiOutOfRange { .. })
        ));
        assert!(matches!(
            profile_with(45, 72, f64::NAN),
            Err(ProfileError::BmiOutOfRange { .. })
        ));
    }

    #[test]
    fn bmi_converts_units_and_rounds_to_one_decimal() {
        let metric = body_mass_index(175.0, HeightUnit::Centimetres, 70.0, WeightUnit::Kilograms)
            .unwrap();
        assert_eq!(metric, 22.9);

        let imperial =
            body_mass_index(69.0, HeightUnit::Inches, 154.0, WeightUnit::Pounds).unwrap();
        assert_eq!(imperial, 22.7);

        assert!(body_mass_index(0.0, HeightUnit::Metres, 70.0, WeightUnit::Kilograms).is_err());
    }

    #[test]
    fn default_age_bands_match_reference_population_labels() {
        let bands = AgeBands::default();
        assert_eq!(bands.label_for(18), "<40");
        assert_eq!(bands.label_for(39), "<40");
        assert_eq!(bands.label_for(40), "40-44");
        assert_eq!(bands.label_for(45), "45-49");
        assert_eq!(bands.label_for(59), "55-59");
        assert_eq!(bands.label_for(60), ">=60");
        assert_eq!(bands.label_for(95), ">=60");
        assert_eq!(
            bands.labels(),
            vec!["<40", "40-44", "45-49", "50-54", "55-59", ">=60"]
        );
    }

    #[test]
    fn age_band_cuts_must_increase() {
        assert!(AgeBands::new(vec![]).is_none());
        assert!(AgeBands::new(vec![40, 40]).is_none());
        assert!(AgeBands::new(vec![30, 65]).is_some());
    }
}

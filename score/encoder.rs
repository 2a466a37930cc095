use crate::profile::PatientProfile;
use crate::types::{BmiBand, CovariateFamily, HeartRateBand, VariableKey};

// Every band is closed below and open above, so a value sitting exactly on a
// threshold belongs to the higher band.

pub fn heart_rate_band(bpm: u32) -> HeartRateBand {
    match bpm {
        0..60 => HeartRateBand::Below60,
        60..70 => HeartRateBand::From60To69,
        70..80 => HeartRateBand::From70To79,
        80..90 => HeartRateBand::From80To89,
        _ => HeartRateBand::AtLeast90,
    }
}

pub fn bmi_band(bmi: f64) -> BmiBand {
    if bmi < 18.5 {
        BmiBand::Underweight
    } else if bmi < 24.0 {
        BmiBand::Normal
    } else if bmi < 27.0 {
        BmiBand::Overweight
    } else {
        BmiBand::Obese
    }
}

/// The categorical level a profile falls into for each covariate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedCovariates {
    pub heart_rate: VariableKey,
    pub bmi: VariableKey,
    pub gender: VariableKey,
    pub smoking: VariableKey,
    pub drinking: VariableKey,
}

impl EncodedCovariates {
    pub fn get(&self, family: CovariateFamily) -> VariableKey {
        match family {
            CovariateFamily::HeartRate => self.heart_rate,
            CovariateFamily::Bmi => self.bmi,
            CovariateFamily::Gender => self.gender,
            CovariateFamily::Smoking => self.smoking,
            CovariateFamily::Drinking => self.drinking,
        }
    }

    /// Family and level pairs in a fixed order, so summation order never varies.
    pub fn iter(&self) -> impl Iterator<Item = (CovariateFamily, VariableKey)> + '_ {
        CovariateFamily::ALL
            .into_iter()
            .map(move |family| (family, self.get(family)))
    }
}

pub fn encode(profile: &PatientProfile) -> EncodedCovariates {
    EncodedCovariates {
        heart_rate: VariableKey::HeartRate(heart_rate_band(profile.resting_heart_rate())),
        bmi: VariableKey::Bmi(bmi_band(profile.bmi())),
        gender: VariableKey::Gender(profile.gender()),
        smoking: VariableKey::Smoking(profile.smoking()),
        drinking: VariableKey::Drinking(profile.drinking()),
    }
}

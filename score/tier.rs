use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordinal risk bucket derived from a cohort percentile. The schedule is shared by
/// every condition, mortality included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Average,
    ModerateHigh,
    High,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Average,
        RiskTier::ModerateHigh,
        RiskTier::High,
    ];

    pub fn from_percentile(percentile: u8) -> Self {
        match percentile {
            90.. => RiskTier::High,
            75..=89 => RiskTier::ModerateHigh,
            50..=74 => RiskTier::Average,
            _ => RiskTier::Low,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskTier::Low => "Low",
            RiskTier::Average => "Average",
            RiskTier::ModerateHigh => "Moderate-High",
            RiskTier::High => "High",
        })
    }
}

//! # Consented Event Export
//!
//! Shapes an assessment into the records an external event store expects: one
//! session record plus one row per scored condition. Nothing is produced unless the
//! person consented. Delivering the payload is the caller's concern.

use crate::config::{DataFiles, ExportConfig};
use crate::profile::PatientProfile;
use crate::report::RiskReport;
use crate::tier::RiskTier;
use crate::types::{ExposureHistory, Gender};
use serde::Serialize;

/// Constants stamped onto every exported record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub app_version: String,
    pub model_version: String,
    pub timezone: String,
    pub client_hint: String,
}

impl ExportSettings {
    pub fn new(config: &ExportConfig, files: Option<&DataFiles>) -> Self {
        let model_version = config
            .model_version
            .clone()
            .or_else(|| files.map(DataFiles::model_version))
            .unwrap_or_else(|| "unversioned".to_string());
        Self {
            app_version: config.app_version.clone(),
            model_version,
            timezone: config.timezone.clone(),
            client_hint: config.client_hint.clone(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::new(&ExportConfig::default(), None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub consent: bool,
    pub app_version: String,
    pub client_hint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskEventRow {
    pub session_id: String,
    pub age: u32,
    pub gender: Gender,
    pub bmi: f64,
    pub resting_heart_rate: u32,
    pub smoking: ExposureHistory,
    pub drinking: ExposureHistory,
    pub age_band: String,
    pub condition: String,
    pub category: String,
    pub linear_predictor: f64,
    pub percentile: u8,
    pub bracket_percentile: u8,
    pub tier: RiskTier,
    pub model_version: String,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportPayload {
    pub session: SessionRecord,
    pub events: Vec<RiskEventRow>,
}

impl ExportPayload {
    /// `None` without consent. Gaps are not exported, only scored conditions.
    pub fn build(
        consent: bool,
        session_id: &str,
        profile: &PatientProfile,
        age_band: &str,
        report: &RiskReport,
        settings: &ExportSettings,
    ) -> Option<Self> {
        if !consent {
            log::debug!("No consent given; nothing exported for session {session_id}");
            return None;
        }
        let events = report
            .results
            .iter()
            .map(|result| RiskEventRow {
                session_id: session_id.to_string(),
                age: profile.age(),
                gender: profile.gender(),
                bmi: profile.bmi(),
                resting_heart_rate: profile.resting_heart_rate(),
                smoking: profile.smoking(),
                drinking: profile.drinking(),
                age_band: age_band.to_string(),
                condition: result.condition.clone(),
                category: result.category.clone(),
                linear_predictor: result.linear_predictor,
                percentile: result.percentile,
                bracket_percentile: result.bracket_percentile,
                tier: result.tier,
                model_version: settings.model_version.clone(),
                timezone: settings.timezone.clone(),
            })
            .collect();
        Some(Self {
            session: SessionRecord {
                id: session_id.to_string(),
                consent,
                app_version: settings.app_version.clone(),
                client_hint: settings.client_hint.clone(),
            },
            events,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

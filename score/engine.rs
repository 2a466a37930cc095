//! # Risk Engine
//!
//! The immutable service object an application builds once at startup. It owns both
//! reference tables, the catalog and the age banding, and hands out `Assessor` views
//! over them. Nothing inside is mutated after construction, so one engine can be
//! shared by reference across threads.

use crate::catalog::ConditionCatalog;
use crate::coefficients::{CoefficientError, CoefficientStore};
use crate::config::{ConfigError, DataFiles, RiskConfig};
use crate::export::ExportSettings;
use crate::percentiles::{PercentileTable, PercentileTableError, RankingMethod};
use crate::profile::{AgeBands, PatientProfile, ProfileBounds, ProfileError};
use crate::report::{Assessor, ConditionSelection, ReportOrdering, RiskReport};
use crate::types::{ExposureHistory, Gender};
use itertools::Itertools;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Coefficients(#[from] CoefficientError),
    #[error(transparent)]
    Percentiles(#[from] PercentileTableError),
    #[error("Required condition(s) missing from the coefficient table: {}", .0.join(", "))]
    MissingRequired(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct RiskEngine {
    coefficients: CoefficientStore,
    percentiles: PercentileTable,
    catalog: ConditionCatalog,
    age_bands: AgeBands,
    bounds: ProfileBounds,
    method: RankingMethod,
    export: ExportSettings,
    files: Option<DataFiles>,
}

impl RiskEngine {
    /// Resolves the data files named by `config` and loads both tables.
    pub fn load(config: &RiskConfig) -> Result<Self, EngineError> {
        let files = config.data.resolve()?;
        let catalog = config.catalog();
        let age_bands = config.age_bands()?;
        log::info!(
            "Loading coefficients {} and percentiles {}",
            files.coefficients.display(),
            files.percentiles.display()
        );
        let coefficients = CoefficientStore::from_path(&files.coefficients, &catalog)?;
        let percentiles = PercentileTable::from_path(&files.percentiles, &catalog)?;

        let mut engine = Self::from_parts(
            coefficients,
            percentiles,
            catalog,
            age_bands,
            config.profile.clone(),
            config.ranking.method,
        )?;
        engine.export = ExportSettings::new(&config.export, Some(&files));
        engine.files = Some(files);
        Ok(engine)
    }

    /// Assembles an engine from tables that are already in memory. Fails when a
    /// required condition is absent from the coefficient table.
    pub fn from_parts(
        coefficients: CoefficientStore,
        percentiles: PercentileTable,
        catalog: ConditionCatalog,
        age_bands: AgeBands,
        bounds: ProfileBounds,
        method: RankingMethod,
    ) -> Result<Self, EngineError> {
        let missing: Vec<String> = catalog
            .required()
            .iter()
            .map(|name| catalog.canonical_name(name))
            .filter(|name| !coefficients.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingRequired(missing));
        }

        let unranked = coefficients
            .conditions()
            .filter(|name| !percentiles.has_condition(name))
            .collect::<Vec<_>>();
        if !unranked.is_empty() {
            log::warn!(
                "No reference distribution for {}; these conditions will be reported as gaps.",
                unranked.iter().join(", ")
            );
        }
        let unmatched = age_bands
            .labels()
            .into_iter()
            .filter(|label| !percentiles.age_bands().contains(label))
            .collect::<Vec<_>>();
        if !unmatched.is_empty() {
            log::warn!(
                "Age band(s) {} do not appear in the percentile table (which has {}).",
                unmatched.iter().join(", "),
                percentiles.age_bands().iter().join(", ")
            );
        }

        Ok(Self {
            coefficients,
            percentiles,
            catalog,
            age_bands,
            bounds,
            method,
            export: ExportSettings::default(),
            files: None,
        })
    }

    pub fn assessor(&self) -> Assessor<'_> {
        Assessor::new(
            &self.coefficients,
            &self.percentiles,
            &self.catalog,
            &self.age_bands,
            self.method,
        )
    }

    pub fn assess(
        &self,
        profile: &PatientProfile,
        selection: &ConditionSelection,
        ordering: ReportOrdering,
    ) -> RiskReport {
        self.assessor().assess(profile, selection, ordering)
    }

    /// Validates a profile against the configured bounds.
    pub fn profile(
        &self,
        age: u32,
        gender: Gender,
        resting_heart_rate: u32,
        bmi: f64,
        smoking: ExposureHistory,
        drinking: ExposureHistory,
    ) -> Result<PatientProfile, ProfileError> {
        PatientProfile::new(
            age,
            gender,
            resting_heart_rate,
            bmi,
            smoking,
            drinking,
            &self.bounds,
        )
    }

    /// Conditions present in both tables, in coefficient-table order.
    pub fn available_conditions(&self) -> Vec<&str> {
        self.coefficients
            .conditions()
            .filter(|name| self.percentiles.has_condition(name))
            .collect()
    }

    pub fn age_band(&self, age: u32) -> String {
        self.age_bands.label_for(age)
    }

    pub fn catalog(&self) -> &ConditionCatalog {
        &self.catalog
    }

    pub fn coefficients(&self) -> &CoefficientStore {
        &self.coefficients
    }

    pub fn percentiles(&self) -> &PercentileTable {
        &self.percentiles
    }

    pub fn export_settings(&self) -> &ExportSettings {
        &self.export
    }

    /// The resolved data files, when the engine was loaded from configuration.
    pub fn data_files(&self) -> Option<&DataFiles> {
        self.files.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_tables;
    use tempfile::tempdir;

    fn config_for(dir: &std::path::Path, extra: &str) -> RiskConfig {
        let (coefficients, percentiles) = write_tables(dir);
        let text = format!(
            "[data]\ncoefficients = {:?}\npercentiles = {:?}\n{extra}",
            coefficients.display().to_string(),
            percentiles.display().to_string()
        );
        RiskConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RiskEngine>();
    }

    #[test]
    fn loads_tables_named_by_configuration() {
        let dir = tempdir().unwrap();
        let engine = RiskEngine::load(&config_for(dir.path(), "")).unwrap();
        assert_eq!(engine.coefficients().len(), 4);
        assert_eq!(engine.percentiles().len(), 3);
        assert_eq!(
            engine.available_conditions(),
            vec!["Hypertension", "Death", "Anxiety"]
        );
        assert_eq!(engine.age_band(47), "45-49");
        assert!(engine.data_files().is_some());
        assert_eq!(engine.export_settings().timezone, "Asia/Taipei");
    }

    #[test]
    fn missing_required_conditions_stop_startup() {
        let dir = tempdir().unwrap();
        let config = config_for(
            dir.path(),
            "[catalog]\nrequired = [\"DEATH\", \"t2d\", \"Hypertension\"]\n",
        );
        match RiskEngine::load(&config) {
            Err(EngineError::MissingRequired(missing)) => {
                assert_eq!(missing, vec!["Type 2 Diabetes".to_string()]);
            }
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }

    #[test]
    fn absent_tables_are_configuration_errors() {
        let dir = tempdir().unwrap();
        let mut config = RiskConfig::default();
        config.data.directory = dir.path().to_path_buf();
        assert!(matches!(
            RiskEngine::load(&config),
            Err(EngineError::Coefficients(CoefficientError::Io { .. }))
        ));
    }

    #[test]
    fn engine_profiles_honour_configured_bounds() {
        let dir = tempdir().unwrap();
        let engine = RiskEngine::load(&config_for(dir.path(), "[profile]\nmin_age = 40\n")).unwrap();
        assert!(matches!(
            engine.profile(
                35,
                Gender::Female,
                70,
                22.0,
                ExposureHistory::Never,
                ExposureHistory::Never
            ),
            Err(ProfileError::AgeOutOfRange { min: 40, .. })
        ));
        let profile = engine
            .profile(
                45,
                Gender::Male,
                72,
                24.0,
                ExposureHistory::Never,
                ExposureHistory::Never,
            )
            .unwrap();
        let report = engine.assess(
            &profile,
            &ConditionSelection::All,
            ReportOrdering::MostConcerningFirst,
        );
        assert_eq!(report.results[0].condition, "Death");
        assert_eq!(report.results[1].percentile, 64);
    }
}

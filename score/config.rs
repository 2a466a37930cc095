//! # Configuration
//!
//! Everything the engine needs to know before it loads a table: where the data files
//! live, which versions to use, how profiles are bounded, how ages map to the bands of
//! the reference population, and how percentiles are ranked. Every field has a
//! default, so a missing or empty configuration file is valid.

use crate::catalog::{ConditionCatalog, ConditionCategory, default_aliases, default_categories};
use crate::percentiles::RankingMethod;
use crate::profile::{AgeBands, ProfileBounds};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_DATA_VERSION: &str = "250829";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to parse data manifest '{path}': {source}")]
    Manifest {
        path: String,
        source: serde_json::Error,
    },
    #[error("Age band cut points {0:?} must be non-empty and strictly increasing.")]
    InvalidAgeBands(Vec<u32>),
    #[error("Profile bounds are inverted for {0}: the minimum exceeds the maximum.")]
    InvertedBounds(&'static str),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskConfig {
    pub data: DataConfig,
    pub profile: ProfileBounds,
    pub age_bands: AgeBandConfig,
    pub ranking: RankingConfig,
    pub catalog: CatalogConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Holds `coefficients/`, `percentiles/` and the optional manifest.
    pub directory: PathBuf,
    /// Defaults to `<directory>/manifest.json` when that file exists.
    pub manifest: Option<PathBuf>,
    pub coef_version: Option<String>,
    pub pct_version: Option<String>,
    /// Explicit table paths win over version-based resolution.
    pub coefficients: Option<PathBuf>,
    pub percentiles: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("model"),
            manifest: None,
            coef_version: None,
            pct_version: None,
            coefficients: None,
            percentiles: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgeBandConfig {
    pub cuts: Vec<u32>,
}

impl Default for AgeBandConfig {
    fn default() -> Self {
        Self {
            cuts: AgeBands::default().cuts().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingConfig {
    pub method: RankingMethod,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Replaces the built-in grouping when present.
    pub categories: Option<Vec<ConditionCategory>>,
    /// Added to the built-in aliases; later entries win.
    pub aliases: BTreeMap<String, String>,
    /// Conditions the coefficient table must provide for the engine to start.
    pub required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub app_version: String,
    /// Derived from the resolved data versions when unset.
    pub model_version: Option<String>,
    pub timezone: String,
    pub client_hint: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            app_version: concat!("riskrank-", env!("CARGO_PKG_VERSION")).to_string(),
            model_version: None,
            timezone: "Asia/Taipei".to_string(),
            client_hint: "riskrank-cli".to_string(),
        }
    }
}

/// The concrete table files and versions a configuration resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFiles {
    pub coefficients: PathBuf,
    pub percentiles: PathBuf,
    pub coef_version: String,
    pub pct_version: String,
}

impl DataFiles {
    pub fn model_version(&self) -> String {
        format!("coef:{}; pct:{}", self.coef_version, self.pct_version)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    coef_version: Option<String>,
    pct_version: Option<String>,
}

fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

impl RiskConfig {
    /// Loads a TOML file. Relative data paths are taken relative to the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_toml_str(&read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            config.data.rebase(base);
        }
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.check_bounds()?;
        Ok(config)
    }

    fn check_bounds(&self) -> Result<(), ConfigError> {
        let bounds = &self.profile;
        if bounds.min_age > bounds.max_age {
            return Err(ConfigError::InvertedBounds("age"));
        }
        if bounds.min_heart_rate > bounds.max_heart_rate {
            return Err(ConfigError::InvertedBounds("resting heart rate"));
        }
        if !(bounds.min_bmi <= bounds.max_bmi) {
            return Err(ConfigError::InvertedBounds("BMI"));
        }
        Ok(())
    }

    pub fn age_bands(&self) -> Result<AgeBands, ConfigError> {
        AgeBands::new(self.age_bands.cuts.clone())
            .ok_or_else(|| ConfigError::InvalidAgeBands(self.age_bands.cuts.clone()))
    }

    pub fn catalog(&self) -> ConditionCatalog {
        let categories = self
            .catalog
            .categories
            .clone()
            .unwrap_or_else(default_categories);
        let mut aliases = default_aliases();
        aliases.extend(
            self.catalog
                .aliases
                .iter()
                .map(|(alias, name)| (alias.clone(), name.clone())),
        );
        ConditionCatalog::new(categories, aliases, self.catalog.required.clone())
    }
}

impl DataConfig {
    fn rebase(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        rebase(&mut self.directory);
        for path in [&mut self.manifest, &mut self.coefficients, &mut self.percentiles]
            .into_iter()
            .flatten()
        {
            rebase(path);
        }
    }

    /// Versions come from the built-in default, then the manifest, then this
    /// configuration. An explicitly configured manifest must exist.
    pub fn resolve(&self) -> Result<DataFiles, ConfigError> {
        let manifest = match &self.manifest {
            Some(path) => read_manifest(path)?,
            None => {
                let path = self.directory.join(MANIFEST_FILE);
                if path.is_file() {
                    read_manifest(&path)?
                } else {
                    Manifest::default()
                }
            }
        };

        let coef_version = self
            .coef_version
            .clone()
            .or(manifest.coef_version)
            .unwrap_or_else(|| DEFAULT_DATA_VERSION.to_string());
        let pct_version = self
            .pct_version
            .clone()
            .or(manifest.pct_version)
            .unwrap_or_else(|| DEFAULT_DATA_VERSION.to_string());

        let coefficients = self.coefficients.clone().unwrap_or_else(|| {
            self.directory
                .join("coefficients")
                .join(format!("coef_{coef_version}.csv"))
        });
        let percentiles = self.percentiles.clone().unwrap_or_else(|| {
            self.directory
                .join("percentiles")
                .join(format!("HR_quantile_{pct_version}.tsv"))
        });

        Ok(DataFiles {
            coefficients,
            percentiles,
            coef_version,
            pct_version,
        })
    }
}

fn read_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    let text = read_to_string(path)?;
    let manifest = serde_json::from_str(&text).map_err(|source| ConfigError::Manifest {
        path: path.display().to_string(),
        source,
    })?;
    log::debug!("Read data manifest {}", path.display());
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_configuration_uses_defaults() {
        let config = RiskConfig::from_toml_str("").unwrap();
        assert_eq!(config, RiskConfig::default());
        assert_eq!(config.ranking.method, RankingMethod::Interpolated);
        assert_eq!(config.age_bands().unwrap(), AgeBands::default());
        assert_eq!(config.export.timezone, "Asia/Taipei");
    }

    #[test]
    fn sections_override_defaults() {
        let config = RiskConfig::from_toml_str(
            r#"
            [profile]
            min_age = 30

            [age_bands]
            cuts = [50, 65]

            [ranking]
            method = "stepwise"

            [catalog]
            required = ["Death"]
            aliases = { htn = "Hypertension" }
            "#,
        )
        .unwrap();
        assert_eq!(config.profile.min_age, 30);
        assert_eq!(config.profile.max_age, 100);
        assert_eq!(config.ranking.method, RankingMethod::Stepwise);
        assert_eq!(
            config.age_bands().unwrap().labels(),
            vec!["<50", "50-64", ">=65"]
        );
        let catalog = config.catalog();
        assert_eq!(catalog.canonical_name("HTN"), "Hypertension");
        assert_eq!(catalog.canonical_name("af"), "Atrial Fibrillation");
        assert_eq!(catalog.required(), ["Death".to_string()]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = RiskConfig::from_toml_str("[age_bands]\ncuts = [60, 40]\n").unwrap();
        assert!(matches!(
            config.age_bands(),
            Err(ConfigError::InvalidAgeBands(_))
        ));
        assert!(matches!(
            RiskConfig::from_toml_str("[profile]\nmin_age = 90\nmax_age = 20\n"),
            Err(ConfigError::InvertedBounds("age"))
        ));
        assert!(matches!(
            RiskConfig::from_toml_str("[data]\nfolder = \"x\"\n"),
            Err(ConfigError::TomlParseError(_))
        ));
    }

    #[test]
    fn files_resolve_from_default_versions() {
        let dir = tempdir().unwrap();
        let data = DataConfig {
            directory: dir.path().to_path_buf(),
            ..DataConfig::default()
        };
        let files = data.resolve().unwrap();
        assert_eq!(
            files.coefficients,
            dir.path().join("coefficients").join("coef_250829.csv")
        );
        assert_eq!(
            files.percentiles,
            dir.path().join("percentiles").join("HR_quantile_250829.tsv")
        );
        assert_eq!(files.model_version(), "coef:250829; pct:250829");
    }

    #[test]
    fn manifest_versions_apply_unless_configured() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"coef_version": "250904", "pct_version": "250901"}"#,
        )
        .unwrap();
        let mut data = DataConfig {
            directory: dir.path().to_path_buf(),
            ..DataConfig::default()
        };
        let files = data.resolve().unwrap();
        assert_eq!(files.coef_version, "250904");
        assert_eq!(files.pct_version, "250901");

        data.pct_version = Some("240101".to_string());
        data.coefficients = Some(PathBuf::from("/tmp/custom.csv"));
        let files = data.resolve().unwrap();
        assert_eq!(files.pct_version, "240101");
        assert_eq!(files.coefficients, PathBuf::from("/tmp/custom.csv"));
    }

    #[test]
    fn malformed_or_missing_manifests_are_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        let data = DataConfig {
            directory: dir.path().to_path_buf(),
            ..DataConfig::default()
        };
        assert!(matches!(data.resolve(), Err(ConfigError::Manifest { .. })));

        let data = DataConfig {
            manifest: Some(dir.path().join("absent.json")),
            ..DataConfig::default()
        };
        assert!(matches!(data.resolve(), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn relative_paths_follow_the_configuration_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("riskrank.toml");
        fs::write(
            &path,
            "[data]\ndirectory = \"tables\"\npercentiles = \"/abs/pct.tsv\"\n",
        )
        .unwrap();
        let config = RiskConfig::load(&path).unwrap();
        assert_eq!(config.data.directory, dir.path().join("tables"));
        assert_eq!(config.data.percentiles, Some(PathBuf::from("/abs/pct.tsv")));
    }
}

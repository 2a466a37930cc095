//! # Risk Report Assembly
//!
//! Runs the scoring pipeline across a selection of conditions for one profile:
//! encode once, then per condition compute the linear predictor, rank it against the
//! caller's cohort, and classify. Conditions that cannot be scored are reported as
//! gaps next to the results instead of failing the whole report.

use crate::catalog::ConditionCatalog;
use crate::coefficients::CoefficientStore;
use crate::encoder::encode;
use crate::percentiles::{PercentileTable, RankingMethod};
use crate::predictor::compute_lp;
use crate::profile::{AgeBands, PatientProfile};
use crate::tier::RiskTier;
use crate::types::{Gender, VariableKey};
use itertools::Itertools;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Which conditions a report covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionSelection {
    /// Every condition in the coefficient table, in table order.
    All,
    /// Explicit condition names or aliases, in the order given.
    Conditions(Vec<String>),
    /// Category names that expand through the catalog.
    Categories(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportOrdering {
    #[default]
    AsRequested,
    /// Descending percentile; ties keep their requested order.
    MostConcerningFirst,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskResult {
    pub condition: String,
    pub category: String,
    pub linear_predictor: f64,
    pub percentile: u8,
    pub bracket_percentile: u8,
    pub tier: RiskTier,
    #[serde(serialize_with = "serialize_labels")]
    pub missing_terms: Vec<VariableKey>,
}

fn serialize_labels<S: Serializer>(keys: &[VariableKey], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(keys.iter().map(|key| key.to_string()))
}

/// The reference table a condition was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTable {
    Coefficients,
    Percentiles,
}

impl fmt::Display for ReferenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferenceTable::Coefficients => "coefficient",
            ReferenceTable::Percentiles => "percentile",
        })
    }
}

/// Why a requested condition is absent from the results.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionGap {
    #[error("{condition}: not in the {table} table")]
    UnknownCondition {
        condition: String,
        table: ReferenceTable,
    },
    #[error("{condition}: no reference distribution for {gender}, age band {age_band}")]
    DemographicGap {
        condition: String,
        gender: Gender,
        age_band: String,
    },
    #[error("'{category}' is not a known condition category")]
    UnknownCategory { category: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReport {
    pub results: Vec<RiskResult>,
    /// Every tier is present; only returned results are counted.
    pub tier_counts: BTreeMap<RiskTier, usize>,
    pub gaps: Vec<ConditionGap>,
}

impl RiskReport {
    pub fn result(&self, condition: &str) -> Option<&RiskResult> {
        self.results.iter().find(|r| r.condition == condition)
    }
}

/// Borrowed view over the loaded tables that scores one profile at a time.
#[derive(Debug, Clone, Copy)]
pub struct Assessor<'a> {
    coefficients: &'a CoefficientStore,
    percentiles: &'a PercentileTable,
    catalog: &'a ConditionCatalog,
    age_bands: &'a AgeBands,
    method: RankingMethod,
}

impl<'a> Assessor<'a> {
    pub fn new(
        coefficients: &'a CoefficientStore,
        percentiles: &'a PercentileTable,
        catalog: &'a ConditionCatalog,
        age_bands: &'a AgeBands,
        method: RankingMethod,
    ) -> Self {
        Self {
            coefficients,
            percentiles,
            catalog,
            age_bands,
            method,
        }
    }

    /// Resolves a selection to display names, dropping duplicates. Unknown
    /// category names are returned as gaps.
    fn resolve(&self, selection: &ConditionSelection) -> (Vec<String>, Vec<ConditionGap>) {
        match selection {
            ConditionSelection::All => (
                self.coefficients.conditions().map(str::to_string).collect(),
                Vec::new(),
            ),
            ConditionSelection::Conditions(names) => (
                names
                    .iter()
                    .map(|name| self.catalog.canonical_name(name))
                    .unique()
                    .collect(),
                Vec::new(),
            ),
            ConditionSelection::Categories(categories) => {
                let (conditions, unknown) = self.catalog.expand_categories(categories);
                let gaps = unknown
                    .into_iter()
                    .map(|category| ConditionGap::UnknownCategory { category })
                    .collect();
                (conditions.into_iter().unique().collect(), gaps)
            }
        }
    }

    pub fn assess(
        &self,
        profile: &PatientProfile,
        selection: &ConditionSelection,
        ordering: ReportOrdering,
    ) -> RiskReport {
        let (conditions, mut gaps) = self.resolve(selection);
        let encoded = encode(profile);
        let age_band = self.age_bands.label_for(profile.age());
        let gender = profile.gender();

        let mut results = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let lp = match compute_lp(self.coefficients, &condition, &encoded, profile.age()) {
                Ok(lp) => lp,
                Err(_) => {
                    log::info!("{condition}: not in the coefficient table; skipped");
                    gaps.push(ConditionGap::UnknownCondition {
                        condition,
                        table: ReferenceTable::Coefficients,
                    });
                    continue;
                }
            };
            if !self.percentiles.has_condition(&condition) {
                log::info!("{condition}: not in the percentile table; skipped");
                gaps.push(ConditionGap::UnknownCondition {
                    condition,
                    table: ReferenceTable::Percentiles,
                });
                continue;
            }
            let Some(rank) =
                self.percentiles
                    .rank(&condition, gender, &age_band, lp.value, self.method)
            else {
                log::info!("{condition}: no reference row for {gender} {age_band}; skipped");
                gaps.push(ConditionGap::DemographicGap {
                    condition,
                    gender,
                    age_band: age_band.clone(),
                });
                continue;
            };

            results.push(RiskResult {
                category: self.catalog.category_of(&condition).to_string(),
                condition,
                linear_predictor: lp.value,
                percentile: rank.percentile,
                bracket_percentile: rank.bracket,
                tier: RiskTier::from_percentile(rank.percentile),
                missing_terms: lp.missing_terms,
            });
        }

        if ordering == ReportOrdering::MostConcerningFirst {
            results.sort_by(|a, b| b.percentile.cmp(&a.percentile));
        }

        let mut tier_counts: BTreeMap<RiskTier, usize> =
            RiskTier::ALL.into_iter().map(|tier| (tier, 0)).collect();
        for result in &results {
            *tier_counts.entry(result.tier).or_default() += 1;
        }

        if !gaps.is_empty() {
            log::debug!(
                "{} condition(s) could not be scored: {}",
                gaps.len(),
                gaps.iter().join("; ")
            );
        }

        RiskReport {
            results,
            tier_counts,
            gaps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{COEFFICIENTS, percentile_table};
    use crate::types::ExposureHistory;
    use approx::assert_abs_diff_eq;

    struct Fixture {
        coefficients: CoefficientStore,
        percentiles: PercentileTable,
        catalog: ConditionCatalog,
        bands: AgeBands,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = ConditionCatalog::default();
            let coefficients =
                CoefficientStore::from_reader(COEFFICIENTS.as_bytes(), b',', "coef", &catalog)
                    .unwrap();
            let percentiles = PercentileTable::from_reader(
                percentile_table().as_bytes(),
                b'\t',
                "pct",
                &catalog,
            )
            .unwrap();
            Self {
                coefficients,
                percentiles,
                catalog,
                bands: AgeBands::default(),
            }
        }

        fn assessor(&self) -> Assessor<'_> {
            Assessor::new(
                &self.coefficients,
                &self.percentiles,
                &self.catalog,
                &self.bands,
                RankingMethod::Interpolated,
            )
        }
    }

    fn reference_male() -> PatientProfile {
        PatientProfile::new(
            45,
            Gender::Male,
            72,
            24.0,
            ExposureHistory::Never,
            ExposureHistory::Never,
            &Default::default(),
        )
        .unwrap()
    }

    fn mixed_selection() -> ConditionSelection {
        ConditionSelection::Conditions(
            ["hypertension", "DEATH", "Anxiety", "Migraine", "Gout"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn scores_what_it_can_and_reports_the_rest() {
        let fixture = Fixture::new();
        let report = fixture.assessor().assess(
            &reference_male(),
            &mixed_selection(),
            ReportOrdering::AsRequested,
        );

        let conditions: Vec<&str> = report.results.iter().map(|r| r.condition.as_str()).collect();
        assert_eq!(conditions, vec!["Hypertension", "Death"]);

        let hypertension = report.result("Hypertension").unwrap();
        assert_abs_diff_eq!(hypertension.linear_predictor, 0.93, epsilon = 1e-12);
        assert_eq!(hypertension.percentile, 64);
        assert_eq!(hypertension.bracket_percentile, 70);
        assert_eq!(hypertension.tier, RiskTier::Average);
        assert_eq!(hypertension.category, "Cardiovascular & Circulatory");

        let death = report.result("Death").unwrap();
        assert_eq!(death.percentile, 86);
        assert_eq!(death.tier, RiskTier::ModerateHigh);
        assert_eq!(death.category, "Mortality");

        assert_eq!(
            report.gaps,
            vec![
                ConditionGap::DemographicGap {
                    condition: "Anxiety".to_string(),
                    gender: Gender::Male,
                    age_band: "45-49".to_string(),
                },
                ConditionGap::UnknownCondition {
                    condition: "Migraine".to_string(),
                    table: ReferenceTable::Percentiles,
                },
                ConditionGap::UnknownCondition {
                    condition: "Gout".to_string(),
                    table: ReferenceTable::Coefficients,
                },
            ]
        );
    }

    #[test]
    fn tier_counts_cover_returned_results_only() {
        let fixture = Fixture::new();
        let report = fixture.assessor().assess(
            &reference_male(),
            &mixed_selection(),
            ReportOrdering::AsRequested,
        );
        assert_eq!(report.tier_counts[&RiskTier::Average], 1);
        assert_eq!(report.tier_counts[&RiskTier::ModerateHigh], 1);
        assert_eq!(report.tier_counts[&RiskTier::High], 0);
        assert_eq!(report.tier_counts[&RiskTier::Low], 0);
        assert_eq!(report.tier_counts.values().sum::<usize>(), report.results.len());
    }

    #[test]
    fn most_concerning_first_sorts_by_descending_percentile() {
        let fixture = Fixture::new();
        let report = fixture.assessor().assess(
            &reference_male(),
            &mixed_selection(),
            ReportOrdering::MostConcerningFirst,
        );
        let percentiles: Vec<u8> = report.results.iter().map(|r| r.percentile).collect();
        assert_eq!(percentiles, vec![86, 64]);
    }

    #[test]
    fn category_selection_expands_through_the_catalog() {
        let fixture = Fixture::new();
        let selection =
            ConditionSelection::Categories(vec!["mortality".to_string(), "Dermatology".to_string()]);
        let report =
            fixture
                .assessor()
                .assess(&reference_male(), &selection, ReportOrdering::AsRequested);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].condition, "Death");
        assert_eq!(
            report.gaps,
            vec![ConditionGap::UnknownCategory {
                category: "Dermatology".to_string()
            }]
        );
    }

    #[test]
    fn all_selection_follows_coefficient_table_order_without_duplicates() {
        let fixture = Fixture::new();
        let report = fixture.assessor().assess(
            &reference_male(),
            &ConditionSelection::All,
            ReportOrdering::AsRequested,
        );
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.gaps.len(), 2);

        let repeated = ConditionSelection::Conditions(vec![
            "Hypertension".to_string(),
            "hypertension".to_string(),
        ]);
        let report =
            fixture
                .assessor()
                .assess(&reference_male(), &repeated, ReportOrdering::AsRequested);
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn assessment_is_idempotent() {
        let fixture = Fixture::new();
        let assessor = fixture.assessor();
        let first = assessor.assess(&reference_male(), &mixed_selection(), ReportOrdering::AsRequested);
        let second =
            assessor.assess(&reference_male(), &mixed_selection(), ReportOrdering::AsRequested);
        assert_eq!(first, second);
    }

    #[test]
    fn reports_serialize_with_readable_labels() {
        let fixture = Fixture::new();
        let report = fixture.assessor().assess(
            &reference_male(),
            &mixed_selection(),
            ReportOrdering::AsRequested,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tier_counts"]["Average"], 1);
        assert_eq!(json["gaps"][0]["kind"], "demographic_gap");
        assert_eq!(json["gaps"][1]["kind"], "unknown_condition");
        assert_eq!(json["gaps"][1]["table"], "percentiles");
        assert_eq!(json["gaps"][2]["table"], "coefficients");
        assert_eq!(
            report.gaps[1].to_string(),
            "Migraine: not in the percentile table"
        );
        let death_missing = &json["results"][1]["missing_terms"];
        assert_eq!(death_missing[0], "HR70-79");
    }
}

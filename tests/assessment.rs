use approx::assert_abs_diff_eq;
use riskrank::catalog::ConditionCatalog;
use riskrank::coefficients::{CoefficientStore, CoefficientValue};
use riskrank::percentiles::{PercentileTable, RankingMethod};
use riskrank::profile::{AgeBands, ProfileBounds};
use riskrank::tier::RiskTier;
use riskrank::types::{BmiBand, ExposureHistory, Gender, PERCENTILE_KEYS, VariableKey};
use riskrank::{ConditionGap, ConditionSelection, ReportOrdering, RiskEngine};

// Coefficients as published: short-code condition names, legacy variable spellings,
// and a reference-coded overweight level for hypertension only.
const COEFFICIENTS: &str = "Disease,Variable,Coef
hypertension,AGE,0.02
hypertension,HR_cat<60,-0.05
hypertension,HR_cat60-69,REF
hypertension,HR_cat70-79,0.03
hypertension,HR_cat80-89,0.07
hypertension,HR_cat>=90,0.12
hypertension,bmi_normal,REF
hypertension,bmi_overweight,REF
hypertension,bmi_obese,0.3
hypertension,MALE,REF
hypertension,FERMALE,-0.15
hypertension,Nerver_smoke,REF
hypertension,Ever_smoke,0.1
hypertension,Current_smoke,0.2
hypertension,Never_drink,REF
hypertension,Ever_drink,0.04
hypertension,Now_drink,0.06
t2d,AGE,0.02
t2d,HR_cat70-79,0.03
t2d,bmi_overweight,0.1
t2d,FERMALE,-0.2
af,AGE,0.03
af,FERMALE,-0.4
";

const LADDER: [f64; 17] = [
    -1.0, -0.8, -0.6, -0.4, -0.2, 0.0, 0.2, 0.4, 0.6, 0.8, 1.1, 1.2, 1.4, 1.6, 1.8, 2.0, 3.0,
];

fn percentile_table() -> String {
    let mut lines = vec![format!(
        "Disease\tSEX\tAGE\t{}",
        PERCENTILE_KEYS
            .iter()
            .map(|p| format!("{p}%"))
            .collect::<Vec<_>>()
            .join("\t")
    )];
    let thresholds = LADDER
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join("\t");
    for (condition, sex, band) in [
        ("hypertension", 1, "45-49"),
        ("hypertension", 2, "45-49"),
        ("t2d", 1, "45-49"),
        // Atrial fibrillation only has a reference row for women.
        ("af", 2, "45-49"),
    ] {
        lines.push(format!("{condition}\t{sex}\t{band}\t{thresholds}"));
    }
    lines.join("\n")
}

fn engine(method: RankingMethod) -> RiskEngine {
    let catalog = ConditionCatalog::default();
    let coefficients =
        CoefficientStore::from_reader(COEFFICIENTS.as_bytes(), b',', "coefficients", &catalog)
            .expect("coefficient table");
    let percentiles =
        PercentileTable::from_reader(percentile_table().as_bytes(), b'\t', "percentiles", &catalog)
            .expect("percentile table");
    RiskEngine::from_parts(
        coefficients,
        percentiles,
        catalog,
        AgeBands::default(),
        ProfileBounds::default(),
        method,
    )
    .expect("engine")
}

fn selection(names: &[&str]) -> ConditionSelection {
    ConditionSelection::Conditions(names.iter().map(|s| s.to_string()).collect())
}

#[test]
fn reference_profile_scores_age_and_heart_rate_only() {
    let engine = engine(RankingMethod::Interpolated);
    let profile = engine
        .profile(45, Gender::Male, 72, 24.0, ExposureHistory::Never, ExposureHistory::Never)
        .expect("valid profile");
    let report = engine.assess(&profile, &selection(&["Hypertension"]), ReportOrdering::AsRequested);

    let result = report.result("Hypertension").expect("hypertension scored");
    assert_abs_diff_eq!(result.linear_predictor, 0.93, epsilon = 1e-12);
    assert_eq!(result.percentile, 64);
    assert_eq!(result.bracket_percentile, 70);
    assert_eq!(result.tier, RiskTier::Average);
    assert!(result.missing_terms.is_empty());
    assert!(report.gaps.is_empty());
}

#[test]
fn overweight_offset_is_included_when_not_reference_coded() {
    let engine = engine(RankingMethod::Interpolated);
    assert_eq!(
        engine
            .coefficients()
            .coefficient_for("Type 2 Diabetes", VariableKey::Bmi(BmiBand::Overweight)),
        Some(CoefficientValue::Numeric(0.1))
    );
    let profile = engine
        .profile(45, Gender::Male, 72, 24.0, ExposureHistory::Never, ExposureHistory::Never)
        .expect("valid profile");
    let report = engine.assess(&profile, &selection(&["t2d"]), ReportOrdering::AsRequested);
    let result = report.result("Type 2 Diabetes").expect("diabetes scored");
    assert_abs_diff_eq!(result.linear_predictor, 1.03, epsilon = 1e-12);
    // 1.03 lies between the 60% (0.8) and 70% (1.1) breakpoints.
    assert_eq!(result.percentile, 68);
}

#[test]
fn missing_cohort_row_becomes_a_single_gap() {
    let engine = engine(RankingMethod::Interpolated);
    let profile = engine
        .profile(45, Gender::Male, 72, 24.0, ExposureHistory::Never, ExposureHistory::Never)
        .expect("valid profile");
    let report = engine.assess(
        &profile,
        &selection(&["Hypertension", "af", "t2d"]),
        ReportOrdering::AsRequested,
    );
    assert_eq!(report.results.len(), 2);
    assert_eq!(
        report.gaps,
        vec![ConditionGap::DemographicGap {
            condition: "Atrial Fibrillation".to_string(),
            gender: Gender::Male,
            age_band: "45-49".to_string(),
        }]
    );
    assert_eq!(report.tier_counts.values().sum::<usize>(), 2);
}

#[test]
fn the_same_condition_scores_for_the_other_cohort() {
    let engine = engine(RankingMethod::Interpolated);
    let profile = engine
        .profile(
            45,
            Gender::Female,
            72,
            24.0,
            ExposureHistory::Former,
            ExposureHistory::Current,
        )
        .expect("valid profile");
    let report = engine.assess(&profile, &selection(&["af"]), ReportOrdering::AsRequested);
    let result = report.result("Atrial Fibrillation").expect("af scored for women");
    assert_abs_diff_eq!(result.linear_predictor, 0.03 * 45.0 - 0.4, epsilon = 1e-12);
    assert_eq!(result.category, "Cardiovascular & Circulatory");
}

#[test]
fn stepwise_ranking_reports_the_bracket() {
    let engine = engine(RankingMethod::Stepwise);
    let profile = engine
        .profile(45, Gender::Male, 72, 24.0, ExposureHistory::Never, ExposureHistory::Never)
        .expect("valid profile");
    let report = engine.assess(&profile, &selection(&["Hypertension"]), ReportOrdering::AsRequested);
    let result = report.result("Hypertension").expect("hypertension scored");
    assert_eq!(result.percentile, 70);
    assert_eq!(result.bracket_percentile, 70);
}

#[test]
fn reports_are_identical_across_calls_and_threads() {
    let engine = engine(RankingMethod::Interpolated);
    let profile = engine
        .profile(47, Gender::Female, 95, 29.3, ExposureHistory::Current, ExposureHistory::Former)
        .expect("valid profile");
    let first = engine.assess(&profile, &ConditionSelection::All, ReportOrdering::MostConcerningFirst);
    let from_thread = std::thread::scope(|scope| {
        scope
            .spawn(|| engine.assess(&profile, &ConditionSelection::All, ReportOrdering::MostConcerningFirst))
            .join()
            .expect("scoring thread")
    });
    assert_eq!(first, from_thread);
    let percentiles: Vec<u8> = first.results.iter().map(|r| r.percentile).collect();
    assert!(percentiles.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn out_of_range_profiles_never_reach_scoring() {
    let engine = engine(RankingMethod::Interpolated);
    assert!(
        engine
            .profile(45, Gender::Male, 250, 24.0, ExposureHistory::Never, ExposureHistory::Never)
            .is_err()
    );
    assert!(
        engine
            .profile(101, Gender::Male, 72, 24.0, ExposureHistory::Never, ExposureHistory::Never)
            .is_err()
    );
}

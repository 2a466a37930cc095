// ========================================================================================
//
//                               Batch profile scoring
//
// ========================================================================================
//
// Scores a delimited file of many profiles against one engine. Rows are parsed and
// validated up front, assessed in parallel with rayon, and written back out in input
// order as one line per (profile, condition). Rows that fail validation are skipped
// with a warning rather than aborting the run.

use crate::engine::RiskEngine;
use crate::io::{delimiter_for, find_column, open_table, table_reader};
use crate::profile::{HeightUnit, PatientProfile, WeightUnit, body_mass_index};
use crate::report::{ConditionSelection, ReportOrdering, RiskReport};
use crate::tier::RiskTier;
use crate::types::{ExposureHistory, Gender};
use csv::WriterBuilder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to open '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Malformed profile table '{origin}': {source}")]
    Input { origin: String, source: csv::Error },
    #[error("Failed to write results: {0}")]
    Output(#[from] csv::Error),
}

/// One input line as written by the user. Column names follow the export field
/// names, with a few common spellings accepted. Numbers stay text until
/// `into_profile`, so a bad value rejects its own row only.
#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    age: String,
    #[serde(alias = "sex")]
    gender: String,
    #[serde(alias = "current_hr", alias = "heart_rate", alias = "hr")]
    resting_heart_rate: String,
    #[serde(default)]
    bmi: Option<String>,
    #[serde(default)]
    height_cm: Option<String>,
    #[serde(default)]
    weight_kg: Option<String>,
    #[serde(alias = "smoking_status")]
    smoking: String,
    #[serde(alias = "drinking_status")]
    drinking: String,
}

/// A parsed input line: its identifier and either a valid profile or the reason it
/// was rejected.
#[derive(Debug, Clone)]
pub struct ProfileEntry {
    pub id: String,
    pub line: u64,
    pub profile: Result<PatientProfile, String>,
}

#[derive(Debug, Clone)]
pub struct ScoredProfile {
    pub id: String,
    pub age_band: String,
    pub gender: Gender,
    pub report: RiskReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub profiles: usize,
    pub rejected: usize,
    pub results: usize,
    pub gaps: usize,
}

#[derive(Serialize)]
struct OutputRow<'a> {
    id: &'a str,
    gender: Gender,
    age_band: &'a str,
    condition: &'a str,
    category: &'a str,
    linear_predictor: f64,
    percentile: u8,
    bracket_percentile: u8,
    tier: RiskTier,
}

fn whole_number(field: &str, raw: &str) -> Result<u32, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{field} '{raw}' is not a whole number of at least 0"))
}

fn optional_number(field: &str, raw: Option<&str>) -> Result<Option<f64>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| format!("{field} '{value}' is not a number")),
    }
}

impl ProfileRow {
    fn into_profile(self, engine: &RiskEngine) -> Result<PatientProfile, String> {
        let age = whole_number("age", &self.age)?;
        let resting_heart_rate = whole_number("resting heart rate", &self.resting_heart_rate)?;
        let gender: Gender = self.gender.parse().map_err(|e| format!("{e}"))?;
        let smoking: ExposureHistory = self.smoking.parse().map_err(|e| format!("{e}"))?;
        let drinking: ExposureHistory = self.drinking.parse().map_err(|e| format!("{e}"))?;
        let bmi = optional_number("bmi", self.bmi.as_deref())?;
        let height = optional_number("height_cm", self.height_cm.as_deref())?;
        let weight = optional_number("weight_kg", self.weight_kg.as_deref())?;
        let bmi = match (bmi, height, weight) {
            (Some(bmi), _, _) => bmi,
            (None, Some(height), Some(weight)) => body_mass_index(
                height,
                HeightUnit::Centimetres,
                weight,
                WeightUnit::Kilograms,
            )
            .map_err(|e| e.to_string())?,
            _ => return Err("neither 'bmi' nor both 'height_cm' and 'weight_kg' given".to_string()),
        };
        engine
            .profile(
                age,
                gender,
                resting_heart_rate,
                bmi,
                smoking,
                drinking,
            )
            .map_err(|e| e.to_string())
    }
}

/// Reads and validates every row. Only unreadable input is an error; rows with
/// missing fields or invalid values are returned as rejected entries.
pub fn read_profiles<R: Read>(
    reader: R,
    delimiter: u8,
    origin: &str,
    engine: &RiskEngine,
) -> Result<Vec<ProfileEntry>, BatchError> {
    let input_error = |source| BatchError::Input {
        origin: origin.to_string(),
        source,
    };
    let mut reader = table_reader(reader, delimiter);
    let headers = reader.headers().map_err(input_error)?.clone();
    let id_col = find_column(&headers, &["id"]);
    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(input_error)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let (id, profile) = match record.deserialize::<ProfileRow>(Some(&headers)) {
            Ok(row) => (row.id.clone(), row.into_profile(engine)),
            Err(e) => (
                id_col
                    .and_then(|col| record.get(col))
                    .unwrap_or_default()
                    .to_string(),
                Err(e.to_string()),
            ),
        };
        if let Err(reason) = &profile {
            log::warn!("{origin}, line {line} ({id}): {reason}; row skipped");
        }
        entries.push(ProfileEntry { id, line, profile });
    }
    Ok(entries)
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) =
        ProgressStyle::with_template("> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message("profiles scored");
    pb
}

/// Assesses every valid entry in parallel. Output order follows input order.
pub fn score_profiles(
    engine: &RiskEngine,
    entries: &[ProfileEntry],
    selection: &ConditionSelection,
    ordering: ReportOrdering,
) -> Vec<ScoredProfile> {
    let valid: Vec<(&str, &PatientProfile)> = entries
        .iter()
        .filter_map(|entry| entry.profile.as_ref().ok().map(|p| (entry.id.as_str(), p)))
        .collect();
    let pb = create_progress_bar(valid.len() as u64);
    let assessor = engine.assessor();

    let scored: Vec<ScoredProfile> = valid
        .par_iter()
        .map(|&(id, profile)| {
            let report = assessor.assess(profile, selection, ordering);
            pb.inc(1);
            ScoredProfile {
                id: id.to_string(),
                age_band: engine.age_band(profile.age()),
                gender: profile.gender(),
                report,
            }
        })
        .collect();
    pb.finish_and_clear();
    scored
}

/// Writes one tab-separated line per scored condition and returns the line count.
pub fn write_results<W: Write>(writer: W, scored: &[ScoredProfile]) -> Result<usize, BatchError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    let mut lines = 0usize;
    for profile in scored {
        for result in &profile.report.results {
            writer.serialize(OutputRow {
                id: &profile.id,
                gender: profile.gender,
                age_band: &profile.age_band,
                condition: &result.condition,
                category: &result.category,
                linear_predictor: result.linear_predictor,
                percentile: result.percentile,
                bracket_percentile: result.bracket_percentile,
                tier: result.tier,
            })?;
            lines += 1;
        }
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(lines)
}

/// Reads `input`, scores it, and writes the results to `output`.
pub fn run_batch(
    engine: &RiskEngine,
    input: &Path,
    output: &Path,
    selection: &ConditionSelection,
    ordering: ReportOrdering,
) -> Result<BatchSummary, BatchError> {
    let origin = input.display().to_string();
    let reader = open_table(input).map_err(|source| BatchError::Io {
        path: origin.clone(),
        source,
    })?;
    let entries = read_profiles(reader, delimiter_for(input), &origin, engine)?;
    let scored = score_profiles(engine, &entries, selection, ordering);

    let file = File::create(output).map_err(|source| BatchError::Io {
        path: output.display().to_string(),
        source,
    })?;
    let results = write_results(BufWriter::new(file), &scored)?;

    let summary = BatchSummary {
        profiles: entries.len(),
        rejected: entries.iter().filter(|e| e.profile.is_err()).count(),
        results,
        gaps: scored.iter().map(|s| s.report.gaps.len()).sum(),
    };
    log::info!(
        "Scored {} of {} profiles ({} results, {} gaps) into {}",
        summary.profiles - summary.rejected,
        summary.profiles,
        summary.results,
        summary.gaps,
        output.display()
    );
    Ok(summary)
}

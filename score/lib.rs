#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod batch;
pub mod catalog;
pub mod coefficients;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod export;
pub mod io;
pub mod percentiles;
pub mod predictor;
pub mod profile;
pub mod report;
pub mod tier;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use engine::{EngineError, RiskEngine};
pub use report::{
    ConditionGap, ConditionSelection, ReferenceTable, ReportOrdering, RiskReport, RiskResult,
};

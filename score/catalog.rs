//! # Condition Catalog
//!
//! Display names, short-code aliases, and the category grouping used for filtering.
//! Both reference tables are keyed by the display name that comes out of
//! `canonical_name`, so the aliasing here is the single place where spellings are
//! reconciled.

use crate::types::normalize_condition;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionCategory {
    pub name: String,
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConditionCatalog {
    categories: Vec<ConditionCategory>,
    required: Vec<String>,
    // normalized alias or display name -> display name
    names: AHashMap<String, String>,
    // normalized display name -> index into `categories`
    category_index: AHashMap<String, usize>,
}

const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Cardiovascular & Circulatory",
        &[
            "Heart Failure",
            "Atrial Fibrillation",
            "Cardiac Arrhythmia",
            "Ischemic Heart Disease",
            "Ischemic Stroke",
            "Atherosclerosis",
            "Hypertension",
        ],
    ),
    ("Metabolic & Endocrine", &["Type 2 Diabetes"]),
    (
        "Mental Health & Neurological",
        &["Anxiety", "Depression", "Dementia", "Migraine"],
    ),
    (
        "Other Conditions",
        &[
            "Chronic Kidney Disease",
            "Gastroesophageal Reflux Disease",
            "Anemias",
            "Asthma",
        ],
    ),
    ("Mortality", &["Death"]),
];

const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("DEATH", "Death"),
    ("t2d", "Type 2 Diabetes"),
    ("af", "Atrial Fibrillation"),
    ("anxiety", "Anxiety"),
    ("ckd", "Chronic Kidney Disease"),
    ("gerd", "Gastroesophageal Reflux Disease"),
    ("heart_failure", "Heart Failure"),
    ("anemias", "Anemias"),
    ("asthma", "Asthma"),
    ("atherosclerosis", "Atherosclerosis"),
    ("cardiac_arrhythmia", "Cardiac Arrhythmia"),
    ("dementia", "Dementia"),
    ("depression", "Depression"),
    ("hypertension", "Hypertension"),
    ("ischemic_heart_disease", "Ischemic Heart Disease"),
    ("ischemic_stroke", "Ischemic Stroke"),
    ("migraine", "Migraine"),
];

pub const UNCATEGORISED: &str = "Other Conditions";

/// The source application's category grouping.
pub fn default_categories() -> Vec<ConditionCategory> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, conditions)| ConditionCategory {
            name: name.to_string(),
            conditions: conditions.iter().map(|c| c.to_string()).collect(),
        })
        .collect()
}

/// Short codes used by the published tables, mapped to display names.
pub fn default_aliases() -> Vec<(String, String)> {
    DEFAULT_ALIASES
        .iter()
        .map(|(alias, name)| (alias.to_string(), name.to_string()))
        .collect()
}

impl Default for ConditionCatalog {
    fn default() -> Self {
        Self::new(default_categories(), default_aliases(), Vec::new())
    }
}

impl ConditionCatalog {
    pub fn new(
        categories: Vec<ConditionCategory>,
        aliases: Vec<(String, String)>,
        required: Vec<String>,
    ) -> Self {
        let mut names = AHashMap::new();
        let mut category_index = AHashMap::new();
        for (idx, category) in categories.iter().enumerate() {
            for condition in &category.conditions {
                let key = normalize_condition(condition);
                names.insert(key.clone(), condition.trim().to_string());
                category_index.entry(key).or_insert(idx);
            }
        }
        for (alias, name) in aliases {
            names.insert(normalize_condition(&alias), name.trim().to_string());
        }
        Self {
            categories,
            required,
            names,
            category_index,
        }
    }

    /// Resolves aliases and spelling variants to the display name. Names the catalog
    /// has never heard of are returned trimmed but otherwise untouched.
    pub fn canonical_name(&self, raw: &str) -> String {
        self.names
            .get(&normalize_condition(raw))
            .cloned()
            .unwrap_or_else(|| raw.trim().to_string())
    }

    /// Every known spelling, normalized, mapped to the normalized display name. The
    /// reference tables keep this so lookups by short code find the same rows.
    pub fn lookup_keys(&self) -> AHashMap<String, String> {
        self.names
            .iter()
            .map(|(spelling, name)| (spelling.clone(), normalize_condition(name)))
            .collect()
    }

    pub fn category_of(&self, condition: &str) -> &str {
        self.category_index
            .get(&normalize_condition(condition))
            .map(|&idx| self.categories[idx].name.as_str())
            .unwrap_or(UNCATEGORISED)
    }

    pub fn categories(&self) -> &[ConditionCategory] {
        &self.categories
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Expands category names into their member conditions, in catalog order.
    /// Returns the expanded conditions and any category names that matched nothing.
    pub fn expand_categories<S: AsRef<str>>(&self, filters: &[S]) -> (Vec<String>, Vec<String>) {
        let wanted: Vec<String> = filters
            .iter()
            .map(|f| normalize_condition(f.as_ref()))
            .collect();
        let mut conditions = Vec::new();
        for category in &self.categories {
            if wanted.contains(&normalize_condition(&category.name)) {
                conditions.extend(category.conditions.iter().cloned());
            }
        }
        let unknown = filters
            .iter()
            .filter(|f| {
                let key = normalize_condition(f.as_ref());
                !self
                    .categories
                    .iter()
                    .any(|c| normalize_condition(&c.name) == key)
            })
            .map(|f| f.as_ref().to_string())
            .collect();
        (conditions, unknown)
    }
}

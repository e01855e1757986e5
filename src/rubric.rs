#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use tabled::Tabled;
use typed_builder::TypedBuilder;

use crate::error::RubricError;

/// Lowest score a criterion accepts when the rubric does not say otherwise.
const DEFAULT_MIN_SCORE: i64 = 0;
/// Highest score a criterion accepts when the rubric does not say otherwise.
const DEFAULT_MAX_SCORE: i64 = 100;

/// serde default for `max_score`.
fn default_max_score() -> i64 {
    DEFAULT_MAX_SCORE
}

/// One line of a rubric: what is judged, how much it counts, and the integer
/// range its score must land in.
#[derive(Tabled, Serialize, Deserialize, TypedBuilder, Clone, Debug, PartialEq)]
#[builder(field_defaults(setter(into)))]
pub struct GradingCriterion {
    /// Name of the criterion, unique within a rubric.
    #[tabled(rename = "Criterion")]
    pub category:    String,
    /// Relative weight used during aggregation; must be positive.
    #[tabled(rename = "Weight")]
    pub weight:      f64,
    /// What the grader should look for.
    #[tabled(rename = "Description")]
    #[serde(default)]
    #[builder(default)]
    pub description: String,
    /// Lowest admissible score.
    #[tabled(rename = "Min")]
    #[serde(default)]
    #[builder(default = DEFAULT_MIN_SCORE)]
    pub min_score:   i64,
    /// Highest admissible score.
    #[tabled(rename = "Max")]
    #[serde(default = "default_max_score")]
    #[builder(default = DEFAULT_MAX_SCORE)]
    pub max_score:   i64,
}

/// Free-form assignment context forwarded verbatim into the grading prompt.
#[derive(Serialize, Deserialize, TypedBuilder, Clone, Debug, Default, PartialEq)]
#[builder(field_defaults(default, setter(into, strip_option)))]
pub struct AssignmentRequirements {
    /// Assignment title.
    #[serde(default)]
    pub title:                Option<String>,
    /// Assignment description.
    #[serde(default)]
    pub description:          Option<String>,
    /// Word count bounds, e.g. `{"min": 500, "max": 800}`.
    #[serde(default)]
    pub word_count:           Option<BTreeMap<String, i64>>,
    /// Anything else the grader should know.
    #[serde(default)]
    pub special_instructions: Option<String>,
}

/// Validated rubric with a lookup table keyed by criterion name.
///
/// Built once per request. Lookups are exact and case-sensitive; a name that
/// is not in the rubric is simply `None`.
#[derive(Clone, Debug, Default)]
pub struct Rubric {
    /// Criteria in declaration order.
    criteria: Vec<GradingCriterion>,
    /// Position of each criterion in `criteria`, keyed by category.
    index:    HashMap<String, usize>,
}

impl Rubric {
    /// Validates the criteria and builds the lookup table.
    ///
    /// Every violation is reported, not just the first one.
    pub fn new(criteria: Vec<GradingCriterion>) -> Result<Self, RubricError> {
        let mut violations = Vec::new();
        let mut seen = HashSet::new();

        for (i, criterion) in criteria.iter().enumerate() {
            if criterion.category.trim().is_empty() {
                violations.push(format!("criteria[{i}].category: must not be empty"));
            } else if !seen.insert(criterion.category.as_str()) {
                violations.push(format!(
                    "criteria[{i}].category: duplicate category '{}'",
                    criterion.category
                ));
            }

            if !criterion.weight.is_finite() || criterion.weight <= 0.0 {
                violations.push(format!(
                    "criteria[{i}].weight: must be a positive number, got {}",
                    criterion.weight
                ));
            }

            if criterion.min_score > criterion.max_score {
                violations.push(format!(
                    "criteria[{i}]: min_score {} is greater than max_score {}",
                    criterion.min_score, criterion.max_score
                ));
            }
        }

        if !violations.is_empty() {
            return Err(RubricError { violations });
        }

        let index = criteria
            .iter()
            .enumerate()
            .map(|(i, c)| (c.category.clone(), i))
            .collect();

        Ok(Self { criteria, index })
    }

    /// Returns the criteria in declaration order.
    pub fn criteria(&self) -> &[GradingCriterion] {
        &self.criteria
    }

    /// Looks a criterion up by its exact category name.
    pub fn get(&self, category: &str) -> Option<&GradingCriterion> {
        self.index.get(category).map(|&i| &self.criteria[i])
    }

    /// Returns true when the rubric declares no criteria.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Number of declared criteria.
    pub fn len(&self) -> usize {
        self.criteria.len()
    }
}

/// Default rubrics keyed by rubric type, used when a request brings no
/// criteria of its own.
#[derive(Clone, Debug, Default)]
pub struct RubricCatalog {
    /// Criteria per rubric type.
    rubrics: HashMap<String, Vec<GradingCriterion>>,
}

impl RubricCatalog {
    /// Loads the rubrics embedded in the binary.
    pub fn builtin() -> Result<Self> {
        let academic: Vec<GradingCriterion> =
            serde_json::from_str(include_str!("rubrics/academic.json"))
                .context("Embedded academic rubric is not valid JSON")?;

        let mut catalog = Self::default();
        catalog.insert("academic", academic);
        Ok(catalog)
    }

    /// Registers (or replaces) the default criteria for a rubric type.
    pub fn insert(&mut self, rubric_type: impl Into<String>, criteria: Vec<GradingCriterion>) {
        self.rubrics.insert(rubric_type.into(), criteria);
    }

    /// Returns the default criteria for a rubric type, if any are registered.
    pub fn get(&self, rubric_type: &str) -> Option<&[GradingCriterion]> {
        self.rubrics.get(rubric_type).map(Vec::as_slice)
    }
}

/// Deserializes `null` as an empty list.
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Score normalization and weighted aggregation.
//!
//! Two behaviours here are easy to mistake for bugs and are kept on purpose:
//! fractional raw scores are truncated onto the criterion range (never
//! rounded), and criteria the grader did not score are left out of the
//! aggregate instead of counting as zero.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::{
    generative::RawCriterionScore,
    rubric::{GradingCriterion, Rubric},
};

/// A criterion score that is guaranteed to sit inside its criterion's range.
#[derive(Tabled, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NormalizedCriterionScore {
    /// Name of the rubric criterion.
    #[tabled(rename = "Criterion")]
    #[serde(rename = "criterion")]
    pub criterion_name: String,
    /// Integer score within `[min_score, max_score]`.
    #[tabled(rename = "Score")]
    pub score:          i64,
    /// The grader's justification for this score.
    #[tabled(rename = "Feedback")]
    #[serde(default)]
    pub feedback:       String,
}

/// Maps an untrusted raw score onto the criterion's integer range.
///
/// * raw in `[0, 1]`: a fraction of the range,
///   `min + floor(raw * (max - min))`.
/// * anything else: `floor(raw)` clamped to `[min, max]`.
pub fn normalize(raw: &RawCriterionScore, criterion: &GradingCriterion) -> NormalizedCriterionScore {
    let (min, max) = (criterion.min_score, criterion.max_score);
    let value = raw.raw_score;

    let (low, high) = (i128::from(min), i128::from(max));
    let score = if (0.0..=1.0).contains(&value) {
        let span = (high - low) as f64;
        low + (value * span).floor() as i128
    } else {
        value.floor() as i128
    };
    // Spans past 2^53 lose precision in `f64`, so the fraction branch is
    // clamped too.
    let score = i64::try_from(score.clamp(low, high)).unwrap_or(max);

    NormalizedCriterionScore {
        criterion_name: criterion.category.clone(),
        score,
        feedback: raw.feedback.clone().unwrap_or_default(),
    }
}

/// Outcome of normalizing a whole grading response against a rubric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalization {
    /// One entry per rubric criterion the grader scored, in rubric order.
    pub entries:   Vec<NormalizedCriterionScore>,
    /// Rubric criteria the grader did not score.
    pub unmatched: Vec<String>,
    /// Names the grader scored that are not in the rubric.
    pub ignored:   Vec<String>,
}

/// Normalizes every raw score that matches a rubric criterion.
///
/// Matching is by exact name. When the grader scores a criterion more than
/// once, the first score wins.
pub fn normalize_all(raw_scores: &[RawCriterionScore], rubric: &Rubric) -> Normalization {
    let mut by_name: HashMap<&str, &RawCriterionScore> = HashMap::new();
    let mut ignored = Vec::new();

    for raw in raw_scores {
        if rubric.get(&raw.criterion_name).is_none() {
            ignored.push(raw.criterion_name.clone());
            continue;
        }
        by_name.entry(raw.criterion_name.as_str()).or_insert(raw);
    }

    let mut normalization = Normalization {
        ignored,
        ..Normalization::default()
    };

    for criterion in rubric.criteria() {
        match by_name.get(criterion.category.as_str()) {
            Some(raw) => normalization.entries.push(normalize(raw, criterion)),
            None => {
                tracing::debug!("No score returned for criterion '{}'", criterion.category);
                normalization.unmatched.push(criterion.category.clone());
            }
        }
    }

    normalization
}

/// Weighted mean of the entries that match a rubric criterion.
///
/// Only matched criteria contribute to either side of the division. Returns
/// `0.0` when nothing matches. The result is not clamped.
pub fn aggregate(entries: &[NormalizedCriterionScore], rubric: &Rubric) -> f64 {
    let (weighted_sum, total_weight) = entries
        .iter()
        .filter_map(|entry| {
            rubric
                .get(&entry.criterion_name)
                .map(|criterion| (criterion.weight * entry.score as f64, criterion.weight))
        })
        .fold((0.0, 0.0), |(sum, weight), (s, w)| (sum + s, weight + w));

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(category: &str, weight: f64, min: i64, max: i64) -> GradingCriterion {
        GradingCriterion::builder()
            .category(category)
            .weight(weight)
            .min_score(min)
            .max_score(max)
            .build()
    }

    fn raw(name: &str, score: f64) -> RawCriterionScore {
        RawCriterionScore {
            criterion_name: name.to_string(),
            raw_score:      score,
            feedback:       None,
        }
    }

    fn entry(name: &str, score: i64) -> NormalizedCriterionScore {
        NormalizedCriterionScore {
            criterion_name: name.to_string(),
            score,
            feedback: String::new(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn fraction_endpoints_are_exact() {
        let c = criterion("Grammar", 1.0, 3, 17);
        assert_eq!(normalize(&raw("Grammar", 0.0), &c).score, 3);
        assert_eq!(normalize(&raw("Grammar", 1.0), &c).score, 17);
    }

    #[test]
    fn fraction_is_truncated_not_rounded() {
        let c = criterion("Grammar", 1.0, 0, 10);
        assert_eq!(normalize(&raw("Grammar", 0.5), &c).score, 5);
        assert_eq!(normalize(&raw("Grammar", 0.99), &c).score, 9);
        assert_eq!(normalize(&raw("Grammar", 0.05), &c).score, 0);
    }

    #[test]
    fn fraction_stays_in_range_across_inputs() {
        let ranges = [(0, 10), (1, 5), (-5, 5), (7, 7), (0, 100)];
        for (min, max) in ranges {
            let c = criterion("C", 1.0, min, max);
            for step in 0..=100 {
                let score = normalize(&raw("C", step as f64 / 100.0), &c).score;
                assert!((min..=max).contains(&score), "{score} outside [{min}, {max}]");
            }
        }
    }

    #[test]
    fn out_of_unit_range_is_floored_and_clamped() {
        let c = criterion("Grammar", 1.0, 0, 10);
        assert_eq!(normalize(&raw("Grammar", 7.9), &c).score, 7);
        assert_eq!(normalize(&raw("Grammar", 42.0), &c).score, 10);
        assert_eq!(normalize(&raw("Grammar", -3.2), &c).score, 0);
        assert_eq!(normalize(&raw("Grammar", 1.5), &c).score, 1);

        let shifted = criterion("Grammar", 1.0, -10, -2);
        assert_eq!(normalize(&raw("Grammar", -0.5), &shifted).score, -2);
        assert_eq!(normalize(&raw("Grammar", -7.5), &shifted).score, -8);
    }

    #[test]
    fn ranges_wider_than_i64_do_not_overflow() {
        let c = criterion("Grammar", 1.0, -1, i64::MAX);
        assert_eq!(normalize(&raw("Grammar", 0.0), &c).score, -1);
        assert_eq!(normalize(&raw("Grammar", 0.5), &c).score, (1_i64 << 62) - 1);
        assert_eq!(normalize(&raw("Grammar", 1.0), &c).score, i64::MAX);

        let full = criterion("Grammar", 1.0, i64::MIN, i64::MAX);
        assert_eq!(normalize(&raw("Grammar", 0.0), &full).score, i64::MIN);
        assert_eq!(normalize(&raw("Grammar", 1.0), &full).score, i64::MAX);
        assert_eq!(normalize(&raw("Grammar", 1e300), &full).score, i64::MAX);
        assert_eq!(normalize(&raw("Grammar", -1e300), &full).score, i64::MIN);
    }

    #[test]
    fn imprecise_spans_stay_within_max() {
        let max = (1_i64 << 54) - 1;
        let c = criterion("Grammar", 1.0, 0, max);
        assert_eq!(normalize(&raw("Grammar", 1.0), &c).score, max);
        for step in 0..=100 {
            let score = normalize(&raw("Grammar", step as f64 / 100.0), &c).score;
            assert!((0..=max).contains(&score), "{score} outside [0, {max}]");
        }
    }

    #[test]
    fn normalizing_an_in_range_integer_is_idempotent() {
        let c = criterion("Grammar", 1.0, 0, 10);
        let first = normalize(&raw("Grammar", 7.0), &c);
        let second = normalize(&raw("Grammar", first.score as f64), &c);
        assert_eq!(first.score, 7);
        assert_eq!(second.score, first.score);
    }

    #[test]
    fn weighted_average_of_matched_criteria() {
        let rubric = Rubric::new(vec![
            criterion("Content", 2.0, 0, 10),
            criterion("Style", 3.0, 0, 10),
        ])
        .unwrap();
        let overall = aggregate(&[entry("Content", 5), entry("Style", 9)], &rubric);
        assert!(close(overall, 7.4), "{overall}");
    }

    #[test]
    fn empty_rubric_aggregates_to_zero() {
        let rubric = Rubric::new(vec![]).unwrap();
        assert_eq!(aggregate(&[entry("Content", 5)], &rubric), 0.0);
        assert_eq!(aggregate(&[], &rubric), 0.0);
    }

    #[test]
    fn missing_criterion_does_not_count_as_zero() {
        let rubric = Rubric::new(vec![
            criterion("Content", 1.0, 0, 10),
            criterion("Style", 1.0, 0, 10),
        ])
        .unwrap();
        let overall = aggregate(&[entry("Content", 8)], &rubric);
        assert!(close(overall, 8.0), "{overall}");
    }

    #[test]
    fn unknown_names_are_ignored_and_first_duplicate_wins() {
        let rubric = Rubric::new(vec![
            criterion("Content", 1.0, 0, 10),
            criterion("Style", 1.0, 0, 10),
        ])
        .unwrap();
        let normalization = normalize_all(
            &[
                raw("content", 0.9),
                raw("Content", 4.0),
                raw("Content", 9.0),
                raw("Voice", 0.3),
            ],
            &rubric,
        );

        assert_eq!(normalization.entries, vec![entry("Content", 4)]);
        assert_eq!(normalization.unmatched, vec!["Style".to_string()]);
        assert_eq!(normalization.ignored, vec!["content".to_string(), "Voice".to_string()]);
    }

    #[test]
    fn entries_follow_rubric_order_and_keep_feedback() {
        let rubric = Rubric::new(vec![
            criterion("Content", 1.0, 0, 10),
            criterion("Style", 1.0, 0, 10),
        ])
        .unwrap();
        let mut style = raw("Style", 0.3);
        style.feedback = Some("Choppy sentences.".into());
        let normalization = normalize_all(&[style, raw("Content", 0.6)], &rubric);

        let names: Vec<_> = normalization.entries.iter().map(|e| e.criterion_name.as_str()).collect();
        assert_eq!(names, ["Content", "Style"]);
        assert_eq!(normalization.entries[1].score, 3);
        assert_eq!(normalization.entries[1].feedback, "Choppy sentences.");
    }
}

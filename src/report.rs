//! Reporting view: topic-level percentages, overall percent and letter grade.
//! Pure functions over a `GradedResult`; nothing here mutates it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{GradedResult, QuestionGrade};

pub const DEFAULT_TOPIC: &str = "General";

/// One row of the letter-grade policy table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
  #[serde(alias = "min_percent")]
  pub min_percent: u32,
  pub label: String,
}

/// Configurable percentage → letter mapping. Breakpoints come from config only.
#[derive(Clone, Debug, Default)]
pub struct GradeScale {
  bands: Vec<GradeBand>,
}

impl GradeScale {
  pub fn new(mut bands: Vec<GradeBand>) -> Self {
    bands.sort_by(|a, b| b.min_percent.cmp(&a.min_percent));
    Self { bands }
  }

  /// Highest band whose threshold the percentage reaches.
  pub fn letter_for(&self, percent: u32) -> Option<&str> {
    self.bands.iter().find(|b| percent >= b.min_percent).map(|b| b.label.as_str())
  }
}

fn percent(score: f64, max: f64) -> u32 {
  if max <= 0.0 { return 0; }
  (100.0 * score / max).round().max(0.0) as u32
}

fn topic_of(q: &QuestionGrade) -> &str {
  let t = q.topic.trim();
  if t.is_empty() { DEFAULT_TOPIC } else { t }
}

/// Per-topic `round(100 * score / maxPoints)`; topics without points report 0.
pub fn topic_percent(result: &GradedResult) -> BTreeMap<String, u32> {
  let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();
  for q in &result.per_question {
    let e = sums.entry(topic_of(q).to_string()).or_insert((0.0, 0.0));
    e.0 += q.score;
    e.1 += q.max_points;
  }
  sums.into_iter().map(|(topic, (score, max))| (topic, percent(score, max))).collect()
}

pub fn overall_percent(result: &GradedResult) -> u32 {
  percent(result.total_score, result.total_max)
}

/// Presentation-ready summary returned to clients after grading.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
  pub overall_percent: u32,
  pub grade: Option<String>,
  pub topic_percent: BTreeMap<String, u32>,
  pub total_score: f64,
  pub total_max: f64,
  pub summary: String,
  pub degraded: bool,
  pub per_question: Vec<QuestionGrade>,
  pub solutions_document: String,
}

pub fn build_report(result: &GradedResult, scale: &GradeScale) -> Report {
  let overall = overall_percent(result);
  Report {
    overall_percent: overall,
    grade: scale.letter_for(overall).map(str::to_string),
    topic_percent: topic_percent(result),
    total_score: result.total_score,
    total_max: result.total_max,
    summary: result.summary.clone(),
    degraded: result.degraded,
    per_question: result.per_question.clone(),
    solutions_document: result.solutions_document.clone(),
  }
}

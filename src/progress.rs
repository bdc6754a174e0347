//! Per-student attempt history and the aggregates shown on the progress page.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::GradedResult;
use crate::error::{AssessError, AssessResult};
use crate::report::DEFAULT_TOPIC;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
  pub attempt_id: Uuid,
  pub user_id: String,
  pub question_id: String,
  pub topic: String,
  pub correct: bool,
  pub marks_obtained: f64,
  pub max_marks: f64,
  pub time_spent_seconds: u64,
  pub timestamp: DateTime<Utc>,
}

/// One attempt per graded question. Time is split evenly across the paper.
/// Without an explicit `correct` flag, full marks count as correct.
pub fn attempts_from_result(user_id: &str, result: &GradedResult, elapsed_seconds: u64) -> Vec<Attempt> {
  let n = result.per_question.len().max(1) as u64;
  let now = Utc::now();
  result
    .per_question
    .iter()
    .map(|g| Attempt {
      attempt_id: Uuid::new_v4(),
      user_id: user_id.to_string(),
      question_id: g.question_id.clone(),
      topic: g.topic.clone(),
      correct: g.correct.unwrap_or(g.max_points > 0.0 && g.score >= g.max_points),
      marks_obtained: g.score,
      max_marks: g.max_points,
      time_spent_seconds: elapsed_seconds / n,
      timestamp: now,
    })
    .collect()
}

/// A single attempt reported directly by a client, outside any graded session.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptIn {
  pub user_id: String,
  pub question_id: String,
  #[serde(default)]
  pub topic: Option<String>,
  #[serde(default)]
  pub time_spent_seconds: u64,
  #[serde(default)]
  pub correct: bool,
  #[serde(default)]
  pub marks_obtained: f64,
  #[serde(default)]
  pub max_marks: f64,
}

impl Attempt {
  pub fn from_input(input: AttemptIn) -> AssessResult<Self> {
    let user_id = input.user_id.trim();
    let question_id = input.question_id.trim();
    if user_id.is_empty() || question_id.is_empty() {
      return Err(AssessError::InvalidRequest("userId and questionId are required".into()));
    }
    if input.marks_obtained < 0.0 || input.max_marks < 0.0 {
      return Err(AssessError::InvalidRequest("marks must not be negative".into()));
    }
    Ok(Self {
      attempt_id: Uuid::new_v4(),
      user_id: user_id.to_string(),
      question_id: question_id.to_string(),
      topic: input
        .topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
      correct: input.correct,
      marks_obtained: input.marks_obtained,
      max_marks: input.max_marks,
      time_spent_seconds: input.time_spent_seconds,
      timestamp: Utc::now(),
    })
  }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
  pub attempts: usize,
  pub correct: usize,
  pub accuracy: f64,
  pub marks: f64,
  pub max_marks: f64,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionProgress {
  pub question_id: String,
  /// Topic of the most recent attempt.
  pub topic: String,
  pub attempts: usize,
  pub correct: usize,
  pub accuracy: f64,
  pub avg_time_seconds: f64,
  pub total_marks: f64,
  #[serde(skip)]
  total_time: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
  pub user_id: String,
  pub total_attempts: usize,
  pub total_time_seconds: u64,
  pub total_marks: f64,
  pub accuracy: f64,
  pub by_topic: BTreeMap<String, TopicProgress>,
  /// Ordered by question id.
  pub per_question: Vec<QuestionProgress>,
}

fn ratio(num: usize, den: usize) -> f64 {
  if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

pub fn summarize(user_id: &str, attempts: &[Attempt]) -> ProgressSummary {
  let mut by_topic: BTreeMap<String, TopicProgress> = BTreeMap::new();
  for a in attempts {
    let t = by_topic.entry(a.topic.clone()).or_default();
    t.attempts += 1;
    t.correct += usize::from(a.correct);
    t.marks += a.marks_obtained;
    t.max_marks += a.max_marks;
  }
  for t in by_topic.values_mut() {
    t.accuracy = ratio(t.correct, t.attempts);
  }

  let mut by_question: BTreeMap<String, QuestionProgress> = BTreeMap::new();
  for a in attempts {
    let q = by_question.entry(a.question_id.clone()).or_default();
    q.question_id = a.question_id.clone();
    q.topic = a.topic.clone();
    q.attempts += 1;
    q.correct += usize::from(a.correct);
    q.total_marks += a.marks_obtained;
    q.total_time += a.time_spent_seconds;
  }
  let per_question = by_question
    .into_values()
    .map(|mut q| {
      q.accuracy = ratio(q.correct, q.attempts);
      q.avg_time_seconds = if q.attempts == 0 { 0.0 } else { q.total_time as f64 / q.attempts as f64 };
      q
    })
    .collect();

  let correct = attempts.iter().filter(|a| a.correct).count();
  ProgressSummary {
    user_id: user_id.to_string(),
    total_attempts: attempts.len(),
    total_time_seconds: attempts.iter().map(|a| a.time_spent_seconds).sum(),
    total_marks: attempts.iter().map(|a| a.marks_obtained).sum(),
    accuracy: ratio(correct, attempts.len()),
    by_topic,
    per_question,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionGrade;

  fn grade(id: &str, topic: &str, score: f64, max: f64, correct: Option<bool>) -> QuestionGrade {
    QuestionGrade {
      question_id: id.into(),
      score,
      max_points: max,
      feedback: String::new(),
      correct,
      ideal_solution: None,
      topic: topic.into(),
    }
  }

  #[test]
  fn attempts_split_time_and_infer_correctness() {
    let result = GradedResult {
      per_question: vec![
        grade("q1", "Algebra", 5.0, 5.0, None),
        grade("q2", "Algebra", 2.0, 5.0, None),
        grade("q3", "Geometry", 1.0, 4.0, Some(true)),
      ],
      total_score: 8.0,
      total_max: 14.0,
      summary: String::new(),
      solutions_document: String::new(),
      degraded: false,
    };
    let attempts = attempts_from_result("u1", &result, 90);
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.time_spent_seconds == 30));
    assert!(attempts[0].correct);
    assert!(!attempts[1].correct);
    assert!(attempts[2].correct);

    let summary = summarize("u1", &attempts);
    assert_eq!(summary.total_attempts, 3);
    assert_eq!(summary.total_time_seconds, 90);
    assert_eq!(summary.total_marks, 8.0);
    assert!((summary.accuracy - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(summary.by_topic["Algebra"].attempts, 2);
    assert_eq!(summary.by_topic["Algebra"].accuracy, 0.5);
    assert_eq!(summary.by_topic["Geometry"].max_marks, 4.0);
  }

  #[test]
  fn empty_history_has_zero_accuracy() {
    let s = summarize("nobody", &[]);
    assert_eq!(s.total_attempts, 0);
    assert_eq!(s.accuracy, 0.0);
    assert!(s.by_topic.is_empty());
    assert!(s.per_question.is_empty());
  }

  fn reported(question_id: &str, secs: u64, correct: bool, marks: f64) -> Attempt {
    Attempt::from_input(AttemptIn {
      user_id: "u2".into(),
      question_id: question_id.into(),
      topic: None,
      time_spent_seconds: secs,
      correct,
      marks_obtained: marks,
      max_marks: 5.0,
    })
    .unwrap()
  }

  #[test]
  fn per_question_stats_average_time() {
    let attempts = vec![
      reported("q2", 40, true, 5.0),
      reported("q1", 10, false, 1.0),
      reported("q2", 20, false, 2.0),
    ];
    let s = summarize("u2", &attempts);
    let ids: Vec<&str> = s.per_question.iter().map(|q| q.question_id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2"]);

    let q2 = &s.per_question[1];
    assert_eq!(q2.attempts, 2);
    assert_eq!(q2.correct, 1);
    assert_eq!(q2.accuracy, 0.5);
    assert_eq!(q2.avg_time_seconds, 30.0);
    assert_eq!(q2.total_marks, 7.0);
    assert_eq!(q2.topic, DEFAULT_TOPIC);

    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(json["perQuestion"][1]["avgTimeSeconds"], 30.0);
    assert!(json["perQuestion"][1].get("totalTime").is_none());
  }

  #[test]
  fn reported_attempts_need_ids() {
    let input = AttemptIn {
      user_id: " ".into(),
      question_id: "q1".into(),
      topic: Some("Algebra".into()),
      time_spent_seconds: 0,
      correct: false,
      marks_obtained: 0.0,
      max_marks: 0.0,
    };
    assert!(matches!(Attempt::from_input(input), Err(AssessError::InvalidRequest(_))));
  }
}

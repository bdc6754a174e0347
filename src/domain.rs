//! Domain models: questions, topic plans, generated papers, session status and graded results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a question is answered and graded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
  /// Pick one of `options`; graded by exact match against `answer_key`.
  MultipleChoice,
  ShortAnswer,
  LongAnswer,
}
impl Default for QuestionKind {
  fn default() -> Self { QuestionKind::ShortAnswer }
}

impl QuestionKind {
  /// Accepts the spellings the model service is known to produce.
  pub fn parse_wire(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "mcq" | "multiple-choice" | "multiple_choice" => Some(QuestionKind::MultipleChoice),
      "short" | "text" | "short-answer" | "short_answer" => Some(QuestionKind::ShortAnswer),
      "long" | "long-answer" | "long_answer" => Some(QuestionKind::LongAnswer),
      _ => None,
    }
  }

  /// Short tag used in prompts sent to the model.
  pub fn wire_name(&self) -> &'static str {
    match self {
      QuestionKind::MultipleChoice => "mcq",
      QuestionKind::ShortAnswer => "short",
      QuestionKind::LongAnswer => "long",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}
impl Default for Difficulty {
  fn default() -> Self { Difficulty::Medium }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    })
  }
}

/// A single generated question. Immutable once validated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub topic: String,
  pub prompt: String,
  pub kind: QuestionKind,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub answer_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model_solution: Option<String>,
  pub marks: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicPlan {
  pub name: String,
  pub weight: f64,
  pub questions: Vec<Question>,
}

/// Validated output of the generation call, before it is stored as a paper.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedPlan {
  pub topics: Vec<TopicPlan>,
  pub total_questions: u32,
  pub notes: Option<String>,
}

/// A stored question paper. Only the student view ever leaves the server.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPaper {
  pub id: String,
  pub subject: String,
  pub difficulty: Difficulty,
  pub topics: Vec<TopicPlan>,
  pub total_questions: u32,
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl GeneratedPaper {
  /// All questions in topic order.
  pub fn questions(&self) -> Vec<Question> {
    self.topics.iter().flat_map(|t| t.questions.iter().cloned()).collect()
  }

  pub fn total_marks(&self) -> u32 {
    self.topics.iter().flat_map(|t| t.questions.iter()).map(|q| q.marks).sum()
  }
}

/// Lifecycle of one exam attempt. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  NotStarted,
  InProgress,
  Submitted,
  Graded,
}

impl fmt::Display for SessionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      SessionStatus::NotStarted => "not_started",
      SessionStatus::InProgress => "in_progress",
      SessionStatus::Submitted => "submitted",
      SessionStatus::Graded => "graded",
    })
  }
}

/// A submitted answer. `file` is an opaque reference to an uploaded attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
  pub text: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGrade {
  pub question_id: String,
  pub score: f64,
  pub max_points: f64,
  pub feedback: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub correct: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ideal_solution: Option<String>,
  pub topic: String,
}

/// Derived from a submitted session; carries no reference back to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedResult {
  pub per_question: Vec<QuestionGrade>,
  pub total_score: f64,
  pub total_max: f64,
  pub summary: String,
  pub solutions_document: String,
  /// Zero-score placeholder produced when the grading service was unavailable.
  #[serde(default)]
  pub degraded: bool,
}

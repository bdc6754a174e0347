//! Schema validation for model replies.
//!
//! Two shapes are accepted: the generation plan (topics → questions) and the
//! grading report (perQuestion + totals). Validation is all-or-nothing: the
//! first structural problem fails the payload with `SchemaViolation`, carrying
//! the path of the offending field (e.g. `topics[0].questions[1].marks`).
//!
//! After a payload passes, a few invariants the model was only *asked* to keep
//! are enforced here: topic weights are renormalized, grading entries are
//! correlated to questions, scores are clamped to each question's marks, and
//! the totals are re-derived from the per-question grades.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{GeneratedPlan, GradedResult, Question, QuestionGrade, QuestionKind, TopicPlan};
use crate::error::{AssessError, AssessResult};
use crate::report::DEFAULT_TOPIC;

pub const MIN_MARKS: i64 = 1;
pub const MAX_MARKS: i64 = 20;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 5;

// ---------- field helpers ----------

fn join(path: &str, key: &str) -> String {
  if path.is_empty() { key.to_string() } else { format!("{path}.{key}") }
}

fn object<'a>(v: &'a Value, path: &str) -> AssessResult<&'a Map<String, Value>> {
  let shown = if path.is_empty() { "$" } else { path };
  v.as_object().ok_or_else(|| AssessError::schema(shown, "expected an object"))
}

/// `null` counts as absent.
fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
  obj.get(key).filter(|v| !v.is_null())
}

fn required<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> AssessResult<&'a Value> {
  field(obj, key).ok_or_else(|| AssessError::schema(join(path, key), "required field is missing"))
}

fn string_value(v: &Value, path: &str) -> AssessResult<String> {
  v.as_str().map(str::to_string).ok_or_else(|| AssessError::schema(path, "expected a string"))
}

fn required_str(obj: &Map<String, Value>, key: &str, path: &str) -> AssessResult<String> {
  string_value(required(obj, key, path)?, &join(path, key))
}

fn non_empty_str(obj: &Map<String, Value>, key: &str, path: &str) -> AssessResult<String> {
  let s = required_str(obj, key, path)?;
  if s.trim().is_empty() {
    return Err(AssessError::schema(join(path, key), "must not be empty"));
  }
  Ok(s)
}

fn optional_str(obj: &Map<String, Value>, key: &str, path: &str) -> AssessResult<Option<String>> {
  field(obj, key).map(|v| string_value(v, &join(path, key))).transpose()
}

fn required_array<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> AssessResult<&'a Vec<Value>> {
  required(obj, key, path)?
    .as_array()
    .ok_or_else(|| AssessError::schema(join(path, key), "expected an array"))
}

fn number_in(v: &Value, path: &str, min: f64, max: Option<f64>) -> AssessResult<f64> {
  let n = v.as_f64().ok_or_else(|| AssessError::schema(path, "expected a number"))?;
  let too_big = max.map(|m| n > m).unwrap_or(false);
  if n < min || too_big {
    let range = match max {
      Some(m) => format!("[{min}, {m}]"),
      None => format!(">= {min}"),
    };
    return Err(AssessError::schema(path, format!("expected a number {range}, got {n}")));
  }
  Ok(n)
}

/// Accepts integral floats (`5.0`) since some serializers emit them for integers.
fn integer_in(v: &Value, path: &str, min: i64, max: i64) -> AssessResult<i64> {
  let n = match v {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64)),
    _ => None,
  }
  .ok_or_else(|| AssessError::schema(path, "expected an integer"))?;
  if n < min || n > max {
    return Err(AssessError::schema(path, format!("expected an integer in [{min}, {max}], got {n}")));
  }
  Ok(n)
}

// ---------- generation ----------

fn question_kind(obj: &Map<String, Value>, path: &str) -> AssessResult<QuestionKind> {
  let (key, v) = match (field(obj, "type"), field(obj, "kind")) {
    (Some(v), _) => ("type", v),
    (None, Some(v)) => ("kind", v),
    (None, None) => return Ok(QuestionKind::default()),
  };
  let p = join(path, key);
  let s = string_value(v, &p)?;
  QuestionKind::parse_wire(&s)
    .ok_or_else(|| AssessError::schema(p, format!("unknown question type `{s}`")))
}

fn options(obj: &Map<String, Value>, path: &str) -> AssessResult<Vec<String>> {
  let p = join(path, "options");
  let arr = required(obj, "options", path)?
    .as_array()
    .ok_or_else(|| AssessError::schema(&p, "expected an array"))?;
  if arr.len() < MIN_OPTIONS || arr.len() > MAX_OPTIONS {
    return Err(AssessError::schema(
      &p,
      format!("multiple-choice needs {MIN_OPTIONS}-{MAX_OPTIONS} options, got {}", arr.len()),
    ));
  }
  arr.iter()
    .enumerate()
    .map(|(i, v)| string_value(v, &format!("{p}[{i}]")))
    .collect()
}

/// Validate one question object; `path` prefixes any reported field path.
pub fn validate_question(v: &Value, path: &str) -> AssessResult<Question> {
  let obj = object(v, path)?;
  let id = non_empty_str(obj, "id", path)?;
  let topic = optional_str(obj, "topic", path)?
    .map(|t| t.trim().to_string())
    .filter(|t| !t.is_empty())
    .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
  let prompt = non_empty_str(obj, "prompt", path)?;
  let kind = question_kind(obj, path)?;
  let options = if kind == QuestionKind::MultipleChoice { options(obj, path)? } else { Vec::new() };
  let answer_key = optional_str(obj, "answerKey", path)?;
  let model_solution = optional_str(obj, "modelSolution", path)?;
  let marks = integer_in(required(obj, "marks", path)?, &join(path, "marks"), MIN_MARKS, MAX_MARKS)? as u32;

  Ok(Question { id, topic, prompt, kind, options, answer_key, model_solution, marks })
}

fn normalize_weights(topics: &mut [TopicPlan]) {
  if topics.is_empty() { return; }
  let sum: f64 = topics.iter().map(|t| t.weight).sum();
  if (sum - 1.0).abs() < 1e-9 { return; }
  if sum > 0.0 {
    for t in topics.iter_mut() { t.weight /= sum; }
  } else {
    let even = 1.0 / topics.len() as f64;
    for t in topics.iter_mut() { t.weight = even; }
  }
}

/// Validate a generation reply: `{ topics: [{ name, weight, questions }], totalQuestions, notes? }`.
pub fn validate_generation(v: &Value) -> AssessResult<GeneratedPlan> {
  let root = object(v, "")?;
  let raw_topics = required_array(root, "topics", "")?;
  if raw_topics.is_empty() {
    return Err(AssessError::schema("topics", "at least one topic is required"));
  }

  let mut seen_ids = HashSet::new();
  let mut topics = Vec::with_capacity(raw_topics.len());
  for (ti, tv) in raw_topics.iter().enumerate() {
    let tpath = format!("topics[{ti}]");
    let tobj = object(tv, &tpath)?;
    let name = non_empty_str(tobj, "name", &tpath)?;
    let weight = number_in(required(tobj, "weight", &tpath)?, &join(&tpath, "weight"), 0.0, Some(1.0))?;
    let raw_questions = required_array(tobj, "questions", &tpath)?;

    let mut questions = Vec::with_capacity(raw_questions.len());
    for (qi, qv) in raw_questions.iter().enumerate() {
      let qpath = format!("{tpath}.questions[{qi}]");
      let q = validate_question(qv, &qpath)?;
      if !seen_ids.insert(q.id.clone()) {
        return Err(AssessError::schema(join(&qpath, "id"), format!("duplicate question id `{}`", q.id)));
      }
      questions.push(q);
    }
    topics.push(TopicPlan { name, weight, questions });
  }

  if seen_ids.is_empty() {
    return Err(AssessError::schema("topics", "the paper contains no questions"));
  }

  let total_questions = integer_in(required(root, "totalQuestions", "")?, "totalQuestions", 1, i64::from(u32::MAX))? as u32;
  let notes = optional_str(root, "notes", "")?;

  normalize_weights(&mut topics);
  Ok(GeneratedPlan { topics, total_questions, notes })
}

// ---------- grading ----------

struct RawGrade {
  id: Option<String>,
  score: f64,
  feedback: String,
  correct: Option<bool>,
  ideal_solution: Option<String>,
  topic: Option<String>,
}

fn raw_grade(v: &Value, path: &str) -> AssessResult<RawGrade> {
  let obj = object(v, path)?;
  let id = optional_str(obj, "id", path)?;
  let score = number_in(required(obj, "score", path)?, &join(path, "score"), 0.0, None)?;
  // Checked for shape only; the question's own marks are authoritative.
  number_in(required(obj, "maxPoints", path)?, &join(path, "maxPoints"), 1.0, None)?;
  let feedback = required_str(obj, "feedback", path)?;
  let correct = field(obj, "correct")
    .map(|v| v.as_bool().ok_or_else(|| AssessError::schema(join(path, "correct"), "expected a boolean")))
    .transpose()?;
  let ideal_solution = optional_str(obj, "idealSolution", path)?;
  let topic = optional_str(obj, "topic", path)?;
  Ok(RawGrade { id, score, feedback, correct, ideal_solution, topic })
}

/// Entry indices in question order: by echoed id when every question id is
/// echoed exactly once, otherwise by position.
fn correlate(questions: &[Question], raw: &[RawGrade]) -> Vec<usize> {
  let by_id: Option<Vec<usize>> = questions
    .iter()
    .map(|q| {
      let mut hits = raw.iter().enumerate().filter(|(_, r)| r.id.as_deref() == Some(q.id.as_str()));
      match (hits.next(), hits.next()) {
        (Some((i, _)), None) => Some(i),
        _ => None,
      }
    })
    .collect();
  by_id.unwrap_or_else(|| (0..questions.len()).collect())
}

fn pick_topic(reported: Option<String>, q: &Question) -> String {
  [reported.as_deref(), Some(q.topic.as_str())]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|t| !t.is_empty())
    .unwrap_or(DEFAULT_TOPIC)
    .to_string()
}

/// Validate a grading reply against the questions that were graded, in submission order.
pub fn validate_grading(v: &Value, questions: &[Question]) -> AssessResult<GradedResult> {
  let root = object(v, "")?;
  let raw_entries = required_array(root, "perQuestion", "")?;
  if raw_entries.is_empty() {
    return Err(AssessError::schema("perQuestion", "at least one entry is required"));
  }
  if raw_entries.len() != questions.len() {
    return Err(AssessError::schema(
      "perQuestion",
      format!("expected {} entries (one per answer), got {}", questions.len(), raw_entries.len()),
    ));
  }

  let mut raw = raw_entries
    .iter()
    .enumerate()
    .map(|(i, e)| raw_grade(e, &format!("perQuestion[{i}]")))
    .collect::<AssessResult<Vec<_>>>()?;

  let reported_score = number_in(required(root, "totalScore", "")?, "totalScore", 0.0, None)?;
  let reported_max = number_in(required(root, "totalMax", "")?, "totalMax", 1.0, None)?;
  let summary = required_str(root, "summary", "")?;
  let solutions_document = required_str(root, "solutionsDocument", "")?;

  let order = correlate(questions, &raw);
  let per_question: Vec<QuestionGrade> = questions
    .iter()
    .zip(order)
    .map(|(q, idx)| {
      let r = &mut raw[idx];
      let max_points = f64::from(q.marks);
      QuestionGrade {
        question_id: q.id.clone(),
        score: r.score.min(max_points),
        max_points,
        feedback: std::mem::take(&mut r.feedback),
        correct: r.correct,
        ideal_solution: r.ideal_solution.take(),
        topic: pick_topic(r.topic.take(), q),
      }
    })
    .collect();

  // Totals are the sums of the per-question grades, whatever the model reported.
  let total_score: f64 = per_question.iter().map(|g| g.score).sum();
  let total_max: f64 = per_question.iter().map(|g| g.max_points).sum();
  if (total_score - reported_score).abs() > 1e-6 || (total_max - reported_max).abs() > 1e-6 {
    warn!(target: "grading", reported_score, reported_max, total_score, total_max, "Reported totals disagree with per-question grades; using sums");
  }

  Ok(GradedResult {
    per_question,
    total_score,
    total_max,
    summary,
    solutions_document,
    degraded: false,
  })
}

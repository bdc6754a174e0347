//! Prompt builder: renders the generation and grading instructions sent to the model.
//!
//! Output is deterministic for a given input and prompt set. Allocation rules
//! (weights, counts, marks ranges) are instructions to the model only; the
//! schema validator is where they are actually checked.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Prompts;
use crate::domain::{Difficulty, Question};
use crate::error::{AssessError, AssessResult};
use crate::util::fill_template;

fn default_target_count() -> u32 { 10 }
fn default_subject() -> String { "General".into() }

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
  #[serde(default)]
  pub syllabus_text: Option<String>,
  /// Topic hints supplied by the user.
  #[serde(default)]
  pub topics: Option<Vec<String>>,
  #[serde(default = "default_target_count")]
  pub target_count: u32,
  #[serde(default)]
  pub difficulty: Difficulty,
  #[serde(default = "default_subject")]
  pub subject: String,
}

impl GenerationRequest {
  fn syllabus(&self) -> Option<&str> {
    self.syllabus_text.as_deref().map(str::trim).filter(|s| !s.is_empty())
  }

  fn hints(&self) -> Vec<&str> {
    self.topics
      .iter()
      .flatten()
      .map(|t| t.trim())
      .filter(|t| !t.is_empty())
      .collect()
  }
}

/// Rendered instruction plus the machine-checkable shape the reply must have.
#[derive(Clone, Debug)]
pub struct GenerationPrompt {
  pub system: String,
  pub user: String,
  pub schema: Value,
}

pub fn generation_schema() -> Value {
  json!({
    "type": "object",
    "required": ["topics", "totalQuestions"],
    "properties": {
      "topics": {
        "type": "array", "minItems": 1,
        "items": {
          "type": "object",
          "required": ["name", "weight", "questions"],
          "properties": {
            "name": { "type": "string" },
            "weight": { "type": "number", "minimum": 0, "maximum": 1 },
            "questions": {
              "type": "array",
              "items": {
                "type": "object",
                "required": ["id", "prompt", "marks"],
                "properties": {
                  "id": { "type": "string" },
                  "topic": { "type": "string" },
                  "prompt": { "type": "string" },
                  "type": { "enum": ["mcq", "short", "long"], "default": "short" },
                  "options": { "type": "array", "items": { "type": "string" }, "minItems": 3, "maxItems": 5 },
                  "answerKey": { "type": "string" },
                  "modelSolution": { "type": "string" },
                  "marks": { "type": "integer", "minimum": 1, "maximum": 20 }
                }
              }
            }
          }
        }
      },
      "totalQuestions": { "type": "integer", "minimum": 1 },
      "notes": { "type": "string" }
    }
  })
}

pub fn grading_schema() -> Value {
  json!({
    "type": "object",
    "required": ["perQuestion", "totalScore", "totalMax", "summary", "solutionsDocument"],
    "properties": {
      "perQuestion": {
        "type": "array", "minItems": 1,
        "items": {
          "type": "object",
          "required": ["id", "score", "maxPoints", "feedback"],
          "properties": {
            "id": { "type": "string" },
            "score": { "type": "number", "minimum": 0 },
            "maxPoints": { "type": "number", "minimum": 1 },
            "feedback": { "type": "string" },
            "correct": { "type": "boolean" },
            "idealSolution": { "type": "string" },
            "topic": { "type": "string" }
          }
        }
      },
      "totalScore": { "type": "number", "minimum": 0 },
      "totalMax": { "type": "number", "minimum": 1 },
      "summary": { "type": "string" },
      "solutionsDocument": { "type": "string" }
    }
  })
}

pub fn build_generation_prompt(prompts: &Prompts, req: &GenerationRequest) -> AssessResult<GenerationPrompt> {
  let syllabus = req.syllabus();
  let hints = req.hints();
  if syllabus.is_none() && hints.is_empty() {
    return Err(AssessError::InvalidRequest("Provide syllabusText or topics[]".into()));
  }
  if req.target_count == 0 {
    return Err(AssessError::InvalidRequest("targetCount must be at least 1".into()));
  }

  let topic_hints = if hints.is_empty() {
    "No explicit topic hints provided. Infer topics from the syllabus.".to_string()
  } else {
    let lines: Vec<String> = hints.iter().enumerate().map(|(i, t)| format!("{}. {}", i + 1, t)).collect();
    format!("User-provided topic hints:\n{}", lines.join("\n"))
  };

  let schema = generation_schema();
  let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
  let target_count = req.target_count.to_string();
  let difficulty = req.difficulty.to_string();

  let user = fill_template(
    &prompts.generation_user_template,
    &[
      ("subject", req.subject.trim()),
      ("target_count", &target_count),
      ("difficulty", &difficulty),
      ("syllabus_text", syllabus.unwrap_or("")),
      ("topic_hints", &topic_hints),
      ("schema_json", &schema_json),
    ],
  );

  Ok(GenerationPrompt { system: prompts.generation_system.clone(), user, schema })
}

/// Grading instruction for ordered `(question, answer)` pairs.
/// Answers are passed as a parallel array so the reply can be correlated by position.
pub fn build_grading_prompt(prompts: &Prompts, pairs: &[(Question, String)]) -> (String, String) {
  let questions: Vec<Value> = pairs
    .iter()
    .map(|(q, _)| {
      json!({
        "id": q.id,
        "topic": q.topic,
        "prompt": q.prompt,
        "marks": q.marks,
        "type": q.kind.wire_name(),
        "options": q.options,
        "answerKey": q.answer_key,
        "modelSolution": q.model_solution,
      })
    })
    .collect();
  let answers: Vec<&str> = pairs.iter().map(|(_, a)| a.as_str()).collect();

  let questions_json = serde_json::to_string(&questions).unwrap_or_default();
  let answers_json = serde_json::to_string(&answers).unwrap_or_default();
  let schema_json = serde_json::to_string_pretty(&grading_schema()).unwrap_or_default();
  let count = pairs.len().to_string();

  let user = fill_template(
    &prompts.grading_user_template,
    &[
      ("questions_json", &questions_json),
      ("answers_json", &answers_json),
      ("count", &count),
      ("schema_json", &schema_json),
    ],
  );
  (prompts.grading_system.clone(), user)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionKind;

  fn request(syllabus: Option<&str>, topics: Option<Vec<&str>>) -> GenerationRequest {
    GenerationRequest {
      syllabus_text: syllabus.map(String::from),
      topics: topics.map(|t| t.into_iter().map(String::from).collect()),
      target_count: 4,
      difficulty: Difficulty::Medium,
      subject: "Mathematics".into(),
    }
  }

  #[test]
  fn rejects_request_without_syllabus_or_topics() {
    let prompts = Prompts::default();
    let err = build_generation_prompt(&prompts, &request(Some("   "), Some(vec![" "]))).unwrap_err();
    assert!(matches!(err, AssessError::InvalidRequest(_)));
  }

  #[test]
  fn rejects_zero_target_count() {
    let mut req = request(Some("Calculus basics"), None);
    req.target_count = 0;
    assert!(matches!(
      build_generation_prompt(&Prompts::default(), &req),
      Err(AssessError::InvalidRequest(_))
    ));
  }

  #[test]
  fn renders_parameters_and_is_deterministic() {
    let prompts = Prompts::default();
    let req = request(Some("Calculus basics"), Some(vec!["Limits", "Derivatives"]));
    let a = build_generation_prompt(&prompts, &req).unwrap();
    let b = build_generation_prompt(&prompts, &req).unwrap();
    assert_eq!(a.user, b.user);
    assert!(a.user.contains("Subject: Mathematics"));
    assert!(a.user.contains("Target Question Count: 4"));
    assert!(a.user.contains("Requested Difficulty: medium"));
    assert!(a.user.contains("1. Limits\n2. Derivatives"));
    assert!(a.user.contains("\"totalQuestions\""));
    assert!(!a.user.contains("{subject}"));
  }

  #[test]
  fn defaults_apply_when_deserializing() {
    let req: GenerationRequest = serde_json::from_str(r#"{"topics": ["Sets"]}"#).unwrap();
    assert_eq!(req.target_count, 10);
    assert_eq!(req.difficulty, Difficulty::Medium);
    assert_eq!(req.subject, "General");
    let p = build_generation_prompt(&Prompts::default(), &req).unwrap();
    assert!(p.user.contains("1. Sets"));
  }

  #[test]
  fn grading_prompt_keeps_answer_order() {
    let q = |id: &str| Question {
      id: id.into(),
      topic: "T".into(),
      prompt: "p".into(),
      kind: QuestionKind::ShortAnswer,
      options: vec![],
      answer_key: None,
      model_solution: Some("sol".into()),
      marks: 5,
    };
    let pairs = vec![(q("q1"), "first".to_string()), (q("q2"), String::new())];
    let (_, user) = build_grading_prompt(&Prompts::default(), &pairs);
    assert!(user.contains(r#"["first",""]"#));
    assert!(user.contains("exactly 2 perQuestion entries"));
  }
}

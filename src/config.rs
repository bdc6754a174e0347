//! Loading service configuration (prompts, exam defaults, grade scale) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::report::GradeBand;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub exam: ExamSettings,
  #[serde(default)]
  pub grading: GradingSettings,
  /// Letter-grade bands. Empty means reports carry no letter grade.
  #[serde(default)]
  pub grade_scale: Vec<GradeBand>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExamSettings {
  pub default_duration_seconds: u64,
  pub allow_late_submission: bool,
}

impl Default for ExamSettings {
  fn default() -> Self {
    Self { default_duration_seconds: 3600, allow_late_submission: false }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GradingSettings {
  /// Return a labeled zero-score result instead of an error when grading fails.
  pub placeholder_on_failure: bool,
}

impl Default for GradingSettings {
  fn default() -> Self {
    Self { placeholder_on_failure: true }
  }
}

/// Prompts used by the model client.
/// Templates use `{key}` placeholders, see `prompt.rs` for the keys each one receives.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub generation_system: String,
  pub generation_user_template: String,
  pub grading_system: String,
  pub grading_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generation_system: "You are an expert exam setter. Read the syllabus/curriculum and produce a balanced plan: topics with weights in [0,1] summing ~1. Then generate well-formed questions per topic. Prefer concise, unambiguous phrasing. Calibrate difficulty. Respond ONLY with strict JSON.".into(),
      generation_user_template: concat!(
        "Subject: {subject}\n",
        "Target Question Count: {target_count}\n",
        "Requested Difficulty: {difficulty}\n\n",
        "Syllabus/Curriculum (raw or OCR):\n\"\"\"{syllabus_text}\"\"\"\n\n",
        "{topic_hints}\n\n",
        "Requirements:\n",
        "- Weight per topic in [0,1] and weights should roughly sum to 1.\n",
        "- Allocate questions across topics proportional to weight (ceil/floor as needed) so that exactly {target_count} questions are generated.\n",
        "- Include question type (mcq/short/long). For MCQs, include 3-5 options and set answerKey to the exact text of the correct option.\n",
        "- For short/long questions, include a concise modelSolution.\n",
        "- Each question must include an integer marks value (1-20). Total marks proportional to weight is preferred.\n",
        "- Question ids must be unique within the paper.\n",
        "- Avoid duplicate questions/titles; no superfluous section headers.\n",
        "- totalQuestions must equal the number of generated questions.\n\n",
        "Return JSON matching this schema:\n{schema_json}",
      ).into(),
      grading_system: concat!(
        "You are an experienced examiner. Grade fairly and consistently using the provided metadata (topic, marks, modelSolution, answerKey). ",
        "MCQ: full marks only when the answer matches answerKey exactly, ignoring case; otherwise zero. ",
        "Text answers: award partial credit judged against modelSolution and the question intent; give concise feedback. ",
        "Every question gets a comprehensive idealSolution explaining the correct answer, whether or not the student was right. ",
        "Respond ONLY with strict JSON.",
      ).into(),
      grading_user_template: concat!(
        "Grade the following submission.\n",
        "Questions JSON (includes topic, marks, optional answerKey/modelSolution):\n{questions_json}\n",
        "Answers JSON (parallel order, empty string means unanswered):\n{answers_json}\n\n",
        "Return JSON matching this schema, with exactly {count} perQuestion entries in the same order and echoing each question id:\n{schema_json}",
      ).into(),
    }
  }
}

/// Attempt to load `AgentConfig` from ASSESSIFY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("ASSESSIFY_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "assessify_backend", %path, bands = cfg.grade_scale.len(), "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "assessify_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "assessify_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: AgentConfig = toml::from_str(
      r#"
        [exam]
        default_duration_seconds = 900
        allow_late_submission = true

        [[grade_scale]]
        min_percent = 90
        label = "A"

        [[grade_scale]]
        min_percent = 0
        label = "F"
      "#,
    )
    .unwrap();

    assert_eq!(cfg.exam.default_duration_seconds, 900);
    assert!(cfg.exam.allow_late_submission);
    assert!(cfg.grading.placeholder_on_failure);
    assert_eq!(cfg.grade_scale.len(), 2);
    assert!(cfg.prompts.grading_user_template.contains("{answers_json}"));
  }

  #[test]
  fn partial_sections_fill_missing_fields() {
    let cfg: AgentConfig = toml::from_str(
      r#"
        [exam]
        default_duration_seconds = 1200

        [prompts]
        grading_system = "Grade strictly."

        [[grade_scale]]
        min_percent = 50
        label = "Pass"
      "#,
    )
    .unwrap();

    assert_eq!(cfg.exam.default_duration_seconds, 1200);
    assert!(!cfg.exam.allow_late_submission);
    assert_eq!(cfg.prompts.grading_system, "Grade strictly.");
    assert_eq!(cfg.prompts.generation_user_template, Prompts::default().generation_user_template);
    assert_eq!(cfg.grade_scale.len(), 1);
  }
}

//! Grading invoker: turns ordered `(question, answer)` pairs into a validated `GradedResult`.
//!
//! Order matters: the model is asked to echo ids, but when it does not, the
//! reply is correlated with the questions by position.

use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{GradedResult, Question, QuestionGrade};
use crate::error::{AssessError, AssessResult};
use crate::openai::{ModelTier, OpenAI};
use crate::prompt::build_grading_prompt;
use crate::schema::validate_grading;

/// Zip parallel question/answer arrays, rejecting empty or mismatched input.
pub fn pair_up(questions: Vec<Question>, answers: Vec<String>) -> AssessResult<Vec<(Question, String)>> {
  if questions.is_empty() || answers.is_empty() || questions.len() != answers.len() {
    return Err(AssessError::InvalidRequest(
      "Questions and answers must be non-empty arrays of equal length.".into(),
    ));
  }
  Ok(questions.into_iter().zip(answers).collect())
}

#[instrument(level = "info", skip_all, fields(count = pairs.len()))]
pub async fn grade_pairs(
  openai: Option<&OpenAI>,
  tier: ModelTier,
  prompts: &Prompts,
  pairs: &[(Question, String)],
) -> AssessResult<GradedResult> {
  if pairs.is_empty() {
    return Err(AssessError::InvalidRequest("Nothing to grade.".into()));
  }
  let oa = openai.ok_or_else(|| AssessError::GradingFailed("model service is not configured".into()))?;

  let (system, user) = build_grading_prompt(prompts, pairs);
  let questions: Vec<Question> = pairs.iter().map(|(q, _)| q.clone()).collect();

  let result = oa
    .grade(tier, &system, &user)
    .await
    .and_then(|reply| validate_grading(&reply, &questions));

  match result {
    Ok(r) => {
      info!(target: "grading", total_score = r.total_score, total_max = r.total_max, "Submission graded");
      Ok(r)
    }
    Err(e) => {
      error!(target: "grading", error = %e, "Grading call failed");
      Err(AssessError::GradingFailed(e.to_string()))
    }
  }
}

/// Zero-score stand-in used when grading is unavailable. Always flagged `degraded`.
pub fn placeholder_result(pairs: &[(Question, String)], reason: &str) -> GradedResult {
  let per_question: Vec<QuestionGrade> = pairs
    .iter()
    .map(|(q, _)| QuestionGrade {
      question_id: q.id.clone(),
      score: 0.0,
      max_points: f64::from(q.marks),
      feedback: "Automatic grading was unavailable; this answer has not been evaluated.".into(),
      correct: None,
      ideal_solution: None,
      topic: q.topic.clone(),
    })
    .collect();
  let total_max = per_question.iter().map(|g| g.max_points).sum();

  GradedResult {
    per_question,
    total_score: 0.0,
    total_max,
    summary: format!("Grading unavailable ({reason}). Scores shown are placeholders; retry grading later."),
    solutions_document: String::new(),
    degraded: true,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::openai::testing::{client_for, completion_body};
  use crate::session::tests::questions;
  use serde_json::json;

  fn pairs() -> Vec<(Question, String)> {
    pair_up(questions(2), vec!["a".into(), "".into()]).unwrap()
  }

  #[test]
  fn pair_up_rejects_mismatched_arrays() {
    assert!(matches!(pair_up(questions(2), vec!["a".into()]), Err(AssessError::InvalidRequest(_))));
    assert!(matches!(pair_up(vec![], vec![]), Err(AssessError::InvalidRequest(_))));
  }

  #[test]
  fn placeholder_is_labeled_and_zeroed() {
    let r = placeholder_result(&pairs(), "timeout");
    assert!(r.degraded);
    assert_eq!(r.total_score, 0.0);
    assert_eq!(r.total_max, 20.0);
    assert!(r.summary.contains("timeout"));
    assert!(r.per_question.iter().all(|g| g.score == 0.0));
  }

  #[tokio::test]
  async fn missing_client_is_a_grading_failure() {
    let err = grade_pairs(None, ModelTier::Strong, &Prompts::default(), &pairs()).await.unwrap_err();
    assert!(matches!(err, AssessError::GradingFailed(_)));
  }

  #[tokio::test]
  async fn grades_through_the_model() {
    let mut server = mockito::Server::new_async().await;
    let reply = json!({
      "perQuestion": [
        { "id": "q1", "score": 7, "maxPoints": 10, "feedback": "Good", "idealSolution": "solution 1" },
        { "id": "q2", "score": 0, "maxPoints": 10, "feedback": "Unanswered", "idealSolution": "solution 2" }
      ],
      "totalScore": 7, "totalMax": 20, "summary": "Half done", "solutionsDocument": "..."
    });
    let _m = server
      .mock("POST", "/chat/completions")
      .with_body(completion_body(&reply))
      .create_async()
      .await;

    let oa = client_for(&server);
    let r = grade_pairs(Some(&oa), ModelTier::Strong, &Prompts::default(), &pairs()).await.unwrap();
    assert_eq!(r.total_score, 7.0);
    assert_eq!(r.per_question[1].ideal_solution.as_deref(), Some("solution 2"));
  }

  #[tokio::test]
  async fn malformed_reply_is_a_grading_failure() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
      .mock("POST", "/chat/completions")
      .with_body(completion_body(&json!({ "perQuestion": [] })))
      .create_async()
      .await;

    let oa = client_for(&server);
    let err = grade_pairs(Some(&oa), ModelTier::Strong, &Prompts::default(), &pairs()).await.unwrap_err();
    match err {
      AssessError::GradingFailed(msg) => assert!(msg.contains("perQuestion")),
      other => panic!("unexpected: {other:?}"),
    }
  }
}

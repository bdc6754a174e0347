//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Generating a paper (prompt, model call, schema validation, storage)
//!   - Driving sessions through their lifecycle
//!   - Grading a submitted session, with a degraded fallback when grading fails
//!   - Joining hosted exams and reading back progress

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{GeneratedPaper, SessionStatus};
use crate::error::{AssessError, AssessResult};
use crate::grading::{grade_pairs, pair_up, placeholder_result};
use crate::hosting::{HostedExam, JoinExamIn};
use crate::openai::ModelTier;
use crate::progress::{attempts_from_result, summarize, Attempt, AttemptIn, ProgressSummary};
use crate::prompt::{build_generation_prompt, GenerationRequest};
use crate::report::{build_report, Report};
use crate::schema::{validate_generation, validate_question};
use crate::session::{AssessmentSession, SessionView};
use crate::state::AppState;

#[instrument(level = "info", skip(state, req), fields(subject = %req.subject, target = req.target_count, difficulty = %req.difficulty))]
pub async fn generate_paper(state: &AppState, req: GenerationRequest) -> AssessResult<GeneratedPaper> {
  let prompt = build_generation_prompt(state.prompts(), &req)?;
  let oa = state
    .openai
    .as_ref()
    .ok_or_else(|| AssessError::ExternalCallFailure("model service is not configured".into()))?;

  let reply = oa.generate_plan(&prompt).await?;
  let plan = validate_generation(&reply).map_err(|e| {
    error!(target: "assessify_backend", error = %e, "Generated plan rejected");
    e
  })?;

  let question_count = plan.topics.iter().map(|t| t.questions.len()).sum::<usize>();
  if question_count != req.target_count as usize {
    warn!(target: "assessify_backend", requested = req.target_count, produced = question_count, "Question count differs from target");
  }

  let paper = GeneratedPaper {
    id: Uuid::new_v4().to_string(),
    subject: req.subject.trim().to_string(),
    difficulty: req.difficulty,
    topics: plan.topics,
    total_questions: plan.total_questions,
    notes: plan.notes,
    created_at: Utc::now(),
  };
  info!(target: "assessify_backend", id = %paper.id, questions = question_count, total_marks = paper.total_marks(), "Paper generated");
  state.insert_paper(paper.clone()).await;
  Ok(paper)
}

#[instrument(level = "info", skip(state))]
pub async fn start_session(
  state: &AppState,
  paper_id: &str,
  student_id: Option<String>,
  duration_seconds: Option<u64>,
  allow_late: Option<bool>,
) -> AssessResult<SessionView> {
  let paper = state.get_paper(paper_id).await?;
  let mut session = AssessmentSession::new(paper_id, state.session_settings(duration_seconds, allow_late));
  session.student_id = student_id;
  session.start(paper.questions())?;
  let view = session.student_view();
  let id = state.insert_session(session).await;
  info!(target: "session", %id, questions = view.questions.len(), remaining = view.remaining_seconds, "Session started");
  Ok(view)
}

/// Join a hosted exam: the countdown is whatever is left of the scheduled window.
#[instrument(level = "info", skip(state, req), fields(access_code = %req.access_code))]
pub async fn join_hosted(state: &AppState, req: JoinExamIn) -> AssessResult<(HostedExam, SessionView)> {
  let name = req.student_name.trim();
  if name.is_empty() {
    return Err(AssessError::InvalidRequest("studentName is required".into()));
  }
  let exam = state.get_hosted(&req.access_code).await?;
  let seconds_left = exam.seconds_left_at(Utc::now())?;
  let paper = state.get_paper(&exam.paper_id).await?;

  let settings = state.session_settings(Some(seconds_left), Some(exam.allow_late_submission));
  let mut session = AssessmentSession::new(&exam.paper_id, settings);
  session.hosted_code = Some(exam.access_code.clone());
  session.student_id = Some(req.student_email.as_deref().map(str::trim).filter(|e| !e.is_empty()).unwrap_or(name).to_string());
  session.start(paper.questions())?;

  let view = session.student_view();
  let id = state.insert_session(session).await;
  info!(target: "session", %id, access_code = %exam.access_code, seconds_left, "Student joined hosted exam");
  Ok((exam, view))
}

pub async fn get_session(state: &AppState, id: Uuid) -> AssessResult<SessionView> {
  state.read_session(id, |s| s.student_view()).await
}

#[instrument(level = "debug", skip(state, text, file), fields(text_len = text.len()))]
pub async fn set_answer(
  state: &AppState,
  id: Uuid,
  question_id: &str,
  text: String,
  file: Option<String>,
) -> AssessResult<SessionView> {
  state
    .with_session(id, |s| {
      s.set_answer(question_id, text, file)?;
      Ok(s.student_view())
    })
    .await
}

pub async fn navigate(state: &AppState, id: Uuid, delta: i64) -> AssessResult<SessionView> {
  state
    .with_session(id, |s| {
      s.navigate(delta);
      Ok(s.student_view())
    })
    .await
}

#[instrument(level = "info", skip(state))]
pub async fn submit(state: &AppState, id: Uuid) -> AssessResult<SessionView> {
  let view = state
    .with_session(id, |s| {
      s.submit()?;
      Ok(s.student_view())
    })
    .await?;
  info!(target: "session", %id, unanswered = view.unanswered, "Session submitted");
  Ok(view)
}

/// Drop a session from the store. Any grading still in flight for it is discarded.
#[instrument(level = "info", skip(state))]
pub async fn abandon(state: &AppState, id: Uuid) -> AssessResult<()> {
  match state.remove_session(id).await {
    Some(s) => {
      info!(target: "session", %id, status = %s.status(), "Session abandoned");
      Ok(())
    }
    None => Err(AssessError::NotFound(format!("session {id}"))),
  }
}

/// Grade a submitted session.
///
/// The store lock is not held during the model call, so the session is
/// re-checked before the result is attached. A result that arrives after the
/// session moved on (or was abandoned) is dropped. Once graded the session is
/// retired and only its result is kept. When grading fails and placeholders are
/// enabled, the caller gets a degraded report and the session stays
/// `submitted` so grading can be retried.
#[instrument(level = "info", skip(state))]
pub async fn grade_session(state: &AppState, id: Uuid) -> AssessResult<Report> {
  if state.graded_result(id).await.is_some() {
    return Err(AssessError::InvalidTransition { from: SessionStatus::Graded, action: "grade" });
  }
  let pairs = state
    .with_session(id, |s| {
      if s.status() != SessionStatus::Submitted {
        return Err(AssessError::InvalidTransition { from: s.status(), action: "grade" });
      }
      Ok(s.grading_pairs())
    })
    .await?;

  match grade_pairs(state.openai.as_ref(), ModelTier::Strong, state.prompts(), &pairs).await {
    Ok(result) => {
      let retired = state.finish_session(id, result.clone()).await.map_err(|e| {
        warn!(target: "grading", %id, error = %e, "Discarded stale grading result");
        e
      })?;
      if let Some(user_id) = &retired.student_id {
        state.record_attempts(user_id, attempts_from_result(user_id, &result, retired.elapsed_seconds())).await;
      }
      Ok(build_report(&result, &state.grade_scale))
    }
    Err(e) if state.config.grading.placeholder_on_failure => {
      warn!(target: "grading", %id, error = %e, "Returning placeholder result; session left submitted");
      Ok(build_report(&placeholder_result(&pairs, &e.to_string()), &state.grade_scale))
    }
    Err(e) => Err(e),
  }
}

pub async fn session_report(state: &AppState, id: Uuid) -> AssessResult<Report> {
  let result = match state.graded_result(id).await {
    Some(r) => r,
    None => state
      .read_session(id, |s| s.result().cloned().ok_or(s.status()))
      .await?
      .map_err(|status| AssessError::InvalidRequest(format!("session is {status}, not graded")))?,
  };
  Ok(build_report(&result, &state.grade_scale))
}

fn answer_text(v: &Value) -> String {
  match v {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Object(o) => o.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
    other => other.to_string(),
  }
}

/// Grade parallel question/answer arrays without a session.
#[instrument(level = "info", skip_all, fields(questions = questions.len(), answers = answers.len()))]
pub async fn grade_stateless(state: &AppState, questions: Vec<Value>, answers: Vec<Value>) -> AssessResult<Report> {
  let questions = questions
    .iter()
    .enumerate()
    .map(|(i, v)| validate_question(v, &format!("questions[{i}]")))
    .collect::<AssessResult<Vec<_>>>()
    .map_err(|e| AssessError::InvalidRequest(e.to_string()))?;
  let answers = answers.iter().map(answer_text).collect();
  let pairs = pair_up(questions, answers)?;

  match grade_pairs(state.openai.as_ref(), ModelTier::Fast, state.prompts(), &pairs).await {
    Ok(result) => Ok(build_report(&result, &state.grade_scale)),
    Err(e) if state.config.grading.placeholder_on_failure => {
      warn!(target: "grading", error = %e, "Returning placeholder result");
      Ok(build_report(&placeholder_result(&pairs, &e.to_string()), &state.grade_scale))
    }
    Err(e) => Err(e),
  }
}

/// Record one attempt reported by a client, outside any graded session.
#[instrument(level = "info", skip(state, input), fields(user_id = %input.user_id, question_id = %input.question_id))]
pub async fn record_attempt(state: &AppState, input: AttemptIn) -> AssessResult<Attempt> {
  let attempt = Attempt::from_input(input)?;
  state.record_attempts(&attempt.user_id, vec![attempt.clone()]).await;
  Ok(attempt)
}

pub async fn progress(state: &AppState, user_id: &str) -> ProgressSummary {
  summarize(user_id, &state.attempts_for(user_id).await)
}

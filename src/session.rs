//! Assessment session state machine.
//!
//! `not_started → in_progress → submitted → graded`, forward only. Navigation,
//! answer edits and timer ticks keep the session `in_progress`. The session
//! performs no I/O and holds no clock: one external scheduler calls `tick()`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Answer, GradedResult, Question, QuestionKind, SessionStatus};
use crate::error::{AssessError, AssessResult};

#[derive(Clone, Debug)]
pub struct SessionSettings {
  pub duration_seconds: u64,
  /// Keep accepting answers after the countdown reaches zero.
  pub allow_late_submission: bool,
}

/// What a single `tick()` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
  Idle,
  Counting,
  AutoSubmitted,
  Overdue,
}

#[derive(Clone, Debug)]
pub struct AssessmentSession {
  pub id: Uuid,
  pub paper_id: String,
  pub student_id: Option<String>,
  pub hosted_code: Option<String>,
  questions: Vec<Question>,
  answers: HashMap<String, Answer>,
  current_index: usize,
  remaining_seconds: u64,
  elapsed_seconds: u64,
  status: SessionStatus,
  settings: SessionSettings,
  result: Option<GradedResult>,
  pub created_at: DateTime<Utc>,
  pub submitted_at: Option<DateTime<Utc>>,
}

impl AssessmentSession {
  pub fn new(paper_id: impl Into<String>, settings: SessionSettings) -> Self {
    Self {
      id: Uuid::new_v4(),
      paper_id: paper_id.into(),
      student_id: None,
      hosted_code: None,
      questions: Vec::new(),
      answers: HashMap::new(),
      current_index: 0,
      remaining_seconds: settings.duration_seconds,
      elapsed_seconds: 0,
      status: SessionStatus::NotStarted,
      settings,
      result: None,
      created_at: Utc::now(),
      submitted_at: None,
    }
  }

  fn require(&self, expected: SessionStatus, action: &'static str) -> AssessResult<()> {
    if self.status != expected {
      return Err(AssessError::InvalidTransition { from: self.status, action });
    }
    Ok(())
  }

  pub fn start(&mut self, questions: Vec<Question>) -> AssessResult<()> {
    self.require(SessionStatus::NotStarted, "start")?;
    if questions.is_empty() {
      return Err(AssessError::EmptyPaper);
    }
    self.questions = questions;
    self.answers.clear();
    self.current_index = 0;
    self.remaining_seconds = self.settings.duration_seconds;
    self.elapsed_seconds = 0;
    self.status = SessionStatus::InProgress;
    if self.remaining_seconds == 0 && !self.settings.allow_late_submission {
      self.mark_submitted();
    }
    Ok(())
  }

  /// Upsert the answer for `question_id`. Empty text is a valid answer.
  pub fn set_answer(&mut self, question_id: &str, text: String, file: Option<String>) -> AssessResult<()> {
    self.require(SessionStatus::InProgress, "answer")?;
    if !self.questions.iter().any(|q| q.id == question_id) {
      return Err(AssessError::InvalidRequest(format!("Unknown question id `{question_id}`")));
    }
    self.answers.insert(question_id.to_string(), Answer { text, file });
    Ok(())
  }

  /// Move the cursor by `delta`, clamped to the paper.
  pub fn navigate(&mut self, delta: i64) -> usize {
    if self.questions.is_empty() { return self.current_index; }
    let last = (self.questions.len() - 1) as i64;
    self.current_index = (self.current_index as i64).saturating_add(delta).clamp(0, last) as usize;
    self.current_index
  }

  pub fn tick(&mut self) -> TickOutcome {
    if self.status != SessionStatus::InProgress {
      return TickOutcome::Idle;
    }
    self.elapsed_seconds += 1;
    self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
    if self.remaining_seconds > 0 {
      return TickOutcome::Counting;
    }
    if self.settings.allow_late_submission {
      return TickOutcome::Overdue;
    }
    self.mark_submitted();
    TickOutcome::AutoSubmitted
  }

  pub fn submit(&mut self) -> AssessResult<()> {
    self.require(SessionStatus::InProgress, "submit")?;
    self.mark_submitted();
    Ok(())
  }

  fn mark_submitted(&mut self) {
    self.status = SessionStatus::Submitted;
    self.submitted_at = Some(Utc::now());
  }

  pub fn mark_graded(&mut self, result: GradedResult) -> AssessResult<()> {
    self.require(SessionStatus::Submitted, "grade")?;
    self.result = Some(result);
    self.status = SessionStatus::Graded;
    Ok(())
  }

  /// Ordered `(question, answer text)` pairs; unanswered questions get "".
  pub fn grading_pairs(&self) -> Vec<(Question, String)> {
    self.questions
      .iter()
      .map(|q| {
        let text = self.answers.get(&q.id).map(|a| a.text.clone()).unwrap_or_default();
        (q.clone(), text)
      })
      .collect()
  }

  pub fn status(&self) -> SessionStatus { self.status }
  pub fn current_index(&self) -> usize { self.current_index }
  pub fn remaining_seconds(&self) -> u64 { self.remaining_seconds }
  pub fn elapsed_seconds(&self) -> u64 { self.elapsed_seconds }
  pub fn questions(&self) -> &[Question] { &self.questions }
  pub fn answers(&self) -> &HashMap<String, Answer> { &self.answers }
  pub fn result(&self) -> Option<&GradedResult> { self.result.as_ref() }

  /// Past the deadline but still open because late submission is allowed.
  pub fn overdue(&self) -> bool {
    self.status == SessionStatus::InProgress && self.remaining_seconds == 0
  }

  pub fn unanswered(&self) -> usize {
    self.questions.iter().filter(|q| !self.answers.contains_key(&q.id)).count()
  }

  pub fn student_view(&self) -> SessionView {
    SessionView {
      id: self.id.to_string(),
      paper_id: self.paper_id.clone(),
      status: self.status,
      current_index: self.current_index,
      remaining_seconds: self.remaining_seconds,
      overdue: self.overdue(),
      unanswered: self.unanswered(),
      questions: self.questions.iter().map(QuestionView::from).collect(),
      answers: self.answers.clone(),
    }
  }
}

/// Question as shown to a student: no answer key, no model solution.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
  pub id: String,
  pub topic: String,
  pub prompt: String,
  pub kind: QuestionKind,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  pub marks: u32,
}

impl From<&Question> for QuestionView {
  fn from(q: &Question) -> Self {
    Self {
      id: q.id.clone(),
      topic: q.topic.clone(),
      prompt: q.prompt.clone(),
      kind: q.kind,
      options: q.options.clone(),
      marks: q.marks,
    }
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
  pub id: String,
  pub paper_id: String,
  pub status: SessionStatus,
  pub current_index: usize,
  pub remaining_seconds: u64,
  pub overdue: bool,
  pub unanswered: usize,
  pub questions: Vec<QuestionView>,
  pub answers: HashMap<String, Answer>,
}

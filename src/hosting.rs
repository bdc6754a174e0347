//! Hosted exams: a stored paper opened to students through a short access code
//! during a scheduled window.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AssessError, AssessResult};

pub const ACCESS_CODE_LEN: usize = 6;
// Excludes 0/O and 1/I.
const ACCESS_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostExamIn {
  pub paper_id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  pub scheduled_start: DateTime<Utc>,
  pub duration_minutes: u32,
  #[serde(default)]
  pub allow_late_submission: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedExam {
  pub access_code: String,
  pub paper_id: String,
  pub title: String,
  pub description: Option<String>,
  pub scheduled_start: DateTime<Utc>,
  pub duration_minutes: u32,
  pub allow_late_submission: bool,
  pub created_at: DateTime<Utc>,
}

impl HostedExam {
  pub fn from_request(req: HostExamIn, access_code: String) -> AssessResult<Self> {
    if req.title.trim().is_empty() {
      return Err(AssessError::InvalidRequest("title is required".into()));
    }
    if req.duration_minutes == 0 {
      return Err(AssessError::InvalidRequest("durationMinutes must be at least 1".into()));
    }
    Ok(Self {
      access_code,
      paper_id: req.paper_id,
      title: req.title.trim().to_string(),
      description: req.description,
      scheduled_start: req.scheduled_start,
      duration_minutes: req.duration_minutes,
      allow_late_submission: req.allow_late_submission,
      created_at: Utc::now(),
    })
  }

  pub fn scheduled_end(&self) -> DateTime<Utc> {
    self.scheduled_start + Duration::minutes(i64::from(self.duration_minutes))
  }

  /// Seconds left for a student joining at `now`, or why they cannot join.
  pub fn seconds_left_at(&self, now: DateTime<Utc>) -> AssessResult<u64> {
    if now < self.scheduled_start {
      return Err(AssessError::InvalidRequest(format!(
        "Exam hasn't started yet. Starts at {}",
        self.scheduled_start.to_rfc3339()
      )));
    }
    let left = (self.scheduled_end() - now).num_seconds();
    if left <= 0 {
      if self.allow_late_submission {
        return Ok(0);
      }
      return Err(AssessError::InvalidRequest("Exam has ended".into()));
    }
    Ok(left as u64)
  }
}

/// Random access code not rejected by `taken`.
pub fn generate_access_code<R: Rng>(rng: &mut R, taken: impl Fn(&str) -> bool) -> String {
  loop {
    let code: String = (0..ACCESS_CODE_LEN)
      .map(|_| ACCESS_CODE_ALPHABET[rng.gen_range(0..ACCESS_CODE_ALPHABET.len())] as char)
      .collect();
    if !taken(&code) {
      return code;
    }
  }
}

pub fn normalize_code(code: &str) -> String {
  code.trim().to_ascii_uppercase()
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinExamIn {
  pub access_code: String,
  pub student_name: String,
  #[serde(default)]
  pub student_email: Option<String>,
}

/// What anyone holding the code may see before joining.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedExamPublic {
  pub access_code: String,
  pub title: String,
  pub description: Option<String>,
  pub scheduled_start: DateTime<Utc>,
  pub scheduled_end: DateTime<Utc>,
  pub duration_minutes: u32,
  pub allow_late_submission: bool,
}

impl From<&HostedExam> for HostedExamPublic {
  fn from(h: &HostedExam) -> Self {
    Self {
      access_code: h.access_code.clone(),
      title: h.title.clone(),
      description: h.description.clone(),
      scheduled_start: h.scheduled_start,
      scheduled_end: h.scheduled_end(),
      duration_minutes: h.duration_minutes,
      allow_late_submission: h.allow_late_submission,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{rngs::StdRng, SeedableRng};

  fn exam(start: DateTime<Utc>, late: bool) -> HostedExam {
    HostedExam::from_request(
      HostExamIn {
        paper_id: "p1".into(),
        title: " Midterm ".into(),
        description: None,
        scheduled_start: start,
        duration_minutes: 60,
        allow_late_submission: late,
      },
      "ABC234".into(),
    )
    .unwrap()
  }

  #[test]
  fn codes_use_the_unambiguous_alphabet() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
      let code = generate_access_code(&mut rng, |_| false);
      assert_eq!(code.len(), ACCESS_CODE_LEN);
      assert!(code.bytes().all(|b| ACCESS_CODE_ALPHABET.contains(&b)));
    }
  }

  #[test]
  fn taken_codes_are_skipped() {
    let mut rng = StdRng::seed_from_u64(1);
    let first = generate_access_code(&mut StdRng::seed_from_u64(1), |_| false);
    let second = generate_access_code(&mut rng, |c| c == first);
    assert_ne!(first, second);
  }

  #[test]
  fn join_window_is_enforced() {
    let start = Utc::now();
    let e = exam(start, false);
    assert_eq!(e.title, "Midterm");
    assert!(e.seconds_left_at(start - Duration::minutes(1)).is_err());
    assert_eq!(e.seconds_left_at(start + Duration::minutes(15)).unwrap(), 45 * 60);
    assert!(matches!(
      e.seconds_left_at(start + Duration::minutes(61)),
      Err(AssessError::InvalidRequest(msg)) if msg.contains("ended")
    ));

    let late = exam(start, true);
    assert_eq!(late.seconds_left_at(start + Duration::minutes(90)).unwrap(), 0);
  }

  #[test]
  fn codes_are_normalized_for_lookup() {
    assert_eq!(normalize_code(" abc234 "), "ABC234");
  }
}

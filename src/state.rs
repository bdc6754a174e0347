//! Application state: in-memory stores, prompts/config, model client, and the session clock.
//!
//! This module owns:
//!   - generated papers (by id)
//!   - assessment sessions (by UUID), each one independent of the others
//!   - grading results of retired sessions (by session UUID)
//!   - hosted exams (by access code)
//!   - per-student attempt history
//!   - the config (prompts, exam defaults, grade scale) and the optional model client
//!
//! Durable persistence is out of scope; everything lives for the process lifetime.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{load_agent_config_from_env, AgentConfig, Prompts};
use crate::domain::{GeneratedPaper, GradedResult, SessionStatus};
use crate::error::{AssessError, AssessResult};
use crate::hosting::{generate_access_code, normalize_code, HostExamIn, HostedExam};
use crate::openai::OpenAI;
use crate::progress::Attempt;
use crate::report::GradeScale;
use crate::session::{AssessmentSession, SessionSettings, TickOutcome};

#[derive(Clone)]
pub struct AppState {
    pub papers: Arc<RwLock<HashMap<String, GeneratedPaper>>>,
    pub sessions: Arc<RwLock<HashMap<Uuid, AssessmentSession>>>,
    pub results: Arc<RwLock<HashMap<Uuid, GradedResult>>>,
    pub hosted: Arc<RwLock<HashMap<String, HostedExam>>>,
    pub attempts: Arc<RwLock<HashMap<String, Vec<Attempt>>>>,
    pub openai: Option<OpenAI>,
    pub config: AgentConfig,
    pub grade_scale: GradeScale,
}

impl AppState {
    /// Build state from env: load config, init the model client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_agent_config_from_env().unwrap_or_default();

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "assessify_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "Model service enabled.");
        } else {
            warn!(target: "assessify_backend", "Model service disabled (no OPENAI_API_KEY). Generation and grading will fail.");
        }

        Self::with_parts(cfg, openai)
    }

    pub fn with_parts(config: AgentConfig, openai: Option<OpenAI>) -> Self {
        info!(
            target: "assessify_backend",
            default_duration_seconds = config.exam.default_duration_seconds,
            allow_late_submission = config.exam.allow_late_submission,
            grade_bands = config.grade_scale.len(),
            "Exam defaults"
        );
        Self {
            papers: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            results: Arc::new(RwLock::new(HashMap::new())),
            hosted: Arc::new(RwLock::new(HashMap::new())),
            attempts: Arc::new(RwLock::new(HashMap::new())),
            openai,
            grade_scale: GradeScale::new(config.grade_scale.clone()),
            config,
        }
    }

    pub fn prompts(&self) -> &Prompts {
        &self.config.prompts
    }

    /// Session settings with per-request overrides on top of the configured defaults.
    pub fn session_settings(&self, duration_seconds: Option<u64>, allow_late: Option<bool>) -> SessionSettings {
        SessionSettings {
            duration_seconds: duration_seconds.unwrap_or(self.config.exam.default_duration_seconds),
            allow_late_submission: allow_late.unwrap_or(self.config.exam.allow_late_submission),
        }
    }

    // ---------- papers ----------

    #[instrument(level = "debug", skip(self, paper), fields(id = %paper.id))]
    pub async fn insert_paper(&self, paper: GeneratedPaper) {
        self.papers.write().await.insert(paper.id.clone(), paper);
    }

    pub async fn get_paper(&self, id: &str) -> AssessResult<GeneratedPaper> {
        self.papers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AssessError::NotFound(format!("paper {id}")))
    }

    // ---------- sessions ----------

    pub async fn insert_session(&self, session: AssessmentSession) -> Uuid {
        let id = session.id;
        self.sessions.write().await.insert(id, session);
        id
    }

    /// Run `f` against one session under the store's write lock.
    pub async fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut AssessmentSession) -> AssessResult<T>,
    ) -> AssessResult<T> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AssessError::NotFound(format!("session {id}")))?;
        f(session)
    }

    pub async fn read_session<T>(&self, id: Uuid, f: impl FnOnce(&AssessmentSession) -> T) -> AssessResult<T> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .map(f)
            .ok_or_else(|| AssessError::NotFound(format!("session {id}")))
    }

    pub async fn remove_session(&self, id: Uuid) -> Option<AssessmentSession> {
        self.sessions.write().await.remove(&id)
    }

    /// Attach `result` to a submitted session and retire it: the session leaves
    /// the store and only the result is kept. Returns the retired session.
    pub async fn finish_session(&self, id: Uuid, result: GradedResult) -> AssessResult<AssessmentSession> {
        let mut sessions = self.sessions.write().await;
        let status = sessions
            .get(&id)
            .map(|s| s.status())
            .ok_or_else(|| AssessError::NotFound(format!("session {id}")))?;
        if status != SessionStatus::Submitted {
            return Err(AssessError::InvalidTransition { from: status, action: "grade" });
        }
        let mut session = sessions
            .remove(&id)
            .ok_or_else(|| AssessError::NotFound(format!("session {id}")))?;
        session.mark_graded(result.clone())?;
        // Still under the sessions lock, so the id is never missing from both maps.
        self.results.write().await.insert(id, result);
        debug!(target: "session", %id, "Session retired after grading");
        Ok(session)
    }

    pub async fn graded_result(&self, id: Uuid) -> Option<GradedResult> {
        self.results.read().await.get(&id).cloned()
    }

    /// Advance every session's countdown by one second. Returns how many were auto-submitted.
    pub async fn tick_all(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut auto_submitted = 0;
        for (id, s) in sessions.iter_mut() {
            match s.tick() {
                TickOutcome::AutoSubmitted => {
                    auto_submitted += 1;
                    info!(target: "session", %id, unanswered = s.unanswered(), "Time's up; session auto-submitted");
                }
                TickOutcome::Overdue => {
                    debug!(target: "session", %id, "Session overdue (late submission allowed)");
                }
                _ => {}
            }
        }
        auto_submitted
    }

    // ---------- hosted exams ----------

    #[instrument(level = "info", skip(self, req), fields(paper_id = %req.paper_id))]
    pub async fn host_exam(&self, req: HostExamIn) -> AssessResult<HostedExam> {
        self.get_paper(&req.paper_id).await?;
        let mut hosted = self.hosted.write().await;
        let code = generate_access_code(&mut rand::thread_rng(), |c| hosted.contains_key(c));
        let exam = HostedExam::from_request(req, code.clone())?;
        hosted.insert(code.clone(), exam.clone());
        info!(target: "session", access_code = %code, title = %exam.title, "Exam hosted");
        Ok(exam)
    }

    pub async fn get_hosted(&self, code: &str) -> AssessResult<HostedExam> {
        self.hosted
            .read()
            .await
            .get(&normalize_code(code))
            .cloned()
            .ok_or_else(|| AssessError::NotFound("Invalid access code".into()))
    }

    // ---------- progress ----------

    pub async fn record_attempts(&self, user_id: &str, attempts: Vec<Attempt>) {
        let n = attempts.len();
        self.attempts
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .extend(attempts);
        debug!(target: "session", %user_id, recorded = n, "Attempts recorded");
    }

    pub async fn attempts_for(&self, user_id: &str) -> Vec<Attempt> {
        self.attempts.read().await.get(user_id).cloned().unwrap_or_default()
    }
}

/// The single periodic tick source for all sessions. One task, one write lock per tick.
pub async fn run_session_clock(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        state.tick_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::questions;

    #[tokio::test]
    async fn tick_all_advances_every_session_independently() {
        let state = AppState::with_parts(AgentConfig::default(), None);

        let mut short = AssessmentSession::new("p", state.session_settings(Some(1), Some(false)));
        short.start(questions(1)).unwrap();
        let mut long = AssessmentSession::new("p", state.session_settings(Some(10), None));
        long.start(questions(1)).unwrap();
        let short_id = state.insert_session(short).await;
        let long_id = state.insert_session(long).await;

        assert_eq!(state.tick_all().await, 1);
        assert_eq!(state.tick_all().await, 0);

        let short_status = state.read_session(short_id, |s| s.status()).await.unwrap();
        let long_left = state.read_session(long_id, |s| s.remaining_seconds()).await.unwrap();
        assert_eq!(short_status, SessionStatus::Submitted);
        assert_eq!(long_left, 8);
    }

    fn result(total: f64) -> GradedResult {
        GradedResult {
            per_question: vec![],
            total_score: total,
            total_max: 10.0,
            summary: String::new(),
            solutions_document: String::new(),
            degraded: false,
        }
    }

    #[tokio::test]
    async fn graded_sessions_are_retired() {
        let state = AppState::with_parts(AgentConfig::default(), None);
        let mut ids = vec![];
        for _ in 0..100 {
            let mut s = AssessmentSession::new("p", state.session_settings(Some(60), None));
            s.start(questions(1)).unwrap();
            s.submit().unwrap();
            ids.push(state.insert_session(s).await);
        }
        for id in &ids {
            let retired = state.finish_session(*id, result(7.0)).await.unwrap();
            assert_eq!(retired.status(), SessionStatus::Graded);
        }

        assert!(state.sessions.read().await.is_empty());
        assert_eq!(state.results.read().await.len(), 100);
        assert_eq!(state.tick_all().await, 0);
        assert_eq!(state.graded_result(ids[0]).await.unwrap().total_score, 7.0);
    }

    #[tokio::test]
    async fn only_submitted_sessions_can_be_finished() {
        let state = AppState::with_parts(AgentConfig::default(), None);
        let mut s = AssessmentSession::new("p", state.session_settings(Some(60), None));
        s.start(questions(1)).unwrap();
        let id = state.insert_session(s).await;

        let err = state.finish_session(id, result(1.0)).await.unwrap_err();
        assert!(matches!(err, AssessError::InvalidTransition { from: SessionStatus::InProgress, .. }));
        assert!(state.sessions.read().await.contains_key(&id));
        assert!(state.graded_result(id).await.is_none());
        assert!(matches!(
            state.finish_session(Uuid::new_v4(), result(1.0)).await,
            Err(AssessError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let state = AppState::with_parts(AgentConfig::default(), None);
        let err = state.with_session(Uuid::new_v4(), |s| s.submit()).await.unwrap_err();
        assert!(matches!(err, AssessError::NotFound(_)));
        assert!(matches!(state.get_hosted("zzzzzz").await, Err(AssessError::NotFound(_))));
        assert!(state.attempts_for("ghost").await.is_empty());
    }
}

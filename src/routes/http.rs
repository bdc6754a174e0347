//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Errors convert to JSON responses through `AssessError`.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AssessResult;
use crate::hosting::{HostExamIn, HostedExamPublic, JoinExamIn};
use crate::logic::*;
use crate::progress::{Attempt, AttemptIn, ProgressSummary};
use crate::prompt::GenerationRequest;
use crate::protocol::*;
use crate::report::Report;
use crate::session::SessionView;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, model_service: state.openai.is_some() })
}

#[instrument(level = "info", skip(state, body), fields(subject = %body.subject, target = body.target_count))]
pub async fn http_generate_paper(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerationRequest>,
) -> AssessResult<(StatusCode, Json<PaperOut>)> {
  let paper = generate_paper(&state, body).await?;
  Ok((StatusCode::CREATED, Json(paper_out(&paper))))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_paper(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> AssessResult<Json<PaperOut>> {
  let paper = state.get_paper(&id).await?;
  Ok(Json(paper_out(&paper)))
}

#[instrument(level = "info", skip(state, body), fields(questions = body.questions.len(), answers = body.answers.len()))]
pub async fn http_grade(State(state): State<Arc<AppState>>, Json(body): Json<GradeIn>) -> AssessResult<Json<Report>> {
  let report = grade_stateless(&state, body.questions, body.answers).await?;
  info!(target: "grading", overall = report.overall_percent, degraded = report.degraded, "HTTP stateless grade");
  Ok(Json(report))
}

#[instrument(level = "info", skip(state, body), fields(paper_id = %body.paper_id))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartSessionIn>,
) -> AssessResult<(StatusCode, Json<SessionView>)> {
  let view = start_session(&state, &body.paper_id, body.student_id, body.duration_seconds, body.allow_late_submission).await?;
  Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(level = "debug", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AssessResult<Json<SessionView>> {
  Ok(Json(get_session(&state, id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_abandon_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AssessResult<StatusCode> {
  abandon(&state, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "debug", skip(state, body), fields(question_id = %body.question_id))]
pub async fn http_set_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<AnswerIn>,
) -> AssessResult<Json<SessionView>> {
  Ok(Json(set_answer(&state, id, &body.question_id, body.text, body.file).await?))
}

#[instrument(level = "debug", skip(state, body), fields(delta = body.delta))]
pub async fn http_navigate(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NavigateIn>,
) -> AssessResult<Json<SessionView>> {
  Ok(Json(navigate(&state, id, body.delta).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_submit(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AssessResult<Json<SessionView>> {
  Ok(Json(submit(&state, id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_grade_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AssessResult<Json<Report>> {
  let report = grade_session(&state, id).await?;
  info!(target: "grading", %id, overall = report.overall_percent, degraded = report.degraded, "HTTP session graded");
  Ok(Json(report))
}

#[instrument(level = "info", skip(state))]
pub async fn http_session_report(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AssessResult<Json<Report>> {
  Ok(Json(session_report(&state, id).await?))
}

#[instrument(level = "info", skip(state, body), fields(paper_id = %body.paper_id, title = %body.title))]
pub async fn http_host_exam(
  State(state): State<Arc<AppState>>,
  Json(body): Json<HostExamIn>,
) -> AssessResult<(StatusCode, Json<HostedExamPublic>)> {
  let exam = state.host_exam(body).await?;
  Ok((StatusCode::CREATED, Json(HostedExamPublic::from(&exam))))
}

#[instrument(level = "info", skip(state, body), fields(access_code = %body.access_code))]
pub async fn http_join_hosted(State(state): State<Arc<AppState>>, Json(body): Json<JoinExamIn>) -> AssessResult<Json<JoinOut>> {
  let (exam, session) = join_hosted(&state, body).await?;
  Ok(Json(JoinOut { exam: HostedExamPublic::from(&exam), session }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_hosted(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> AssessResult<Json<HostedExamPublic>> {
  let exam = state.get_hosted(&code).await?;
  Ok(Json(HostedExamPublic::from(&exam)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_progress(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> Json<ProgressSummary> {
  Json(progress(&state, &user_id).await)
}

#[instrument(level = "info", skip(state, body), fields(user_id = %body.user_id))]
pub async fn http_record_attempt(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AttemptIn>,
) -> AssessResult<(StatusCode, Json<Attempt>)> {
  let attempt = record_attempt(&state, body).await?;
  Ok((StatusCode::CREATED, Json(attempt)))
}

//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Difficulty, GeneratedPaper};
use crate::hosting::HostedExamPublic;
use crate::report::Report;
use crate::session::{QuestionView, SessionView};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GetSession {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    SetAnswer {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "questionId")]
        question_id: String,
        text: String,
        #[serde(default)]
        file: Option<String>,
    },
    Navigate {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        delta: i64,
    },
    Submit {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Grade {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
    Report {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionView,
    },
    Report {
        report: Report,
    },
    Error {
        message: String,
    },
}

//
// Paper DTOs
//

#[derive(Debug, Serialize)]
pub struct TopicOut {
    pub name: String,
    pub weight: f64,
    pub questions: Vec<QuestionView>,
}

/// Student-safe view of a generated paper (no answer keys, no model solutions).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperOut {
    pub id: String,
    pub subject: String,
    pub difficulty: Difficulty,
    pub total_questions: u32,
    pub total_marks: u32,
    pub notes: Option<String>,
    pub topics: Vec<TopicOut>,
}

/// Convert a stored paper to the public DTO.
pub fn paper_out(p: &GeneratedPaper) -> PaperOut {
    PaperOut {
        id: p.id.clone(),
        subject: p.subject.clone(),
        difficulty: p.difficulty,
        total_questions: p.total_questions,
        total_marks: p.total_marks(),
        notes: p.notes.clone(),
        topics: p
            .topics
            .iter()
            .map(|t| TopicOut {
                name: t.name.clone(),
                weight: t.weight,
                questions: t.questions.iter().map(QuestionView::from).collect(),
            })
            .collect(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionIn {
    pub paper_id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub allow_late_submission: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerIn {
    pub question_id: String,
    pub text: String,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NavigateIn {
    pub delta: i64,
}

/// Stateless grading: parallel `questions` / `answers` arrays.
#[derive(Debug, Deserialize)]
pub struct GradeIn {
    #[serde(default)]
    pub questions: Vec<Value>,
    #[serde(default)]
    pub answers: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct JoinOut {
    pub exam: HostedExamPublic,
    pub session: SessionView,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    #[serde(rename = "modelService")]
    pub model_service: bool,
}

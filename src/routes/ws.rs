//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::error::{AssessError, AssessResult};
use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "assessify_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "assessify_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "assessify_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "assessify_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "assessify_backend", "WebSocket disconnected");
}

fn reply<T>(res: AssessResult<T>, ok: impl FnOnce(T) -> ServerWsMessage) -> ServerWsMessage {
  match res {
    Ok(v) => ok(v),
    Err(e) => {
      if let AssessError::InvalidTransition { .. } = e {
        error!(target: "session", error = %e, "Invalid session transition requested");
      }
      ServerWsMessage::Error { message: e.to_string() }
    }
  }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let session = |session| ServerWsMessage::Session { session };
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::GetSession { session_id } => reply(get_session(state, session_id).await, session),

    ClientWsMessage::SetAnswer { session_id, question_id, text, file } => {
      reply(set_answer(state, session_id, &question_id, text, file).await, session)
    }

    ClientWsMessage::Navigate { session_id, delta } => reply(navigate(state, session_id, delta).await, session),

    ClientWsMessage::Submit { session_id } => reply(submit(state, session_id).await, session),

    ClientWsMessage::Grade { session_id } => {
      let res = grade_session(state, session_id).await;
      if let Ok(r) = &res {
        info!(target: "grading", id = %session_id, overall = r.overall_percent, degraded = r.degraded, "WS session graded");
      }
      reply(res, |report| ServerWsMessage::Report { report })
    }

    ClientWsMessage::Report { session_id } => {
      reply(session_report(state, session_id).await, |report| ServerWsMessage::Report { report })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AgentConfig;
  use uuid::Uuid;

  fn state() -> AppState {
    AppState::with_parts(AgentConfig::default(), None)
  }

  #[tokio::test]
  async fn ping_gets_pong() {
    let out = handle_client_ws(ClientWsMessage::Ping, &state()).await;
    assert_eq!(serde_json::to_value(&out).unwrap(), serde_json::json!({ "type": "pong" }));
  }

  #[tokio::test]
  async fn failures_become_error_messages() {
    let msg: ClientWsMessage =
      serde_json::from_value(serde_json::json!({ "type": "submit", "sessionId": Uuid::new_v4() })).unwrap();
    match handle_client_ws(msg, &state()).await {
      ServerWsMessage::Error { message } => assert!(message.starts_with("Not found")),
      other => panic!("unexpected: {other:?}"),
    }
  }

  #[tokio::test]
  async fn invalid_transitions_are_reported() {
    let state = state();
    let mut s = crate::session::AssessmentSession::new("p", state.session_settings(Some(60), None));
    s.start(crate::session::tests::questions(1)).unwrap();
    let id = state.insert_session(s).await;

    match handle_client_ws(ClientWsMessage::Grade { session_id: id }, &state).await {
      ServerWsMessage::Error { message } => assert!(message.contains("in_progress")),
      other => panic!("unexpected: {other:?}"),
    }
  }
}

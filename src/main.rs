//! Assessify · Exam Generation and Grading Backend
//!
//! - Axum HTTP + WebSocket API
//! - Model-backed paper generation and grading (OpenAI-compatible endpoint)
//! - Timed assessment sessions driven by a single background clock
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   OPENAI_API_KEY        : enables the model service if present
//!   OPENAI_BASE_URL       : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL     : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL   : default "gpt-4o"
//!   ASSESSIFY_CONFIG_PATH : path to TOML config (prompts, exam defaults, grade scale)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod prompt;
mod schema;
mod session;
mod grading;
mod report;
mod hosting;
mod progress;
mod openai;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::{run_session_clock, AppState};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: in-memory stores, model client, config.
  let state = Arc::new(AppState::new());

  // One clock for every session.
  tokio::spawn(run_session_clock(state.clone()));

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "assessify_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}

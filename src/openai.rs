//! Minimal OpenAI-compatible client for our use-cases.
//!
//! We only call chat.completions and request a strict JSON object back.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key, and payload previews are truncated.

use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::error::{AssessError, AssessResult};
use crate::prompt::GenerationPrompt;
use crate::util::{extract_json_object, trunc_for_log};

/// Which configured model a call runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
  /// Quick one-off calls (stateless grading).
  Fast,
  /// Paper generation and session grading.
  Strong,
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl OpenAI {
  pub fn new(api_key: String, base_url: String, fast_model: String, strong_model: String) -> Option<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(90))
      .build()
      .ok()?;
    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    Self::new(api_key, base_url, fast_model, strong_model)
  }

  /// JSON-object chat completion. Returns the parsed reply without interpreting it.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model, user_len = user.len()))]
  async fn chat_json(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> AssessResult<Value> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "assessify-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| AssessError::ExternalCallFailure(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "Model call failed");
      return Err(AssessError::ExternalCallFailure(format!("OpenAI HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| AssessError::ExternalCallFailure(format!("Malformed completion envelope: {e}")))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    info!(elapsed = ?start.elapsed(), reply_len = text.len(), "Model response received");

    parse_reply(&text)
  }

  pub fn model(&self, tier: ModelTier) -> &str {
    match tier {
      ModelTier::Fast => &self.fast_model,
      ModelTier::Strong => &self.strong_model,
    }
  }

  // --- High-level helpers (domain-specialized) ---

  /// Ask the model for a question plan. The reply still has to pass `schema::validate_generation`.
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.strong_model))]
  pub async fn generate_plan(&self, prompt: &GenerationPrompt) -> AssessResult<Value> {
    self.chat_json(&self.strong_model, &prompt.system, &prompt.user, 0.4).await
  }

  /// Ask the model to grade a submission. The reply still has to pass `schema::validate_grading`.
  #[instrument(level = "info", skip(self, system, user))]
  pub async fn grade(&self, tier: ModelTier, system: &str, user: &str) -> AssessResult<Value> {
    self.chat_json(self.model(tier), system, user, 0.1).await
  }
}

/// Replies sometimes arrive wrapped in prose or markdown fences; fall back to the outermost object.
fn parse_reply(text: &str) -> AssessResult<Value> {
  if let Ok(v) = serde_json::from_str::<Value>(text) {
    return Ok(v);
  }
  debug!(preview = %trunc_for_log(text, 200), "Reply is not bare JSON; extracting object block");
  extract_json_object(text)
    .and_then(|block| serde_json::from_str::<Value>(block).ok())
    .ok_or_else(|| AssessError::schema("$", "model reply is not valid JSON"))
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

/// Helpers for tests that stand a mock server in for the model endpoint.
#[cfg(test)]
pub(crate) mod testing {
  use super::OpenAI;

  /// Wrap a JSON reply in a chat.completions envelope.
  pub(crate) fn completion_body(content: &serde_json::Value) -> String {
    serde_json::json!({
      "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }],
      "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
    })
    .to_string()
  }

  pub(crate) fn client_for(server: &mockito::ServerGuard) -> OpenAI {
    OpenAI::new("test-key".into(), server.url(), "fast".into(), "strong".into()).unwrap()
  }
}

#[cfg(test)]
mod tests {
  use super::testing::{client_for, completion_body};
  use super::*;
  use serde_json::json;

  #[test]
  fn parse_reply_accepts_fenced_json() {
    let v = parse_reply("```json\n{\"ok\": true}\n```").unwrap();
    assert_eq!(v, json!({"ok": true}));
    assert!(matches!(parse_reply("no json"), Err(AssessError::SchemaViolation { .. })));
  }

  #[test]
  fn openai_error_body_is_unwrapped() {
    let body = r#"{"error": {"message": "Rate limit exceeded", "type": "requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit exceeded"));
    assert_eq!(extract_openai_error("<html>"), None);
  }

  #[tokio::test]
  async fn chat_json_returns_parsed_content() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/chat/completions")
      .match_header("authorization", "Bearer test-key")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(completion_body(&json!({"hello": "world"})))
      .create_async()
      .await;

    let oa = client_for(&server);
    let v = oa.grade(ModelTier::Strong, "system", "user").await.unwrap();
    assert_eq!(v, json!({"hello": "world"}));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn http_errors_become_external_call_failures() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/chat/completions")
      .with_status(429)
      .with_body(r#"{"error": {"message": "slow down"}}"#)
      .create_async()
      .await;

    let oa = client_for(&server);
    match oa.grade(ModelTier::Strong, "s", "u").await {
      Err(AssessError::ExternalCallFailure(msg)) => assert!(msg.contains("slow down")),
      other => panic!("unexpected: {other:?}"),
    }
  }

  #[tokio::test]
  async fn tiers_pick_their_model() {
    let mut server = mockito::Server::new_async().await;
    let fast = server
      .mock("POST", "/chat/completions")
      .match_body(mockito::Matcher::PartialJson(json!({ "model": "fast" })))
      .with_body(completion_body(&json!({ "tier": "fast" })))
      .create_async()
      .await;

    let oa = client_for(&server);
    assert_eq!(oa.model(ModelTier::Strong), "strong");
    let v = oa.grade(ModelTier::Fast, "s", "u").await.unwrap();
    assert_eq!(v, json!({ "tier": "fast" }));
    fast.assert_async().await;
  }
}

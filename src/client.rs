//! HTTP client for the quiz endpoints (`/generate`, `/finish`).
//!
//! Any failure (transport, non-2xx, `ok != true`, undecodable body) maps to a
//! `ClientError` whose `user_message` is the fixed text shown to the player.

use std::fmt;
use std::time::Duration;

use reqwest::header::USER_AGENT;
use serde::Deserialize;
use tracing::{error, info, instrument};

use crate::protocol::{FinishOut, FinishPayload, GenerateIn, GenerateOut};

pub const GENERATE_FAILED: &str = "No se han podido cargar las preguntas en este momento.";
pub const FINISH_FAILED: &str = "No se ha podido guardar el intento.";

#[derive(Debug)]
pub enum ClientError {
  Generate(String),
  Finish(String),
}

impl ClientError {
  pub fn user_message(&self) -> &'static str {
    match self {
      ClientError::Generate(_) => GENERATE_FAILED,
      ClientError::Finish(_) => FINISH_FAILED,
    }
  }
}

impl fmt::Display for ClientError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ClientError::Generate(e) => write!(f, "generate failed: {e}"),
      ClientError::Finish(e) => write!(f, "finish failed: {e}"),
    }
  }
}

impl std::error::Error for ClientError {}

#[derive(Clone, Debug)]
pub struct QuizzClient {
  client: reqwest::Client,
  /// e.g. `https://example.org/cdb-quizz/v1`
  base_url: String,
}

/// Only the `ok` flag, to tell rejections from decoding errors.
#[derive(Deserialize)]
struct OkFlag {
  #[serde(default)]
  ok: bool,
}

impl QuizzClient {
  pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
    Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
  }

  async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<serde_json::Value, String> {
    let url = format!("{}/{}", self.base_url, path);
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "cdb-quizz-client/0.1")
      .json(body)
      .send()
      .await
      .map_err(|e| e.to_string())?;
    let status = res.status();
    if !status.is_success() {
      return Err(format!("HTTP {status}"));
    }
    let value: serde_json::Value = res.json().await.map_err(|e| e.to_string())?;
    let flag: OkFlag = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    if !flag.ok {
      return Err("server answered ok=false".into());
    }
    Ok(value)
  }

  #[instrument(level = "info", skip(self, req), fields(slug = %req.slug))]
  pub async fn generate(&self, req: &GenerateIn) -> Result<GenerateOut, ClientError> {
    let out = self
      .post_json("generate", req)
      .await
      .and_then(|v| serde_json::from_value::<GenerateOut>(v).map_err(|e| e.to_string()))
      .map_err(|e| {
        error!(target: "quizz", error = %e, "Generate request failed");
        ClientError::Generate(e)
      })?;
    info!(target: "quizz", count = out.questions.len(), "Questions received");
    Ok(out)
  }

  #[instrument(level = "info", skip(self, payload), fields(slug = %payload.slug, score = payload.score))]
  pub async fn finish(&self, payload: &FinishPayload) -> Result<u64, ClientError> {
    let out = self
      .post_json("finish", payload)
      .await
      .and_then(|v| serde_json::from_value::<FinishOut>(v).map_err(|e| e.to_string()))
      .map_err(|e| {
        error!(target: "quizz", error = %e, "Finish request failed");
        ClientError::Finish(e)
      })?;
    info!(target: "quizz", intento_id = out.intento_id, "Attempt stored");
    Ok(out.intento_id)
  }
}

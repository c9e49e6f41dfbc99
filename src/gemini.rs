//! Minimal Gemini client for our use-cases.
//!
//! We only call `models/{model}:generateContent` and request either a strict
//! JSON document (question batches, pronunciation scores) or inline audio
//! (speech synthesis). Calls are instrumented and log model names, latencies
//! and response sizes (not contents).
//!
//! NOTE: The API key travels in the `x-goog-api-key` header, never in the
//! URL, so request logs cannot leak it.

use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Language, PronunciationFeedback};
use crate::source::{parse_generated, GenerateRequest, GeneratedQuiz, QuestionSource, SourceError};
use crate::util::{fill_template, trunc_for_log};

const API_KEY_HEADER: &str = "x-goog-api-key";
const QUESTIONS_PER_BATCH: usize = 10;

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub tts_model: String,
  pub prompts: Prompts,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env(prompts: Prompts) -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into());
    let tts_model =
      std::env::var("GEMINI_TTS_MODEL").unwrap_or_else(|_| "gemini-2.5-flash-preview-tts".into());

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model, tts_model, prompts })
  }

  /// Raw generateContent call; returns the first candidate's parts.
  #[instrument(level = "info", skip(self, req), fields(model = %model, parts = req.contents.iter().map(|c| c.parts.len()).sum::<usize>()))]
  async fn generate_content(&self, model: &str, req: &GenerateContentRequest) -> Result<Vec<PartResp>, SourceError> {
    let url = format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model);
    let start = Instant::now();

    let res = self.client.post(&url)
      .header(USER_AGENT, "cdb-quizz-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(API_KEY_HEADER, &self.api_key)
      .json(req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_gemini_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, body = %trunc_for_log(&message, 300), "Gemini call failed");
      return Err(SourceError::Http { status: status.as_u16(), message });
    }

    let body: GenerateContentResponse = res.json().await?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, candidates_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, elapsed = ?start.elapsed(), "Gemini usage");
    }
    first_candidate_parts(body)
  }

  /// JSON-mode call: concatenated text parts of the first candidate.
  async fn generate_json_text(&self, parts: Vec<PartReq>, temperature: f32) -> Result<String, SourceError> {
    let req = GenerateContentRequest {
      contents: vec![ContentReq { parts }],
      generation_config: GenerationConfig {
        response_mime_type: Some("application/json".into()),
        temperature: Some(temperature),
        ..Default::default()
      },
    };
    let parts = self.generate_content(&self.model, &req).await?;
    let text: String = parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
      return Err(SourceError::Malformed("response did not include text content".into()));
    }
    Ok(text)
  }

  /// Full prompt for one batch: persona, source instruction, task, footer.
  pub fn build_prompt(&self, req: &GenerateRequest) -> String {
    let p = &self.prompts;
    let sources = if req.enabled_sources.is_empty() {
      p.general_sources.clone()
    } else {
      fill_template(&p.sources_template, &[("sources", &req.enabled_sources.join(", "))])
    };
    let mode = p.for_mode(req.mode);
    let language = req.language.map(|l| l.display_name()).unwrap_or("Inglés");
    let topic = req.topic.map(|t| t.display_name()).unwrap_or("General");
    let count = QUESTIONS_PER_BATCH.to_string();
    let user = fill_template(&mode.user, &[("count", &count), ("language", language), ("topic", topic)]);
    format!("{}\n{}\n{}\n\n{}", mode.system, sources, user, p.footer)
  }
}

impl QuestionSource for Gemini {
  #[instrument(level = "info", skip(self, req), fields(mode = ?req.mode, model = %self.model))]
  async fn generate(&self, req: &GenerateRequest) -> Result<GeneratedQuiz, SourceError> {
    let prompt = self.build_prompt(req);
    let text = self.generate_json_text(vec![PartReq::text(prompt)], 0.9).await?;
    let quiz = parse_generated(&text)?;
    info!(
      count = quiz.questions.len(),
      first_preview = %quiz.questions[0].question_text.chars().take(40).collect::<String>(),
      "Question batch parsed"
    );
    Ok(quiz)
  }

  #[instrument(level = "info", skip(self, audio_base64, word), fields(audio_len = audio_base64.len(), word_len = word.len(), ?language))]
  async fn evaluate_pronunciation(
    &self,
    audio_base64: &str,
    word: &str,
    language: Language,
  ) -> Result<PronunciationFeedback, SourceError> {
    let prompt = fill_template(
      &self.prompts.pronunciation_template,
      &[("word", word), ("language", language.display_name())],
    );
    let parts = vec![
      PartReq::inline("audio/webm; codecs=opus", audio_base64.to_string()),
      PartReq::text(prompt),
    ];
    let text = self.generate_json_text(parts, 0.2).await?;
    Ok(serde_json::from_str::<PronunciationFeedback>(text.trim())?)
  }

  #[instrument(level = "info", skip(self, text), fields(text_len = text.len(), ?language, model = %self.tts_model))]
  async fn synthesize_speech(&self, text: &str, language: Language) -> Result<String, SourceError> {
    let prompt = fill_template(
      &self.prompts.speech_template,
      &[("language", language.display_name()), ("text", text)],
    );
    let req = GenerateContentRequest {
      contents: vec![ContentReq { parts: vec![PartReq::text(prompt)] }],
      generation_config: GenerationConfig {
        response_modalities: Some(vec!["AUDIO".into()]),
        speech_config: Some(SpeechConfig {
          voice_config: VoiceConfig {
            prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: self.prompts.voice_name.clone() },
          },
        }),
        ..Default::default()
      },
    };
    let parts = self.generate_content(&self.tts_model, &req).await?;
    parts
      .into_iter()
      .find_map(|p| p.inline_data.map(|d| d.data))
      .filter(|d| !d.is_empty())
      .ok_or_else(|| SourceError::Malformed("response did not include audio".into()))
  }
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
  contents: Vec<ContentReq>,
  generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct ContentReq { parts: Vec<PartReq> }

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PartReq {
  #[serde(skip_serializing_if = "Option::is_none")]
  text: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  inline_data: Option<InlineData>,
}

impl PartReq {
  fn text(text: String) -> Self { Self { text: Some(text), inline_data: None } }
  fn inline(mime_type: &str, data: String) -> Self {
    Self { text: None, inline_data: Some(InlineData { mime_type: mime_type.into(), data }) }
  }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
  #[serde(default)] mime_type: String,
  data: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
  #[serde(skip_serializing_if = "Option::is_none")] response_mime_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")] temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")] response_modalities: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")] speech_config: Option<SpeechConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig { voice_config: VoiceConfig }
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig { prebuilt_voice_config: PrebuiltVoiceConfig }
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig { voice_name: String }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate { #[serde(default)] content: Option<ContentResp> }
#[derive(Deserialize)]
struct ContentResp { #[serde(default)] parts: Vec<PartResp> }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartResp {
  #[serde(default)] text: Option<String>,
  #[serde(default)] inline_data: Option<InlineData>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

/// Parts of the first candidate that has content.
fn first_candidate_parts(body: GenerateContentResponse) -> Result<Vec<PartResp>, SourceError> {
  if body.candidates.is_empty() {
    return Err(SourceError::Malformed("response is missing candidates".into()));
  }
  body
    .candidates
    .into_iter()
    .filter_map(|c| c.content)
    .map(|c| c.parts)
    .find(|parts| !parts.is_empty())
    .ok_or_else(|| SourceError::Malformed("candidates carry no parts".into()))
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_gemini_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

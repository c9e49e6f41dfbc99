//! HTTP endpoint handlers. These are thin wrappers that forward to state and
//! the question source; each handler is instrumented with request sizes and
//! basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{error, info, instrument, warn};

use crate::audio::SPEECH_SAMPLE_RATE;
use crate::profile::Profile;
use crate::protocol::*;
use crate::source::{score_pronunciation, QuestionSource};
use crate::state::AppState;
use crate::store::StoreError;

type ApiError = (StatusCode, Json<ErrorOut>);

fn bad_request(message: &str) -> ApiError {
  (StatusCode::BAD_REQUEST, Json(ErrorOut::new(message)))
}

fn store_error(e: StoreError) -> ApiError {
  match e {
    StoreError::InvalidUser(_) => bad_request("Usuario no válido."),
    other => {
      error!(target: "profile", error = %other, "Profile store failure");
      (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorOut::new("No se ha podido acceder al perfil.")))
    }
  }
}

#[instrument(level = "info")]
pub async fn http_ping() -> impl IntoResponse {
  Json(PingOut { ok: true, time: chrono::Utc::now().to_rfc3339() })
}

#[instrument(level = "info", skip(state, body), fields(slug = %body.slug))]
pub async fn http_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Json<GenerateOut>, ApiError> {
  if body.slug.trim().is_empty() {
    return Err(bad_request("El parámetro slug es obligatorio."));
  }
  let out = state.generate_for_slug(&body).await;
  info!(target: "quizz", slug = %out.slug, count = out.questions.len(), "HTTP generate served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(slug = %body.slug, score = body.score, questions = body.questions.len()))]
pub async fn http_finish(
  State(state): State<Arc<AppState>>,
  Json(body): Json<FinishPayload>,
) -> Result<Json<FinishOut>, ApiError> {
  if body.slug.trim().is_empty() || body.questions.is_empty() {
    warn!(target: "quizz", "Finish rejected: slug and questions are required");
    return Err(bad_request("Los parámetros slug y questions son obligatorios."));
  }
  let intento_id = state.record_attempt(None, body).await;
  Ok(Json(FinishOut { ok: true, intento_id }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_profile(
  State(state): State<Arc<AppState>>,
  Path(user): Path<String>,
) -> Result<Json<Profile>, ApiError> {
  state.load_profile(&user).await.map(Json).map_err(store_error)
}

#[instrument(level = "info", skip(state, body), fields(xp = body.xp, history = body.history.len()))]
pub async fn http_put_profile(
  State(state): State<Arc<AppState>>,
  Path(user): Path<String>,
  Json(body): Json<Profile>,
) -> Result<Json<Profile>, ApiError> {
  let saved = state.save_profile(&user, body).await.map_err(store_error)?;
  info!(target: "profile", %user, level = saved.level, "Profile snapshot replaced");
  Ok(Json(saved))
}

#[instrument(level = "info", skip(state, body), fields(audio_len = body.audio_base64.len(), word_len = body.word.len(), language = ?body.language))]
pub async fn http_pronunciation_evaluate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PronunciationIn>,
) -> impl IntoResponse {
  let fb = score_pronunciation(state.gemini.as_deref(), &body.audio_base64, &body.word, body.language).await;
  info!(target: "quizz", score = fb.score, "Pronunciation scored");
  Json(fb)
}

#[instrument(level = "info", skip(state, body), fields(text_len = body.text.len(), language = ?body.language))]
pub async fn http_pronunciation_audio(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SpeechIn>,
) -> impl IntoResponse {
  let audio_base64 = match state.gemini.as_deref() {
    Some(g) => match g.synthesize_speech(&body.text, body.language).await {
      Ok(b64) => Some(b64),
      Err(e) => {
        error!(target: "quizz", error = %e, "Speech synthesis failed");
        None
      }
    },
    None => None,
  };
  Json(SpeechOut { audio_base64, sample_rate: SPEECH_SAMPLE_RATE })
}

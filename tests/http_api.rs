//! REST surface, exercised through the router and over a real socket with
//! the bundled client. No Gemini key: generation serves the mock deck.

use std::sync::Arc;

use axum::{
  body::{to_bytes, Body},
  http::{header, Method, Request, StatusCode},
  Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use cdb_quizz_backend::client::{QuizzClient, FINISH_FAILED};
use cdb_quizz_backend::config::QuizzConfig;
use cdb_quizz_backend::protocol::{FinishPayload, GenerateIn};
use cdb_quizz_backend::routes::build_router;
use cdb_quizz_backend::state::AppState;
use cdb_quizz_backend::store::{AnyProfileStore, MemoryProfileStore};

fn app_state() -> Arc<AppState> {
  Arc::new(AppState::build(
    QuizzConfig::default(),
    None,
    AnyProfileStore::Memory(MemoryProfileStore::default()),
  ))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut req = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      req = req.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
  let status = res.status();
  let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
  let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, value)
}

fn finish_body() -> Value {
  json!({
    "slug": "cultura",
    "score": 2,
    "duration_seconds": 41,
    "questions": [{
      "id": "q1",
      "questionText": "¿Capital del vino de Rioja?",
      "options": ["Logroño", "Haro", "Laguardia", "Briones"],
      "correctAnswer": "Haro",
      "explanation": "Haro es la capital del vino.",
      "difficulty": "Easy"
    }]
  })
}

#[tokio::test]
async fn ping_answers_ok() {
  let app = build_router(app_state());
  let (status, body) = call(&app, Method::GET, "/cdb-quizz/v1/ping", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["ok"], true);
  assert!(body["time"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn generate_without_gemini_serves_mock_deck() {
  let app = build_router(app_state());
  let (status, body) = call(&app, Method::POST, "/cdb-quizz/v1/generate", Some(json!({ "slug": "cultura" }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["ok"], true);
  assert_eq!(body["slug"], "cultura");
  assert_eq!(body["questions"].as_array().map(Vec::len), Some(3));
  assert_eq!(body["used_sources"], json!([]));
}

#[tokio::test]
async fn generate_requires_slug() {
  let app = build_router(app_state());
  let (status, body) = call(&app, Method::POST, "/cdb-quizz/v1/generate", Some(json!({ "slug": "  " }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn finish_ids_increase() {
  let state = app_state();
  let app = build_router(state.clone());
  let (status, first) = call(&app, Method::POST, "/cdb-quizz/v1/finish", Some(finish_body())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(first["intento_id"], 1);
  let (_, second) = call(&app, Method::POST, "/cdb-quizz/v1/finish", Some(finish_body())).await;
  assert_eq!(second["intento_id"], 2);

  let log = state.attempts.read().await;
  assert_eq!(log.len(), 2);
  assert_eq!(log.get(2).map(|a| a.payload.score), Some(2));
}

#[tokio::test]
async fn finish_without_questions_is_rejected() {
  let app = build_router(app_state());
  let (status, body) = call(&app, Method::POST, "/cdb-quizz/v1/finish", Some(json!({ "slug": "cultura" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["ok"], false);
  assert!(body["message"].as_str().is_some());
}

#[tokio::test]
async fn profile_snapshot_is_replaced_whole() {
  let app = build_router(app_state());
  let (status, fresh) = call(&app, Method::GET, "/cdb-quizz/v1/profile/ana", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(fresh["nickname"], "CamareroNovato");
  assert_eq!(fresh["xp"], 0);
  assert_eq!(fresh["badges"], json!(["b1"]));

  let (status, saved) = call(
    &app,
    Method::PUT,
    "/cdb-quizz/v1/profile/ana",
    Some(json!({ "nickname": "Ana", "xp": 1600, "level": 1 })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(saved["level"], 4);

  let (_, loaded) = call(&app, Method::GET, "/cdb-quizz/v1/profile/ana", None).await;
  assert_eq!(loaded["nickname"], "Ana");
  assert_eq!(loaded["xp"], 1600);
  assert_eq!(loaded["level"], 4);
}

#[tokio::test]
async fn profile_rejects_unsafe_user_ids() {
  let state = app_state();
  let app = build_router(state.clone());
  let (status, _) = call(&app, Method::GET, "/cdb-quizz/v1/profile/a.b", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(state.locked_profiles().await, 0);
}

#[tokio::test]
async fn profile_with_enormous_xp_keeps_a_level() {
  let app = build_router(app_state());
  let (status, saved) = call(
    &app,
    Method::PUT,
    "/cdb-quizz/v1/profile/ana",
    Some(json!({ "xp": 500u64 * u32::MAX as u64 })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(saved["level"], u32::MAX);
}

#[tokio::test]
async fn pronunciation_without_gemini_scores_zero() {
  let app = build_router(app_state());
  let (status, body) = call(
    &app,
    Method::POST,
    "/cdb-quizz/v1/pronunciation/evaluate",
    Some(json!({ "audio_base64": "AAAA", "word": "Bonjour", "language": "french" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["score"], 0.0);
}

#[tokio::test]
async fn client_round_trips_over_tcp() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let app = build_router(app_state());
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });

  let client = QuizzClient::new(format!("http://{addr}/cdb-quizz/v1")).unwrap();
  let out = client
    .generate(&GenerateIn { slug: "cultura".into(), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(out.questions.len(), 3);

  let payload = FinishPayload { slug: "cultura".into(), score: 1, questions: out.questions.clone(), ..Default::default() };
  assert_eq!(client.finish(&payload).await.unwrap(), 1);

  // Missing questions: the server says no, the client reports the fixed message.
  let err = client.finish(&FinishPayload { slug: "cultura".into(), ..Default::default() }).await.unwrap_err();
  assert_eq!(err.user_message(), FINISH_FAILED);
}

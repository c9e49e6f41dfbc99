//! CdB_ Quizz · Quiz Backend
//!
//! - Axum HTTP + WebSocket API under /cdb-quizz/v1
//! - Optional Gemini integration (via environment variables)
//! - Static quiz client fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   GEMINI_API_KEY    : enables Gemini integration if present
//!   GEMINI_BASE_URL   : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL      : default "gemini-2.5-flash"
//!   GEMINI_TTS_MODEL  : default "gemini-2.5-flash-preview-tts"
//!   QUIZZ_CONFIG_PATH : path to TOML config (prompts + quiz definitions)
//!   PROFILE_DIR       : profile snapshots directory (default "./profiles")
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default), "compact" or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use cdb_quizz_backend::routes::build_router;
use cdb_quizz_backend::state::AppState;
use cdb_quizz_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new());
  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "cdb_quizz_backend", %addr, quizzes = state.quizzes.len(), gemini = state.gemini.is_some(), "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}

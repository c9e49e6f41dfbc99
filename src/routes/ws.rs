//! WebSocket upgrade + live quiz session. Each connection runs one
//! `QuizMachine` through a `SessionDriver`; the client sends session inputs
//! as JSON and gets a view snapshot after every input and every timer tick.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument, warn};

use crate::driver::{Outcome, SessionDriver};
use crate::gemini::Gemini;
use crate::profile::Profile;
use crate::protocol::{ClientWsMessage, ServerWsMessage, WsControl, WsQuery};
use crate::session::QuizMachine;
use crate::state::AppState;
use crate::store::validate_user;

type Driver = SessionDriver<Gemini>;

#[instrument(level = "info", skip(state, ws))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<WsQuery>,
) -> impl IntoResponse {
  info!(target: "cdb_quizz_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, q))
}

fn encode(msg: &ServerWsMessage<'_>) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

async fn send(socket: &mut WebSocket, text: String) -> bool {
  if let Err(e) = socket.send(Message::Text(text)).await {
    error!(target: "cdb_quizz_backend", error = %e, "WS send error");
    return false;
  }
  true
}

fn snapshot_text(driver: &Driver) -> String {
  encode(&ServerWsMessage::Snapshot { snapshot: driver.machine().snapshot() })
}

/// Act on driver outcomes; false once the socket is gone.
async fn flush(socket: &mut WebSocket, state: &AppState, user: Option<&str>, outcomes: Vec<Outcome>) -> bool {
  for outcome in outcomes {
    let reply = match outcome {
      Outcome::ProfileChanged(profile) => {
        if let Some(user) = user {
          if let Err(e) = state.save_profile(user, profile).await {
            error!(target: "profile", %user, error = %e, "Profile snapshot not saved");
          }
        }
        continue;
      }
      Outcome::SessionFinished(payload) => {
        let intento_id = state.record_attempt(user, payload).await;
        ServerWsMessage::Saved { intento_id }
      }
      Outcome::Alert(message) => ServerWsMessage::Alert { message },
      Outcome::OpenUrl(url) => ServerWsMessage::OpenUrl { url },
      Outcome::PlayAudio { audio_base64, audio } => ServerWsMessage::Audio {
        duration_secs: audio.duration_secs(),
        sample_rate: audio.sample_rate,
        audio_base64,
      },
    };
    if !send(socket, encode(&reply)).await {
      return false;
    }
  }
  true
}

async fn load_profile(state: &AppState, user: Option<&str>) -> Profile {
  let Some(user) = user else {
    return Profile::default();
  };
  match state.load_profile(user).await {
    Ok(profile) => profile,
    Err(e) => {
      warn!(target: "profile", %user, error = %e, "Profile unreadable; starting from the initial profile");
      Profile::default()
    }
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, q: WsQuery) {
  let user = q.user.filter(|u| validate_user(u).is_ok());
  let slug = q.slug.unwrap_or_else(|| "cdb-quizz".into());
  info!(target: "cdb_quizz_backend", user = ?user, %slug, "WebSocket connected");

  let profile = load_profile(&state, user.as_deref()).await;
  let machine = QuizMachine::new(profile, slug.clone()).with_mode(state.mode_for_slug(&slug));
  let mut driver = Driver::new(machine, state.gemini.clone());

  let started = driver.start();
  if !flush(&mut socket, &state, user.as_deref(), started).await || !send(&mut socket, snapshot_text(&driver)).await {
    return;
  }

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let outcomes = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(ClientWsMessage::Control(WsControl::Ping)) => {
                if !send(&mut socket, encode(&ServerWsMessage::Pong)).await { break }
                continue;
              }
              Ok(ClientWsMessage::Session(input)) => {
                debug!(target: "session", input = input.name(), "WS input");
                match driver.dispatch(input.into()) {
                  Ok(outcomes) => outcomes,
                  Err(e) => {
                    if !send(&mut socket, encode(&ServerWsMessage::Error { message: e.to_string() })).await { break }
                    continue;
                  }
                }
              }
              Err(e) => {
                if !send(&mut socket, encode(&ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) })).await { break }
                continue;
              }
            };
            if !flush(&mut socket, &state, user.as_deref(), outcomes).await || !send(&mut socket, snapshot_text(&driver)).await {
              break;
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      stepped = driver.step() => {
        match stepped {
          Ok(outcomes) => {
            if !flush(&mut socket, &state, user.as_deref(), outcomes).await || !send(&mut socket, snapshot_text(&driver)).await {
              break;
            }
          }
          Err(e) => debug!(target: "session", error = %e, "Background event rejected"),
        }
      }
    }
  }
  info!(target: "cdb_quizz_backend", running_timers = driver.running_timers(), "WebSocket disconnected");
}

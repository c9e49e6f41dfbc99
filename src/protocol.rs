//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{AppMode, HistoryEntry, Language, Question, Topic};
use crate::session::{Input, Snapshot};

/// Messages the client can send over WebSocket: either a control frame or a
/// session input (`{"type": "start", ...}`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ClientWsMessage {
    Control(WsControl),
    Session(Input),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsControl {
    Ping,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage<'a> {
    Pong,
    Snapshot {
        snapshot: Snapshot<'a>,
    },
    Alert {
        message: String,
    },
    OpenUrl {
        url: String,
    },
    /// Synthesized speech, PCM16 little-endian mono.
    Audio {
        audio_base64: String,
        sample_rate: u32,
        duration_secs: f32,
    },
    /// A finished session was stored.
    Saved {
        intento_id: u64,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Serialize)]
pub struct PingOut {
    pub ok: bool,
    /// RFC 3339 server time.
    pub time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateIn {
    pub slug: String,
    #[serde(default)]
    pub app_mode: Option<AppMode>,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub topic: Option<Topic>,
    /// Overrides the default source list for the mode.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOut {
    pub ok: bool,
    pub slug: String,
    pub questions: Vec<Question>,
    pub app_mode: AppMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    #[serde(default)]
    pub used_sources: Vec<String>,
}

/// Summary of a finished session, posted to `/finish`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinishPayload {
    pub slug: String,
    pub app_mode: AppMode,
    pub language: Option<Language>,
    pub topic: Option<Topic>,
    pub duration_seconds: u64,
    pub score: u32,
    pub questions: Vec<Question>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishOut {
    pub ok: bool,
    pub intento_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub ok: bool,
    pub message: String,
}

impl ErrorOut {
    pub fn new(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}

#[derive(Debug, Deserialize)]
pub struct PronunciationIn {
    pub audio_base64: String,
    pub word: String,
    pub language: Language,
}

#[derive(Debug, Deserialize)]
pub struct SpeechIn {
    pub text: String,
    pub language: Language,
}

#[derive(Debug, Serialize)]
pub struct SpeechOut {
    pub audio_base64: Option<String>,
    pub sample_rate: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Profile the live session reads and writes.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

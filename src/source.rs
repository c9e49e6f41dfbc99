//! Question source adapter: the seam between the quiz core and whatever
//! generates questions and pronunciation feedback.
//!
//! `load_deck` never fails: any adapter error (or an empty batch) becomes the
//! single placeholder question so the session always leaves `loading`.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::domain::{AppMode, Difficulty, Language, PronunciationFeedback, Question, Topic};
use crate::seeds::placeholder_question;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
  pub mode: AppMode,
  pub language: Option<Language>,
  pub topic: Option<Topic>,
  /// Names of the enabled quiz sources for the mode.
  pub enabled_sources: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedQuiz {
  pub questions: Vec<Question>,
  /// Sources the generator claims to have used.
  pub used_sources: Vec<String>,
}

/// Deck handed to the session once loading resolves.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedDeck {
  pub questions: Vec<Question>,
  pub used_sources: Vec<String>,
  pub fallback: bool,
}

#[derive(Debug)]
pub enum SourceError {
  /// No generator configured (missing API key).
  Unavailable,
  Transport(String),
  Http { status: u16, message: String },
  /// Response arrived but did not carry usable content.
  Malformed(String),
}

impl fmt::Display for SourceError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceError::Unavailable => f.write_str("question source unavailable"),
      SourceError::Transport(e) => write!(f, "transport error: {e}"),
      SourceError::Http { status, message } => write!(f, "HTTP {status}: {message}"),
      SourceError::Malformed(e) => write!(f, "malformed response: {e}"),
    }
  }
}

impl std::error::Error for SourceError {}

impl From<reqwest::Error> for SourceError {
  fn from(err: reqwest::Error) -> Self {
    SourceError::Transport(err.to_string())
  }
}

impl From<serde_json::Error> for SourceError {
  fn from(err: serde_json::Error) -> Self {
    SourceError::Malformed(err.to_string())
  }
}

/// Generator of question batches and pronunciation help.
pub trait QuestionSource {
  fn generate(&self, req: &GenerateRequest) -> impl Future<Output = Result<GeneratedQuiz, SourceError>> + Send;

  fn evaluate_pronunciation(
    &self,
    audio_base64: &str,
    word: &str,
    language: Language,
  ) -> impl Future<Output = Result<PronunciationFeedback, SourceError>> + Send;

  /// Base64 PCM16 (24 kHz, mono) speech for `text`.
  fn synthesize_speech(&self, text: &str, language: Language) -> impl Future<Output = Result<String, SourceError>> + Send;
}

/// Ask the source for a batch, degrading to the placeholder deck.
#[instrument(level = "info", skip(source, req), fields(mode = ?req.mode, sources = req.enabled_sources.len()))]
pub async fn load_deck<S: QuestionSource>(source: Option<&S>, req: &GenerateRequest) -> LoadedDeck {
  let result = match source {
    Some(s) => s.generate(req).await,
    None => Err(SourceError::Unavailable),
  };
  match result {
    Ok(quiz) if !quiz.questions.is_empty() => {
      info!(target: "quizz", count = quiz.questions.len(), used_sources = quiz.used_sources.len(), "Question batch generated");
      LoadedDeck { questions: quiz.questions, used_sources: quiz.used_sources, fallback: false }
    }
    Ok(_) => {
      warn!(target: "quizz", "Generator returned no questions; using placeholder");
      fallback_deck()
    }
    Err(e) => {
      error!(target: "quizz", error = %e, "Question generation failed; using placeholder");
      fallback_deck()
    }
  }
}

pub fn fallback_deck() -> LoadedDeck {
  LoadedDeck { questions: vec![placeholder_question()], used_sources: Vec::new(), fallback: true }
}

/// Pronunciation scoring that never fails; errors become a zero score.
pub async fn score_pronunciation<S: QuestionSource>(
  source: Option<&S>,
  audio_base64: &str,
  word: &str,
  language: Language,
) -> PronunciationFeedback {
  let Some(s) = source else {
    return PronunciationFeedback { score: 0.0, feedback: "No se pudo analizar el audio.".into() };
  };
  match s.evaluate_pronunciation(audio_base64, word, language).await {
    Ok(mut fb) => {
      fb.score = fb.score.clamp(0.0, 100.0);
      fb
    }
    Err(e) => {
      error!(target: "quizz", error = %e, "Pronunciation evaluation failed");
      PronunciationFeedback { score: 0.0, feedback: "Error de conexión.".into() }
    }
  }
}

fn as_text(v: Option<&Value>) -> Option<String> {
  match v? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Coerce loosely-shaped question objects into `Question`s. Missing ids
/// become `q{n}`, `text` is accepted for `questionText`, options are
/// stringified. Non-object entries are skipped.
pub fn normalize_questions(raw: &[Value]) -> Vec<Question> {
  raw
    .iter()
    .enumerate()
    .filter_map(|(i, item)| {
      let obj = item.as_object()?;
      let id = as_text(obj.get("id")).filter(|s| !s.is_empty()).unwrap_or_else(|| format!("q{}", i + 1));
      let question_text = as_text(obj.get("questionText")).or_else(|| as_text(obj.get("text"))).unwrap_or_default();
      let options = obj
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| opts.iter().filter_map(|o| as_text(Some(o))).collect())
        .unwrap_or_default();
      let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|t| t.iter().filter_map(|o| as_text(Some(o))).collect())
        .unwrap_or_default();
      Some(Question {
        id,
        question_text,
        options,
        correct_answer: as_text(obj.get("correctAnswer")).unwrap_or_default(),
        explanation: as_text(obj.get("explanation")).unwrap_or_default(),
        difficulty: as_text(obj.get("difficulty")).map(|d| Difficulty::from_label(&d)).unwrap_or_default(),
        tags,
      })
    })
    .collect()
}

/// Parse the generator's JSON document `{questions:[...], usedSources:[...]}`.
pub fn parse_generated(text: &str) -> Result<GeneratedQuiz, SourceError> {
  let doc: Value = serde_json::from_str(strip_code_fence(text))?;
  let questions = doc
    .get("questions")
    .and_then(Value::as_array)
    .ok_or_else(|| SourceError::Malformed("missing questions array".into()))?;
  let questions = normalize_questions(questions);
  if questions.is_empty() {
    return Err(SourceError::Malformed("no valid questions".into()));
  }
  let used_sources = doc
    .get("usedSources")
    .and_then(Value::as_array)
    .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
    .unwrap_or_default();
  Ok(GeneratedQuiz { questions, used_sources })
}

/// Models sometimes wrap JSON in a ```json fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
  let t = text.trim();
  let Some(rest) = t.strip_prefix("```") else {
    return t;
  };
  let rest = rest.strip_prefix("json").unwrap_or(rest);
  rest.strip_suffix("```").unwrap_or(rest).trim()
}

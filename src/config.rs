//! Loading quiz configuration (prompts + quiz definitions) from TOML.
//!
//! See `QuizzConfig` and `Prompts` for the expected schema. Every section is
//! optional; anything missing takes the built-in default.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{AppMode, Language, Topic};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QuizzConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub quizzes: Vec<QuizDefinition>,
}

/// A quiz published under a slug (what the CMS shortcode points at).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct QuizDefinition {
  pub slug: String,
  #[serde(default)] pub title: String,
  #[serde(default)] pub app_mode: AppMode,
  #[serde(default)] pub default_language: Option<Language>,
  #[serde(default)] pub default_topic: Option<Topic>,
  #[serde(default = "default_max_questions")] pub max_questions: usize,
  #[serde(default = "default_active")] pub active: bool,
}

fn default_max_questions() -> usize { 10 }
fn default_active() -> bool { true }

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ModePrompt {
  pub system: String,
  pub user: String,
}

/// Prompt templates used by the Gemini client. Placeholders: `{language}`,
/// `{topic}`, `{sources}`, `{count}`, `{word}`, `{text}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub modes: BTreeMap<AppMode, ModePrompt>,
  pub sources_template: String,
  pub general_sources: String,
  pub footer: String,
  pub pronunciation_template: String,
  pub speech_template: String,
  pub voice_name: String,
}

fn mode(system: &str, user: &str) -> ModePrompt {
  ModePrompt { system: system.into(), user: user.into() }
}

impl Default for Prompts {
  fn default() -> Self {
    let modes = BTreeMap::from([
      (AppMode::Idiomas, mode(
        "Eres un experto profesor de idiomas para hostelería.",
        "Genera {count} preguntas de vocabulario tipo test para un camarero español que quiere aprender {language} sobre el tema \"{topic}\". Las preguntas deben ser prácticas (traducción de ingredientes, frases de cortesía, utensilios).",
      )),
      (AppMode::Cerveza, mode(
        "Eres un maestro cervecero y experto Zythosommelier, especializado en el sector Craft Beer (Cerveza Artesana) e Independiente en España.",
        "Genera {count} preguntas tipo test sobre CULTURA CERVECERA. Distribución: cultura general (20%): estilos, ingredientes, defectos, servicio; sector artesano nacional (30%); sector artesano regional de Murcia (50%): cerveceras, figuras, locales y premios. Idioma: ESPAÑOL.",
      )),
      (AppMode::Vino, mode(
        "Eres un experto Sommelier de prestigio internacional.",
        "Genera {count} preguntas tipo test sobre CULTURA DEL VINO. Temas: variedades de uva, D.O. importantes, vinificación, crianza, temperatura de servicio, cata y maridajes clásicos. Idioma: ESPAÑOL.",
      )),
      (AppMode::L43, mode(
        "Eres un embajador de marca de Licor 43 y experto en cultura gastronómica de Cartagena (Murcia).",
        "Genera {count} preguntas tipo test centradas en LICOR 43 y el CAFÉ ASIÁTICO: historia, receta auténtica del Café Asiático de Cartagena, coctelería moderna y maridajes dulces. Idioma: ESPAÑOL.",
      )),
      (AppMode::Cultura, mode(
        "Eres un historiador experto en gastronomía, sociología de los bares y la hostelería española.",
        "Genera {count} preguntas tipo test sobre CULTURA DE BAR y HOSTELERÍA: historia de bares y tabernas, origen de las tapas, tipos de establecimientos, cócteles clásicos, personajes del sector y locales premiados de la Región de Murcia. Idioma: ESPAÑOL.",
      )),
      (AppMode::Legal, mode(
        "Eres un abogado laboralista y asesor jurídico experto en el sector de la hostelería en España.",
        "Genera {count} preguntas tipo test sobre DERECHOS Y OBLIGACIONES LABORALES EN HOSTELERÍA según el Estatuto de los Trabajadores y el Convenio Colectivo de Hostelería de la Región de Murcia: jornada, descansos, vacaciones, clasificación profesional, régimen disciplinario, permisos retribuidos y contratación. Idioma: ESPAÑOL.",
      )),
    ]);

    Self {
      modes,
      sources_template: "BASE YOUR KNOWLEDGE STRICTLY ON THESE DATA SOURCES IF APPLICABLE: {sources}.".into(),
      general_sources: "Use general authoritative knowledge sources.".into(),
      footer: concat!(
        "IMPORTANTE: Las preguntas deben tener variedad de dificultad: 30% [Fácil], 40% [Medio], 30% [Difícil].\n",
        "Devuelve estrictamente un JSON con este esquema: ",
        "{\"questions\": [{\"id\": \"string\", \"questionText\": \"string\", \"options\": [\"string\", \"string\", \"string\", \"string\"], ",
        "\"correctAnswer\": \"string\", \"explanation\": \"string\", \"difficulty\": \"Fácil | Medio | Difícil\"}], ",
        "\"usedSources\": [\"string\"]}"
      ).into(),
      pronunciation_template: concat!(
        "Listen to the audio. The user is a Spanish speaker trying to say the phrase/word related to \"{word}\" in {language}. ",
        "Rate the pronunciation accuracy from 0 to 100. Provide a specific, actionable tip to improve (max 2 short sentences). ",
        "IMPORTANT: The feedback MUST be written in SPANISH. Return JSON: { \"score\": number, \"feedback\": string }"
      ).into(),
      speech_template: "Say the following phrase in {language} with a perfect accent: \"{text}\"".into(),
      voice_name: "Kore".into(),
    }
  }
}

impl Prompts {
  pub fn for_mode(&self, mode: AppMode) -> ModePrompt {
    self.modes.get(&mode).cloned().unwrap_or_else(|| {
      ModePrompt {
        system: "Eres un experto en hostelería.".into(),
        user: "Genera {count} preguntas de hostelería general.".into(),
      }
    })
  }
}

/// Parse a TOML document; defaults fill every missing section.
pub fn parse_config(text: &str) -> Result<QuizzConfig, toml::de::Error> {
  let mut cfg: QuizzConfig = toml::from_str(text)?;
  // Overrides replace individual modes, not the whole table.
  let mut modes = Prompts::default().modes;
  modes.append(&mut cfg.prompts.modes);
  cfg.prompts.modes = modes;
  Ok(cfg)
}

/// Attempt to load `QuizzConfig` from QUIZZ_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<QuizzConfig> {
  let path = std::env::var("QUIZZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "cdb_quizz_backend", %path, quizzes = cfg.quizzes.len(), "Loaded quiz config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "cdb_quizz_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "cdb_quizz_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

//! Seed data: initial quiz sources, the mock deck served when generation is
//! unavailable, the placeholder question and the mock leaderboard.

use std::collections::BTreeMap;

use crate::domain::{AppMode, Difficulty, Question, QuizSource, SourceType};

pub const BACKGROUND_PALETTE: &[(&str, &str)] = &[
  ("#FAF8EE", "Crema Retro"),
  ("#FFFFFF", "Blanco Puro"),
  ("#F0F4F8", "Gris Frío"),
  ("#FFF5F5", "Rosa Pálido"),
  ("#F0FFF4", "Menta Suave"),
];

fn src(id: &str, name: &str, source_type: SourceType, enabled: bool) -> QuizSource {
  QuizSource { id: id.into(), name: name.into(), source_type, enabled }
}

/// Sources every fresh profile starts with, per mode.
pub fn initial_sources() -> BTreeMap<AppMode, Vec<QuizSource>> {
  use SourceType::*;
  BTreeMap::from([
    (AppMode::Idiomas, vec![
      src("src_oxford", "Oxford Dictionary API", Api, true),
      src("src_cambridge", "Cambridge Hospitality Lexicon", Database, true),
      src("src_manual_en", "Manual Override (EN)", Manual, false),
    ]),
    (AppMode::Cerveza, vec![
      src("src_bjcp", "BJCP Guidelines 2021", Database, true),
      src("src_murcia_craft", "Asoc. Cerveceros Murcia", Api, true),
      src("src_untappd", "Untappd Trends", Api, false),
    ]),
    (AppMode::Vino, vec![
      src("src_parker", "Robert Parker Ratings", Database, true),
      src("src_do_spain", "D.O. España Oficial", Api, true),
    ]),
    (AppMode::L43, vec![
      src("src_zamora", "Zamora Company Archives", Manual, true),
      src("src_cartagena", "Cartagena History DB", Database, true),
    ]),
    (AppMode::Cultura, vec![
      src("src_repsol", "Guía Repsol", Api, true),
      src("src_michelin", "Michelin Guide Spain", Api, true),
      src("src_wiki_hist", "Wikipedia (History)", Api, false),
    ]),
    (AppMode::Legal, vec![
      src("src_estatuto", "Estatuto de los Trabajadores", Database, true),
      src("src_convenio_murcia", "Convenio Colectivo Hostelería Murcia", Database, true),
    ]),
  ])
}

fn question(id: &str, text: &str, options: [&str; 4], correct: &str, explanation: &str, difficulty: Difficulty) -> Question {
  Question {
    id: id.into(),
    question_text: text.into(),
    options: options.iter().map(|o| o.to_string()).collect(),
    correct_answer: correct.into(),
    explanation: explanation.into(),
    difficulty,
    tags: Vec::new(),
  }
}

/// Deck served by `/generate` when the generator is unavailable or fails.
pub fn mock_questions() -> Vec<Question> {
  vec![
    question(
      "q1",
      "What is the capital of France?",
      ["Paris", "Berlin", "Madrid", "Rome"],
      "Paris",
      "Paris is the capital and most populous city of France.",
      Difficulty::Easy,
    ),
    question(
      "q2",
      "Which planet is known as the Red Planet?",
      ["Earth", "Mars", "Jupiter", "Saturn"],
      "Mars",
      "Mars is often called the “Red Planet” because of its reddish appearance.",
      Difficulty::Medium,
    ),
    question(
      "q3",
      "In which year did the World War II end?",
      ["1940", "1942", "1945", "1948"],
      "1945",
      "World War II ended in 1945 with the surrender of the Axis powers.",
      Difficulty::Medium,
    ),
  ]
}

/// Single-card deck a session falls back to when generation fails, so the
/// state machine never stays in `loading`.
pub fn placeholder_question() -> Question {
  question(
    "err-1",
    "Error de conexión con el Chef IA.",
    ["Reintentar", "Esperar", "Salir", "Error"],
    "Reintentar",
    "Por favor comprueba tu conexión y API Key.",
    Difficulty::Easy,
  )
}

/// (nickname, xp, level, per-mode breakdown)
pub fn mock_leaderboard() -> Vec<(&'static str, u64, u32, BTreeMap<AppMode, u64>)> {
  use AppMode::*;
  vec![
    ("PierreGagnaire", 12500, 12, BTreeMap::from([(Idiomas, 2000), (Cerveza, 500), (Vino, 8000), (L43, 1000), (Cultura, 1000)])),
    ("GordonR", 8400, 8, BTreeMap::from([(Idiomas, 4000), (Cerveza, 3000), (Vino, 1000), (L43, 200), (Cultura, 200)])),
    ("MassimoB", 6200, 6, BTreeMap::from([(Idiomas, 1000), (Cerveza, 1000), (Vino, 2000), (L43, 1000), (Cultura, 1200)])),
    ("JoanRoca", 4100, 4, BTreeMap::from([(Idiomas, 500), (Cerveza, 500), (Vino, 500), (L43, 500), (Cultura, 2100)])),
  ]
}

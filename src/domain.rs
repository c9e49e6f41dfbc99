//! Domain models shared by the quiz core and the service: questions, modes,
//! history entries, quiz sources, settings and the static catalogs.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Question difficulty. Wire values are `easy|medium|hard`; the localized
/// labels produced by the generator (`Fácil|Medio|Difícil`) are accepted too.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  #[default]
  Medium,
  Hard,
}

impl Difficulty {
  /// Unknown labels fall back to `Medium`.
  pub fn from_label(label: &str) -> Self {
    match label.trim().to_lowercase().as_str() {
      "easy" | "fácil" | "facil" => Difficulty::Easy,
      "hard" | "difícil" | "dificil" => Difficulty::Hard,
      _ => Difficulty::Medium,
    }
  }

  pub fn label_es(&self) -> &'static str {
    match self {
      Difficulty::Easy => "Fácil",
      Difficulty::Medium => "Medio",
      Difficulty::Hard => "Difícil",
    }
  }
}

impl<'de> Deserialize<'de> for Difficulty {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Difficulty::from_label).unwrap_or_default())
  }
}

/// One multiple-choice question. Every field defaults so that a malformed
/// record from the generator still renders (empty) instead of failing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Question {
  pub id: String,
  pub question_text: String,
  pub options: Vec<String>,
  pub correct_answer: String,
  pub explanation: String,
  pub difficulty: Difficulty,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
}

impl Question {
  /// Exact, case- and whitespace-sensitive comparison.
  pub fn is_correct(&self, selected: &str) -> bool {
    selected == self.correct_answer
  }
}

/// Quiz application ("CdB_ ...") the user is playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppMode {
  Idiomas,
  Cerveza,
  Vino,
  L43,
  #[default]
  Cultura,
  Legal,
}

impl AppMode {
  pub const ALL: [AppMode; 6] = [
    AppMode::Cultura,
    AppMode::Legal,
    AppMode::L43,
    AppMode::Cerveza,
    AppMode::Vino,
    AppMode::Idiomas,
  ];

  pub fn display_name(&self) -> &'static str {
    match self {
      AppMode::Idiomas => "CdB_ Idiomas",
      AppMode::Cerveza => "CdB_ Cerveza",
      AppMode::Vino => "CdB_ Vino",
      AppMode::L43 => "CdB_ L43",
      AppMode::Cultura => "CdB_ Cultura de Bar",
      AppMode::Legal => "CdB_ Legal",
    }
  }

  /// Language learning needs a target language and a topic before starting.
  pub fn needs_language(&self) -> bool {
    matches!(self, AppMode::Idiomas)
  }
}

impl fmt::Display for AppMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.display_name())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
  #[serde(alias = "Inglés")]
  English,
  #[serde(alias = "Francés")]
  French,
}

impl Language {
  pub fn display_name(&self) -> &'static str {
    match self {
      Language::English => "Inglés",
      Language::French => "Francés",
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.display_name())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
  Ingredients,
  Dishes,
  Meat,
  Fish,
  Drinks,
  Service,
  Utensils,
}

impl Topic {
  pub const ALL: [Topic; 7] = [
    Topic::Ingredients,
    Topic::Dishes,
    Topic::Meat,
    Topic::Fish,
    Topic::Drinks,
    Topic::Service,
    Topic::Utensils,
  ];

  pub fn display_name(&self) -> &'static str {
    match self {
      Topic::Ingredients => "Ingredientes",
      Topic::Dishes => "Platos Típicos",
      Topic::Meat => "Carnes",
      Topic::Fish => "Pescados y Mariscos",
      Topic::Drinks => "Bebidas, Vinos y Cervezas",
      Topic::Service => "Atención al Cliente",
      Topic::Utensils => "Utensilios y Menaje",
    }
  }

  /// Minimum profile level that unlocks the topic.
  pub fn required_level(&self) -> u32 {
    match self {
      Topic::Service => 3,
      Topic::Utensils => 5,
      _ => 1,
    }
  }
}

impl fmt::Display for Topic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.display_name())
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
  #[default]
  Solo,
  Duel,
}

/// Immutable log record appended for every answered question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub question_id: String,
  pub question_text: String,
  pub selected_answer: String,
  pub correct_answer: String,
  pub is_correct: bool,
  /// Milliseconds since the Unix epoch.
  pub timestamp: i64,
  pub mode: AppMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
  #[serde(rename = "API")]
  Api,
  Database,
  Manual,
}

/// Named provenance tag shown to the user next to generated content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuizSource {
  pub id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub source_type: SourceType,
  pub enabled: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonLayout {
  #[default]
  Standard,
  Spread,
  Compact,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
  pub sound_enabled: bool,
  /// Hex color, one of `seeds::BACKGROUND_PALETTE`.
  pub background_color: String,
  pub button_layout: ButtonLayout,
  /// Card corner radius in px.
  pub card_border_radius: u32,
}

impl Default for AppSettings {
  fn default() -> Self {
    Self {
      sound_enabled: true,
      background_color: "#FAF8EE".into(),
      button_layout: ButtonLayout::Standard,
      card_border_radius: 24,
    }
  }
}

/// Static badge catalog entry. Unlocking depends only on the level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
  pub id: &'static str,
  pub icon: &'static str,
  pub name: &'static str,
  pub description: &'static str,
  pub unlocked_at_level: u32,
}

pub const BADGES: &[Badge] = &[
  Badge { id: "b1", icon: "🥚", name: "Aprendiz", description: "Nivel 1: El comienzo", unlocked_at_level: 1 },
  Badge { id: "b2", icon: "🥗", name: "Ayudante", description: "Nivel 3: Dominas lo básico", unlocked_at_level: 3 },
  Badge { id: "b3", icon: "🍷", name: "Sommelier", description: "Nivel 5: Experto en bebidas", unlocked_at_level: 5 },
  Badge { id: "b4", icon: "👨‍🍳", name: "Chef", description: "Nivel 10: Maestro de cocina", unlocked_at_level: 10 },
  Badge { id: "b5", icon: "👑", name: "Maître", description: "Nivel 20: Leyenda del servicio", unlocked_at_level: 20 },
];

/// Highest badge the level grants.
pub fn current_badge(level: u32) -> &'static Badge {
  BADGES
    .iter()
    .rev()
    .find(|b| level >= b.unlocked_at_level)
    .unwrap_or(&BADGES[0])
}

/// Avatar icons with the level that unlocks them.
pub const AVATARS: &[(&str, u32)] = &[
  ("🥚", 1), ("☕", 1), ("🥐", 2), ("🥗", 3), ("🍺", 3), ("🍔", 4),
  ("🍷", 5), ("🍇", 5), ("🍹", 6), ("🧀", 7), ("🍕", 8), ("🔪", 9),
  ("👨‍🍳", 10), ("🥩", 10), ("🦞", 12), ("🥂", 15), ("💎", 18), ("👑", 20),
];

pub fn avatar_unlocked(icon: &str, level: u32) -> bool {
  AVATARS.iter().any(|(a, gate)| *a == icon && *gate <= level)
}

/// Score and tip returned by the pronunciation evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PronunciationFeedback {
  pub score: f32,
  pub feedback: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_accepts_localized_labels() {
    let q: Question = serde_json::from_str(r#"{"id":"q1","difficulty":"Difícil"}"#).unwrap();
    assert_eq!(q.difficulty, Difficulty::Hard);
    let q: Question = serde_json::from_str(r#"{"id":"q1","difficulty":"whatever"}"#).unwrap();
    assert_eq!(q.difficulty, Difficulty::Medium);
    let q: Question = serde_json::from_str(r#"{"id":"q1"}"#).unwrap();
    assert_eq!(q.difficulty, Difficulty::Medium);
    assert!(q.options.is_empty());
  }

  #[test]
  fn correctness_is_exact() {
    let q = Question { correct_answer: "Paris".into(), ..Default::default() };
    assert!(q.is_correct("Paris"));
    assert!(!q.is_correct("paris"));
    assert!(!q.is_correct("Paris "));
  }

  #[test]
  fn badge_for_level() {
    assert_eq!(current_badge(1).id, "b1");
    assert_eq!(current_badge(4).id, "b2");
    assert_eq!(current_badge(25).id, "b5");
  }

  #[test]
  fn avatars_are_level_gated() {
    assert!(avatar_unlocked("☕", 1));
    assert!(!avatar_unlocked("👑", 19));
    assert!(avatar_unlocked("👑", 20));
    assert!(!avatar_unlocked("🦄", 50));
  }
}

//! Profile and progression model.
//!
//! A `Profile` is the only persisted piece of client state. Every mutation is
//! a pure function from the current profile to a new one; callers replace the
//! whole snapshot and persist it (write-through, whole object).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::{
  avatar_unlocked, AppMode, AppSettings, HistoryEntry, Question, QuizSource, SourceType, BADGES,
};
use crate::seeds::{initial_sources, BACKGROUND_PALETTE};

pub const XP_PER_LEVEL: u64 = 500;
pub const XP_PER_CORRECT: u64 = 50;
pub const XP_PER_INCORRECT: u64 = 5;
pub const HISTORY_CAP: usize = 100;
pub const NICKNAME_MAX_CHARS: usize = 15;

/// `floor(xp / 500) + 1`, saturating at `u32::MAX`.
pub fn level_for_xp(xp: u64) -> u32 {
  u32::try_from(xp / XP_PER_LEVEL).unwrap_or(u32::MAX).saturating_add(1)
}

pub fn xp_for_answer(correct: bool) -> u64 {
  if correct { XP_PER_CORRECT } else { XP_PER_INCORRECT }
}

/// Persisted user profile. Fields missing from an older snapshot take the
/// value of the initial profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
  pub nickname: String,
  pub selected_avatar: String,
  pub total_correct: u64,
  pub total_time_seconds: f64,
  pub xp: u64,
  pub level: u32,
  /// Unlocked badge ids, in unlock order. Never shrinks.
  pub badges: Vec<String>,
  /// Oldest first, at most `HISTORY_CAP` entries.
  pub history: Vec<HistoryEntry>,
  pub xp_breakdown: BTreeMap<AppMode, u64>,
  pub settings: AppSettings,
  pub quiz_sources: BTreeMap<AppMode, Vec<QuizSource>>,
}

impl Default for Profile {
  fn default() -> Self {
    Self {
      nickname: "CamareroNovato".into(),
      selected_avatar: "🥚".into(),
      total_correct: 0,
      total_time_seconds: 0.0,
      xp: 0,
      level: 1,
      badges: BADGES.iter().filter(|b| b.unlocked_at_level <= 1).map(|b| b.id.to_string()).collect(),
      history: Vec::new(),
      xp_breakdown: BTreeMap::new(),
      settings: AppSettings::default(),
      quiz_sources: initial_sources(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileError {
  EmptyNickname,
  AvatarLocked(String),
  EmptySourceName,
  UnknownBackground(String),
}

impl fmt::Display for ProfileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProfileError::EmptyNickname => f.write_str("nickname must not be empty"),
      ProfileError::AvatarLocked(a) => write!(f, "avatar {a} is not unlocked yet"),
      ProfileError::EmptySourceName => f.write_str("source name must not be empty"),
      ProfileError::UnknownBackground(c) => write!(f, "unknown background color {c}"),
    }
  }
}

impl std::error::Error for ProfileError {}

impl Profile {
  /// Record one answered question: XP (total and per mode), level, capped
  /// history, cumulative correct count and played time.
  pub fn add_answer_result(
    &self,
    question: &Question,
    selected: &str,
    mode: AppMode,
    elapsed_seconds: f64,
    timestamp: i64,
  ) -> Profile {
    let correct = question.is_correct(selected);
    let gained = xp_for_answer(correct);

    let mut next = self.clone();
    next.xp = next.xp.saturating_add(gained);
    let mode_xp = next.xp_breakdown.entry(mode).or_insert(0);
    *mode_xp = mode_xp.saturating_add(gained);
    next.level = level_for_xp(next.xp);
    next.total_time_seconds += elapsed_seconds.max(0.0);
    if correct {
      next.total_correct = next.total_correct.saturating_add(1);
    }
    next.history.push(HistoryEntry {
      question_id: question.id.clone(),
      question_text: question.question_text.clone(),
      selected_answer: selected.to_string(),
      correct_answer: question.correct_answer.clone(),
      is_correct: correct,
      timestamp,
      mode,
    });
    if next.history.len() > HISTORY_CAP {
      let overflow = next.history.len() - HISTORY_CAP;
      next.history.drain(..overflow);
    }
    next
  }

  /// Add every badge the current level grants. Idempotent, never removes.
  pub fn recompute_badges(&self) -> Profile {
    let mut next = self.clone();
    for badge in BADGES {
      if next.level >= badge.unlocked_at_level && !next.badges.iter().any(|b| b == badge.id) {
        next.badges.push(badge.id.to_string());
      }
    }
    next
  }

  /// Remove one mode's XP and history. Badges and other modes are untouched.
  pub fn reset_mode_stats(&self, mode: AppMode) -> Profile {
    let mut next = self.clone();
    let mode_xp = next.xp_breakdown.remove(&mode).unwrap_or(0);
    next.xp = next.xp.saturating_sub(mode_xp);
    next.level = level_for_xp(next.xp);
    next.history.retain(|h| h.mode != mode);
    next
  }

  pub fn toggle_quiz_source(&self, mode: AppMode, source_id: &str) -> Profile {
    let mut next = self.clone();
    if let Some(sources) = next.quiz_sources.get_mut(&mode) {
      for s in sources.iter_mut().filter(|s| s.id == source_id) {
        s.enabled = !s.enabled;
      }
    }
    next
  }

  /// Append a manual, enabled source typed by the user.
  pub fn add_quiz_source(&self, mode: AppMode, name: &str) -> Result<Profile, ProfileError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(ProfileError::EmptySourceName);
    }
    let mut next = self.clone();
    next.quiz_sources.entry(mode).or_default().push(QuizSource {
      id: format!("src_manual_{}", Uuid::new_v4().simple()),
      name: name.to_string(),
      source_type: SourceType::Manual,
      enabled: true,
    });
    Ok(next)
  }

  /// Append sources reported by the generator that are not present yet
  /// (case-insensitive name match). Existing entries keep their state.
  pub fn merge_discovered_sources(&self, mode: AppMode, reported: &[String]) -> Profile {
    let mut next = self.clone();
    let sources = next.quiz_sources.entry(mode).or_default();
    for name in reported {
      let name = name.trim();
      if name.is_empty() {
        continue;
      }
      let lower = name.to_lowercase();
      if sources.iter().any(|s| s.name.to_lowercase() == lower) {
        continue;
      }
      sources.push(QuizSource {
        id: format!("src_ai_{}", Uuid::new_v4().simple()),
        name: name.to_string(),
        source_type: SourceType::Api,
        enabled: true,
      });
    }
    next
  }

  pub fn enabled_source_names(&self, mode: AppMode) -> Vec<String> {
    self
      .quiz_sources
      .get(&mode)
      .map(|list| list.iter().filter(|s| s.enabled).map(|s| s.name.clone()).collect())
      .unwrap_or_default()
  }

  /// Nickname is trimmed and cut to 15 chars; the avatar must be unlocked.
  pub fn edit_identity(&self, nickname: &str, avatar: &str) -> Result<Profile, ProfileError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
      return Err(ProfileError::EmptyNickname);
    }
    if !avatar_unlocked(avatar, self.level) {
      return Err(ProfileError::AvatarLocked(avatar.to_string()));
    }
    let mut next = self.clone();
    next.nickname = nickname.chars().take(NICKNAME_MAX_CHARS).collect();
    next.selected_avatar = avatar.to_string();
    Ok(next)
  }

  pub fn with_settings(&self, settings: AppSettings) -> Result<Profile, ProfileError> {
    if !BACKGROUND_PALETTE.iter().any(|(c, _)| c.eq_ignore_ascii_case(&settings.background_color)) {
      return Err(ProfileError::UnknownBackground(settings.background_color));
    }
    let mut next = self.clone();
    next.settings = settings;
    Ok(next)
  }

  /// XP earned inside the current level (progress bar numerator).
  pub fn xp_into_level(&self) -> u64 {
    self.xp % XP_PER_LEVEL
  }

  /// Bring a freshly loaded snapshot back to a consistent state.
  pub fn normalized(mut self) -> Profile {
    self.level = level_for_xp(self.xp);
    if self.history.len() > HISTORY_CAP {
      let overflow = self.history.len() - HISTORY_CAP;
      self.history.drain(..overflow);
    }
    self.recompute_badges()
  }
}

/// Commands accepted by the profile reducer.
#[derive(Clone, Debug)]
pub enum ProfileCommand {
  RecordAnswer {
    question: Question,
    selected: String,
    mode: AppMode,
    elapsed_seconds: f64,
    timestamp: i64,
  },
  ResetModeStats(AppMode),
  /// Replaces the whole profile with the initial snapshot. Callers gate it
  /// behind an explicit confirmation.
  ResetProfile,
  ToggleSource { mode: AppMode, source_id: String },
  AddSource { mode: AppMode, name: String },
  MergeDiscoveredSources { mode: AppMode, names: Vec<String> },
  EditIdentity { nickname: String, avatar: String },
  UpdateSettings(AppSettings),
  ToggleSound,
}

/// Reducer: current profile + command -> next profile, badges recomputed.
#[instrument(level = "debug", skip(profile), fields(xp = profile.xp))]
pub fn apply(profile: &Profile, command: ProfileCommand) -> Result<Profile, ProfileError> {
  let next = match command {
    ProfileCommand::RecordAnswer { question, selected, mode, elapsed_seconds, timestamp } => {
      profile.add_answer_result(&question, &selected, mode, elapsed_seconds, timestamp)
    }
    ProfileCommand::ResetModeStats(mode) => profile.reset_mode_stats(mode),
    ProfileCommand::ResetProfile => Profile::default(),
    ProfileCommand::ToggleSource { mode, source_id } => profile.toggle_quiz_source(mode, &source_id),
    ProfileCommand::AddSource { mode, name } => profile.add_quiz_source(mode, &name)?,
    ProfileCommand::MergeDiscoveredSources { mode, names } => profile.merge_discovered_sources(mode, &names),
    ProfileCommand::EditIdentity { nickname, avatar } => profile.edit_identity(&nickname, &avatar)?,
    ProfileCommand::UpdateSettings(settings) => profile.with_settings(settings)?,
    ProfileCommand::ToggleSound => {
      let mut next = profile.clone();
      next.settings.sound_enabled = !next.settings.sound_enabled;
      next
    }
  };
  let next = next.recompute_badges();
  if next.level != profile.level {
    debug!(target: "profile", from = profile.level, to = next.level, "Level changed");
  }
  Ok(next)
}

//! Quiz session state machine.
//!
//! `QuizMachine` is pure: it consumes `Event`s and returns the `Effect`s the
//! host must run (schedule or cancel timers, call the question source,
//! persist the profile, post the finished session). It never sleeps, spawns
//! or draws random numbers; timer ticks arrive as events carrying the roll
//! the host drew for them.
//!
//! Views and the allowed transitions between them:
//!
//! ```text
//! intro -> profile -> setup -> loading -> playing -> results -> profile
//!          profile <-> menu | leaderboard | history | admin
//!          setup | loading | playing -> profile   (back / quit)
//! ```
//!
//! Timers belong to the view that armed them and are cancelled when it is
//! left. Ticks whose token is no longer armed are dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::card::{CardGesture, CardOutcome, Direction, Point, SwipeHints};
use crate::deck::{CardView, Deck};
use crate::domain::{
  current_badge, AppMode, AppSettings, Badge, GameMode, HistoryEntry, Language, PronunciationFeedback, Question,
  QuizSource, Topic,
};
use crate::duel::{default_opponent, invite_url, opponent_by_id, ChallengeStatus, Opponent, CHALLENGE_CONNECT_DELAY,
  CHALLENGE_SECONDS, CHALLENGE_TICK, FRIEND_OPPONENT};
use crate::leaderboard::{self, LeaderboardRow};
use crate::profile::{self, Profile, ProfileCommand, XP_PER_CORRECT, XP_PER_LEVEL};
use crate::protocol::FinishPayload;
use crate::source::{fallback_deck, GenerateRequest, LoadedDeck};
use crate::timer::{Schedule, TimerBook, TimerKind, TimerToken};
use crate::util::{format_play_time, now_millis};

pub const INTRO_DELAY: Duration = Duration::from_secs(4);
pub const STOPWATCH_TICK: Duration = Duration::from_millis(100);
pub const MODAL_EXIT: Duration = Duration::from_millis(400);

pub const MICROPHONE_DENIED: &str = "No se pudo acceder al micrófono. Revisa los permisos del navegador.";
pub const SOUND_DISABLED: &str = "El sonido está desactivado en los ajustes.";
pub const SPEECH_FAILED: &str = "No se pudo reproducir el audio.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
  Intro,
  Profile,
  Menu,
  Setup,
  Loading,
  Playing,
  Results,
  Leaderboard,
  History,
  Admin,
}

impl ViewKind {
  /// Transition table.
  pub fn can_enter(self, to: ViewKind) -> bool {
    use ViewKind::*;
    matches!(
      (self, to),
      (Intro, Profile)
        | (Profile, Menu | Setup | Leaderboard | History | Admin)
        | (Menu | Leaderboard | History | Admin | Setup | Loading | Playing | Results, Profile)
        | (Setup, Loading)
        | (Loading, Playing)
        | (Playing, Results)
    )
  }
}

impl fmt::Display for ViewKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ViewKind::Intro => "intro",
      ViewKind::Profile => "profile",
      ViewKind::Menu => "menu",
      ViewKind::Setup => "setup",
      ViewKind::Loading => "loading",
      ViewKind::Playing => "playing",
      ViewKind::Results => "results",
      ViewKind::Leaderboard => "leaderboard",
      ViewKind::History => "history",
      ViewKind::Admin => "admin",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionError {
  Illegal { from: ViewKind, to: ViewKind },
  /// The event has no meaning in the current view.
  Unexpected { view: ViewKind, event: &'static str },
}

impl fmt::Display for TransitionError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TransitionError::Illegal { from, to } => write!(f, "illegal transition {from} -> {to}"),
      TransitionError::Unexpected { view, event } => write!(f, "event {event} not accepted in {view}"),
    }
  }
}

impl std::error::Error for TransitionError {}

/// User input, as sent by the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Input {
  Play,
  OpenMenu,
  SelectMode { mode: AppMode },
  OpenLeaderboard,
  OpenHistory,
  OpenAdmin,
  Back,
  Quit,
  SelectLanguage { language: Language },
  SelectTopic { topic: Topic },
  SelectGameMode { game_mode: GameMode },
  SelectOpponent { opponent_id: String },
  StartChallenge,
  SendChallenge,
  Start,
  PointerDown {
    #[serde(default)]
    stack_index: usize,
    x: f32,
    y: f32,
  },
  PointerMove { x: f32, y: f32 },
  PointerUp,
  Trigger {
    direction: Direction,
    #[serde(default)]
    stack_index: usize,
  },
  Answer { option: String },
  Continue,
  StartRecording,
  StopRecording { audio_base64: String },
  MicrophoneDenied,
  PlayPronunciation,
  LeaderboardTab { tab: Option<AppMode> },
  EditProfile { nickname: String, avatar: String },
  ToggleSound,
  UpdateSettings { settings: AppSettings },
  ToggleSource { mode: AppMode, source_id: String },
  AddSource { mode: AppMode, name: String },
  RequestStatsReset { mode: AppMode },
  RequestProfileReset,
  Confirm,
  Cancel,
}

impl Input {
  pub fn name(&self) -> &'static str {
    match self {
      Input::Play => "play",
      Input::OpenMenu => "open_menu",
      Input::SelectMode { .. } => "select_mode",
      Input::OpenLeaderboard => "open_leaderboard",
      Input::OpenHistory => "open_history",
      Input::OpenAdmin => "open_admin",
      Input::Back => "back",
      Input::Quit => "quit",
      Input::SelectLanguage { .. } => "select_language",
      Input::SelectTopic { .. } => "select_topic",
      Input::SelectGameMode { .. } => "select_game_mode",
      Input::SelectOpponent { .. } => "select_opponent",
      Input::StartChallenge => "start_challenge",
      Input::SendChallenge => "send_challenge",
      Input::Start => "start",
      Input::PointerDown { .. } => "pointer_down",
      Input::PointerMove { .. } => "pointer_move",
      Input::PointerUp => "pointer_up",
      Input::Trigger { .. } => "trigger",
      Input::Answer { .. } => "answer",
      Input::Continue => "continue",
      Input::StartRecording => "start_recording",
      Input::StopRecording { .. } => "stop_recording",
      Input::MicrophoneDenied => "microphone_denied",
      Input::PlayPronunciation => "play_pronunciation",
      Input::LeaderboardTab { .. } => "leaderboard_tab",
      Input::EditProfile { .. } => "edit_profile",
      Input::ToggleSound => "toggle_sound",
      Input::UpdateSettings { .. } => "update_settings",
      Input::ToggleSource { .. } => "toggle_source",
      Input::AddSource { .. } => "add_source",
      Input::RequestStatsReset { .. } => "request_stats_reset",
      Input::RequestProfileReset => "request_profile_reset",
      Input::Confirm => "confirm",
      Input::Cancel => "cancel",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  Input(Input),
  /// `roll` is uniform in `[0, 1)`; only opponent ticks use it.
  Timer { token: TimerToken, roll: f64 },
  QuestionsLoaded { request: u64, deck: LoadedDeck },
  PronunciationScored(PronunciationFeedback),
  SpeechFinished { ok: bool },
}

impl Event {
  pub fn name(&self) -> &'static str {
    match self {
      Event::Input(input) => input.name(),
      Event::Timer { .. } => "timer",
      Event::QuestionsLoaded { .. } => "questions_loaded",
      Event::PronunciationScored(_) => "pronunciation_scored",
      Event::SpeechFinished { .. } => "speech_finished",
    }
  }
}

impl From<Input> for Event {
  fn from(input: Input) -> Self {
    Event::Input(input)
  }
}

/// Work the host performs on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
  Schedule { token: TimerToken, schedule: Schedule },
  Cancel(TimerToken),
  /// Answer with `Event::QuestionsLoaded` carrying the same `request`.
  Generate { request: u64, req: GenerateRequest },
  /// Answer with `Event::PronunciationScored`.
  EvaluatePronunciation { audio_base64: String, word: String, language: Language },
  /// Answer with `Event::SpeechFinished`.
  FetchSpeech { text: String, language: Language },
  SaveProfile(Profile),
  Finish(FinishPayload),
  Alert(String),
  OpenUrl(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupState {
  pub mode: AppMode,
  pub language: Option<Language>,
  pub topic: Option<Topic>,
  pub game_mode: GameMode,
  pub opponent: Opponent,
  pub challenge: ChallengeStatus,
}

impl SetupState {
  fn new(mode: AppMode) -> Self {
    Self {
      mode,
      language: None,
      topic: None,
      game_mode: GameMode::Solo,
      opponent: default_opponent(),
      challenge: ChallengeStatus::Idle,
    }
  }

  /// Language learning needs both a language and a topic.
  pub fn can_start(&self) -> bool {
    !self.mode.needs_language() || (self.language.is_some() && self.topic.is_some())
  }

  fn config(&self) -> SessionConfig {
    SessionConfig {
      mode: self.mode,
      language: self.language,
      topic: self.topic,
      game_mode: self.game_mode,
      opponent: (self.game_mode == GameMode::Duel).then_some(self.opponent),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
  pub mode: AppMode,
  pub language: Option<Language>,
  pub topic: Option<Topic>,
  pub game_mode: GameMode,
  pub opponent: Option<Opponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PronunciationState {
  Idle,
  Recording,
  Evaluating,
  Scored(PronunciationFeedback),
}

/// The answering modal opened by an "up" commit.
#[derive(Debug, Clone)]
pub struct AnswerModal {
  question: Question,
  elapsed_ds: u32,
  selected: Option<String>,
  exiting: bool,
  pronunciation: PronunciationState,
  speaking: bool,
}

impl AnswerModal {
  fn new(question: Question) -> Self {
    Self {
      question,
      elapsed_ds: 0,
      selected: None,
      exiting: false,
      pronunciation: PronunciationState::Idle,
      speaking: false,
    }
  }

  pub fn question(&self) -> &Question {
    &self.question
  }

  pub fn elapsed_seconds(&self) -> f64 {
    self.elapsed_ds as f64 / 10.0
  }

  pub fn selected(&self) -> Option<&str> {
    self.selected.as_deref()
  }

  pub fn pronunciation(&self) -> &PronunciationState {
    &self.pronunciation
  }
}

#[derive(Debug, Clone)]
pub struct PlayState {
  config: SessionConfig,
  deck: Deck,
  gesture: CardGesture,
  score: u32,
  answered: u32,
  opponent_score: u32,
  opponent_last_hit: Option<i64>,
  modal: Option<AnswerModal>,
  started_at: i64,
  used_sources: Vec<String>,
  fallback: bool,
  history: Vec<HistoryEntry>,
}

impl PlayState {
  fn new(config: SessionConfig, loaded: LoadedDeck, now: i64) -> Self {
    Self {
      config,
      deck: Deck::new(loaded.questions),
      gesture: CardGesture::default(),
      score: 0,
      answered: 0,
      opponent_score: 0,
      opponent_last_hit: None,
      modal: None,
      started_at: now,
      used_sources: loaded.used_sources,
      fallback: loaded.fallback,
      history: Vec::new(),
    }
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  pub fn deck(&self) -> &Deck {
    &self.deck
  }

  pub fn score(&self) -> u32 {
    self.score
  }

  pub fn answered(&self) -> u32 {
    self.answered
  }

  pub fn opponent_score(&self) -> u32 {
    self.opponent_score
  }

  pub fn modal(&self) -> Option<&AnswerModal> {
    self.modal.as_ref()
  }

  pub fn gesture(&self) -> &CardGesture {
    &self.gesture
  }

  /// Right discards, left and down requeue. Returns true when exhausted.
  fn resolve_swipe(&mut self, direction: Direction) -> bool {
    match direction {
      Direction::Right => self.deck.discard(),
      Direction::Left | Direction::Down => self.deck.defer(),
      Direction::Up => {}
    }
    debug!(target: "session", ?direction, index = self.deck.index(), len = self.deck.len(), "Card resolved");
    self.deck.is_exhausted()
  }

  fn finish_payload(&self, slug: &str, now: i64) -> FinishPayload {
    FinishPayload {
      slug: slug.to_string(),
      app_mode: self.config.mode,
      language: self.config.language,
      topic: self.config.topic,
      duration_seconds: ((now - self.started_at).max(0) / 1000) as u64,
      score: self.score,
      questions: self.deck.questions().to_vec(),
      history: self.history.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsState {
  pub score: u32,
  pub answered: u32,
  pub total: usize,
  pub game_mode: GameMode,
  pub opponent: Option<Opponent>,
  pub opponent_score: u32,
  pub victory: bool,
  pub duration_seconds: u64,
  pub share_text: String,
  pub fallback: bool,
}

impl ResultsState {
  fn from_play(play: &PlayState, duration_seconds: u64) -> Self {
    let victory = match play.config.game_mode {
      GameMode::Duel => play.score > play.opponent_score,
      GameMode::Solo => (play.score as usize) * 2 >= play.deck.len(),
    };
    Self {
      score: play.score,
      answered: play.answered,
      total: play.deck.len(),
      game_mode: play.config.game_mode,
      opponent: play.config.opponent,
      opponent_score: play.opponent_score,
      victory,
      duration_seconds,
      share_text: share_text(play.score),
      fallback: play.fallback,
    }
  }
}

pub fn share_text(score: u32) -> String {
  format!(
    "¡He conseguido {score} aciertos y he ganado {} XP en CdB_ Quizz! 🍻",
    score as u64 * XP_PER_CORRECT
  )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "mode", rename_all = "snake_case")]
pub enum PendingReset {
  ModeStats(AppMode),
  Profile,
}

#[derive(Debug, Clone)]
pub enum ViewState {
  Intro,
  Profile,
  Menu,
  Setup(SetupState),
  Loading { request: u64, config: SessionConfig },
  Playing(Box<PlayState>),
  Results(ResultsState),
  Leaderboard { tab: Option<AppMode> },
  History,
  Admin { pending: Option<PendingReset> },
}

impl ViewState {
  pub fn kind(&self) -> ViewKind {
    match self {
      ViewState::Intro => ViewKind::Intro,
      ViewState::Profile => ViewKind::Profile,
      ViewState::Menu => ViewKind::Menu,
      ViewState::Setup(_) => ViewKind::Setup,
      ViewState::Loading { .. } => ViewKind::Loading,
      ViewState::Playing(_) => ViewKind::Playing,
      ViewState::Results(_) => ViewKind::Results,
      ViewState::Leaderboard { .. } => ViewKind::Leaderboard,
      ViewState::History => ViewKind::History,
      ViewState::Admin { .. } => ViewKind::Admin,
    }
  }
}

fn arm(timers: &mut TimerBook, kind: TimerKind, schedule: Schedule, fx: &mut Vec<Effect>) -> TimerToken {
  let (token, replaced) = timers.arm(kind);
  if let Some(old) = replaced {
    fx.push(Effect::Cancel(old));
  }
  fx.push(Effect::Schedule { token, schedule });
  token
}

fn disarm(timers: &mut TimerBook, kind: TimerKind, fx: &mut Vec<Effect>) {
  if let Some(token) = timers.disarm(kind) {
    fx.push(Effect::Cancel(token));
  }
}

/// One user's live quiz session.
#[derive(Debug, Clone)]
pub struct QuizMachine {
  view: ViewState,
  profile: Profile,
  mode: AppMode,
  slug: String,
  timers: TimerBook,
  next_request: u64,
}

impl QuizMachine {
  pub fn new(profile: Profile, slug: impl Into<String>) -> Self {
    Self {
      view: ViewState::Intro,
      profile,
      mode: AppMode::default(),
      slug: slug.into(),
      timers: TimerBook::default(),
      next_request: 0,
    }
  }

  /// Mode the profile view starts in.
  pub fn with_mode(mut self, mode: AppMode) -> Self {
    self.mode = mode;
    self
  }

  /// Effects to run once the machine is mounted (the intro delay).
  pub fn start(&mut self) -> Vec<Effect> {
    let mut fx = Vec::new();
    if self.view.kind() == ViewKind::Intro {
      arm(&mut self.timers, TimerKind::IntroDelay, Schedule::Once(INTRO_DELAY), &mut fx);
    }
    fx
  }

  pub fn view(&self) -> &ViewState {
    &self.view
  }

  pub fn view_kind(&self) -> ViewKind {
    self.view.kind()
  }

  pub fn profile(&self) -> &Profile {
    &self.profile
  }

  pub fn mode(&self) -> AppMode {
    self.mode
  }

  pub fn play(&self) -> Option<&PlayState> {
    match &self.view {
      ViewState::Playing(play) => Some(play),
      _ => None,
    }
  }

  pub fn results(&self) -> Option<&ResultsState> {
    match &self.view {
      ViewState::Results(r) => Some(r),
      _ => None,
    }
  }

  pub fn timers(&self) -> &TimerBook {
    &self.timers
  }

  pub fn handle(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
    self.handle_at(event, now_millis())
  }

  /// Feed one event; `now` is wall-clock milliseconds.
  pub fn handle_at(&mut self, event: Event, now: i64) -> Result<Vec<Effect>, TransitionError> {
    if let Event::Timer { token, .. } = &event {
      if !self.timers.is_live(*token) {
        trace!(target: "session", ?token, "Stale timer tick dropped");
        return Ok(Vec::new());
      }
      if token.kind.is_one_shot() {
        self.timers.disarm(token.kind);
      }
    }

    let view = self.view.kind();
    let result = match view {
      ViewKind::Intro => self.on_intro(event),
      ViewKind::Profile | ViewKind::Menu | ViewKind::Leaderboard | ViewKind::History | ViewKind::Admin => {
        self.on_hub(event)
      }
      ViewKind::Setup => self.on_setup(event),
      ViewKind::Loading => self.on_loading(event, now),
      ViewKind::Playing => self.on_playing(event, now),
      ViewKind::Results => self.on_results(event),
    };
    if let Err(e) = &result {
      warn!(target: "session", error = %e, "Event rejected");
    }
    result
  }

  fn enter(&mut self, next: ViewState) -> Result<(), TransitionError> {
    let (from, to) = (self.view.kind(), next.kind());
    if !from.can_enter(to) {
      return Err(TransitionError::Illegal { from, to });
    }
    info!(target: "session", %from, %to, "View transition");
    self.view = next;
    Ok(())
  }

  fn update_profile(&mut self, command: ProfileCommand, fx: &mut Vec<Effect>) {
    match profile::apply(&self.profile, command) {
      Ok(next) => {
        if next != self.profile {
          self.profile = next;
          fx.push(Effect::SaveProfile(self.profile.clone()));
        }
      }
      Err(e) => {
        warn!(target: "profile", error = %e, "Profile update rejected");
        fx.push(Effect::Alert(e.to_string()));
      }
    }
  }

  /// Late async results and ticks for views that are gone are harmless.
  fn ignorable(event: &Event) -> bool {
    matches!(
      event,
      Event::Timer { .. } | Event::QuestionsLoaded { .. } | Event::PronunciationScored(_) | Event::SpeechFinished { .. }
    )
  }

  fn unexpected(&self, event: &Event) -> Result<Vec<Effect>, TransitionError> {
    if Self::ignorable(event) {
      debug!(target: "session", event = event.name(), view = %self.view.kind(), "Late event ignored");
      return Ok(Vec::new());
    }
    Err(TransitionError::Unexpected { view: self.view.kind(), event: event.name() })
  }

  fn on_intro(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
    match event {
      Event::Timer { token, .. } if token.kind == TimerKind::IntroDelay => {
        self.enter(ViewState::Profile)?;
        Ok(Vec::new())
      }
      other => self.unexpected(&other),
    }
  }

  /// Profile and its detours (menu, leaderboard, history, admin).
  fn on_hub(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
    let mut fx = Vec::new();
    let view = self.view.kind();
    let input = match event {
      Event::Input(input) => input,
      other => return self.unexpected(&other),
    };

    match (view, input) {
      (ViewKind::Profile, Input::Play) => self.enter(ViewState::Setup(SetupState::new(self.mode)))?,
      (ViewKind::Profile, Input::OpenMenu) => self.enter(ViewState::Menu)?,
      (ViewKind::Profile, Input::OpenLeaderboard) => self.enter(ViewState::Leaderboard { tab: None })?,
      (ViewKind::Profile, Input::OpenHistory) => self.enter(ViewState::History)?,
      (ViewKind::Profile, Input::OpenAdmin) => self.enter(ViewState::Admin { pending: None })?,

      (ViewKind::Menu, Input::SelectMode { mode }) => {
        self.mode = mode;
        info!(target: "session", ?mode, "Mode selected");
        self.enter(ViewState::Profile)?;
      }
      (ViewKind::Leaderboard, Input::LeaderboardTab { tab }) => self.view = ViewState::Leaderboard { tab },
      (ViewKind::Menu | ViewKind::Leaderboard | ViewKind::History | ViewKind::Admin, Input::Back) => {
        self.enter(ViewState::Profile)?
      }

      (ViewKind::Profile | ViewKind::Admin, Input::EditProfile { nickname, avatar }) => {
        self.update_profile(ProfileCommand::EditIdentity { nickname, avatar }, &mut fx)
      }
      (ViewKind::Profile | ViewKind::Admin, Input::ToggleSound) => {
        self.update_profile(ProfileCommand::ToggleSound, &mut fx)
      }
      (ViewKind::Admin, Input::UpdateSettings { settings }) => {
        self.update_profile(ProfileCommand::UpdateSettings(settings), &mut fx)
      }
      (ViewKind::Admin, Input::ToggleSource { mode, source_id }) => {
        self.update_profile(ProfileCommand::ToggleSource { mode, source_id }, &mut fx)
      }
      (ViewKind::Admin, Input::AddSource { mode, name }) => {
        self.update_profile(ProfileCommand::AddSource { mode, name }, &mut fx)
      }
      (ViewKind::Admin, Input::RequestStatsReset { mode }) => {
        self.view = ViewState::Admin { pending: Some(PendingReset::ModeStats(mode)) }
      }
      (ViewKind::Admin, Input::RequestProfileReset) => {
        self.view = ViewState::Admin { pending: Some(PendingReset::Profile) }
      }
      (ViewKind::Admin, Input::Cancel) => self.view = ViewState::Admin { pending: None },
      (ViewKind::Admin, Input::Confirm) => {
        let pending = match &self.view {
          ViewState::Admin { pending } => *pending,
          _ => None,
        };
        self.view = ViewState::Admin { pending: None };
        match pending {
          Some(PendingReset::ModeStats(mode)) => {
            info!(target: "profile", ?mode, "Mode stats reset confirmed");
            self.update_profile(ProfileCommand::ResetModeStats(mode), &mut fx)
          }
          Some(PendingReset::Profile) => {
            info!(target: "profile", "Profile reset confirmed");
            self.update_profile(ProfileCommand::ResetProfile, &mut fx)
          }
          None => {}
        }
      }

      (_, input) => return self.unexpected(&Event::Input(input)),
    }
    Ok(fx)
  }

  fn on_setup(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
    let mut fx = Vec::new();
    let level = self.profile.level;
    let ViewState::Setup(setup) = &mut self.view else {
      return Err(TransitionError::Unexpected { view: ViewKind::Setup, event: event.name() });
    };

    let mut next = None;
    match event {
      Event::Input(Input::SelectLanguage { language }) => setup.language = Some(language),
      Event::Input(Input::SelectTopic { topic }) => {
        if topic.required_level() > level {
          fx.push(Effect::Alert(format!(
            "{} se desbloquea en el nivel {}.",
            topic.display_name(),
            topic.required_level()
          )));
        } else {
          setup.topic = Some(topic);
        }
      }
      Event::Input(Input::SelectGameMode { game_mode }) => {
        if game_mode != GameMode::Duel && setup.challenge != ChallengeStatus::Idle {
          disarm(&mut self.timers, TimerKind::ChallengeCountdown, &mut fx);
          disarm(&mut self.timers, TimerKind::ChallengeConnect, &mut fx);
          setup.challenge = ChallengeStatus::Idle;
          setup.opponent = default_opponent();
        }
        setup.game_mode = game_mode;
      }
      Event::Input(Input::SelectOpponent { opponent_id }) => match opponent_by_id(&opponent_id) {
        Some(op) if op.id != FRIEND_OPPONENT.id && !setup.challenge.is_active() => setup.opponent = op,
        _ => debug!(target: "session", %opponent_id, "Opponent selection ignored"),
      },
      Event::Input(Input::StartChallenge) => {
        if !setup.challenge.is_active() {
          setup.game_mode = GameMode::Duel;
          setup.challenge = ChallengeStatus::Counting { remaining: CHALLENGE_SECONDS };
          disarm(&mut self.timers, TimerKind::ChallengeConnect, &mut fx);
          arm(&mut self.timers, TimerKind::ChallengeCountdown, Schedule::Every(CHALLENGE_TICK), &mut fx);
          info!(target: "session", seconds = CHALLENGE_SECONDS, "Challenge countdown started");
        }
      }
      Event::Input(Input::SendChallenge) => {
        if let ChallengeStatus::Counting { remaining } = setup.challenge {
          setup.challenge = ChallengeStatus::Waiting { remaining };
          arm(&mut self.timers, TimerKind::ChallengeConnect, Schedule::Once(CHALLENGE_CONNECT_DELAY), &mut fx);
          fx.push(Effect::OpenUrl(invite_url(setup.mode.display_name())));
        }
      }
      Event::Timer { token, .. } if token.kind == TimerKind::ChallengeCountdown => {
        setup.challenge = setup.challenge.tick();
        if setup.challenge == ChallengeStatus::Expired {
          disarm(&mut self.timers, TimerKind::ChallengeCountdown, &mut fx);
          disarm(&mut self.timers, TimerKind::ChallengeConnect, &mut fx);
          info!(target: "session", "Challenge expired");
        }
      }
      Event::Timer { token, .. } if token.kind == TimerKind::ChallengeConnect => {
        if matches!(setup.challenge, ChallengeStatus::Waiting { .. }) {
          disarm(&mut self.timers, TimerKind::ChallengeCountdown, &mut fx);
          setup.challenge = ChallengeStatus::Connected;
          setup.game_mode = GameMode::Duel;
          setup.opponent = FRIEND_OPPONENT;
          info!(target: "session", "Challenge connected");
        }
      }
      Event::Input(Input::Start) => {
        if !setup.can_start() {
          debug!(target: "session", mode = ?setup.mode, "Start blocked: language and topic required");
          return Ok(fx);
        }
        disarm(&mut self.timers, TimerKind::ChallengeCountdown, &mut fx);
        disarm(&mut self.timers, TimerKind::ChallengeConnect, &mut fx);
        self.next_request += 1;
        let config = setup.config();
        let req = GenerateRequest {
          mode: config.mode,
          language: config.language,
          topic: config.topic,
          enabled_sources: self.profile.enabled_source_names(config.mode),
        };
        fx.push(Effect::Generate { request: self.next_request, req });
        next = Some(ViewState::Loading { request: self.next_request, config });
      }
      Event::Input(Input::Back | Input::Quit) => {
        disarm(&mut self.timers, TimerKind::ChallengeCountdown, &mut fx);
        disarm(&mut self.timers, TimerKind::ChallengeConnect, &mut fx);
        next = Some(ViewState::Profile);
      }
      other => return self.unexpected(&other),
    }

    if let Some(next) = next {
      self.enter(next)?;
    }
    Ok(fx)
  }

  fn on_loading(&mut self, event: Event, now: i64) -> Result<Vec<Effect>, TransitionError> {
    let mut fx = Vec::new();
    let ViewState::Loading { request: pending, config } = &self.view else {
      return Err(TransitionError::Unexpected { view: ViewKind::Loading, event: event.name() });
    };
    let (pending, config) = (*pending, *config);

    match event {
      Event::QuestionsLoaded { request, deck } if request == pending => {
        let deck = if deck.questions.is_empty() { fallback_deck() } else { deck };
        if !deck.used_sources.is_empty() {
          self.update_profile(
            ProfileCommand::MergeDiscoveredSources { mode: config.mode, names: deck.used_sources.clone() },
            &mut fx,
          );
        }
        if let (GameMode::Duel, Some(op)) = (config.game_mode, config.opponent) {
          arm(&mut self.timers, TimerKind::Opponent, Schedule::Every(op.interval()), &mut fx);
        }
        info!(target: "session", questions = deck.questions.len(), fallback = deck.fallback, game_mode = ?config.game_mode, "Session started");
        self.enter(ViewState::Playing(Box::new(PlayState::new(config, deck, now))))?;
      }
      Event::Input(Input::Back | Input::Quit) => self.enter(ViewState::Profile)?,
      other => return self.unexpected(&other),
    }
    Ok(fx)
  }

  fn on_playing(&mut self, event: Event, now: i64) -> Result<Vec<Effect>, TransitionError> {
    let mut fx = Vec::new();
    let mut finished = false;
    let mut quit = false;
    let mut record = None;
    let sound_enabled = self.profile.settings.sound_enabled;

    let ViewState::Playing(play) = &mut self.view else {
      return Err(TransitionError::Unexpected { view: ViewKind::Playing, event: event.name() });
    };
    let play = play.as_mut();
    let timers = &mut self.timers;

    match event {
      // Card input only reaches the top card while no modal covers it.
      Event::Input(Input::PointerDown { stack_index, x, y }) if play.modal.is_none() => {
        let outcome = play.gesture.pointer_down(stack_index, Point::new(x, y));
        finished = on_card_outcome(outcome, play, timers, &mut fx);
      }
      Event::Input(Input::PointerMove { x, y }) if play.modal.is_none() => {
        play.gesture.pointer_move(Point::new(x, y));
      }
      Event::Input(Input::PointerUp) if play.modal.is_none() => {
        let outcome = play.gesture.pointer_up();
        finished = on_card_outcome(outcome, play, timers, &mut fx);
      }
      Event::Input(Input::Trigger { direction, stack_index }) if play.modal.is_none() => {
        let outcome = play.gesture.trigger(stack_index, direction);
        finished = on_card_outcome(outcome, play, timers, &mut fx);
      }
      Event::Input(Input::PointerDown { .. } | Input::PointerMove { .. } | Input::PointerUp | Input::Trigger { .. }) => {
        trace!(target: "session", "Card input while modal is open");
      }
      Event::Timer { token, .. } if token.kind == TimerKind::CardFlight => {
        if let Some(direction) = play.gesture.finish_flight() {
          finished = play.resolve_swipe(direction);
        }
      }

      Event::Timer { token, .. } if token.kind == TimerKind::Stopwatch => {
        if let Some(modal) = play.modal.as_mut().filter(|m| m.selected.is_none()) {
          modal.elapsed_ds += 1;
        }
      }
      Event::Input(Input::Answer { option }) => {
        if let Some(modal) = play.modal.as_mut().filter(|m| m.selected.is_none()) {
          disarm(timers, TimerKind::Stopwatch, &mut fx);
          let correct = modal.question.is_correct(&option);
          modal.selected = Some(option.clone());
          play.answered += 1;
          if correct {
            play.score += 1;
          }
          debug!(target: "session", question = %modal.question.id, correct, elapsed = modal.elapsed_seconds(), "Answer recorded");
          record = Some(ProfileCommand::RecordAnswer {
            question: modal.question.clone(),
            selected: option,
            mode: play.config.mode,
            elapsed_seconds: modal.elapsed_seconds(),
            timestamp: now,
          });
        }
      }
      Event::Input(Input::Continue) => {
        if let Some(modal) = play.modal.as_mut().filter(|m| m.selected.is_some() && !m.exiting) {
          modal.exiting = true;
          arm(timers, TimerKind::ModalExit, Schedule::Once(MODAL_EXIT), &mut fx);
        }
      }
      Event::Timer { token, .. } if token.kind == TimerKind::ModalExit => {
        play.modal = None;
        play.gesture.reset();
        play.deck.advance();
        finished = play.deck.is_exhausted();
      }

      Event::Input(Input::StartRecording) => {
        if let (Some(modal), Some(_)) = (play.modal.as_mut(), play.config.language) {
          if matches!(modal.pronunciation, PronunciationState::Idle | PronunciationState::Scored(_)) {
            modal.pronunciation = PronunciationState::Recording;
          }
        }
      }
      Event::Input(Input::MicrophoneDenied) => {
        if let Some(modal) = play.modal.as_mut() {
          modal.pronunciation = PronunciationState::Idle;
        }
        fx.push(Effect::Alert(MICROPHONE_DENIED.into()));
      }
      Event::Input(Input::StopRecording { audio_base64 }) => {
        if let (Some(modal), Some(language)) = (play.modal.as_mut(), play.config.language) {
          if modal.pronunciation == PronunciationState::Recording {
            modal.pronunciation = PronunciationState::Evaluating;
            fx.push(Effect::EvaluatePronunciation {
              audio_base64,
              word: modal.question.correct_answer.clone(),
              language,
            });
          }
        }
      }
      Event::PronunciationScored(feedback) => {
        if let Some(modal) = play.modal.as_mut().filter(|m| m.pronunciation == PronunciationState::Evaluating) {
          modal.pronunciation = PronunciationState::Scored(feedback);
        }
      }
      Event::Input(Input::PlayPronunciation) => {
        if let (Some(modal), Some(language)) = (play.modal.as_mut(), play.config.language) {
          if !sound_enabled {
            fx.push(Effect::Alert(SOUND_DISABLED.into()));
          } else if !modal.speaking {
            modal.speaking = true;
            fx.push(Effect::FetchSpeech { text: modal.question.correct_answer.clone(), language });
          }
        }
      }
      Event::SpeechFinished { ok } => {
        if let Some(modal) = play.modal.as_mut() {
          modal.speaking = false;
        }
        if !ok {
          fx.push(Effect::Alert(SPEECH_FAILED.into()));
        }
      }

      Event::Timer { token, roll } if token.kind == TimerKind::Opponent => {
        if let (GameMode::Duel, Some(op)) = (play.config.game_mode, play.config.opponent) {
          if op.scores(roll) {
            play.opponent_score += 1;
            play.opponent_last_hit = Some(now);
            debug!(target: "session", opponent = op.name, score = play.opponent_score, "Opponent scored");
          }
        }
      }

      Event::Input(Input::Quit | Input::Back) => quit = true,
      other => return self.unexpected(&other),
    }

    if let Some(command) = record {
      self.update_profile(command, &mut fx);
      if let (Some(entry), ViewState::Playing(play)) = (self.profile.history.last(), &mut self.view) {
        play.history.push(entry.clone());
      }
    }
    if quit {
      self.teardown_playing(&mut fx);
      info!(target: "session", "Session abandoned");
      self.enter(ViewState::Profile)?;
    } else if finished {
      self.finish_session(now, &mut fx)?;
    }
    Ok(fx)
  }

  fn teardown_playing(&mut self, fx: &mut Vec<Effect>) {
    for kind in [TimerKind::Stopwatch, TimerKind::Opponent, TimerKind::CardFlight, TimerKind::ModalExit] {
      disarm(&mut self.timers, kind, fx);
    }
  }

  fn finish_session(&mut self, now: i64, fx: &mut Vec<Effect>) -> Result<(), TransitionError> {
    self.teardown_playing(fx);
    let ViewState::Playing(play) = &self.view else {
      return Err(TransitionError::Illegal { from: self.view.kind(), to: ViewKind::Results });
    };
    let payload = play.finish_payload(&self.slug, now);
    let results = ResultsState::from_play(play, payload.duration_seconds);
    info!(target: "session", score = results.score, answered = results.answered, total = results.total, victory = results.victory, "Session finished");
    self.enter(ViewState::Results(results))?;
    fx.push(Effect::Finish(payload));
    Ok(())
  }

  fn on_results(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
    match event {
      Event::Input(Input::Continue | Input::Back) => {
        self.enter(ViewState::Profile)?;
        Ok(Vec::new())
      }
      other => self.unexpected(&other),
    }
  }

  /// Serializable view of the whole machine for the presentation shell.
  pub fn snapshot(&self) -> Snapshot<'_> {
    let view = match &self.view {
      ViewState::Intro => ViewSnapshot::Intro,
      ViewState::Profile => ViewSnapshot::Profile,
      ViewState::Menu => ViewSnapshot::Menu {
        modes: AppMode::ALL.iter().map(|&mode| ModeCard { mode, name: mode.display_name() }).collect(),
      },
      ViewState::Setup(setup) => ViewSnapshot::Setup {
        can_start: setup.can_start(),
        topics: Topic::ALL
          .iter()
          .map(|&topic| TopicOption {
            topic,
            name: topic.display_name(),
            locked: topic.required_level() > self.profile.level,
          })
          .collect(),
        setup,
      },
      ViewState::Loading { config, .. } => ViewSnapshot::Loading { config },
      ViewState::Playing(play) => ViewSnapshot::Playing(PlayingSnapshot {
        cards: play.deck.window(),
        offset: play.gesture.offset(),
        rotation: play.gesture.rotation(),
        hints: play.gesture.hints(),
        flying: play.gesture.in_flight(),
        remaining: play.deck.remaining(),
        deck_len: play.deck.len(),
        score: play.score,
        answered: play.answered,
        game_mode: play.config.game_mode,
        opponent: play.config.opponent,
        opponent_score: play.opponent_score,
        opponent_last_hit: play.opponent_last_hit,
        used_sources: &play.used_sources,
        modal: play.modal.as_ref().map(|m| ModalSnapshot {
          question: &m.question,
          difficulty: m.question.difficulty.label_es(),
          elapsed_seconds: m.elapsed_seconds(),
          selected: m.selected.as_deref(),
          is_correct: m.selected.as_deref().map(|s| m.question.is_correct(s)),
          exiting: m.exiting,
          pronunciation: &m.pronunciation,
          speaking: m.speaking,
        }),
      }),
      ViewState::Results(results) => ViewSnapshot::Results(results),
      ViewState::Leaderboard { tab } => ViewSnapshot::Leaderboard { tab: *tab, rows: leaderboard::rows(&self.profile, *tab) },
      ViewState::History => ViewSnapshot::History {
        entries: self.profile.history.iter().rev().collect(),
      },
      ViewState::Admin { pending } => ViewSnapshot::Admin {
        settings: &self.profile.settings,
        sources: &self.profile.quiz_sources,
        pending: *pending,
      },
    };
    Snapshot {
      mode: self.mode,
      mode_name: self.mode.display_name(),
      profile: ProfileSummary {
        nickname: &self.profile.nickname,
        avatar: &self.profile.selected_avatar,
        level: self.profile.level,
        xp: self.profile.xp,
        xp_into_level: self.profile.xp_into_level(),
        xp_per_level: XP_PER_LEVEL,
        badge: current_badge(self.profile.level),
        total_correct: self.profile.total_correct,
        play_time: format_play_time(self.profile.total_time_seconds),
        sound_enabled: self.profile.settings.sound_enabled,
      },
      view,
    }
  }
}

fn on_card_outcome(outcome: CardOutcome, play: &mut PlayState, timers: &mut TimerBook, fx: &mut Vec<Effect>) -> bool {
  match outcome {
    CardOutcome::FlyOff { direction, after, .. } => {
      trace!(target: "session", ?direction, "Card flying off");
      arm(timers, TimerKind::CardFlight, Schedule::Once(after), fx);
      false
    }
    CardOutcome::Commit(Direction::Up) => {
      if let Some(question) = play.deck.current().cloned() {
        play.modal = Some(AnswerModal::new(question));
        arm(timers, TimerKind::Stopwatch, Schedule::Every(STOPWATCH_TICK), fx);
      }
      false
    }
    CardOutcome::Commit(direction) => play.resolve_swipe(direction),
    CardOutcome::Ignored | CardOutcome::Moved(_) | CardOutcome::SnapBack => false,
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<'a> {
  pub mode: AppMode,
  pub mode_name: &'static str,
  pub profile: ProfileSummary<'a>,
  pub view: ViewSnapshot<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary<'a> {
  pub nickname: &'a str,
  pub avatar: &'a str,
  pub level: u32,
  pub xp: u64,
  pub xp_into_level: u64,
  pub xp_per_level: u64,
  pub badge: &'static Badge,
  pub total_correct: u64,
  pub play_time: String,
  pub sound_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ModeCard {
  pub mode: AppMode,
  pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TopicOption {
  pub topic: Topic,
  pub name: &'static str,
  pub locked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayingSnapshot<'a> {
  pub cards: Vec<CardView<'a>>,
  pub offset: Point,
  pub rotation: f32,
  pub hints: SwipeHints,
  pub flying: Option<Direction>,
  pub remaining: usize,
  pub deck_len: usize,
  pub score: u32,
  pub answered: u32,
  pub game_mode: GameMode,
  pub opponent: Option<Opponent>,
  pub opponent_score: u32,
  pub opponent_last_hit: Option<i64>,
  pub used_sources: &'a [String],
  pub modal: Option<ModalSnapshot<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalSnapshot<'a> {
  pub question: &'a Question,
  /// Localized difficulty badge.
  pub difficulty: &'static str,
  pub elapsed_seconds: f64,
  pub selected: Option<&'a str>,
  pub is_correct: Option<bool>,
  pub exiting: bool,
  pub pronunciation: &'a PronunciationState,
  pub speaking: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewSnapshot<'a> {
  Intro,
  Profile,
  Menu { modes: Vec<ModeCard> },
  Setup { setup: &'a SetupState, can_start: bool, topics: Vec<TopicOption> },
  Loading { config: &'a SessionConfig },
  Playing(PlayingSnapshot<'a>),
  Results(&'a ResultsState),
  Leaderboard { tab: Option<AppMode>, rows: Vec<LeaderboardRow> },
  /// Newest first.
  History { entries: Vec<&'a HistoryEntry> },
  Admin {
    settings: &'a AppSettings,
    sources: &'a BTreeMap<AppMode, Vec<QuizSource>>,
    pending: Option<PendingReset>,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Difficulty;

  fn q(id: &str) -> Question {
    Question {
      id: id.into(),
      question_text: format!("Pregunta {id}"),
      options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
      correct_answer: "A".into(),
      explanation: String::new(),
      difficulty: Difficulty::Medium,
      tags: vec![],
    }
  }

  fn loaded(ids: &[&str]) -> LoadedDeck {
    LoadedDeck { questions: ids.iter().map(|id| q(id)).collect(), used_sources: vec![], fallback: false }
  }

  fn scheduled(fx: &[Effect], kind: TimerKind) -> TimerToken {
    fx.iter()
      .find_map(|e| match e {
        Effect::Schedule { token, .. } if token.kind == kind => Some(*token),
        _ => None,
      })
      .unwrap_or_else(|| panic!("no {kind:?} scheduled in {fx:?}"))
  }

  fn tick(m: &mut QuizMachine, token: TimerToken) -> Vec<Effect> {
    m.handle_at(Event::Timer { token, roll: 0.5 }, 1_000).unwrap()
  }

  fn input(m: &mut QuizMachine, input: Input) -> Vec<Effect> {
    m.handle_at(input.into(), 1_000).unwrap()
  }

  fn at_profile() -> QuizMachine {
    let mut m = QuizMachine::new(Profile::default(), "cultura");
    let fx = m.start();
    tick(&mut m, scheduled(&fx, TimerKind::IntroDelay));
    assert_eq!(m.view_kind(), ViewKind::Profile);
    m
  }

  fn load(m: &mut QuizMachine, deck: LoadedDeck) -> Vec<Effect> {
    let fx = input(m, Input::Start);
    let request = fx
      .iter()
      .find_map(|e| match e {
        Effect::Generate { request, .. } => Some(*request),
        _ => None,
      })
      .expect("generate effect");
    m.handle_at(Event::QuestionsLoaded { request, deck }, 1_000).unwrap()
  }

  fn playing(ids: &[&str]) -> QuizMachine {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    load(&mut m, loaded(ids));
    assert_eq!(m.view_kind(), ViewKind::Playing);
    m
  }

  fn answer(m: &mut QuizMachine, option: &str) -> Vec<Effect> {
    input(m, Input::Trigger { direction: Direction::Up, stack_index: 0 });
    let mut fx = input(m, Input::Answer { option: option.into() });
    let exit = input(m, Input::Continue);
    fx.extend(tick(m, scheduled(&exit, TimerKind::ModalExit)));
    fx
  }

  fn swipe(m: &mut QuizMachine, direction: Direction) -> Vec<Effect> {
    let fx = input(m, Input::Trigger { direction, stack_index: 0 });
    tick(m, scheduled(&fx, TimerKind::CardFlight))
  }

  #[test]
  fn intro_waits_for_delay() {
    let mut m = QuizMachine::new(Profile::default(), "cultura");
    let fx = m.start();
    assert_eq!(fx, vec![Effect::Schedule { token: scheduled(&fx, TimerKind::IntroDelay), schedule: Schedule::Once(INTRO_DELAY) }]);
    assert!(m.handle_at(Input::Play.into(), 0).is_err());
    assert_eq!(m.view_kind(), ViewKind::Intro);
  }

  #[test]
  fn example_scenario() {
    let mut m = playing(&["Q1", "Q2", "Q3"]);
    answer(&mut m, "A");
    swipe(&mut m, Direction::Left);
    answer(&mut m, "B");

    let play = m.play().expect("still playing");
    assert_eq!(play.score(), 1);
    assert_eq!(play.answered(), 2);
    let ids: Vec<_> = play.deck().questions().iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["Q1", "Q2", "Q3", "Q2"]);
    assert_eq!(play.deck().current().map(|q| q.id.as_str()), Some("Q2"));

    let fx = answer(&mut m, "A");
    assert_eq!(m.view_kind(), ViewKind::Results);
    let payload = fx
      .iter()
      .find_map(|e| match e {
        Effect::Finish(p) => Some(p.clone()),
        _ => None,
      })
      .expect("finish effect");
    assert_eq!(payload.score, 2);
    assert_eq!(payload.history.len(), 3);
    assert_eq!(payload.questions.len(), 4);
    assert_eq!(payload.slug, "cultura");
    assert_eq!(m.profile().xp, 50 + 5 + 50);
    assert_eq!(m.profile().history.len(), 3);
  }

  #[test]
  fn n_resolutions_reach_results() {
    for n in 1..6 {
      let ids: Vec<String> = (0..n).map(|i| format!("q{i}")).collect();
      let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
      let mut m = playing(&refs);
      for i in 0..n {
        assert_eq!(m.view_kind(), ViewKind::Playing, "n={n} i={i}");
        if i % 2 == 0 {
          answer(&mut m, "A");
        } else {
          swipe(&mut m, Direction::Right);
        }
      }
      assert_eq!(m.view_kind(), ViewKind::Results);
    }
  }

  #[test]
  fn down_requeues_like_left() {
    let mut m = playing(&["Q1", "Q2"]);
    swipe(&mut m, Direction::Down);
    let play = m.play().unwrap();
    assert_eq!(play.deck().len(), 3);
    assert_eq!(play.deck().remaining(), 2);
    assert_eq!(play.deck().questions()[2].id, "Q1");
  }

  #[test]
  fn drag_below_threshold_snaps_back() {
    let mut m = playing(&["Q1"]);
    input(&mut m, Input::PointerDown { stack_index: 0, x: 100.0, y: 100.0 });
    input(&mut m, Input::PointerMove { x: 150.0, y: 110.0 });
    let fx = input(&mut m, Input::PointerUp);
    assert!(fx.is_empty());
    assert_eq!(m.play().unwrap().gesture().offset(), Point::default());

    // back cards do not react
    input(&mut m, Input::PointerDown { stack_index: 1, x: 0.0, y: 0.0 });
    assert!(!m.play().unwrap().gesture().is_dragging());

    input(&mut m, Input::PointerDown { stack_index: 0, x: 0.0, y: 0.0 });
    input(&mut m, Input::PointerMove { x: 0.0, y: -120.0 });
    let fx = input(&mut m, Input::PointerUp);
    scheduled(&fx, TimerKind::Stopwatch);
    assert!(m.play().unwrap().modal().is_some());
  }

  #[test]
  fn stopwatch_measures_deciseconds_until_answer() {
    let mut m = playing(&["Q1", "Q2"]);
    let fx = input(&mut m, Input::Trigger { direction: Direction::Up, stack_index: 0 });
    let watch = scheduled(&fx, TimerKind::Stopwatch);
    for _ in 0..25 {
      tick(&mut m, watch);
    }
    let fx = input(&mut m, Input::Answer { option: "A".into() });
    assert!(fx.contains(&Effect::Cancel(watch)));
    assert!(fx.iter().any(|e| matches!(e, Effect::SaveProfile(_))));
    // late tick after the stop is dropped
    tick(&mut m, watch);
    let modal = m.play().unwrap().modal().unwrap();
    assert_eq!(modal.elapsed_seconds(), 2.5);
    assert_eq!(modal.selected(), Some("A"));
    assert!((m.profile().total_time_seconds - 2.5).abs() < 1e-9);

    // second answer on a revealed modal is ignored
    input(&mut m, Input::Answer { option: "B".into() });
    assert_eq!(m.profile().history.len(), 1);
  }

  #[test]
  fn continue_requires_revealed_answer() {
    let mut m = playing(&["Q1"]);
    input(&mut m, Input::Trigger { direction: Direction::Up, stack_index: 0 });
    assert!(input(&mut m, Input::Continue).is_empty());
    input(&mut m, Input::Answer { option: "A".into() });
    let fx = input(&mut m, Input::Continue);
    assert_eq!(fx.len(), 1);
    assert!(input(&mut m, Input::Continue).is_empty());
  }

  #[test]
  fn setup_guard_blocks_language_mode() {
    let mut m = at_profile();
    input(&mut m, Input::OpenMenu);
    input(&mut m, Input::SelectMode { mode: AppMode::Idiomas });
    input(&mut m, Input::Play);
    assert!(input(&mut m, Input::Start).is_empty());
    assert_eq!(m.view_kind(), ViewKind::Setup);

    input(&mut m, Input::SelectLanguage { language: Language::English });
    assert!(input(&mut m, Input::Start).is_empty());

    // level 1 cannot pick a level-3 topic
    let fx = input(&mut m, Input::SelectTopic { topic: Topic::Service });
    assert!(matches!(fx.as_slice(), [Effect::Alert(_)]));
    input(&mut m, Input::SelectTopic { topic: Topic::Fish });
    let fx = input(&mut m, Input::Start);
    assert_eq!(m.view_kind(), ViewKind::Loading);
    match &fx[..] {
      [Effect::Generate { req, .. }] => {
        assert_eq!(req.language, Some(Language::English));
        assert_eq!(req.topic, Some(Topic::Fish));
        assert!(req.enabled_sources.iter().any(|s| s.contains("Oxford")));
      }
      other => panic!("unexpected effects {other:?}"),
    }
  }

  #[test]
  fn duel_opponent_only_scores_while_playing() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    input(&mut m, Input::SelectGameMode { game_mode: GameMode::Duel });
    input(&mut m, Input::SelectOpponent { opponent_id: "bot_hard".into() });
    let fx = load(&mut m, loaded(&["Q1", "Q2"]));
    let opp = scheduled(&fx, TimerKind::Opponent);
    assert!(fx.contains(&Effect::Schedule { token: opp, schedule: Schedule::Every(Duration::from_millis(3000)) }));

    m.handle_at(Event::Timer { token: opp, roll: 0.1 }, 2_000).unwrap();
    m.handle_at(Event::Timer { token: opp, roll: 0.99 }, 3_000).unwrap();
    assert_eq!(m.play().unwrap().opponent_score(), 1);

    let fx = input(&mut m, Input::Quit);
    assert!(fx.contains(&Effect::Cancel(opp)));
    assert_eq!(m.view_kind(), ViewKind::Profile);
    assert!(!m.timers().is_armed(TimerKind::Opponent));
    // a tick that was already in flight changes nothing
    assert!(m.handle_at(Event::Timer { token: opp, roll: 0.0 }, 4_000).unwrap().is_empty());
  }

  #[test]
  fn solo_sessions_never_arm_the_opponent() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    let fx = load(&mut m, loaded(&["Q1"]));
    assert!(!fx.iter().any(|e| matches!(e, Effect::Schedule { .. })));
  }

  #[test]
  fn duel_results_compare_scores() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    input(&mut m, Input::SelectGameMode { game_mode: GameMode::Duel });
    let fx = load(&mut m, loaded(&["Q1"]));
    let opp = scheduled(&fx, TimerKind::Opponent);
    m.handle_at(Event::Timer { token: opp, roll: 0.0 }, 2_000).unwrap();
    let fx = answer(&mut m, "A");
    assert!(fx.contains(&Effect::Cancel(opp)));
    let results = m.results().unwrap();
    assert_eq!((results.score, results.opponent_score), (1, 1));
    assert!(!results.victory);
    assert_eq!(results.share_text, "¡He conseguido 1 aciertos y he ganado 50 XP en CdB_ Quizz! 🍻");
  }

  #[test]
  fn solo_victory_needs_half() {
    let mut m = playing(&["Q1", "Q2"]);
    answer(&mut m, "A");
    answer(&mut m, "B");
    assert!(m.results().unwrap().victory);

    let mut m = playing(&["Q1", "Q2", "Q3"]);
    answer(&mut m, "A");
    answer(&mut m, "B");
    answer(&mut m, "B");
    assert!(!m.results().unwrap().victory);
    input(&mut m, Input::Continue);
    assert_eq!(m.view_kind(), ViewKind::Profile);
  }

  #[test]
  fn challenge_expires_after_countdown() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    let fx = input(&mut m, Input::StartChallenge);
    let countdown = scheduled(&fx, TimerKind::ChallengeCountdown);
    for _ in 0..CHALLENGE_SECONDS - 1 {
      tick(&mut m, countdown);
    }
    let ViewState::Setup(setup) = m.view() else { panic!() };
    assert_eq!(setup.challenge, ChallengeStatus::Counting { remaining: 1 });
    let fx = tick(&mut m, countdown);
    assert!(fx.contains(&Effect::Cancel(countdown)));
    let ViewState::Setup(setup) = m.view() else { panic!() };
    assert_eq!(setup.challenge, ChallengeStatus::Expired);

    // expired challenges cannot be sent; re-initiating restarts the countdown
    assert!(input(&mut m, Input::SendChallenge).is_empty());
    let fx = input(&mut m, Input::StartChallenge);
    assert_ne!(scheduled(&fx, TimerKind::ChallengeCountdown), countdown);
  }

  #[test]
  fn sent_challenge_connects_the_friend() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    let fx = input(&mut m, Input::StartChallenge);
    let countdown = scheduled(&fx, TimerKind::ChallengeCountdown);
    let fx = input(&mut m, Input::SendChallenge);
    assert!(fx.iter().any(|e| matches!(e, Effect::OpenUrl(u) if u.starts_with("https://wa.me/"))));
    let connect = scheduled(&fx, TimerKind::ChallengeConnect);
    let fx = tick(&mut m, connect);
    assert!(fx.contains(&Effect::Cancel(countdown)));
    let ViewState::Setup(setup) = m.view() else { panic!() };
    assert_eq!(setup.challenge, ChallengeStatus::Connected);
    assert_eq!(setup.opponent, FRIEND_OPPONENT);
    assert_eq!(setup.game_mode, GameMode::Duel);
  }

  #[test]
  fn leaving_setup_cancels_challenge_timers() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    let fx = input(&mut m, Input::StartChallenge);
    let countdown = scheduled(&fx, TimerKind::ChallengeCountdown);
    let fx = input(&mut m, Input::Back);
    assert!(fx.contains(&Effect::Cancel(countdown)));
    assert!(tick(&mut m, countdown).is_empty());
  }

  #[test]
  fn late_questions_for_an_abandoned_load_are_ignored() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    let first = input(&mut m, Input::Start);
    let Some(Effect::Generate { request: stale, .. }) = first.first().cloned() else { panic!() };
    input(&mut m, Input::Quit);
    input(&mut m, Input::Play);
    input(&mut m, Input::Start);
    m.handle_at(Event::QuestionsLoaded { request: stale, deck: loaded(&["old"]) }, 0).unwrap();
    assert_eq!(m.view_kind(), ViewKind::Loading);
  }

  #[test]
  fn reported_sources_merge_into_profile() {
    let mut m = at_profile();
    input(&mut m, Input::Play);
    let mut deck = loaded(&["Q1"]);
    deck.used_sources = vec!["guía repsol".into(), "Guía Peñín".into()];
    let before = m.profile().quiz_sources[&AppMode::Cultura].len();
    let fx = load(&mut m, deck);
    assert!(fx.iter().any(|e| matches!(e, Effect::SaveProfile(_))));
    let after = &m.profile().quiz_sources[&AppMode::Cultura];
    assert_eq!(after.len(), before + 1);
    assert!(after.iter().any(|s| s.name == "Guía Peñín" && s.enabled));
  }

  #[test]
  fn pronunciation_flow_in_language_mode() {
    let mut m = at_profile();
    input(&mut m, Input::OpenMenu);
    input(&mut m, Input::SelectMode { mode: AppMode::Idiomas });
    input(&mut m, Input::Play);
    input(&mut m, Input::SelectLanguage { language: Language::French });
    input(&mut m, Input::SelectTopic { topic: Topic::Drinks });
    load(&mut m, loaded(&["Q1"]));
    input(&mut m, Input::Trigger { direction: Direction::Up, stack_index: 0 });

    input(&mut m, Input::StartRecording);
    let fx = input(&mut m, Input::StopRecording { audio_base64: "AAAA".into() });
    assert_eq!(
      fx,
      vec![Effect::EvaluatePronunciation { audio_base64: "AAAA".into(), word: "A".into(), language: Language::French }]
    );
    let feedback = PronunciationFeedback { score: 72.0, feedback: "Bien".into() };
    m.handle_at(Event::PronunciationScored(feedback.clone()), 0).unwrap();
    assert_eq!(m.play().unwrap().modal().unwrap().pronunciation(), &PronunciationState::Scored(feedback));

    let fx = input(&mut m, Input::MicrophoneDenied);
    assert_eq!(fx, vec![Effect::Alert(MICROPHONE_DENIED.into())]);
    assert_eq!(m.play().unwrap().modal().unwrap().pronunciation(), &PronunciationState::Idle);

    let fx = input(&mut m, Input::PlayPronunciation);
    assert!(matches!(fx.as_slice(), [Effect::FetchSpeech { .. }]));
    assert!(m.handle_at(Event::SpeechFinished { ok: true }, 0).unwrap().is_empty());
  }

  #[test]
  fn muted_playback_alerts() {
    let mut profile = Profile::default();
    profile.settings.sound_enabled = false;
    let mut m = QuizMachine::new(profile, "idiomas");
    let fx = m.start();
    tick(&mut m, scheduled(&fx, TimerKind::IntroDelay));
    input(&mut m, Input::OpenMenu);
    input(&mut m, Input::SelectMode { mode: AppMode::Idiomas });
    input(&mut m, Input::Play);
    input(&mut m, Input::SelectLanguage { language: Language::English });
    input(&mut m, Input::SelectTopic { topic: Topic::Meat });
    load(&mut m, loaded(&["Q1"]));
    input(&mut m, Input::Trigger { direction: Direction::Up, stack_index: 0 });
    assert_eq!(input(&mut m, Input::PlayPronunciation), vec![Effect::Alert(SOUND_DISABLED.into())]);
  }

  #[test]
  fn admin_resets_need_confirmation() {
    let mut m = playing(&["Q1"]);
    answer(&mut m, "A");
    input(&mut m, Input::Continue);
    input(&mut m, Input::OpenAdmin);
    input(&mut m, Input::RequestStatsReset { mode: AppMode::Cultura });
    assert_eq!(m.profile().xp, 50);
    input(&mut m, Input::Cancel);
    assert!(input(&mut m, Input::Confirm).is_empty());
    assert_eq!(m.profile().xp, 50);

    input(&mut m, Input::RequestStatsReset { mode: AppMode::Cultura });
    let fx = input(&mut m, Input::Confirm);
    assert!(matches!(fx.as_slice(), [Effect::SaveProfile(p)] if p.xp == 0 && p.history.is_empty()));

    input(&mut m, Input::EditProfile { nickname: "Paco".into(), avatar: "☕".into() });
    input(&mut m, Input::RequestProfileReset);
    input(&mut m, Input::Confirm);
    assert_eq!(m.profile().nickname, "CamareroNovato");
  }

  #[test]
  fn illegal_transitions_are_rejected() {
    assert!(ViewKind::Intro.can_enter(ViewKind::Profile));
    assert!(!ViewKind::Profile.can_enter(ViewKind::Playing));
    assert!(!ViewKind::Setup.can_enter(ViewKind::Results));
    assert!(!ViewKind::Menu.can_enter(ViewKind::Setup));

    let mut m = at_profile();
    let err = m.handle_at(Input::Answer { option: "A".into() }.into(), 0).unwrap_err();
    assert_eq!(err, TransitionError::Unexpected { view: ViewKind::Profile, event: "answer" });
  }

  #[test]
  fn snapshot_exposes_front_window() {
    let m = playing(&["Q1", "Q2", "Q3", "Q4"]);
    let json = serde_json::to_value(m.snapshot()).unwrap();
    assert_eq!(json["view"]["view"], "playing");
    assert_eq!(json["view"]["cards"].as_array().map(Vec::len), Some(3));
    assert_eq!(json["view"]["cards"][0]["layout"]["interactive"], true);
    assert_eq!(json["profile"]["badge"]["id"], "b1");
    assert_eq!(json["view"]["hints"]["right"], 0.0);
  }

  #[test]
  fn snapshot_carries_drag_hints() {
    let mut m = playing(&["Q1", "Q2"]);
    input(&mut m, Input::PointerDown { stack_index: 0, x: 0.0, y: 0.0 });
    input(&mut m, Input::PointerMove { x: -50.0, y: 120.0 });
    let ViewSnapshot::Playing(snap) = m.snapshot().view else { panic!() };
    assert_eq!(snap.hints, SwipeHints { left: 0.5, right: 0.0, up: 0.0, down: 1.0 });
  }

  #[test]
  fn history_view_is_newest_first() {
    let mut m = playing(&["Q1", "Q2"]);
    answer(&mut m, "A");
    answer(&mut m, "B");
    input(&mut m, Input::Continue);
    input(&mut m, Input::OpenHistory);
    let ViewSnapshot::History { entries } = m.snapshot().view else { panic!() };
    assert_eq!(entries[0].question_id, "Q2");
    assert_eq!(entries[1].question_id, "Q1");
  }
}

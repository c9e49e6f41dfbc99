//! Application state: quiz definitions, prompts, Gemini client, the attempt
//! log and the profile store.
//!
//! This module owns:
//!   - quiz definitions by slug (from TOML) and the prompt templates
//!   - optional Gemini client
//!   - the in-memory attempt log (`/finish`)
//!   - the profile store plus one write lock per user
//!
//! Question generation falls back to the built-in mock deck whenever Gemini
//! is unavailable or fails.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::config::{load_config_from_env, Prompts, QuizDefinition, QuizzConfig};
use crate::domain::AppMode;
use crate::gemini::Gemini;
use crate::profile::Profile;
use crate::protocol::{FinishPayload, GenerateIn, GenerateOut};
use crate::seeds::mock_questions;
use crate::source::{load_deck, GenerateRequest};
use crate::store::{validate_user, AnyProfileStore, FileProfileStore, ProfileStore, StoreError};

#[derive(Debug, Clone)]
pub struct Attempt {
    pub id: u64,
    /// Present when the slug matched a configured quiz.
    pub quiz_slug: Option<String>,
    pub user: Option<String>,
    pub payload: FinishPayload,
    pub created_at: String,
}

#[derive(Debug, Default)]
pub struct AttemptLog {
    next_id: u64,
    attempts: Vec<Attempt>,
}

impl AttemptLog {
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Attempt> {
        self.attempts.iter().find(|a| a.id == id)
    }
}

pub struct AppState {
    pub gemini: Option<Arc<Gemini>>,
    pub prompts: Prompts,
    pub quizzes: HashMap<String, QuizDefinition>,
    pub attempts: RwLock<AttemptLog>,
    pub profiles: AnyProfileStore,
    profile_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppState {
    /// Build state from env: load config, init Gemini, open the profile dir.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_config_from_env().unwrap_or_default();
        let gemini = Gemini::from_env(cfg.prompts.clone());
        if let Some(g) = &gemini {
            info!(target: "cdb_quizz_backend", base_url = %g.base_url, model = %g.model, tts_model = %g.tts_model, "Gemini enabled.");
        } else {
            info!(target: "cdb_quizz_backend", "Gemini disabled (no GEMINI_API_KEY). Serving mock questions.");
        }
        let store = FileProfileStore::from_env();
        info!(target: "cdb_quizz_backend", store = ?store, "Profile store ready");
        Self::build(cfg, gemini, AnyProfileStore::File(store))
    }

    pub fn build(cfg: QuizzConfig, gemini: Option<Gemini>, profiles: AnyProfileStore) -> Self {
        let mut quizzes = HashMap::new();
        for quiz in cfg.quizzes {
            if quiz.slug.trim().is_empty() {
                error!(target: "cdb_quizz_backend", title = %quiz.title, "Skipping quiz definition without slug");
                continue;
            }
            quizzes.insert(quiz.slug.clone(), quiz);
        }
        info!(target: "cdb_quizz_backend", quizzes = quizzes.len(), "Quiz definitions loaded");
        Self {
            gemini: gemini.map(Arc::new),
            prompts: cfg.prompts,
            quizzes,
            attempts: RwLock::new(AttemptLog::default()),
            profiles,
            profile_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Active quiz definition for a slug.
    pub fn quiz(&self, slug: &str) -> Option<&QuizDefinition> {
        self.quizzes.get(slug).filter(|q| q.active)
    }

    /// Resolve the request against the quiz definition and ask Gemini; any
    /// failure serves the mock deck.
    #[instrument(level = "info", skip(self, req), fields(slug = %req.slug))]
    pub async fn generate_for_slug(&self, req: &GenerateIn) -> GenerateOut {
        let quiz = self.quiz(&req.slug);
        let app_mode = req.app_mode.or(quiz.map(|q| q.app_mode)).unwrap_or_default();
        let language = req.language.or(quiz.and_then(|q| q.default_language));
        let topic = req.topic.or(quiz.and_then(|q| q.default_topic));
        let max_questions = quiz.map(|q| q.max_questions).unwrap_or(10).max(1);
        let enabled_sources = req
            .sources
            .clone()
            .unwrap_or_else(|| Profile::default().enabled_source_names(app_mode));

        let gen_req = GenerateRequest { mode: app_mode, language, topic, enabled_sources };
        let deck = load_deck(self.gemini.as_deref(), &gen_req).await;
        let (mut questions, used_sources) = if deck.fallback {
            warn!(target: "quizz", slug = %req.slug, "Serving mock questions");
            (mock_questions(), Vec::new())
        } else {
            (deck.questions, deck.used_sources)
        };
        questions.truncate(max_questions);

        info!(target: "quizz", slug = %req.slug, mode = ?app_mode, count = questions.len(), "Questions served");
        GenerateOut { ok: true, slug: req.slug.clone(), questions, app_mode, language, topic, used_sources }
    }

    /// Append to the attempt log; ids start at 1 and only grow.
    #[instrument(level = "info", skip(self, payload), fields(slug = %payload.slug, score = payload.score))]
    pub async fn record_attempt(&self, user: Option<&str>, payload: FinishPayload) -> u64 {
        let quiz_slug = self.quiz(&payload.slug).map(|q| q.slug.clone());
        let mut log = self.attempts.write().await;
        log.next_id += 1;
        let id = log.next_id;
        log.attempts.push(Attempt {
            id,
            quiz_slug,
            user: user.map(str::to_string),
            payload,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        info!(target: "quizz", intento_id = id, total = log.attempts.len(), "Attempt recorded");
        id
    }

    /// Mode a slug plays in, for sessions started over WebSocket.
    pub fn mode_for_slug(&self, slug: &str) -> AppMode {
        self.quiz(slug).map(|q| q.app_mode).unwrap_or_default()
    }

    async fn profile_lock(&self, user: &str) -> Arc<Mutex<()>> {
        let mut locks = self.profile_locks.lock().await;
        locks.entry(user.to_string()).or_default().clone()
    }

    /// Drop the user's lock entry once nobody else holds or waits on it.
    async fn release_profile_lock(&self, user: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.profile_locks.lock().await;
        // One count for the map, one for `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user);
        }
    }

    /// Users with a profile read or write in flight.
    pub async fn locked_profiles(&self) -> usize {
        self.profile_locks.lock().await.len()
    }

    pub async fn load_profile(&self, user: &str) -> Result<Profile, StoreError> {
        let user = validate_user(user)?;
        let lock = self.profile_lock(user).await;
        let loaded = {
            let _guard = lock.lock().await;
            self.profiles.load(user).await
        };
        self.release_profile_lock(user, lock).await;
        loaded
    }

    /// Whole-snapshot replace; writes for one user never interleave.
    #[instrument(level = "info", skip(self, profile), fields(xp = profile.xp))]
    pub async fn save_profile(&self, user: &str, profile: Profile) -> Result<Profile, StoreError> {
        let user = validate_user(user)?;
        let profile = profile.normalized();
        let lock = self.profile_lock(user).await;
        let saved = {
            let _guard = lock.lock().await;
            self.profiles.save(user, &profile).await
        };
        self.release_profile_lock(user, lock).await;
        saved.map(|()| profile)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProfileStore;

    fn state() -> AppState {
        AppState::build(QuizzConfig::default(), None, AnyProfileStore::Memory(MemoryProfileStore::default()))
    }

    #[tokio::test]
    async fn invalid_user_leaves_no_lock_behind() {
        let state = state();
        assert!(matches!(state.load_profile("../x").await, Err(StoreError::InvalidUser(_))));
        assert!(state.save_profile("a.b", Profile::default()).await.is_err());
        assert_eq!(state.locked_profiles().await, 0);
    }

    #[tokio::test]
    async fn locks_are_released_after_use() {
        let state = Arc::new(state());
        let mut tasks = Vec::new();
        for i in 0..8u64 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                let user = format!("chef{}", i % 2);
                let profile = Profile { xp: i * 500, ..Profile::default() };
                state.save_profile(&user, profile).await.unwrap();
                state.load_profile(&user).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(state.locked_profiles().await, 0);
    }

    #[tokio::test]
    async fn huge_xp_saturates_level() {
        let state = state();
        let saved = state.save_profile("ana", Profile { xp: u64::MAX, ..Profile::default() }).await.unwrap();
        assert_eq!(saved.level, u32::MAX);
    }
}

//! Profile snapshot storage.
//!
//! A profile is stored as one JSON document under the snapshot key and is
//! always replaced whole. Loading fills fields that an older snapshot lacks
//! with the initial profile's values.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::profile::Profile;

pub const SNAPSHOT_KEY: &str = "gastroPolyglotProfile_v4";
const MAX_USER_LEN: usize = 64;

#[derive(Debug)]
pub enum StoreError {
  Io(std::io::Error),
  Corrupt(serde_json::Error),
  InvalidUser(String),
}

impl fmt::Display for StoreError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StoreError::Io(e) => write!(f, "profile store I/O error: {e}"),
      StoreError::Corrupt(e) => write!(f, "profile snapshot is corrupt: {e}"),
      StoreError::InvalidUser(u) => write!(f, "invalid user id {u:?}"),
    }
  }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
  fn from(err: std::io::Error) -> Self {
    StoreError::Io(err)
  }
}

impl From<serde_json::Error> for StoreError {
  fn from(err: serde_json::Error) -> Self {
    StoreError::Corrupt(err)
  }
}

/// User ids become file names: ASCII alphanumerics, `-` and `_` only.
pub fn validate_user(user: &str) -> Result<&str, StoreError> {
  let ok = !user.is_empty()
    && user.len() <= MAX_USER_LEN
    && user.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if ok { Ok(user) } else { Err(StoreError::InvalidUser(user.to_string())) }
}

/// Decode a snapshot; missing fields take their initial values.
pub fn decode_snapshot(text: &str) -> Result<Profile, StoreError> {
  let profile: Profile = serde_json::from_str(text)?;
  Ok(profile.normalized())
}

pub trait ProfileStore {
  /// The stored profile, or the initial one when nothing is stored yet.
  fn load(&self, user: &str) -> impl Future<Output = Result<Profile, StoreError>> + Send;

  fn save(&self, user: &str, profile: &Profile) -> impl Future<Output = Result<(), StoreError>> + Send;

  fn clear(&self, user: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// One JSON file per user under `dir`, replaced atomically (temp + rename).
#[derive(Clone, Debug)]
pub struct FileProfileStore {
  dir: PathBuf,
}

impl FileProfileStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  /// Store rooted at PROFILE_DIR (default `./profiles`).
  pub fn from_env() -> Self {
    Self::new(std::env::var("PROFILE_DIR").unwrap_or_else(|_| "./profiles".into()))
  }

  fn path_for(&self, user: &str) -> Result<PathBuf, StoreError> {
    let user = validate_user(user)?;
    Ok(self.dir.join(format!("{user}.{SNAPSHOT_KEY}.json")))
  }
}

impl ProfileStore for FileProfileStore {
  #[instrument(level = "debug", skip(self))]
  async fn load(&self, user: &str) -> Result<Profile, StoreError> {
    let path = self.path_for(user)?;
    match tokio::fs::read_to_string(&path).await {
      Ok(text) => decode_snapshot(&text),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(target: "profile", %user, "No snapshot yet; using initial profile");
        Ok(Profile::default())
      }
      Err(e) => Err(e.into()),
    }
  }

  #[instrument(level = "debug", skip(self, profile), fields(xp = profile.xp))]
  async fn save(&self, user: &str, profile: &Profile) -> Result<(), StoreError> {
    let path = self.path_for(user)?;
    let body = serde_json::to_vec_pretty(profile)?;
    tokio::fs::create_dir_all(&self.dir).await?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &body).await?;
    tokio::fs::rename(&tmp, &path).await?;
    debug!(target: "profile", %user, bytes = body.len(), "Snapshot written");
    Ok(())
  }

  async fn clear(&self, user: &str) -> Result<(), StoreError> {
    let path = self.path_for(user)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}

/// In-process store; keeps serialized snapshots so loads go through the
/// same decoding as files.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
  snapshots: RwLock<HashMap<String, String>>,
}

impl MemoryProfileStore {
  /// Seed a raw snapshot (e.g. one written by an older client).
  pub async fn insert_raw(&self, user: &str, text: impl Into<String>) {
    self.snapshots.write().await.insert(user.to_string(), text.into());
  }
}

impl ProfileStore for MemoryProfileStore {
  async fn load(&self, user: &str) -> Result<Profile, StoreError> {
    validate_user(user)?;
    match self.snapshots.read().await.get(user) {
      Some(text) => decode_snapshot(text),
      None => Ok(Profile::default()),
    }
  }

  async fn save(&self, user: &str, profile: &Profile) -> Result<(), StoreError> {
    validate_user(user)?;
    let text = serde_json::to_string(profile)?;
    self.snapshots.write().await.insert(user.to_string(), text);
    Ok(())
  }

  async fn clear(&self, user: &str) -> Result<(), StoreError> {
    self.snapshots.write().await.remove(user);
    Ok(())
  }
}

/// The store the service runs with, picked at startup.
#[derive(Debug)]
pub enum AnyProfileStore {
  File(FileProfileStore),
  Memory(MemoryProfileStore),
}

impl ProfileStore for AnyProfileStore {
  async fn load(&self, user: &str) -> Result<Profile, StoreError> {
    match self {
      AnyProfileStore::File(s) => s.load(user).await,
      AnyProfileStore::Memory(s) => s.load(user).await,
    }
  }

  async fn save(&self, user: &str, profile: &Profile) -> Result<(), StoreError> {
    match self {
      AnyProfileStore::File(s) => s.save(user, profile).await,
      AnyProfileStore::Memory(s) => s.save(user, profile).await,
    }
  }

  async fn clear(&self, user: &str) -> Result<(), StoreError> {
    match self {
      AnyProfileStore::File(s) => s.clear(user).await,
      AnyProfileStore::Memory(s) => s.clear(user).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::AppMode;

  #[test]
  fn user_ids_are_file_safe() {
    assert!(validate_user("chef_01-a").is_ok());
    assert!(validate_user("../etc/passwd").is_err());
    assert!(validate_user("").is_err());
    assert!(validate_user(&"x".repeat(65)).is_err());
  }

  #[test]
  fn old_snapshots_get_defaults() {
    let p = decode_snapshot(r#"{"nickname":"Lola","xp":1600,"level":1}"#).unwrap();
    assert_eq!(p.nickname, "Lola");
    assert_eq!(p.level, 4);
    assert_eq!(p.selected_avatar, "🥚");
    assert!(p.history.is_empty());
    assert!(p.settings.sound_enabled);
    assert!(p.quiz_sources.contains_key(&AppMode::Cerveza));
    assert_eq!(p.badges, vec!["b1", "b2"]);
  }

  #[tokio::test]
  async fn memory_store_round_trips_whole_profile() {
    let store = MemoryProfileStore::default();
    let fresh = store.load("ana").await.unwrap();
    assert_eq!(fresh, Profile::default());
    assert_eq!(fresh.badges, vec!["b1"]);
    let mut p = Profile::default();
    p.nickname = "Ana".into();
    store.save("ana", &p).await.unwrap();
    assert_eq!(store.load("ana").await.unwrap().nickname, "Ana");
    store.clear("ana").await.unwrap();
    assert_eq!(store.load("ana").await.unwrap().nickname, "CamareroNovato");

    store.insert_raw("bob", "{not json").await;
    assert!(matches!(store.load("bob").await, Err(StoreError::Corrupt(_))));
  }

  #[tokio::test]
  async fn file_store_replaces_snapshot() {
    let dir = std::env::temp_dir().join(format!("cdb-quizz-store-{}", uuid::Uuid::new_v4().simple()));
    let store = FileProfileStore::new(&dir);
    let mut p = Profile::default();
    p.xp = 700;
    store.save("u1", &p).await.unwrap();
    p.xp = 900;
    store.save("u1", &p).await.unwrap();
    let loaded = store.load("u1").await.unwrap();
    assert_eq!(loaded.xp, 900);
    assert_eq!(loaded.level, 2);
    assert!(!dir.join(format!("u1.{SNAPSHOT_KEY}.json.tmp")).exists());
    store.clear("u1").await.unwrap();
    store.clear("u1").await.unwrap();
    let _ = std::fs::remove_dir_all(&dir);
  }
}

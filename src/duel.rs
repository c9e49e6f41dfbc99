//! Simulated duel opponents and the "challenge a friend" countdown.

use std::time::Duration;

use serde::Serialize;

use crate::domain::Difficulty;

pub const CHALLENGE_SECONDS: u32 = 30;
pub const CHALLENGE_CONNECT_DELAY: Duration = Duration::from_secs(3);
pub const CHALLENGE_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Opponent {
  pub id: &'static str,
  pub name: &'static str,
  pub avatar: &'static str,
  pub difficulty: Difficulty,
  /// Scoring interval in milliseconds.
  pub speed_ms: u64,
}

impl Opponent {
  pub fn interval(&self) -> Duration {
    Duration::from_millis(self.speed_ms)
  }

  /// Probability that one scoring tick counts as a hit.
  pub fn hit_chance(&self) -> f64 {
    match self.difficulty {
      Difficulty::Easy => 0.6,
      Difficulty::Medium => 0.8,
      Difficulty::Hard => 0.95,
    }
  }

  /// `roll` is uniform in `[0, 1)`.
  pub fn scores(&self, roll: f64) -> bool {
    roll < self.hit_chance()
  }
}

pub const OPPONENTS: &[Opponent] = &[
  Opponent { id: "bot_easy", name: "Becario", avatar: "👶", difficulty: Difficulty::Easy, speed_ms: 8000 },
  Opponent { id: "bot_medium", name: "Camarero", avatar: "🤵", difficulty: Difficulty::Medium, speed_ms: 5000 },
  Opponent { id: "bot_hard", name: "Maître", avatar: "👨‍🍳", difficulty: Difficulty::Hard, speed_ms: 3000 },
];

/// Stands in for the bot once a challenge connects.
pub const FRIEND_OPPONENT: Opponent =
  Opponent { id: "friend", name: "Amigo", avatar: "🤝", difficulty: Difficulty::Medium, speed_ms: 6000 };

pub fn opponent_by_id(id: &str) -> Option<Opponent> {
  OPPONENTS.iter().chain(std::iter::once(&FRIEND_OPPONENT)).find(|o| o.id == id).copied()
}

pub fn default_opponent() -> Opponent {
  OPPONENTS[1]
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChallengeStatus {
  #[default]
  Idle,
  Counting { remaining: u32 },
  /// Invite sent, waiting for the (simulated) acceptance.
  Waiting { remaining: u32 },
  Connected,
  Expired,
}

impl ChallengeStatus {
  pub fn is_active(&self) -> bool {
    matches!(self, ChallengeStatus::Counting { .. } | ChallengeStatus::Waiting { .. })
  }

  /// One countdown second elapsed.
  pub fn tick(self) -> ChallengeStatus {
    match self {
      ChallengeStatus::Counting { remaining } | ChallengeStatus::Waiting { remaining } if remaining <= 1 => {
        ChallengeStatus::Expired
      }
      ChallengeStatus::Counting { remaining } => ChallengeStatus::Counting { remaining: remaining - 1 },
      ChallengeStatus::Waiting { remaining } => ChallengeStatus::Waiting { remaining: remaining - 1 },
      other => other,
    }
  }
}

/// Share URL for the invite message.
pub fn invite_url(mode_name: &str) -> String {
  let text = format!("¡Te reto a un duelo en {mode_name}! ⚔️ ¿Aceptas? Tienes {CHALLENGE_SECONDS} segundos.");
  reqwest::Url::parse_with_params("https://wa.me/", &[("text", text.as_str())])
    .map(String::from)
    .unwrap_or_else(|_| "https://wa.me/".into())
}

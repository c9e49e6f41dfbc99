//! Leaderboard rows: the fixed mock players plus the current user.

use serde::Serialize;

use crate::domain::AppMode;
use crate::profile::Profile;
use crate::seeds::mock_leaderboard;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
  pub rank: usize,
  pub nickname: String,
  pub avatar: Option<String>,
  pub level: u32,
  /// Global XP, or the selected mode's XP.
  pub xp: u64,
  pub is_user: bool,
}

/// `tab = None` ranks by global XP, `Some(mode)` by that mode's breakdown.
/// Ties keep the mock players ahead of the user.
pub fn rows(profile: &Profile, tab: Option<AppMode>) -> Vec<LeaderboardRow> {
  let score = |xp: u64, breakdown: &std::collections::BTreeMap<AppMode, u64>| match tab {
    None => xp,
    Some(mode) => breakdown.get(&mode).copied().unwrap_or(0),
  };

  let mut rows: Vec<LeaderboardRow> = mock_leaderboard()
    .into_iter()
    .map(|(name, xp, level, breakdown)| LeaderboardRow {
      rank: 0,
      nickname: name.to_string(),
      avatar: None,
      level,
      xp: score(xp, &breakdown),
      is_user: false,
    })
    .collect();
  rows.push(LeaderboardRow {
    rank: 0,
    nickname: profile.nickname.clone(),
    avatar: Some(profile.selected_avatar.clone()),
    level: profile.level,
    xp: score(profile.xp, &profile.xp_breakdown),
    is_user: true,
  });

  rows.sort_by(|a, b| b.xp.cmp(&a.xp));
  for (i, row) in rows.iter_mut().enumerate() {
    row.rank = i + 1;
  }
  rows
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn global_ranking_places_user_by_xp() {
    let mut p = Profile::default();
    p.xp = 9000;
    let rows = rows(&p, None);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].nickname, "PierreGagnaire");
    assert!(rows[1].is_user);
    assert_eq!(rows[1].rank, 2);
  }

  #[test]
  fn mode_tab_uses_breakdown() {
    let mut p = Profile::default();
    p.xp = 100_000;
    p.xp_breakdown.insert(AppMode::Cerveza, 3500);
    let rows = rows(&p, Some(AppMode::Cerveza));
    assert_eq!(rows[0].nickname, "CamareroNovato");
    assert_eq!(rows[0].xp, 3500);
    assert_eq!(rows[1].nickname, "GordonR");
    // Legal is absent from every mock breakdown
    assert!(super::rows(&p, Some(AppMode::Legal)).iter().all(|r| r.xp == 0));
  }
}

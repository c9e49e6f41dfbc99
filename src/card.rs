//! Card interaction primitive: turns pointer input on the foremost card into
//! one of four directional commits.
//!
//! - Only stack index 0 accepts input (pointer or programmatic trigger).
//! - Release beyond 80 px commits; horizontal wins over vertical.
//! - Left/right/down fly the card off-stage first and commit after the flight.
//! - Up commits immediately and keeps the card anchored (the answer modal
//!   opens on top of it).

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const SWIPE_THRESHOLD: f32 = 80.0;
pub const FLY_DISTANCE: f32 = 800.0;
pub const FLY_DURATION: Duration = Duration::from_millis(300);
/// Cards materialized from the front of the deck.
pub const VISIBLE_CARDS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  Left,
  Right,
  Up,
  Down,
}

impl Direction {
  /// Resting offset of a card that flew off in this direction.
  pub fn off_stage(&self) -> Point {
    match self {
      Direction::Left => Point::new(-FLY_DISTANCE, 0.0),
      Direction::Right => Point::new(FLY_DISTANCE, 0.0),
      Direction::Down => Point::new(0.0, FLY_DISTANCE),
      Direction::Up => Point::default(),
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum Motion {
  #[default]
  Idle,
  Dragging { start: Point },
  Flying(Direction),
}

/// What the host should do after feeding an input to the gesture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CardOutcome {
  Ignored,
  Moved(Point),
  SnapBack,
  /// Animate to `target`; call `finish_flight` once `after` has elapsed.
  FlyOff { direction: Direction, target: Point, after: Duration },
  Commit(Direction),
}

/// Gesture state of the top card.
#[derive(Clone, Debug, Default)]
pub struct CardGesture {
  motion: Motion,
  offset: Point,
}

impl CardGesture {
  pub fn offset(&self) -> Point {
    self.offset
  }

  pub fn is_dragging(&self) -> bool {
    matches!(self.motion, Motion::Dragging { .. })
  }

  pub fn in_flight(&self) -> Option<Direction> {
    match self.motion {
      Motion::Flying(d) => Some(d),
      _ => None,
    }
  }

  pub fn pointer_down(&mut self, stack_index: usize, at: Point) -> CardOutcome {
    if stack_index != 0 || self.in_flight().is_some() {
      return CardOutcome::Ignored;
    }
    self.motion = Motion::Dragging { start: at };
    CardOutcome::Moved(self.offset)
  }

  pub fn pointer_move(&mut self, at: Point) -> CardOutcome {
    let Motion::Dragging { start } = self.motion else {
      return CardOutcome::Ignored;
    };
    self.offset = Point::new(at.x - start.x, at.y - start.y);
    CardOutcome::Moved(self.offset)
  }

  pub fn pointer_up(&mut self) -> CardOutcome {
    if !self.is_dragging() {
      return CardOutcome::Ignored;
    }
    let Point { x, y } = self.offset;
    let direction = if x > SWIPE_THRESHOLD {
      Some(Direction::Right)
    } else if x < -SWIPE_THRESHOLD {
      Some(Direction::Left)
    } else if y < -SWIPE_THRESHOLD {
      Some(Direction::Up)
    } else if y > SWIPE_THRESHOLD {
      Some(Direction::Down)
    } else {
      None
    };
    match direction {
      Some(d) => self.commit(d),
      None => {
        self.reset();
        CardOutcome::SnapBack
      }
    }
  }

  /// Programmatic commit (action buttons); only honored on the top card.
  pub fn trigger(&mut self, stack_index: usize, direction: Direction) -> CardOutcome {
    if stack_index != 0 || self.in_flight().is_some() {
      return CardOutcome::Ignored;
    }
    self.commit(direction)
  }

  /// Completes a pending flight and returns its direction.
  pub fn finish_flight(&mut self) -> Option<Direction> {
    let direction = self.in_flight()?;
    self.reset();
    Some(direction)
  }

  pub fn reset(&mut self) {
    self.motion = Motion::Idle;
    self.offset = Point::default();
  }

  fn commit(&mut self, direction: Direction) -> CardOutcome {
    match direction {
      Direction::Up => {
        self.reset();
        CardOutcome::Commit(Direction::Up)
      }
      d => {
        self.motion = Motion::Flying(d);
        self.offset = d.off_stage();
        CardOutcome::FlyOff { direction: d, target: self.offset, after: FLY_DURATION }
      }
    }
  }

  /// Tilt in degrees that follows the horizontal drag.
  pub fn rotation(&self) -> f32 {
    self.offset.x * 0.05
  }

  /// Opacity of the swipe hint overlay for a direction, in `0..=1`.
  pub fn hint_opacity(&self, direction: Direction) -> f32 {
    let raw = match direction {
      Direction::Right => self.offset.x,
      Direction::Left => -self.offset.x,
      Direction::Up => -self.offset.y,
      Direction::Down => self.offset.y,
    };
    (raw / 100.0).clamp(0.0, 1.0)
  }

  pub fn hints(&self) -> SwipeHints {
    SwipeHints {
      left: self.hint_opacity(Direction::Left),
      right: self.hint_opacity(Direction::Right),
      up: self.hint_opacity(Direction::Up),
      down: self.hint_opacity(Direction::Down),
    }
  }
}

/// Hint overlay opacities for the dragged card.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SwipeHints {
  pub left: f32,
  pub right: f32,
  pub up: f32,
  pub down: f32,
}

/// Depth styling of a stacked card.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CardLayout {
  pub index: usize,
  pub scale: f32,
  pub translate_y: f32,
  pub rotation: f32,
  pub opacity: f32,
  pub interactive: bool,
}

impl CardLayout {
  /// Layout for the card at `index`; `None` past the visible window.
  pub fn at(index: usize) -> Option<Self> {
    if index >= VISIBLE_CARDS {
      return None;
    }
    if index == 0 {
      return Some(Self { index, scale: 1.0, translate_y: 0.0, rotation: 0.0, opacity: 1.0, interactive: true });
    }
    let i = index as f32;
    Some(Self {
      index,
      scale: (1.0 - i * 0.05).max(0.9),
      translate_y: 12.0 + i * 6.0,
      rotation: if index % 2 == 0 { 2.0 } else { -2.0 },
      opacity: 1.0 - i * 0.3,
      interactive: false,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn drag(g: &mut CardGesture, dx: f32, dy: f32) -> CardOutcome {
    g.pointer_down(0, Point::new(100.0, 100.0));
    g.pointer_move(Point::new(100.0 + dx, 100.0 + dy));
    g.pointer_up()
  }

  #[test]
  fn small_drag_snaps_back() {
    let mut g = CardGesture::default();
    assert_eq!(drag(&mut g, 80.0, -80.0), CardOutcome::SnapBack);
    assert_eq!(g.offset(), Point::default());
  }

  #[test]
  fn horizontal_wins_over_vertical() {
    let mut g = CardGesture::default();
    match drag(&mut g, -120.0, 300.0) {
      CardOutcome::FlyOff { direction, target, after } => {
        assert_eq!(direction, Direction::Left);
        assert_eq!(target, Point::new(-FLY_DISTANCE, 0.0));
        assert_eq!(after, FLY_DURATION);
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(g.finish_flight(), Some(Direction::Left));
    assert_eq!(g.offset(), Point::default());
    assert_eq!(g.finish_flight(), None);
  }

  #[test]
  fn up_commits_immediately_and_stays_anchored() {
    let mut g = CardGesture::default();
    assert_eq!(drag(&mut g, 10.0, -81.0), CardOutcome::Commit(Direction::Up));
    assert_eq!(g.offset(), Point::default());
    assert!(g.in_flight().is_none());
  }

  #[test]
  fn down_flies_off() {
    let mut g = CardGesture::default();
    assert!(matches!(drag(&mut g, 0.0, 200.0), CardOutcome::FlyOff { direction: Direction::Down, .. }));
  }

  #[test]
  fn only_top_card_accepts_input() {
    let mut g = CardGesture::default();
    assert_eq!(g.pointer_down(1, Point::default()), CardOutcome::Ignored);
    assert_eq!(g.pointer_move(Point::new(500.0, 0.0)), CardOutcome::Ignored);
    assert_eq!(g.pointer_up(), CardOutcome::Ignored);
    assert_eq!(g.trigger(2, Direction::Right), CardOutcome::Ignored);
  }

  #[test]
  fn input_is_ignored_mid_flight() {
    let mut g = CardGesture::default();
    assert!(matches!(g.trigger(0, Direction::Right), CardOutcome::FlyOff { .. }));
    assert_eq!(g.pointer_down(0, Point::default()), CardOutcome::Ignored);
    assert_eq!(g.trigger(0, Direction::Left), CardOutcome::Ignored);
    assert_eq!(g.finish_flight(), Some(Direction::Right));
  }

  #[test]
  fn hints_follow_offset() {
    let mut g = CardGesture::default();
    g.pointer_down(0, Point::default());
    g.pointer_move(Point::new(50.0, -250.0));
    assert_eq!(g.hint_opacity(Direction::Right), 0.5);
    assert_eq!(g.hint_opacity(Direction::Left), 0.0);
    assert_eq!(g.hint_opacity(Direction::Up), 1.0);
    assert_eq!(g.rotation(), 2.5);
    assert_eq!(g.hints(), SwipeHints { left: 0.0, right: 0.5, up: 1.0, down: 0.0 });
  }

  #[test]
  fn stack_layout_window() {
    let top = CardLayout::at(0).unwrap();
    assert!(top.interactive);
    let second = CardLayout::at(1).unwrap();
    assert!(!second.interactive);
    assert!((second.scale - 0.95).abs() < 1e-6);
    assert_eq!(second.translate_y, 18.0);
    assert_eq!(second.rotation, -2.0);
    let third = CardLayout::at(2).unwrap();
    assert_eq!(third.rotation, 2.0);
    assert!(CardLayout::at(3).is_none());
  }
}

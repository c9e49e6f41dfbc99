//! Deck of questions for the active session.
//!
//! The deck is one ordered sequence plus a cursor. The interaction layer only
//! sees a read-only front window (`window`) of at most three cards; all
//! mutation goes through `discard`, `defer` and `advance`.

use serde::Serialize;

use crate::card::{CardLayout, VISIBLE_CARDS};
use crate::domain::Question;

#[derive(Clone, Debug, Default)]
pub struct Deck {
  cards: Vec<Question>,
  index: usize,
}

/// A materialized card of the front window.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct CardView<'a> {
  pub question: &'a Question,
  pub layout: CardLayout,
}

impl Deck {
  pub fn new(cards: Vec<Question>) -> Self {
    Self { cards, index: 0 }
  }

  /// Total length, including requeued copies.
  pub fn len(&self) -> usize {
    self.cards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cards.is_empty()
  }

  pub fn index(&self) -> usize {
    self.index
  }

  /// Cards still ahead of (and including) the cursor.
  pub fn remaining(&self) -> usize {
    self.cards.len().saturating_sub(self.index)
  }

  pub fn current(&self) -> Option<&Question> {
    self.cards.get(self.index)
  }

  /// The cursor moved past the last card of a non-empty deck.
  pub fn is_exhausted(&self) -> bool {
    !self.cards.is_empty() && self.index >= self.cards.len()
  }

  pub fn questions(&self) -> &[Question] {
    &self.cards
  }

  pub fn advance(&mut self) {
    if self.index < self.cards.len() {
      self.index += 1;
    }
  }

  /// Drop the current card without requeueing it.
  pub fn discard(&mut self) {
    self.advance();
  }

  /// Requeue the current card at the back and move on.
  pub fn defer(&mut self) {
    if let Some(q) = self.current().cloned() {
      self.cards.push(q);
      self.advance();
    }
  }

  /// Read-only front window, top card first.
  pub fn window(&self) -> Vec<CardView<'_>> {
    self.cards[self.index.min(self.cards.len())..]
      .iter()
      .take(VISIBLE_CARDS)
      .enumerate()
      .filter_map(|(i, question)| CardLayout::at(i).map(|layout| CardView { question, layout }))
      .collect()
  }
}

//! Periodic callback scheduling.

use std::{
  cmp::{Ordering, Reverse},
  collections::BinaryHeap,
  fmt,
};

use crate::{app::Context, error::CallbackError};

pub type Callback = Box<dyn FnMut(&mut Context<'_>) -> Result<(), CallbackError> + Send>;

pub(crate) struct Timer {
  pub(crate) next_fire: i64,
  pub(crate) name: String,
  pub(crate) period: i64,
  /// Fires left; `None` repeats forever.
  pub(crate) remaining: Option<u32>,
  pub(crate) callback: Callback,
}

impl Timer {
  /// Advance to the next period. Returns `false` when the timer is spent.
  pub(crate) fn advance(&mut self) -> bool {
    self.next_fire = self.next_fire.saturating_add(self.period);
    match &mut self.remaining {
      None => true,
      Some(n) => {
        *n = n.saturating_sub(1);
        *n > 0
      }
    }
  }
}

impl fmt::Debug for Timer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Timer")
      .field("name", &self.name)
      .field("next_fire", &self.next_fire)
      .field("period", &self.period)
      .field("remaining", &self.remaining)
      .finish_non_exhaustive()
  }
}

impl PartialEq for Timer {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Timer {
  fn cmp(&self, other: &Self) -> Ordering {
    (self.next_fire, &self.name).cmp(&(other.next_fire, &other.name))
  }
}

/// Snapshot of a scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerInfo {
  pub name: String,
  pub next_fire: i64,
  pub period: i64,
  pub remaining: Option<u32>,
}

/// Timers ordered by next fire time, then name.
#[derive(Debug, Default)]
pub struct TimerQueue {
  heap: BinaryHeap<Reverse<Timer>>,
}

impl TimerQueue {
  pub fn contains(&self, name: &str) -> bool {
    self.heap.iter().any(|Reverse(t)| t.name == name)
  }

  pub(crate) fn push(&mut self, timer: Timer) {
    self.heap.push(Reverse(timer));
  }

  /// Remove and return the earliest timer due at or before `now`.
  pub(crate) fn pop_due(&mut self, now: i64) -> Option<Timer> {
    let due = self.heap.peek().is_some_and(|Reverse(t)| t.next_fire <= now);
    if !due {
      return None;
    }
    self.heap.pop().map(|Reverse(t)| t)
  }

  pub fn remove(&mut self, name: &str) -> bool {
    let before = self.heap.len();
    self.heap.retain(|Reverse(t)| t.name != name);
    self.heap.len() != before
  }

  pub fn list(&self) -> Vec<TimerInfo> {
    let mut timers: Vec<TimerInfo> = self
      .heap
      .iter()
      .map(|Reverse(t)| TimerInfo {
        name: t.name.clone(),
        next_fire: t.next_fire,
        period: t.period,
        remaining: t.remaining,
      })
      .collect();
    timers.sort_by(|a, b| (a.next_fire, &a.name).cmp(&(b.next_fire, &b.name)));
    timers
  }

  pub fn len(&self) -> usize {
    self.heap.len()
  }

  pub fn is_empty(&self) -> bool {
    self.heap.is_empty()
  }
}

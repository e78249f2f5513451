//! Hold-back queue ordered by expiry.

use std::{
  cmp::{Ordering, Reverse},
  collections::BinaryHeap,
};

use edgewire_core::Message;

#[derive(Debug, Clone)]
struct Pending {
  expiry: i64,
  seq: u64,
  message: Message,
}

impl PartialEq for Pending {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Pending {
  fn cmp(&self, other: &Self) -> Ordering {
    (self.expiry, self.seq).cmp(&(other.expiry, other.seq))
  }
}

/// Min-heap of messages keyed by expiry; equal expiries pop in push order.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
  heap: BinaryHeap<Reverse<Pending>>,
  seq: u64,
}

impl PendingQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, message: Message, expiry: i64) {
    self.seq += 1;
    self.heap.push(Reverse(Pending {
      expiry,
      seq: self.seq,
      message,
    }));
  }

  /// Pop every message whose expiry is at or before `cutoff`, in expiry order.
  pub fn pop_ready(&mut self, cutoff: i64) -> Vec<Message> {
    let mut ready = Vec::new();
    while let Some(Reverse(next)) = self.heap.peek() {
      if next.expiry > cutoff {
        break;
      }
      if let Some(Reverse(entry)) = self.heap.pop() {
        ready.push(entry.message);
      }
    }
    ready
  }

  /// Earliest expiry still held.
  pub fn next_expiry(&self) -> Option<i64> {
    self.heap.peek().map(|Reverse(p)| p.expiry)
  }

  pub fn len(&self) -> usize {
    self.heap.len()
  }

  pub fn is_empty(&self) -> bool {
    self.heap.is_empty()
  }

  pub fn clear(&mut self) {
    self.heap.clear();
  }
}

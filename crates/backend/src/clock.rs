use std::sync::{
  Arc,
  atomic::{AtomicI64, Ordering},
};

use edgewire_core::time::now_nanos;

/// Source of wall time in nanoseconds.
pub trait Clock: Send + Sync {
  fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> i64 {
    now_nanos()
  }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
  now: Arc<AtomicI64>,
}

impl ManualClock {
  pub fn new(start: i64) -> Self {
    Self {
      now: Arc::new(AtomicI64::new(start)),
    }
  }

  pub fn set(&self, now: i64) {
    self.now.store(now, Ordering::SeqCst);
  }

  pub fn advance(&self, by: i64) {
    self.now.fetch_add(by, Ordering::SeqCst);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> i64 {
    self.now.load(Ordering::SeqCst)
  }
}

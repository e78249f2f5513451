//! Per-asset state: routed data, hold-back queue, dedup cache and timers.

mod pending;
mod timers;

use std::collections::{BTreeMap, HashMap};

use edgewire_core::{Message, MessageKey, StorageType, Topic};
use tracing::{debug, error, trace};

pub use pending::PendingQueue;
pub(crate) use timers::Timer;
pub use timers::{Callback, TimerInfo, TimerQueue};

use crate::{
  app::Context,
  buffer::{BufferError, DataBuffer},
  catalog::Catalog,
  router,
  rules::Rules,
};

/// Value held under a target name.
#[derive(Debug, Clone)]
pub enum Stored {
  Single(Message),
  Buffer(DataBuffer),
}

impl Stored {
  /// The latest message, for either storage kind.
  pub fn latest(&self) -> Option<&Message> {
    match self {
      Stored::Single(message) => Some(message),
      Stored::Buffer(buffer) => buffer.last(),
    }
  }

  pub fn as_buffer(&self) -> Option<&DataBuffer> {
    match self {
      Stored::Buffer(buffer) => Some(buffer),
      Stored::Single(_) => None,
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      Stored::Single(_) => false,
      Stored::Buffer(buffer) => buffer.is_empty(),
    }
  }

  fn messages(&self) -> Vec<Message> {
    match self {
      Stored::Single(message) => vec![message.clone()],
      Stored::Buffer(buffer) => buffer.messages().cloned().collect(),
    }
  }
}

#[derive(Debug, Default)]
pub struct State {
  data: BTreeMap<String, Stored>,
  pub(crate) last_message: HashMap<MessageKey, Message>,
  /// Latest value held back by a limit, per output name.
  pub(crate) suppressed: HashMap<String, Message>,
  pending: PendingQueue,
  timers: TimerQueue,
  params: BTreeMap<String, Message>,
  last_process_time: i64,
  input_count: u64,
  pub(crate) output_count: u64,
}

impl State {
  pub fn new() -> Self {
    Self::default()
  }

  // ==========================================================================
  // Data access
  // ==========================================================================

  pub fn get(&self, key: &str) -> Option<&Stored> {
    self.data.get(key)
  }

  /// Latest message stored under `key`.
  pub fn value(&self, key: &str) -> Option<&Message> {
    self.data.get(key).and_then(Stored::latest)
  }

  pub fn buffer(&self, key: &str) -> Option<&DataBuffer> {
    self.data.get(key).and_then(Stored::as_buffer)
  }

  pub fn buffer_mut(&mut self, key: &str) -> Option<&mut DataBuffer> {
    match self.data.get_mut(key) {
      Some(Stored::Buffer(buffer)) => Some(buffer),
      _ => None,
    }
  }

  pub fn set(&mut self, key: impl Into<String>, value: Stored) {
    self.data.insert(key.into(), value);
  }

  pub fn remove(&mut self, key: &str) -> Option<Stored> {
    self.data.remove(key)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.data.keys().map(String::as_str)
  }

  pub fn data(&self) -> &BTreeMap<String, Stored> {
    &self.data
  }

  pub fn last_message(&self, key: &MessageKey) -> Option<&Message> {
    self.last_message.get(key)
  }

  /// Latest limited value not yet delivered for an output.
  pub fn suppressed(&self, name: &str) -> Option<&Message> {
    self.suppressed.get(name)
  }

  pub fn param(&self, name: &str) -> Option<&Message> {
    self.params.get(name)
  }

  pub fn params(&self) -> &BTreeMap<String, Message> {
    &self.params
  }

  pub(crate) fn set_param(&mut self, message: Message) {
    self.params.insert(message.name().to_string(), message);
  }

  pub fn last_process_time(&self) -> i64 {
    self.last_process_time
  }

  pub fn set_last_process_time(&mut self, time: i64) {
    self.last_process_time = time;
  }

  pub fn input_count(&self) -> u64 {
    self.input_count
  }

  pub fn output_count(&self) -> u64 {
    self.output_count
  }

  pub fn pending(&self) -> &PendingQueue {
    &self.pending
  }

  pub fn timers(&self) -> &TimerQueue {
    &self.timers
  }

  // ==========================================================================
  // Routing
  // ==========================================================================

  /// Dedup, count and store `messages`. Returns the accepted messages.
  ///
  /// With `remove_duplicates`, a message equal to the last one seen for its
  /// `(name, type)` is skipped entirely.
  pub fn route(&mut self, messages: Vec<Message>, rules: &Rules, remove_duplicates: bool) -> Vec<Message> {
    let mut accepted = Vec::with_capacity(messages.len());

    for message in messages {
      let key = message.key();
      if remove_duplicates && self.last_message.get(&key) == Some(&message) {
        trace!(message_name = message.name(), "Skipping duplicate message");
        continue;
      }

      self.input_count += 1;
      self.last_message.insert(key, message.clone());
      self.store(&message, rules);
      accepted.push(message);
    }

    accepted
  }

  /// Store `message` under every target it resolves to.
  ///
  /// A failure for one target is logged and does not affect the others.
  pub fn store(&mut self, message: &Message, rules: &Rules) {
    let routes = router::resolve(rules.topics(), message);
    for route in routes.iter() {
      if let Err(e) = self.apply(route.target, route.topic, message) {
        error!(
          message_name = message.name(),
          message_type = message.type_name(),
          target = route.target,
          error = %e,
          "Failed to store message"
        );
      }
    }
  }

  fn apply(&mut self, target: &str, topic: &Topic, message: &Message) -> Result<(), BufferError> {
    match topic.storage_type() {
      StorageType::None => {
        self.data.insert(target.to_string(), Stored::Single(message.clone()));
      }
      StorageType::Buffered => match self.data.get_mut(target) {
        Some(Stored::Buffer(buffer)) => buffer.insert(message.time_of_validity(), message.clone())?,
        _ => {
          let mut buffer = DataBuffer::from_config(topic.storage_config());
          buffer.insert(message.time_of_validity(), message.clone())?;
          self.data.insert(target.to_string(), Stored::Buffer(buffer));
        }
      },
    }
    Ok(())
  }

  /// Rebuild `data` from everything currently stored, in time order.
  ///
  /// Dedup state and counters are left alone.
  pub fn reprocess(&mut self, rules: &Rules) {
    let mut messages: Vec<Message> = self.data.values().flat_map(Stored::messages).collect();
    messages.sort_by(Message::chronological);
    messages.dedup();

    debug!(count = messages.len(), "Reprocessing stored messages");
    self.data.clear();
    for message in &messages {
      self.store(message, rules);
    }
  }

  /// Apply time and count windows to every buffered target.
  pub fn trim_buffers(&mut self, now: i64) {
    for buffer in self.data.values_mut().filter_map(|stored| match stored {
      Stored::Buffer(buffer) => Some(buffer),
      Stored::Single(_) => None,
    }) {
      buffer.trim(now);
    }
  }

  // ==========================================================================
  // Hold-back queue
  // ==========================================================================

  pub fn push_pending(&mut self, message: Message, expiry: i64) {
    self.pending.push(message, expiry);
  }

  /// Queue `message` until `time_of_validity + delay`.
  pub fn push_delayed(&mut self, message: Message, delay: i64) {
    let expiry = message.time_of_validity().saturating_add(delay);
    self.pending.push(message, expiry);
  }

  pub fn pop_ready(&mut self, cutoff: i64) -> Vec<Message> {
    self.pending.pop_ready(cutoff)
  }

  // ==========================================================================
  // Timers
  // ==========================================================================

  pub(crate) fn schedule(&mut self, timer: Timer) {
    self.timers.push(timer);
  }

  pub fn has_timer(&self, name: &str) -> bool {
    self.timers.contains(name)
  }

  pub fn delete_timer(&mut self, name: &str) -> bool {
    self.timers.remove(name)
  }

  /// Run every timer due at or before `now`.
  ///
  /// Callback errors are logged; the timer keeps its schedule either way.
  /// Messages emitted by callbacks are appended to `outbox`.
  pub fn fire_callbacks(&mut self, now: i64, asset: &str, catalog: &Catalog, outbox: &mut Vec<Message>) -> usize {
    let mut fired = 0;

    while let Some(mut timer) = self.timers.pop_due(now) {
      fired += 1;
      trace!(timer_name = %timer.name, asset, "Firing timer");

      let result = {
        let mut ctx = Context::new(self, asset, catalog, outbox);
        (timer.callback)(&mut ctx)
      };
      if let Err(e) = result {
        error!(timer_name = %timer.name, asset, error = %e, "Timer callback failed");
      }

      if timer.advance() {
        self.timers.push(timer);
      } else {
        debug!(timer_name = %timer.name, asset, "Timer finished");
      }
    }

    fired
  }

  /// Clear data, pending messages, dedup cache, counters and processing time.
  ///
  /// Timers and parameters are kept.
  pub fn reset(&mut self) {
    self.data.clear();
    self.pending.clear();
    self.last_message.clear();
    self.suppressed.clear();
    self.last_process_time = 0;
    self.input_count = 0;
    self.output_count = 0;
  }
}

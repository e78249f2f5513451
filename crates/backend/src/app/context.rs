use edgewire_core::{Message, Payload, time::secs_to_nanos};
use tracing::warn;

use crate::{
  buffer::DataBuffer,
  catalog::Catalog,
  error::AppError,
  state::{Callback, State, Stored, Timer, TimerInfo},
};

/// View of one asset's state handed to processing code and timer callbacks.
pub struct Context<'a> {
  state: &'a mut State,
  asset: &'a str,
  catalog: &'a Catalog,
  outbox: &'a mut Vec<Message>,
  origin: i64,
}

impl<'a> Context<'a> {
  pub(crate) fn new(state: &'a mut State, asset: &'a str, catalog: &'a Catalog, outbox: &'a mut Vec<Message>) -> Self {
    Self {
      state,
      asset,
      catalog,
      outbox,
      origin: 0,
    }
  }

  /// Time to schedule from while the state has not had a pass yet.
  pub(crate) fn with_origin(mut self, origin: i64) -> Self {
    self.origin = origin;
    self
  }

  /// Asset key of this state (empty for the global state).
  pub fn asset(&self) -> &str {
    self.asset
  }

  /// Processing time of this pass, in nanoseconds.
  pub fn now(&self) -> i64 {
    self.state.last_process_time()
  }

  pub fn state(&self) -> &State {
    &*self.state
  }

  pub fn state_mut(&mut self) -> &mut State {
    &mut *self.state
  }

  pub fn get(&self, key: &str) -> Option<&Stored> {
    self.state.get(key)
  }

  pub fn value(&self, key: &str) -> Option<&Message> {
    self.state.value(key)
  }

  pub fn buffer(&self, key: &str) -> Option<&DataBuffer> {
    self.state.buffer(key)
  }

  pub fn buffer_mut(&mut self, key: &str) -> Option<&mut DataBuffer> {
    self.state.buffer_mut(key)
  }

  pub fn set(&mut self, key: impl Into<String>, value: Stored) {
    self.state.set(key, value);
  }

  pub fn param(&self, name: &str) -> Option<&Message> {
    self.state.param(name)
  }

  /// Queue `message` for emission at the end of the pass, subject to limits.
  pub fn emit(&mut self, message: Message) {
    self.outbox.push(message);
  }

  /// Build a validated message for a declared input/output.
  ///
  /// `time_of_validity` defaults to the current processing time.
  pub fn make_message(
    &self,
    name: &str,
    payload: Payload,
    type_name: Option<&str>,
    time_of_validity: Option<i64>,
  ) -> Result<Message, AppError> {
    let tov = time_of_validity.unwrap_or_else(|| self.now());
    self.catalog.make_message(name, type_name, payload, tov)
  }

  /// Schedule `callback` every `period` seconds, first firing at
  /// `now + start + period`. A `count` of zero repeats forever.
  ///
  /// A state that has not been processed yet schedules from the wall clock.
  ///
  /// Returns the timer name, generated when `name` is `None`.
  pub fn create_timer(
    &mut self,
    callback: Callback,
    period: f64,
    name: Option<&str>,
    count: u32,
    start: f64,
  ) -> Result<String, AppError> {
    let period = secs_to_nanos(period);
    if period <= 0 {
      return Err(AppError::InvalidPeriod);
    }

    let name = match name {
      Some(name) if self.state.has_timer(name) => {
        warn!(timer_name = name, asset = self.asset, "Timer already exists");
        return Err(AppError::DuplicateTimer(name.to_string()));
      }
      Some(name) => name.to_string(),
      None => loop {
        let candidate = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        if !self.state.has_timer(&candidate) {
          break candidate;
        }
      },
    };

    let base = match self.now() {
      0 => self.origin,
      now => now,
    };
    let next_fire = base
      .saturating_add(secs_to_nanos(start))
      .saturating_add(period);
    self.state.schedule(Timer {
      next_fire,
      name: name.clone(),
      period,
      remaining: (count > 0).then_some(count),
      callback,
    });
    Ok(name)
  }

  pub fn delete_timer(&mut self, name: &str) -> bool {
    self.state.delete_timer(name)
  }

  pub fn timers(&self) -> Vec<TimerInfo> {
    self.state.timers().list()
  }
}

//! Application core: receive, route, store, process and emit.
//!
//! An [`Application`] owns one [`State`] per asset key and drives a
//! [`Processor`] under two models:
//!
//! - event driven: [`Application::on_data`] queues new messages, then runs a pass
//! - poll driven: [`Application::on_poll`] runs a pass without new input
//!
//! A processing pass, per asset: release held-back messages, route them,
//! call the processor, fire due timers, trim buffers, then rate limit and
//! return everything emitted.

mod checks;
mod context;
mod emit;
mod partition;

use std::collections::BTreeMap;

use edgewire_core::{AppConfig, Check, Limit, Message, Payload, RuleSet, TopicSpec, TypeRegistry, merge};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

pub use checks::DataStatus;
pub use context::Context;
pub use partition::{GLOBAL_ASSET, asset_key, partition};

use crate::{
  catalog::Catalog,
  clock::{Clock, SystemClock},
  error::{AppError, ProcessError},
  rules::{Rules, SharedRules},
  state::{Callback, State},
};

/// Read-back limit used for pre-fill selects.
pub const PRE_FILL_LIMIT: usize = 1 << 16;

/// User processing logic.
pub trait Processor: Send {
  /// Rules this processor is built around. Configured rules are merged on top.
  fn rules(&self) -> RuleSet {
    RuleSet::default()
  }

  fn on_initialize(&mut self, _config: &AppConfig) -> Result<(), ProcessError> {
    Ok(())
  }

  /// Called with the messages accepted in this pass, if any.
  fn process_data(&mut self, _ctx: &mut Context<'_>, _messages: &[Message]) -> Result<(), ProcessError> {
    Ok(())
  }

  /// Called once per pass for every asset.
  fn process(&mut self, _ctx: &mut Context<'_>) -> Result<(), ProcessError> {
    Ok(())
  }

  fn on_terminate(&mut self) -> Result<(), ProcessError> {
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
  NotInitialized,
  Initialized,
  Terminated,
}

pub struct Application<P, C = SystemClock> {
  processor: P,
  clock: C,
  config: AppConfig,
  rules: SharedRules,
  catalog: Catalog,
  states: BTreeMap<String, State>,
  status: AppStatus,
  startup_time: i64,
}

impl<P: Processor> Application<P, SystemClock> {
  pub fn new(processor: P, config: AppConfig) -> Result<Self, AppError> {
    Self::with_clock(processor, config, SystemClock)
  }
}

impl<P: Processor, C: Clock> Application<P, C> {
  pub fn with_clock(processor: P, config: AppConfig, clock: C) -> Result<Self, AppError> {
    config.validate()?;
    let rule_set = merge(&processor.rules(), &config.rules());
    let rules = SharedRules::new(Rules::compile(&rule_set)?);
    let catalog = Catalog::new(TypeRegistry::with_builtins(), &config.inputs, &config.outputs);

    Ok(Self {
      processor,
      clock,
      config,
      rules,
      catalog,
      states: BTreeMap::new(),
      status: AppStatus::NotInitialized,
      startup_time: 0,
    })
  }

  /// Use a rule set shared with other applications instead of this one's own.
  pub fn with_shared_rules(mut self, rules: SharedRules) -> Self {
    self.rules = rules;
    self
  }

  pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
    *self.catalog.registry_mut() = registry;
    self
  }

  // ==========================================================================
  // Accessors
  // ==========================================================================

  pub fn status(&self) -> AppStatus {
    self.status
  }

  pub fn config(&self) -> &AppConfig {
    &self.config
  }

  pub fn rules(&self) -> &SharedRules {
    &self.rules
  }

  pub fn catalog(&self) -> &Catalog {
    &self.catalog
  }

  pub fn processor(&self) -> &P {
    &self.processor
  }

  pub fn processor_mut(&mut self) -> &mut P {
    &mut self.processor
  }

  pub fn startup_time(&self) -> i64 {
    self.startup_time
  }

  pub fn state(&self, asset: &str) -> Option<&State> {
    self.states.get(asset)
  }

  /// State for `asset`, created on first access.
  pub fn state_mut(&mut self, asset: &str) -> &mut State {
    self.states.entry(asset.to_string()).or_default()
  }

  pub fn assets(&self) -> impl Iterator<Item = &str> {
    self.states.keys().map(String::as_str)
  }

  // ==========================================================================
  // Lifecycle
  // ==========================================================================

  /// Start the application with its initial parameters.
  pub fn on_initialize(&mut self, parameters: Vec<Message>) -> Result<(), AppError> {
    match self.status {
      AppStatus::Terminated => return Err(AppError::Terminated),
      AppStatus::Initialized => {
        warn!("Application already initialized");
        return Ok(());
      }
      AppStatus::NotInitialized => {}
    }

    self.startup_time = self.clock.now();
    self.on_parameter_change(parameters);

    if let Err(e) = self.processor.on_initialize(&self.config) {
      error!(error = %e, "Processor initialization failed");
    }

    self.status = AppStatus::Initialized;
    info!(startup_time = self.startup_time, "Application initialized");
    Ok(())
  }

  /// Best-effort shutdown. Processor errors are logged.
  pub fn on_terminate(&mut self) {
    if self.status == AppStatus::Terminated {
      return;
    }
    if let Err(e) = self.processor.on_terminate() {
      error!(error = %e, "Processor termination failed");
    }
    self.status = AppStatus::Terminated;
    info!("Application terminated");
  }

  fn ensure_running(&self) -> Result<(), AppError> {
    match self.status {
      AppStatus::Initialized => Ok(()),
      AppStatus::NotInitialized => Err(AppError::NotInitialized),
      AppStatus::Terminated => Err(AppError::Terminated),
    }
  }

  /// Names to read back at startup to seed the dedup/limit cache.
  pub fn last_output_names(&self) -> Vec<String> {
    if !self.config.last_outputs {
      return Vec::new();
    }
    self.catalog.output_names().map(str::to_string).collect()
  }

  /// Remember previously emitted outputs so limits and dedup survive restarts.
  pub fn seed_last_outputs(&mut self, messages: Vec<Message>) {
    for (asset, messages) in partition(messages, &self.config.asset_getter) {
      let state = self.states.entry(asset).or_default();
      for message in messages {
        let key = message.key();
        let newer = state
          .last_message
          .get(&key)
          .is_none_or(|last| last.time_of_validity() <= message.time_of_validity());
        if newer {
          state.last_message.insert(key, message);
        }
      }
    }
  }

  /// Window `[startup - pre_fill, startup]` to read inputs back from, if enabled.
  pub fn pre_fill_window(&self) -> Option<(i64, i64)> {
    let pre_fill = self.config.pre_fill_nanos();
    (pre_fill > 0).then(|| (self.startup_time.saturating_sub(pre_fill), self.startup_time))
  }

  pub fn input_names(&self) -> Vec<String> {
    self.catalog.input_names().map(str::to_string).collect()
  }

  /// Route historical messages into state without running the processor.
  pub fn prefill(&mut self, mut messages: Vec<Message>) {
    messages.sort_by(Message::chronological);
    let rules = self.rules.snapshot();
    let remove_duplicates = self.config.remove_duplicates;

    for (asset, messages) in partition(messages, &self.config.asset_getter) {
      let state = self.states.entry(asset).or_default();
      if let Some(latest) = messages.iter().map(Message::time_of_validity).max()
        && latest > state.last_process_time()
      {
        state.set_last_process_time(latest);
      }
      let accepted = state.route(messages, &rules, remove_duplicates);
      debug!(count = accepted.len(), "Pre-filled messages");
    }
  }

  /// Store parameter messages for their assets.
  pub fn on_parameter_change(&mut self, parameters: Vec<Message>) {
    for (asset, messages) in partition(parameters, &self.config.asset_getter) {
      let state = self.states.entry(asset).or_default();
      for message in messages {
        debug!(parameter = message.name(), "Parameter updated");
        state.set_param(message);
      }
    }
  }

  // ==========================================================================
  // Drive models
  // ==========================================================================

  /// Accept new messages and run a processing pass. Returns what to send.
  pub fn on_data(&mut self, messages: Vec<Message>) -> Result<Vec<Message>, AppError> {
    self.ensure_running()?;
    let now = self.clock.now();
    let delay = self.config.delay_nanos();

    for (asset, messages) in partition(messages, &self.config.asset_getter) {
      let state = self.states.entry(asset).or_default();

      if self.config.offset_timestamps
        && let Some(latest) = messages.iter().map(Message::time_of_validity).max()
        && latest > state.last_process_time()
      {
        state.set_last_process_time(latest);
      }

      for message in messages {
        state.push_delayed(message, delay);
      }
    }

    Ok(self.process_all(now))
  }

  /// Run a processing pass without new input. Returns what to send.
  pub fn on_poll(&mut self) -> Result<Vec<Message>, AppError> {
    self.ensure_running()?;
    let now = self.clock.now();
    Ok(self.process_all(now))
  }

  /// Run a pass over every asset. Without offset timestamps every state,
  /// including ones that got no data this time, is processed at `now`.
  fn process_all(&mut self, now: i64) -> Vec<Message> {
    let rules = self.rules.snapshot();
    let mut delivered = Vec::new();

    for (asset, state) in &mut self.states {
      if !self.config.offset_timestamps {
        state.set_last_process_time(now);
      }
      let emitted = run_pass(
        &mut self.processor,
        state,
        asset,
        &self.catalog,
        &rules,
        self.config.remove_duplicates,
        now,
      );
      delivered.extend(
        emitted
          .into_iter()
          .filter_map(|message| emit::apply_limit(state, &rules, message)),
      );
    }

    delivered
  }

  /// Emit outside a processing pass. Returns the message if the limit allows it.
  pub fn emit(&mut self, asset: &str, message: Message) -> Option<Message> {
    let rules = self.rules.snapshot();
    emit::apply_limit(self.state_mut(asset), &rules, message)
  }

  // ==========================================================================
  // Rules
  // ==========================================================================

  pub fn add_topic(&mut self, spec: &TopicSpec, reprocess: bool) -> Result<(), AppError> {
    self.rules.add_topic(spec)?;
    if reprocess {
      self.reprocess();
    }
    Ok(())
  }

  pub fn remove_topic(&mut self, pattern: &str, reprocess: bool) -> bool {
    let removed = self.rules.remove_topic(pattern);
    if removed && reprocess {
      self.reprocess();
    }
    removed
  }

  pub fn add_check(&mut self, name: &str, check: Check) -> Result<(), AppError> {
    Ok(self.rules.add_check(name, check)?)
  }

  pub fn remove_check(&mut self, name: &str) -> bool {
    self.rules.remove_check(name)
  }

  pub fn add_limit(&mut self, name: &str, limit: Limit) -> Result<(), AppError> {
    Ok(self.rules.add_limit(name, limit)?)
  }

  pub fn remove_limit(&mut self, name: &str) -> bool {
    self.rules.remove_limit(name)
  }

  /// Rebuild every asset's data under the current rules.
  pub fn reprocess(&mut self) {
    let rules = self.rules.snapshot();
    for (asset, state) in &mut self.states {
      debug!(asset = %asset, "Reprocessing");
      state.reprocess(&rules);
    }
  }

  // ==========================================================================
  // Helpers for host code
  // ==========================================================================

  /// Health of the checked names for `asset`.
  pub fn data_status(&self, asset: &str) -> BTreeMap<String, DataStatus> {
    let rules = self.rules.snapshot();
    let empty = State::default();
    let state = self.states.get(asset).unwrap_or(&empty);
    let timestamp = state.last_process_time().saturating_sub(self.config.delay_nanos());
    checks::data_status(state, rules.checks(), self.catalog.input_names(), timestamp)
  }

  /// Build a validated message. `time_of_validity` defaults to the asset's
  /// processing time minus the configured delay.
  pub fn make_message(
    &self,
    asset: &str,
    name: &str,
    payload: Payload,
    type_name: Option<&str>,
    time_of_validity: Option<i64>,
  ) -> Result<Message, AppError> {
    let tov = time_of_validity.unwrap_or_else(|| {
      let now = self.states.get(asset).map_or(self.startup_time, State::last_process_time);
      now.saturating_sub(self.config.delay_nanos())
    });
    self.catalog.make_message(name, type_name, payload, tov)
  }

  /// Schedule a timer on `asset`'s state. See [`Context::create_timer`].
  pub fn create_timer(
    &mut self,
    asset: &str,
    callback: Callback,
    period: f64,
    name: Option<&str>,
    count: u32,
    start: f64,
  ) -> Result<String, AppError> {
    let state = self.states.entry(asset.to_string()).or_default();
    let mut outbox = Vec::new();
    let mut ctx = Context::new(state, asset, &self.catalog, &mut outbox).with_origin(self.clock.now());
    ctx.create_timer(callback, period, name, count, start)
  }

  pub fn delete_timer(&mut self, asset: &str, name: &str) -> bool {
    self.states.get_mut(asset).is_some_and(|state| state.delete_timer(name))
  }

  /// Clear one asset's data, or every asset's when `asset` is `None`.
  pub fn reset(&mut self, asset: Option<&str>) {
    match asset {
      Some(asset) => {
        if let Some(state) = self.states.get_mut(asset) {
          state.reset();
        }
      }
      None => self.states.values_mut().for_each(State::reset),
    }
  }
}

/// One processing pass over a single asset. Returns the raw (unlimited) emissions.
fn run_pass<P: Processor>(
  processor: &mut P,
  state: &mut State,
  asset: &str,
  catalog: &Catalog,
  rules: &Rules,
  remove_duplicates: bool,
  origin: i64,
) -> Vec<Message> {
  let now = state.last_process_time();
  let ready = state.pop_ready(now);
  let accepted = state.route(ready, rules, remove_duplicates);
  trace!(asset, accepted = accepted.len(), "Processing pass");

  let mut outbox = Vec::new();
  {
    let mut ctx = Context::new(state, asset, catalog, &mut outbox).with_origin(origin);

    if !accepted.is_empty()
      && let Err(e) = processor.process_data(&mut ctx, &accepted)
    {
      error!(asset, error = %e, "process_data failed");
    }

    if let Err(e) = processor.process(&mut ctx) {
      error!(asset, error = %e, "process failed");
    }
  }

  state.fire_callbacks(now, asset, catalog, &mut outbox);
  state.trim_buffers(now);
  outbox
}

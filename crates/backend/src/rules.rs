//! Process-wide routing configuration: topics, checks and limits.
//!
//! Readers take an immutable snapshot; writers build a new [`Rules`] value
//! and swap it in, so a pass never observes a half-updated routing table.

use std::{
  collections::BTreeMap,
  sync::{Arc, PoisonError, RwLock},
};

use edgewire_core::{Check, ConfigError, Limit, RuleSet, Topic, TopicError, TopicSpec};
use tracing::debug;

/// Compiled rule set. Topics are stored in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct Rules {
  topics: Vec<Topic>,
  checks: BTreeMap<String, Check>,
  limits: BTreeMap<String, Limit>,
}

impl Rules {
  pub fn compile(rule_set: &RuleSet) -> Result<Self, ConfigError> {
    rule_set.validate()?;
    let mut rules = Self {
      topics: Vec::with_capacity(rule_set.topics.len()),
      checks: rule_set.checks.clone(),
      limits: rule_set.limits.clone(),
    };
    for spec in &rule_set.topics {
      rules.upsert_topic(Topic::compile(spec)?);
    }
    Ok(rules)
  }

  pub fn topics(&self) -> &[Topic] {
    &self.topics
  }

  pub fn checks(&self) -> &BTreeMap<String, Check> {
    &self.checks
  }

  pub fn limits(&self) -> &BTreeMap<String, Limit> {
    &self.limits
  }

  pub fn limit(&self, name: &str) -> Option<&Limit> {
    self.limits.get(name)
  }

  pub fn to_rule_set(&self) -> RuleSet {
    RuleSet {
      topics: self.topics.iter().map(Topic::to_spec).collect(),
      checks: self.checks.clone(),
      limits: self.limits.clone(),
    }
  }

  /// Replace a topic with the same pattern in place, or add it. Equal
  /// specificity keeps registration order.
  fn upsert_topic(&mut self, topic: Topic) {
    match self.topics.iter_mut().find(|t| t.pattern() == topic.pattern()) {
      Some(existing) => *existing = topic,
      None => {
        self.topics.push(topic);
        self.topics.sort_by(|a, b| a.pattern().cmp_specificity(b.pattern()));
      }
    }
  }
}

/// Shared, swappable handle to the active [`Rules`].
#[derive(Debug, Clone, Default)]
pub struct SharedRules {
  inner: Arc<RwLock<Arc<Rules>>>,
}

impl SharedRules {
  pub fn new(rules: Rules) -> Self {
    Self {
      inner: Arc::new(RwLock::new(Arc::new(rules))),
    }
  }

  pub fn snapshot(&self) -> Arc<Rules> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn update<T, E>(&self, f: impl FnOnce(&mut Rules) -> Result<T, E>) -> Result<T, E> {
    let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    let mut next = Rules::clone(&guard);
    let out = f(&mut next)?;
    *guard = Arc::new(next);
    Ok(out)
  }

  pub fn add_topic(&self, spec: &TopicSpec) -> Result<(), TopicError> {
    let topic = Topic::compile(spec)?;
    debug!(pattern = %spec.pattern, "Adding topic");
    self.update(|rules| {
      rules.upsert_topic(topic);
      Ok(())
    })
  }

  /// Returns whether a topic with `pattern` was registered.
  pub fn remove_topic(&self, pattern: &str) -> bool {
    let removed: Result<bool, std::convert::Infallible> = self.update(|rules| {
      let before = rules.topics.len();
      rules.topics.retain(|t| t.pattern().as_str() != pattern);
      Ok(rules.topics.len() != before)
    });
    matches!(removed, Ok(true))
  }

  pub fn add_check(&self, name: &str, check: Check) -> Result<(), ConfigError> {
    check.validate(name)?;
    self.update(|rules| {
      rules.checks.insert(name.to_string(), check);
      Ok(())
    })
  }

  pub fn remove_check(&self, name: &str) -> bool {
    let removed: Result<bool, std::convert::Infallible> =
      self.update(|rules| Ok(rules.checks.remove(name).is_some()));
    matches!(removed, Ok(true))
  }

  pub fn add_limit(&self, name: &str, limit: Limit) -> Result<(), ConfigError> {
    limit.validate(name)?;
    self.update(|rules| {
      rules.limits.insert(name.to_string(), limit);
      Ok(())
    })
  }

  pub fn remove_limit(&self, name: &str) -> bool {
    let removed: Result<bool, std::convert::Infallible> =
      self.update(|rules| Ok(rules.limits.remove(name).is_some()));
    matches!(removed, Ok(true))
  }
}

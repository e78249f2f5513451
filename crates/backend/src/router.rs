//! Resolve storage targets for a message.

use edgewire_core::{Message, Topic};
use tracing::{debug, error, warn};

/// A resolved target and the topic that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route<'a> {
  pub target: &'a str,
  pub topic: &'a Topic,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Routes<'a> {
  targets: Vec<String>,
  topics: Vec<&'a Topic>,
}

impl<'a> Routes<'a> {
  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn targets(&self) -> &[String] {
    &self.targets
  }

  pub fn iter(&self) -> impl Iterator<Item = Route<'_>> {
    self
      .targets
      .iter()
      .zip(&self.topics)
      .map(|(target, topic)| Route { target, topic })
  }
}

/// Evaluate `topics` (already in evaluation order) against `message`.
///
/// - Each matching topic contributes its rendered target once.
/// - A target that fails to render is logged and skipped.
/// - A matching topic without a target discards the message from there on.
/// - A matching `final` topic stops evaluation.
pub fn resolve<'a>(topics: &'a [Topic], message: &Message) -> Routes<'a> {
  let subject = message.subject();
  let mut routes = Routes::default();

  for topic in topics {
    if !topic.pattern().matches(&subject) {
      continue;
    }

    let Some(template) = topic.target() else {
      debug!(pattern = %topic.pattern(), message_name = message.name(), "Message discarded by topic");
      break;
    };

    match template.render(message) {
      Ok(target) if target.is_empty() => {
        debug!(pattern = %topic.pattern(), message_name = message.name(), "Message discarded by empty target");
        break;
      }
      Ok(target) => {
        if !routes.targets.contains(&target) {
          routes.targets.push(target);
          routes.topics.push(topic);
        }
      }
      Err(e) => {
        error!(
          pattern = %topic.pattern(),
          message_name = message.name(),
          message_type = message.type_name(),
          error = %e,
          "Unable to resolve target"
        );
      }
    }

    if topic.is_final() {
      break;
    }
  }

  if routes.is_empty() {
    warn!(message_name = message.name(), message_type = message.type_name(), "Unmatched message");
  }

  routes
}

//! Asset key extraction.

use std::collections::BTreeMap;

use edgewire_core::Message;
use serde_json::Value;
use tracing::warn;

/// Key of the single state used when no asset getter is configured.
pub const GLOBAL_ASSET: &str = "";

/// Asset key for `message`: the values at `getters` joined with `/`.
///
/// `None` when a getter field is missing or not a scalar.
pub fn asset_key(message: &Message, getters: &[String]) -> Option<String> {
  if getters.is_empty() {
    return Some(GLOBAL_ASSET.to_string());
  }

  let mut parts = Vec::with_capacity(getters.len());
  for path in getters {
    let part = match message.field(path)? {
      Value::String(s) => s,
      Value::Number(n) => n.to_string(),
      Value::Bool(b) => b.to_string(),
      Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    parts.push(part);
  }
  Some(parts.join("/"))
}

/// Group messages by asset key, keeping arrival order within each group.
pub fn partition(messages: Vec<Message>, getters: &[String]) -> BTreeMap<String, Vec<Message>> {
  let mut groups: BTreeMap<String, Vec<Message>> = BTreeMap::new();
  for message in messages {
    match asset_key(&message, getters) {
      Some(key) => groups.entry(key).or_default().push(message),
      None => warn!(
        message_name = message.name(),
        message_type = message.type_name(),
        "Unable to resolve asset for message"
      ),
    }
  }
  groups
}

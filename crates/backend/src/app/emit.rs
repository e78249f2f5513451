//! Output rate limiting.

use std::cmp::max;

use edgewire_core::Message;
use tracing::{debug, warn};

use crate::{rules::Rules, state::State};

/// Pass `message` through the limit registered for its name.
///
/// Returns the message when it should be sent. With a limit, the lag to the
/// last message of the same `(name, type)` decides:
///
/// - `lag < throttle`: the last known value becomes `message`, nothing is sent
/// - `lag < max(throttle, frequency)`: nothing is sent
///
/// Held back values are remembered per name in [`State::suppressed`].
pub(crate) fn apply_limit(state: &mut State, rules: &Rules, message: Message) -> Option<Message> {
  if message.name().is_empty() {
    warn!(message_type = message.type_name(), "Emitted messages require a name");
    return None;
  }

  let key = message.key();
  if let Some(limit) = rules.limit(message.name())
    && let Some(last) = state.last_message.get(&key)
  {
    let throttle = limit.throttle_nanos();
    let frequency = limit.frequency_nanos();
    let lag = max(message.time_of_validity().saturating_sub(last.time_of_validity()), 0);

    if lag < throttle {
      state.last_message.insert(key.clone(), message.clone());
    }
    if lag < max(throttle, frequency) {
      debug!(message_name = message.name(), lag, "Emission suppressed by limit");
      state.suppressed.insert(message.name().to_string(), message);
      return None;
    }
  }

  state.output_count += 1;
  state.suppressed.remove(message.name());
  state.last_message.insert(key, message.clone());
  Some(message)
}

//! Declared inputs/outputs and the message type registry.

use std::collections::BTreeMap;

use edgewire_core::{Message, MessageInfo, Payload, TypeRegistry};
use tracing::warn;

use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
  registry: TypeRegistry,
  inputs: BTreeMap<String, String>,
  outputs: BTreeMap<String, String>,
}

impl Catalog {
  pub fn new(registry: TypeRegistry, inputs: &[MessageInfo], outputs: &[MessageInfo]) -> Self {
    let collect = |infos: &[MessageInfo]| {
      infos
        .iter()
        .map(|info| (info.name.clone(), info.type_name.clone()))
        .collect::<BTreeMap<_, _>>()
    };
    Self {
      registry,
      inputs: collect(inputs),
      outputs: collect(outputs),
    }
  }

  pub fn registry(&self) -> &TypeRegistry {
    &self.registry
  }

  pub fn registry_mut(&mut self) -> &mut TypeRegistry {
    &mut self.registry
  }

  pub fn inputs(&self) -> &BTreeMap<String, String> {
    &self.inputs
  }

  pub fn outputs(&self) -> &BTreeMap<String, String> {
    &self.outputs
  }

  pub fn input_names(&self) -> impl Iterator<Item = &str> + Clone {
    self.inputs.keys().map(String::as_str)
  }

  pub fn output_names(&self) -> impl Iterator<Item = &str> {
    self.outputs.keys().map(String::as_str)
  }

  /// Declared type for `name`, inputs first.
  pub fn declared_type(&self, name: &str) -> Option<&str> {
    self
      .inputs
      .get(name)
      .or_else(|| self.outputs.get(name))
      .map(String::as_str)
  }

  /// Build and validate a message.
  ///
  /// Without an explicit type the declared type of `name` is used. An explicit
  /// type that disagrees with the declaration is accepted with a warning.
  pub fn make_message(
    &self,
    name: &str,
    type_name: Option<&str>,
    payload: Payload,
    time_of_validity: i64,
  ) -> Result<Message, AppError> {
    if name.is_empty() {
      return Err(AppError::EmptyName);
    }

    let declared = self.declared_type(name);
    let type_name = match (type_name, declared) {
      (Some(given), Some(declared)) if given != declared => {
        warn!(message_name = name, given, declared, "Message type differs from declaration");
        given
      }
      (Some(given), _) => given,
      (None, Some(declared)) => declared,
      (None, None) => return Err(AppError::UnknownMessage(name.to_string())),
    };

    let message = Message::new(type_name, name, time_of_validity).with_payload(payload);
    self.registry.validate(&message)?;
    Ok(message)
  }
}

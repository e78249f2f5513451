pub mod config;
pub mod message;
pub mod schema;
pub mod template;
pub mod time;
pub mod topic;

pub use config::{
  AppConfig, Check, Compression, Config, ConfigError, Limit, LoggingConfig, MessageInfo, RuleSet, TransportConfig, merge,
};
pub use message::{Message, MessageKey, Payload};
pub use schema::{FieldKind, FieldSpec, Schema, SchemaError, TypeRegistry};
pub use template::{Template, TemplateError};
pub use topic::{DeltaKeep, StorageConfig, StorageType, Topic, TopicError, TopicPattern, TopicSpec};

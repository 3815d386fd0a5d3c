//! Configuration documents.
//!
//! ```yaml
//! platform: langfuse
//! service:
//!   name: support-bot
//!   version: 2.1.0
//! langfuse:
//!   public_key: ${LANGFUSE_PUBLIC_KEY}
//!   secret_key: ${LANGFUSE_SECRET_KEY}
//!   host: ${LANGFUSE_HOST:-https://cloud.langfuse.com}
//! instrumentation:
//!   enabled: [tracing]
//! validation:
//!   mode: strict
//! ```
//!
//! Only the block named by `platform` is read. Placeholders are substituted
//! in string values before validation.

pub mod env;
mod loader;
mod types;

pub use loader::{ConfigLoader, ConfigSource, Resolution, CONFIG_ENV_VAR};
pub use types::{
    ArizeSettings, Config, ConsoleSettings, LangfuseSettings, LangsmithSettings, OtlpSettings,
    PhoenixSettings, Platform, PlatformSettings, ServiceConfig, ValidationMode, ARIZE_ENDPOINT,
    DEFAULT_SERVICE_NAME, LANGFUSE_HOST, LANGSMITH_ENDPOINT, PHOENIX_ENDPOINT,
};

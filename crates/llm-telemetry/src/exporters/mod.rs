//! Exporter registry and dispatch.
//!
//! Each [`Platform`] maps to one [`ExporterFactory`]. The table is assembled
//! once through [`ExporterRegistryBuilder`] and cannot change afterwards;
//! adding a backend is a single `register` call.

mod builtin;
mod console;
mod memory;

pub use builtin::{
    ArizeExporter, ConsoleExporter, LangfuseExporter, LangsmithExporter, NoopExporter,
    OtlpExporter, OtlpTarget, PhoenixExporter, EXPORT_TIMEOUT,
};
pub use console::ConsoleSpanExporter;
pub use memory::InMemorySpanExporter;

use crate::config::{Config, Platform, PlatformSettings};
use crate::error::{ConfigError, DependencyError, InitError};
use futures_util::future::BoxFuture;
use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::runtime::TokioCurrentThread;
use opentelemetry_sdk::trace::{self as sdktrace, TracerProvider};
use opentelemetry_sdk::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Resource attribute carrying the project name for OpenInference backends.
pub const PROJECT_NAME_ATTRIBUTE: &str = "openinference.project.name";

const SERVICE_NAME: &str = "service.name";
const SERVICE_VERSION: &str = "service.version";

/// Builds the exporter, and from it the tracer provider, for one backend.
///
/// A factory whose backend is not compiled in returns a [`DependencyError`]
/// explaining how to enable it. Field validation belongs to the config
/// loader; once its dependency is present a factory does not fail.
pub trait ExporterFactory: Send + Sync {
    /// Creates the span exporter for `config`.
    fn create_exporter(&self, config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError>;

    /// Creates a provider that batches spans into [`create_exporter`](Self::create_exporter).
    ///
    /// Batches are exported from a background thread owned by the SDK.
    fn create_provider(&self, config: &Config) -> Result<TracerProvider, DependencyError> {
        let exporter = BoxedExporter(self.create_exporter(config)?);
        Ok(provider_builder(config)
            .with_batch_exporter(exporter, TokioCurrentThread)
            .build())
    }
}

/// A provider builder carrying the resource for `config`.
pub fn provider_builder(config: &Config) -> sdktrace::Builder {
    TracerProvider::builder().with_config(sdktrace::config().with_resource(resource_for(config)))
}

/// Resource attributes derived from a configuration.
pub fn resource_for(config: &Config) -> Resource {
    let mut attributes = vec![KeyValue::new(SERVICE_NAME, config.service.name.clone())];
    if let Some(version) = &config.service.version {
        attributes.push(KeyValue::new(SERVICE_VERSION, version.clone()));
    }
    let project = match &config.settings {
        PlatformSettings::Arize(s) => s.project_name.as_deref(),
        PlatformSettings::Phoenix(s) => s.project_name.as_deref(),
        _ => None,
    };
    if let Some(project) = project.filter(|p| !p.is_empty()) {
        attributes.push(KeyValue::new(PROJECT_NAME_ATTRIBUTE, project.to_string()));
    }
    Resource::default().merge(&Resource::new(attributes))
}

/// Lets a factory's boxed exporter feed the SDK's generic processors.
pub(crate) struct BoxedExporter(pub(crate) Box<dyn SpanExporter>);

impl fmt::Debug for BoxedExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedExporter")
    }
}

impl SpanExporter for BoxedExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.0.export(batch)
    }

    fn shutdown(&mut self) {
        self.0.shutdown();
    }
}

/// Immutable platform to factory table.
#[derive(Clone)]
pub struct ExporterRegistry {
    factories: BTreeMap<Platform, Arc<dyn ExporterFactory>>,
}

impl fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterRegistry")
            .field("platforms", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExporterRegistry {
    pub fn builder() -> ExporterRegistryBuilder {
        ExporterRegistryBuilder::default()
    }

    /// Every built-in backend.
    pub fn builtin() -> Self {
        Self::builder().with_builtin().build()
    }

    /// Looks up the factory for `platform`.
    pub fn resolve(&self, platform: Platform) -> Result<&Arc<dyn ExporterFactory>, ConfigError> {
        self.factories
            .get(&platform)
            .ok_or_else(|| ConfigError::UnregisteredPlatform(platform.to_string()))
    }

    /// Resolves the configured platform and builds its provider.
    pub fn dispatch(&self, config: &Config) -> Result<TracerProvider, InitError> {
        let platform = config.platform();
        let factory = self.resolve(platform)?;
        debug!(%platform, "creating tracer provider");
        let provider = factory.create_provider(config)?;
        info!(%platform, service = %config.service.name, "tracer provider created");
        Ok(provider)
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.factories.contains_key(&platform)
    }

    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.factories.keys().copied()
    }
}

/// Collects factories for an [`ExporterRegistry`].
#[derive(Default)]
pub struct ExporterRegistryBuilder {
    factories: BTreeMap<Platform, Arc<dyn ExporterFactory>>,
}

impl ExporterRegistryBuilder {
    /// Adds a factory. A later registration for the same platform replaces the earlier one.
    pub fn register(mut self, platform: Platform, factory: impl ExporterFactory + 'static) -> Self {
        self.factories.insert(platform, Arc::new(factory));
        self
    }

    /// Adds the built-in backends.
    pub fn with_builtin(self) -> Self {
        self.register(Platform::Arize, ArizeExporter)
            .register(Platform::Phoenix, PhoenixExporter)
            .register(Platform::Langfuse, LangfuseExporter)
            .register(Platform::Langsmith, LangsmithExporter)
            .register(Platform::Otlp, OtlpExporter)
            .register(Platform::Console, ConsoleExporter)
            .register(Platform::Noop, NoopExporter)
    }

    pub fn build(self) -> ExporterRegistry {
        ExporterRegistry {
            factories: self.factories,
        }
    }
}

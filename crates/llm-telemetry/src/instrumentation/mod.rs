//! Instrumentors and the runner that attaches them.
//!
//! An [`Instrumentor`] hooks a library's tracing into the active provider.
//! [`apply`] runs the enabled ones in order; one failing never stops the rest
//! and nothing is returned to the caller except a report.

#[cfg(feature = "tracing-bridge")]
mod tracing_bridge;

use crate::error::{panic_message, DependencyError, TelemetryError};
use opentelemetry_sdk::trace::TracerProvider;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Id of the built-in instrumentor for the `tracing` ecosystem.
pub const TRACING_INSTRUMENTOR: &str = "tracing";

/// Why an instrumentor could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentError {
    /// The instrumented library is not part of this build.
    #[error(transparent)]
    NotInstalled(#[from] DependencyError),

    #[error("{0}")]
    Failed(String),
}

/// Attaches one library's tracing hooks to a provider.
pub trait Instrumentor: Send + Sync {
    /// Name of the instrumented library.
    fn package(&self) -> &str;

    /// Installs the hooks so spans reach `provider`.
    fn instrument(&self, provider: &TracerProvider) -> Result<(), InstrumentError>;
}

/// Immutable id to instrumentor table.
#[derive(Clone, Default)]
pub struct InstrumentorRegistry {
    entries: BTreeMap<String, Arc<dyn Instrumentor>>,
}

impl fmt::Debug for InstrumentorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentorRegistry")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl InstrumentorRegistry {
    pub fn builder() -> InstrumentorRegistryBuilder {
        InstrumentorRegistryBuilder::default()
    }

    /// The instrumentors that ship with this crate.
    pub fn builtin() -> Self {
        Self::builder().with_builtin().build()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Instrumentor>> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
pub struct InstrumentorRegistryBuilder {
    entries: BTreeMap<String, Arc<dyn Instrumentor>>,
}

impl InstrumentorRegistryBuilder {
    /// Adds an instrumentor under `id`, replacing any earlier entry.
    pub fn register(mut self, id: impl Into<String>, instrumentor: impl Instrumentor + 'static) -> Self {
        self.entries.insert(id.into(), Arc::new(instrumentor));
        self
    }

    pub fn with_builtin(self) -> Self {
        self.register(TRACING_INSTRUMENTOR, TracingInstrumentor)
    }

    pub fn build(self) -> InstrumentorRegistry {
        InstrumentorRegistry {
            entries: self.entries,
        }
    }
}

/// What happened to each enabled instrumentor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationReport {
    pub applied: Vec<String>,
    /// Ids with no registry entry.
    pub unknown: Vec<String>,
    pub not_installed: Vec<String>,
    /// Ids whose instrumentor returned an error or panicked.
    pub failed: Vec<String>,
}

impl InstrumentationReport {
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty() && self.not_installed.is_empty() && self.failed.is_empty()
    }
}

/// Applies the instrumentors named in `enabled`, in order.
///
/// Unknown ids and instrumentors that fail or panic are logged and skipped.
/// Libraries missing from the build are logged at debug level only.
pub fn apply<S: AsRef<str>>(
    enabled: &[S],
    registry: &InstrumentorRegistry,
    provider: &TracerProvider,
) -> InstrumentationReport {
    let mut report = InstrumentationReport::default();

    for id in enabled {
        let id = id.as_ref();
        let Some(instrumentor) = registry.get(id) else {
            warn!(instrumentor = id, "unknown instrumentor, skipping");
            report.unknown.push(id.to_string());
            continue;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| instrumentor.instrument(provider)));
        match outcome {
            Ok(Ok(())) => {
                info!(instrumentor = id, package = instrumentor.package(), "instrumentation applied");
                report.applied.push(id.to_string());
            }
            Ok(Err(InstrumentError::NotInstalled(error))) => {
                debug!(instrumentor = id, %error, "instrumented library not installed, skipping");
                report.not_installed.push(id.to_string());
            }
            Ok(Err(InstrumentError::Failed(message))) => {
                TelemetryError::Instrumentation {
                    id: id.to_string(),
                    message,
                }
                .report();
                report.failed.push(id.to_string());
            }
            Err(payload) => {
                TelemetryError::Panicked {
                    context: format!("instrumentor `{id}`: {}", panic_message(payload.as_ref())),
                }
                .report();
                report.failed.push(id.to_string());
            }
        }
    }

    report
}

/// Routes spans from the `tracing` ecosystem into the provider.
///
/// The first run installs a global subscriber made of a `fmt` layer (filtered
/// by `RUST_LOG`, default `info`) and a `tracing-opentelemetry` layer. Later
/// runs point that layer at the new provider instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInstrumentor;

impl Instrumentor for TracingInstrumentor {
    fn package(&self) -> &str {
        "tracing-subscriber"
    }

    #[cfg(feature = "tracing-bridge")]
    fn instrument(&self, provider: &TracerProvider) -> Result<(), InstrumentError> {
        tracing_bridge::install(provider)
    }

    #[cfg(not(feature = "tracing-bridge"))]
    fn instrument(&self, _provider: &TracerProvider) -> Result<(), InstrumentError> {
        Err(DependencyError::feature(TRACING_INSTRUMENTOR, "tracing-bridge").into())
    }
}

//! Process lifecycle of the tracing pipeline.
//!
//! [`Telemetry`] owns the active provider and moves through
//! `Unconfigured -> Initializing -> Configured -> Shutdown`. The first
//! successful `init` wins; later calls are logged and ignored until
//! `shutdown`.
//!
//! Concurrent `init` calls queue on an init guard, so exactly one provider is
//! installed. The guard is re-entrant and the state lock is released while
//! instrumentors run: an instrumentor that calls back into the same instance
//! sees `Initializing` instead of deadlocking.
//!
//! Most applications use the process-wide instance through the free
//! functions [`init`], [`init_from`], [`shutdown`] and [`is_configured`]. Only
//! that instance publishes its provider through `opentelemetry::global`.

use crate::config::{Config, ConfigLoader, ConfigSource, Resolution};
use crate::error::{InitError, TelemetryError};
use crate::exporters::{provider_builder, ExporterRegistry};
use crate::instrumentation::{self, InstrumentationReport, InstrumentorRegistry};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{self as sdktrace, Sampler, Tracer, TracerProvider};
use parking_lot::{Mutex, ReentrantMutex};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconfigured,
    /// An `init` is building the pipeline or running instrumentors.
    Initializing,
    Configured,
    /// Shut down; behaves like `Unconfigured` for the next `init`.
    Shutdown,
}

enum State {
    Unconfigured,
    Configuring,
    Configured(TracerProvider),
    Shutdown,
}

/// Result of a successful `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    /// A provider was installed and instrumentation applied.
    Installed(InstrumentationReport),
    /// A provider was already active or being installed; nothing changed.
    AlreadyConfigured,
    /// Permissive mode: setup failed and an inert provider was installed instead.
    Degraded(InitError),
}

impl InitStatus {
    pub fn is_installed(&self) -> bool {
        matches!(self, InitStatus::Installed(_))
    }
}

/// Owner of the active tracer provider.
pub struct Telemetry {
    init_guard: ReentrantMutex<()>,
    state: Mutex<State>,
    publish_global: AtomicBool,
    exporters: ExporterRegistry,
    instrumentors: InstrumentorRegistry,
    loader: ConfigLoader,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("state", &self.state())
            .field("exporters", &self.exporters)
            .field("instrumentors", &self.instrumentors)
            .finish_non_exhaustive()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// An `init` in flight. Dropping it without [`commit`](Pending::commit)
/// puts the previous state back.
struct Pending<'a> {
    telemetry: &'a Telemetry,
    previous: Option<State>,
}

impl Pending<'_> {
    fn commit(mut self, provider: TracerProvider) {
        if self.telemetry.publish_global.load(Ordering::Acquire) {
            global::set_tracer_provider(provider.clone());
        }
        *self.telemetry.state.lock() = State::Configured(provider);
        self.previous = None;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.telemetry.state.lock() = previous;
        }
    }
}

impl Telemetry {
    /// Uses the built-in backends and instrumentors.
    pub fn new() -> Self {
        Self {
            init_guard: ReentrantMutex::new(()),
            state: Mutex::new(State::Unconfigured),
            publish_global: AtomicBool::new(false),
            exporters: ExporterRegistry::builtin(),
            instrumentors: InstrumentorRegistry::builtin(),
            loader: ConfigLoader::new(),
        }
    }

    pub fn with_exporters(mut self, exporters: ExporterRegistry) -> Self {
        self.exporters = exporters;
        self
    }

    pub fn with_instrumentors(mut self, instrumentors: InstrumentorRegistry) -> Self {
        self.instrumentors = instrumentors;
        self
    }

    pub fn with_loader(mut self, loader: ConfigLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Installs a provider for `config`, unless one is already active.
    ///
    /// Platform settings are validated first. In strict mode a validation or
    /// dispatch failure is returned and the state is left untouched; in
    /// permissive mode it is logged and an inert provider is installed.
    /// Instrumentors never cause an error.
    pub fn init(&self, config: &Config) -> Result<InitStatus, InitError> {
        let _init = self.init_guard.lock();
        let Some(pending) = self.begin(config) else {
            return Ok(InitStatus::AlreadyConfigured);
        };

        let provider = match self.build(config) {
            Ok(provider) => provider,
            Err(err) if config.validation.is_strict() => {
                error!(platform = %config.platform(), error = %err, "telemetry initialization failed");
                return Err(err);
            }
            Err(err) => {
                warn!(
                    platform = %config.platform(),
                    error = %err,
                    "telemetry initialization failed, installing a no-op provider"
                );
                pending.commit(provider_builder(config).build());
                return Ok(InitStatus::Degraded(err));
            }
        };

        let report = instrumentation::apply(&config.instrumentation, &self.instrumentors, &provider);
        pending.commit(provider);
        info!(
            platform = %config.platform(),
            service = %config.service.name,
            instrumentors = report.applied.len(),
            "telemetry initialized"
        );
        Ok(InitStatus::Installed(report))
    }

    fn begin(&self, config: &Config) -> Option<Pending<'_>> {
        let mut state = self.state.lock();
        match &*state {
            State::Configured(_) => {
                warn!(requested = %config.platform(), "telemetry already initialized, ignoring init");
                None
            }
            State::Configuring => {
                warn!(requested = %config.platform(), "telemetry initialization in progress, ignoring nested init");
                None
            }
            State::Unconfigured | State::Shutdown => {
                let previous = std::mem::replace(&mut *state, State::Configuring);
                Some(Pending {
                    telemetry: self,
                    previous: Some(previous),
                })
            }
        }
    }

    fn build(&self, config: &Config) -> Result<TracerProvider, InitError> {
        config.settings.validate()?;
        self.exporters.dispatch(config)
    }

    /// Loads a configuration and initializes from it.
    ///
    /// A rejected document (strict mode) is returned as an error; a degraded
    /// one (permissive mode) installs an inert provider.
    pub fn init_from(&self, source: ConfigSource) -> Result<InitStatus, InitError> {
        match self.loader.resolve(source) {
            Resolution::Valid(config) => self.init(&config),
            Resolution::Degraded { config, error } => match self.init(&config)? {
                InitStatus::Installed(_) => Ok(InitStatus::Degraded(error.into())),
                other => Ok(other),
            },
            Resolution::Rejected(err) => {
                error!(error = %err, "telemetry configuration rejected");
                Err(err.into())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(*self.state.lock(), State::Configured(_))
    }

    pub fn state(&self) -> LifecycleState {
        match *self.state.lock() {
            State::Unconfigured => LifecycleState::Unconfigured,
            State::Configuring => LifecycleState::Initializing,
            State::Configured(_) => LifecycleState::Configured,
            State::Shutdown => LifecycleState::Shutdown,
        }
    }

    /// The active provider, for read-only use.
    ///
    /// A clone held past [`shutdown`](Self::shutdown) keeps its processors alive.
    pub fn provider(&self) -> Option<TracerProvider> {
        match &*self.state.lock() {
            State::Configured(provider) => Some(provider.clone()),
            State::Unconfigured | State::Configuring | State::Shutdown => None,
        }
    }

    /// A tracer on the active provider, or one that records nothing.
    pub fn tracer(&self, scope: impl Into<Cow<'static, str>>) -> Tracer {
        self.provider().unwrap_or_else(idle_provider).tracer(scope)
    }

    /// Flushes the active provider. Errors are logged.
    pub fn force_flush(&self) {
        if let Some(provider) = self.provider() {
            report_flush(&provider);
        }
    }

    /// Flushes and releases the active provider. Safe to call any number of times.
    ///
    /// Processors shut down once the last clone of the provider is dropped.
    pub fn shutdown(&self) {
        let _init = self.init_guard.lock();
        let provider = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Shutdown) {
                State::Configured(provider) => provider,
                previous => {
                    *state = previous;
                    return;
                }
            }
        };

        report_flush(&provider);
        if self.publish_global.load(Ordering::Acquire) {
            global::shutdown_tracer_provider();
        }
        drop(provider);
        info!("telemetry shut down");
    }
}

fn report_flush(provider: &TracerProvider) {
    for result in provider.force_flush() {
        if let Err(err) = result {
            TelemetryError::Export(err).report();
        }
    }
}

fn idle_provider() -> TracerProvider {
    TracerProvider::builder()
        .with_config(sdktrace::config().with_sampler(Sampler::AlwaysOff))
        .build()
}

static GLOBAL: OnceLock<Telemetry> = OnceLock::new();

fn published(telemetry: Telemetry) -> Telemetry {
    telemetry.publish_global.store(true, Ordering::Release);
    telemetry
}

/// The process-wide instance, created with built-in registries on first use.
pub fn global() -> &'static Telemetry {
    GLOBAL.get_or_init(|| published(Telemetry::new()))
}

/// Makes `telemetry` the process-wide instance.
///
/// Fails, handing it back, if the global instance already exists.
pub fn set_global(telemetry: Telemetry) -> Result<(), Telemetry> {
    GLOBAL.set(published(telemetry)).map_err(|mut rejected| {
        *rejected.publish_global.get_mut() = false;
        rejected
    })
}

/// [`Telemetry::init`] on the global instance.
pub fn init(config: &Config) -> Result<InitStatus, InitError> {
    global().init(config)
}

/// [`Telemetry::init_from`] on the global instance.
pub fn init_from(source: ConfigSource) -> Result<InitStatus, InitError> {
    global().init_from(source)
}

/// [`Telemetry::shutdown`] on the global instance.
pub fn shutdown() {
    global().shutdown();
}

/// [`Telemetry::is_configured`] on the global instance.
pub fn is_configured() -> bool {
    global().is_configured()
}

/// [`Telemetry::tracer`] on the global instance.
pub fn tracer(scope: impl Into<Cow<'static, str>>) -> Tracer {
    global().tracer(scope)
}

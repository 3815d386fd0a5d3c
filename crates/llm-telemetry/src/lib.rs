//! Declarative telemetry setup for LLM applications.
//!
//! A configuration document names an observability backend. `init` builds an
//! OpenTelemetry tracer provider for it, publishes it as the process's active
//! provider and attaches the enabled instrumentors. Applications that already trace can
//! instead add a [`MarkerSpanFilter`] to their own pipeline and send only
//! LLM spans to the second backend.
//!
//! ```no_run
//! use llm_telemetry::opentelemetry::trace::{TraceContextExt, Tracer};
//! use llm_telemetry::opentelemetry::KeyValue;
//! use llm_telemetry::{ConfigSource, InitStatus};
//!
//! # fn main() -> Result<(), llm_telemetry::InitError> {
//! let status = llm_telemetry::init_from(ConfigSource::Path("telemetry.yaml".into()))?;
//! if let InitStatus::Degraded(reason) = status {
//!     eprintln!("telemetry disabled: {reason}");
//! }
//!
//! llm_telemetry::tracer("support-bot").in_span("answer question", |cx| {
//!     cx.span().set_attribute(KeyValue::new("openinference.span.kind", "CHAIN"));
//! });
//!
//! llm_telemetry::shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! Telemetry never breaks the application once running: only configuration
//! errors in strict mode are returned to the caller. Everything else is
//! logged through `tracing` and degrades to an inert pipeline.
//!
//! # Features
//!
//! - `otlp`: network backends (Arize, Phoenix, Langfuse, LangSmith, OTLP).
//! - `tracing-bridge` (default): the `tracing` instrumentor.

pub mod config;
pub mod dual;
pub mod error;
pub mod evaluators;
pub mod exporters;
pub mod filter;
pub mod instrumentation;
pub mod lifecycle;

pub use config::{Config, ConfigLoader, ConfigSource, Platform, PlatformSettings, Resolution, ValidationMode};
pub use error::{
    ConfigError, DependencyError, EvaluationError, EvaluatorNotFound, InitError, TelemetryError,
};
pub use evaluators::{evaluators, EvalCase, EvalScore, Evaluator, EvaluatorRegistry};
pub use exporters::{ExporterFactory, ExporterRegistry};
pub use filter::{FilterStats, MarkerSpanFilter, OPENINFERENCE_SPAN_KIND};
pub use instrumentation::{InstrumentationReport, Instrumentor, InstrumentorRegistry};
pub use lifecycle::{
    global, init, init_from, is_configured, set_global, shutdown, tracer, InitStatus,
    LifecycleState, Telemetry,
};

/// Re-exports of the OpenTelemetry crates these types plug into.
pub use opentelemetry;
pub use opentelemetry_sdk;

/// [`Telemetry::provider`] on the global instance.
pub fn provider() -> Option<opentelemetry_sdk::trace::TracerProvider> {
    global().provider()
}

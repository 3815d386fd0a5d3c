//! Error types for telemetry setup and runtime.
//!
//! Only [`InitError`] ever reaches application code, and only when the
//! configuration asks for strict validation. Everything else is logged where
//! it happens and the pipeline degrades.

use opentelemetry::trace::TraceError;
use std::path::PathBuf;
use thiserror::Error;

/// A configuration document is missing, unreadable or invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No path, text or value was given and the environment fallback is unset.
    #[error("no configuration source: pass a path or set {env_var}")]
    NoSource { env_var: &'static str },

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("configuration does not name a platform")]
    MissingPlatform,

    #[error("unknown platform `{0}`")]
    UnknownPlatform(String),

    /// The platform is known but no exporter factory is registered for it.
    #[error("no exporter registered for platform `{0}`")]
    UnregisteredPlatform(String),

    #[error("platform `{platform}` requires `{field}`")]
    MissingField {
        platform: &'static str,
        field: &'static str,
    },

    #[error("invalid `{section}` section: {message}")]
    InvalidSection { section: String, message: String },

    #[error("invalid value for `{field}`: {message}")]
    InvalidValue { field: String, message: String },
}

/// A backend or instrumentation library is not compiled into this build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{component} requires {package}: {remediation}")]
pub struct DependencyError {
    /// What needed the dependency (a platform or instrumentor id).
    pub component: String,
    /// The missing library or cargo feature.
    pub package: String,
    /// How to make it available.
    pub remediation: String,
}

impl DependencyError {
    pub fn new(
        component: impl Into<String>,
        package: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            package: package.into(),
            remediation: remediation.into(),
        }
    }

    /// A dependency that ships behind a cargo feature of this crate.
    pub fn feature(component: impl Into<String>, feature: &str) -> Self {
        Self::new(
            component,
            format!("the `{feature}` feature"),
            format!("rebuild llm-telemetry with `--features {feature}`"),
        )
    }
}

/// Startup failure. Returned by `init` only in strict mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

impl InitError {
    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Anything that goes wrong after a successful `init`.
///
/// These are logged at the boundary where they occur and never returned to
/// the application.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("span export failed: {0}")]
    Export(#[from] TraceError),

    #[error("instrumentor `{id}` failed: {message}")]
    Instrumentation { id: String, message: String },

    #[error("panic in {context}")]
    Panicked { context: String },
}

impl TelemetryError {
    /// Logs the error at warn level.
    pub(crate) fn report(&self) {
        tracing::warn!(error = %self, "telemetry error");
    }
}

/// Lookup of an evaluator name that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("evaluator `{name}` is not registered")]
pub struct EvaluatorNotFound {
    pub name: String,
}

/// An evaluator could not score a case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("evaluation case is missing `{0}`")]
    MissingInput(&'static str),

    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Turns a caught panic payload into a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

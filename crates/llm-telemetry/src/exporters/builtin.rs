//! Built-in backend factories.
//!
//! The hosted backends all speak OTLP/HTTP; they differ only in endpoint and
//! authentication headers. They need the `otlp` feature.

use super::{provider_builder, BoxedExporter, ConsoleSpanExporter, ExporterFactory};
use crate::config::{
    Config, LangfuseSettings, LangsmithSettings, OtlpSettings, PhoenixSettings, PlatformSettings,
    ArizeSettings, ARIZE_ENDPOINT, LANGFUSE_HOST, LANGSMITH_ENDPOINT, PHOENIX_ENDPOINT,
};
use crate::error::DependencyError;
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use futures_util::future::BoxFuture;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::trace::TracerProvider;
use std::time::Duration;

/// Per-request timeout for OTLP exports.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

const LANGFUSE_OTEL_PATH: &str = "/api/public/otel";
const TRACES_PATH: &str = "/v1/traces";

/// Where and how an OTLP/HTTP exporter sends spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpTarget {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
}

impl OtlpTarget {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
        }
    }

    fn header(mut self, name: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            let value = value.into();
            if !value.is_empty() {
                self.headers.push((name.to_string(), value));
            }
        }
        self
    }

    pub fn arize(settings: &ArizeSettings) -> Self {
        Self::new(or_default(settings.endpoint.as_deref(), ARIZE_ENDPOINT))
            .header("space_id", settings.space_id.as_deref())
            .header("api_key", settings.api_key.as_deref())
    }

    pub fn phoenix(settings: &PhoenixSettings) -> Self {
        Self::new(or_default(settings.endpoint.as_deref(), PHOENIX_ENDPOINT)).header(
            "authorization",
            settings.api_key.as_deref().map(|key| format!("Bearer {key}")),
        )
    }

    pub fn langfuse(settings: &LangfuseSettings) -> Self {
        let host = or_default(settings.host.as_deref(), LANGFUSE_HOST).trim_end_matches('/');
        let credentials = format!(
            "{}:{}",
            settings.public_key.as_deref().unwrap_or_default(),
            settings.secret_key.as_deref().unwrap_or_default()
        );
        Self::new(format!("{host}{LANGFUSE_OTEL_PATH}")).header(
            "authorization",
            Some(format!("Basic {}", Base64.encode(credentials))),
        )
    }

    pub fn langsmith(settings: &LangsmithSettings) -> Self {
        Self::new(or_default(settings.endpoint.as_deref(), LANGSMITH_ENDPOINT))
            .header("x-api-key", settings.api_key.as_deref())
            .header("Langsmith-Project", settings.project.as_deref())
    }

    pub fn otlp(settings: &OtlpSettings) -> Self {
        let mut target = Self::new(settings.endpoint.clone().unwrap_or_default());
        target.headers = settings
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        target
    }

    /// The endpoint without a trailing `/v1/traces`, which the OTLP exporter appends itself.
    pub fn base_endpoint(&self) -> &str {
        let endpoint = self.endpoint.trim_end_matches('/');
        endpoint.strip_suffix(TRACES_PATH).unwrap_or(endpoint)
    }

    /// The target for a hosted-backend configuration.
    pub fn for_config(config: &Config) -> Option<Self> {
        match &config.settings {
            PlatformSettings::Arize(s) => Some(Self::arize(s)),
            PlatformSettings::Phoenix(s) => Some(Self::phoenix(s)),
            PlatformSettings::Langfuse(s) => Some(Self::langfuse(s)),
            PlatformSettings::Langsmith(s) => Some(Self::langsmith(s)),
            PlatformSettings::Otlp(s) => Some(Self::otlp(s)),
            PlatformSettings::Console(_) | PlatformSettings::Noop => None,
        }
    }
}

fn or_default<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => default,
    }
}

#[cfg(feature = "otlp")]
fn otlp_exporter(component: &str, config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
    use opentelemetry_otlp::WithExportConfig;
    use std::collections::HashMap;

    let target = OtlpTarget::for_config(config).ok_or_else(|| {
        DependencyError::new(component, "OTLP settings", "configure an OTLP-based platform")
    })?;
    let exporter = opentelemetry_otlp::new_exporter()
        .http()
        .with_endpoint(target.base_endpoint())
        .with_timeout(EXPORT_TIMEOUT)
        .with_headers(target.headers.into_iter().collect::<HashMap<_, _>>())
        .build_span_exporter()
        .map_err(|e| {
            DependencyError::new(component, "an OTLP/HTTP exporter", format!("exporter setup failed: {e}"))
        })?;
    Ok(Box::new(exporter))
}

#[cfg(not(feature = "otlp"))]
fn otlp_exporter(component: &str, _config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
    Err(DependencyError::feature(component, "otlp"))
}

macro_rules! otlp_backend {
    ($(#[$meta:meta])* $name:ident, $component:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ExporterFactory for $name {
            fn create_exporter(&self, config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
                otlp_exporter($component, config)
            }
        }
    };
}

otlp_backend!(
    /// Arize AX, authenticated with `space_id` and `api_key` headers.
    ArizeExporter,
    "arize"
);
otlp_backend!(
    /// Arize Phoenix, self-hosted or cloud.
    PhoenixExporter,
    "phoenix"
);
otlp_backend!(
    /// Langfuse, authenticated with HTTP basic auth.
    LangfuseExporter,
    "langfuse"
);
otlp_backend!(LangsmithExporter, "langsmith");
otlp_backend!(
    /// Any OTLP/HTTP collector.
    OtlpExporter,
    "otlp"
);

/// Prints spans as they end, or appends them to a JSON-lines file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleExporter;

impl ExporterFactory for ConsoleExporter {
    fn create_exporter(&self, config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
        let exporter = match &config.settings {
            PlatformSettings::Console(settings) => match &settings.file {
                Some(path) => ConsoleSpanExporter::file(path.clone()),
                None => ConsoleSpanExporter::stdout(settings.verbose),
            },
            _ => ConsoleSpanExporter::stdout(false),
        };
        Ok(Box::new(exporter))
    }

    // No batching: output should appear as spans end.
    fn create_provider(&self, config: &Config) -> Result<TracerProvider, DependencyError> {
        let exporter = BoxedExporter(self.create_exporter(config)?);
        Ok(provider_builder(config).with_simple_exporter(exporter).build())
    }
}

/// Inert backend: the provider has no processors, so spans go nowhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExporter;

impl ExporterFactory for NoopExporter {
    fn create_exporter(&self, _config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
        Ok(Box::new(Discard))
    }

    fn create_provider(&self, config: &Config) -> Result<TracerProvider, DependencyError> {
        Ok(provider_builder(config).build())
    }
}

#[derive(Debug)]
struct Discard;

impl SpanExporter for Discard {
    fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        Box::pin(std::future::ready(Ok(())))
    }
}

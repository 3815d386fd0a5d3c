use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Service name used when the document does not set one.
pub const DEFAULT_SERVICE_NAME: &str = "unknown_service";

pub const ARIZE_ENDPOINT: &str = "https://otlp.arize.com";
pub const PHOENIX_ENDPOINT: &str = "http://localhost:6006";
pub const LANGFUSE_HOST: &str = "https://cloud.langfuse.com";
pub const LANGSMITH_ENDPOINT: &str = "https://api.smith.langchain.com/otel";

/// Observability backend a configuration targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Arize,
    Phoenix,
    Langfuse,
    Langsmith,
    Otlp,
    Console,
    Noop,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Arize,
        Platform::Phoenix,
        Platform::Langfuse,
        Platform::Langsmith,
        Platform::Otlp,
        Platform::Console,
        Platform::Noop,
    ];

    /// Identifier used in documents, also the name of the settings block.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Arize => "arize",
            Platform::Phoenix => "phoenix",
            Platform::Langfuse => "langfuse",
            Platform::Langsmith => "langsmith",
            Platform::Otlp => "otlp",
            Platform::Console => "console",
            Platform::Noop => "noop",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownPlatform(s.to_string()))
    }
}

/// Whether configuration errors abort `init` or degrade to a no-op pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Strict,
    #[default]
    Permissive,
}

impl ValidationMode {
    #[inline]
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl FromStr for ValidationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(ConfigError::InvalidValue {
                field: "validation.mode".to_string(),
                message: format!("expected `strict` or `permissive`, got `{other}`"),
            }),
        }
    }
}

/// Identity of the instrumented service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Numbers such as `version: 1.0` are kept as written.
    #[serde(default, deserialize_with = "version_text")]
    pub version: Option<String>,
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn version_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Version>::deserialize(deserializer)?.map(|version| match version {
        Version::Text(text) => text,
        Version::Number(number) => number.to_string(),
    }))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: None,
        }
    }
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArizeSettings {
    pub endpoint: Option<String>,
    pub space_id: Option<String>,
    pub api_key: Option<String>,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoenixSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LangfuseSettings {
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LangsmithSettings {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtlpSettings {
    pub endpoint: Option<String>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Print full span JSON instead of one summary line per span.
    pub verbose: bool,
    /// Append spans as JSON lines to this file instead of printing them.
    pub file: Option<PathBuf>,
}

/// The settings block of the selected platform. Other blocks in the
/// document are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSettings {
    Arize(ArizeSettings),
    Phoenix(PhoenixSettings),
    Langfuse(LangfuseSettings),
    Langsmith(LangsmithSettings),
    Otlp(OtlpSettings),
    Console(ConsoleSettings),
    Noop,
}

impl PlatformSettings {
    pub fn platform(&self) -> Platform {
        match self {
            PlatformSettings::Arize(_) => Platform::Arize,
            PlatformSettings::Phoenix(_) => Platform::Phoenix,
            PlatformSettings::Langfuse(_) => Platform::Langfuse,
            PlatformSettings::Langsmith(_) => Platform::Langsmith,
            PlatformSettings::Otlp(_) => Platform::Otlp,
            PlatformSettings::Console(_) => Platform::Console,
            PlatformSettings::Noop => Platform::Noop,
        }
    }

    /// Checks the fields the platform cannot work without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            PlatformSettings::Arize(s) => {
                if present(&s.endpoint) {
                    return Ok(());
                }
                required(&s.space_id, "arize", "space_id")?;
                required(&s.api_key, "arize", "api_key")?;
                Ok(())
            }
            PlatformSettings::Langfuse(s) => {
                required(&s.public_key, "langfuse", "public_key")?;
                required(&s.secret_key, "langfuse", "secret_key")?;
                Ok(())
            }
            PlatformSettings::Langsmith(s) => {
                required(&s.api_key, "langsmith", "api_key")?;
                Ok(())
            }
            PlatformSettings::Otlp(s) => {
                required(&s.endpoint, "otlp", "endpoint")?;
                Ok(())
            }
            PlatformSettings::Phoenix(_) | PlatformSettings::Console(_) | PlatformSettings::Noop => {
                Ok(())
            }
        }
    }
}

// Empty strings count as missing: an unset `${VAR}` substitutes to "".
fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn required<'a>(
    value: &'a Option<String>,
    platform: &'static str,
    field: &'static str,
) -> Result<&'a str, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField { platform, field }),
    }
}

/// A validated telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub service: ServiceConfig,
    pub settings: PlatformSettings,
    /// Instrumentor ids in application order, without duplicates.
    pub instrumentation: Vec<String>,
    pub validation: ValidationMode,
}

impl Config {
    pub fn new(settings: PlatformSettings) -> Self {
        Self {
            service: ServiceConfig::default(),
            settings,
            instrumentation: Vec::new(),
            validation: ValidationMode::default(),
        }
    }

    /// The inert configuration substituted for an invalid one.
    pub fn noop() -> Self {
        Self::new(PlatformSettings::Noop)
    }

    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.service = service;
        self
    }

    /// Sets the instrumentor ids, keeping the first occurrence of each.
    pub fn with_instrumentation<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instrumentation = dedup_ordered(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_validation(mut self, mode: ValidationMode) -> Self {
        self.validation = mode;
        self
    }

    pub fn platform(&self) -> Platform {
        self.settings.platform()
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.settings, PlatformSettings::Noop)
    }
}

pub(crate) fn dedup_ordered(ids: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

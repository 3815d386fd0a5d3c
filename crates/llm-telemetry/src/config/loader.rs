//! Reads configuration documents and applies the validation policy.

use super::env;
use super::types::{
    dedup_ordered, ArizeSettings, Config, ConsoleSettings, LangfuseSettings, LangsmithSettings,
    OtlpSettings, PhoenixSettings, Platform, PlatformSettings, ServiceConfig, ValidationMode,
};
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable holding the path of the configuration file.
pub const CONFIG_ENV_VAR: &str = "LLM_TELEMETRY_CONFIG";

/// Where a configuration document comes from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A YAML or JSON file. `.json` files are parsed as JSON, anything else as YAML.
    Path(PathBuf),
    /// YAML (or JSON) text.
    Text(String),
    /// An already parsed document.
    Value(Value),
    /// The file named by `LLM_TELEMETRY_CONFIG`.
    Environment,
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        ConfigSource::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        ConfigSource::Path(path.to_path_buf())
    }
}

impl From<Value> for ConfigSource {
    fn from(value: Value) -> Self {
        ConfigSource::Value(value)
    }
}

/// Outcome of [`ConfigLoader::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The document is valid.
    Valid(Config),
    /// Permissive mode: the document was invalid and a no-op configuration
    /// stands in for it.
    Degraded { config: Config, error: ConfigError },
    /// Strict mode: the document was invalid.
    Rejected(ConfigError),
}

impl Resolution {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolution::Degraded { .. })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstrumentationSection {
    enabled: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValidationSection {
    mode: Option<String>,
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Parses, substitutes and validates configuration documents.
///
/// The loader never touches process-wide state; environment variables are
/// read through a lookup function that tests can replace.
pub struct ConfigLoader {
    default_mode: ValidationMode,
    lookup: EnvLookup,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            default_mode: ValidationMode::Permissive,
            lookup: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Mode applied when the document does not say, or cannot be read.
    pub fn with_default_mode(mut self, mode: ValidationMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Replaces the environment used for placeholders and `LLM_TELEMETRY_CONFIG`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    /// Loads and validates a document. Every problem is an error, whatever
    /// the validation mode.
    pub fn load(&self, source: ConfigSource) -> Result<Config, ConfigError> {
        let document = self.read(source)?;
        parse_document(&document, self.default_mode)
    }

    /// Loads a document and applies its validation mode.
    pub fn resolve(&self, source: ConfigSource) -> Resolution {
        let document = match self.read(source) {
            Ok(document) => document,
            Err(error) => return degrade(self.default_mode, error, None),
        };

        let mode = match validation_mode(&document) {
            Ok(mode) => mode.unwrap_or(self.default_mode),
            Err(error) => return degrade(self.default_mode, error, Some(&document)),
        };

        match parse_document(&document, mode) {
            Ok(config) => {
                debug!(platform = %config.platform(), service = %config.service.name, "configuration loaded");
                Resolution::Valid(config)
            }
            Err(error) => degrade(mode, error, Some(&document)),
        }
    }

    fn read(&self, source: ConfigSource) -> Result<Value, ConfigError> {
        let mut document = match source {
            ConfigSource::Path(path) => read_file(&path)?,
            ConfigSource::Text(text) => parse_yaml(&text)?,
            ConfigSource::Value(value) => value,
            ConfigSource::Environment => match (self.lookup)(CONFIG_ENV_VAR) {
                Some(path) if !path.trim().is_empty() => read_file(Path::new(path.trim()))?,
                _ => {
                    return Err(ConfigError::NoSource {
                        env_var: CONFIG_ENV_VAR,
                    })
                }
            },
        };
        env::substitute_value(&mut document, &*self.lookup);
        Ok(document)
    }
}

fn degrade(mode: ValidationMode, error: ConfigError, document: Option<&Value>) -> Resolution {
    if mode.is_strict() {
        return Resolution::Rejected(error);
    }

    warn!(%error, "invalid telemetry configuration, continuing with a no-op pipeline");
    // Keep the service identity when it can still be read.
    let service = document
        .and_then(|doc| doc.get("service"))
        .and_then(|s| serde_json::from_value::<ServiceConfig>(s.clone()).ok())
        .unwrap_or_default();
    let config = Config::noop().with_service(service).with_validation(mode);
    Resolution::Degraded { config, error }
}

fn read_file(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    } else {
        parse_yaml(&text)
    }
}

fn parse_yaml(text: &str) -> Result<Value, ConfigError> {
    serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn validation_mode(document: &Value) -> Result<Option<ValidationMode>, ConfigError> {
    let Some(section) = document.get("validation") else {
        return Ok(None);
    };
    let section: ValidationSection = section_from(section, "validation")?;
    section.mode.as_deref().map(str::parse::<ValidationMode>).transpose()
}

/// Builds a [`Config`] from a substituted document.
fn parse_document(document: &Value, default_mode: ValidationMode) -> Result<Config, ConfigError> {
    let root = document.as_object().ok_or_else(|| {
        ConfigError::Parse("configuration must be a mapping at the top level".to_string())
    })?;

    let platform = match root.get("platform") {
        None | Some(Value::Null) => return Err(ConfigError::MissingPlatform),
        Some(Value::String(id)) if id.trim().is_empty() => return Err(ConfigError::MissingPlatform),
        Some(Value::String(id)) => id.parse::<Platform>()?,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                field: "platform".to_string(),
                message: format!("expected a string, got {other}"),
            })
        }
    };

    let service = match root.get("service") {
        Some(section) => section_from(section, "service")?,
        None => ServiceConfig::default(),
    };

    let settings = platform_settings(platform, root)?;
    settings.validate()?;

    let instrumentation: InstrumentationSection = match root.get("instrumentation") {
        Some(section) => section_from(section, "instrumentation")?,
        None => InstrumentationSection::default(),
    };

    let validation = validation_mode(document)?.unwrap_or(default_mode);

    Ok(Config {
        service,
        settings,
        instrumentation: dedup_ordered(instrumentation.enabled.into_iter()),
        validation,
    })
}

fn platform_settings(platform: Platform, root: &Map<String, Value>) -> Result<PlatformSettings, ConfigError> {
    let name = platform.as_str();
    let empty = Value::Object(Map::new());
    let block = match root.get(name) {
        None | Some(Value::Null) => &empty,
        Some(block) => block,
    };

    Ok(match platform {
        Platform::Arize => PlatformSettings::Arize(section_from::<ArizeSettings>(block, name)?),
        Platform::Phoenix => PlatformSettings::Phoenix(section_from::<PhoenixSettings>(block, name)?),
        Platform::Langfuse => PlatformSettings::Langfuse(section_from::<LangfuseSettings>(block, name)?),
        Platform::Langsmith => {
            PlatformSettings::Langsmith(section_from::<LangsmithSettings>(block, name)?)
        }
        Platform::Otlp => PlatformSettings::Otlp(section_from::<OtlpSettings>(block, name)?),
        Platform::Console => PlatformSettings::Console(section_from::<ConsoleSettings>(block, name)?),
        Platform::Noop => PlatformSettings::Noop,
    })
}

fn section_from<T: DeserializeOwned>(value: &Value, section: &str) -> Result<T, ConfigError> {
    serde_json::from_value(value.clone()).map_err(|e| ConfigError::InvalidSection {
        section: section.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::DEFAULT_SERVICE_NAME;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;
    use tracing_test::traced_test;

    fn loader_with(pairs: &[(&str, &str)]) -> ConfigLoader {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ConfigLoader::new().with_env(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_load_yaml_text() {
        let yaml = r"
platform: langsmith
service:
  name: checkout
  version: 1.2.0
langsmith:
  api_key: ${LANGSMITH_API_KEY}
  project: demo
arize:
  endpoint: ignored
instrumentation:
  enabled: [tracing, openai, tracing]
validation:
  mode: strict
";
        let config = loader_with(&[("LANGSMITH_API_KEY", "ls-key")])
            .load(ConfigSource::Text(yaml.to_string()))
            .unwrap();

        assert_eq!(config.platform(), Platform::Langsmith);
        assert_eq!(config.service, ServiceConfig::new("checkout").with_version("1.2.0"));
        assert_eq!(
            config.settings,
            PlatformSettings::Langsmith(LangsmithSettings {
                api_key: Some("ls-key".to_string()),
                endpoint: None,
                project: Some("demo".to_string()),
            })
        );
        assert_eq!(config.instrumentation, vec!["tracing", "openai"]);
        assert_eq!(config.validation, ValidationMode::Strict);
    }

    #[test]
    fn test_unquoted_numeric_version() {
        let config = loader_with(&[])
            .load(ConfigSource::Text(
                "platform: noop\nservice:\n  name: svc\n  version: 1.0\n".to_string(),
            ))
            .unwrap();
        assert_eq!(config.service.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_load_defaults() {
        let config = loader_with(&[])
            .load(ConfigSource::Value(json!({ "platform": "phoenix" })))
            .unwrap();
        assert_eq!(config.service.name, DEFAULT_SERVICE_NAME);
        assert!(config.instrumentation.is_empty());
        assert_eq!(config.validation, ValidationMode::Permissive);
        assert_eq!(config.settings, PlatformSettings::Phoenix(PhoenixSettings::default()));

        let strict = loader_with(&[])
            .with_default_mode(ValidationMode::Strict)
            .load(ConfigSource::Value(json!({ "platform": "phoenix" })))
            .unwrap();
        assert_eq!(strict.validation, ValidationMode::Strict);
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"platform": "otlp", "otlp": {{"endpoint": "http://collector:4318", "headers": {{"x-team": "llm"}}}}}}"#
        )
        .unwrap();

        let config = loader_with(&[]).load(ConfigSource::Path(path)).unwrap();
        let PlatformSettings::Otlp(otlp) = config.settings else {
            panic!("expected otlp settings");
        };
        assert_eq!(otlp.endpoint.as_deref(), Some("http://collector:4318"));
        assert_eq!(otlp.headers.get("x-team").map(String::as_str), Some("llm"));
    }

    #[test]
    fn test_load_from_environment_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.yaml");
        std::fs::write(&path, "platform: console\nconsole:\n  verbose: true\n").unwrap();

        let loader = loader_with(&[(CONFIG_ENV_VAR, path.to_str().unwrap())]);
        let config = loader.load(ConfigSource::Environment).unwrap();
        assert_eq!(
            config.settings,
            PlatformSettings::Console(ConsoleSettings {
                verbose: true,
                file: None
            })
        );
    }

    #[test]
    fn test_environment_without_variable() {
        let err = loader_with(&[]).load(ConfigSource::Environment).unwrap_err();
        assert_eq!(err, ConfigError::NoSource { env_var: CONFIG_ENV_VAR });
    }

    #[test]
    fn test_missing_file() {
        let err = loader_with(&[])
            .load(ConfigSource::Path("/nonexistent/telemetry.yaml".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_platform_errors() {
        let loader = loader_with(&[]);
        assert_eq!(
            loader.load(json!({ "service": { "name": "svc" } }).into()),
            Err(ConfigError::MissingPlatform)
        );
        assert_eq!(
            loader.load(json!({ "platform": "unknown" }).into()),
            Err(ConfigError::UnknownPlatform("unknown".to_string()))
        );
        assert!(matches!(
            loader.load(json!({ "platform": 7 }).into()),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unset_required_variable_is_missing_field() {
        let err = loader_with(&[])
            .load(ConfigSource::Text(
                "platform: langfuse\nlangfuse:\n  public_key: pk\n  secret_key: ${LANGFUSE_SECRET}\n".into(),
            ))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingField {
                platform: "langfuse",
                field: "secret_key"
            }
        );
    }

    #[test]
    fn test_invalid_section() {
        let err = loader_with(&[])
            .load(json!({ "platform": "console", "console": { "verbose": "loud" } }).into())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSection { ref section, .. } if section == "console"));
    }

    #[test]
    fn test_resolve_valid() {
        let resolution = loader_with(&[]).resolve(json!({ "platform": "noop" }).into());
        assert!(matches!(resolution, Resolution::Valid(ref c) if c.is_noop()));
    }

    #[test]
    fn test_resolve_strict_rejects() {
        let resolution = loader_with(&[]).resolve(
            json!({
                "platform": "unknown",
                "service": { "name": "svc" },
                "validation": { "mode": "strict" },
            })
            .into(),
        );
        assert_eq!(
            resolution,
            Resolution::Rejected(ConfigError::UnknownPlatform("unknown".to_string()))
        );
    }

    #[test]
    #[traced_test]
    fn test_resolve_permissive_degrades() {
        let resolution = loader_with(&[]).resolve(
            json!({ "service": { "name": "svc" }, "validation": { "mode": "permissive" } }).into(),
        );
        let Resolution::Degraded { config, error } = resolution else {
            panic!("expected a degraded resolution");
        };
        assert_eq!(error, ConfigError::MissingPlatform);
        assert!(config.is_noop());
        assert_eq!(config.service.name, "svc");
        assert!(logs_contain("no-op pipeline"));
    }

    #[test]
    fn test_resolve_unreadable_source_uses_default_mode() {
        let permissive = loader_with(&[]).resolve(ConfigSource::Environment);
        assert!(permissive.is_degraded());

        let strict = loader_with(&[])
            .with_default_mode(ValidationMode::Strict)
            .resolve(ConfigSource::Environment);
        assert!(matches!(strict, Resolution::Rejected(ConfigError::NoSource { .. })));
    }

    #[test]
    fn test_resolve_invalid_mode() {
        let resolution = loader_with(&[])
            .with_default_mode(ValidationMode::Strict)
            .resolve(json!({ "platform": "noop", "validation": { "mode": "lenient" } }).into());
        assert!(matches!(
            resolution,
            Resolution::Rejected(ConfigError::InvalidValue { ref field, .. }) if field == "validation.mode"
        ));
    }
}

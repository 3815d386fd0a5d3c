use llm_telemetry::config::{ArizeSettings, ServiceConfig};
use llm_telemetry::exporters::{provider_builder, InMemorySpanExporter};
use llm_telemetry::opentelemetry::trace::{TraceContextExt, Tracer};
use llm_telemetry::opentelemetry::KeyValue;
use llm_telemetry::opentelemetry_sdk::export::trace::SpanExporter;
use llm_telemetry::opentelemetry_sdk::trace::TracerProvider;
use llm_telemetry::{
    Config, ConfigError, ConfigSource, DependencyError, ExporterFactory, ExporterRegistry,
    InitError, InitStatus, LifecycleState, Platform, PlatformSettings, Telemetry, ValidationMode,
};
use parking_lot::Mutex;
use serde_json::json;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tracing_test::traced_test;

/// Stands in for a real backend and counts providers built.
#[derive(Clone, Default)]
struct StubFactory {
    providers: Arc<AtomicUsize>,
    services: Arc<Mutex<Vec<String>>>,
    spans: InMemorySpanExporter,
}

impl ExporterFactory for StubFactory {
    fn create_exporter(&self, _config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
        Ok(Box::new(self.spans.clone()))
    }

    fn create_provider(&self, config: &Config) -> Result<TracerProvider, DependencyError> {
        self.providers.fetch_add(1, Ordering::SeqCst);
        self.services.lock().push(config.service.name.clone());
        Ok(provider_builder(config)
            .with_simple_exporter(self.spans.clone())
            .build())
    }
}

fn with_stub_arize(stub: &StubFactory) -> Telemetry {
    Telemetry::new().with_exporters(
        ExporterRegistry::builder()
            .with_builtin()
            .register(Platform::Arize, stub.clone())
            .build(),
    )
}

fn arize_config() -> Config {
    Config::new(PlatformSettings::Arize(ArizeSettings {
        endpoint: Some("http://x".to_string()),
        ..Default::default()
    }))
    .with_service(ServiceConfig::new("svc"))
    .with_validation(ValidationMode::Strict)
}

#[test]
fn test_scenario_a_stub_arize_strict() {
    let stub = StubFactory::default();
    let telemetry = with_stub_arize(&stub);

    let status = telemetry
        .init_from(ConfigSource::Value(json!({
            "platform": "arize",
            "service": { "name": "svc" },
            "arize": { "endpoint": "http://x" },
            "validation": { "mode": "strict" }
        })))
        .unwrap();

    assert!(status.is_installed());
    assert!(telemetry.is_configured());
    assert_eq!(stub.providers.load(Ordering::SeqCst), 1);
    assert_eq!(*stub.services.lock(), vec!["svc"]);
}

#[test]
#[traced_test]
fn test_first_init_wins_across_platforms() {
    let stub = StubFactory::default();
    let telemetry = with_stub_arize(&stub);

    telemetry.init(&arize_config()).unwrap();

    for platform in ["console", "noop", "phoenix"] {
        let status = telemetry
            .init_from(ConfigSource::Value(json!({ "platform": platform })))
            .unwrap();
        assert_eq!(status, InitStatus::AlreadyConfigured);
    }

    assert_eq!(stub.providers.load(Ordering::SeqCst), 1);
    telemetry.tracer("svc").in_span("after retries", |_| {});
    assert_eq!(stub.spans.span_names(), vec!["after retries"]);
    assert!(logs_contain("already initialized"));
}

#[test]
fn test_scenario_c_double_shutdown() {
    let exporter = InMemorySpanExporter::new();
    let telemetry = Telemetry::new().with_exporters(
        ExporterRegistry::builder()
            .register(Platform::Arize, Capture(exporter.clone()))
            .build(),
    );
    telemetry.init(&arize_config()).unwrap();
    telemetry.tracer("svc").in_span("request", |_| {});

    telemetry.shutdown();
    assert!(!telemetry.is_configured());
    assert_eq!(exporter.span_names(), vec!["request"]);

    telemetry.shutdown();
    assert!(!telemetry.is_configured());
    assert_eq!(telemetry.state(), LifecycleState::Shutdown);
}

struct Capture(InMemorySpanExporter);

impl ExporterFactory for Capture {
    fn create_exporter(&self, _config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
        Ok(Box::new(self.0.clone()))
    }
}

#[test]
fn test_scenario_d_unknown_platform_strict() {
    let telemetry = Telemetry::new();
    let documents = [
        json!({ "platform": "unknown", "validation": { "mode": "strict" } }),
        json!({
            "platform": "unknown",
            "service": { "name": "svc", "version": "1.0" },
            "arize": { "endpoint": "http://x" },
            "instrumentation": { "enabled": ["tracing"] },
            "validation": { "mode": "strict" }
        }),
    ];

    for document in documents {
        let err = telemetry.init_from(ConfigSource::Value(document)).unwrap_err();
        assert_eq!(
            err,
            InitError::Config(ConfigError::UnknownPlatform("unknown".to_string()))
        );
        assert_eq!(telemetry.state(), LifecycleState::Unconfigured);
    }
}

#[test]
fn test_missing_platform_by_mode() {
    let telemetry = Telemetry::new();
    let err = telemetry
        .init_from(ConfigSource::Value(json!({
            "service": { "name": "svc" },
            "validation": { "mode": "strict" }
        })))
        .unwrap_err();
    assert_eq!(err, InitError::Config(ConfigError::MissingPlatform));
    assert!(!telemetry.is_configured());

    let status = telemetry
        .init_from(ConfigSource::Value(json!({ "service": { "name": "svc" } })))
        .unwrap();
    assert!(matches!(status, InitStatus::Degraded(InitError::Config(ConfigError::MissingPlatform))));

    // The inert provider still hands out working tracers.
    let tracer = telemetry.tracer("svc");
    let value = tracer.in_span("work", |cx| {
        cx.span().set_attribute(KeyValue::new("k", "v"));
        42
    });
    assert_eq!(value, 42);
    assert!(telemetry.provider().unwrap().force_flush().is_empty());
}

#[test]
fn test_invalid_settings_by_mode() {
    let stub = StubFactory::default();
    let telemetry = with_stub_arize(&stub);
    let document = json!({
        "platform": "arize",
        "arize": { "space_id": "space" },
        "validation": { "mode": "strict" }
    });

    let err = telemetry.init_from(ConfigSource::Value(document)).unwrap_err();
    assert_eq!(
        err,
        InitError::Config(ConfigError::MissingField {
            platform: "arize",
            field: "api_key",
        })
    );

    let loose = Config::new(PlatformSettings::Arize(ArizeSettings::default()))
        .with_validation(ValidationMode::Permissive);
    let status = telemetry.init(&loose).unwrap();
    assert!(matches!(status, InitStatus::Degraded(InitError::Config(_))));
    assert_eq!(stub.providers.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_backend_dependency() {
    struct Missing;

    impl ExporterFactory for Missing {
        fn create_exporter(&self, _config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
            Err(DependencyError::feature("arize", "otlp"))
        }
    }

    let telemetry = Telemetry::new().with_exporters(
        ExporterRegistry::builder()
            .with_builtin()
            .register(Platform::Arize, Missing)
            .build(),
    );

    let err = telemetry.init(&arize_config()).unwrap_err();
    let InitError::Dependency(dependency) = err else {
        panic!("expected a dependency error, got {err:?}");
    };
    assert!(dependency.to_string().contains("--features otlp"));
    assert!(!telemetry.is_configured());

    let permissive = arize_config().with_validation(ValidationMode::Permissive);
    let status = telemetry.init(&permissive).unwrap();
    assert!(matches!(status, InitStatus::Degraded(InitError::Dependency(_))));
    assert!(telemetry.is_configured());
}

#[test]
fn test_concurrent_init_installs_one_provider() {
    const THREADS: usize = 8;

    let stub = StubFactory::default();
    let telemetry = Arc::new(with_stub_arize(&stub));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let telemetry = Arc::clone(&telemetry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                telemetry.init(&arize_config()).unwrap()
            })
        })
        .collect();

    let statuses: Vec<InitStatus> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let installed = statuses.iter().filter(|s| s.is_installed()).count();
    let skipped = statuses
        .iter()
        .filter(|s| **s == InitStatus::AlreadyConfigured)
        .count();

    assert_eq!(installed, 1);
    assert_eq!(skipped, THREADS - 1);
    assert_eq!(stub.providers.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_global_lifecycle() {
    llm_telemetry::shutdown();
    assert!(!llm_telemetry::is_configured());

    let status = llm_telemetry::init(&Config::noop().with_service(ServiceConfig::new("global"))).unwrap();
    assert!(status.is_installed());
    assert!(llm_telemetry::is_configured());
    assert!(llm_telemetry::provider().is_some());
    assert_eq!(
        llm_telemetry::init(&Config::noop()).unwrap(),
        InitStatus::AlreadyConfigured
    );

    llm_telemetry::shutdown();
    llm_telemetry::shutdown();
    assert!(!llm_telemetry::is_configured());
    assert!(llm_telemetry::provider().is_none());
}

#[test]
#[serial]
fn test_set_global_after_first_use() {
    let _ = llm_telemetry::global();
    assert!(llm_telemetry::set_global(Telemetry::new()).is_err());
}

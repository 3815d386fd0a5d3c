//! Replaces the process-wide instance, so it runs in its own binary.

use llm_telemetry::config::ConsoleSettings;
use llm_telemetry::exporters::InMemorySpanExporter;
use llm_telemetry::opentelemetry::global;
use llm_telemetry::opentelemetry::trace::Tracer;
use llm_telemetry::opentelemetry_sdk::export::trace::SpanExporter;
use llm_telemetry::{
    Config, DependencyError, ExporterFactory, ExporterRegistry, Platform, PlatformSettings,
    Telemetry,
};

struct Capture(InMemorySpanExporter);

impl ExporterFactory for Capture {
    fn create_exporter(&self, _config: &Config) -> Result<Box<dyn SpanExporter>, DependencyError> {
        Ok(Box::new(self.0.clone()))
    }
}

#[test]
fn test_global_instance_publishes_provider() {
    let exporter = InMemorySpanExporter::new();
    let telemetry = Telemetry::new().with_exporters(
        ExporterRegistry::builder()
            .register(Platform::Console, Capture(exporter.clone()))
            .build(),
    );
    assert!(llm_telemetry::set_global(telemetry).is_ok());

    let config = Config::new(PlatformSettings::Console(ConsoleSettings::default()));
    assert!(llm_telemetry::init(&config).unwrap().is_installed());

    global::tracer("third-party").in_span("vendor call", |_| {});
    llm_telemetry::shutdown();
    assert_eq!(exporter.span_names(), vec!["vendor call"]);
    assert!(exporter.is_shut_down());

    // After shutdown the global provider is inert again.
    global::tracer("third-party").in_span("late call", |_| {});
    assert_eq!(exporter.span_names(), vec!["vendor call"]);
}

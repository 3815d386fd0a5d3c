//! Secondary-backend routing for applications that already trace.
//!
//! An application with its own pipeline keeps it and adds one more processor:
//! a [`MarkerSpanFilter`] in front of a batching processor for the LLM
//! backend. Only spans carrying the marker reach that backend.

use crate::config::Config;
use crate::error::InitError;
use crate::exporters::{BoxedExporter, ExporterRegistry};
use crate::filter::MarkerSpanFilter;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use opentelemetry_sdk::trace::{BatchSpanProcessor, Builder};
use tracing::info;

/// The processor [`secondary_processor`] builds.
pub type SecondaryProcessor = MarkerSpanFilter<BatchSpanProcessor<TokioCurrentThread>>;

/// Builds the filtered processor for the backend described by `config`.
pub fn secondary_processor(
    config: &Config,
    registry: &ExporterRegistry,
) -> Result<SecondaryProcessor, InitError> {
    let platform = config.platform();
    let exporter = registry.resolve(platform)?.create_exporter(config)?;
    info!(%platform, "routing marked spans to secondary backend");
    let batch = BatchSpanProcessor::builder(BoxedExporter(exporter), TokioCurrentThread).build();
    Ok(MarkerSpanFilter::new(batch))
}

/// Adds the secondary backend to an existing provider builder.
pub fn attach(
    builder: Builder,
    config: &Config,
    registry: &ExporterRegistry,
) -> Result<Builder, InitError> {
    Ok(builder.with_span_processor(secondary_processor(config, registry)?))
}

//! Bridge from `tracing` spans to the active tracer provider.
//!
//! The global subscriber can be installed only once per process, so the
//! OpenTelemetry layer sits behind a reload handle. Re-initialising swaps in a
//! layer for the new provider.

use super::InstrumentError;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use parking_lot::Mutex;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

const BRIDGE_SCOPE: &str = "tracing";

type BridgeHandle = reload::Handle<OpenTelemetryLayer<Registry, Tracer>, Registry>;

static BRIDGE: Mutex<Option<BridgeHandle>> = parking_lot::const_mutex(None);

fn bridge_layer(provider: &TracerProvider) -> OpenTelemetryLayer<Registry, Tracer> {
    tracing_opentelemetry::layer().with_tracer(provider.tracer(BRIDGE_SCOPE))
}

/// Routes `tracing` spans to `provider`, installing the global subscriber on first use.
pub(super) fn install(provider: &TracerProvider) -> Result<(), InstrumentError> {
    let mut bridge = BRIDGE.lock();
    if let Some(handle) = bridge.as_ref() {
        return handle
            .reload(bridge_layer(provider))
            .map_err(|e| InstrumentError::Failed(format!("cannot swap tracing bridge: {e}")));
    }

    let (layer, handle) = reload::Layer::new(bridge_layer(provider));
    let subscriber = tracing_subscriber::registry()
        .with(layer)
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| InstrumentError::Failed(format!("cannot install tracing subscriber: {e}")))?;
    *bridge = Some(handle);
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

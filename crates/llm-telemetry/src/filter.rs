//! Span filter for routing a subset of spans to a secondary backend.
//!
//! [`MarkerSpanFilter`] sits in an existing pipeline next to the primary
//! processors and wraps the secondary backend's processor. Every span start is
//! passed through; a finished span is forwarded only if it carries the marker
//! attribute. The check happens at end time because instrumentation may set
//! the classifying attribute after the span was created.

use opentelemetry::trace::TraceResult;
use opentelemetry::Context;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::trace::{Span, SpanProcessor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Attribute set by OpenInference instrumentation on LLM-domain spans.
pub const OPENINFERENCE_SPAN_KIND: &str = "openinference.span.kind";

/// Routing counters, shared so they stay readable once the filter is owned by a provider.
#[derive(Debug, Default)]
pub struct FilterStats {
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl FilterStats {
    /// Spans handed to the delegate so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Finished spans without the marker.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Forwards finished spans carrying a marker attribute to a delegate processor.
///
/// Presence of the key is the whole predicate; its value is ignored.
#[derive(Debug)]
pub struct MarkerSpanFilter<D> {
    delegate: D,
    marker: String,
    stats: Arc<FilterStats>,
}

impl<D: SpanProcessor> MarkerSpanFilter<D> {
    /// Filters on [`OPENINFERENCE_SPAN_KIND`].
    pub fn new(delegate: D) -> Self {
        Self {
            delegate,
            marker: OPENINFERENCE_SPAN_KIND.to_string(),
            stats: Arc::default(),
        }
    }

    /// Uses `marker` as the routing attribute instead.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn stats(&self) -> Arc<FilterStats> {
        Arc::clone(&self.stats)
    }

    /// Returns `true` if `span` would be forwarded.
    pub fn matches(&self, span: &SpanData) -> bool {
        span.attributes.iter().any(|kv| kv.key.as_str() == self.marker)
    }
}

impl<D: SpanProcessor> SpanProcessor for MarkerSpanFilter<D> {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        self.delegate.on_start(span, cx);
    }

    fn on_end(&self, span: SpanData) {
        if self.matches(&span) {
            self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            self.delegate.on_end(span);
        } else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(span = %span.name, marker = %self.marker, "span not routed to secondary backend");
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.delegate.force_flush()
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        self.delegate.shutdown()
    }
}

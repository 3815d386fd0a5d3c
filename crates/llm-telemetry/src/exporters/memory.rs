use futures_util::future::BoxFuture;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Keeps exported spans in memory.
///
/// Clones share storage, so a test can hand one clone to a provider and
/// inspect another.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    shut_down: Arc<AtomicBool>,
}

impl InMemorySpanExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.lock().clone()
    }

    /// Names of the exported spans, in export order.
    pub fn span_names(&self) -> Vec<String> {
        self.spans.lock().iter().map(|span| span.name.to_string()).collect()
    }

    pub fn exported_count(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans.lock().extend(batch);
        Box::pin(std::future::ready(Ok(())))
    }

    fn shutdown(&mut self) {
        self.shut_down.store(true, Ordering::Release);
    }
}

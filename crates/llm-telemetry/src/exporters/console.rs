use futures_util::future::BoxFuture;
use opentelemetry::trace::{Status, TraceError};
use opentelemetry::Value;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Clone)]
enum Sink {
    Stdout { verbose: bool },
    File(PathBuf),
}

/// Writes finished spans to stdout, or appends them to a JSON-lines file.
///
/// On stdout each span is a one-line summary, or pretty JSON when verbose.
#[derive(Debug, Clone)]
pub struct ConsoleSpanExporter {
    sink: Sink,
}

impl ConsoleSpanExporter {
    pub fn stdout(verbose: bool) -> Self {
        Self {
            sink: Sink::Stdout { verbose },
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Sink::File(path.into()),
        }
    }

    fn write_batch(&self, batch: &[SpanData]) -> io::Result<()> {
        match &self.sink {
            Sink::Stdout { verbose } => {
                let mut out = io::stdout().lock();
                for span in batch {
                    if *verbose {
                        serde_json::to_writer_pretty(&mut out, &span_json(span))?;
                        writeln!(out)?;
                    } else {
                        writeln!(out, "{}", summary_line(span))?;
                    }
                }
                out.flush()
            }
            Sink::File(path) => {
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                for span in batch {
                    serde_json::to_writer(&mut file, &span_json(span))?;
                    writeln!(file)?;
                }
                Ok(())
            }
        }
    }
}

impl SpanExporter for ConsoleSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .write_batch(&batch)
            .map_err(|err| TraceError::from(format!("console export failed: {err}")));
        Box::pin(std::future::ready(result))
    }
}

fn elapsed_ms(span: &SpanData) -> f64 {
    span.end_time
        .duration_since(span.start_time)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}

fn status_text(status: &Status) -> String {
    match status {
        Status::Unset => "unset".to_string(),
        Status::Ok => "ok".to_string(),
        Status::Error { description } => format!("error: {description}"),
    }
}

fn summary_line(span: &SpanData) -> String {
    format!(
        "[{}] {} trace={} span={} parent={} {:.2}ms attrs={} status={}",
        span.instrumentation_lib.name,
        span.name,
        span.span_context.trace_id(),
        span.span_context.span_id(),
        span.parent_span_id,
        elapsed_ms(span),
        span.attributes.len(),
        status_text(&span.status),
    )
}

fn attribute_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(flag) => (*flag).into(),
        Value::I64(number) => (*number).into(),
        Value::F64(number) => serde_json::Number::from_f64(*number)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(text) => text.as_str().into(),
        Value::Array(_) => value.to_string().into(),
    }
}

fn span_json(span: &SpanData) -> serde_json::Value {
    let attributes: serde_json::Map<String, serde_json::Value> = span
        .attributes
        .iter()
        .map(|kv| (kv.key.as_str().to_string(), attribute_json(&kv.value)))
        .collect();

    json!({
        "name": span.name,
        "scope": span.instrumentation_lib.name,
        "kind": format!("{:?}", span.span_kind),
        "trace_id": span.span_context.trace_id().to_string(),
        "span_id": span.span_context.span_id().to_string(),
        "parent_span_id": span.parent_span_id.to_string(),
        "duration_ms": elapsed_ms(span),
        "attributes": attributes,
        "status": status_text(&span.status),
    })
}

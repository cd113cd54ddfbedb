//! Finished-span records and the exporter hand-off.
//!
//! Ending a span converts it exactly once into an immutable [`FinishedSpan`]
//! and pushes it onto a bounded queue. The owning runtime drains the queue
//! into a [`SpanExporter`]. When the queue is full the record is dropped and
//! counted; span end never blocks the instrumented call.

use crate::span::{AttributeValue, SpanContext, SpanKind, SpanStatus};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A link recorded on a finished span.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedLink {
    /// W3C-rendered trace ID of the linked span.
    pub trace_id: String,
    /// W3C-rendered span ID of the linked span.
    pub span_id: String,
}

impl FinishedLink {
    /// Builds a link record from a span context.
    #[must_use]
    pub fn from_context(context: &SpanContext) -> Self {
        Self {
            trace_id: context.trace_id().to_w3c_string(),
            span_id: context.span_id().to_w3c_string(),
        }
    }
}

/// An immutable record of a fully-ended span.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinishedSpan {
    /// W3C-rendered trace ID.
    pub trace_id: String,
    /// W3C-rendered span ID.
    pub span_id: String,
    /// W3C-rendered parent span ID, if the span had a parent.
    pub parent_span_id: Option<String>,
    /// Final span name.
    pub name: String,
    /// Span kind.
    pub kind: SpanKind,
    /// Final status.
    pub status: SpanStatus,
    /// Status message, set when the status is an error.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_message: Option<String>,
    /// Whether the sampled flag was set.
    pub sampled: bool,
    /// Start time, nanoseconds since the Unix epoch.
    pub start_unix_nanos: u64,
    /// End time, nanoseconds since the Unix epoch.
    pub end_unix_nanos: u64,
    /// Final attribute set, keyed by attribute name.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Links to other span contexts.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub links: Vec<FinishedLink>,
}

/// Receives batches of finished spans.
///
/// Exporters must not panic; a panicking exporter loses the batch but never
/// disturbs the instrumented application.
pub trait SpanExporter: Send + Sync + std::fmt::Debug + 'static {
    /// Exports a batch of finished spans.
    fn export(&self, batch: Vec<FinishedSpan>);
}

/// Bounded hand-off queue between ending spans and the exporter.
#[derive(Debug)]
pub struct ExportQueue {
    queue: ArrayQueue<FinishedSpan>,
    dropped: AtomicU64,
}

impl ExportQueue {
    /// Creates a queue with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        })
    }

    /// Offers a finished span; drops and counts it when the queue is full.
    pub fn offer(&self, span: FinishedSpan) {
        if let Err(rejected) = self.queue.push(span) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                span_id = %rejected.span_id,
                "export queue full, dropping finished span"
            );
        }
    }

    /// Drains all queued spans into the exporter; returns how many were
    /// handed off.
    pub fn drain_into(&self, exporter: &dyn SpanExporter) -> usize {
        let mut batch = Vec::new();
        while let Some(span) = self.queue.pop() {
            batch.push(span);
        }
        let count = batch.len();
        if count > 0 {
            exporter.export(batch);
        }
        count
    }

    /// Number of spans currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no spans are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of spans dropped because the queue was full.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Collects finished spans in memory for tests and diagnostics.
#[derive(Debug, Default)]
pub struct InMemoryExporter {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemoryExporter {
    /// Creates an empty exporter.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a snapshot of everything exported so far.
    #[must_use]
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.spans.lock().clone()
    }

    /// Clears the collected spans.
    pub fn clear(&self) {
        self.spans.lock().clear();
    }
}

impl SpanExporter for InMemoryExporter {
    fn export(&self, mut batch: Vec<FinishedSpan>) {
        self.spans.lock().append(&mut batch);
    }
}

/// Emits each finished span as a single JSON line through the process logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLogExporter;

impl SpanExporter for JsonLogExporter {
    fn export(&self, batch: Vec<FinishedSpan>) {
        for span in batch {
            match serde_json::to_string(&span) {
                Ok(line) => tracing::info!(target: "traceweave::export", span = %line),
                Err(err) => {
                    tracing::debug!(span_id = %span.span_id, error = %err, "span serialization failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(span_id: &str) -> FinishedSpan {
        FinishedSpan {
            trace_id: "0123456789abcdef0123456789abcdef".to_string(),
            span_id: span_id.to_string(),
            parent_span_id: None,
            name: "test".to_string(),
            kind: SpanKind::Internal,
            status: SpanStatus::Unset,
            status_message: None,
            sampled: true,
            start_unix_nanos: 1,
            end_unix_nanos: 2,
            attributes: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    #[test]
    fn queue_hands_off_in_order() {
        let queue = ExportQueue::with_capacity(8);
        queue.offer(sample("0000000000000001"));
        queue.offer(sample("0000000000000002"));

        let exporter = InMemoryExporter::new();
        let drained = queue.drain_into(exporter.as_ref());
        assert_eq!(drained, 2);

        let spans = exporter.finished_spans();
        assert_eq!(spans[0].span_id, "0000000000000001");
        assert_eq!(spans[1].span_id, "0000000000000002");
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let queue = ExportQueue::with_capacity(1);
        queue.offer(sample("0000000000000001"));
        queue.offer(sample("0000000000000002"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped_count(), 1);
    }

    #[test]
    fn drain_on_empty_exports_nothing() {
        let queue = ExportQueue::with_capacity(4);
        let exporter = InMemoryExporter::new();
        assert_eq!(queue.drain_into(exporter.as_ref()), 0);
        assert!(exporter.finished_spans().is_empty());
    }

    #[test]
    fn finished_span_json_roundtrip() {
        let mut span = sample("00000000000000ab");
        span.attributes
            .insert("http.method".to_string(), AttributeValue::from("GET"));
        span.links.push(FinishedLink {
            trace_id: "0123456789abcdef0123456789abcdef".to_string(),
            span_id: "00000000000000cd".to_string(),
        });

        let json = serde_json::to_string(&span).expect("serialize");
        let back: FinishedSpan = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, span);
    }

    #[test]
    fn capacity_zero_is_clamped() {
        let queue = ExportQueue::with_capacity(0);
        queue.offer(sample("0000000000000001"));
        assert_eq!(queue.len(), 1);
    }
}

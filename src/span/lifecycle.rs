//! The span lifecycle state machine.
//!
//! A span moves `unstarted -> started -> ended` and never backwards. Started
//! spans accept attribute, status, and name mutation; once ended, further
//! mutation is a debug-logged no-op, never an error. The end timestamp, once
//! set, never changes, and a fully-ended span is handed to the export queue
//! exactly once.

use super::context::{SpanContext, TraceFlags, TraceState};
use super::id::{SpanId, TraceId};
use super::time::Timestamp;
use crate::context::Context;
use crate::export::{ExportQueue, FinishedLink, FinishedSpan};
use crate::util::{IdSource, OsIdSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// The role a span plays in a request flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Internal operation, the default.
    #[default]
    Internal,
    /// Outbound request to a remote service.
    Client,
    /// Handling of an inbound request.
    Server,
    /// Message published to a broker.
    Producer,
    /// Message consumed from a broker.
    Consumer,
}

/// The final disposition of a span.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// No status recorded, the default.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error,
}

/// A typed attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    I64(i64),
    /// Floating point value.
    F64(f64),
    /// String value.
    String(String),
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// A causal link to another span context.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    span_context: SpanContext,
}

impl Link {
    /// Creates a link to the given span context.
    #[must_use]
    pub fn new(span_context: SpanContext) -> Self {
        Self { span_context }
    }

    /// Returns the linked span context.
    #[must_use]
    pub const fn span_context(&self) -> &SpanContext {
        &self.span_context
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Unstarted,
    Started,
    Ended,
}

#[derive(Debug)]
struct SpanData {
    lifecycle: Lifecycle,
    name: String,
    kind: SpanKind,
    status: SpanStatus,
    status_message: Option<String>,
    attributes: HashMap<String, AttributeValue>,
    links: SmallVec<[Link; 2]>,
    start: Timestamp,
    end: Timestamp,
}

#[derive(Debug)]
struct SpanInner {
    span_context: SpanContext,
    parent: Option<SpanContext>,
    sink: Option<Arc<ExportQueue>>,
    data: Mutex<SpanData>,
}

/// A handle to a span. Cheap to clone; all clones observe the same state.
///
/// Parent linkage is established once at creation time and never reassigned.
#[derive(Clone, Debug)]
pub struct Span {
    inner: Arc<SpanInner>,
}

impl Span {
    /// Starts building a span with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SpanBuilder {
        SpanBuilder::new(name)
    }

    /// Returns the identifiers of this span.
    #[must_use]
    pub fn span_context(&self) -> &SpanContext {
        &self.inner.span_context
    }

    /// Returns the parent span context recorded at creation, if any.
    #[must_use]
    pub fn parent_span_context(&self) -> Option<&SpanContext> {
        self.inner.parent.as_ref()
    }

    /// Returns true if the span is started and not yet ended.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.inner.data.lock().lifecycle == Lifecycle::Started
    }

    /// Returns true if the span has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.data.lock().lifecycle == Lifecycle::Ended
    }

    /// Returns the current span name.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.data.lock().name.clone()
    }

    /// Returns the recorded start time, `Timestamp::ZERO` if unstarted.
    #[must_use]
    pub fn start_time(&self) -> Timestamp {
        self.inner.data.lock().start
    }

    /// Returns the recorded end time, `Timestamp::ZERO` if not ended.
    #[must_use]
    pub fn end_time(&self) -> Timestamp {
        self.inner.data.lock().end
    }

    /// Returns the current value of an attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.inner.data.lock().attributes.get(key).cloned()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SpanStatus {
        self.inner.data.lock().status
    }

    /// Starts the span now.
    pub fn start(&self) {
        self.start_at(Timestamp::now());
    }

    /// Starts the span at an explicit time.
    pub fn start_at(&self, at: Timestamp) {
        let mut data = self.inner.data.lock();
        match data.lifecycle {
            Lifecycle::Unstarted => {
                data.lifecycle = Lifecycle::Started;
                data.start = at;
            }
            Lifecycle::Started | Lifecycle::Ended => {
                tracing::debug!(span_id = %self.inner.span_context.span_id(), "start ignored, span already started");
            }
        }
    }

    /// Sets an attribute on a started span; a no-op otherwise.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let mut data = self.inner.data.lock();
        if data.lifecycle == Lifecycle::Started {
            data.attributes.insert(key.into(), value.into());
        } else {
            tracing::debug!(span_id = %self.inner.span_context.span_id(), "attribute ignored, span not recording");
        }
    }

    /// Sets the status on a started span; a no-op otherwise.
    pub fn set_status(&self, status: SpanStatus) {
        let mut data = self.inner.data.lock();
        if data.lifecycle == Lifecycle::Started {
            data.status = status;
            if status != SpanStatus::Error {
                data.status_message = None;
            }
        } else {
            tracing::debug!(span_id = %self.inner.span_context.span_id(), "status ignored, span not recording");
        }
    }

    /// Marks the span as failed with an error message.
    pub fn record_error(&self, message: impl Into<String>) {
        let mut data = self.inner.data.lock();
        if data.lifecycle == Lifecycle::Started {
            data.status = SpanStatus::Error;
            data.status_message = Some(message.into());
        } else {
            tracing::debug!(span_id = %self.inner.span_context.span_id(), "error ignored, span not recording");
        }
    }

    /// Renames a started span; a no-op otherwise.
    pub fn update_name(&self, name: impl Into<String>) {
        let mut data = self.inner.data.lock();
        if data.lifecycle == Lifecycle::Started {
            data.name = name.into();
        } else {
            tracing::debug!(span_id = %self.inner.span_context.span_id(), "rename ignored, span not recording");
        }
    }

    /// Adds a causal link to a started span; a no-op otherwise.
    pub fn add_link(&self, target: SpanContext) {
        let mut data = self.inner.data.lock();
        if data.lifecycle == Lifecycle::Started {
            data.links.push(Link::new(target));
        } else {
            tracing::debug!(span_id = %self.inner.span_context.span_id(), "link ignored, span not recording");
        }
    }

    /// Ends the span now. Idempotent; only the first call takes effect.
    pub fn end(&self) {
        self.end_at(Timestamp::now());
    }

    /// Ends the span at an explicit time. Idempotent; the end timestamp is
    /// set by the first call and never changes.
    pub fn end_at(&self, at: Timestamp) {
        let finished = {
            let mut data = self.inner.data.lock();
            match data.lifecycle {
                Lifecycle::Started => {
                    data.lifecycle = Lifecycle::Ended;
                    data.end = at;
                    Some(self.to_finished(&data))
                }
                Lifecycle::Unstarted => {
                    tracing::debug!(span_id = %self.inner.span_context.span_id(), "end ignored, span never started");
                    None
                }
                Lifecycle::Ended => {
                    tracing::debug!(span_id = %self.inner.span_context.span_id(), "end ignored, span already ended");
                    None
                }
            }
        };
        if let (Some(finished), Some(sink)) = (finished, self.inner.sink.as_ref()) {
            sink.offer(finished);
        }
    }

    /// Installs this span as the active span of the ambient context.
    ///
    /// The returned scope restores the prior ambient context on drop.
    #[must_use]
    pub fn make_current(&self) -> crate::context::Scope {
        Context::current().with_span(self.clone()).attach()
    }

    fn to_finished(&self, data: &SpanData) -> FinishedSpan {
        FinishedSpan {
            trace_id: self.inner.span_context.trace_id().to_w3c_string(),
            span_id: self.inner.span_context.span_id().to_w3c_string(),
            parent_span_id: self
                .inner
                .parent
                .as_ref()
                .map(|p| p.span_id().to_w3c_string()),
            name: data.name.clone(),
            kind: data.kind,
            status: data.status,
            status_message: data.status_message.clone(),
            sampled: self.inner.span_context.is_sampled(),
            start_unix_nanos: data.start.as_nanos(),
            end_unix_nanos: data.end.as_nanos(),
            attributes: data
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            links: data
                .links
                .iter()
                .map(|l| FinishedLink::from_context(l.span_context()))
                .collect(),
        }
    }
}

/// Where a new span takes its parent from.
#[derive(Clone, Debug, Default)]
enum ParentSource {
    /// The ambient context of the starting thread.
    #[default]
    Current,
    /// An explicitly supplied context value.
    Context(Context),
    /// An explicitly supplied span context.
    Explicit(SpanContext),
    /// No parent; the span roots a new trace.
    Root,
}

/// Builds and starts spans.
#[derive(Debug)]
pub struct SpanBuilder {
    name: String,
    kind: SpanKind,
    attributes: Vec<(String, AttributeValue)>,
    links: SmallVec<[Link; 2]>,
    parent: ParentSource,
    sink: Option<Arc<ExportQueue>>,
    id_source: Option<Arc<dyn IdSource>>,
}

impl SpanBuilder {
    /// Creates a builder for a span with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SpanKind::default(),
            attributes: Vec::new(),
            links: SmallVec::new(),
            parent: ParentSource::default(),
            sink: None,
            id_source: None,
        }
    }

    /// Sets the span kind.
    #[must_use]
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Records an attribute present from the start.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Records a causal link present from the start.
    #[must_use]
    pub fn with_link(mut self, target: SpanContext) -> Self {
        self.links.push(Link::new(target));
        self
    }

    /// Takes the parent from the span found in the supplied context.
    #[must_use]
    pub fn parent_from(mut self, context: &Context) -> Self {
        self.parent = ParentSource::Context(context.clone());
        self
    }

    /// Uses an explicit span context as the parent.
    #[must_use]
    pub fn parent_context(mut self, parent: SpanContext) -> Self {
        self.parent = ParentSource::Explicit(parent);
        self
    }

    /// Roots a new trace regardless of any ambient span.
    #[must_use]
    pub fn no_parent(mut self) -> Self {
        self.parent = ParentSource::Root;
        self
    }

    pub(crate) fn with_sink(mut self, sink: Arc<ExportQueue>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub(crate) fn with_id_source(mut self, id_source: Arc<dyn IdSource>) -> Self {
        self.id_source = Some(id_source);
        self
    }

    /// Builds the span in the unstarted state.
    #[must_use]
    pub fn build(self) -> Span {
        let parent = match &self.parent {
            ParentSource::Current => Context::current().active_span_context(),
            ParentSource::Context(cx) => cx.active_span_context(),
            ParentSource::Explicit(sc) => Some(sc.clone()),
            ParentSource::Root => None,
        }
        .filter(SpanContext::is_valid);

        let id_source: Arc<dyn IdSource> = self
            .id_source
            .unwrap_or_else(|| Arc::new(OsIdSource));

        let (trace_id, flags, trace_state) = parent.as_ref().map_or_else(
            || (TraceId::new_random(id_source.as_ref()), TraceFlags::SAMPLED, TraceState::empty()),
            |p| (p.trace_id(), p.flags(), p.trace_state().clone()),
        );

        let span_context =
            SpanContext::new(trace_id, SpanId::new_random(id_source.as_ref()), flags)
                .with_trace_state(trace_state);

        Span {
            inner: Arc::new(SpanInner {
                span_context,
                parent,
                sink: self.sink,
                data: Mutex::new(SpanData {
                    lifecycle: Lifecycle::Unstarted,
                    name: self.name,
                    kind: self.kind,
                    status: SpanStatus::Unset,
                    status_message: None,
                    attributes: self.attributes.into_iter().collect(),
                    links: self.links,
                    start: Timestamp::ZERO,
                    end: Timestamp::ZERO,
                }),
            }),
        }
    }

    /// Builds the span and starts it now.
    #[must_use]
    pub fn start(self) -> Span {
        let span = self.build();
        span.start();
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemoryExporter;
    use crate::util::DetIdSource;

    fn det_builder(name: &str) -> SpanBuilder {
        Span::builder(name).with_id_source(DetIdSource::shared(42))
    }

    #[test]
    fn lifecycle_progression() {
        let span = det_builder("op").no_parent().build();
        assert!(!span.is_recording());

        span.start();
        assert!(span.is_recording());
        assert!(!span.start_time().is_zero());

        span.end();
        assert!(!span.is_recording());
        assert!(span.is_ended());
    }

    #[test]
    fn end_is_idempotent() {
        let span = det_builder("op").no_parent().start();
        span.end_at(Timestamp::from_nanos(100));
        let first_end = span.end_time();
        span.end_at(Timestamp::from_nanos(999));
        assert_eq!(span.end_time(), first_end);
        assert_eq!(first_end.as_nanos(), 100);
    }

    #[test]
    fn mutation_after_end_is_ignored() {
        let span = det_builder("op").no_parent().start();
        span.set_attribute("before", 1i64);
        span.end();

        span.set_attribute("after", 2i64);
        span.set_status(SpanStatus::Ok);
        span.update_name("renamed");
        span.add_link(SpanContext::invalid());

        assert_eq!(span.attribute("before"), Some(AttributeValue::I64(1)));
        assert_eq!(span.attribute("after"), None);
        assert_eq!(span.status(), SpanStatus::Unset);
        assert_eq!(span.name(), "op");
    }

    #[test]
    fn mutation_before_start_is_ignored() {
        let span = det_builder("op").no_parent().build();
        span.set_attribute("k", 1i64);
        assert_eq!(span.attribute("k"), None);
    }

    #[test]
    fn end_before_start_is_ignored() {
        let span = det_builder("op").no_parent().build();
        span.end();
        assert!(!span.is_ended());
    }

    #[test]
    fn parent_linkage_from_explicit_context() {
        let parent = det_builder("parent").no_parent().start();
        let child = det_builder("child")
            .parent_context(parent.span_context().clone())
            .start();

        assert_eq!(
            child.span_context().trace_id(),
            parent.span_context().trace_id()
        );
        assert_eq!(
            child.parent_span_context().map(SpanContext::span_id),
            Some(parent.span_context().span_id())
        );
        assert_ne!(
            child.span_context().span_id(),
            parent.span_context().span_id()
        );
    }

    #[test]
    fn root_span_samples_by_default() {
        let span = det_builder("root").no_parent().start();
        assert!(span.span_context().is_sampled());
        assert!(span.span_context().is_valid());
    }

    #[test]
    fn invalid_explicit_parent_roots_a_new_trace() {
        let span = det_builder("op")
            .parent_context(SpanContext::invalid())
            .start();
        assert!(span.parent_span_context().is_none());
        assert!(span.span_context().is_valid());
    }

    #[test]
    fn ended_span_is_exported_exactly_once() {
        let queue = ExportQueue::with_capacity(8);
        let span = det_builder("op")
            .no_parent()
            .with_sink(Arc::clone(&queue))
            .start();
        span.set_attribute("k", "v");
        span.end();
        span.end();
        span.end();

        let exporter = InMemoryExporter::new();
        assert_eq!(queue.drain_into(exporter.as_ref()), 1);
        let spans = exporter.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "op");
        assert_eq!(
            spans[0].attributes.get("k"),
            Some(&AttributeValue::from("v"))
        );
    }

    #[test]
    fn record_error_sets_status_and_message() {
        let span = det_builder("op").no_parent().start();
        span.record_error("boom");
        assert_eq!(span.status(), SpanStatus::Error);

        let queue = ExportQueue::with_capacity(1);
        // Status message travels into the finished record.
        let span2 = det_builder("op2")
            .no_parent()
            .with_sink(Arc::clone(&queue))
            .start();
        span2.record_error("kaput");
        span2.end();
        let exporter = InMemoryExporter::new();
        queue.drain_into(exporter.as_ref());
        let spans = exporter.finished_spans();
        assert_eq!(spans[0].status, SpanStatus::Error);
        assert_eq!(spans[0].status_message.as_deref(), Some("kaput"));
    }

    #[test]
    fn links_travel_into_finished_record() {
        let queue = ExportQueue::with_capacity(1);
        let other = SpanContext::new(
            TraceId::new_for_test(5),
            SpanId::new_for_test(6),
            TraceFlags::SAMPLED,
        );
        let span = det_builder("op")
            .no_parent()
            .with_link(other.clone())
            .with_sink(Arc::clone(&queue))
            .start();
        span.end();

        let exporter = InMemoryExporter::new();
        queue.drain_into(exporter.as_ref());
        let spans = exporter.finished_spans();
        assert_eq!(spans[0].links.len(), 1);
        assert_eq!(spans[0].links[0].span_id, other.span_id().to_w3c_string());
    }

    #[test]
    fn clones_share_state() {
        let span = det_builder("op").no_parent().start();
        let clone = span.clone();
        clone.set_attribute("k", true);
        assert_eq!(span.attribute("k"), Some(AttributeValue::Bool(true)));
        clone.end();
        assert!(span.is_ended());
    }
}

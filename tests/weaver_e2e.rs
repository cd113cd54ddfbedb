//! End-to-end weaver flows: advice-driven span creation around intercepted
//! calls, decorator enrichment, configuration-driven behaviour, and the
//! bounded export hand-off.

mod common;

use common::{det_weaver, init_test_logging};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use traceweave::advice::{
    instrumented_call, Advice, EnterValue, Instrumentation, InstrumentationSet, InvocationFrame,
    InvocationOutcome,
};
use traceweave::config::{keys, Config};
use traceweave::decorator::{ComponentDecorator, Decorator};
use traceweave::export::InMemoryExporter;
use traceweave::matcher::{named, takes_argument, LoaderId, MethodDescription, TypeDescription};
use traceweave::runtime::Weaver;
use traceweave::span::{AttributeValue, Span, SpanStatus};
use traceweave::util::DetIdSource;

/// Advice opening a span for the intercepted call and closing it on exit,
/// recording a panic outcome as an error.
#[derive(Debug)]
struct SpanAdvice {
    weaver: Arc<Weaver>,
}

impl Advice for SpanAdvice {
    fn on_enter(&self, frame: &InvocationFrame) -> Option<EnterValue> {
        let span = self
            .weaver
            .span(format!("{}.{}", frame.type_name(), frame.method_name()))
            .start();
        Some(Box::new(span))
    }

    fn on_exit(
        &self,
        _frame: &InvocationFrame,
        enter_value: Option<EnterValue>,
        outcome: &InvocationOutcome<'_>,
    ) -> Option<Box<dyn Any + Send>> {
        if let Some(span) = enter_value.and_then(|value| value.downcast::<Span>().ok()) {
            match outcome {
                InvocationOutcome::Returned(_) => span.set_status(SpanStatus::Ok),
                InvocationOutcome::Panicked(message) => span.record_error(*message),
            }
            span.end();
        }
        None
    }
}

fn worker_type() -> TypeDescription {
    TypeDescription::new("app.Worker")
        .with_method(MethodDescription::new("submit", "app.Future").with_parameter("lang.Runnable"))
}

fn submit_method() -> MethodDescription {
    MethodDescription::new("submit", "app.Future").with_parameter("lang.Runnable")
}

fn span_instrumentations(weaver: &Arc<Weaver>) -> InstrumentationSet {
    InstrumentationSet::new().with(Arc::new(Instrumentation::new(
        "worker-submit",
        named("app.Worker"),
        named::<MethodDescription>("submit").and(takes_argument(0, "lang.Runnable")),
        Arc::new(SpanAdvice {
            weaver: Arc::clone(weaver),
        }) as Arc<dyn Advice>,
    )))
}

fn arc_weaver(seed: u64) -> (Arc<Weaver>, Arc<InMemoryExporter>) {
    let exporter = InMemoryExporter::new();
    let weaver = Arc::new(
        Weaver::builder()
            .with_exporter(exporter.clone())
            .with_id_source(DetIdSource::shared(seed))
            .build(),
    );
    (weaver, exporter)
}

// ===========================================================================
// ADVICE-DRIVEN SPANS AROUND INTERCEPTED CALLS
// ===========================================================================

#[test]
fn intercepted_call_produces_a_span_and_keeps_its_return_value() {
    init_test_logging();
    let (weaver, exporter) = arc_weaver(30);
    let instrumentations = span_instrumentations(&weaver);

    let advices = instrumentations.resolve(LoaderId::BOOTSTRAP, &worker_type(), &submit_method());
    assert_eq!(advices.len(), 1);

    let frame = InvocationFrame::new("app.Worker", "submit");
    let result = instrumented_call(&advices, &frame, || 41 + 1);
    assert_eq!(result, 42);

    assert_eq!(weaver.flush(), 1);
    let spans = exporter.finished_spans();
    assert_eq!(spans[0].name, "app.Worker.submit");
    assert_eq!(spans[0].status, SpanStatus::Ok);
}

#[test]
fn panicking_call_exports_an_errored_span_and_still_unwinds() {
    init_test_logging();
    let (weaver, exporter) = arc_weaver(31);
    let instrumentations = span_instrumentations(&weaver);
    let advices = instrumentations.resolve(LoaderId::BOOTSTRAP, &worker_type(), &submit_method());

    let frame = InvocationFrame::new("app.Worker", "submit");
    let caught: Result<(), _> = panic::catch_unwind(AssertUnwindSafe(|| {
        instrumented_call(&advices, &frame, || panic!("worker refused"))
    }));
    assert!(caught.is_err(), "the call's own panic must propagate");

    assert_eq!(weaver.flush(), 1);
    let spans = exporter.finished_spans();
    assert_eq!(spans[0].status, SpanStatus::Error);
    assert_eq!(spans[0].status_message.as_deref(), Some("worker refused"));
}

#[test]
fn unmatched_types_and_methods_resolve_to_no_advice() {
    let (weaver, exporter) = arc_weaver(32);
    let instrumentations = span_instrumentations(&weaver);

    let other_type = TypeDescription::new("app.Other");
    let shutdown = MethodDescription::new("shutdown", "void");

    assert!(instrumentations
        .resolve(LoaderId::BOOTSTRAP, &other_type, &submit_method())
        .is_empty());
    assert!(instrumentations
        .resolve(LoaderId::BOOTSTRAP, &worker_type(), &shutdown)
        .is_empty());

    // A call with no advice is a plain call, nothing is exported.
    let frame = InvocationFrame::new("app.Other", "submit");
    let result = instrumented_call(&[], &frame, || "plain");
    assert_eq!(result, "plain");
    assert_eq!(weaver.flush(), 0);
    assert!(exporter.finished_spans().is_empty());
}

// ===========================================================================
// DECORATOR ENRICHMENT
// ===========================================================================

#[test]
fn registered_decorator_enriches_spans_for_its_library() {
    init_test_logging();
    let exporter = InMemoryExporter::new();
    let weaver = Weaver::builder()
        .with_exporter(exporter.clone())
        .with_id_source(DetIdSource::shared(33))
        .with_decorator(Arc::new(ComponentDecorator::new("httpclient", "http-client")))
        .build();

    let decorator = weaver
        .decorators()
        .get("httpclient")
        .expect("decorator registered at build time");

    let span = weaver.span("GET /users").no_parent().start();
    decorator.on_start(&span);
    decorator.on_end(&span);
    span.end();

    weaver.flush();
    let spans = exporter.finished_spans();
    assert_eq!(
        spans[0].attributes.get("component"),
        Some(&AttributeValue::from("http-client"))
    );
    assert_eq!(spans[0].status, SpanStatus::Ok);
    assert!(weaver.decorators().get("unknown-library").is_none());
}

// ===========================================================================
// CONFIGURATION-DRIVEN BEHAVIOUR
// ===========================================================================

#[test]
fn disabled_tracing_turns_span_export_off_entirely() {
    init_test_logging();
    let exporter = InMemoryExporter::new();
    let config = Config::builder()
        .set(keys::TRACE_ENABLED, "false")
        .build()
        .expect("valid config");
    let weaver = Weaver::builder()
        .with_config(config)
        .with_exporter(exporter.clone())
        .build();

    // Spans can still be created and used; they just never reach the queue.
    let span = weaver.span("invisible").no_parent().start();
    span.set_attribute("k", 1_i64);
    span.end();
    assert!(span.is_ended());

    assert_eq!(weaver.flush(), 0);
    assert!(exporter.finished_spans().is_empty());
}

#[test]
fn export_queue_capacity_bounds_what_a_flush_can_hand_over() {
    init_test_logging();
    let exporter = InMemoryExporter::new();
    let config = Config::builder()
        .set(keys::EXPORT_QUEUE_CAPACITY, "2")
        .build()
        .expect("valid config");
    let weaver = Weaver::builder()
        .with_config(config)
        .with_exporter(exporter.clone())
        .with_id_source(DetIdSource::shared(34))
        .build();

    for i in 0..4 {
        weaver.span(format!("span-{i}")).no_parent().start().end();
    }

    // Two fit, the overflow is counted and dropped.
    assert_eq!(weaver.flush(), 2);
    assert_eq!(exporter.finished_spans().len(), 2);
    assert_eq!(weaver.export_queue().dropped_count(), 2);

    // The queue is usable again after draining.
    weaver.span("after-drain").no_parent().start().end();
    assert_eq!(weaver.flush(), 1);
}

// ===========================================================================
// RUNTIME ISOLATION
// ===========================================================================

#[test]
fn weavers_are_fully_isolated_from_each_other() {
    let (weaver_a, exporter_a) = det_weaver(35);
    let (weaver_b, exporter_b) = det_weaver(36);

    weaver_a.span("a-1").no_parent().start().end();
    weaver_a.span("a-2").no_parent().start().end();
    weaver_b.span("b-1").no_parent().start().end();

    assert_eq!(weaver_a.flush(), 2);
    assert_eq!(weaver_b.flush(), 1);
    assert_eq!(exporter_a.finished_spans().len(), 2);
    assert_eq!(exporter_b.finished_spans().len(), 1);

    let names_a: Vec<_> = exporter_a
        .finished_spans()
        .iter()
        .map(|s| s.name.clone())
        .collect();
    assert!(!names_a.contains(&"b-1".to_string()));
}

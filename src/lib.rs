//! Traceweave: in-process instrumentation runtime for distributed tracing.
//!
//! # Overview
//!
//! Traceweave provides the conceptual core of a tracing agent as a library:
//! immutable context values, a span lifecycle state machine, wire propagation,
//! structural type matching, advice interception, and context propagation
//! across thread boundaries. There is no ambient static registry; every
//! registry is owned by a single long-lived [`Weaver`](runtime::Weaver), so
//! tests construct isolated instances.
//!
//! # Core Guarantees
//!
//! - **Immutable contexts**: deriving a [`Context`](context::Context) never
//!   mutates an ancestor
//! - **Scope discipline**: every attach is balanced by exactly one close;
//!   closes restore the prior ambient context, LIFO per thread
//! - **Idempotent span end**: an end timestamp, once set, never changes
//! - **Fail-silent instrumentation**: no internal failure is observable by
//!   the instrumented call; worst case is a missing or mis-parented span
//! - **Conservative matching**: unresolvable type hierarchies and panicking
//!   predicates evaluate to "no match"
//! - **Tolerant extraction**: malformed carriers yield the input context
//!   unchanged, never an error
//!
//! # Module Structure
//!
//! - [`context`]: immutable context values, typed keys, ambient scope
//! - [`span`]: trace/span identifiers, span context, span lifecycle
//! - [`propagation`]: carrier-agnostic inject/extract codecs
//! - [`matcher`]: structural type descriptions and predicate combinators
//! - [`advice`]: enter/exit interception around instrumented calls
//! - [`concurrent`]: cross-thread context capture and task wrapping
//! - [`decorator`]: per-library span decoration capability interface
//! - [`export`]: finished-span records and the exporter hand-off
//! - [`runtime`]: the [`Weaver`](runtime::Weaver) owning all registries
//! - [`config`]: flat property configuration with environment overlay
//! - [`util`]: deterministic RNG and the identifier entropy seam

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod advice;
pub mod concurrent;
pub mod config;
pub mod context;
pub mod decorator;
pub mod export;
pub mod matcher;
pub mod propagation;
pub mod runtime;
pub mod span;
pub mod util;

// Re-exports for convenient access to core types
pub use config::{Config, ConfigBuilder, ConfigError};
pub use context::{Context, ContextKey, Scope};
pub use export::{FinishedSpan, InMemoryExporter, SpanExporter};
pub use propagation::{
    BaggageCodec, CarrierExtractor, CarrierInjector, CompositeCodec, PropagationCodec,
    TraceparentCodec,
};
pub use runtime::{Weaver, WeaverBuilder};
pub use span::{Span, SpanContext, SpanId, SpanKind, SpanStatus, TraceFlags, TraceId};

//! Span identifiers, span context, and the span lifecycle state machine.

pub mod context;
pub mod id;
pub mod lifecycle;
pub mod time;

pub use context::{SpanContext, TraceFlags, TraceState};
pub use id::{SpanId, TraceId};
pub use lifecycle::{AttributeValue, Link, Span, SpanBuilder, SpanKind, SpanStatus};
pub use time::Timestamp;

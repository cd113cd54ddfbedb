//! Immutable span context: the identifiers that travel on the wire.

use super::id::{SpanId, TraceId};
use core::fmt;
use smallvec::SmallVec;

/// Trace flags controlling sampling and debug behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Trace is sampled (should be recorded).
    pub const SAMPLED: Self = Self(0x01);
    /// Debug flag (record everything).
    pub const DEBUG: Self = Self(0x02);

    /// Creates new flags from a byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the flags as a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Returns true if the sampled flag is set.
    #[must_use]
    pub const fn is_sampled(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Returns true if the debug flag is set.
    #[must_use]
    pub const fn is_debug(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// Sets the sampled flag.
    #[must_use]
    pub const fn with_sampled(self) -> Self {
        Self(self.0 | 0x01)
    }

    /// Sets the debug flag.
    #[must_use]
    pub const fn with_debug(self) -> Self {
        Self(self.0 | 0x02)
    }
}

/// Vendor-specific trace state carried alongside the trace identifiers.
///
/// An ordered list of key/value entries rendered as the W3C `tracestate`
/// header. Unknown or malformed entries are dropped on parse; parsing never
/// fails.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TraceState {
    entries: SmallVec<[(String, String); 3]>,
}

impl TraceState {
    /// Creates an empty trace state.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value for a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a derived state with the entry prepended, replacing any
    /// existing entry for the same key.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let mut entries: SmallVec<[(String, String); 3]> = SmallVec::new();
        entries.push((key.clone(), value.into()));
        entries.extend(self.entries.iter().filter(|(k, _)| *k != key).cloned());
        Self { entries }
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a `tracestate` header value, dropping malformed entries.
    #[must_use]
    pub fn from_header(header: &str) -> Self {
        let mut entries = SmallVec::new();
        for member in header.split(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }
            let Some((key, value)) = member.split_once('=') else {
                tracing::debug!(member, "dropping malformed tracestate entry");
                continue;
            };
            if key.is_empty() || value.is_empty() {
                tracing::debug!(member, "dropping empty tracestate entry");
                continue;
            }
            entries.push((key.to_string(), value.to_string()));
        }
        Self { entries }
    }

    /// Renders the entries as a `tracestate` header value.
    #[must_use]
    pub fn to_header(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }
}

/// The identifiers of a span, immutable once created.
///
/// A span context may describe a locally recorded span or a *remote* parent
/// recovered from an incoming carrier; the two are distinguished by
/// [`SpanContext::is_remote`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
    trace_state: TraceState,
    remote: bool,
}

impl SpanContext {
    /// Creates a local span context.
    #[must_use]
    pub fn new(trace_id: TraceId, span_id: SpanId, flags: TraceFlags) -> Self {
        Self {
            trace_id,
            span_id,
            flags,
            trace_state: TraceState::empty(),
            remote: false,
        }
    }

    /// Creates a remote span context recovered from an incoming carrier.
    #[must_use]
    pub fn new_remote(
        trace_id: TraceId,
        span_id: SpanId,
        flags: TraceFlags,
        trace_state: TraceState,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            flags,
            trace_state,
            remote: true,
        }
    }

    /// The invalid (all-nil) span context.
    #[must_use]
    pub fn invalid() -> Self {
        Self::new(TraceId::NIL, SpanId::NIL, TraceFlags::NONE)
    }

    /// Returns the trace ID.
    #[must_use]
    pub const fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Returns the span ID.
    #[must_use]
    pub const fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Returns the trace flags.
    #[must_use]
    pub const fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// Returns the trace state.
    #[must_use]
    pub const fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }

    /// Returns a copy with the given trace state.
    #[must_use]
    pub fn with_trace_state(mut self, trace_state: TraceState) -> Self {
        self.trace_state = trace_state;
        self
    }

    /// Returns true if this context was recovered from a remote carrier.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        self.remote
    }

    /// Returns true if both identifiers are non-nil.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !self.trace_id.is_nil() && !self.span_id.is_nil()
    }

    /// Returns true if the sampled flag is set.
    #[must_use]
    pub const fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{:02x}",
            self.trace_id,
            self.span_id,
            self.flags.as_byte()
        )
    }
}

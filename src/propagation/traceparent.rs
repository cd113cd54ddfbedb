//! W3C Trace Context codec: `traceparent` and `tracestate`.

use super::{CarrierExtractor, CarrierInjector, PropagationCodec};
use crate::context::Context;
use crate::span::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

/// Carrier key for the trace identifiers.
pub const TRACEPARENT: &str = "traceparent";
/// Carrier key for vendor-specific trace state.
pub const TRACESTATE: &str = "tracestate";

const SUPPORTED_VERSION: &str = "00";

/// Codec for the W3C `traceparent`/`tracestate` headers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceparentCodec;

impl TraceparentCodec {
    /// Creates the codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn parse(header: &str) -> Option<SpanContext> {
        let mut parts = header.trim().splitn(4, '-');
        let version = parts.next()?;
        let trace_part = parts.next()?;
        let span_part = parts.next()?;
        let flags_part = parts.next()?;

        if version.len() != 2 || !version.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // Version ff is explicitly forbidden; future versions are read with
        // the version-00 field layout.
        if version.eq_ignore_ascii_case("ff") {
            return None;
        }

        let trace_id = TraceId::from_w3c_string(trace_part)?;
        let span_id = SpanId::from_w3c_string(span_part)?;
        if trace_id.is_nil() || span_id.is_nil() {
            return None;
        }

        // Future versions may append fields after the flags octet.
        let flags_hex = flags_part.get(..2)?;
        if version == SUPPORTED_VERSION && flags_part.len() != 2 {
            return None;
        }
        let flags = u8::from_str_radix(flags_hex, 16).ok()?;

        Some(SpanContext::new_remote(
            trace_id,
            span_id,
            TraceFlags::from_byte(flags),
            TraceState::empty(),
        ))
    }
}

impl PropagationCodec for TraceparentCodec {
    fn fields(&self) -> &[&str] {
        &[TRACEPARENT, TRACESTATE]
    }

    fn inject(&self, context: &Context, carrier: &mut dyn CarrierInjector) {
        let Some(span_context) = context.active_span_context() else {
            return;
        };
        if !span_context.is_valid() {
            tracing::debug!("skipping traceparent injection, active span context is invalid");
            return;
        }

        let header = format!(
            "{SUPPORTED_VERSION}-{}-{}-{:02x}",
            span_context.trace_id().to_w3c_string(),
            span_context.span_id().to_w3c_string(),
            span_context.flags().as_byte(),
        );
        carrier.set(TRACEPARENT, &header);

        let state = span_context.trace_state();
        if !state.is_empty() {
            carrier.set(TRACESTATE, &state.to_header());
        }
    }

    fn extract(&self, context: &Context, carrier: &dyn CarrierExtractor) -> Context {
        let Some(header) = carrier.get(TRACEPARENT) else {
            return context.clone();
        };
        let Some(span_context) = Self::parse(header) else {
            tracing::debug!(header, "ignoring malformed traceparent");
            return context.clone();
        };

        let span_context = match carrier.get(TRACESTATE) {
            Some(state) => span_context.with_trace_state(TraceState::from_header(state)),
            None => span_context,
        };
        context.with_remote_span(span_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn carrier_with(header: &str) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert(TRACEPARENT.to_string(), header.to_string());
        m
    }

    #[test]
    fn inject_then_extract_roundtrip() {
        let codec = TraceparentCodec::new();
        let original = SpanContext::new_remote(
            TraceId::new(0xaaaa, 0xbbbb),
            SpanId::new(0xcccc),
            TraceFlags::SAMPLED,
            TraceState::empty().with("vendor", "x"),
        );
        let context = Context::root().with_remote_span(original.clone());

        let mut carrier = HashMap::new();
        codec.inject(&context, &mut carrier);

        let extracted = codec.extract(&Context::root(), &carrier);
        let recovered = extracted.active_span_context().expect("span context");
        assert_eq!(recovered.trace_id(), original.trace_id());
        assert_eq!(recovered.span_id(), original.span_id());
        assert_eq!(recovered.flags(), original.flags());
        assert_eq!(recovered.trace_state().get("vendor"), Some("x"));
        assert!(recovered.is_remote());
    }

    #[test]
    fn extract_preserves_exact_ids() {
        let codec = TraceparentCodec::new();
        let carrier = carrier_with("00-0123456789abcdef0123456789abcdef-00000000000abc12-01");
        let extracted = codec.extract(&Context::root(), &carrier);
        let sc = extracted.active_span_context().expect("span context");
        assert_eq!(sc.trace_id().to_w3c_string(), "0123456789abcdef0123456789abcdef");
        assert_eq!(sc.span_id().to_w3c_string(), "00000000000abc12");
        assert!(sc.is_sampled());
    }

    #[test]
    fn missing_header_returns_input_unchanged() {
        let codec = TraceparentCodec::new();
        let carrier: HashMap<String, String> = HashMap::new();
        let input = Context::root();
        let out = codec.extract(&input, &carrier);
        assert!(out.same(&input));
    }

    #[test]
    fn malformed_headers_return_input_unchanged() {
        let codec = TraceparentCodec::new();
        let cases = [
            "",
            "garbage",
            "00-short-00000000000abc12-01",
            "00-0123456789abcdef0123456789abcdef-short-01",
            "00-00000000000000000000000000000000-00000000000abc12-01", // nil trace
            "00-0123456789abcdef0123456789abcdef-0000000000000000-01", // nil span
            "ff-0123456789abcdef0123456789abcdef-00000000000abc12-01", // forbidden version
            "0x-0123456789abcdef0123456789abcdef-00000000000abc12-01",
            "00-0123456789abcdef0123456789abcdef-00000000000abc12-zz",
            "00-0123456789abcdef0123456789abcdef-00000000000abc12-0100", // extra octets in v00
        ];
        for case in cases {
            let input = Context::root();
            let out = codec.extract(&input, &carrier_with(case));
            assert!(out.same(&input), "expected input back for {case:?}");
        }
    }

    #[test]
    fn future_version_with_suffix_is_accepted() {
        let codec = TraceparentCodec::new();
        let carrier = carrier_with("01-0123456789abcdef0123456789abcdef-00000000000abc12-01-extra");
        let extracted = codec.extract(&Context::root(), &carrier);
        assert!(extracted.active_span_context().is_some());
    }

    #[test]
    fn inject_without_active_span_writes_nothing() {
        let codec = TraceparentCodec::new();
        let mut carrier = HashMap::new();
        codec.inject(&Context::root(), &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn extract_never_fails_on_hostile_tracestate() {
        let codec = TraceparentCodec::new();
        let mut carrier = carrier_with("00-0123456789abcdef0123456789abcdef-00000000000abc12-01");
        carrier.insert(TRACESTATE.to_string(), ",,,===,,,".to_string());
        let extracted = codec.extract(&Context::root(), &carrier);
        let sc = extracted.active_span_context().expect("span context");
        assert!(sc.trace_state().is_empty());
    }
}

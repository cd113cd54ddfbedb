//! Baggage codec: cross-cutting key/value pairs on the `baggage` header.

use super::{CarrierExtractor, CarrierInjector, PropagationCodec};
use crate::context::{Baggage, Context};

/// Carrier key for baggage.
pub const BAGGAGE: &str = "baggage";

/// Codec for the `baggage` header.
///
/// Entries render as `key=value` members joined by commas. Malformed members
/// are dropped on extraction; keys or values containing the delimiters are
/// skipped on injection.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaggageCodec;

impl BaggageCodec {
    /// Creates the codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn is_token(s: &str) -> bool {
        !s.is_empty() && !s.contains([',', '=', ';']) && !s.chars().any(char::is_whitespace)
    }
}

impl PropagationCodec for BaggageCodec {
    fn fields(&self) -> &[&str] {
        &[BAGGAGE]
    }

    fn inject(&self, context: &Context, carrier: &mut dyn CarrierInjector) {
        let Some(baggage) = context.baggage() else {
            return;
        };
        if baggage.is_empty() {
            return;
        }

        let mut header = String::new();
        for (key, value) in baggage.iter() {
            if !Self::is_token(key) || !Self::is_token(value) {
                tracing::debug!(key, "skipping baggage entry with unencodable characters");
                continue;
            }
            if !header.is_empty() {
                header.push(',');
            }
            header.push_str(key);
            header.push('=');
            header.push_str(value);
        }
        if !header.is_empty() {
            carrier.set(BAGGAGE, &header);
        }
    }

    fn extract(&self, context: &Context, carrier: &dyn CarrierExtractor) -> Context {
        let Some(header) = carrier.get(BAGGAGE) else {
            return context.clone();
        };

        let mut baggage = Baggage::empty();
        for member in header.split(',') {
            let member = member.trim();
            if member.is_empty() {
                continue;
            }
            // Properties after a ';' are not modeled; drop them, keep the pair.
            let member = member.split(';').next().unwrap_or(member).trim();
            let Some((key, value)) = member.split_once('=') else {
                tracing::debug!(member, "ignoring malformed baggage member");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                tracing::debug!(member, "ignoring empty baggage member");
                continue;
            }
            baggage = baggage.with(key, value);
        }

        if baggage.is_empty() {
            context.clone()
        } else {
            context.with_baggage(baggage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn inject_then_extract_roundtrip() {
        let codec = BaggageCodec::new();
        let context = Context::root()
            .with_baggage(Baggage::empty().with("tenant", "acme").with("user", "u1"));

        let mut carrier = HashMap::new();
        codec.inject(&context, &mut carrier);
        assert_eq!(
            carrier.get("baggage").map(String::as_str),
            Some("tenant=acme,user=u1")
        );

        let extracted = codec.extract(&Context::root(), &carrier);
        let baggage = extracted.baggage().expect("baggage");
        assert_eq!(baggage.get("tenant"), Some("acme"));
        assert_eq!(baggage.get("user"), Some("u1"));
    }

    #[test]
    fn missing_header_returns_input_unchanged() {
        let codec = BaggageCodec::new();
        let carrier: HashMap<String, String> = HashMap::new();
        let input = Context::root();
        assert!(codec.extract(&input, &carrier).same(&input));
    }

    #[test]
    fn malformed_members_are_dropped_not_fatal() {
        let codec = BaggageCodec::new();
        let mut carrier = HashMap::new();
        carrier.insert(
            BAGGAGE.to_string(),
            "ok=1, broken ,=nokey,novalue=,with;prop=2,good=3;attr=x".to_string(),
        );

        let extracted = codec.extract(&Context::root(), &carrier);
        let baggage = extracted.baggage().expect("baggage");
        assert_eq!(baggage.get("ok"), Some("1"));
        assert_eq!(baggage.get("good"), Some("3"));
        assert_eq!(baggage.get("broken"), None);
        assert_eq!(baggage.get("novalue"), None);
    }

    #[test]
    fn all_malformed_returns_input_unchanged() {
        let codec = BaggageCodec::new();
        let mut carrier = HashMap::new();
        carrier.insert(BAGGAGE.to_string(), ",,, ; = ,".to_string());
        let input = Context::root();
        assert!(codec.extract(&input, &carrier).same(&input));
    }

    #[test]
    fn unencodable_entries_are_skipped_on_inject() {
        let codec = BaggageCodec::new();
        let context = Context::root().with_baggage(
            Baggage::empty()
                .with("fine", "yes")
                .with("has space", "v")
                .with("k", "a,b"),
        );
        let mut carrier = HashMap::new();
        codec.inject(&context, &mut carrier);
        assert_eq!(carrier.get("baggage").map(String::as_str), Some("fine=yes"));
    }

    #[test]
    fn empty_baggage_injects_nothing() {
        let codec = BaggageCodec::new();
        let context = Context::root().with_baggage(Baggage::empty());
        let mut carrier = HashMap::new();
        codec.inject(&context, &mut carrier);
        assert!(carrier.is_empty());
    }
}

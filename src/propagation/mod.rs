//! Carrier-agnostic wire propagation of trace identifiers and baggage.
//!
//! Codecs read and write text-map carriers through the [`CarrierInjector`]
//! and [`CarrierExtractor`] seams, so they stay agnostic of the carrier's
//! concrete type. Extraction is tolerant by contract: a missing or malformed
//! header yields the input context unchanged, never an error.

pub mod baggage;
pub mod traceparent;

pub use baggage::BaggageCodec;
pub use traceparent::TraceparentCodec;

use crate::context::Context;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Write access to a text-map carrier.
pub trait CarrierInjector {
    /// Stores a key/value pair in the carrier.
    fn set(&mut self, key: &str, value: &str);
}

/// Read access to a text-map carrier.
pub trait CarrierExtractor {
    /// Returns the value for a key, if present.
    fn get(&self, key: &str) -> Option<&str>;
}

impl CarrierInjector for HashMap<String, String> {
    fn set(&mut self, key: &str, value: &str) {
        self.insert(key.to_string(), value.to_string());
    }
}

impl CarrierExtractor for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

/// A codec for one wire format.
pub trait PropagationCodec: Send + Sync + fmt::Debug {
    /// The carrier keys this codec reads and writes.
    fn fields(&self) -> &[&str];

    /// Writes the context's propagated state into the carrier.
    ///
    /// A context without an active span injects nothing.
    fn inject(&self, context: &Context, carrier: &mut dyn CarrierInjector);

    /// Returns a context derived from the input with whatever state the
    /// carrier held; the input context when the carrier holds nothing usable.
    fn extract(&self, context: &Context, carrier: &dyn CarrierExtractor) -> Context;
}

/// Runs several codecs as one.
///
/// Injection writes every format; extraction folds left to right, so later
/// codecs see what earlier ones recovered.
#[derive(Clone, Debug, Default)]
pub struct CompositeCodec {
    codecs: Vec<Arc<dyn PropagationCodec>>,
}

impl CompositeCodec {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default composite: W3C trace context plus baggage.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with(Arc::new(TraceparentCodec::new()))
            .with(Arc::new(BaggageCodec::new()))
    }

    /// Adds a codec.
    #[must_use]
    pub fn with(mut self, codec: Arc<dyn PropagationCodec>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// Returns true if no codecs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl PropagationCodec for CompositeCodec {
    fn fields(&self) -> &[&str] {
        // The union of member fields is not representable as a borrowed
        // slice; composites report no fields of their own.
        &[]
    }

    fn inject(&self, context: &Context, carrier: &mut dyn CarrierInjector) {
        for codec in &self.codecs {
            codec.inject(context, carrier);
        }
    }

    fn extract(&self, context: &Context, carrier: &dyn CarrierExtractor) -> Context {
        let mut current = context.clone();
        for codec in &self.codecs {
            current = codec.extract(&current, carrier);
        }
        current
    }
}

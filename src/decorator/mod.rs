//! Per-library span decoration.
//!
//! Decorators are the seam external library integrations implement: each one
//! knows how to enrich spans for its library at start, end and on error. The
//! core only defines the capability and the registry resolving a library
//! identifier to its decorator.

use crate::span::{Span, SpanStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Enriches spans on behalf of one instrumented library.
pub trait Decorator: Send + Sync + fmt::Debug {
    /// The library identifier this decorator serves.
    fn library(&self) -> &str;

    /// Runs right after the span started.
    fn on_start(&self, span: &Span) {
        let _ = span;
    }

    /// Runs right before the span ends.
    fn on_end(&self, span: &Span) {
        let _ = span;
    }

    /// Records a failure on the span. The default marks the span as errored
    /// with the message.
    fn on_error(&self, span: &Span, message: &str) {
        span.record_error(message);
    }
}

/// A decorator stamping its component name onto every span it touches.
#[derive(Debug)]
pub struct ComponentDecorator {
    library: String,
    component: String,
}

impl ComponentDecorator {
    /// Creates a decorator for `library` tagging spans with `component`.
    #[must_use]
    pub fn new(library: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            component: component.into(),
        }
    }
}

impl Decorator for ComponentDecorator {
    fn library(&self) -> &str {
        &self.library
    }

    fn on_start(&self, span: &Span) {
        span.set_attribute("component", self.component.as_str());
    }

    fn on_end(&self, span: &Span) {
        if span.status() == SpanStatus::Unset {
            span.set_status(SpanStatus::Ok);
        }
    }
}

/// Resolves library identifiers to their decorators.
#[derive(Debug, Default)]
pub struct DecoratorRegistry {
    decorators: RwLock<HashMap<String, Arc<dyn Decorator>>>,
}

impl DecoratorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decorator under its library identifier, replacing any
    /// previous registration for the same library.
    pub fn register(&self, decorator: Arc<dyn Decorator>) {
        let library = decorator.library().to_string();
        if self
            .decorators
            .write()
            .insert(library.clone(), decorator)
            .is_some()
        {
            tracing::debug!(library, "replacing registered decorator");
        }
    }

    /// Returns the decorator for a library, if registered.
    #[must_use]
    pub fn get(&self, library: &str) -> Option<Arc<dyn Decorator>> {
        self.decorators.read().get(library).cloned()
    }

    /// Returns the number of registered decorators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decorators.read().len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decorators.read().is_empty()
    }
}

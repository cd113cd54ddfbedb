//! Immutable, key-indexed context values and the ambient scope.
//!
//! A [`Context`] is a persistent map: [`Context::with_value`] returns a
//! derived context and never mutates the parent. Lookup walks the derivation
//! chain, nearest value first. The ambient context for the calling thread is
//! reached through [`Context::current`] and installed with
//! [`Context::attach`], which returns a [`Scope`] guard restoring the prior
//! ambient context on drop.

pub mod key;
pub mod scope;

pub use key::ContextKey;
pub use scope::Scope;

use crate::span::{Span, SpanContext};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The span reference carried by a context: either a locally recorded span
/// or a remote placeholder recovered from an incoming carrier.
#[derive(Clone, Debug)]
pub enum ActiveSpan {
    /// A span recorded in this process.
    Local(Span),
    /// The identifiers of an upstream caller's span.
    Remote(SpanContext),
}

impl ActiveSpan {
    /// Returns the span context in either representation.
    #[must_use]
    pub fn span_context(&self) -> SpanContext {
        match self {
            Self::Local(span) => span.span_context().clone(),
            Self::Remote(context) => context.clone(),
        }
    }
}

/// Cross-cutting key/value pairs that travel with the context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Baggage {
    entries: SmallVec<[(String, String); 4]>,
}

impl Baggage {
    /// Creates empty baggage.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the value for a key, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns derived baggage with the entry added, replacing any existing
    /// entry for the same key.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let mut entries: SmallVec<[(String, String); 4]> = self
            .entries
            .iter()
            .filter(|(k, _)| *k != key)
            .cloned()
            .collect();
        entries.push((key, value.into()));
        Self { entries }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

struct Node {
    key_id: u64,
    key_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

// Manual Debug keeps the derivation chain readable without requiring the
// stored values to implement Debug.
impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_name)?;
        if let Some(parent) = &self.parent {
            write!(f, " <- {parent:?}")?;
        }
        Ok(())
    }
}

/// An immutable, composable carrier of ambient state.
///
/// Cloning is cheap; derived contexts share their ancestry by reference.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// The well-known empty context.
    #[must_use]
    pub fn root() -> Self {
        Self { head: None }
    }

    /// Returns true if this is the empty context.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the ambient context of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        scope::current()
    }

    /// Installs this context as the ambient context of the calling thread.
    ///
    /// The returned [`Scope`] restores the prior ambient context when it is
    /// dropped. Scopes nest LIFO per thread.
    #[must_use]
    pub fn attach(&self) -> Scope {
        scope::attach(self.clone())
    }

    /// Returns a derived context holding the given value under the key.
    ///
    /// The receiver is not modified.
    #[must_use]
    pub fn with_value<T: Send + Sync + 'static>(&self, key: &ContextKey<T>, value: T) -> Self {
        Self {
            head: Some(Arc::new(Node {
                key_id: key.id(),
                key_name: key.name(),
                value: Arc::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Looks up the nearest value stored under the key.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &ContextKey<T>) -> Option<Arc<T>> {
        let mut node = self.head.as_ref();
        while let Some(n) = node {
            if n.key_id == key.id() {
                return Arc::clone(&n.value).downcast::<T>().ok();
            }
            node = n.parent.as_ref();
        }
        None
    }

    /// Returns true if both contexts are the same derivation node.
    ///
    /// This is identity, not structural equality.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns a derived context with the given local span active.
    #[must_use]
    pub fn with_span(&self, span: Span) -> Self {
        self.with_value(active_span_key(), ActiveSpan::Local(span))
    }

    /// Returns a derived context whose active span is a remote placeholder.
    #[must_use]
    pub fn with_remote_span(&self, span_context: SpanContext) -> Self {
        self.with_value(active_span_key(), ActiveSpan::Remote(span_context))
    }

    /// Returns the active span reference, if any.
    #[must_use]
    pub fn active_span(&self) -> Option<ActiveSpan> {
        self.get(active_span_key()).map(|v| (*v).clone())
    }

    /// Returns the active locally recorded span, if any.
    #[must_use]
    pub fn active_local_span(&self) -> Option<Span> {
        match self.active_span() {
            Some(ActiveSpan::Local(span)) => Some(span),
            _ => None,
        }
    }

    /// Returns the span context of the active span reference, if any.
    #[must_use]
    pub fn active_span_context(&self) -> Option<SpanContext> {
        self.active_span().map(|s| s.span_context())
    }

    /// Returns a derived context carrying the given baggage.
    #[must_use]
    pub fn with_baggage(&self, baggage: Baggage) -> Self {
        self.with_value(baggage_key(), baggage)
    }

    /// Returns the baggage carried by this context, if any.
    #[must_use]
    pub fn baggage(&self) -> Option<Arc<Baggage>> {
        self.get(baggage_key())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.head {
            None => write!(f, "Context(root)"),
            Some(head) => write!(f, "Context({head:?})"),
        }
    }
}

fn active_span_key() -> &'static ContextKey<ActiveSpan> {
    static KEY: OnceLock<ContextKey<ActiveSpan>> = OnceLock::new();
    KEY.get_or_init(|| ContextKey::new("active-span"))
}

fn baggage_key() -> &'static ContextKey<Baggage> {
    static KEY: OnceLock<ContextKey<Baggage>> = OnceLock::new();
    KEY.get_or_init(|| ContextKey::new("baggage"))
}

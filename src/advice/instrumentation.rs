//! Binding advice to match predicates, and running intercepted calls.

use super::suppress::{panic_message, suppress};
use super::{Advice, EnterValue, InvocationFrame, InvocationOutcome};
use crate::matcher::{LoaderId, MatchCache, MethodDescription, Predicate, TypeDescription};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// One named advice bound to the types and methods it applies to.
///
/// Type matching is memoised per (loader, type) pair in the instrumentation's
/// own cache; method matching is cheap and evaluated directly.
#[derive(Debug)]
pub struct Instrumentation {
    name: String,
    types: Predicate<TypeDescription>,
    methods: Predicate<MethodDescription>,
    advice: Arc<dyn Advice>,
    cache: MatchCache,
}

impl Instrumentation {
    /// Creates an instrumentation binding predicates to an advice.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        types: Predicate<TypeDescription>,
        methods: Predicate<MethodDescription>,
        advice: Arc<dyn Advice>,
    ) -> Self {
        Self {
            name: name.into(),
            types,
            methods,
            advice,
            cache: MatchCache::new(),
        }
    }

    /// Returns the instrumentation's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bound advice.
    #[must_use]
    pub fn advice(&self) -> &Arc<dyn Advice> {
        &self.advice
    }

    /// Returns whether the type matches, evaluating at most once per
    /// (loader, type) pair.
    #[must_use]
    pub fn matches_type(&self, loader: LoaderId, description: &TypeDescription) -> bool {
        self.cache
            .get_or_insert_with(loader, description.name(), || {
                self.types.matches(description)
            })
    }

    /// Returns whether the method matches.
    #[must_use]
    pub fn matches_method(&self, method: &MethodDescription) -> bool {
        self.methods.matches(method)
    }
}

/// The instrumentations installed in one runtime.
#[derive(Debug, Default)]
pub struct InstrumentationSet {
    entries: Vec<Arc<Instrumentation>>,
}

impl InstrumentationSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instrumentation.
    #[must_use]
    pub fn with(mut self, instrumentation: Arc<Instrumentation>) -> Self {
        self.entries.push(instrumentation);
        self
    }

    /// Returns the number of installed instrumentations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no instrumentation is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the advices applying to one method of one type, in
    /// installation order.
    #[must_use]
    pub fn resolve(
        &self,
        loader: LoaderId,
        description: &TypeDescription,
        method: &MethodDescription,
    ) -> Vec<Arc<dyn Advice>> {
        self.entries
            .iter()
            .filter(|entry| entry.matches_type(loader, description) && entry.matches_method(method))
            .map(|entry| Arc::clone(&entry.advice))
            .collect()
    }
}

/// Runs `call` under the given advices.
///
/// Enter hooks run in order, exit hooks in reverse order, each receiving its
/// own enter value back. A panic inside any hook is suppressed; a panic
/// inside `call` itself reaches exit hooks as a panicked outcome and then
/// resumes unwinding, so the caller always observes the call's own outcome.
/// An exit hook may replace a normal return value; a replacement of the
/// wrong type is ignored.
pub fn instrumented_call<R: Send + 'static>(
    advices: &[Arc<dyn Advice>],
    frame: &InvocationFrame,
    call: impl FnOnce() -> R,
) -> R {
    let mut enter_values: Vec<Option<EnterValue>> = advices
        .iter()
        .map(|advice| suppress("on_enter", || advice.on_enter(frame)).flatten())
        .collect();

    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(value) => {
            let mut current = value;
            for (advice, enter_value) in advices.iter().zip(enter_values.drain(..)).rev() {
                let replacement = {
                    let outcome = InvocationOutcome::Returned(&current);
                    suppress("on_exit", || advice.on_exit(frame, enter_value, &outcome)).flatten()
                };
                if let Some(boxed) = replacement {
                    match boxed.downcast::<R>() {
                        Ok(replaced) => current = *replaced,
                        Err(_) => {
                            tracing::debug!(
                                method = frame.method_name(),
                                "return replacement has mismatched type, keeping original"
                            );
                        }
                    }
                }
            }
            current
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref()).to_string();
            let outcome = InvocationOutcome::Panicked(&message);
            for (advice, enter_value) in advices.iter().zip(enter_values.drain(..)).rev() {
                suppress("on_exit", || advice.on_exit(frame, enter_value, &outcome));
            }
            panic::resume_unwind(payload)
        }
    }
}

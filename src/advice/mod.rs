//! Generic interception around target invocations.
//!
//! An [`Advice`] supplies hooks that run before and after a call. `on_enter`
//! observes the [`InvocationFrame`] and may capture a value; `on_exit` gets
//! that value back together with the call's [`InvocationOutcome`] and may
//! replace the return value. Advice hooks never decide whether the call runs
//! and never swallow the call's own panic.
//!
//! Every hook runs under suppression: a panic raised inside advice is caught
//! and logged at debug level, and the instrumented call proceeds as if the
//! hook had done nothing.

pub mod instrumentation;
pub mod suppress;

pub use instrumentation::{instrumented_call, Instrumentation, InstrumentationSet};
pub use suppress::suppress;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value captured by `on_enter` and handed back to `on_exit`.
pub type EnterValue = Box<dyn Any + Send>;

/// The state of one intercepted call, visible to advice hooks.
#[derive(Clone)]
pub struct InvocationFrame {
    type_name: String,
    method_name: String,
    arguments: Vec<Arc<dyn Any + Send + Sync>>,
}

impl InvocationFrame {
    /// Creates a frame for a call on `type_name.method_name`.
    #[must_use]
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            arguments: Vec::new(),
        }
    }

    /// Appends an argument value.
    #[must_use]
    pub fn with_argument(mut self, argument: impl Any + Send + Sync) -> Self {
        self.arguments.push(Arc::new(argument));
        self
    }

    /// Returns the receiver's type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the invoked method's name.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// Returns the argument at `index` downcast to `T`.
    #[must_use]
    pub fn argument<T: 'static>(&self, index: usize) -> Option<&T> {
        self.arguments.get(index)?.downcast_ref::<T>()
    }
}

impl fmt::Debug for InvocationFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationFrame")
            .field("type_name", &self.type_name)
            .field("method_name", &self.method_name)
            .field("arguments", &self.arguments.len())
            .finish()
    }
}

/// What an intercepted call produced, as seen by `on_exit`.
pub enum InvocationOutcome<'a> {
    /// The call returned normally.
    Returned(&'a (dyn Any + Send)),
    /// The call panicked with this message.
    Panicked(&'a str),
}

impl fmt::Debug for InvocationOutcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Returned(_) => f.write_str("InvocationOutcome::Returned"),
            Self::Panicked(message) => write!(f, "InvocationOutcome::Panicked({message:?})"),
        }
    }
}

impl InvocationOutcome<'_> {
    /// Returns the return value downcast to `T`, when the call returned.
    #[must_use]
    pub fn returned<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Returned(value) => value.downcast_ref::<T>(),
            Self::Panicked(_) => None,
        }
    }

    /// Returns the panic message, when the call panicked.
    #[must_use]
    pub const fn panic_message(&self) -> Option<&str> {
        match self {
            Self::Returned(_) => None,
            Self::Panicked(message) => Some(message),
        }
    }
}

/// Hooks running around an intercepted call.
///
/// Both hooks default to doing nothing, so an advice can implement either
/// side alone.
pub trait Advice: Send + Sync + fmt::Debug {
    /// Runs before the call. The returned value is handed to [`on_exit`].
    ///
    /// [`on_exit`]: Advice::on_exit
    fn on_enter(&self, frame: &InvocationFrame) -> Option<EnterValue> {
        let _ = frame;
        None
    }

    /// Runs after the call with the enter value and the call's outcome.
    ///
    /// Returning `Some` replaces the return value when the call returned
    /// normally and the replacement has the call's return type; it is
    /// ignored otherwise.
    fn on_exit(
        &self,
        frame: &InvocationFrame,
        enter_value: Option<EnterValue>,
        outcome: &InvocationOutcome<'_>,
    ) -> Option<Box<dyn Any + Send>> {
        let _ = (frame, enter_value, outcome);
        None
    }
}

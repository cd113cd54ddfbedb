//! Panic suppression for advice callouts.

use std::panic::{self, AssertUnwindSafe};

/// Runs `callout` and converts a panic into `None`.
///
/// The panic message is logged at debug level under `what`. Suppression is
/// for advice code only; the instrumented call itself never runs under it.
pub fn suppress<T>(what: &str, callout: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(callout)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::debug!(
                what,
                message = panic_message(payload.as_ref()),
                "suppressed panic in advice"
            );
            None
        }
    }
}

/// Extracts a human-readable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

//! Subscription handles.
//!
//! A [`Subscription`] is returned by every `subscribe` call. Disposing it
//! (explicitly or by dropping it) detaches the observer from its source.

use std::fmt;

/// Handle to an observer registration.
///
/// Dropping the handle unsubscribes. Disposal is idempotent, so a handle can
/// be disposed from inside a callback delivered by the very source it
/// unsubscribes from.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Create a handle that runs `unsubscribe` once, on first disposal.
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A handle with nothing to undo.
    pub fn empty() -> Self {
        Self { unsubscribe: None }
    }

    /// Detach the observer. Later calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    /// Whether the handle has nothing left to undo.
    pub fn is_disposed(&self) -> bool {
        self.unsubscribe.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

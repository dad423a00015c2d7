//! Activators
//!
//! An activator is the boolean condition gating a frame: "does the rule this
//! frame came from currently apply?". The store does not know how the
//! condition is computed. It only reacts to transitions.
//!
//! One activator may gate many frames, for example when the same rule matched
//! several objects with an identical structural condition. Every subscriber
//! is independent: disposing one subscription never affects another. Frames
//! sharing an activator must not carry per-frame binding state, which
//! [`Frame`](crate::Frame) enforces when reactive entries are added.
//!
//! # Upstream sources
//!
//! [`Activator::from_source`] wraps any `Observable<bool>`. The upstream is
//! subscribed when the first subscriber arrives and disposed when the last
//! one leaves.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::observable::{Observable, Observer};
use super::subject::Subject;
use super::subscription::Subscription;
use crate::error::{Result, StoreError};

struct ActivatorInner {
    state: Cell<Option<bool>>,
    subject: Subject<bool>,
    upstream: Option<Rc<dyn Observable<bool>>>,
    upstream_subscription: RefCell<Option<Subscription>>,
    /// Frames currently gated by this activator.
    frames: Cell<usize>,
    /// Frames holding binding entries. Only allowed while unshared.
    stateful_frames: Cell<usize>,
}

impl ActivatorInner {
    fn push(&self, active: bool) {
        if self.state.replace(Some(active)) == Some(active) {
            return;
        }
        tracing::debug!(active, subscribers = self.subject.subscriber_count(), "activator transition");
        self.subject.next(active);
    }

    fn connect(self: &Rc<Self>) {
        let Some(upstream) = &self.upstream else {
            return;
        };
        if self.upstream_subscription.borrow().is_some() {
            return;
        }

        let sink = Rc::new(UpstreamSink {
            activator: Rc::downgrade(self),
        });
        let subscription = upstream.subscribe(sink);
        *self.upstream_subscription.borrow_mut() = Some(subscription);
    }

    fn disconnect_if_unused(&self) {
        if self.subject.subscriber_count() > 0 {
            return;
        }
        let subscription = self.upstream_subscription.borrow_mut().take();
        if subscription.is_some() {
            // The upstream may not replay, so its last state is not trusted
            // across a reconnect.
            self.state.set(None);
        }
        drop(subscription);
    }
}

struct UpstreamSink {
    activator: Weak<ActivatorInner>,
}

impl Observer<bool> for UpstreamSink {
    fn on_next(&self, value: bool) {
        if let Some(activator) = self.activator.upgrade() {
            activator.push(value);
        }
    }

    fn on_completed(&self) {}
}

/// A shared boolean condition that frames subscribe to.
///
/// Cloning yields another handle to the same activator.
///
/// # Example
///
/// ```rust
/// use lattice_store::Activator;
///
/// let pointer_over = Activator::new(false);
/// pointer_over.set_active(true);
/// assert_eq!(pointer_over.is_active(), Some(true));
/// ```
#[derive(Clone)]
pub struct Activator {
    inner: Rc<ActivatorInner>,
}

impl Activator {
    /// An activator with a known initial state.
    pub fn new(initial: bool) -> Self {
        Self::build(Some(initial), None)
    }

    /// An activator whose state is unknown until the first push.
    ///
    /// Frames gated by it are inactive until then.
    pub fn pending() -> Self {
        Self::build(None, None)
    }

    /// An activator driven by an upstream boolean source.
    pub fn from_source(source: Rc<dyn Observable<bool>>) -> Self {
        Self::build(None, Some(source))
    }

    fn build(state: Option<bool>, upstream: Option<Rc<dyn Observable<bool>>>) -> Self {
        Self {
            inner: Rc::new(ActivatorInner {
                state: Cell::new(state),
                subject: Subject::new(),
                upstream,
                upstream_subscription: RefCell::new(None),
                frames: Cell::new(0),
                stateful_frames: Cell::new(0),
            }),
        }
    }

    /// Push a new state. Only transitions reach subscribers.
    pub fn set_active(&self, active: bool) {
        self.inner.push(active);
    }

    /// The current state, if known.
    pub fn is_active(&self) -> Option<bool> {
        self.inner.state.get()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subject.subscriber_count()
    }

    /// Number of frames gated by this activator.
    pub fn frame_count(&self) -> usize {
        self.inner.frames.get()
    }

    /// Whether more than one frame is gated by this activator.
    pub fn is_shared(&self) -> bool {
        self.inner.frames.get() > 1
    }

    /// Whether the upstream source is currently subscribed.
    pub fn is_connected(&self) -> bool {
        self.inner.upstream_subscription.borrow().is_some()
    }

    /// Register a frame gated by this activator.
    pub(crate) fn retain_frame(&self) -> Result<()> {
        if self.inner.stateful_frames.get() > 0 {
            return Err(StoreError::SharedActivatorState);
        }
        self.inner.frames.set(self.inner.frames.get() + 1);
        Ok(())
    }

    /// Record that a frame gated by this activator holds binding state.
    pub(crate) fn mark_stateful(&self) -> Result<()> {
        if self.is_shared() {
            return Err(StoreError::SharedActivatorState);
        }
        self.inner
            .stateful_frames
            .set(self.inner.stateful_frames.get() + 1);
        Ok(())
    }

    /// Release a frame registered with [`retain_frame`](Self::retain_frame).
    pub(crate) fn release_frame(&self, stateful: bool) {
        self.inner.frames.set(self.inner.frames.get().saturating_sub(1));
        if stateful {
            self.release_stateful();
        }
    }

    /// Undo a [`mark_stateful`](Self::mark_stateful).
    pub(crate) fn release_stateful(&self) {
        self.inner
            .stateful_frames
            .set(self.inner.stateful_frames.get().saturating_sub(1));
    }
}

impl Observable<bool> for Activator {
    /// Subscribe to transitions. The current state, if known, is delivered
    /// synchronously before this call returns.
    fn subscribe(&self, observer: Rc<dyn Observer<bool>>) -> Subscription {
        self.inner.connect();

        let mut subscription = self.inner.subject.subscribe(observer.clone());
        if let Some(active) = self.inner.state.get() {
            observer.on_next(active);
        }

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            subscription.dispose();
            if let Some(inner) = weak.upgrade() {
                inner.disconnect_if_unused();
            }
        })
    }
}

impl fmt::Debug for Activator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activator")
            .field("state", &self.inner.state.get())
            .field("subscriber_count", &self.subscriber_count())
            .field("frame_count", &self.frame_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

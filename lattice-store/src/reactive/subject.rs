//! Subject Implementation
//!
//! A Subject is a broadcast source: every value passed to [`Subject::next`]
//! is delivered to all current observers. It is the simplest way to feed a
//! binding from outside the store.
//!
//! # Reentrancy
//!
//! Observers routinely call back into the code that owns the subject, and
//! may unsubscribe themselves (or others) while a value is being delivered.
//! Delivery therefore iterates over a snapshot of the observer list and skips
//! observers that were removed after the snapshot was taken. No borrow of the
//! list is held while an observer runs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::observable::{Observable, Observer, SourceError};
use super::subscriber::SubscriberId;
use super::subscription::Subscription;

type ObserverList<T> = Vec<(SubscriberId, Rc<dyn Observer<T>>)>;

/// How a subject ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Termination {
    Completed,
    Failed(SourceError),
}

struct SubjectInner<T> {
    observers: RefCell<ObserverList<T>>,
    terminated: RefCell<Option<Termination>>,
    delivered: Cell<u64>,
}

impl<T> SubjectInner<T> {
    fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.observers.borrow().iter().any(|(sid, _)| *sid == id)
    }

    fn remove(&self, id: SubscriberId) {
        self.observers.borrow_mut().retain(|(sid, _)| *sid != id);
    }

    fn snapshot(&self) -> ObserverList<T> {
        self.observers.borrow().clone()
    }
}

/// A broadcast source of `T` values.
///
/// Cloning yields another handle to the same subject.
///
/// # Example
///
/// ```rust
/// use lattice_store::reactive::Subject;
///
/// let subject = Subject::<i32>::new();
/// subject.next(1);
/// subject.complete();
/// assert!(subject.is_terminated());
/// ```
pub struct Subject<T> {
    inner: Rc<SubjectInner<T>>,
}

impl<T: Clone + 'static> Subject<T> {
    /// Create a subject with no observers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SubjectInner {
                observers: RefCell::new(Vec::new()),
                terminated: RefCell::new(None),
                delivered: Cell::new(0),
            }),
        }
    }

    /// Deliver a value to every observer.
    ///
    /// Ignored once the subject has terminated.
    pub fn next(&self, value: T) {
        if self.is_terminated() {
            return;
        }
        self.inner.delivered.set(self.inner.delivered.get() + 1);

        for (id, observer) in self.inner.snapshot() {
            if self.inner.is_subscribed(id) {
                observer.on_next(value.clone());
            }
        }
    }

    /// End the stream gracefully.
    pub fn complete(&self) {
        self.terminate(Termination::Completed);
    }

    /// End the stream with an error.
    pub fn error(&self, error: SourceError) {
        self.terminate(Termination::Failed(error));
    }

    fn terminate(&self, termination: Termination) {
        if self.is_terminated() {
            return;
        }
        *self.inner.terminated.borrow_mut() = Some(termination.clone());

        let observers = std::mem::take(&mut *self.inner.observers.borrow_mut());
        for (_, observer) in observers {
            match &termination {
                Termination::Completed => observer.on_completed(),
                Termination::Failed(error) => observer.on_error(error.clone()),
            }
        }
    }

    /// Whether the subject completed or failed.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.borrow().is_some()
    }

    /// Number of registered observers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Number of values delivered so far.
    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.get()
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Observable<T> for Subject<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) -> Subscription {
        let terminated = self.inner.terminated.borrow().clone();
        if let Some(termination) = terminated {
            match termination {
                Termination::Completed => observer.on_completed(),
                Termination::Failed(error) => observer.on_error(error),
            }
            return Subscription::empty();
        }

        let id = SubscriberId::new();
        self.inner.observers.borrow_mut().push((id, observer));

        let weak: Weak<SubjectInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        })
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("subscriber_count", &self.inner.observers.borrow().len())
            .field("terminated", &self.inner.terminated.borrow().is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

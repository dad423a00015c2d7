//! Value Entries
//!
//! An entry is the value (or the absence of one) that a single frame supplies
//! for a single property. There are two shapes:
//!
//! - **Static** entries hold a value fixed at construction. Assigning a new
//!   value means replacing the entry, never mutating it.
//! - **Reactive** entries wrap a binding source. They subscribe lazily, the
//!   first time their value is read, and report every real change to the
//!   store that owns their frame.
//!
//! # Binding lifecycle
//!
//! ```text
//! Unstarted --read--> Subscribing --subscribe returns--> Active --end--> Completed
//! ```
//!
//! `Subscribing` is a guard. A source may push from inside its own
//! `subscribe` call; such pushes update the entry but do not notify the
//! store, because the read that triggered the subscription is about to
//! observe the fresh value anyway. `Completed` is terminal and every later
//! push is ignored.
//!
//! Detaching a frame from its store resets its bindings to `Unstarted` (the
//! frame may be attached again); disposing a frame completes them.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::frame::{Frame, FrameInner};
use super::value_store::StoreInner;
use crate::error::{Result, StoreError};
use crate::property::{AnyProperty, ErasedValue, Property, PropertyValue};
use crate::reactive::{
    BindingPush, BindingValue, ErasedSource, Observable, Observer, SourceError, Subscription,
};

/// Observable lifecycle state of a reactive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingLifecycle {
    /// Not subscribed yet.
    Unstarted,
    /// Inside the source's `subscribe` call.
    Subscribing,
    /// Subscribed and receiving pushes.
    Active,
    /// The source ended or the entry was disposed.
    Completed,
}

enum Lifecycle {
    Unstarted,
    Subscribing,
    Active { _subscription: Subscription },
    Completed,
}

impl Lifecycle {
    fn view(&self) -> BindingLifecycle {
        match self {
            Self::Unstarted => BindingLifecycle::Unstarted,
            Self::Subscribing => BindingLifecycle::Subscribing,
            Self::Active { .. } => BindingLifecycle::Active,
            Self::Completed => BindingLifecycle::Completed,
        }
    }
}

struct BindingState {
    lifecycle: Lifecycle,
    value: Option<ErasedValue>,
}

/// The reactive entry variant.
pub(crate) struct BindingEntry {
    this: Weak<BindingEntry>,
    property: AnyProperty,
    source: ErasedSource,
    /// Back-reference to the frame holding this entry. The frame owns the
    /// entry, never the other way round.
    frame: RefCell<Weak<FrameInner>>,
    state: RefCell<BindingState>,
}

impl BindingEntry {
    fn new(property: AnyProperty, source: ErasedSource) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            property,
            source,
            frame: RefCell::new(Weak::new()),
            state: RefCell::new(BindingState {
                lifecycle: Lifecycle::Unstarted,
                value: None,
            }),
        })
    }

    pub(crate) fn lifecycle(&self) -> BindingLifecycle {
        self.state.borrow().lifecycle.view()
    }

    fn frame(&self) -> Option<Frame> {
        self.frame.borrow().upgrade().map(Frame::from_inner)
    }

    fn store(&self) -> Option<Rc<StoreInner>> {
        self.frame()?.store()
    }

    /// Record the frame that owns this entry.
    pub(crate) fn adopt(&self, frame: &Rc<FrameInner>) -> Result<()> {
        let mut owner = self.frame.borrow_mut();
        match owner.upgrade() {
            Some(current) if Rc::ptr_eq(&current, frame) => Ok(()),
            Some(_) => Err(StoreError::EntryAlreadyOwned {
                property: self.property.name(),
            }),
            None => {
                *owner = Rc::downgrade(frame);
                Ok(())
            }
        }
    }

    pub(crate) fn is_owned_by(&self, frame: &Rc<FrameInner>) -> bool {
        std::ptr::eq(self.frame.borrow().as_ptr(), Rc::as_ptr(frame))
    }

    /// Undo an [`adopt`](Self::adopt) the frame could not complete.
    pub(crate) fn disown(&self) {
        *self.frame.borrow_mut() = Weak::new();
    }

    pub(crate) fn has_value(&self) -> Result<bool> {
        self.start_if_necessary()?;
        Ok(self.state.borrow().value.is_some())
    }

    pub(crate) fn get_value(&self) -> Result<ErasedValue> {
        self.start_if_necessary()?;
        self.state
            .borrow()
            .value
            .clone()
            .ok_or(StoreError::EntryHasNoValue {
                property: self.property.name(),
            })
    }

    fn start_if_necessary(&self) -> Result<()> {
        if !matches!(self.state.borrow().lifecycle, Lifecycle::Unstarted) {
            return Ok(());
        }
        if self.store().is_none() {
            return Err(StoreError::MissingOwner {
                property: self.property.name(),
            });
        }
        if self.source.item_type() != self.property.value_type() {
            self.state.borrow_mut().lifecycle = Lifecycle::Completed;
            return Err(StoreError::UnexpectedSourceShape {
                property: self.property.name(),
                expected: self.property.value_type(),
                found: self.source.item_type(),
            });
        }

        // Enter the guard state before subscribing: pushes delivered from
        // inside `subscribe` must not notify the store.
        self.state.borrow_mut().lifecycle = Lifecycle::Subscribing;
        tracing::trace!(property = self.property.name(), shape = ?self.source.shape(), "starting binding");

        let observer = Rc::new(BindingObserver {
            entry: self.this.clone(),
        });
        let subscription = self.source.subscribe(observer);

        let leftover = {
            let mut state = self.state.borrow_mut();
            if matches!(state.lifecycle, Lifecycle::Subscribing) {
                state.lifecycle = Lifecycle::Active {
                    _subscription: subscription,
                };
                None
            } else {
                // Completed or detached while subscribing.
                Some(subscription)
            }
        };
        drop(leftover);
        Ok(())
    }

    fn on_push(&self, push: BindingPush) -> Result<()> {
        if matches!(self.state.borrow().lifecycle, Lifecycle::Completed) {
            return Ok(());
        }
        let store = self.store().ok_or(StoreError::MissingOwner {
            property: self.property.name(),
        })?;
        if matches!(self.state.borrow().lifecycle, Lifecycle::Unstarted) {
            // A stale push from a subscription disposed when the frame was
            // last detached.
            return Ok(());
        }

        match push {
            BindingPush::Value(raw) => self.set_value(&store, raw),
            BindingPush::Unset => self.clear_value(&store),
        }
        Ok(())
    }

    fn set_value(&self, store: &Rc<StoreInner>, raw: ErasedValue) {
        let value = if self.property.validate(&raw) {
            raw
        } else {
            tracing::debug!(
                property = self.property.name(),
                rejected = ?raw,
                "binding value failed validation, using default"
            );
            self.property.default_for(store.owner_type())
        };

        let notify = {
            let mut state = self.state.borrow_mut();
            if state.value.as_ref() == Some(&value) {
                tracing::trace!(property = self.property.name(), "binding pushed an unchanged value");
                return;
            }
            state.value = Some(value);
            matches!(state.lifecycle, Lifecycle::Active { .. })
        };

        if notify {
            store.entry_changed(&self.property);
        }
    }

    fn clear_value(&self, store: &Rc<StoreInner>) {
        let notify = {
            let mut state = self.state.borrow_mut();
            let had_value = state.value.take().is_some();
            had_value && matches!(state.lifecycle, Lifecycle::Active { .. })
        };

        if notify {
            store.entry_changed(&self.property);
        }
    }

    /// End the binding and ask the store to drop the entry.
    pub(crate) fn complete(&self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            if matches!(state.lifecycle, Lifecycle::Completed) {
                return;
            }
            state.value = None;
            std::mem::replace(&mut state.lifecycle, Lifecycle::Completed)
        };
        // Disposes the subscription if there was one.
        drop(previous);
        tracing::debug!(property = self.property.name(), "binding completed");

        if let Some(frame) = self.frame() {
            match frame.store() {
                Some(store) => store.binding_completed(&frame, &self.property),
                None => {
                    frame.remove_completed(self.property.id());
                }
            }
        }
    }

    /// Unsubscribe and forget the value, ready to start again.
    pub(crate) fn reset(&self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            if matches!(state.lifecycle, Lifecycle::Completed) {
                return;
            }
            state.value = None;
            std::mem::replace(&mut state.lifecycle, Lifecycle::Unstarted)
        };
        drop(previous);
    }

    /// Unsubscribe for good, without involving the store.
    pub(crate) fn teardown(&self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            state.value = None;
            std::mem::replace(&mut state.lifecycle, Lifecycle::Completed)
        };
        drop(previous);
    }
}

struct BindingObserver {
    entry: Weak<BindingEntry>,
}

impl Observer<BindingPush> for BindingObserver {
    fn on_next(&self, value: BindingPush) {
        let Some(entry) = self.entry.upgrade() else {
            return;
        };
        if let Err(err) = entry.on_push(value) {
            // No caller can receive this error: the push arrived on the
            // source's stack.
            tracing::error!(error = %err, "binding push violated the store contract");
            panic!("{err}");
        }
    }

    fn on_completed(&self) {
        if let Some(entry) = self.entry.upgrade() {
            entry.complete();
        }
    }

    fn on_error(&self, error: SourceError) {
        tracing::debug!(error = %error, "binding source failed");
        self.on_completed();
    }
}

#[derive(Clone)]
pub(crate) enum EntryKind {
    Static(ErasedValue),
    Reactive(Rc<BindingEntry>),
}

/// The value one frame supplies for one property.
///
/// Cloning is cheap. Clones of a reactive entry share its binding state.
///
/// # Example
///
/// ```rust
/// use lattice_store::{Entry, Property, PropertyMetadata};
///
/// let width = Property::register("Width", PropertyMetadata::new(0.0_f64));
/// let entry = Entry::value(&width, 100.0);
///
/// assert!(entry.has_value().unwrap());
/// assert_eq!(entry.get::<f64>().unwrap(), 100.0);
/// ```
#[derive(Clone)]
pub struct Entry {
    property: AnyProperty,
    kind: EntryKind,
}

impl Entry {
    /// A static entry holding `value`.
    pub fn value<T: PropertyValue>(property: &Property<T>, value: T) -> Self {
        Self {
            property: property.erase(),
            kind: EntryKind::Static(ErasedValue::new(value)),
        }
    }

    /// A reactive entry fed by a source of plain values.
    pub fn bind<T, S>(property: &Property<T>, source: S) -> Self
    where
        T: PropertyValue,
        S: Observable<T> + 'static,
    {
        Self::bind_erased(property.erase(), ErasedSource::values(source))
    }

    /// A reactive entry fed by a source of [`BindingValue`] pushes.
    pub fn bind_values<T, S>(property: &Property<T>, source: S) -> Self
    where
        T: PropertyValue,
        S: Observable<BindingValue<T>> + 'static,
    {
        Self::bind_erased(property.erase(), ErasedSource::binding_values(source))
    }

    /// A reactive entry over an already erased source.
    ///
    /// The source's item type is checked against the property when the
    /// binding subscribes.
    pub fn bind_erased(property: AnyProperty, source: ErasedSource) -> Self {
        Self {
            kind: EntryKind::Reactive(BindingEntry::new(property.clone(), source)),
            property,
        }
    }

    /// The property this entry supplies a value for.
    pub fn property(&self) -> &AnyProperty {
        &self.property
    }

    /// Whether the entry is backed by a binding.
    pub fn is_reactive(&self) -> bool {
        matches!(self.kind, EntryKind::Reactive(_))
    }

    /// Whether the entry currently has a value.
    ///
    /// Starts a reactive entry's subscription on first use, which requires
    /// the entry's frame to be attached to a store.
    pub fn has_value(&self) -> Result<bool> {
        match &self.kind {
            EntryKind::Static(_) => Ok(true),
            EntryKind::Reactive(binding) => binding.has_value(),
        }
    }

    /// The entry's value.
    ///
    /// Fails with [`StoreError::EntryHasNoValue`] when the source has not
    /// produced a value; check [`has_value`](Self::has_value) first.
    pub fn get_value(&self) -> Result<ErasedValue> {
        match &self.kind {
            EntryKind::Static(value) => Ok(value.clone()),
            EntryKind::Reactive(binding) => binding.get_value(),
        }
    }

    /// The entry's value as a `T`.
    pub fn get<T: PropertyValue>(&self) -> Result<T> {
        self.get_value()?
            .downcast()
            .ok_or(StoreError::ValueTypeMismatch {
                property: self.property.name(),
            })
    }

    /// Lifecycle of a reactive entry; `None` for static entries.
    pub fn lifecycle(&self) -> Option<BindingLifecycle> {
        match &self.kind {
            EntryKind::Static(_) => None,
            EntryKind::Reactive(binding) => Some(binding.lifecycle()),
        }
    }

    /// Unsubscribe a reactive entry and remove it from its frame.
    ///
    /// Idempotent, and safe to call from a callback of the entry's own
    /// source. Static entries have nothing to dispose.
    pub fn dispose(&self) {
        if let EntryKind::Reactive(binding) = &self.kind {
            binding.complete();
        }
    }

    pub(crate) fn binding(&self) -> Option<&Rc<BindingEntry>> {
        match &self.kind {
            EntryKind::Static(_) => None,
            EntryKind::Reactive(binding) => Some(binding),
        }
    }

    /// Whether both handles refer to the same binding.
    pub(crate) fn same_binding(&self, other: &Entry) -> bool {
        match (self.binding(), other.binding()) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Stop a reactive entry that is leaving its frame.
    pub(crate) fn retire(&self) {
        if let Some(binding) = self.binding() {
            binding.teardown();
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Entry");
        debug.field("property", &self.property.name());
        match &self.kind {
            EntryKind::Static(value) => debug.field("value", value),
            EntryKind::Reactive(binding) => debug
                .field("lifecycle", &binding.lifecycle())
                .field("value", &binding.state.borrow().value),
        };
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyMetadata;
    use crate::reactive::Subject;

    #[test]
    fn static_entry_always_has_value() {
        let opacity = Property::register("Opacity", PropertyMetadata::new(1.0_f64));
        let entry = Entry::value(&opacity, 0.5);

        assert!(!entry.is_reactive());
        assert!(entry.has_value().unwrap());
        assert_eq!(entry.get::<f64>().unwrap(), 0.5);
        assert_eq!(entry.lifecycle(), None);
        assert_eq!(entry.property().name(), "Opacity");
    }

    #[test]
    fn typed_read_of_wrong_type_fails() {
        let opacity = Property::register("Opacity", PropertyMetadata::new(1.0_f64));
        let entry = Entry::value(&opacity, 0.5);

        assert_eq!(
            entry.get::<i32>(),
            Err(StoreError::ValueTypeMismatch { property: "Opacity" })
        );
    }

    #[test]
    fn detached_binding_does_not_subscribe() {
        let text = Property::register("Text", PropertyMetadata::new(String::new()));
        let source = Subject::<String>::new();
        let entry = Entry::bind(&text, source.clone());

        assert!(entry.is_reactive());
        assert_eq!(entry.lifecycle(), Some(BindingLifecycle::Unstarted));
        assert_eq!(
            entry.has_value(),
            Err(StoreError::MissingOwner { property: "Text" })
        );
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(entry.lifecycle(), Some(BindingLifecycle::Unstarted));
    }

    #[test]
    fn dispose_before_start_completes() {
        let text = Property::register("Text", PropertyMetadata::new(String::new()));
        let entry = Entry::bind(&text, Subject::<String>::new());

        entry.dispose();
        entry.dispose();

        assert_eq!(entry.lifecycle(), Some(BindingLifecycle::Completed));
        assert_eq!(entry.has_value(), Ok(false));
        assert_eq!(
            entry.get_value(),
            Err(StoreError::EntryHasNoValue { property: "Text" })
        );
    }

    #[test]
    fn clones_share_binding() {
        let text = Property::register("Text", PropertyMetadata::new(String::new()));
        let entry = Entry::bind(&text, Subject::<String>::new());
        let clone = entry.clone();
        let other = Entry::bind(&text, Subject::<String>::new());

        assert!(entry.same_binding(&clone));
        assert!(!entry.same_binding(&other));
    }
}
